//! # Observers and Subscribable Sources
//!
//! Observers are the outbound half of a behavior that can be subscribed to.
//! An [`ObserverSet`] tolerates observers removing themselves (or others)
//! from inside their own callbacks: every notification pass works on a
//! snapshot and re-checks membership before each call.

use futures::stream::{BoxStream, StreamExt};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::trace;

type NextFn<T> = Box<dyn FnMut(&T) + Send>;
type ErrorFn = Box<dyn FnMut(&anyhow::Error) + Send>;
type CompleteFn = Box<dyn FnMut() + Send>;

/// Locks a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct QueueState<E> {
    pending: VecDeque<E>,
    draining: bool,
}

/// Runs work items one at a time in arrival order.
///
/// An item pushed while another is being handled, from inside the handler or
/// from another thread, is queued and handled by whoever is already draining.
/// Observers can therefore feed their own source without re-entering it.
pub(crate) struct SerialQueue<E> {
    state: Mutex<QueueState<E>>,
}

impl<E> SerialQueue<E> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                draining: false,
            }),
        }
    }

    pub(crate) fn run(&self, item: E, mut handle: impl FnMut(E)) {
        {
            let mut state = lock(&self.state);
            state.pending.push_back(item);
            if state.draining {
                return;
            }
            state.draining = true;
        }
        loop {
            let next = {
                let mut state = lock(&self.state);
                match state.pending.pop_front() {
                    Some(next) => next,
                    None => {
                        state.draining = false;
                        return;
                    }
                }
            };
            handle(next);
        }
    }
}

/// # Observer
///
/// A set of optional callbacks interested in values of type `T`.
pub struct Observer<T> {
    next: Option<NextFn<T>>,
    error: Option<ErrorFn>,
    complete: Option<CompleteFn>,
}

impl<T> Observer<T> {
    /// An observer that ignores everything until callbacks are attached.
    pub fn new() -> Self {
        Self {
            next: None,
            error: None,
            complete: None,
        }
    }

    pub fn from_next(next: impl FnMut(&T) + Send + 'static) -> Self {
        Self::new().on_next(next)
    }

    pub fn on_next(mut self, next: impl FnMut(&T) + Send + 'static) -> Self {
        self.next = Some(Box::new(next));
        self
    }

    pub fn on_error(mut self, error: impl FnMut(&anyhow::Error) + Send + 'static) -> Self {
        self.error = Some(Box::new(error));
        self
    }

    pub fn on_complete(mut self, complete: impl FnMut() + Send + 'static) -> Self {
        self.complete = Some(Box::new(complete));
        self
    }

    pub fn next(&mut self, value: &T) {
        if let Some(next) = self.next.as_mut() {
            next(value);
        }
    }

    pub fn error(&mut self, error: &anyhow::Error) {
        if let Some(on_error) = self.error.as_mut() {
            on_error(error);
        }
    }

    pub fn complete(&mut self) {
        if let Some(complete) = self.complete.as_mut() {
            complete();
        }
    }

    /// Adapts this observer to a source of `U` by converting every value.
    pub fn contramap<U>(mut self, map: impl Fn(&U) -> T + Send + 'static) -> Observer<U>
    where
        T: 'static,
        U: 'static,
    {
        let mut mapped = Observer::new();
        if let Some(mut next) = self.next.take() {
            mapped = mapped.on_next(move |value: &U| next(&map(value)));
        }
        mapped.error = self.error.take();
        mapped.complete = self.complete.take();
        mapped
    }
}

impl<T> Default for Observer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Observer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("next", &self.next.is_some())
            .field("error", &self.error.is_some())
            .field("complete", &self.complete.is_some())
            .finish()
    }
}

/// # Subscription
///
/// Unsubscribe handle returned by every `subscribe` call. Clones share the
/// same registration; unsubscribing more than once is harmless.
#[derive(Clone)]
pub struct Subscription {
    teardown: Arc<Mutex<Option<Box<dyn FnOnce() + Send>>>>,
}

impl Subscription {
    pub fn new(teardown: impl FnOnce() + Send + 'static) -> Self {
        let teardown: Box<dyn FnOnce() + Send> = Box::new(teardown);
        Self {
            teardown: Arc::new(Mutex::new(Some(teardown))),
        }
    }

    /// A subscription that is already closed.
    pub fn closed() -> Self {
        Self {
            teardown: Arc::new(Mutex::new(None)),
        }
    }

    pub fn unsubscribe(&self) {
        let teardown = lock(&self.teardown).take();
        if let Some(teardown) = teardown {
            teardown();
        }
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.teardown).is_none()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.is_closed())
            .finish()
    }
}

struct ObserverEntries<T> {
    next_key: u64,
    entries: BTreeMap<u64, Arc<Mutex<Observer<T>>>>,
}

/// # ObserverSet
///
/// Registered observers of a behavior. Clones share the same set.
pub struct ObserverSet<T> {
    inner: Arc<Mutex<ObserverEntries<T>>>,
}

impl<T: 'static> ObserverSet<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ObserverEntries {
                next_key: 0,
                entries: BTreeMap::new(),
            })),
        }
    }

    /// Registers an observer; the returned subscription removes just this one.
    pub fn insert(&self, observer: Observer<T>) -> Subscription
    where
        T: Send,
    {
        let key = {
            let mut inner = lock(&self.inner);
            let key = inner.next_key;
            inner.next_key += 1;
            inner.entries.insert(key, Arc::new(Mutex::new(observer)));
            key
        };
        let weak: Weak<Mutex<ObserverEntries<T>>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                lock(&inner).entries.remove(&key);
            }
        })
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Moves every registration into a new set that this one no longer
    /// affects. Clearing this set afterwards leaves the detached one intact.
    pub fn detach(&self) -> ObserverSet<T> {
        let entries = std::mem::take(&mut lock(&self.inner).entries);
        let next_key = entries.keys().next_back().map_or(0, |key| key + 1);
        ObserverSet {
            inner: Arc::new(Mutex::new(ObserverEntries { next_key, entries })),
        }
    }

    /// Drops every registration.
    pub fn clear(&self) {
        let removed = std::mem::take(&mut lock(&self.inner).entries);
        trace!("Cleared {} observers", removed.len());
    }

    pub fn notify_next(&self, value: &T) {
        self.for_each(|observer| observer.next(value));
    }

    pub fn notify_error(&self, error: &anyhow::Error) {
        self.for_each(|observer| observer.error(error));
    }

    pub fn notify_complete(&self) {
        self.for_each(|observer| observer.complete());
    }

    fn for_each(&self, mut notify: impl FnMut(&mut Observer<T>)) {
        let snapshot: Vec<(u64, Arc<Mutex<Observer<T>>>)> = lock(&self.inner)
            .entries
            .iter()
            .map(|(key, observer)| (*key, Arc::clone(observer)))
            .collect();

        for (key, observer) in snapshot {
            // Removed by an earlier callback in this pass
            if !lock(&self.inner).entries.contains_key(&key) {
                continue;
            }
            notify(&mut lock(&observer));
        }
    }
}

impl<T: 'static> Default for ObserverSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ObserverSet<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// A push source that observers can subscribe to.
pub trait Subscribable<T>: Send + Sync {
    fn subscribe(&self, observer: Observer<T>) -> Subscription;
}

/// Shared handle to a subscribable source.
pub type SharedSource<T> = Arc<dyn Subscribable<T>>;

#[derive(Clone)]
enum Terminal {
    Completed,
    Failed(Arc<anyhow::Error>),
}

enum Notification<T> {
    Next(T),
    Error(Arc<anyhow::Error>),
    Complete,
}

/// # Subject
///
/// A hot source driven by hand. Values pushed before anyone subscribes are
/// lost; a subscriber arriving after completion or failure is told so
/// immediately. Notifications are delivered one at a time, so an observer
/// may push into the subject it is observing.
pub struct Subject<T> {
    observers: ObserverSet<T>,
    terminal: Arc<Mutex<Option<Terminal>>>,
    queue: Arc<SerialQueue<Notification<T>>>,
}

impl<T: Send + 'static> Subject<T> {
    pub fn new() -> Self {
        Self {
            observers: ObserverSet::new(),
            terminal: Arc::new(Mutex::new(None)),
            queue: Arc::new(SerialQueue::new()),
        }
    }

    pub fn next(&self, value: T) {
        if lock(&self.terminal).is_some() {
            return;
        }
        self.deliver(Notification::Next(value));
    }

    pub fn error(&self, error: anyhow::Error) {
        let error = Arc::new(error);
        if self.finish(Terminal::Failed(Arc::clone(&error))) {
            self.deliver(Notification::Error(error));
        }
    }

    pub fn complete(&self) {
        if self.finish(Terminal::Completed) {
            self.deliver(Notification::Complete);
        }
    }

    pub fn is_finished(&self) -> bool {
        lock(&self.terminal).is_some()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Shares this subject as a subscribable source.
    pub fn shared(&self) -> SharedSource<T> {
        Arc::new(self.clone())
    }

    fn finish(&self, terminal: Terminal) -> bool {
        let mut slot = lock(&self.terminal);
        if slot.is_some() {
            return false;
        }
        *slot = Some(terminal);
        true
    }

    fn deliver(&self, notification: Notification<T>) {
        self.queue.run(notification, |notification| match notification {
            Notification::Next(value) => self.observers.notify_next(&value),
            Notification::Error(error) => {
                self.observers.notify_error(&error);
                self.observers.clear();
            }
            Notification::Complete => {
                self.observers.notify_complete();
                self.observers.clear();
            }
        });
    }
}

impl<T: Send + 'static> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            observers: self.observers.clone(),
            terminal: Arc::clone(&self.terminal),
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<T: Send + 'static> Subscribable<T> for Subject<T> {
    fn subscribe(&self, mut observer: Observer<T>) -> Subscription {
        let terminal = lock(&self.terminal).clone();
        match terminal {
            Some(Terminal::Completed) => {
                observer.complete();
                Subscription::closed()
            }
            Some(Terminal::Failed(error)) => {
                observer.error(&error);
                Subscription::closed()
            }
            None => self.observers.insert(observer),
        }
    }
}

type StreamFactory<T> = dyn Fn() -> BoxStream<'static, anyhow::Result<T>> + Send + Sync;

/// # StreamSource
///
/// A cold source: every subscription drives a fresh stream from the factory
/// on its own tokio task. Unsubscribing aborts that task, and no value is
/// delivered once the subscription is closed.
///
/// Subscribing needs a tokio runtime. Outside one the observer is told so
/// through `error` and the returned subscription is already closed.
pub struct StreamSource<T> {
    factory: Arc<StreamFactory<T>>,
}

impl<T: Send + 'static> StreamSource<T> {
    pub fn new(
        factory: impl Fn() -> BoxStream<'static, anyhow::Result<T>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            factory: Arc::new(factory),
        }
    }

    /// A source replaying `values` and then completing.
    pub fn from_values(values: Vec<T>) -> Self
    where
        T: Clone + Sync,
    {
        Self::new(move || futures::stream::iter(values.clone().into_iter().map(Ok)).boxed())
    }

    pub fn shared(self) -> SharedSource<T> {
        Arc::new(self)
    }
}

impl<T: Send + 'static> Subscribable<T> for StreamSource<T> {
    fn subscribe(&self, mut observer: Observer<T>) -> Subscription {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                let error = anyhow::Error::new(e).context("stream source needs a tokio runtime");
                observer.error(&error);
                return Subscription::closed();
            }
        };
        let active = Arc::new(AtomicBool::new(true));
        let mut stream = (self.factory)();

        let task_active = Arc::clone(&active);
        let task = runtime.spawn(async move {
            while let Some(item) = stream.next().await {
                if !task_active.load(Ordering::Acquire) {
                    return;
                }
                match item {
                    Ok(value) => observer.next(&value),
                    Err(e) => {
                        observer.error(&e);
                        return;
                    }
                }
            }
            if task_active.load(Ordering::Acquire) {
                observer.complete();
            }
        });

        Subscription::new(move || {
            active.store(false, Ordering::Release);
            task.abort();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn recording<T: fmt::Debug + 'static>() -> (Observer<T>, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let next_log = Arc::clone(&log);
        let error_log = Arc::clone(&log);
        let complete_log = Arc::clone(&log);
        let observer = Observer::new()
            .on_next(move |value: &T| next_log.lock().unwrap().push(format!("next:{value:?}")))
            .on_error(move |e| error_log.lock().unwrap().push(format!("error:{e}")))
            .on_complete(move || complete_log.lock().unwrap().push("complete".to_string()));
        (observer, log)
    }

    #[test]
    fn test_subject_delivers_until_complete() {
        let subject = Subject::new();
        let (observer, log) = recording::<i32>();
        subject.subscribe(observer);

        subject.next(1);
        subject.complete();
        subject.next(2);

        assert_eq!(*log.lock().unwrap(), vec!["next:1", "complete"]);
        assert_eq!(subject.observer_count(), 0);
    }

    #[test]
    fn test_late_subscriber_sees_failure() {
        let subject = Subject::<i32>::new();
        subject.error(anyhow::anyhow!("gone"));

        let (observer, log) = recording::<i32>();
        let subscription = subject.subscribe(observer);

        assert!(subscription.is_closed());
        assert_eq!(*log.lock().unwrap(), vec!["error:gone"]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let subject = Subject::new();
        let (observer, log) = recording::<i32>();
        let subscription = subject.subscribe(observer);

        subject.next(1);
        subscription.unsubscribe();
        subscription.unsubscribe();
        subject.next(2);

        assert_eq!(*log.lock().unwrap(), vec!["next:1"]);
    }

    #[test]
    fn test_observer_can_remove_peer_mid_pass() {
        let set = ObserverSet::<i32>::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let peer_slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let first_calls = Arc::clone(&calls);
        let first_slot = Arc::clone(&peer_slot);
        set.insert(Observer::from_next(move |_| {
            first_calls.lock().unwrap().push("first");
            if let Some(peer) = first_slot.lock().unwrap().take() {
                peer.unsubscribe();
            }
        }));
        let second_calls = Arc::clone(&calls);
        let second = set.insert(Observer::from_next(move |_| {
            second_calls.lock().unwrap().push("second");
        }));
        *peer_slot.lock().unwrap() = Some(second);

        set.notify_next(&1);
        set.notify_next(&2);

        assert_eq!(*calls.lock().unwrap(), vec!["first", "first"]);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_observer_can_remove_itself() {
        let set = ObserverSet::<i32>::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let count = Arc::new(Mutex::new(0));

        let inner_slot = Arc::clone(&slot);
        let inner_count = Arc::clone(&count);
        let subscription = set.insert(Observer::from_next(move |_| {
            *inner_count.lock().unwrap() += 1;
            if let Some(me) = inner_slot.lock().unwrap().as_ref() {
                me.unsubscribe();
            }
        }));
        *slot.lock().unwrap() = Some(subscription);

        set.notify_next(&1);
        set.notify_next(&2);

        assert_eq!(*count.lock().unwrap(), 1);
        assert!(set.is_empty());
    }

    #[test]
    fn test_observer_can_push_into_its_own_subject() {
        let subject = Subject::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let feedback = subject.clone();
        let sink = Arc::clone(&seen);
        subject.subscribe(Observer::from_next(move |n: &i32| {
            sink.lock().unwrap().push(*n);
            if *n < 3 {
                feedback.next(n + 1);
            }
        }));

        subject.next(1);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_detached_set_survives_clear() {
        let set = ObserverSet::<i32>::new();
        let (observer, log) = recording::<i32>();
        set.insert(observer);

        let detached = set.detach();
        set.clear();
        detached.notify_next(&1);
        detached.notify_complete();

        assert!(set.is_empty());
        assert_eq!(*log.lock().unwrap(), vec!["next:1", "complete"]);
    }

    #[test]
    fn test_stream_source_outside_runtime_reports_error() {
        let source = StreamSource::from_values(vec![1]);
        let (observer, log) = recording::<i32>();

        let subscription = source.subscribe(observer);

        assert!(subscription.is_closed());
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert!(log[0].starts_with("error:stream source needs a tokio runtime"));
    }

    #[test]
    fn test_contramap_converts_values() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut observer: Observer<i32> =
            Observer::from_next(move |s: &String| sink.lock().unwrap().push(s.clone()))
                .contramap(|n: &i32| n.to_string());

        observer.next(&7);
        assert_eq!(*seen.lock().unwrap(), vec!["7".to_string()]);
    }

    #[tokio::test]
    async fn test_stream_source_replays_and_completes() {
        let source = StreamSource::from_values(vec![1, 2, 3]);
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let done_tx = Mutex::new(Some(done_tx));

        let log = Arc::new(Mutex::new(Vec::new()));
        let next_log = Arc::clone(&log);
        let observer = Observer::from_next(move |v: &i32| next_log.lock().unwrap().push(*v))
            .on_complete(move || {
                if let Some(tx) = done_tx.lock().unwrap().take() {
                    let _ = tx.send(());
                }
            });

        source.subscribe(observer);
        done_rx.await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
    }
}
