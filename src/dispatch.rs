//! Normalization of raw device msgs into typed events and their delivery.
//!
//! # Locking
//!
//! One reentrant mutex guards the subscriber lists together with the
//! current session. It is held while a raw msg is delivered to every
//! subscriber, and while a session is opened or closed. Once
//! [`EventDispatcher::close_session`] returns, no msg from that session
//! can reach a subscriber.
//!
//! Subscribers run on the transport's receiver thread with that mutex
//! held. They may subscribe and unsubscribe, themselves included: a
//! subscriber removed during a delivery is not invoked for the rest of
//! it. They must not deactivate the controller, which waits for the
//! receiver thread. Hand events over to another thread with
//! [`EventDispatcher::forward_to`] for anything beyond quick work.
//!
//! # Failing subscribers
//!
//! A subscriber which panics is reported with `log::error!` and counted
//! (see [`EventDispatcher::failure_count`]), then the remaining
//! subscribers of that event are invoked. The receiver thread never
//! unwinds through the dispatcher.

use crossbeam_channel as channel;
use parking_lot::ReentrantMutex;
use std::{
    any::Any,
    cell::RefCell,
    collections::BTreeMap,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};

use crate::{
    midi::{Channel, Control, ControlValue, RawKind, RawMessage, RawNote, Timestamp, Velocity},
    pitch::Pitch,
    transport::RawHandler,
};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EventKind {
    NoteOn,
    NoteOff,
    SustainChange,
    ReverbChange,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::NoteOn,
        EventKind::NoteOff,
        EventKind::SustainChange,
        EventKind::ReverbChange,
    ];

    fn idx(self) -> usize {
        match self {
            EventKind::NoteOn => 0,
            EventKind::NoteOff => 1,
            EventKind::SustainChange => 2,
            EventKind::ReverbChange => 3,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::NoteOn => "Note On",
            EventKind::NoteOff => "Note Off",
            EventKind::SustainChange => "Sustain Change",
            EventKind::ReverbChange => "Reverb Change",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoteEvent {
    pub channel: Channel,
    pub pitch: Pitch,
    pub velocity: Velocity,
    pub time: Timestamp,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControlEvent {
    pub channel: Channel,
    pub value: ControlValue,
    pub time: Timestamp,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Event {
    NoteOn(NoteEvent),
    NoteOff(NoteEvent),
    SustainChange(ControlEvent),
    ReverbChange(ControlEvent),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::NoteOn(_) => EventKind::NoteOn,
            Event::NoteOff(_) => EventKind::NoteOff,
            Event::SustainChange(_) => EventKind::SustainChange,
            Event::ReverbChange(_) => EventKind::ReverbChange,
        }
    }

    /// Translates a raw msg into its typed event.
    ///
    /// Control changes other than sustain pedal and reverb level have no
    /// event and yield `None`.
    pub fn from_raw(msg: &RawMessage) -> Option<Self> {
        let note = |raw: &RawNote| -> Option<NoteEvent> {
            Some(NoteEvent {
                channel: raw.channel,
                pitch: Pitch::from_ordinal(raw.pitch)?,
                velocity: raw.velocity,
                time: raw.time,
            })
        };

        match msg {
            RawMessage::NoteOn(raw) => note(raw).map(Event::NoteOn),
            RawMessage::NoteOff(raw) => note(raw).map(Event::NoteOff),
            RawMessage::ControlChange(raw) => {
                let event = ControlEvent {
                    channel: raw.channel,
                    value: raw.value,
                    time: raw.time,
                };

                match raw.control {
                    Control::SUSTAIN_PEDAL => Some(Event::SustainChange(event)),
                    Control::REVERB_LEVEL => Some(Event::ReverbChange(event)),
                    _ => None,
                }
            }
        }
    }
}

pub type NoteCallback = Arc<dyn Fn(NoteEvent) + Send + Sync>;
pub type ControlCallback = Arc<dyn Fn(ControlEvent) + Send + Sync>;

/// A callback along with the kind of event it subscribes to.
///
/// Clones share the callback: registering a clone twice registers the same
/// callback twice, and [`EventDispatcher::unsubscribe_callback`] removes
/// every registration of it.
#[derive(Clone)]
pub enum Subscriber {
    NoteOn(NoteCallback),
    NoteOff(NoteCallback),
    SustainChange(ControlCallback),
    ReverbChange(ControlCallback),
}

impl Subscriber {
    pub fn note_on(callback: impl Fn(NoteEvent) + Send + Sync + 'static) -> Self {
        Self::NoteOn(Arc::new(callback))
    }

    pub fn note_off(callback: impl Fn(NoteEvent) + Send + Sync + 'static) -> Self {
        Self::NoteOff(Arc::new(callback))
    }

    pub fn sustain_change(callback: impl Fn(ControlEvent) + Send + Sync + 'static) -> Self {
        Self::SustainChange(Arc::new(callback))
    }

    pub fn reverb_change(callback: impl Fn(ControlEvent) + Send + Sync + 'static) -> Self {
        Self::ReverbChange(Arc::new(callback))
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Subscriber::NoteOn(_) => EventKind::NoteOn,
            Subscriber::NoteOff(_) => EventKind::NoteOff,
            Subscriber::SustainChange(_) => EventKind::SustainChange,
            Subscriber::ReverbChange(_) => EventKind::ReverbChange,
        }
    }

    fn is_same_callback(&self, other: &Subscriber) -> bool {
        use Subscriber::*;
        match (self, other) {
            (NoteOn(a), NoteOn(b)) | (NoteOff(a), NoteOff(b)) => Arc::ptr_eq(a, b),
            (SustainChange(a), SustainChange(b)) | (ReverbChange(a), ReverbChange(b)) => {
                Arc::ptr_eq(a, b)
            }
            _ => false,
        }
    }

    fn call(&self, event: &Event) {
        match (self, event) {
            (Subscriber::NoteOn(cb), Event::NoteOn(note))
            | (Subscriber::NoteOff(cb), Event::NoteOff(note)) => cb(*note),
            (Subscriber::SustainChange(cb), Event::SustainChange(control))
            | (Subscriber::ReverbChange(cb), Event::ReverbChange(control)) => cb(*control),
            // Lists are per kind.
            _ => (),
        }
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Subscriber({})", self.kind())
    }
}

/// Identifies one registration, see [`EventDispatcher::unsubscribe`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SubscriptionToken {
    kind: EventKind,
    id: u64,
}

impl SubscriptionToken {
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

type SubscriberList = BTreeMap<u64, Subscriber>;

#[derive(Default)]
struct Subscriptions {
    session: Option<u64>,
    // Ids are increasing, so iteration follows registration order.
    lists: [SubscriberList; 4],
}

impl Subscriptions {
    fn is_delivering(&self, session: u64, kind: EventKind, id: u64) -> bool {
        self.session == Some(session) && self.lists[kind.idx()].contains_key(&id)
    }
}

pub struct EventDispatcher {
    // Reentrant so that subscribers can (un)subscribe from their callback.
    // The `RefCell` is never borrowed while a subscriber runs.
    subscriptions: ReentrantMutex<RefCell<Subscriptions>>,
    next_id: AtomicU64,
    next_session: AtomicU64,
    failures: AtomicUsize,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            subscriptions: ReentrantMutex::new(RefCell::new(Subscriptions::default())),
            next_id: AtomicU64::new(0),
            next_session: AtomicU64::new(0),
            failures: AtomicUsize::new(0),
        }
    }

    /// Appends `subscriber` to the list for its kind.
    pub fn subscribe(&self, subscriber: Subscriber) -> SubscriptionToken {
        let kind = subscriber.kind();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.with_mut(|subscriptions| subscriptions.lists[kind.idx()].insert(id, subscriber));
        log::trace!("Subscribed #{id} to {kind}");

        SubscriptionToken { kind, id }
    }

    pub fn on_note_on(
        &self,
        callback: impl Fn(NoteEvent) + Send + Sync + 'static,
    ) -> SubscriptionToken {
        self.subscribe(Subscriber::note_on(callback))
    }

    pub fn on_note_off(
        &self,
        callback: impl Fn(NoteEvent) + Send + Sync + 'static,
    ) -> SubscriptionToken {
        self.subscribe(Subscriber::note_off(callback))
    }

    pub fn on_sustain_change(
        &self,
        callback: impl Fn(ControlEvent) + Send + Sync + 'static,
    ) -> SubscriptionToken {
        self.subscribe(Subscriber::sustain_change(callback))
    }

    pub fn on_reverb_change(
        &self,
        callback: impl Fn(ControlEvent) + Send + Sync + 'static,
    ) -> SubscriptionToken {
        self.subscribe(Subscriber::reverb_change(callback))
    }

    /// Removes the registration identified by `token`.
    ///
    /// Returns `false` if it was already removed.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        self.with_mut(|subscriptions| subscriptions.lists[token.kind.idx()].remove(&token.id))
            .is_some()
    }

    /// Removes every registration of the callback held by `subscriber`.
    ///
    /// Returns the number of registrations removed.
    pub fn unsubscribe_callback(&self, subscriber: &Subscriber) -> usize {
        let removed = self.with_mut(|subscriptions| {
            let list = &mut subscriptions.lists[subscriber.kind().idx()];
            let (removed, kept) = std::mem::take(list)
                .into_iter()
                .partition::<SubscriberList, _>(|(_, registered)| {
                    registered.is_same_callback(subscriber)
                });
            *list = kept;

            removed
        });

        removed.len()
    }

    /// Clears the list for `kind`, or every list if `kind` is `None`.
    pub fn unsubscribe_all(&self, kind: Option<EventKind>) {
        // Dropped once the lists are released.
        let _removed = self.with_mut(|subscriptions| match kind {
            Some(kind) => vec![std::mem::take(&mut subscriptions.lists[kind.idx()])],
            None => std::mem::take(&mut subscriptions.lists).into(),
        });
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.with(|subscriptions| subscriptions.lists[kind.idx()].len())
    }

    /// Number of subscriber invocations which panicked so far.
    pub fn failure_count(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }

    /// Subscribes to every kind, forwarding the events to `event_tx`.
    ///
    /// This allows polling events from another thread than the receiver's.
    /// Events are dropped once the receiving side is gone.
    pub fn forward_to(&self, event_tx: channel::Sender<Event>) -> Vec<SubscriptionToken> {
        EventKind::ALL
            .iter()
            .map(|kind| {
                let event_tx = event_tx.clone();
                let subscriber = match kind {
                    EventKind::NoteOn => {
                        Subscriber::note_on(move |note| forward(&event_tx, Event::NoteOn(note)))
                    }
                    EventKind::NoteOff => {
                        Subscriber::note_off(move |note| forward(&event_tx, Event::NoteOff(note)))
                    }
                    EventKind::SustainChange => Subscriber::sustain_change(move |control| {
                        forward(&event_tx, Event::SustainChange(control))
                    }),
                    EventKind::ReverbChange => Subscriber::reverb_change(move |control| {
                        forward(&event_tx, Event::ReverbChange(control))
                    }),
                };

                self.subscribe(subscriber)
            })
            .collect()
    }

    /// Starts accepting msgs from the handlers built for the returned session.
    ///
    /// Any previous session stops being delivered.
    pub(crate) fn open_session(&self) -> u64 {
        let session = self.next_session.fetch_add(1, Ordering::Relaxed);
        self.with_mut(|subscriptions| subscriptions.session = Some(session));
        log::debug!("Opened dispatch session #{session}");

        session
    }

    /// Stops delivering msgs and drops every subscriber.
    ///
    /// Waits for a dispatch in progress to complete.
    pub(crate) fn close_session(&self) {
        let (session, _removed) = self.with_mut(|subscriptions| {
            (
                subscriptions.session.take(),
                std::mem::take(&mut subscriptions.lists),
            )
        });
        if let Some(session) = session {
            log::debug!("Closed dispatch session #{session}");
        }
    }

    /// Builds the raw handlers to register on the device of `session`.
    pub(crate) fn raw_handlers(self: &Arc<Self>, session: u64) -> Vec<(RawKind, RawHandler)> {
        [RawKind::NoteOn, RawKind::NoteOff, RawKind::ControlChange]
            .into_iter()
            .map(|kind| {
                let dispatcher = Arc::clone(self);
                let handler: RawHandler =
                    Arc::new(move |msg: &RawMessage| dispatcher.dispatch(session, msg));
                (kind, handler)
            })
            .collect()
    }

    fn dispatch(&self, session: u64, msg: &RawMessage) {
        let event = match Event::from_raw(msg) {
            Some(event) => event,
            None => {
                log::trace!("No event for {msg:?}");
                return;
            }
        };
        let kind = event.kind();

        // Held for the whole delivery: closing the session waits for it.
        let guard = self.subscriptions.lock();

        let subscribers: Vec<(u64, Subscriber)> = {
            let subscriptions = guard.borrow();
            if subscriptions.session != Some(session) {
                log::trace!(
                    "Dropping msg at {:.3}s from stale session #{session}",
                    msg.time()
                );
                return;
            }

            subscriptions.lists[kind.idx()]
                .iter()
                .map(|(id, subscriber)| (*id, subscriber.clone()))
                .collect()
        };

        for (id, subscriber) in subscribers {
            if !guard.borrow().is_delivering(session, kind, id) {
                continue;
            }

            if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| subscriber.call(&event))) {
                self.failures.fetch_add(1, Ordering::Relaxed);
                log::error!(
                    "{kind} subscriber #{id} panicked: {}",
                    panic_message(panic.as_ref())
                );
            }
        }
    }

    fn with<R>(&self, f: impl FnOnce(&Subscriptions) -> R) -> R {
        let guard = self.subscriptions.lock();
        let subscriptions = guard.borrow();
        f(&subscriptions)
    }

    fn with_mut<R>(&self, f: impl FnOnce(&mut Subscriptions) -> R) -> R {
        let guard = self.subscriptions.lock();
        let mut subscriptions = guard.borrow_mut();
        f(&mut subscriptions)
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("EventDispatcher");
        self.with(|subscriptions| {
            dbg.field("session", &subscriptions.session);
            for kind in EventKind::ALL {
                dbg.field(kind.as_str(), &subscriptions.lists[kind.idx()].len());
            }
        });
        dbg.field("failures", &self.failure_count()).finish()
    }
}

fn forward(event_tx: &channel::Sender<Event>, event: Event) {
    if event_tx.send(event).is_err() {
        log::trace!("Event receiver gone, dropping {event:?}");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        *msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown cause"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::RawControl;
    use std::sync::Mutex;

    fn raw_note_on(pitch: u8) -> RawMessage {
        RawMessage::NoteOn(RawNote {
            channel: Channel::from(0),
            pitch,
            velocity: 100,
            time: 1.5,
        })
    }

    fn raw_control(control: u8, value: u8) -> RawMessage {
        RawMessage::ControlChange(RawControl {
            channel: Channel::from(9),
            control: Control::from(control),
            value,
            time: 3.0,
        })
    }

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Subscriber) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        let make = move |tag: &str| {
            let log = log_clone.clone();
            let tag = tag.to_string();
            Subscriber::note_on(move |note| {
                log.lock().unwrap().push(format!("{tag} {}", note.pitch));
            })
        };

        (log, make)
    }

    #[test]
    fn translate_notes() {
        assert_eq!(
            Event::from_raw(&raw_note_on(69)),
            Some(Event::NoteOn(NoteEvent {
                channel: Channel::from(0),
                pitch: Pitch::A4,
                velocity: 100,
                time: 1.5,
            }))
        );
        // not a note number
        assert_eq!(Event::from_raw(&raw_note_on(200)), None);
    }

    #[test]
    fn translate_controls() {
        let expected = ControlEvent {
            channel: Channel::from(9),
            value: 42,
            time: 3.0,
        };

        assert_eq!(
            Event::from_raw(&raw_control(64, 42)),
            Some(Event::SustainChange(expected))
        );
        assert_eq!(
            Event::from_raw(&raw_control(91, 42)),
            Some(Event::ReverbChange(expected))
        );
        assert_eq!(Event::from_raw(&raw_control(7, 42)), None);
        assert_eq!(Event::from_raw(&raw_control(65, 42)), None);
    }

    #[test]
    fn registration_order() {
        let dispatcher = EventDispatcher::new();
        let session = dispatcher.open_session();
        let (log, make) = recorder();

        dispatcher.subscribe(make("first"));
        dispatcher.subscribe(make("second"));
        dispatcher.subscribe(make("third"));

        dispatcher.dispatch(session, &raw_note_on(60));
        assert_eq!(*log.lock().unwrap(), vec!["first C4", "second C4", "third C4"]);
    }

    #[test]
    fn token_removes_single_registration() {
        let dispatcher = EventDispatcher::new();
        let session = dispatcher.open_session();
        let (log, make) = recorder();

        let subscriber = make("dup");
        let first = dispatcher.subscribe(subscriber.clone());
        dispatcher.subscribe(subscriber);
        assert_eq!(first.kind(), EventKind::NoteOn);

        assert!(dispatcher.unsubscribe(first));
        assert!(!dispatcher.unsubscribe(first));

        dispatcher.dispatch(session, &raw_note_on(62));
        assert_eq!(*log.lock().unwrap(), vec!["dup D4"]);
    }

    #[test]
    fn callback_removal_removes_every_registration() {
        let dispatcher = EventDispatcher::new();
        let (_log, make) = recorder();

        let dup = make("dup");
        let other = make("other");
        dispatcher.subscribe(dup.clone());
        dispatcher.subscribe(other.clone());
        dispatcher.subscribe(dup.clone());

        assert_eq!(dispatcher.unsubscribe_callback(&dup), 2);
        assert_eq!(dispatcher.subscriber_count(EventKind::NoteOn), 1);
        assert_eq!(dispatcher.unsubscribe_callback(&dup), 0);
        assert_eq!(dispatcher.unsubscribe_callback(&other), 1);
    }

    #[test]
    fn unsubscribe_all_by_kind() {
        let dispatcher = EventDispatcher::new();
        dispatcher.on_note_on(|_| ());
        dispatcher.on_note_off(|_| ());
        dispatcher.on_sustain_change(|_| ());
        dispatcher.on_reverb_change(|_| ());

        dispatcher.unsubscribe_all(Some(EventKind::NoteOff));
        assert_eq!(dispatcher.subscriber_count(EventKind::NoteOff), 0);
        assert_eq!(dispatcher.subscriber_count(EventKind::NoteOn), 1);

        dispatcher.unsubscribe_all(None);
        for kind in EventKind::ALL {
            assert_eq!(dispatcher.subscriber_count(kind), 0);
        }
    }

    #[test]
    fn stale_session_is_ignored() {
        let dispatcher = EventDispatcher::new();
        let (log, make) = recorder();

        // no session yet
        dispatcher.subscribe(make("early"));
        dispatcher.dispatch(0, &raw_note_on(60));
        assert!(log.lock().unwrap().is_empty());

        let old = dispatcher.open_session();
        let current = dispatcher.open_session();
        dispatcher.dispatch(old, &raw_note_on(60));
        assert!(log.lock().unwrap().is_empty());

        dispatcher.dispatch(current, &raw_note_on(60));
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn close_session_drops_subscribers() {
        let dispatcher = Arc::new(EventDispatcher::new());
        let session = dispatcher.open_session();
        let (log, make) = recorder();
        dispatcher.subscribe(make("gone"));

        let handlers = dispatcher.raw_handlers(session);
        assert_eq!(handlers.len(), 3);

        dispatcher.close_session();
        assert_eq!(dispatcher.subscriber_count(EventKind::NoteOn), 0);

        for (kind, handler) in handlers {
            if kind == RawKind::NoteOn {
                handler(&raw_note_on(60));
            }
        }
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn panicking_subscriber_does_not_starve_others() {
        let dispatcher = EventDispatcher::new();
        let session = dispatcher.open_session();
        let (log, make) = recorder();

        dispatcher.subscribe(make("before"));
        dispatcher.on_note_on(|_| panic!("subscriber failure"));
        dispatcher.subscribe(make("after"));

        dispatcher.dispatch(session, &raw_note_on(64));
        dispatcher.dispatch(session, &raw_note_on(65));

        assert_eq!(dispatcher.failure_count(), 2);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["before E4", "after E4", "before F4", "after F4"]
        );
    }

    #[test]
    fn one_shot_subscriber() {
        let dispatcher = Arc::new(EventDispatcher::new());
        let session = dispatcher.open_session();
        let (log, make) = recorder();

        let token = Arc::new(Mutex::new(None));
        let inner = (dispatcher.clone(), token.clone());
        let one_shot = dispatcher.on_note_on(move |_| {
            let (dispatcher, token) = &inner;
            if let Some(token) = token.lock().unwrap().take() {
                assert!(dispatcher.unsubscribe(token));
            }
        });
        *token.lock().unwrap() = Some(one_shot);
        dispatcher.subscribe(make("steady"));

        dispatcher.dispatch(session, &raw_note_on(60));
        dispatcher.dispatch(session, &raw_note_on(62));

        assert_eq!(dispatcher.subscriber_count(EventKind::NoteOn), 1);
        assert_eq!(*log.lock().unwrap(), vec!["steady C4", "steady D4"]);
        assert_eq!(dispatcher.failure_count(), 0);
    }

    #[test]
    fn subscription_changes_during_delivery() {
        let dispatcher = Arc::new(EventDispatcher::new());
        let session = dispatcher.open_session();
        let (log, make) = recorder();

        let victim = make("victim");
        let late = make("late");
        let inner = (dispatcher.clone(), victim.clone());
        dispatcher.on_note_on(move |_| {
            let (dispatcher, victim) = &inner;
            dispatcher.unsubscribe_callback(victim);
            dispatcher.subscribe(late.clone());
        });
        dispatcher.subscribe(victim);

        // the victim is skipped, the late subscriber waits for the next msg
        dispatcher.dispatch(session, &raw_note_on(60));
        assert!(log.lock().unwrap().is_empty());

        dispatcher.dispatch(session, &raw_note_on(62));
        assert_eq!(*log.lock().unwrap(), vec!["late D4"]);
        assert_eq!(dispatcher.subscriber_count(EventKind::NoteOn), 3);
    }

    #[test]
    fn session_closed_during_delivery() {
        let dispatcher = Arc::new(EventDispatcher::new());
        let session = dispatcher.open_session();
        let (log, make) = recorder();

        let inner = dispatcher.clone();
        dispatcher.on_note_on(move |_| inner.close_session());
        dispatcher.subscribe(make("after"));

        dispatcher.dispatch(session, &raw_note_on(60));
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(dispatcher.subscriber_count(EventKind::NoteOn), 0);
    }

    #[test]
    fn control_routing() {
        let dispatcher = EventDispatcher::new();
        let session = dispatcher.open_session();
        let sustain = Arc::new(Mutex::new(Vec::new()));
        let reverb = Arc::new(Mutex::new(Vec::new()));

        let sustain_clone = sustain.clone();
        dispatcher.on_sustain_change(move |control| {
            sustain_clone.lock().unwrap().push(control.value);
        });
        let reverb_clone = reverb.clone();
        dispatcher.on_reverb_change(move |control| {
            reverb_clone.lock().unwrap().push(control.value);
        });

        dispatcher.dispatch(session, &raw_control(64, 127));
        dispatcher.dispatch(session, &raw_control(91, 30));
        dispatcher.dispatch(session, &raw_control(1, 99));

        assert_eq!(*sustain.lock().unwrap(), vec![127]);
        assert_eq!(*reverb.lock().unwrap(), vec![30]);
        assert_eq!(dispatcher.failure_count(), 0);
    }

    #[test]
    fn forward_to_channel() {
        let dispatcher = EventDispatcher::new();
        let session = dispatcher.open_session();
        let (event_tx, event_rx) = channel::unbounded();

        let tokens = dispatcher.forward_to(event_tx);
        assert_eq!(tokens.len(), 4);

        dispatcher.dispatch(session, &raw_note_on(69));
        dispatcher.dispatch(session, &raw_control(91, 12));

        assert_eq!(event_rx.try_recv().unwrap().kind(), EventKind::NoteOn);
        assert_eq!(event_rx.try_recv().unwrap().kind(), EventKind::ReverbChange);
        assert!(event_rx.try_recv().is_err());

        drop(event_rx);
        // receiver gone: no failure
        dispatcher.dispatch(session, &raw_note_on(69));
        assert_eq!(dispatcher.failure_count(), 0);
    }
}
