//! Boundary with the library delivering MIDI input.
//!
//! Nothing outside this module and the backends implementing it talks to
//! the underlying MIDI library, so the backend can be swapped without
//! touching callers.

use std::sync::{Arc, Mutex, PoisonError};

use crate::midi::{Error, RawKind, RawMessage};

pub mod loopback;

/// A callback invoked on the transport's receiver thread.
pub type RawHandler = Arc<dyn Fn(&RawMessage) + Send + Sync>;

/// A source of installed input devices.
pub trait Transport: Send + Sync {
    type Device: InputDevice;

    /// Returns the installed input devices in the order reported by the backend.
    fn input_devices(&self) -> Result<Vec<Self::Device>, Error>;
}

/// Handle to one input device.
///
/// `open` and `close` are idempotent. Starting to receive requires an open
/// device. Once receiving, the backend invokes the registered handlers
/// from a thread it owns.
pub trait InputDevice: Send {
    fn name(&self) -> Arc<str>;

    fn open(&mut self) -> Result<(), Error>;
    fn is_open(&self) -> bool;
    fn close(&mut self);

    fn start_receiving(&mut self) -> Result<(), Error>;
    fn is_receiving(&self) -> bool;
    fn stop_receiving(&mut self);

    fn add_handler(&mut self, kind: RawKind, handler: RawHandler);
    fn remove_all_handlers(&mut self);
}

/// Handlers registered on a device, shared with its receiver thread.
#[derive(Clone, Default)]
pub struct RawHandlers(Arc<Mutex<Vec<(RawKind, RawHandler)>>>);

impl RawHandlers {
    pub fn add(&self, kind: RawKind, handler: RawHandler) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((kind, handler));
    }

    pub fn clear(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the handlers currently registered for `kind`, in registration order.
    pub fn snapshot(&self, kind: RawKind) -> Vec<RawHandler> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(handler_kind, _)| *handler_kind == kind)
            .map(|(_, handler)| Arc::clone(handler))
            .collect()
    }

    /// Invokes the handlers matching `msg`.
    ///
    /// The registration lock is released before the handlers run.
    pub fn invoke(&self, msg: &RawMessage) {
        for handler in self.snapshot(msg.kind()) {
            handler(msg);
        }
    }
}

impl std::fmt::Debug for RawHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawHandlers")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::{Channel, RawNote};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn note_on() -> RawMessage {
        RawMessage::NoteOn(RawNote {
            channel: Channel::from(0),
            pitch: 60,
            velocity: 90,
            time: 0.0,
        })
    }

    #[test]
    fn invoke_filters_by_kind() {
        let handlers = RawHandlers::default();
        let hits = Arc::new(AtomicUsize::new(0));

        let on_hits = hits.clone();
        handlers.add(
            RawKind::NoteOn,
            Arc::new(move |_: &RawMessage| {
                on_hits.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let off_hits = hits.clone();
        handlers.add(
            RawKind::NoteOff,
            Arc::new(move |_: &RawMessage| {
                off_hits.fetch_add(100, Ordering::SeqCst);
            }),
        );

        handlers.invoke(&note_on());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(handlers.len(), 2);

        handlers.clear();
        assert!(handlers.is_empty());
        handlers.invoke(&note_on());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handler_may_register_from_callback() {
        let handlers = RawHandlers::default();
        let inner = handlers.clone();
        handlers.add(
            RawKind::NoteOn,
            Arc::new(move |_: &RawMessage| {
                inner.add(RawKind::NoteOff, Arc::new(|_: &RawMessage| ()))
            }),
        );

        handlers.invoke(&note_on());
        assert_eq!(handlers.len(), 2);
    }
}
