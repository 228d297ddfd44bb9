//! MIDI input devices seen as typed musical events.
//!
//! An [`ActiveDeviceController`] activates at most one input device at a
//! time and delivers its note and controller msgs to subscribers of its
//! [`EventDispatcher`]. The MIDI library doing the actual device I/O sits
//! behind the [`transport`] traits.
//!
//! ```
//! use midi_input_controller::{
//!     midi::{Channel, RawMessage, RawNote},
//!     transport::loopback::LoopbackTransport,
//!     ActiveDeviceController, Pitch,
//! };
//!
//! let transport = LoopbackTransport::new().with_device("Keys");
//! let ctrl = ActiveDeviceController::new(transport.clone());
//!
//! assert!(ctrl.activate("Keys").unwrap());
//! ctrl.dispatcher().on_note_on(|note| {
//!     println!("{} at {} Hz", note.pitch, note.pitch.frequency());
//! });
//!
//! transport.inject(
//!     "Keys",
//!     RawMessage::NoteOn(RawNote {
//!         channel: Channel::from(0),
//!         pitch: Pitch::A4.ordinal(),
//!         velocity: 100,
//!         time: 1.5,
//!     }),
//! );
//! ```

pub mod controller;
pub use controller::ActiveDeviceController;

pub mod dispatch;
pub use dispatch::{
    ControlEvent, Event, EventDispatcher, EventKind, NoteEvent, Subscriber, SubscriptionToken,
};

pub mod midi;
pub use midi::Error;

pub mod pitch;
pub use pitch::{frequency_if_in_range, frequency_of, Pitch, PitchRange};

pub mod registry;
pub use registry::DeviceRegistry;

pub mod transport;
