//! Readiness and stop signalling between the mission and its appliances.

mod channel;
mod roles;

pub use channel::{
    FileSignalChannel, Marker, MemorySignalChannel, SignalChannel, MUST_STOP_MARKER,
    STARTED_MARKER, STOPPED_MARKER,
};
pub use roles::{SignalOwner, SignalReader, POLL_INTERVAL};
