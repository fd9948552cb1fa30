//! Awake/sleeping tracking for queue-mode devices.

mod presence_tracker;

pub use presence_tracker::{PresenceState, PresenceTracker};
