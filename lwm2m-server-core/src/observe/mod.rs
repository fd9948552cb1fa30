//! Observation bookkeeping and inbound notification handling.
//!
//! ```
//! use lwm2m_server_core::observe::is_fresh;
//!
//! assert!(is_fresh(10, 11));
//! assert!(!is_fresh(100, 99));
//! // Counters wrap at 2^24.
//! assert!(is_fresh(0x00FF_FFFF, 0));
//! ```

pub mod notification;
pub mod observation_store;

pub use notification::{
    is_fresh, NotificationError, NotificationHandler, NotificationOutcome, ObservedValue,
};
pub use observation_store::{AddedObservation, ObservationStore};
