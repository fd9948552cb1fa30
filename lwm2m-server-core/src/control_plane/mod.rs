//! Control-plane layer.
//!
//! Owns the registration lifecycle: the authoritative registration store, the `/rd`
//! request handler that devices talk to, and the cleanup that runs whenever a
//! registration ends (deregistration, replacement or expiry).

pub mod registration_endpoint;
pub mod registration_lifecycle;
pub mod registration_store;

pub use registration_endpoint::RegistrationEndpoint;
pub use registration_lifecycle::{RegistrationLifecycle, RemovedRegistration, ReplacedRegistration};
pub use registration_store::{InMemoryRegistrationStore, RegistrationStore, UpdatedRegistration};
