//! Runtime integration layer.
//!
//! Background tasks live here so timer and task-spawning behavior stays out of the
//! registration and request logic.

pub(crate) mod expiration_runtime;
