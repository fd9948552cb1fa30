//! Domain values shared by every layer: paths, links, bindings, registrations and
//! observations.

mod binding;
pub mod link;
mod observation;
mod path;
mod registration;

pub use binding::{BindingMode, BindingParseError, BindingTransport};
pub use link::{Link, LinkParseError};
pub use observation::{Observation, CONTEXT_CONTENT_FORMAT, CONTEXT_ENDPOINT};
pub use path::{ObjectPath, PathParseError};
pub use registration::{
    Registration, RegistrationUpdate, DEFAULT_LIFETIME_SECS, DEFAULT_LWM2M_VERSION,
};
