//! Data-plane layer.
//!
//! Turns typed downlink requests into transport exchanges and back. The translator
//! owns the operation to wire mapping, the dispatcher owns liveness checks, pending
//! request tracking and timeouts.

pub mod dispatcher;
pub mod downlink;
pub(crate) mod pending_requests;
pub mod translator;

pub use dispatcher::RequestDispatcher;
pub use downlink::{
    AttributeSet, DownlinkRequest, Lwm2mResponse, NotificationAttribute, OperationKind,
    ResponseContent, WriteMode,
};
pub use translator::{ProtocolTranslator, TranslationError};
