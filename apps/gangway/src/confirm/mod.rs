pub mod backend;
pub mod gate;
pub mod request;

use thiserror::Error;

pub use backend::{
    BackendError, ConfirmStatus, ConfirmStatusResponse, ConfirmationBackend,
    ConfirmationTicket, HttpConfirmationBackend, RequestDescriptor,
};
pub use gate::{ConfirmationGate, ConfirmationOutcome, DEFAULT_POLL_INTERVAL, MAX_POLL_INTERVAL};
pub use request::{ConfirmationRequest, ConfirmationRequestBuilder, SystemUser, TargetKind};

#[derive(Debug, Error)]
pub enum ConfirmError {
    #[error("invalid confirmation request: {0}")]
    InvalidRequest(String),
    #[error("authorization backend unavailable: {0}")]
    BackendUnavailable(#[source] BackendError),
}
