pub mod config;
pub mod domain;
pub mod errors;
pub mod policy;

pub use domain::actor::{Actor, ActorId, Role};
pub use domain::message::{ChatMessage, SenderRole, MESSAGE_MAX_CHARS};
pub use domain::request::{
    Category, NewRequest, Priority, RequestFilter, RequestId, RequestPatch, RequestStatus,
    ServiceRequest, SortField, SortOrder, StatusTransition, DESCRIPTION_MAX_CHARS,
    TITLE_MAX_CHARS,
};
pub use domain::stats::{CountBucket, RequestStats};
pub use errors::ServiceError;
