pub mod actor;
pub mod message;
pub mod request;
pub mod stats;
