pub mod api;
pub mod cache;
pub mod sync;
pub mod view;

pub use api::{ApiError, HttpRequestApi, RequestApi};
pub use cache::RequestCache;
pub use sync::{CreateOutcome, PollerHandle, SyncClient};
pub use view::{MessageView, RequestView};
