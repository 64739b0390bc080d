//! Synchronization client. Wraps a [`RequestApi`] transport and a local
//! [`RequestCache`], and runs an optional background poller that keeps the
//! cache converging on the server state.
//!
//! Failure handling is deliberately asymmetric. A failed create degrades to
//! a local pending placeholder so the passenger does not lose their input.
//! Failed messages and status changes leave the cache untouched: the caller
//! sees the error and the thread never shows an unsent message as sent.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use cabincall_core::domain::request::{
    NewRequest, RequestFilter, RequestId, RequestPatch, RequestStatus,
};

use crate::api::{ApiError, RequestApi};
use crate::cache::RequestCache;
use crate::view::{MessageView, RequestView};

/// Result of a create attempt. `LocalFallback` means the server never
/// acknowledged the request; the placeholder lives only in this client's
/// cache until a refresh reconciles it.
#[derive(Debug)]
pub enum CreateOutcome {
    Committed(RequestView),
    LocalFallback { local_id: String, error: ApiError },
}

struct Inner {
    api: Arc<dyn RequestApi>,
    actor_id: String,
    filter: RequestFilter,
    cache: Mutex<RequestCache>,
}

#[derive(Clone)]
pub struct SyncClient {
    inner: Arc<Inner>,
}

impl SyncClient {
    pub fn new(api: Arc<dyn RequestApi>, actor_id: impl Into<String>) -> Self {
        Self::with_filter(api, actor_id, RequestFilter::default())
    }

    /// The filter is fixed per client; it is what the poller and `refresh`
    /// send on every list call.
    pub fn with_filter(
        api: Arc<dyn RequestApi>,
        actor_id: impl Into<String>,
        filter: RequestFilter,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                actor_id: actor_id.into(),
                filter,
                cache: Mutex::new(RequestCache::new()),
            }),
        }
    }

    /// Current cache contents, pending placeholders included.
    pub async fn snapshot(&self) -> Vec<RequestView> {
        self.inner.cache.lock().await.entries().to_vec()
    }

    pub async fn cached(&self, id: &str) -> Option<RequestView> {
        self.inner.cache.lock().await.get(id).cloned()
    }

    pub async fn last_error(&self) -> Option<String> {
        self.inner.cache.lock().await.last_error().map(str::to_string)
    }

    /// Submits a new request. On transport or server failure the input is
    /// preserved as a pending local entry instead of being dropped.
    pub async fn create_request(&self, input: NewRequest) -> CreateOutcome {
        let title = input.title.clone();
        match self.inner.api.create_request(input).await {
            Ok(created) => {
                let mut cache = self.inner.cache.lock().await;
                cache.insert_committed(&created);
                CreateOutcome::Committed(RequestView::from_request(&created))
            }
            Err(error) => {
                warn!(
                    event_name = "sync.create.fallback",
                    actor_id = %self.inner.actor_id,
                    error = %error,
                    "create not acknowledged, keeping local placeholder"
                );
                let mut cache = self.inner.cache.lock().await;
                let local_id = cache.insert_pending(&title, &self.inner.actor_id, &error);
                CreateOutcome::LocalFallback { local_id, error }
            }
        }
    }

    /// Replaces the cache with a fresh server snapshot. On failure the
    /// last-known-good entries stay in place and only the error indicator
    /// changes.
    pub async fn refresh(&self) -> Result<(), ApiError> {
        match self.inner.api.list_requests(&self.inner.filter).await {
            Ok(requests) => {
                self.inner.cache.lock().await.replace_all(&requests);
                Ok(())
            }
            Err(error) => {
                warn!(
                    event_name = "sync.refresh.failed",
                    actor_id = %self.inner.actor_id,
                    error = %error,
                    "refresh failed, serving stale cache"
                );
                self.inner.cache.lock().await.record_error(&error);
                Err(error)
            }
        }
    }

    /// Re-fetches a single request, e.g. the one currently on screen.
    pub async fn refresh_request(&self, id: &str) -> Result<RequestView, ApiError> {
        match self.inner.api.get_request(&RequestId(id.to_string())).await {
            Ok(request) => {
                let mut cache = self.inner.cache.lock().await;
                cache.apply_update(&request);
                Ok(RequestView::from_request(&request))
            }
            Err(error) => {
                self.inner.cache.lock().await.record_error(&error);
                Err(error)
            }
        }
    }

    /// Sends a chat message. No optimistic write: the cache gains the
    /// message only after the server confirms it.
    pub async fn send_message(&self, id: &str, body: &str) -> Result<MessageView, ApiError> {
        let message = self.inner.api.send_message(&RequestId(id.to_string()), body).await?;
        let view = MessageView::from(&message);
        self.inner.cache.lock().await.push_message(id, view.clone());
        Ok(view)
    }

    /// Applies a status overwrite. Like messages, failures do not touch the
    /// cached entry.
    pub async fn update_status(
        &self,
        id: &str,
        status: RequestStatus,
    ) -> Result<RequestView, ApiError> {
        let patch = RequestPatch { status: Some(status), ..RequestPatch::default() };
        self.update(id, patch).await
    }

    pub async fn update(&self, id: &str, patch: RequestPatch) -> Result<RequestView, ApiError> {
        let updated = self.inner.api.update_request(&RequestId(id.to_string()), patch).await?;
        let mut cache = self.inner.cache.lock().await;
        cache.apply_update(&updated);
        Ok(RequestView::from_request(&updated))
    }

    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.inner.api.delete_request(&RequestId(id.to_string())).await?;
        self.inner.cache.lock().await.remove(id);
        Ok(())
    }

    /// Poller at the configured list cadence. Detail views use
    /// `detail_poll_secs` with [`SyncClient::refresh_request`] driven by the
    /// embedding UI.
    pub fn spawn_list_poller(&self, sync: &cabincall_core::config::SyncConfig) -> PollerHandle {
        self.spawn_poller(Duration::from_secs(sync.list_poll_secs))
    }

    /// Starts a background list poller. The handle owns the task; dropping
    /// it without calling [`PollerHandle::dispose`] leaves the task running.
    pub fn spawn_poller(&self, interval: Duration) -> PollerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let client = self.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick fires immediately; the caller already has whatever
            // state it wants to show, so wait a full interval instead.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {}
                }

                let result = client.inner.api.list_requests(&client.inner.filter).await;

                // The fetch may have raced a dispose. Re-check before
                // touching the cache so a stale poll never lands after the
                // owner has moved on.
                if *shutdown_rx.borrow() {
                    break;
                }

                let mut cache = client.inner.cache.lock().await;
                match result {
                    Ok(requests) => {
                        debug!(
                            event_name = "sync.poll.applied",
                            actor_id = %client.inner.actor_id,
                            count = requests.len(),
                            "poll applied"
                        );
                        cache.replace_all(&requests);
                    }
                    Err(error) => {
                        warn!(
                            event_name = "sync.poll.failed",
                            actor_id = %client.inner.actor_id,
                            error = %error,
                            "poll failed, keeping stale cache"
                        );
                        cache.record_error(&error);
                    }
                }
            }
        });

        PollerHandle { shutdown: shutdown_tx, task }
    }
}

pub struct PollerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Stops the poller. Idempotent from the caller's point of view since
    /// it consumes the handle.
    pub fn dispose(self) {
        let _ = self.shutdown.send(true);
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::sync::Mutex;

    use cabincall_core::domain::actor::{Actor, ActorId, Role};
    use cabincall_core::domain::message::ChatMessage;
    use cabincall_core::domain::request::{
        Category, NewRequest, Priority, RequestFilter, RequestId, RequestPatch, RequestStatus,
        ServiceRequest,
    };
    use cabincall_core::domain::stats::RequestStats;
    use cabincall_core::ServiceError;
    use cabincall_db::{InMemoryRequestRepository, RequestStore, StoreError};

    use super::{ApiError, CreateOutcome, RequestApi, SyncClient};

    fn new_request(title: &str) -> NewRequest {
        NewRequest {
            title: title.to_string(),
            category: Some(Category::Drinks),
            ..NewRequest::default()
        }
    }

    fn server_request(id: &str, title: &str) -> ServiceRequest {
        let now = Utc::now();
        ServiceRequest {
            id: RequestId(id.to_string()),
            title: title.to_string(),
            description: None,
            category: Category::Drinks,
            priority: Priority::Medium,
            status: RequestStatus::New,
            submitter_id: ActorId("P1".into()),
            assigned_to: None,
            seat: None,
            flight_number: None,
            location: None,
            items: None,
            notes: None,
            chat_messages: Vec::new(),
            resolved_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Scripted far side: each call pops the next reply for its method.
    /// Lists fall back to an empty snapshot when the script runs dry so the
    /// poller tests can tick indefinitely.
    #[derive(Default)]
    struct ScriptedApi {
        creates: Mutex<VecDeque<Result<ServiceRequest, ApiError>>>,
        lists: Mutex<VecDeque<Result<Vec<ServiceRequest>, ApiError>>>,
        messages: Mutex<VecDeque<Result<ChatMessage, ApiError>>>,
        list_calls: AtomicUsize,
    }

    impl ScriptedApi {
        async fn script_create(&self, reply: Result<ServiceRequest, ApiError>) {
            self.creates.lock().await.push_back(reply);
        }

        async fn script_list(&self, reply: Result<Vec<ServiceRequest>, ApiError>) {
            self.lists.lock().await.push_back(reply);
        }

        async fn script_message(&self, reply: Result<ChatMessage, ApiError>) {
            self.messages.lock().await.push_back(reply);
        }
    }

    #[async_trait]
    impl RequestApi for ScriptedApi {
        async fn create_request(&self, _input: NewRequest) -> Result<ServiceRequest, ApiError> {
            self.creates.lock().await.pop_front().unwrap_or(Err(ApiError::NotFound))
        }

        async fn list_requests(
            &self,
            _filter: &RequestFilter,
        ) -> Result<Vec<ServiceRequest>, ApiError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            self.lists.lock().await.pop_front().unwrap_or(Ok(Vec::new()))
        }

        async fn get_request(&self, _id: &RequestId) -> Result<ServiceRequest, ApiError> {
            Err(ApiError::NotFound)
        }

        async fn update_request(
            &self,
            _id: &RequestId,
            _patch: RequestPatch,
        ) -> Result<ServiceRequest, ApiError> {
            Err(ApiError::NotFound)
        }

        async fn delete_request(&self, _id: &RequestId) -> Result<(), ApiError> {
            Err(ApiError::NotFound)
        }

        async fn send_message(&self, _id: &RequestId, _body: &str) -> Result<ChatMessage, ApiError> {
            self.messages.lock().await.pop_front().unwrap_or(Err(ApiError::NotFound))
        }

        async fn stats(&self) -> Result<RequestStats, ApiError> {
            Err(ApiError::Forbidden("stats are restricted".into()))
        }
    }

    /// In-process far side backed by the real store, so two clients with
    /// different actors exercise the same policy and lifecycle rules the
    /// server enforces.
    struct StoreBackedApi {
        store: Arc<RequestStore<InMemoryRequestRepository>>,
        actor: Actor,
    }

    fn map_store_error(error: StoreError) -> ApiError {
        match error {
            StoreError::Service(ServiceError::Validation(message)) => {
                ApiError::Validation(message)
            }
            StoreError::Service(ServiceError::Unauthenticated) => ApiError::Unauthenticated,
            StoreError::Service(ServiceError::Forbidden(message)) => ApiError::Forbidden(message),
            StoreError::Service(ServiceError::NotFound { .. }) => ApiError::NotFound,
            StoreError::Repository(error) => ApiError::Transport(error.to_string()),
        }
    }

    #[async_trait]
    impl RequestApi for StoreBackedApi {
        async fn create_request(&self, input: NewRequest) -> Result<ServiceRequest, ApiError> {
            self.store.create(&self.actor, input).await.map_err(map_store_error)
        }

        async fn list_requests(
            &self,
            filter: &RequestFilter,
        ) -> Result<Vec<ServiceRequest>, ApiError> {
            self.store.list(&self.actor, filter).await.map_err(map_store_error)
        }

        async fn get_request(&self, id: &RequestId) -> Result<ServiceRequest, ApiError> {
            self.store.get(&self.actor, id).await.map_err(map_store_error)
        }

        async fn update_request(
            &self,
            id: &RequestId,
            patch: RequestPatch,
        ) -> Result<ServiceRequest, ApiError> {
            self.store.update(&self.actor, id, patch).await.map_err(map_store_error)
        }

        async fn delete_request(&self, id: &RequestId) -> Result<(), ApiError> {
            self.store.delete(&self.actor, id).await.map_err(map_store_error)
        }

        async fn send_message(&self, id: &RequestId, body: &str) -> Result<ChatMessage, ApiError> {
            self.store.append_message(&self.actor, id, body).await.map_err(map_store_error)
        }

        async fn stats(&self) -> Result<RequestStats, ApiError> {
            self.store.stats(&self.actor).await.map_err(map_store_error)
        }
    }

    fn store_client(
        store: &Arc<RequestStore<InMemoryRequestRepository>>,
        id: &str,
        role: Role,
    ) -> SyncClient {
        let api = Arc::new(StoreBackedApi { store: Arc::clone(store), actor: Actor::new(id, role) });
        SyncClient::new(api, id)
    }

    #[tokio::test]
    async fn failed_create_degrades_to_pending_and_refresh_reconciles() {
        let api = Arc::new(ScriptedApi::default());
        api.script_create(Err(ApiError::Transport("connection refused".into()))).await;
        api.script_list(Ok(vec![server_request("r-1", "Need water")])).await;

        let client = SyncClient::new(api, "P1");
        let outcome = client.create_request(new_request("Need water")).await;

        let local_id = match outcome {
            CreateOutcome::LocalFallback { local_id, error } => {
                assert!(matches!(error, ApiError::Transport(_)));
                local_id
            }
            CreateOutcome::Committed(_) => panic!("create should have failed"),
        };

        let cached = client.cached(&local_id).await.expect("placeholder");
        assert!(cached.pending);
        assert!(client.last_error().await.is_some());

        client.refresh().await.expect("refresh");
        assert!(client.cached(&local_id).await.is_none());
        let snapshot = client.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, "r-1");
        assert!(!snapshot[0].pending);
        assert!(client.last_error().await.is_none());
    }

    #[tokio::test]
    async fn failed_refresh_serves_stale_cache() {
        let api = Arc::new(ScriptedApi::default());
        api.script_list(Ok(vec![server_request("r-1", "Need water")])).await;
        api.script_list(Err(ApiError::Transport("timeout".into()))).await;

        let client = SyncClient::new(api, "P1");
        client.refresh().await.expect("first refresh");
        let error = client.refresh().await.expect_err("second refresh fails");
        assert!(matches!(error, ApiError::Transport(_)));

        let snapshot = client.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert!(client.last_error().await.is_some());
    }

    #[tokio::test]
    async fn failed_message_leaves_the_thread_untouched() {
        let api = Arc::new(ScriptedApi::default());
        api.script_list(Ok(vec![server_request("r-1", "Need water")])).await;
        api.script_message(Err(ApiError::Transport("timeout".into()))).await;

        let client = SyncClient::new(api, "P1");
        client.refresh().await.expect("refresh");

        let error = client.send_message("r-1", "hello").await.expect_err("send fails");
        assert!(matches!(error, ApiError::Transport(_)));

        let cached = client.cached("r-1").await.expect("entry");
        assert!(cached.messages.is_empty());
    }

    #[tokio::test]
    async fn crew_message_reaches_the_passenger_after_refresh() {
        let store = Arc::new(RequestStore::new(InMemoryRequestRepository::default()));
        let passenger = store_client(&store, "P1", Role::Passenger);
        let crew = store_client(&store, "C1", Role::Crew);

        let outcome = passenger.create_request(new_request("Feeling unwell")).await;
        let id = match outcome {
            CreateOutcome::Committed(view) => view.id,
            CreateOutcome::LocalFallback { .. } => panic!("create should commit"),
        };

        crew.refresh().await.expect("crew refresh");
        crew.update_status(&id, RequestStatus::Acknowledged).await.expect("status");
        crew.send_message(&id, "Crew member on the way").await.expect("message");

        let crew_view = crew.cached(&id).await.expect("crew entry");
        assert_eq!(crew_view.status, "Acknowledged");
        assert_eq!(crew_view.messages.len(), 1);

        // The passenger still holds the pre-update snapshot.
        let stale = passenger.cached(&id).await.expect("passenger entry");
        assert_eq!(stale.status, "New");
        assert!(stale.messages.is_empty());

        passenger.refresh().await.expect("passenger refresh");
        let fresh = passenger.cached(&id).await.expect("passenger entry");
        assert_eq!(fresh.status, "Acknowledged");
        assert_eq!(fresh.messages.len(), 1);
        assert_eq!(fresh.messages[0].sender, "crew");
        assert_eq!(fresh.messages[0].body, "Crew member on the way");
    }

    #[tokio::test]
    async fn passenger_status_change_is_dropped_by_the_server() {
        let store = Arc::new(RequestStore::new(InMemoryRequestRepository::default()));
        let passenger = store_client(&store, "P1", Role::Passenger);

        let outcome = passenger.create_request(new_request("Need water")).await;
        let id = match outcome {
            CreateOutcome::Committed(view) => view.id,
            CreateOutcome::LocalFallback { .. } => panic!("create should commit"),
        };

        let view = passenger.update_status(&id, RequestStatus::Resolved).await.expect("update");
        assert_eq!(view.status, "New");
        assert!(view.resolved_at.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn poller_stops_applying_after_dispose() {
        let api = Arc::new(ScriptedApi::default());
        let client = SyncClient::new(Arc::clone(&api) as Arc<dyn RequestApi>, "P1");

        let handle = client.spawn_poller(Duration::from_secs(5));
        tokio::time::sleep(Duration::from_secs(12)).await;
        let polled = api.list_calls.load(Ordering::SeqCst);
        assert!(polled >= 2, "expected at least two polls, saw {polled}");

        handle.dispose();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(api.list_calls.load(Ordering::SeqCst), polled);
    }
}
