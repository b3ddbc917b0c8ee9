//! Orchestration around the adapters: tier gating, credit reservations,
//! generation history and expense records.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::access::{has_access, required_tier, Tier};
use crate::adapters::{self, chat, enhance, estimated_cost_usd, image, ChatRequest, EnhanceRequest, ImageRequest, TaskRequest};
use crate::app::config::AppConfig;
use crate::error::{Error, Result};
use crate::generation::awaiter::{cancel_quietly, TaskBackend};
use crate::generation::task::{Feature, GenerationTask, TaskHandle, TaskKind, TaskStatus};
use crate::providers::{BreakerSnapshot, ChatReply, ProviderClient, ReplicateBackend};
use crate::storage::{GenerationRecord, NewExpense, NewGeneration, Reservation, Storage, User};

/// Who is asking. Identified by the optional `X-User-Id` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Option<String>,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self { user_id: None }
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self { user_id: Some(id.into()) }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResult {
    pub images: Vec<image::GeneratedImage>,
    pub credit_cost: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResult {
    #[serde(flatten)]
    pub reply: ChatReply,
    pub credit_cost: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedTask {
    pub task_id: String,
    pub kind: TaskKind,
    pub model: String,
    pub status: TaskStatus,
    pub credit_cost: i64,
}

/// The authorized caller: their account (if any) and the tier gating applies to.
struct Authorized {
    user: Option<User>,
}

impl Authorized {
    fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }
}

#[derive(Clone)]
pub struct GenerationService {
    config: Arc<AppConfig>,
    openrouter: Arc<ProviderClient>,
    replicate: ReplicateBackend,
    replicate_client: Arc<ProviderClient>,
    storage: Option<Storage>,
}

impl GenerationService {
    pub fn new(config: Arc<AppConfig>, storage: Option<Storage>) -> Result<Self> {
        let openrouter = Arc::new(ProviderClient::new(
            "openrouter",
            &config.providers.openrouter,
            &config.circuit_breaker,
        )?);
        let replicate_client = Arc::new(ProviderClient::new(
            "replicate",
            &config.providers.replicate,
            &config.circuit_breaker,
        )?);

        if !openrouter.is_configured() {
            warn!("OpenRouter API key is not set; chat, enhance and image will return 503");
        }
        if !replicate_client.is_configured() {
            warn!("Replicate API token is not set; video, audio and avatar will return 503");
        }

        Ok(Self {
            replicate: ReplicateBackend::new(replicate_client.clone()),
            replicate_client,
            openrouter,
            config,
            storage,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn storage(&self) -> Result<&Storage> {
        self.storage.as_ref().ok_or(Error::StorageUnavailable)
    }

    pub fn has_storage(&self) -> bool {
        self.storage.is_some()
    }

    pub fn breakers(&self) -> Vec<BreakerSnapshot> {
        vec![self.openrouter.breaker(), self.replicate_client.breaker()]
    }

    /// Resolve the caller and apply tier gating for `model_id`.
    async fn authorize(&self, caller: &Caller, model_id: &str) -> Result<Authorized> {
        let user = match caller.user_id.as_deref() {
            None if !self.config.billing.allow_anonymous => {
                return Err(Error::unauthorized("X-User-Id header is required"));
            }
            None => None,
            Some(id) => Some(self.storage()?.users.get(id).await?.ok_or_else(|| {
                Error::unauthorized(format!("unknown user {}", id))
            })?),
        };

        if self.config.access.enforce_tier_gating {
            let tier = user.as_ref().map(|u| u.plan).unwrap_or(Tier::Start);
            let required = required_tier(model_id);
            if !has_access(tier, required) {
                info!("Denied {} to tier {} (needs {})", model_id, tier, required);
                return Err(Error::TierRequired { model: model_id.to_string(), required });
            }
        }

        Ok(Authorized { user })
    }

    async fn reserve(&self, auth: &Authorized, amount: i64) -> Result<Option<Reservation>> {
        match (auth.user_id(), amount) {
            (Some(user_id), amount) if amount > 0 => {
                Ok(Some(self.storage()?.ledger.reserve(user_id, amount).await?))
            }
            _ => Ok(None),
        }
    }

    async fn release(&self, reservation: Option<&Reservation>) {
        let (Some(reservation), Some(storage)) = (reservation, self.storage.as_ref()) else {
            return;
        };
        if let Err(e) = storage.ledger.release(&reservation.id).await {
            error!("Failed to release reservation {}: {}", reservation.id, e);
        }
    }

    /// Confirm a sync reservation and write history. Bookkeeping failures are
    /// logged; the caller already has their result.
    #[allow(clippy::too_many_arguments)]
    async fn settle_sync(
        &self,
        auth: &Authorized,
        reservation: Option<&Reservation>,
        feature: Feature,
        provider: &str,
        model: &str,
        prompt: &str,
        output: &[String],
        credits: i64,
    ) -> Option<i64> {
        let storage = self.storage.as_ref()?;

        if let Some(reservation) = reservation {
            if let Err(e) = storage.ledger.confirm(&reservation.id).await {
                error!("Failed to confirm reservation {}: {}", reservation.id, e);
            }
        }

        let record = NewGeneration {
            user_id: auth.user_id(),
            feature,
            model,
            prompt,
            task_id: None,
            status: TaskStatus::Completed,
            output,
            credit_cost: credits,
        };
        if let Err(e) = storage.generations.insert(&record).await {
            error!("Failed to record {} generation: {}", feature, e);
        }
        self.record_expense(auth.user_id(), provider, model, feature, credits).await;

        match auth.user_id() {
            Some(user_id) => storage.ledger.balance(user_id).await.ok(),
            None => None,
        }
    }

    async fn record_expense(&self, user_id: Option<&str>, provider: &str, model: &str, feature: Feature, credits: i64) {
        let Some(storage) = self.storage.as_ref() else {
            return;
        };
        let expense = NewExpense {
            user_id,
            provider,
            model,
            feature,
            credits,
            cost_usd: estimated_cost_usd(feature, credits),
        };
        if let Err(e) = storage.expenses.record(&expense).await {
            warn!("Failed to record expense: {}", e);
        }
    }

    pub async fn chat(&self, caller: &Caller, request: &ChatRequest) -> Result<ChatResult> {
        request.validate()?;
        let model = request.model();
        let auth = self.authorize(caller, &model.id).await?;

        let conversation_id = match request.conversation_id.as_deref() {
            Some(id) => {
                let conversation = self
                    .storage()?
                    .conversations
                    .get(id)
                    .await?
                    .filter(|c| c.is_owned_by(auth.user_id()))
                    .ok_or_else(|| Error::not_found(format!("conversation {}", id)))?;
                Some(conversation.id)
            }
            None => None,
        };

        let credits = request.credit_cost();
        let reservation = self.reserve(&auth, credits).await?;

        let reply = match chat::complete(&self.openrouter, request).await {
            Ok(reply) => reply,
            Err(e) => {
                self.release(reservation.as_ref()).await;
                return Err(e);
            }
        };

        let summary = request.summary();
        if let (Some(id), Some(storage)) = (conversation_id.as_deref(), self.storage.as_ref()) {
            for (role, content) in [("user", summary.as_str()), ("assistant", reply.content.as_str())] {
                if let Err(e) = storage.conversations.add_message(id, role, content).await {
                    error!("Failed to store {} message in {}: {}", role, id, e);
                }
            }
        }

        self.settle_sync(
            &auth,
            reservation.as_ref(),
            Feature::Chat,
            self.openrouter.name(),
            &model.id,
            &summary,
            &[],
            credits,
        )
        .await;

        Ok(ChatResult { reply, credit_cost: credits, conversation_id })
    }

    pub async fn enhance(&self, caller: &Caller, request: &EnhanceRequest) -> Result<enhance::EnhancedPrompt> {
        request.validate()?;
        let model = request.model();
        let auth = self.authorize(caller, &model.id).await?;

        let enhanced = enhance::enhance(&self.openrouter, request).await?;
        self.record_expense(auth.user_id(), self.openrouter.name(), &model.id, Feature::Enhance, 0)
            .await;
        Ok(enhanced)
    }

    pub async fn image(&self, caller: &Caller, request: &ImageRequest) -> Result<ImageResult> {
        request.validate()?;
        let model = request.model();
        let auth = self.authorize(caller, &model.id).await?;

        let credits = request.credit_cost();
        let reservation = self.reserve(&auth, credits).await?;

        let timeout = Duration::from_secs(self.config.providers.openrouter.image_timeout_seconds);
        let images = match image::generate(&self.openrouter, request, timeout).await {
            Ok(images) => images,
            Err(e) => {
                self.release(reservation.as_ref()).await;
                return Err(e);
            }
        };

        let urls: Vec<String> = images.iter().map(|i| i.url.clone()).collect();
        let balance = self
            .settle_sync(
                &auth,
                reservation.as_ref(),
                Feature::Image,
                self.openrouter.name(),
                &model.id,
                request.prompt(),
                &urls,
                credits,
            )
            .await;

        Ok(ImageResult { images, credit_cost: credits, balance })
    }

    /// Submit an async generation. Credits stay reserved until the task ends.
    pub async fn submit<R: TaskRequest>(&self, caller: &Caller, request: &R) -> Result<SubmittedTask> {
        request.validate()?;
        let model = request.model();
        let auth = self.authorize(caller, &model.id).await?;

        let credits = request.credit_cost();
        let reservation = self.reserve(&auth, credits).await?;

        let task = match adapters::submit(&self.replicate, request).await {
            Ok(task) => task,
            Err(e) => {
                self.release(reservation.as_ref()).await;
                return Err(e);
            }
        };
        info!("Submitted {} task {} on {}", R::KIND, task.id, model.backend);

        if let Some(storage) = self.storage.as_ref() {
            if let Some(reservation) = reservation.as_ref() {
                if let Err(e) = storage.ledger.attach_task(&reservation.id, &task.id).await {
                    error!("Failed to attach reservation {} to {}: {}", reservation.id, task.id, e);
                }
            }
            let summary = request.summary();
            let record = NewGeneration {
                user_id: auth.user_id(),
                feature: R::KIND.into(),
                model: &model.id,
                prompt: &summary,
                task_id: Some(&task.id),
                status: TaskStatus::Starting,
                output: &[],
                credit_cost: credits,
            };
            if let Err(e) = storage.generations.insert(&record).await {
                error!("Failed to record task {}: {}", task.id, e);
            }
            if task.status != TaskStatus::Starting {
                self.apply_snapshot(&task).await;
            }
        }

        Ok(SubmittedTask {
            task_id: task.id,
            kind: R::KIND,
            model: model.id,
            status: task.status,
            credit_cost: credits,
        })
    }

    /// Look up the stored record and check the caller may see it. With
    /// storage configured, ids this service never issued are not found.
    async fn owned_record(&self, caller: &Caller, handle: &TaskHandle) -> Result<Option<GenerationRecord>> {
        let Some(storage) = self.storage.as_ref() else {
            return Ok(None);
        };
        match storage.generations.get_by_task(&handle.id).await? {
            Some(record)
                if record.feature == Feature::from(handle.kind)
                    && (record.user_id.is_none() || record.user_id == caller.user_id) =>
            {
                Ok(Some(record))
            }
            _ => Err(Error::not_found(format!("{} task {}", handle.kind, handle.id))),
        }
    }

    /// One status read. Terminal tasks with a stored record are answered from
    /// storage without contacting the provider.
    pub async fn status(&self, caller: &Caller, kind: TaskKind, task_id: &str) -> Result<GenerationTask> {
        let handle = TaskHandle::parse(task_id, kind)?;
        if let Some(record) = self.owned_record(caller, &handle).await? {
            if record.status.is_terminal() {
                debug!("Task {} already {}, answering from storage", task_id, record.status);
                return Ok(task_from_record(kind, task_id, &record));
            }
        }

        let snapshot = self.replicate.poll(&handle).await?;
        Ok(self.apply_snapshot(&snapshot).await)
    }

    /// Store a polled snapshot and settle credits when it is terminal. Returns
    /// the snapshot as the caller should see it.
    async fn apply_snapshot(&self, snapshot: &GenerationTask) -> GenerationTask {
        let mut task = snapshot.clone();
        if task.status == TaskStatus::Completed && task.output.is_empty() {
            warn!("Task {} completed without output, treating as failed", task.id);
            task.status = TaskStatus::Failed;
            task.error = Some("generation completed without output".to_string());
        }

        let Some(storage) = self.storage.as_ref() else {
            return task;
        };

        let transitioned = match storage
            .generations
            .update_status(&task.id, task.status, &task.output, task.error.as_deref())
            .await
        {
            Ok(changed) => changed,
            Err(e) => {
                error!("Failed to store status of task {}: {}", task.id, e);
                false
            }
        };

        // Only the poll that moved the record settles the ledger.
        if transitioned && task.status.is_terminal() {
            self.settle_task(&task).await;
        }
        task
    }

    async fn settle_task(&self, task: &GenerationTask) {
        let Some(storage) = self.storage.as_ref() else {
            return;
        };

        let result = match task.status {
            TaskStatus::Completed => storage.ledger.confirm_task(&task.id).await,
            _ => storage.ledger.release_task(&task.id).await,
        };
        if let Err(e) = result {
            error!("Failed to settle credits for task {}: {}", task.id, e);
        }

        if task.status == TaskStatus::Completed {
            if let Ok(Some(record)) = storage.generations.get_by_task(&task.id).await {
                self.record_expense(
                    record.user_id.as_deref(),
                    self.replicate_client.name(),
                    &record.model,
                    record.feature,
                    record.credit_cost,
                )
                .await;
            }
        }
    }

    /// Best-effort cancel. Held credits are returned even if the provider
    /// never hears about it.
    pub async fn cancel(&self, caller: &Caller, kind: TaskKind, task_id: &str) -> Result<GenerationTask> {
        let handle = TaskHandle::parse(task_id, kind)?;
        let record = self.owned_record(caller, &handle).await?;
        if let Some(record) = record.as_ref().filter(|r| r.status.is_terminal()) {
            return Ok(task_from_record(kind, task_id, record));
        }

        cancel_quietly(&self.replicate, &handle).await;

        let now = chrono::Utc::now();
        let canceled = GenerationTask {
            id: task_id.to_string(),
            kind,
            status: TaskStatus::Canceled,
            output: Vec::new(),
            error: None,
            created_at: record.as_ref().map(|r| r.created_at).unwrap_or(now),
            updated_at: now,
        };
        Ok(self.apply_snapshot(&canceled).await)
    }

    pub async fn history(&self, caller: &Caller, limit: Option<i64>, offset: Option<i64>) -> Result<Vec<GenerationRecord>> {
        let user_id = caller
            .user_id
            .as_deref()
            .ok_or_else(|| Error::unauthorized("X-User-Id header is required"))?;
        self.storage()?.generations.list_for_user(user_id, limit, offset).await
    }
}

fn task_from_record(kind: TaskKind, task_id: &str, record: &GenerationRecord) -> GenerationTask {
    GenerationTask {
        id: task_id.to_string(),
        kind,
        status: record.status,
        output: record.output.clone(),
        error: record.error.clone(),
        created_at: record.created_at,
        updated_at: record.updated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::VideoRequest;
    use crate::storage::database::test_support::create_test_database;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(uri: &str, gating: bool) -> Arc<AppConfig> {
        let mut config = AppConfig::default();
        for provider in [&mut config.providers.openrouter, &mut config.providers.replicate] {
            provider.base_url = uri.to_string();
            provider.api_key = Some("test-key".to_string());
        }
        config.access.enforce_tier_gating = gating;
        Arc::new(config)
    }

    async fn service(uri: &str, gating: bool) -> (GenerationService, Storage, TempDir) {
        let (db, dir) = create_test_database().await;
        let storage = Storage::new(db);
        let service = GenerationService::new(config(uri, gating), Some(storage.clone())).unwrap();
        (service, storage, dir)
    }

    fn video(prompt: &str, model: Option<&str>) -> VideoRequest {
        serde_json::from_value(json!({ "prompt": prompt, "model": model })).unwrap()
    }

    async fn mount_create(server: &MockServer, id: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/models/kwaivgi/kling-v2.1/predictions"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": id, "status": "starting" })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_terminal_status_is_served_from_storage() {
        let server = MockServer::start().await;
        mount_create(&server, "pred-1").await;
        Mock::given(method("GET"))
            .and(path("/v1/predictions/pred-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "pred-1", "status": "succeeded", "output": "https://cdn/v.mp4"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (service, storage, _dir) = service(&server.uri(), false).await;
        let user = storage.users.create("poll@test.io", None, 30).await.unwrap();
        let caller = Caller::user(&user.id);

        let submitted = service.submit(&caller, &video("waves", None)).await.unwrap();
        assert_eq!(submitted.credit_cost, 10);
        assert_eq!(storage.ledger.balance(&user.id).await.unwrap(), 20);

        let first = service.status(&caller, TaskKind::Video, "pred-1").await.unwrap();
        let second = service.status(&caller, TaskKind::Video, "pred-1").await.unwrap();
        assert_eq!(first.status, TaskStatus::Completed);
        assert_eq!(second.status, first.status);
        assert_eq!(second.output, vec!["https://cdn/v.mp4"]);

        assert_eq!(storage.ledger.balance(&user.id).await.unwrap(), 20);
        assert_eq!(storage.expenses.summary(None).await.unwrap()[0].credits, 10);
    }

    #[tokio::test]
    async fn test_failed_task_refunds_once() {
        let server = MockServer::start().await;
        mount_create(&server, "pred-2").await;
        Mock::given(method("GET"))
            .and(path("/v1/predictions/pred-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "pred-2", "status": "failed", "error": "NSFW"
            })))
            .mount(&server)
            .await;

        let (service, storage, _dir) = service(&server.uri(), false).await;
        let user = storage.users.create("refund@test.io", None, 10).await.unwrap();
        let caller = Caller::user(&user.id);

        service.submit(&caller, &video("waves", None)).await.unwrap();
        assert_eq!(storage.ledger.balance(&user.id).await.unwrap(), 0);

        for _ in 0..3 {
            let task = service.status(&caller, TaskKind::Video, "pred-2").await.unwrap();
            assert_eq!(task.status, TaskStatus::Failed);
            assert_eq!(task.error.as_deref(), Some("NSFW"));
        }
        assert_eq!(storage.ledger.balance(&user.id).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_gating_and_credits_checked_before_provider() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(201)).expect(0).mount(&server).await;

        let (service, storage, _dir) = service(&server.uri(), true).await;
        let user = storage.users.create("gate@test.io", None, 5).await.unwrap();
        let caller = Caller::user(&user.id);

        let err = service.submit(&caller, &video("waves", Some("veo-3"))).await.unwrap_err();
        assert!(matches!(err, Error::TierRequired { required: Tier::Maximal, .. }));

        let err = service.submit(&caller, &video("waves", Some("unreleased-model"))).await.unwrap_err();
        assert!(matches!(err, Error::TierRequired { required: Tier::Maximal, .. }));

        storage.users.set_plan(&user.id, Tier::ProStudio).await.unwrap();
        let err = service.submit(&caller, &video("waves", Some("kling-v2"))).await.unwrap_err();
        assert!(matches!(err, Error::InsufficientCredits { required: 10, available: 5 }));
    }

    #[tokio::test]
    async fn test_anonymous_policy() {
        let server = MockServer::start().await;
        let mut config = (*config(&server.uri(), false)).clone();
        config.billing.allow_anonymous = false;
        let service = GenerationService::new(Arc::new(config), None).unwrap();

        let err = service.submit(&Caller::anonymous(), &video("waves", None)).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));

        let err = service.submit(&Caller::user("u1"), &video("waves", None)).await.unwrap_err();
        assert!(matches!(err, Error::StorageUnavailable));
    }

    #[tokio::test]
    async fn test_cancel_releases_credits_even_if_provider_refuses() {
        let server = MockServer::start().await;
        mount_create(&server, "pred-3").await;
        Mock::given(method("POST"))
            .and(path("/v1/predictions/pred-3/cancel"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let (service, storage, _dir) = service(&server.uri(), false).await;
        let user = storage.users.create("cancel@test.io", None, 10).await.unwrap();
        let caller = Caller::user(&user.id);

        service.submit(&caller, &video("waves", None)).await.unwrap();
        let task = service.cancel(&caller, TaskKind::Video, "pred-3").await.unwrap();
        assert_eq!(task.status, TaskStatus::Canceled);
        assert_eq!(storage.ledger.balance(&user.id).await.unwrap(), 10);

        // Already canceled: answered from storage, no second cancel call.
        let again = service.cancel(&caller, TaskKind::Video, "pred-3").await.unwrap();
        assert_eq!(again.status, TaskStatus::Canceled);
    }

    #[tokio::test]
    async fn test_other_users_tasks_are_hidden() {
        let server = MockServer::start().await;
        mount_create(&server, "pred-4").await;

        let (service, storage, _dir) = service(&server.uri(), false).await;
        let owner = storage.users.create("owner@test.io", None, 10).await.unwrap();
        let other = storage.users.create("other@test.io", None, 10).await.unwrap();

        service.submit(&Caller::user(&owner.id), &video("waves", None)).await.unwrap();
        let err = service
            .status(&Caller::user(&other.id), TaskKind::Video, "pred-4")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(service.status(&Caller::user(&owner.id), TaskKind::Audio, "pred-4").await.is_err());
    }

    #[tokio::test]
    async fn test_task_ids_never_reach_provider_paths_unchecked() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "x", "status": "starting" })))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "x", "status": "processing" })))
            .expect(0)
            .mount(&server)
            .await;

        let (service, _storage, _dir) = service(&server.uri(), false).await;
        let anonymous = Caller::anonymous();

        let injected = "../models/acme/pricey/predictions?x=";
        let err = service.cancel(&anonymous, TaskKind::Video, injected).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        let err = service.status(&anonymous, TaskKind::Video, injected).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // Well-formed, but never issued here.
        let err = service.status(&anonymous, TaskKind::Video, "someone-elses-pred").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        let err = service.cancel(&anonymous, TaskKind::Video, "someone-elses-pred").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }
}
