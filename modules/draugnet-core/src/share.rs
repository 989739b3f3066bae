//! Submission orchestration.
//!
//! A request succeeds once its record is persisted and its token issued or
//! touched. Module fan-out runs afterwards and only adds to the receipt.

use std::sync::Arc;

use misp_client::{ExportFormat, Exported, MispEvent};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{DraugnetError, Result};
use crate::modules::{ActionType, Dispatcher, ModuleReport};
use crate::normalize::{self, Action, NormalizeError, ObjectRequest, OptionalFields, Submission, SubmissionContext};
use crate::repository::Repository;
use crate::templates::{TemplateError, TemplateRegistry};
use crate::tokens::TokenService;

/// Everything the share service talks to.
#[derive(Clone)]
pub struct ShareDeps {
    pub repository: Arc<dyn Repository>,
    pub tokens: TokenService,
    pub dispatcher: Dispatcher,
    pub templates: Arc<TemplateRegistry>,
}

/// Response to a successful share.
#[derive(Debug, Clone, Serialize)]
pub struct ShareReceipt {
    pub token: String,
    pub record_id: Uuid,
    /// Same value as `record_id`, kept for existing clients.
    pub event_uuid: Uuid,
    pub status: &'static str,
    pub modules: Vec<ModuleReport>,
}

impl ShareReceipt {
    fn new(token: String, record_id: Uuid, modules: Vec<ModuleReport>) -> Self {
        Self {
            token,
            record_id,
            event_uuid: record_id,
            status: "ok",
            modules,
        }
    }
}

/// A supplied token and the record it resolved to.
#[derive(Debug, Clone, Copy)]
struct Target<'a> {
    token: &'a str,
    record_id: Uuid,
}

#[derive(Clone)]
pub struct ShareService {
    deps: ShareDeps,
}

impl ShareService {
    pub fn new(deps: ShareDeps) -> Self {
        Self { deps }
    }

    pub fn deps(&self) -> &ShareDeps {
        &self.deps
    }

    /// Resolve an optional token. A supplied token that resolves to nothing
    /// is an error, never a silent create.
    async fn target<'a>(&self, token: Option<&'a str>) -> Result<Option<Target<'a>>> {
        let Some(token) = token else {
            return Ok(None);
        };
        match self.deps.tokens.resolve(token).await? {
            Some(record_id) => Ok(Some(Target { token, record_id })),
            None => Err(DraugnetError::NotFound("Invalid token.".into())),
        }
    }

    // --- share ---

    /// Structured-record submission.
    pub async fn share_event(&self, body: &Value, token: Option<&str>) -> Result<ShareReceipt> {
        let target = self.target(token).await?;
        let submission = normalize::structured_record(body, target.map(|t| t.record_id))?;
        self.complete(submission, target).await
    }

    /// Freetext submission. The text must not be blank.
    pub async fn share_freetext(
        &self,
        text: &str,
        optional: OptionalFields,
        token: Option<&str>,
    ) -> Result<ShareReceipt> {
        let target = self.target(token).await?;
        let submission = normalize::freetext(text, optional, target.map(|t| t.record_id))?;
        self.complete(submission, target).await
    }

    /// Single-object submission built against a local template.
    pub async fn share_object(&self, body: &Value, token: Option<&str>) -> Result<ShareReceipt> {
        let request = ObjectRequest::from_value(body)?;
        normalize::validate_template_name(&request.template_name)?;
        let target = self.target(token).await?;

        let template = match self.deps.templates.load(&request.template_name).await {
            Ok(template) => template,
            Err(TemplateError::NotFound(name)) => {
                return Err(NormalizeError::ObjectBuild {
                    stage: "Creating MISP object".into(),
                    reason: format!("unknown template {name}"),
                }
                .into())
            }
            Err(e) => return Err(e.into()),
        };

        let submission = normalize::structured_object(
            &template,
            &request.data,
            request.optional,
            target.map(|t| t.record_id),
        )?;
        self.complete(submission, target).await
    }

    async fn complete(&self, submission: Submission, target: Option<Target<'_>>) -> Result<ShareReceipt> {
        match (submission.action, target) {
            (Action::Create, _) => self.create(submission).await,
            (Action::Update(_), Some(target)) => self.update(submission, target).await,
            (Action::Update(_), None) => Err(DraugnetError::Upstream(
                "update requested without a token".into(),
            )),
        }
    }

    async fn create(&self, submission: Submission) -> Result<ShareReceipt> {
        let repo = &self.deps.repository;
        let saved = repo.create(&submission.event).await?;
        let record_id = saved
            .uuid
            .ok_or_else(|| DraugnetError::Upstream("repository returned no record id".into()))?;
        tracing::info!(record_id = %record_id, context = %submission.context, "Record created");

        // No token exists yet, so every failure here is the caller's failure.
        for report in &submission.reports {
            let report_id = repo.attach_report(record_id, report).await?;
            repo.extract_entities(report_id).await?;
        }

        let token = self.deps.tokens.issue(record_id).await?;

        let modules = self
            .deps
            .dispatcher
            .run(
                ActionType::Create,
                submission.context,
                &token,
                &saved,
                &submission.reports,
            )
            .await;

        Ok(ShareReceipt::new(token, record_id, modules))
    }

    async fn update(&self, submission: Submission, target: Target<'_>) -> Result<ShareReceipt> {
        let repo = &self.deps.repository;
        let record_id = target.record_id;

        let current = match submission.context {
            SubmissionContext::Misp => repo.update(record_id, &submission.event).await?,
            SubmissionContext::Freetext | SubmissionContext::Objects => {
                let mut current = self.apply_optional(record_id, &submission.optional).await?;
                for object in &submission.event.objects {
                    let stored = repo.add_object(record_id, object).await?;
                    current.add_object(stored);
                }
                for report in &submission.reports {
                    let report_id = repo.attach_report(record_id, report).await?;
                    if let Err(e) = repo.extract_entities(report_id).await {
                        tracing::warn!(record_id = %record_id, error = %e, "Entity extraction failed");
                    }
                }
                current
            }
        };
        tracing::info!(record_id = %record_id, context = %submission.context, "Record updated");

        self.deps.tokens.touch(target.token).await?;

        let modules = self
            .deps
            .dispatcher
            .run(
                ActionType::Update,
                submission.context,
                target.token,
                &current,
                &submission.reports,
            )
            .await;

        Ok(ShareReceipt::new(target.token.to_string(), record_id, modules))
    }

    /// Fetch the record and, when there is anything to apply, write the
    /// augmented version back.
    async fn apply_optional(&self, record_id: Uuid, optional: &OptionalFields) -> Result<MispEvent> {
        let repo = &self.deps.repository;
        let mut current = repo.get(record_id).await?;
        if optional.is_empty() {
            return Ok(current);
        }
        optional.apply(&mut current);
        Ok(repo.update(record_id, &current).await?)
    }

    // --- read ---

    pub async fn retrieve(&self, token: &str, format: ExportFormat) -> Result<Exported> {
        let record_id = self
            .deps
            .tokens
            .resolve(token)
            .await?
            .ok_or_else(|| DraugnetError::NotFound("Could not retrieve the token.".into()))?;
        Ok(self.deps.repository.fetch(record_id, format).await?)
    }

    pub async fn last_touch(&self, token: &str) -> Result<i64> {
        self.deps
            .tokens
            .last_touch(token)
            .await?
            .ok_or_else(|| DraugnetError::NotFound("Token not found.".into()))
    }

    pub async fn list_templates(&self) -> Result<Vec<String>> {
        Ok(self.deps.templates.list().await?)
    }

    pub async fn template_definition(&self, name: &str) -> Result<Value> {
        Ok(self.deps.templates.definition(name).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::{ExternalId, ModuleOutcome, ModuleRegistry, ReportItem, ReportingModule};
    use crate::testing::{MemoryRepository, RepositoryCall};
    use crate::store::MemoryStore;
    use crate::templates::fixtures::{write_template, DOMAIN_IP};
    use crate::tokens::ModuleMappings;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Ticketing {
        contexts: Mutex<Vec<(ActionType, SubmissionContext, usize)>>,
    }

    #[async_trait]
    impl ReportingModule for Ticketing {
        fn name(&self) -> &str {
            "ticketing"
        }

        async fn create_item(&self, item: &ReportItem<'_>) -> anyhow::Result<ExternalId> {
            self.contexts
                .lock()
                .unwrap()
                .push((ActionType::Create, item.context, item.reports.len()));
            Ok("T-1".into())
        }

        async fn update_item(&self, _external_id: &str, item: &ReportItem<'_>) -> anyhow::Result<()> {
            self.contexts
                .lock()
                .unwrap()
                .push((ActionType::Update, item.context, item.reports.len()));
            Ok(())
        }
    }

    struct Harness {
        service: ShareService,
        repo: Arc<MemoryRepository>,
        store: Arc<MemoryStore>,
        ticketing: Arc<Ticketing>,
        _templates: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let repo = Arc::new(MemoryRepository::new());
        let store = Arc::new(MemoryStore::new());
        let ticketing = Arc::new(Ticketing::default());
        let dir = tempfile::tempdir().unwrap();
        write_template(dir.path(), "domain-ip", DOMAIN_IP);

        let registry = ModuleRegistry::from_modules(vec![ticketing.clone()], vec![]);
        let deps = ShareDeps {
            repository: repo.clone(),
            tokens: TokenService::new(store.clone()),
            dispatcher: Dispatcher::new(Arc::new(registry), ModuleMappings::new(store.clone())),
            templates: Arc::new(TemplateRegistry::new(dir.path(), vec![])),
        };

        Harness {
            service: ShareService::new(deps),
            repo,
            store,
            ticketing,
            _templates: dir,
        }
    }

    // --- create ---

    #[tokio::test]
    async fn freetext_create_issues_token_and_dispatches() {
        let h = harness();
        let receipt = h
            .service
            .share_freetext("phishing campaign", OptionalFields::default(), None)
            .await
            .unwrap();

        assert_eq!(receipt.token.len(), 32);
        assert_eq!(receipt.status, "ok");
        assert_eq!(receipt.record_id, receipt.event_uuid);
        assert_eq!(
            h.service.deps().tokens.resolve(&receipt.token).await.unwrap(),
            Some(receipt.record_id)
        );

        let stored = h.repo.event(receipt.record_id).unwrap();
        assert_eq!(stored.event_reports[0].content, "phishing campaign");
        assert!(matches!(h.repo.calls()[2], RepositoryCall::ExtractEntities(_)));

        assert_eq!(
            receipt.modules[0].outcome,
            ModuleOutcome::Created {
                external_id: "T-1".into()
            }
        );
        assert_eq!(
            h.ticketing.contexts.lock().unwrap()[0],
            (ActionType::Create, SubmissionContext::Freetext, 1)
        );
    }

    #[tokio::test]
    async fn extraction_failure_before_token_fails_the_request() {
        let h = harness();
        h.repo.fail_extraction();

        let result = h
            .service
            .share_freetext("phishing campaign", OptionalFields::default(), None)
            .await;

        assert!(matches!(result, Err(DraugnetError::Upstream(_))));
        assert!(h.store.is_empty(), "no token issued");
        assert!(h.ticketing.contexts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn structured_record_create() {
        let h = harness();
        let receipt = h
            .service
            .share_event(&json!({"Event": {"info": "C2 beacon"}}), None)
            .await
            .unwrap();
        assert_eq!(h.repo.event(receipt.record_id).unwrap().info, "C2 beacon");
    }

    #[tokio::test]
    async fn object_create_embeds_object() {
        let h = harness();
        let body = json!({"template_name": "domain-ip", "data": {"domain": "evil.example"}});
        let receipt = h.service.share_object(&body, None).await.unwrap();
        let stored = h.repo.event(receipt.record_id).unwrap();
        assert_eq!(stored.objects[0].name, "domain-ip");
    }

    #[tokio::test]
    async fn unknown_template_is_object_build_failure_without_token() {
        let h = harness();
        let body = json!({"template_name": "no-such-template", "data": {"x": "y"}});
        let err = h.service.share_object(&body, None).await.unwrap_err();

        assert!(matches!(err, DraugnetError::ObjectBuild(_)));
        assert!(h.repo.calls().is_empty());
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn invalid_template_name_is_validation_error() {
        let h = harness();
        let body = json!({"template_name": "../etc", "data": {}});
        let err = h.service.share_object(&body, None).await.unwrap_err();
        assert!(matches!(err, DraugnetError::Validation(_)));
    }

    // --- update ---

    #[tokio::test]
    async fn unknown_token_is_not_found_without_repository_call() {
        let h = harness();
        let err = h
            .service
            .share_freetext("more", OptionalFields::default(), Some("nope"))
            .await
            .unwrap_err();

        assert!(matches!(err, DraugnetError::NotFound(_)));
        assert!(h.repo.calls().is_empty());
    }

    #[tokio::test]
    async fn freetext_update_attaches_and_tolerates_extraction_failure() {
        let h = harness();
        let first = h
            .service
            .share_freetext("first", OptionalFields::default(), None)
            .await
            .unwrap();
        h.repo.fail_extraction();

        let second = h
            .service
            .share_freetext("second", OptionalFields::default(), Some(&first.token))
            .await
            .unwrap();

        assert_eq!(second.token, first.token);
        assert_eq!(second.record_id, first.record_id);
        let stored = h.repo.event(first.record_id).unwrap();
        assert_eq!(stored.event_reports.len(), 2);
        assert_eq!(
            second.modules[0].outcome,
            ModuleOutcome::Updated {
                external_id: "T-1".into()
            }
        );
    }

    #[tokio::test]
    async fn structured_update_replaces_record_and_touches() {
        let h = harness();
        let first = h
            .service
            .share_event(&json!({"info": "v1"}), None)
            .await
            .unwrap();

        h.service
            .share_event(&json!({"event": {"info": "v2"}}), Some(&first.token))
            .await
            .unwrap();

        assert_eq!(h.repo.event(first.record_id).unwrap().info, "v2");
        assert!(h.service.last_touch(&first.token).await.is_ok());
        assert!(h.repo.calls().contains(&RepositoryCall::Update(first.record_id)));
    }

    #[tokio::test]
    async fn object_update_adds_object_and_applies_optional() {
        let h = harness();
        let first = h
            .service
            .share_event(&json!({"info": "base"}), None)
            .await
            .unwrap();

        let body = json!({
            "template_name": "domain-ip",
            "data": {"ip": ["198.51.100.7"]},
            "optional": {"tlp": "tlp:red"}
        });
        h.service.share_object(&body, Some(&first.token)).await.unwrap();

        let stored = h.repo.event(first.record_id).unwrap();
        assert_eq!(stored.objects.len(), 1);
        assert!(stored.tag_names().any(|t| t == "tlp:red"));
    }

    // --- read ---

    #[tokio::test]
    async fn retrieve_and_timestamp_need_known_tokens() {
        let h = harness();
        assert!(matches!(
            h.service.retrieve("nope", ExportFormat::Json).await,
            Err(DraugnetError::NotFound(_))
        ));
        assert!(matches!(
            h.service.last_touch("nope").await,
            Err(DraugnetError::NotFound(_))
        ));

        let receipt = h
            .service
            .share_event(&json!({"info": "x"}), None)
            .await
            .unwrap();
        let exported = h
            .service
            .retrieve(&receipt.token, ExportFormat::Csv)
            .await
            .unwrap();
        assert!(matches!(exported, Exported::Text(_)));
    }
}
