//! The threat-intelligence repository as seen by the share service.

use std::sync::Arc;

use async_trait::async_trait;
use misp_client::{EventReport, ExportFormat, Exported, MispClient, MispError, MispEvent, MispObject};
use uuid::Uuid;

type Result<T> = std::result::Result<T, MispError>;

/// Operations the core needs from the record store. Implemented by
/// `MispClient`; `testing::MemoryRepository` stands in for it in tests.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Persist a new record. The returned event carries its identity.
    async fn create(&self, event: &MispEvent) -> Result<MispEvent>;

    async fn update(&self, id: Uuid, event: &MispEvent) -> Result<MispEvent>;

    async fn get(&self, id: Uuid) -> Result<MispEvent>;

    /// Attach a freeform report. Returns the report's identity.
    async fn attach_report(&self, id: Uuid, report: &EventReport) -> Result<Uuid>;

    async fn add_object(&self, id: Uuid, object: &MispObject) -> Result<MispObject>;

    /// Run entity extraction over a stored report.
    async fn extract_entities(&self, report_id: Uuid) -> Result<()>;

    async fn fetch(&self, id: Uuid, format: ExportFormat) -> Result<Exported>;
}

#[async_trait]
impl Repository for MispClient {
    async fn create(&self, event: &MispEvent) -> Result<MispEvent> {
        let saved = self.add_event(event).await?;
        if saved.uuid.is_none() {
            return Err(MispError::Rejected("stored event has no uuid".into()));
        }
        Ok(saved)
    }

    async fn update(&self, id: Uuid, event: &MispEvent) -> Result<MispEvent> {
        self.update_event(id, event).await
    }

    async fn get(&self, id: Uuid) -> Result<MispEvent> {
        self.get_event(id).await
    }

    async fn attach_report(&self, id: Uuid, report: &EventReport) -> Result<Uuid> {
        let stored = self.add_event_report(id, report).await?;
        stored
            .uuid
            .ok_or_else(|| MispError::Rejected("stored report has no uuid".into()))
    }

    async fn add_object(&self, id: Uuid, object: &MispObject) -> Result<MispObject> {
        MispClient::add_object(self, id, object).await
    }

    async fn extract_entities(&self, report_id: Uuid) -> Result<()> {
        self.extract_all_from_report(report_id).await?;
        Ok(())
    }

    async fn fetch(&self, id: Uuid, format: ExportFormat) -> Result<Exported> {
        self.search_event(id, format).await
    }
}

#[async_trait]
impl<R: Repository + ?Sized> Repository for Arc<R> {
    async fn create(&self, event: &MispEvent) -> Result<MispEvent> {
        (**self).create(event).await
    }

    async fn update(&self, id: Uuid, event: &MispEvent) -> Result<MispEvent> {
        (**self).update(id, event).await
    }

    async fn get(&self, id: Uuid) -> Result<MispEvent> {
        (**self).get(id).await
    }

    async fn attach_report(&self, id: Uuid, report: &EventReport) -> Result<Uuid> {
        (**self).attach_report(id, report).await
    }

    async fn add_object(&self, id: Uuid, object: &MispObject) -> Result<MispObject> {
        (**self).add_object(id, object).await
    }

    async fn extract_entities(&self, report_id: Uuid) -> Result<()> {
        (**self).extract_entities(report_id).await
    }

    async fn fetch(&self, id: Uuid, format: ExportFormat) -> Result<Exported> {
        (**self).fetch(id, format).await
    }
}
