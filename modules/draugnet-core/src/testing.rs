//! Test doubles for the share service. Compiled for this crate's tests and
//! for dependents that enable the `test-support` feature.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use misp_client::{EventReport, ExportFormat, Exported, MispError, MispEvent, MispObject};
use serde_json::Value;
use uuid::Uuid;

use crate::repository::Repository;

type Result<T> = std::result::Result<T, MispError>;

/// One call made against a `MemoryRepository`, for test assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum RepositoryCall {
    Create,
    Update(Uuid),
    Get(Uuid),
    AttachReport(Uuid),
    AddObject(Uuid),
    ExtractEntities(Uuid),
    Fetch(Uuid, ExportFormat),
}

/// In-memory repository. Assigns fresh UUIDs and keeps every stored event.
#[derive(Default)]
pub struct MemoryRepository {
    events: Mutex<HashMap<Uuid, MispEvent>>,
    calls: Mutex<Vec<RepositoryCall>>,
    fail_extraction: AtomicBool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `extract_entities` call fail.
    pub fn fail_extraction(&self) {
        self.fail_extraction.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<RepositoryCall> {
        self.calls_guard().clone()
    }

    pub fn event(&self, id: Uuid) -> Option<MispEvent> {
        self.events().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.events().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn events(&self) -> MutexGuard<'_, HashMap<Uuid, MispEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn calls_guard(&self) -> MutexGuard<'_, Vec<RepositoryCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: RepositoryCall) {
        self.calls_guard().push(call);
    }

    fn missing(id: Uuid) -> MispError {
        MispError::Api {
            status: 404,
            message: format!("Invalid event {id}"),
        }
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn create(&self, event: &MispEvent) -> Result<MispEvent> {
        self.record(RepositoryCall::Create);
        let id = Uuid::new_v4();
        let mut stored = event.clone();
        stored.uuid = Some(id);
        self.events().insert(id, stored.clone());
        Ok(stored)
    }

    async fn update(&self, id: Uuid, event: &MispEvent) -> Result<MispEvent> {
        self.record(RepositoryCall::Update(id));
        let mut events = self.events();
        let existing = events.get_mut(&id).ok_or_else(|| Self::missing(id))?;
        let mut stored = event.clone();
        stored.uuid = Some(id);
        *existing = stored.clone();
        Ok(stored)
    }

    async fn get(&self, id: Uuid) -> Result<MispEvent> {
        self.record(RepositoryCall::Get(id));
        self.event(id).ok_or_else(|| Self::missing(id))
    }

    async fn attach_report(&self, id: Uuid, report: &EventReport) -> Result<Uuid> {
        self.record(RepositoryCall::AttachReport(id));
        let mut events = self.events();
        let event = events.get_mut(&id).ok_or_else(|| Self::missing(id))?;
        let report_id = Uuid::new_v4();
        event.event_reports.push(EventReport {
            uuid: Some(report_id),
            event_uuid: Some(id),
            ..report.clone()
        });
        Ok(report_id)
    }

    async fn add_object(&self, id: Uuid, object: &MispObject) -> Result<MispObject> {
        self.record(RepositoryCall::AddObject(id));
        let mut events = self.events();
        let event = events.get_mut(&id).ok_or_else(|| Self::missing(id))?;
        let stored = MispObject {
            uuid: Some(Uuid::new_v4()),
            ..object.clone()
        };
        event.objects.push(stored.clone());
        Ok(stored)
    }

    async fn extract_entities(&self, report_id: Uuid) -> Result<()> {
        self.record(RepositoryCall::ExtractEntities(report_id));
        if self.fail_extraction.load(Ordering::SeqCst) {
            return Err(MispError::Rejected("extraction failed".into()));
        }
        Ok(())
    }

    async fn fetch(&self, id: Uuid, format: ExportFormat) -> Result<Exported> {
        self.record(RepositoryCall::Fetch(id, format));
        let event = self.event(id).ok_or_else(|| Self::missing(id))?;
        if format.is_json() {
            let body: Value = serde_json::json!({ "response": [{ "Event": event }] });
            Ok(Exported::Json(body))
        } else {
            Ok(Exported::Text(format!("{format} export of {id}\n")))
        }
    }
}
