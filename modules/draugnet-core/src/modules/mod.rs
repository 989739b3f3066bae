//! Pluggable reporting and enhancement backends.
//!
//! Reporting modules mirror a submission into an external case or ticket
//! system. Enhancement modules transform content before reporting (for
//! example an LLM summary). Both are looked up by name in a
//! [`ModuleCatalog`] and instantiated once at startup by the
//! [`ModuleRegistry`].

pub mod dispatch;
pub mod enhancements;
pub mod format;
pub mod registry;
pub mod reporting;

pub use dispatch::{Dispatcher, Enhancement, ModuleOutcome, ModuleReport};
pub use registry::{ModuleCatalog, ModuleEnv, ModuleKind, ModuleRegistry};

use std::fmt;

use async_trait::async_trait;
use misp_client::{EventReport, MispEvent};

pub use crate::normalize::SubmissionContext;

/// Opaque identifier a reporting backend hands back for a created item.
pub type ExternalId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    Create,
    Update,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Create => "create",
            ActionType::Update => "update",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a reporting module sees about one submission.
#[derive(Debug, Clone, Copy)]
pub struct ReportItem<'a> {
    pub context: SubmissionContext,
    pub token: &'a str,
    pub event: &'a MispEvent,
    /// Freeform reports submitted alongside the record.
    pub reports: &'a [EventReport],
    pub enhanced_text: Option<&'a str>,
}

/// Content flowing through the enhancement pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum EnhancementContent {
    Event(MispEvent),
    Text(String),
}

impl EnhancementContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            EnhancementContent::Text(text) => Some(text),
            EnhancementContent::Event(_) => None,
        }
    }
}

#[async_trait]
pub trait ReportingModule: Send + Sync {
    fn name(&self) -> &str;

    /// Create the external item. Returns its id, which the dispatcher
    /// persists against the token.
    async fn create_item(&self, item: &ReportItem<'_>) -> anyhow::Result<ExternalId>;

    /// Append to an item created by an earlier `create_item`.
    async fn update_item(&self, external_id: &str, item: &ReportItem<'_>) -> anyhow::Result<()>;
}

#[async_trait]
pub trait EnhancementModule: Send + Sync {
    fn name(&self) -> &str;

    async fn run(
        &self,
        action: ActionType,
        context: SubmissionContext,
        content: &EnhancementContent,
    ) -> anyhow::Result<EnhancementContent>;
}
