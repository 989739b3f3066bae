//! Enhancement pipeline and reporting fan-out.
//!
//! Both run sequentially in registry order. No module failure ever stops the
//! loop: enhancement failures pass the previous content through, reporting
//! failures become a `ModuleReport`.

use std::sync::Arc;

use misp_client::{EventReport, MispEvent};
use serde::Serialize;

use super::registry::{ModuleRegistry, ReportingSlot, LOAD_FAILED};
use super::{ActionType, EnhancementContent, ReportItem, SubmissionContext};
use crate::tokens::{MappingOutcome, ModuleMappings};

/// Reason reported when an update reaches a module that never created an
/// item for the token.
pub const NO_MAPPING: &str = "no existing mapping";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModuleOutcome {
    Created { external_id: String },
    Updated { external_id: String },
    Failed { error: String },
}

/// Result of one reporting module for one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleReport {
    pub module: String,
    #[serde(flatten)]
    pub outcome: ModuleOutcome,
}

impl ModuleReport {
    fn failed(module: &str, error: impl Into<String>) -> Self {
        Self {
            module: module.to_string(),
            outcome: ModuleOutcome::Failed {
                error: error.into(),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        !matches!(self.outcome, ModuleOutcome::Failed { .. })
    }
}

/// Output of the enhancement pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Enhancement {
    pub content: EnhancementContent,
    /// Names of the stages whose output was kept.
    pub applied: Vec<String>,
}

impl Enhancement {
    /// The text to hand to reporting modules, if any stage produced one.
    pub fn enhanced_text(&self) -> Option<&str> {
        if self.applied.is_empty() {
            return None;
        }
        self.content.as_text()
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ModuleRegistry>,
    mappings: ModuleMappings,
}

impl Dispatcher {
    pub fn new(registry: Arc<ModuleRegistry>, mappings: ModuleMappings) -> Self {
        Self { registry, mappings }
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Run every enhancement module in order, feeding each one's output to
    /// the next. A failing stage is logged and skipped.
    pub async fn enhance(
        &self,
        action: ActionType,
        context: SubmissionContext,
        content: EnhancementContent,
    ) -> Enhancement {
        let mut current = content;
        let mut applied = Vec::new();

        for module in self.registry.enhancements() {
            match module.run(action, context, &current).await {
                Ok(next) => {
                    tracing::debug!(module = module.name(), "Enhancement applied");
                    current = next;
                    applied.push(module.name().to_string());
                }
                Err(e) => {
                    tracing::warn!(module = module.name(), error = %e, "Enhancement failed, keeping previous content");
                }
            }
        }

        Enhancement {
            content: current,
            applied,
        }
    }

    /// First dispatch for a token: create an item in every reporting module
    /// and persist the returned external ids.
    pub async fn dispatch_create(&self, item: &ReportItem<'_>) -> Vec<ModuleReport> {
        let mut reports = Vec::with_capacity(self.registry.reporting().len());

        for slot in self.registry.reporting() {
            let module = match slot {
                ReportingSlot::Ready(module) => module,
                ReportingSlot::LoadFailed { name } => {
                    reports.push(ModuleReport::failed(name, LOAD_FAILED));
                    continue;
                }
            };
            let name = module.name();

            let external_id = match module.create_item(item).await {
                Ok(id) => id,
                Err(e) => {
                    tracing::warn!(module = name, error = %e, "Reporting create failed");
                    reports.push(ModuleReport::failed(name, e.to_string()));
                    continue;
                }
            };

            match self.mappings.record(name, item.token, &external_id).await {
                Ok(MappingOutcome::Recorded) => {}
                Ok(MappingOutcome::AlreadyMapped(existing)) => {
                    tracing::warn!(module = name, existing = %existing, "Mapping already present, keeping it");
                }
                Err(e) => {
                    // The external item exists but cannot be found again.
                    tracing::error!(module = name, external_id = %external_id, error = %e, "Failed to persist module mapping");
                    reports.push(ModuleReport::failed(name, format!("mapping not saved: {e}")));
                    continue;
                }
            }

            tracing::info!(module = name, external_id = %external_id, "Reporting item created");
            reports.push(ModuleReport {
                module: name.to_string(),
                outcome: ModuleOutcome::Created { external_id },
            });
        }

        reports
    }

    /// Follow-up dispatch: update the item each module created earlier.
    /// Modules without a recorded mapping report a failure.
    pub async fn dispatch_update(&self, item: &ReportItem<'_>) -> Vec<ModuleReport> {
        let mut reports = Vec::with_capacity(self.registry.reporting().len());

        for slot in self.registry.reporting() {
            let module = match slot {
                ReportingSlot::Ready(module) => module,
                ReportingSlot::LoadFailed { name } => {
                    reports.push(ModuleReport::failed(name, LOAD_FAILED));
                    continue;
                }
            };
            let name = module.name();

            let external_id = match self.mappings.external_id(name, item.token).await {
                Ok(Some(id)) => id,
                Ok(None) => {
                    reports.push(ModuleReport::failed(name, NO_MAPPING));
                    continue;
                }
                Err(e) => {
                    tracing::error!(module = name, error = %e, "Failed to read module mapping");
                    reports.push(ModuleReport::failed(name, format!("mapping lookup failed: {e}")));
                    continue;
                }
            };

            match module.update_item(&external_id, item).await {
                Ok(()) => {
                    tracing::info!(module = name, external_id = %external_id, "Reporting item updated");
                    reports.push(ModuleReport {
                        module: name.to_string(),
                        outcome: ModuleOutcome::Updated { external_id },
                    });
                }
                Err(e) => {
                    tracing::warn!(module = name, external_id = %external_id, error = %e, "Reporting update failed");
                    reports.push(ModuleReport::failed(name, e.to_string()));
                }
            }
        }

        reports
    }

    /// Enhancement pipeline followed by reporting fan-out for one submission.
    pub async fn run(
        &self,
        action: ActionType,
        context: SubmissionContext,
        token: &str,
        event: &MispEvent,
        reports: &[EventReport],
    ) -> Vec<ModuleReport> {
        if self.registry.reporting().is_empty() {
            return Vec::new();
        }

        let initial = match context {
            SubmissionContext::Freetext => EnhancementContent::Text(
                reports
                    .iter()
                    .map(|r| r.content.as_str())
                    .collect::<Vec<_>>()
                    .join("\n\n"),
            ),
            SubmissionContext::Misp | SubmissionContext::Objects => {
                EnhancementContent::Event(event.clone())
            }
        };
        let enhancement = self.enhance(action, context, initial).await;

        let item = ReportItem {
            context,
            token,
            event,
            reports,
            enhanced_text: enhancement.enhanced_text(),
        };

        match action {
            ActionType::Create => self.dispatch_create(&item).await,
            ActionType::Update => self.dispatch_update(&item).await,
        }
    }
}
