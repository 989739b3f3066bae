use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::file_config::{ModuleConfig, ModulesConfig};

use super::enhancements::ollama::OllamaModule;
use super::reporting::flowintel::FlowintelModule;
use super::reporting::rtir::RtirModule;
use super::{EnhancementModule, ReportingModule};

/// Reason reported for a configured module that could not be instantiated.
pub const LOAD_FAILED: &str = "module load failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Reporting,
    Enhancement,
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleKind::Reporting => f.write_str("reporting"),
            ModuleKind::Enhancement => f.write_str("enhancements"),
        }
    }
}

/// Process-wide values modules may need besides their own config.
#[derive(Debug, Clone, Default)]
pub struct ModuleEnv {
    /// Base URL of the repository, used to build record links.
    pub misp_url: String,
}

pub type ReportingFactory =
    Arc<dyn Fn(&ModuleConfig, &ModuleEnv) -> anyhow::Result<Arc<dyn ReportingModule>> + Send + Sync>;
pub type EnhancementFactory =
    Arc<dyn Fn(&ModuleConfig, &ModuleEnv) -> anyhow::Result<Arc<dyn EnhancementModule>> + Send + Sync>;

/// Name -> factory map for every module implementation the binary knows.
#[derive(Default, Clone)]
pub struct ModuleCatalog {
    reporting: HashMap<String, ReportingFactory>,
    enhancements: HashMap<String, EnhancementFactory>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The modules shipped with Draugnet.
    pub fn builtin() -> Self {
        Self::new()
            .with_reporting("rtir", |cfg, env| {
                Ok(Arc::new(RtirModule::from_config(cfg, env)?) as Arc<dyn ReportingModule>)
            })
            .with_reporting("flowintel", |cfg, env| {
                Ok(Arc::new(FlowintelModule::from_config(cfg, env)?) as Arc<dyn ReportingModule>)
            })
            .with_enhancement("ollama", |cfg, _env| {
                Ok(Arc::new(OllamaModule::from_config(cfg)?) as Arc<dyn EnhancementModule>)
            })
    }

    pub fn with_reporting<F>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn(&ModuleConfig, &ModuleEnv) -> anyhow::Result<Arc<dyn ReportingModule>>
            + Send
            + Sync
            + 'static,
    {
        self.reporting.insert(name.to_string(), Arc::new(factory));
        self
    }

    pub fn with_enhancement<F>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn(&ModuleConfig, &ModuleEnv) -> anyhow::Result<Arc<dyn EnhancementModule>>
            + Send
            + Sync
            + 'static,
    {
        self.enhancements.insert(name.to_string(), Arc::new(factory));
        self
    }

    pub fn knows(&self, kind: ModuleKind, name: &str) -> bool {
        match kind {
            ModuleKind::Reporting => self.reporting.contains_key(name),
            ModuleKind::Enhancement => self.enhancements.contains_key(name),
        }
    }
}

/// A configured, enabled reporting module. Load failures keep their slot so
/// every dispatch reports them.
#[derive(Clone)]
pub enum ReportingSlot {
    Ready(Arc<dyn ReportingModule>),
    LoadFailed { name: String },
}

impl ReportingSlot {
    pub fn name(&self) -> &str {
        match self {
            ReportingSlot::Ready(module) => module.name(),
            ReportingSlot::LoadFailed { name } => name,
        }
    }
}

/// Module instances in configuration order. Built once at startup and
/// shared read-only.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    reporting: Vec<ReportingSlot>,
    enhancements: Vec<Arc<dyn EnhancementModule>>,
}

impl ModuleRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from already-instantiated modules.
    pub fn from_modules(
        reporting: Vec<Arc<dyn ReportingModule>>,
        enhancements: Vec<Arc<dyn EnhancementModule>>,
    ) -> Self {
        Self {
            reporting: reporting.into_iter().map(ReportingSlot::Ready).collect(),
            enhancements,
        }
    }

    /// Instantiate every enabled module named in `config`. Never fails.
    /// Disabled modules are skipped. A reporting module that cannot be
    /// built keeps a `LoadFailed` slot; an enhancement that cannot be built
    /// is logged and left out.
    pub fn load(config: &ModulesConfig, catalog: &ModuleCatalog, env: &ModuleEnv) -> Self {
        let mut registry = Self::empty();

        for module in config.reporting() {
            if !module.enabled() {
                tracing::info!(kind = %ModuleKind::Reporting, module = %module.name, "Module disabled, skipping");
                continue;
            }
            let loaded = match catalog.reporting.get(&module.name) {
                Some(factory) => factory(&module, env),
                None => Err(anyhow::anyhow!("no reporting module named '{}'", module.name)),
            };
            match loaded {
                Ok(instance) => {
                    tracing::info!(kind = %ModuleKind::Reporting, module = %module.name, "Module loaded");
                    registry.reporting.push(ReportingSlot::Ready(instance));
                }
                Err(e) => {
                    tracing::error!(kind = %ModuleKind::Reporting, module = %module.name, error = %e, "Module load failed");
                    registry.reporting.push(ReportingSlot::LoadFailed {
                        name: module.name.clone(),
                    });
                }
            }
        }

        for module in config.enhancements() {
            if !module.enabled() {
                tracing::info!(kind = %ModuleKind::Enhancement, module = %module.name, "Module disabled, skipping");
                continue;
            }
            let loaded = match catalog.enhancements.get(&module.name) {
                Some(factory) => factory(&module, env),
                None => Err(anyhow::anyhow!("no enhancement module named '{}'", module.name)),
            };
            match loaded {
                Ok(instance) => {
                    tracing::info!(kind = %ModuleKind::Enhancement, module = %module.name, "Module loaded");
                    registry.enhancements.push(instance);
                }
                Err(e) => {
                    tracing::error!(kind = %ModuleKind::Enhancement, module = %module.name, error = %e, "Module load failed");
                }
            }
        }

        registry
    }

    pub fn reporting(&self) -> &[ReportingSlot] {
        &self.reporting
    }

    pub fn enhancements(&self) -> &[Arc<dyn EnhancementModule>] {
        &self.enhancements
    }

    pub fn reporting_names(&self) -> Vec<&str> {
        self.reporting.iter().map(ReportingSlot::name).collect()
    }

    pub fn enhancement_names(&self) -> Vec<&str> {
        self.enhancements.iter().map(|m| m.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.reporting.is_empty() && self.enhancements.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_config::parse_config;
    use crate::modules::{ActionType, EnhancementContent, ExternalId, ReportItem, SubmissionContext};
    use async_trait::async_trait;

    struct Named(String);

    #[async_trait]
    impl ReportingModule for Named {
        fn name(&self) -> &str {
            &self.0
        }

        async fn create_item(&self, _item: &ReportItem<'_>) -> anyhow::Result<ExternalId> {
            Ok("1".into())
        }

        async fn update_item(&self, _external_id: &str, _item: &ReportItem<'_>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl EnhancementModule for Named {
        fn name(&self) -> &str {
            &self.0
        }

        async fn run(
            &self,
            _action: ActionType,
            _context: SubmissionContext,
            content: &EnhancementContent,
        ) -> anyhow::Result<EnhancementContent> {
            Ok(content.clone())
        }
    }

    fn catalog() -> ModuleCatalog {
        ModuleCatalog::new()
            .with_reporting("alpha", |cfg, _| Ok(Arc::new(Named(cfg.name.clone())) as Arc<dyn ReportingModule>))
            .with_reporting("beta", |cfg, _| Ok(Arc::new(Named(cfg.name.clone())) as Arc<dyn ReportingModule>))
            .with_reporting("broken", |_, _| Err(anyhow::anyhow!("bad credentials")))
            .with_enhancement("polish", |cfg, _| {
                Ok(Arc::new(Named(cfg.name.clone())) as Arc<dyn EnhancementModule>)
            })
    }

    fn modules(toml: &str) -> ModulesConfig {
        let base = "[server]\nport = 1\n[misp]\nurl = 'x'\n[templates]\nobjects_dir = 'o'\n";
        parse_config(&format!("{base}{toml}")).unwrap().modules
    }

    #[test]
    fn loads_enabled_modules_in_file_order() {
        let config = modules(
            r#"
            [modules.reporting.beta]
            enabled = true
            [modules.reporting.alpha]
            url = "https://alpha"
            auth_key = "k"
            [modules.enhancements.polish]
            enabled = true
            "#,
        );
        let registry = ModuleRegistry::load(&config, &catalog(), &ModuleEnv::default());
        assert_eq!(registry.reporting_names(), vec!["beta", "alpha"]);
        assert_eq!(registry.enhancement_names(), vec!["polish"]);
    }

    #[test]
    fn disabled_modules_are_skipped() {
        let config = modules(
            r#"
            [modules.reporting.alpha]
            url = "https://alpha"
            [modules.reporting.beta]
            enabled = false
            [modules.reporting.ghost]
            enabled = false
            "#,
        );
        let registry = ModuleRegistry::load(&config, &catalog(), &ModuleEnv::default());
        assert!(registry.is_empty());
    }

    #[test]
    fn unknown_and_failing_modules_keep_a_failed_slot() {
        let config = modules(
            r#"
            [modules.reporting.ghost]
            enabled = true
            [modules.reporting.broken]
            enabled = true
            [modules.reporting.alpha]
            enabled = true
            [modules.enhancements.mystery]
            enabled = true
            "#,
        );
        let registry = ModuleRegistry::load(&config, &catalog(), &ModuleEnv::default());

        assert_eq!(registry.reporting_names(), vec!["ghost", "broken", "alpha"]);
        assert!(matches!(registry.reporting()[0], ReportingSlot::LoadFailed { .. }));
        assert!(matches!(registry.reporting()[1], ReportingSlot::LoadFailed { .. }));
        assert!(matches!(registry.reporting()[2], ReportingSlot::Ready(_)));
        assert!(registry.enhancements().is_empty());
    }

    #[test]
    fn builtin_catalog_knows_shipped_modules() {
        let catalog = ModuleCatalog::builtin();
        assert!(catalog.knows(ModuleKind::Reporting, "rtir"));
        assert!(catalog.knows(ModuleKind::Reporting, "flowintel"));
        assert!(catalog.knows(ModuleKind::Enhancement, "ollama"));
        assert!(!catalog.knows(ModuleKind::Enhancement, "rtir"));
    }
}
