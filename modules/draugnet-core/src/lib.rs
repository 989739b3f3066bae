pub mod config;
pub mod error;
pub mod file_config;
pub mod modules;
pub mod normalize;
pub mod repository;
pub mod share;
pub mod store;
pub mod templates;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod tokens;

pub use config::AppConfig;
pub use error::{DraugnetError, Result};
pub use file_config::{FileConfig, ModuleConfig, StoreBackend};
pub use modules::{Dispatcher, ModuleCatalog, ModuleEnv, ModuleRegistry};
pub use normalize::{OptionalFields, SubmissionContext};
pub use repository::Repository;
pub use share::{ShareDeps, ShareReceipt, ShareService};
pub use store::{KvStore, MemoryStore, PgStore, StoreError};
pub use templates::TemplateRegistry;
pub use tokens::{ModuleMappings, TokenService};
