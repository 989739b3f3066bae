use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use draugnet_core::file_config::load_config;
use draugnet_core::{
    AppConfig, Dispatcher, KvStore, MemoryStore, ModuleCatalog, ModuleEnv, ModuleMappings,
    ModuleRegistry, PgStore, ShareDeps, ShareService, StoreBackend, TemplateRegistry,
    TokenService,
};
use misp_client::MispClient;
use tracing_subscriber::EnvFilter;

use draugnet_api::{cors_layer, router, AppState};

#[derive(Parser)]
#[command(name = "draugnet-api", about = "Anonymous threat-intel submission service")]
struct Cli {
    /// Path to config TOML file
    #[arg(long, env = "DRAUGNET_CONFIG", default_value = "./config/draugnet.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    tracing::info!(config = %cli.config.display(), "Loading config");

    let file_config = load_config(&cli.config)?;
    let config = AppConfig::from_env()?;

    // Store
    let store: Arc<dyn KvStore> = match file_config.store.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; tokens are lost on restart");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set for the postgres store")?;
            Arc::new(PgStore::connect(url).await?)
        }
    };

    // Repository
    let misp = MispClient::new(
        &file_config.misp.url,
        &config.misp_key,
        file_config.misp.verify_cert,
    )
    .context("Failed to build MISP client")?;
    if !file_config.misp.verify_cert {
        tracing::warn!("MISP certificate verification is disabled");
    }

    // Modules
    let env = ModuleEnv {
        misp_url: file_config.misp.url.clone(),
    };
    let registry = ModuleRegistry::load(&file_config.modules, &ModuleCatalog::builtin(), &env);
    tracing::info!(
        reporting = ?registry.reporting_names(),
        enhancements = ?registry.enhancement_names(),
        "Modules loaded"
    );

    let deps = ShareDeps {
        repository: Arc::new(misp),
        tokens: TokenService::new(store.clone()),
        dispatcher: Dispatcher::new(Arc::new(registry), ModuleMappings::new(store)),
        templates: Arc::new(TemplateRegistry::new(
            file_config.templates.objects_dir.clone(),
            file_config.templates.allow_list.clone(),
        )),
    };
    let state = Arc::new(AppState::new(ShareService::new(deps)));

    let app = router(state).layer(cors_layer(&file_config.server.allowed_origins));

    let addr = format!("{}:{}", file_config.server.host, file_config.server.port);
    tracing::info!("Draugnet API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}
