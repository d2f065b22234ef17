//! Core application lifecycle

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::api::{self, AllowedOrigins};
use crate::core::cli;
use crate::core::config::GotelConfig;
use crate::core::constants::{APP_NAME_LOWER, ENV_LOG};
use crate::core::shutdown::ShutdownService;
use crate::data::store::Store;
use crate::domain::{retention, Ingestor};

pub struct CoreApp {
    pub config: GotelConfig,
    pub store: Arc<Store>,
    pub ingestor: Arc<Ingestor>,
    pub shutdown: ShutdownService,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        let cli = cli::parse();
        let config = GotelConfig::load(&cli)?;

        let app = Self::init(config).await?;
        app.start().await
    }

    pub async fn init(config: GotelConfig) -> Result<Self> {
        let store = Arc::new(
            Store::open(&config.db_path)
                .await
                .with_context(|| {
                    format!("Failed to open database at {}", config.db_path.display())
                })?,
        );

        tracing::info!(
            db_path = %config.db_path.display(),
            retention_secs = config.retention.as_secs(),
            "Store opened"
        );

        let ingestor = Arc::new(Ingestor::new(store.clone(), &config));
        let shutdown = ShutdownService::new();

        Ok(Self {
            config,
            store,
            ingestor,
            shutdown,
        })
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_NAME_LOWER);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    /// Start background tasks and servers, then run the ordered
    /// shutdown: signal tasks → drain HTTP → join tasks → checkpoint →
    /// close store.
    async fn start(self) -> Result<()> {
        self.shutdown.install_signal_handlers();

        self.shutdown
            .register(retention::start(
                self.store.clone(),
                self.config.retention,
                self.config.cleanup_interval,
                self.shutdown.subscribe(),
            ))
            .await;

        if self.config.otlp_port > 0 {
            let router = api::otlp_router(self.ingestor.clone());
            let port = self.config.otlp_port;
            let wait = self.shutdown.wait();
            let handle = tokio::spawn(async move {
                if let Err(e) = api::serve(port, router, wait).await {
                    tracing::error!(error = %e, "OTLP server error");
                }
            });
            self.shutdown.register(handle).await;
        }

        if self.config.query_port > 0 {
            let origins = AllowedOrigins::new(&self.config.cors_allowed_origins);
            let router = api::query_router(self.store.clone(), origins);
            api::serve(self.config.query_port, router, self.shutdown.wait()).await?;
        } else {
            tracing::info!("Query gateway disabled (query_port = 0)");
            self.shutdown.wait().await;
        }

        self.shutdown.shutdown().await;

        if let Err(e) = self.store.checkpoint().await {
            tracing::warn!(error = %e, "WAL checkpoint failed during shutdown");
        }
        self.store.close().await;

        Ok(())
    }
}
