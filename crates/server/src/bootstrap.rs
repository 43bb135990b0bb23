use procura_core::config::{AppConfig, ConfigError, LoadOptions};
use procura_db::{connect_with_config, migrations, DbPool};
use thiserror::Error;
use tracing::info;

use crate::api::ApiState;
use crate::service::WorkflowService;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub service: WorkflowService,
}

impl Application {
    pub fn api_state(&self) -> ApiState {
        ApiState::new(self.service.clone(), self.config.auth.api_token.clone())
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Connects, migrates and wires the workflow service for an already validated config.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let service = WorkflowService::sqlite(db_pool.clone(), &config.workflow);
    info!(
        event_name = "system.bootstrap.workflow_ready",
        correlation_id = "bootstrap",
        require_reject_comments = config.workflow.require_reject_comments,
        "workflow service wired"
    );

    Ok(Application { config, db_pool, service })
}
