//! `/health` readiness report.
//!
//! The workflow can serve requests when the database answers, its schema matches the embedded
//! migrations, and every configured approver role is held by somebody in the directory. A
//! missing role does not break reads, but every `open` or resubmission routed through that role
//! fails with `approver_unavailable`, so it degrades readiness as well.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use procura_core::WorkflowCatalog;
use procura_db::repositories::SqlDirectoryRepository;
use procura_db::{migrations, DbPool, DirectoryRepository};
use serde::Serialize;
use tracing::warn;

const DATABASE: &str = "database";
const SCHEMA: &str = "schema";
const DIRECTORY: &str = "directory";

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    catalog: WorkflowCatalog,
}

impl HealthState {
    pub fn new(db_pool: DbPool, catalog: WorkflowCatalog) -> Self {
        Self { db_pool, catalog }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    Degraded,
    Skipped,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReadinessCheck {
    pub name: &'static str,
    pub readiness: Readiness,
    pub detail: String,
}

impl ReadinessCheck {
    fn ready(name: &'static str, detail: impl Into<String>) -> Self {
        Self { name, readiness: Readiness::Ready, detail: detail.into() }
    }

    fn degraded(name: &'static str, detail: impl Into<String>) -> Self {
        Self { name, readiness: Readiness::Degraded, detail: detail.into() }
    }

    fn skipped(name: &'static str, reason: &str) -> Self {
        Self { name, readiness: Readiness::Skipped, detail: format!("skipped because {reason}") }
    }

    fn is_ready(&self) -> bool {
        self.readiness == Readiness::Ready
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: Readiness,
    pub checks: Vec<ReadinessCheck>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub uncovered_roles: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn check(&self, name: &str) -> Option<&ReadinessCheck> {
        self.checks.iter().find(|check| check.name == name)
    }

    async fn collect(state: &HealthState) -> Self {
        let mut uncovered_roles = Vec::new();

        let database = database_check(&state.db_pool).await;
        let schema = if database.is_ready() {
            schema_check(&state.db_pool).await
        } else {
            ReadinessCheck::skipped(SCHEMA, "the database is unreachable")
        };
        let directory = if schema.is_ready() {
            let (check, missing) = directory_check(&state.db_pool, &state.catalog).await;
            uncovered_roles = missing;
            check
        } else {
            ReadinessCheck::skipped(DIRECTORY, "the schema is not current")
        };

        let checks = vec![database, schema, directory];
        for check in checks.iter().filter(|check| check.readiness == Readiness::Degraded) {
            warn!(
                event_name = "system.health.degraded",
                correlation_id = "health",
                check = check.name,
                detail = %check.detail,
                "readiness check degraded"
            );
        }

        let status = if checks.iter().all(ReadinessCheck::is_ready) {
            Readiness::Ready
        } else {
            Readiness::Degraded
        };
        Self { status, checks, uncovered_roles, checked_at: Utc::now() }
    }
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthReport>) {
    let report = HealthReport::collect(&state).await;
    let status_code = match report.status {
        Readiness::Ready => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(report))
}

async fn database_check(pool: &DbPool) -> ReadinessCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => ReadinessCheck::ready(DATABASE, "database answered"),
        Err(error) => ReadinessCheck::degraded(DATABASE, format!("database query failed: {error}")),
    }
}

async fn schema_check(pool: &DbPool) -> ReadinessCheck {
    match migrations::status(pool).await {
        Ok(status) if status.is_current() => {
            ReadinessCheck::ready(SCHEMA, format!("{} migration(s) applied", status.applied))
        }
        Ok(status) => ReadinessCheck::degraded(
            SCHEMA,
            format!("{} of {} migration(s) applied", status.applied, status.expected),
        ),
        Err(error) => {
            ReadinessCheck::degraded(SCHEMA, format!("could not read migration history: {error}"))
        }
    }
}

async fn directory_check(
    pool: &DbPool,
    catalog: &WorkflowCatalog,
) -> (ReadinessCheck, Vec<String>) {
    let entries = match SqlDirectoryRepository::new(pool.clone()).list().await {
        Ok(entries) => entries,
        Err(error) => return (ReadinessCheck::degraded(DIRECTORY, error.to_string()), Vec::new()),
    };

    let missing: Vec<String> =
        catalog.uncovered_roles(&entries).into_iter().map(String::from).collect();
    if missing.is_empty() {
        let detail = format!("{} member(s) cover every configured approver role", entries.len());
        (ReadinessCheck::ready(DIRECTORY, detail), missing)
    } else {
        let detail = format!("no directory member holds role(s): {}", missing.join(", "));
        (ReadinessCheck::degraded(DIRECTORY, detail), missing)
    }
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};
    use procura_core::WorkflowCatalog;
    use procura_db::{connect_with_settings, migrations, DbPool, DemoDirectory};

    use super::{health, HealthState, Readiness};

    async fn pool() -> DbPool {
        connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect")
    }

    fn state(pool: &DbPool) -> State<HealthState> {
        State(HealthState::new(pool.clone(), WorkflowCatalog::default()))
    }

    #[tokio::test]
    async fn ready_once_migrated_and_seeded() {
        let pool = pool().await;
        migrations::run_pending(&pool).await.expect("migrations");
        DemoDirectory::load(&pool).await.expect("seed directory");

        let (status, Json(report)) = health(state(&pool)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(report.status, Readiness::Ready);
        assert!(report.checks.iter().all(|check| check.readiness == Readiness::Ready));
        assert!(report.uncovered_roles.is_empty());

        pool.close().await;
    }

    #[tokio::test]
    async fn empty_directory_lists_every_uncovered_role() {
        let pool = pool().await;
        migrations::run_pending(&pool).await.expect("migrations");

        let (status, Json(report)) = health(state(&pool)).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report.check("schema").map(|check| check.readiness), Some(Readiness::Ready));
        assert_eq!(
            report.check("directory").map(|check| check.readiness),
            Some(Readiness::Degraded)
        );
        assert_eq!(report.uncovered_roles, vec!["executive", "finance", "legal", "supply_chain"]);

        pool.close().await;
    }

    #[tokio::test]
    async fn unmigrated_schema_skips_directory_coverage() {
        let pool = pool().await;

        let (status, Json(report)) = health(state(&pool)).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let schema = report.check("schema").expect("schema check");
        assert_eq!(schema.readiness, Readiness::Degraded);
        assert!(schema.detail.starts_with("0 of "));
        assert_eq!(
            report.check("directory").map(|check| check.readiness),
            Some(Readiness::Skipped)
        );

        pool.close().await;
    }

    #[tokio::test]
    async fn closed_pool_degrades_database_and_skips_the_rest() {
        let pool = pool().await;
        pool.close().await;

        let (status, Json(report)) = health(state(&pool)).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let readiness: Vec<Readiness> =
            report.checks.iter().map(|check| check.readiness).collect();
        assert_eq!(readiness, vec![Readiness::Degraded, Readiness::Skipped, Readiness::Skipped]);
    }
}
