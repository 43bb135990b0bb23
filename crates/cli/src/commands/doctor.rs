use procura_core::config::{AppConfig, LoadOptions, WorkflowConfig};
use procura_core::{DirectoryEntry, WorkflowCatalog};
use procura_db::migrations;
use procura_db::repositories::SqlDirectoryRepository;
use procura_db::{connect_with_config, DbPool, DirectoryRepository};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, reason: &str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: format!("skipped because {reason}") }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

const DATABASE_CHECKS: [&str; 3] =
    ["database_connectivity", "schema_migrations", "directory_coverage"];

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass(
                "config_validation",
                "configuration loaded and validated",
            ));
            checks.push(check_api_token(&config));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            checks.push(DoctorCheck::skipped("api_token", "configuration did not load"));
            checks.extend(
                DATABASE_CHECKS
                    .into_iter()
                    .map(|name| DoctorCheck::skipped(name, "configuration did not load")),
            );
        }
    }

    summarize(checks)
}

fn summarize(checks: Vec<DoctorCheck>) -> DoctorReport {
    let any_failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_api_token(config: &AppConfig) -> DoctorCheck {
    if config.auth.api_token.is_some() {
        DoctorCheck::pass("api_token", "bearer token required on /api routes")
    } else {
        DoctorCheck::pass("api_token", "no token configured; identity headers are trusted as-is")
    }
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            let mut checks = vec![DoctorCheck::fail(
                DATABASE_CHECKS[0],
                format!("failed to initialize async runtime: {error}"),
            )];
            checks.extend(
                DATABASE_CHECKS[1..]
                    .iter()
                    .copied()
                    .map(|name| DoctorCheck::skipped(name, "the async runtime did not start")),
            );
            return checks;
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                let mut checks = vec![DoctorCheck::fail(
                    DATABASE_CHECKS[0],
                    format!("failed to connect to database: {error}"),
                )];
                checks.extend(
                    DATABASE_CHECKS[1..]
                        .iter()
                        .copied()
                        .map(|name| DoctorCheck::skipped(name, "the database is unreachable")),
                );
                return checks;
            }
        };

        let mut checks = vec![DoctorCheck::pass(
            DATABASE_CHECKS[0],
            format!("connected using `{}`", config.database.url),
        )];
        let schema = check_schema(&pool).await;
        let schema_ready = schema.status == CheckStatus::Pass;
        checks.push(schema);
        if schema_ready {
            checks.push(check_directory(&pool, &config.workflow).await);
        } else {
            checks.push(DoctorCheck::skipped(DATABASE_CHECKS[2], "the schema is not migrated"));
        }

        pool.close().await;
        checks
    })
}

async fn check_schema(pool: &DbPool) -> DoctorCheck {
    match migrations::status(pool).await {
        Ok(status) if status.is_current() => DoctorCheck::pass(
            DATABASE_CHECKS[1],
            format!("{} migration(s) applied", status.applied),
        ),
        Ok(status) => DoctorCheck::fail(
            DATABASE_CHECKS[1],
            format!(
                "{} of {} migration(s) applied; run `procura migrate`",
                status.applied, status.expected
            ),
        ),
        Err(error) => DoctorCheck::fail(
            DATABASE_CHECKS[1],
            format!("could not read migration history: {error}"),
        ),
    }
}

async fn check_directory(pool: &DbPool, workflow: &WorkflowConfig) -> DoctorCheck {
    let repository = SqlDirectoryRepository::new(pool.clone());
    match repository.list().await {
        Ok(entries) => {
            let missing = uncovered_roles(workflow, &entries);
            if missing.is_empty() {
                DoctorCheck::pass(
                    DATABASE_CHECKS[2],
                    format!("{} directory member(s) cover every configured role", entries.len()),
                )
            } else {
                DoctorCheck::fail(
                    DATABASE_CHECKS[2],
                    format!("no directory member holds role(s): {}", missing.join(", ")),
                )
            }
        }
        Err(error) => DoctorCheck::fail(DATABASE_CHECKS[2], error.to_string()),
    }
}

fn uncovered_roles(workflow: &WorkflowConfig, entries: &[DirectoryEntry]) -> Vec<String> {
    WorkflowCatalog::from_config(workflow)
        .uncovered_roles(entries)
        .into_iter()
        .map(String::from)
        .collect()
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use procura_core::config::WorkflowConfig;
    use procura_db::DemoDirectory;

    use super::{render_human, summarize, uncovered_roles, CheckStatus, DoctorCheck};

    #[test]
    fn demo_directory_covers_default_workflow_roles() {
        assert!(uncovered_roles(&WorkflowConfig::default(), &DemoDirectory::entries()).is_empty());
    }

    #[test]
    fn missing_roles_are_reported_once() {
        let workflow = WorkflowConfig {
            contract_roles: vec!["Compliance".to_string(), "legal".to_string()],
            supplier_roles: vec!["compliance".to_string()],
            ..WorkflowConfig::default()
        };

        assert_eq!(uncovered_roles(&workflow, &DemoDirectory::entries()), vec!["compliance"]);
    }

    #[test]
    fn skipped_checks_do_not_fail_the_report() {
        let report = summarize(vec![
            DoctorCheck::pass("config_validation", "ok"),
            DoctorCheck::skipped("directory_coverage", "the schema is not migrated"),
        ]);
        assert_eq!(report.overall_status, CheckStatus::Pass);

        let report = summarize(vec![DoctorCheck::fail("schema_migrations", "missing")]);
        assert_eq!(report.overall_status, CheckStatus::Fail);
        assert!(render_human(&report).contains("- [fail] schema_migrations: missing"));
    }
}
