//! End-to-end persistence checks: a cash request travels through the engine and the sqlite
//! repositories exactly as the service drives it (load, transition, conditional save).

use rust_decimal::Decimal;

use procura_core::{
    audit_transition, AuditContext, Decision, DecisionCommand, DisbursementRequest, EntityDraft,
    EntityKind, InMemoryAuditSink, JustificationSubmission, RequesterContext, WorkflowEngine,
    WorkflowOperation,
};
use procura_db::repositories::{SqlAuditRepository, SqlDirectoryRepository, SqlEntityRepository};
use procura_db::{
    connect_with_settings, migrations, AuditRepository, DemoDirectory, DirectoryRepository,
    EntityRepository,
};

type PersistenceTestResult<T = ()> = Result<T, String>;

macro_rules! require {
    ($cond:expr) => {
        if !$cond {
            return Err(format!("assertion failed: `{}`", stringify!($cond)));
        }
    };
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err(format!($($arg)*));
        }
    };
}

macro_rules! require_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            return Err(format!(
                "assertion failed: `left == right` (`{:?}` != `{:?}`)",
                $left,
                $right
            ));
        }
    };
}

fn step(level: u32, decision: Decision) -> DecisionCommand {
    DecisionCommand {
        level,
        decision,
        comments: Some(format!("level {level}")),
        approved_amount: None,
    }
}

#[tokio::test]
async fn cash_request_lifecycle_survives_reloads() -> PersistenceTestResult {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.map_err(|e| e.to_string())?;
    migrations::run_pending(&pool).await.map_err(|e| e.to_string())?;
    DemoDirectory::load(&pool).await.map_err(|e| e.to_string())?;

    let directory_repo = SqlDirectoryRepository::new(pool.clone());
    let entities = SqlEntityRepository::new(pool.clone());
    let audit = SqlAuditRepository::new(pool.clone());
    let engine = WorkflowEngine::default();
    let directory = directory_repo.snapshot().await.map_err(|e| e.to_string())?;

    let owner = RequesterContext::new("u-amara", "staff");
    let (entity, opened) = engine
        .open(&directory, &owner, EntityDraft {
            kind: EntityKind::CashRequest,
            title: "Regional workshop".to_owned(),
            description: "Venue and travel".to_owned(),
            amount_requested: Some(Decimal::from(10_000)),
            attachments: Vec::new(),
            details: serde_json::Value::Null,
        })
        .map_err(|e| e.to_string())?;
    require_eq!(opened.to_label(), "pending_supervisor");
    entities.insert(&entity).await.map_err(|e| e.to_string())?;

    let actions: [(&str, &str, Option<DecisionCommand>, Option<i64>); 4] = [
        ("u-kofi", "supervisor", Some(step(1, Decision::Approve)), None),
        ("u-grace", "finance", Some(step(2, Decision::Approve)), None),
        ("u-grace", "finance", None, Some(4_000)),
        ("u-grace", "finance", None, Some(6_000)),
    ];

    for (user_id, role, decision, tranche) in actions {
        let requester = RequesterContext::new(user_id, role);
        let mut current = entities
            .find_by_id(&entity.id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| "entity should be stored".to_string())?;
        let expected_version = current.version;

        let sink = InMemoryAuditSink::default();
        let context = AuditContext::new(Some(entity.id.clone()), "corr-lifecycle", user_id);
        let (operation, result) = match (decision, tranche) {
            (Some(command), _) => {
                (WorkflowOperation::Decide, engine.apply_decision(&mut current, &requester, command))
            }
            (None, Some(amount)) => (
                WorkflowOperation::Disburse,
                engine.record_disbursement(&mut current, &requester, DisbursementRequest {
                    amount: Decimal::from(amount),
                    notes: None,
                }),
            ),
            (None, None) => return Err("every action decides or disburses".to_string()),
        };
        audit_transition(&sink, &context, operation, &result);
        result.map_err(|e| e.to_string())?;

        let saved = entities.save(&current, expected_version).await.map_err(|e| e.to_string())?;
        require_eq!(saved, expected_version + 1);
        for event in sink.drain() {
            audit.append(&event).await.map_err(|e| e.to_string())?;
        }
    }

    let mut finished = entities
        .find_by_id(&entity.id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "entity should be stored".to_string())?;
    require_eq!(finished.rendered_status(), "fully_disbursed");
    require_eq!(finished.version, 4);
    require_eq!(finished.total_disbursed(), Decimal::from(10_000));

    let expected_version = finished.version;
    engine
        .start_justification(&directory, &mut finished, &owner, JustificationSubmission {
            notes: "Invoices attached".to_owned(),
            attachments: Vec::new(),
        })
        .map_err(|e| e.to_string())?;
    entities.save(&finished, expected_version).await.map_err(|e| e.to_string())?;

    let reloaded = entities
        .find_by_id(&entity.id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "entity should be stored".to_string())?;
    require_eq!(reloaded.rendered_status(), "justification_pending_supervisor");
    require!(reloaded.justification.is_some(), "justification chain should persist");
    require!(reloaded.approval_chain.is_fully_approved());

    let trail = audit.list_for_entity(&entity.id).await.map_err(|e| e.to_string())?;
    let event_types: Vec<&str> = trail.iter().map(|event| event.event_type.as_str()).collect();
    require_eq!(
        event_types,
        vec!["decide.applied", "decide.applied", "disburse.applied", "disburse.applied"]
    );

    Ok(())
}

#[tokio::test]
async fn rejected_transitions_are_never_saved() -> PersistenceTestResult {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.map_err(|e| e.to_string())?;
    migrations::run_pending(&pool).await.map_err(|e| e.to_string())?;
    let entities = SqlEntityRepository::new(pool.clone());
    let engine = WorkflowEngine::default();

    let (entity, _) = engine
        .open(&DemoDirectory::directory(), &RequesterContext::new("u-amara", "staff"), EntityDraft {
            kind: EntityKind::Contract,
            title: "Cleaning services".to_owned(),
            description: String::new(),
            amount_requested: None,
            attachments: Vec::new(),
            details: serde_json::Value::Null,
        })
        .map_err(|e| e.to_string())?;
    entities.insert(&entity).await.map_err(|e| e.to_string())?;

    let mut working = entity.clone();
    let outcome =
        engine.apply_decision(&mut working, &RequesterContext::new("u-grace", "finance"), step(1, Decision::Approve));
    require!(outcome.is_err(), "finance is not the level-one approver");
    require_eq!(working, entity);

    let stored = entities
        .find_by_id(&entity.id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "entity should be stored".to_string())?;
    require_eq!(stored.rendered_status(), "pending_legal");
    require_eq!(stored.version, 0);
    Ok(())
}
