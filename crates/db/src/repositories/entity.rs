use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

use procura_core::{
    ApprovalChain, ApprovalStep, Approver, Attachment, ChainScope, Disbursement, EditRecord,
    EntityChanges, EntityId, EntityKind, EntityStatus, Justification, Owner, Role, StepStatus,
    UserId, WorkflowEntity,
};

use super::{awaits_decision_from, EntityFilter, EntityRepository, RepositoryError};
use crate::DbPool;

const ENTITY_COLUMNS: &str = "id, kind, owner_user_id, owner_name, owner_department, title,
     description, status, amount_requested, amount_approved, attachments_json, details_json,
     review_started, version, created_at, updated_at";

pub struct SqlEntityRepository {
    pool: DbPool,
}

impl SqlEntityRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn hydrate(&self, row: &SqliteRow) -> Result<WorkflowEntity, RepositoryError> {
        let id: String = row.try_get("id").map_err(decode)?;
        let mut conn = self.pool.acquire().await?;
        let children = load_children(&mut conn, &id).await?;
        row_to_entity(row, children)
    }

    async fn exists(&self, id: &str) -> Result<bool, RepositoryError> {
        let found: i64 =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM workflow_entity WHERE id = ?1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(found == 1)
    }
}

#[async_trait::async_trait]
impl EntityRepository for SqlEntityRepository {
    async fn find_by_id(&self, id: &EntityId) -> Result<Option<WorkflowEntity>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {ENTITY_COLUMNS} FROM workflow_entity WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(self.hydrate(r).await?)),
            None => Ok(None),
        }
    }

    async fn list(&self, filter: &EntityFilter) -> Result<Vec<WorkflowEntity>, RepositoryError> {
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {ENTITY_COLUMNS} FROM workflow_entity WHERE 1 = 1"
        ));
        if let Some(kind) = filter.kind {
            query.push(" AND kind = ").push_bind(kind.as_str());
        }
        if let Some(status) = &filter.status {
            query.push(" AND status = ").push_bind(status.trim().to_owned());
        }
        if let Some(owner) = &filter.owner {
            query.push(" AND owner_user_id = ").push_bind(owner.to_string());
        }
        query.push(" ORDER BY created_at DESC, id");

        let rows = query.build().fetch_all(&self.pool).await?;
        let mut entities = Vec::with_capacity(rows.len());
        for row in &rows {
            entities.push(self.hydrate(row).await?);
        }
        Ok(entities)
    }

    async fn list_awaiting(
        &self,
        approver: &UserId,
    ) -> Result<Vec<WorkflowEntity>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ENTITY_COLUMNS} FROM workflow_entity
             WHERE id IN (
                 SELECT entity_id FROM approval_step
                 WHERE approver_user_id = ?1 AND status = 'pending'
             )
             ORDER BY updated_at, id"
        ))
        .bind(approver.as_str())
        .fetch_all(&self.pool)
        .await?;

        // Pending steps behind the active one belong to the approver but are not actionable yet.
        let mut entities = Vec::new();
        for row in &rows {
            let entity = self.hydrate(row).await?;
            if awaits_decision_from(&entity, approver) {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    async fn insert(&self, entity: &WorkflowEntity) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(&format!(
            "INSERT INTO workflow_entity ({ENTITY_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO NOTHING"
        ))
        .bind(&entity.id.0)
        .bind(entity.kind.as_str())
        .bind(entity.owner.user_id.as_str())
        .bind(&entity.owner.name)
        .bind(&entity.owner.department)
        .bind(&entity.title)
        .bind(&entity.description)
        .bind(entity.rendered_status())
        .bind(entity.amount_requested.map(|amount| amount.to_string()))
        .bind(entity.amount_approved.map(|amount| amount.to_string()))
        .bind(encode_json(&entity.attachments)?)
        .bind(encode_json(&entity.details)?)
        .bind(entity.review_started)
        .bind(entity.version)
        .bind(entity.created_at.to_rfc3339())
        .bind(entity.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Duplicate { entity_id: entity.id.0.clone() });
        }

        insert_children(&mut tx, entity).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn save(
        &self,
        entity: &WorkflowEntity,
        expected_version: i64,
    ) -> Result<i64, RepositoryError> {
        let next_version = expected_version + 1;
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE workflow_entity SET
                 title = ?, description = ?, status = ?, amount_requested = ?,
                 amount_approved = ?, attachments_json = ?, details_json = ?,
                 review_started = ?, version = ?, updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(&entity.title)
        .bind(&entity.description)
        .bind(entity.rendered_status())
        .bind(entity.amount_requested.map(|amount| amount.to_string()))
        .bind(entity.amount_approved.map(|amount| amount.to_string()))
        .bind(encode_json(&entity.attachments)?)
        .bind(encode_json(&entity.details)?)
        .bind(entity.review_started)
        .bind(next_version)
        .bind(entity.updated_at.to_rfc3339())
        .bind(&entity.id.0)
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(self.missing_or_stale(&entity.id.0, expected_version).await?);
        }

        for table in ["approval_step", "disbursement", "edit_record", "justification"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE entity_id = ?"))
                .bind(&entity.id.0)
                .execute(&mut *tx)
                .await?;
        }
        insert_children(&mut tx, entity).await?;

        tx.commit().await?;
        Ok(next_version)
    }

    async fn delete(&self, id: &EntityId, expected_version: i64) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM workflow_entity WHERE id = ? AND version = ?")
            .bind(&id.0)
            .bind(expected_version)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(self.missing_or_stale(&id.0, expected_version).await?);
        }
        Ok(())
    }
}

impl SqlEntityRepository {
    async fn missing_or_stale(
        &self,
        id: &str,
        expected_version: i64,
    ) -> Result<RepositoryError, RepositoryError> {
        Ok(if self.exists(id).await? {
            RepositoryError::Conflict { entity_id: id.to_owned(), expected_version }
        } else {
            RepositoryError::NotFound { entity_id: id.to_owned() }
        })
    }
}

#[derive(Default)]
struct EntityChildren {
    review_steps: Vec<ApprovalStep>,
    justification_steps: Vec<ApprovalStep>,
    disbursements: Vec<Disbursement>,
    edits: Vec<EditRecord>,
    justification: Option<(String, Vec<Attachment>, DateTime<Utc>)>,
}

async fn load_children(
    conn: &mut SqliteConnection,
    entity_id: &str,
) -> Result<EntityChildren, RepositoryError> {
    let mut children = EntityChildren::default();

    let step_rows = sqlx::query(
        "SELECT scope, level, approver_user_id, approver_name, approver_role,
                approver_department, status, comments, acted_at
         FROM approval_step WHERE entity_id = ? ORDER BY scope, level",
    )
    .bind(entity_id)
    .fetch_all(&mut *conn)
    .await?;
    for row in &step_rows {
        let scope: String = row.try_get("scope").map_err(decode)?;
        let step = row_to_step(row)?;
        match ChainScope::parse(&scope) {
            Some(ChainScope::Review) => children.review_steps.push(step),
            Some(ChainScope::Justification) => children.justification_steps.push(step),
            None => return Err(RepositoryError::Decode(format!("unknown chain scope `{scope}`"))),
        }
    }

    let disbursement_rows = sqlx::query(
        "SELECT disbursement_number, amount, notes, disbursed_by, disbursed_at
         FROM disbursement WHERE entity_id = ? ORDER BY disbursement_number",
    )
    .bind(entity_id)
    .fetch_all(&mut *conn)
    .await?;
    for row in &disbursement_rows {
        let number: i64 = row.try_get("disbursement_number").map_err(decode)?;
        let amount: String = row.try_get("amount").map_err(decode)?;
        let disbursed_by: String = row.try_get("disbursed_by").map_err(decode)?;
        let disbursed_at: String = row.try_get("disbursed_at").map_err(decode)?;
        children.disbursements.push(Disbursement {
            disbursement_number: u32::try_from(number).map_err(decode)?,
            amount: parse_decimal(&amount)?,
            notes: row.try_get("notes").map_err(decode)?,
            disbursed_by: UserId::new(disbursed_by),
            date: parse_timestamp(&disbursed_at)?,
        });
    }

    let edit_rows = sqlx::query(
        "SELECT edit_number, edited_at, edited_by, previous_status, reason, changes_json
         FROM edit_record WHERE entity_id = ? ORDER BY edit_number",
    )
    .bind(entity_id)
    .fetch_all(&mut *conn)
    .await?;
    for row in &edit_rows {
        let number: i64 = row.try_get("edit_number").map_err(decode)?;
        let edited_at: String = row.try_get("edited_at").map_err(decode)?;
        let edited_by: String = row.try_get("edited_by").map_err(decode)?;
        let changes_json: String = row.try_get("changes_json").map_err(decode)?;
        children.edits.push(EditRecord {
            edit_number: u32::try_from(number).map_err(decode)?,
            edited_at: parse_timestamp(&edited_at)?,
            edited_by: UserId::new(edited_by),
            previous_status: row.try_get("previous_status").map_err(decode)?,
            reason: row.try_get("reason").map_err(decode)?,
            changes: serde_json::from_str::<EntityChanges>(&changes_json).map_err(decode)?,
        });
    }

    let justification_row = sqlx::query(
        "SELECT notes, attachments_json, submitted_at FROM justification WHERE entity_id = ?",
    )
    .bind(entity_id)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(row) = justification_row {
        let attachments_json: String = row.try_get("attachments_json").map_err(decode)?;
        let submitted_at: String = row.try_get("submitted_at").map_err(decode)?;
        children.justification = Some((
            row.try_get("notes").map_err(decode)?,
            serde_json::from_str(&attachments_json).map_err(decode)?,
            parse_timestamp(&submitted_at)?,
        ));
    }

    Ok(children)
}

async fn insert_children(
    conn: &mut SqliteConnection,
    entity: &WorkflowEntity,
) -> Result<(), RepositoryError> {
    for step in entity.approval_chain.steps() {
        insert_step(&mut *conn, &entity.id, ChainScope::Review, step).await?;
    }

    for disbursement in &entity.disbursements {
        sqlx::query(
            "INSERT INTO disbursement (entity_id, disbursement_number, amount, notes,
                                       disbursed_by, disbursed_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&entity.id.0)
        .bind(i64::from(disbursement.disbursement_number))
        .bind(disbursement.amount.to_string())
        .bind(&disbursement.notes)
        .bind(disbursement.disbursed_by.as_str())
        .bind(disbursement.date.to_rfc3339())
        .execute(&mut *conn)
        .await?;
    }

    for edit in &entity.edit_history {
        sqlx::query(
            "INSERT INTO edit_record (entity_id, edit_number, edited_at, edited_by,
                                      previous_status, reason, changes_json)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entity.id.0)
        .bind(i64::from(edit.edit_number))
        .bind(edit.edited_at.to_rfc3339())
        .bind(edit.edited_by.as_str())
        .bind(&edit.previous_status)
        .bind(&edit.reason)
        .bind(encode_json(&edit.changes)?)
        .execute(&mut *conn)
        .await?;
    }

    if let Some(justification) = &entity.justification {
        sqlx::query(
            "INSERT INTO justification (entity_id, notes, attachments_json, submitted_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&entity.id.0)
        .bind(&justification.notes)
        .bind(encode_json(&justification.attachments)?)
        .bind(justification.submitted_at.to_rfc3339())
        .execute(&mut *conn)
        .await?;

        for step in justification.chain.steps() {
            insert_step(&mut *conn, &entity.id, ChainScope::Justification, step).await?;
        }
    }

    Ok(())
}

async fn insert_step(
    conn: &mut SqliteConnection,
    entity_id: &EntityId,
    scope: ChainScope,
    step: &ApprovalStep,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO approval_step (entity_id, scope, level, approver_user_id, approver_name,
                                    approver_role, approver_department, status, comments,
                                    acted_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&entity_id.0)
    .bind(scope.as_str())
    .bind(i64::from(step.level))
    .bind(step.approver.user_id.as_str())
    .bind(&step.approver.name)
    .bind(step.approver.role.as_str())
    .bind(&step.approver.department)
    .bind(step.status.as_str())
    .bind(&step.comments)
    .bind(step.acted_at.map(|at| at.to_rfc3339()))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn row_to_step(row: &SqliteRow) -> Result<ApprovalStep, RepositoryError> {
    let level: i64 = row.try_get("level").map_err(decode)?;
    let user_id: String = row.try_get("approver_user_id").map_err(decode)?;
    let role: String = row.try_get("approver_role").map_err(decode)?;
    let status: String = row.try_get("status").map_err(decode)?;
    let acted_at: Option<String> = row.try_get("acted_at").map_err(decode)?;

    Ok(ApprovalStep {
        level: u32::try_from(level).map_err(decode)?,
        approver: Approver {
            user_id: UserId::new(user_id),
            name: row.try_get("approver_name").map_err(decode)?,
            role: Role::new(role),
            department: row.try_get("approver_department").map_err(decode)?,
        },
        status: StepStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown step status `{status}`")))?,
        comments: row.try_get("comments").map_err(decode)?,
        acted_at: acted_at.as_deref().map(parse_timestamp).transpose()?,
    })
}

fn row_to_entity(
    row: &SqliteRow,
    children: EntityChildren,
) -> Result<WorkflowEntity, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode)?;
    let kind_str: String = row.try_get("kind").map_err(decode)?;
    let status_str: String = row.try_get("status").map_err(decode)?;
    let amount_requested: Option<String> = row.try_get("amount_requested").map_err(decode)?;
    let amount_approved: Option<String> = row.try_get("amount_approved").map_err(decode)?;
    let attachments_json: String = row.try_get("attachments_json").map_err(decode)?;
    let details_json: String = row.try_get("details_json").map_err(decode)?;
    let created_at: String = row.try_get("created_at").map_err(decode)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode)?;
    let owner_user_id: String = row.try_get("owner_user_id").map_err(decode)?;

    let kind = EntityKind::parse(&kind_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown entity kind `{kind_str}`")))?;
    let status = EntityStatus::parse(&status_str, &kind.vocabulary()).map_err(decode)?;
    let approval_chain = ApprovalChain::from_steps(children.review_steps).map_err(decode)?;
    let justification = match children.justification {
        Some((notes, attachments, submitted_at)) => Some(Justification {
            notes,
            attachments,
            submitted_at,
            chain: ApprovalChain::from_steps(children.justification_steps).map_err(decode)?,
        }),
        None => None,
    };

    Ok(WorkflowEntity {
        id: EntityId(id),
        kind,
        owner: Owner {
            user_id: UserId::new(owner_user_id),
            name: row.try_get("owner_name").map_err(decode)?,
            department: row.try_get("owner_department").map_err(decode)?,
        },
        title: row.try_get("title").map_err(decode)?,
        description: row.try_get("description").map_err(decode)?,
        status,
        approval_chain,
        amount_requested: amount_requested.as_deref().map(parse_decimal).transpose()?,
        amount_approved: amount_approved.as_deref().map(parse_decimal).transpose()?,
        disbursements: children.disbursements,
        edit_history: children.edits,
        justification,
        attachments: serde_json::from_str(&attachments_json).map_err(decode)?,
        details: serde_json::from_str(&details_json).map_err(decode)?,
        review_started: row.try_get("review_started").map_err(decode)?,
        version: row.try_get("version").map_err(decode)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn decode(error: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(decode)
}

fn parse_decimal(raw: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(raw).map_err(|e| RepositoryError::Decode(format!("amount `{raw}`: {e}")))
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("timestamp `{raw}`: {e}")))
}
