use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use procura_core::{
    AuditEvent, DecisionCommand, DisbursementRequest, EditRequest, EntityDraft, EntityId,
    JustificationSubmission, WorkflowEntity,
};

use super::dto::{DeletedResponse, EntitySnapshot, ListQuery};
use super::{ApiError, ApiState, RequestContext};

type ApiResult<T> = Result<T, ApiError>;

fn body<T>(payload: Result<Json<T>, JsonRejection>, context: &RequestContext) -> ApiResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::from_json_rejection(rejection, &context.correlation_id))
}

fn snapshot(entity: &WorkflowEntity, context: &RequestContext) -> Json<EntitySnapshot> {
    Json(EntitySnapshot::for_requester(entity, &context.requester.user_id))
}

fn received(operation: &'static str, context: &RequestContext, entity_id: Option<&str>) {
    info!(
        event_name = "ingress.request.received",
        operation,
        correlation_id = %context.correlation_id,
        requester = %context.requester.user_id,
        entity_id = entity_id.unwrap_or(""),
        "workflow request received"
    );
}

pub async fn create_entity(
    State(state): State<ApiState>,
    context: RequestContext,
    payload: Result<Json<EntityDraft>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<EntitySnapshot>)> {
    received("create", &context, None);
    let draft = body(payload, &context)?;
    let entity = state
        .service
        .create(&context.requester, &context.correlation_id, draft)
        .await
        .map_err(|error| ApiError::from_application(error, &context.correlation_id))?;
    Ok((StatusCode::CREATED, snapshot(&entity, &context)))
}

pub async fn list_entities(
    State(state): State<ApiState>,
    context: RequestContext,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<EntitySnapshot>>> {
    let filter = query
        .into_filter()
        .map_err(|message| ApiError::bad_request(message, context.correlation_id.clone()))?;
    let entities = state
        .service
        .list(&filter)
        .await
        .map_err(|error| ApiError::from_application(error, &context.correlation_id))?;
    Ok(Json(
        entities
            .iter()
            .map(|entity| EntitySnapshot::for_requester(entity, &context.requester.user_id))
            .collect(),
    ))
}

pub async fn pending_approvals(
    State(state): State<ApiState>,
    context: RequestContext,
) -> ApiResult<Json<Vec<EntitySnapshot>>> {
    let entities = state
        .service
        .pending_for(&context.requester)
        .await
        .map_err(|error| ApiError::from_application(error, &context.correlation_id))?;
    Ok(Json(
        entities
            .iter()
            .map(|entity| EntitySnapshot::for_requester(entity, &context.requester.user_id))
            .collect(),
    ))
}

pub async fn get_entity(
    State(state): State<ApiState>,
    context: RequestContext,
    Path(id): Path<String>,
) -> ApiResult<Json<EntitySnapshot>> {
    let entity = state
        .service
        .get(&EntityId(id))
        .await
        .map_err(|error| ApiError::from_application(error, &context.correlation_id))?;
    Ok(snapshot(&entity, &context))
}

pub async fn delete_entity(
    State(state): State<ApiState>,
    context: RequestContext,
    Path(id): Path<String>,
) -> ApiResult<Json<DeletedResponse>> {
    received("delete", &context, Some(&id));
    let entity_id = EntityId(id);
    state
        .service
        .delete(&entity_id, &context.requester, &context.correlation_id)
        .await
        .map_err(|error| ApiError::from_application(error, &context.correlation_id))?;
    Ok(Json(DeletedResponse { id: entity_id.0, deleted: true }))
}

pub async fn decide(
    State(state): State<ApiState>,
    context: RequestContext,
    Path(id): Path<String>,
    payload: Result<Json<DecisionCommand>, JsonRejection>,
) -> ApiResult<Json<EntitySnapshot>> {
    received("decide", &context, Some(&id));
    let command = body(payload, &context)?;
    let entity = state
        .service
        .decide(&EntityId(id), &context.requester, &context.correlation_id, command)
        .await
        .map_err(|error| ApiError::from_application(error, &context.correlation_id))?;
    Ok(snapshot(&entity, &context))
}

pub async fn disburse(
    State(state): State<ApiState>,
    context: RequestContext,
    Path(id): Path<String>,
    payload: Result<Json<DisbursementRequest>, JsonRejection>,
) -> ApiResult<Json<EntitySnapshot>> {
    received("disburse", &context, Some(&id));
    let request = body(payload, &context)?;
    let entity = state
        .service
        .disburse(&EntityId(id), &context.requester, &context.correlation_id, request)
        .await
        .map_err(|error| ApiError::from_application(error, &context.correlation_id))?;
    Ok(snapshot(&entity, &context))
}

pub async fn edit(
    State(state): State<ApiState>,
    context: RequestContext,
    Path(id): Path<String>,
    payload: Result<Json<EditRequest>, JsonRejection>,
) -> ApiResult<Json<EntitySnapshot>> {
    received("edit", &context, Some(&id));
    let request = body(payload, &context)?;
    let entity = state
        .service
        .edit(&EntityId(id), &context.requester, &context.correlation_id, request)
        .await
        .map_err(|error| ApiError::from_application(error, &context.correlation_id))?;
    Ok(snapshot(&entity, &context))
}

pub async fn justify(
    State(state): State<ApiState>,
    context: RequestContext,
    Path(id): Path<String>,
    payload: Result<Json<JustificationSubmission>, JsonRejection>,
) -> ApiResult<Json<EntitySnapshot>> {
    received("justify", &context, Some(&id));
    let submission = body(payload, &context)?;
    let entity = state
        .service
        .justify(&EntityId(id), &context.requester, &context.correlation_id, submission)
        .await
        .map_err(|error| ApiError::from_application(error, &context.correlation_id))?;
    Ok(snapshot(&entity, &context))
}

pub async fn audit_trail(
    State(state): State<ApiState>,
    context: RequestContext,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<AuditEvent>>> {
    let events = state
        .service
        .audit_trail(&EntityId(id))
        .await
        .map_err(|error| ApiError::from_application(error, &context.correlation_id))?;
    Ok(Json(events))
}
