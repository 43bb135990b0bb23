//! JSON API over the workflow service.
//!
//! Endpoints:
//! - `POST   /api/v1/entities`                    open a new entity
//! - `GET    /api/v1/entities`                    list snapshots (`kind`, `status`, `owner`)
//! - `GET    /api/v1/approvals/pending`           entities waiting on the requester
//! - `GET    /api/v1/entities/{id}`               snapshot with `canEdit` / `canDelete`
//! - `DELETE /api/v1/entities/{id}`               owner delete before review starts
//! - `POST   /api/v1/entities/{id}/decision`      approve or reject the active step
//! - `POST   /api/v1/entities/{id}/disburse`      record a disbursement tranche
//! - `POST   /api/v1/entities/{id}/edit`          resubmit after a rejection
//! - `POST   /api/v1/entities/{id}/justification` open the justification chain
//! - `GET    /api/v1/entities/{id}/audit`         audit trail

pub mod dto;
pub mod error;
pub mod handlers;
pub mod requester;

use axum::{
    routing::{get, post},
    Router,
};
use secrecy::SecretString;

use crate::service::WorkflowService;

pub use error::ApiError;
pub use requester::RequestContext;

pub const REQUESTER_ID_HEADER: &str = "x-requester-id";
pub const REQUESTER_ROLE_HEADER: &str = "x-requester-role";
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct ApiState {
    pub service: WorkflowService,
    pub api_token: Option<SecretString>,
}

impl ApiState {
    pub fn new(service: WorkflowService, api_token: Option<SecretString>) -> Self {
        Self { service, api_token }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/entities", get(handlers::list_entities).post(handlers::create_entity))
        .route("/api/v1/approvals/pending", get(handlers::pending_approvals))
        .route("/api/v1/entities/{id}", get(handlers::get_entity).delete(handlers::delete_entity))
        .route("/api/v1/entities/{id}/decision", post(handlers::decide))
        .route("/api/v1/entities/{id}/disburse", post(handlers::disburse))
        .route("/api/v1/entities/{id}/edit", post(handlers::edit))
        .route("/api/v1/entities/{id}/justification", post(handlers::justify))
        .route("/api/v1/entities/{id}/audit", get(handlers::audit_trail))
        .with_state(state)
}
