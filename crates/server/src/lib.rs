pub mod api;
pub mod bootstrap;
pub mod health;
pub mod service;

use axum::Router;
use procura_db::DbPool;

/// Full HTTP surface: the workflow API plus the `/health` readiness report.
pub fn app(state: api::ApiState, db_pool: DbPool) -> Router {
    let readiness = health::HealthState::new(db_pool, state.service.engine().catalog().clone());
    api::router(state).merge(health::router(readiness))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use procura_db::fixtures::DemoDirectory;
    use procura_db::{connect_with_settings, migrations};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::api::ApiState;
    use crate::service::WorkflowService;

    #[tokio::test]
    async fn app_serves_health_and_api_from_one_router() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool");
        migrations::run_pending(&pool).await.expect("migrations");
        DemoDirectory::load(&pool).await.expect("seed directory");
        let service = WorkflowService::sqlite(pool.clone(), &Default::default());
        let app = super::app(ApiState::new(service, None), pool.clone());

        let health = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("health response");
        assert_eq!(health.status(), StatusCode::OK);
        let bytes = to_bytes(health.into_body(), usize::MAX).await.expect("body");
        let payload: Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(payload["status"], "ready");

        let inbox = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/approvals/pending")
                    .header("x-requester-id", "u-kofi")
                    .header("x-requester-role", "supervisor")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("inbox response");
        assert_eq!(inbox.status(), StatusCode::OK);

        pool.close().await;
    }
}
