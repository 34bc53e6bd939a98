//! JSON routes over the recommendation service.
//!
//! - `GET  /subscribers/{id}/recommendations?count=N`
//! - `POST /model/train`
//! - `GET  /model`

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use planwise_core::config::MAX_RECOMMENDATION_COUNT;
use planwise_core::domain::subscriber::SubscriberId;
use planwise_core::errors::InterfaceError;
use planwise_core::recommend::{ModelStatus, Recommendation, RecommendationService, TrainingReport};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct ApiState {
    service: Arc<RecommendationService>,
}

#[derive(Debug, Deserialize)]
pub struct RecommendationQuery {
    pub count: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub correlation_id: String,
}

/// Interface error rendered as a JSON response.
#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl From<InterfaceError> for ApiError {
    fn from(value: InterfaceError) -> Self {
        Self(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(
                event_name = "api.request.failed",
                correlation_id = %self.0.correlation_id(),
                error = %self.0,
                "request failed"
            );
        }

        let body = ErrorBody {
            error: self.0.user_message(),
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(service: Arc<RecommendationService>) -> Router {
    Router::new()
        .route("/subscribers/{id}/recommendations", get(recommendations))
        .route("/model/train", post(train))
        .route("/model", get(model_status))
        .with_state(ApiState { service })
}

pub async fn recommendations(
    State(state): State<ApiState>,
    Path(subscriber_id): Path<String>,
    Query(query): Query<RecommendationQuery>,
) -> Result<Json<Recommendation>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();

    let subscriber_id = subscriber_id.trim();
    if subscriber_id.is_empty() {
        return Err(bad_request("subscriber id is empty", correlation_id));
    }
    if let Some(count) = query.count {
        if count == 0 || count > MAX_RECOMMENDATION_COUNT {
            return Err(bad_request(
                format!("count must be in range 1..={MAX_RECOMMENDATION_COUNT}"),
                correlation_id,
            ));
        }
    }

    let recommendation = state
        .service
        .recommend(&SubscriberId(subscriber_id.to_string()), query.count)
        .await
        .map_err(|error| ApiError(error.into_interface(correlation_id.clone())))?;

    info!(
        event_name = "api.recommendation.served",
        correlation_id = %correlation_id,
        subscriber_id = %recommendation.subscriber_id,
        path = recommendation.path.as_str(),
        "recommendation served"
    );
    Ok(Json(recommendation))
}

/// Runs a training pass. A failed run answers 422 with the report and keeps
/// the previous model active.
pub async fn train(State(state): State<ApiState>) -> (StatusCode, Json<TrainingReport>) {
    let report = state.service.train().await;
    if report.is_success() {
        (StatusCode::OK, Json(report))
    } else {
        warn!(
            event_name = "api.training.rejected",
            reason = report.reason.as_deref().unwrap_or("unknown"),
            "training request did not produce a model"
        );
        (StatusCode::UNPROCESSABLE_ENTITY, Json(report))
    }
}

pub async fn model_status(State(state): State<ApiState>) -> Result<Json<ModelStatus>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let status = state
        .service
        .model_status()
        .await
        .map_err(|error| ApiError(error.into_interface(correlation_id)))?;
    Ok(Json(status))
}

fn bad_request(message: impl Into<String>, correlation_id: String) -> ApiError {
    ApiError(InterfaceError::BadRequest { message: message.into(), correlation_id })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
        Router,
    };
    use planwise_core::recommend::{EngineSettings, InMemoryArtifactStore, RecommendationService};
    use planwise_db::{
        connect_with_settings, migrations, DbPool, DemoDataset, SeedOptions, SqlRecommendationSource,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::router;

    fn service_over(pool: DbPool) -> Arc<RecommendationService> {
        Arc::new(RecommendationService::new(
            Arc::new(SqlRecommendationSource::new(pool)),
            Arc::new(InMemoryArtifactStore::new()),
            EngineSettings::default(),
        ))
    }

    async fn seeded_router() -> Router {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        DemoDataset::load(&pool, &SeedOptions::default()).await.expect("seed");
        router(service_over(pool))
    }

    async fn send(app: Router, method: Method, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn recommendations_use_requested_count() {
        let (status, body) =
            send(seeded_router().await, Method::GET, "/subscribers/sub-001/recommendations?count=2")
                .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["subscriber_id"], "sub-001");
        assert_eq!(body["path"]["path"], "heuristic");
        assert_eq!(body["plans"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn recommendations_reject_out_of_range_count() {
        let (status, body) =
            send(seeded_router().await, Method::GET, "/subscribers/sub-001/recommendations?count=0")
                .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["correlation_id"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[tokio::test]
    async fn recommendations_report_unavailable_when_schema_is_missing() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        let app = router(service_over(pool));

        let (status, body) = send(app, Method::GET, "/subscribers/sub-001/recommendations").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "The service is temporarily unavailable. Please retry shortly.");
    }

    #[tokio::test]
    async fn training_activates_a_model_visible_on_status() {
        let app = seeded_router().await;

        let (status, report) = send(app.clone(), Method::POST, "/model/train").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["status"], "succeeded");

        let (status, model) = send(app.clone(), Method::GET, "/model").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(model["active"]["version"], report["version"]);

        let (_, recommendation) =
            send(app, Method::GET, "/subscribers/sub-005/recommendations").await;
        assert_eq!(recommendation["path"]["path"], "model");
    }

    #[tokio::test]
    async fn training_without_history_is_unprocessable() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let app = router(service_over(pool));

        let (status, report) = send(app.clone(), Method::POST, "/model/train").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(report["status"], "failed");

        let (_, model) = send(app, Method::GET, "/model").await;
        assert!(model["active"].is_null());
    }
}
