//! Tuning API (§6): a flat GET/POST surface over [`Tuning`], mirroring
//! `daringsby`'s small `axum::Router`-per-capability services
//! (`face_gallery`, `canvas_stream`) rather than a standalone web binary.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::RwLock;

use crate::config::{Tuning, TuningPatch};
use crate::error::ConfigError;

#[derive(Clone)]
struct ApiState {
    tuning: Arc<RwLock<Tuning>>,
}

/// Build a router exposing `GET /tuning` and `POST /tuning` over shared
/// tuning state. A POST merges a [`TuningPatch`]; unset fields preserve
/// the current value. Invalid merges leave the stored value unchanged
/// and return 422.
pub fn router(tuning: Arc<RwLock<Tuning>>) -> Router {
    let state = ApiState { tuning };
    Router::new()
        .route("/tuning", get(get_tuning).post(post_tuning))
        .with_state(state)
}

async fn get_tuning(State(state): State<ApiState>) -> Json<Tuning> {
    Json(state.tuning.read().await.clone())
}

async fn post_tuning(
    State(state): State<ApiState>,
    Json(patch): Json<TuningPatch>,
) -> Result<Json<Tuning>, (axum::http::StatusCode, String)> {
    let mut tuning = state.tuning.write().await;
    let mut candidate = tuning.clone();
    candidate
        .apply_patch(patch)
        .map_err(|e: ConfigError| (axum::http::StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;
    *tuning = candidate.clone();
    Ok(Json(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn shared(tuning: Tuning) -> Arc<RwLock<Tuning>> {
        Arc::new(RwLock::new(tuning))
    }

    /// GET returns the current tuning as JSON.
    #[tokio::test]
    async fn get_returns_current_tuning() {
        let app = router(shared(Tuning::default()));
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/tuning")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let parsed: Tuning = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed, Tuning::default());
    }

    /// POST with a single field set merges into the stored tuning,
    /// leaving the rest untouched.
    #[tokio::test]
    async fn post_merges_partial_patch() {
        let store = shared(Tuning::default());
        let app = router(store.clone());
        let patch = serde_json::json!({ "detection_hz": 8.0 });
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/tuning")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(patch.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let stored = store.read().await;
        assert_eq!(stored.detection_hz, 8.0);
        assert_eq!(stored.pitch, Tuning::default().pitch);
    }

    /// An invalid patch is rejected with 422 and leaves state unchanged.
    #[tokio::test]
    async fn post_rejects_invalid_patch() {
        let store = shared(Tuning::default());
        let app = router(store.clone());
        let patch = serde_json::json!({ "detection_hz": 999.0 });
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/tuning")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(patch.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(store.read().await.detection_hz, Tuning::default().detection_hz);
    }
}
