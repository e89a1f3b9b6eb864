//! Endpoints of HTTP server.
//!
use std::{sync::Arc, time::Instant};

use anyhow::anyhow;
use axum::{
    extract::{rejection::BytesRejection, DefaultBodyLimit},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use bytes::Bytes;
use common::protocol::{PredictResponse, PREDICT_PATH};
use serde_json::Value;

use crate::{
    codec::decode_image, error::PredictError, meter::METER, pipeline::Pipeline,
    registry::ModelRegistry,
};

/// State shared by all handlers.
pub struct AppState {
    pub registry: ModelRegistry,
    pub pipeline: Pipeline,
    /// Answer errors with differentiated status codes instead of 200.
    pub error_status_codes: bool,
}

impl AppState {
    pub fn new(registry: ModelRegistry, pipeline: Pipeline, error_status_codes: bool) -> Self {
        Self {
            registry,
            pipeline,
            error_status_codes,
        }
    }
}

/// Build the router with all endpoints.
pub fn router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/healthcheck", get(healthcheck))
        .route(PREDICT_PATH, post(predict))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(Extension(state))
}

/// Health check endpoint.
pub async fn healthcheck() -> &'static str {
    "healthy"
}

/// Annotate the posted image with detected objects.
///
/// The body is read as plain bytes so that malformed requests are answered with the same JSON
/// error shape as every other failure.
pub async fn predict(
    Extension(state): Extension<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> (StatusCode, Json<PredictResponse>) {
    let start = Instant::now();

    match handle_predict(Arc::clone(&state), body).await {
        Ok(image) => {
            METER.tick_prediction(start.elapsed());
            (StatusCode::OK, Json(PredictResponse::success(image)))
        }
        Err(err) => {
            METER.tick_failure(start.elapsed());
            log::warn!("Prediction failed: {}", err);

            let status = match state.error_status_codes {
                true => err.status_code(),
                false => StatusCode::OK,
            };
            (status, Json(PredictResponse::error(err.to_string())))
        }
    }
}

async fn handle_predict(
    state: Arc<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<String, PredictError> {
    let body = body.map_err(|rejection| PredictError::Body {
        status: rejection.status(),
        message: rejection.body_text(),
    })?;
    let payload = extract_image(&body)?;

    let image = run_blocking(move || decode_image(&payload)).await?;
    log::info!("Received {}x{} image", image.width(), image.height());

    let model = state.registry.get().await?;

    let annotated =
        run_blocking(move || Ok(state.pipeline.run(model.as_ref(), &image)?)).await?;
    log::info!("Annotated {} detections", annotated.detections.len());

    Ok(annotated.image)
}

/// Pull the base64 image out of a JSON body.
fn extract_image(body: &[u8]) -> Result<String, PredictError> {
    let value: Value = serde_json::from_slice(body).map_err(|e| {
        log::debug!("Body is not JSON: {}", e);
        PredictError::MissingImage
    })?;

    match value {
        Value::Object(mut fields) => match fields.remove("image") {
            Some(Value::String(image)) => Ok(image),
            Some(_) => Err(PredictError::InvalidImage),
            None => Err(PredictError::MissingImage),
        },
        _ => Err(PredictError::MissingImage),
    }
}

/// Run CPU-heavy work on the blocking thread pool.
async fn run_blocking<T, F>(f: F) -> Result<T, PredictError>
where
    F: FnOnce() -> Result<T, PredictError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PredictError::Internal(anyhow!("worker task failed: {}", e)))?
}
