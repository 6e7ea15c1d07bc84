use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, Method, Uri};
use serde_json::Value;
use tracing::{info, instrument};

use hopsim_core::payload;
use hopsim_core::{InvocationId, PAYLOAD_HEADER, PayloadError};

use super::AppState;
use crate::error::ServerError;

/// Primary endpoint: any method, any path not claimed by an auxiliary route.
///
/// Decodes the continuation payload, runs it against a fresh context store
/// and answers with the result. Execution failures are still `200`, carrying
/// the structured failure value; only payload problems are `400`.
#[instrument(
    name = "invocation",
    skip_all,
    fields(node = %state.node, invocation = %InvocationId::generate(), method = %method, path = %uri.path())
)]
pub async fn execute(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Json<Value>, ServerError> {
    let raw = headers
        .get(PAYLOAD_HEADER)
        .ok_or(PayloadError::Missing)?
        .to_str()
        .map_err(|e| PayloadError::Malformed(format!("header is not ASCII: {e}")))?;
    let actions = payload::decode(raw, &state.limits)?;

    info!(actions = actions.len(), "invocation received");
    let result = state.interpreter.run(&actions).await;
    Ok(Json(result))
}
