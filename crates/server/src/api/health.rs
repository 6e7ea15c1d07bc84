use axum::Json;
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};

use super::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GreetResponse {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct GreetParams {
    pub name: Option<String>,
}

/// `GET /api/v1/health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        service: state.node.to_string(),
    })
}

/// `GET /api/v1/greet?name=X`; an absent or empty name greets `World`.
pub async fn greet(Query(params): Query<GreetParams>) -> Json<GreetResponse> {
    let name = params
        .name
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "World".to_owned());
    Json(GreetResponse {
        message: format!("Hello, {name}!"),
    })
}
