//! `POST /auth/login` and `POST /auth/refresh` (spec §4.7): the minimal
//! service-principal login surface the Worker Auth Client (C7) speaks to.

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Field names match what `WorkerAuthClient`'s `TokenResponse` expects
/// (plain `access_token`/`refresh_token`, not camelCase).
#[derive(Debug, Serialize)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
}

async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> ApiResult<Json<TokenPairResponse>> {
    let (access_token, refresh_token) = state.auth_service.login(&body.email, &body.password)?;
    Ok(Json(TokenPairResponse { access_token, refresh_token }))
}

async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> ApiResult<Json<TokenPairResponse>> {
    let (access_token, refresh_token) = state.auth_service.refresh(&body.refresh_token)?;
    Ok(Json(TokenPairResponse { access_token, refresh_token }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
}
