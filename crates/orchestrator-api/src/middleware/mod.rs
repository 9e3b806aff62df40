//! Request middleware for the orchestrator API.

use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

use orchestrator_core::AuthService;

use crate::state::AppState;

/// Authenticated caller identity, attached to request extensions by
/// [`auth_middleware`] and pulled out by handlers via `Extension<Caller>`.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: uuid::Uuid,
    pub is_admin: bool,
}

/// Validates the bearer access token on every protected route (spec §6.1:
/// "all requests authenticated by a bearer access token except where noted").
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match auth_header.and_then(AuthService::extract_bearer_token) {
        Some(token) => token,
        None => return Err(StatusCode::UNAUTHORIZED),
    };

    let claims = state
        .auth_service
        .verify_access(token)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    request.extensions_mut().insert(Caller {
        user_id: claims.sub,
        is_admin: claims.is_admin,
    });

    Ok(next.run(request).await)
}
