use axum::{
    extract::{rejection::JsonRejection, FromRef, State},
    routing::post,
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{AuthAction, AuthRequest, AuthResponse},
        jwt::JwtKeys,
        services,
    },
    error::AppError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new().route("/auth", post(authenticate))
}

/// `POST /auth`, dispatching on `action`.
#[instrument(skip(state, body))]
pub async fn authenticate(
    State(state): State<AppState>,
    body: Result<Json<AuthRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AppError> {
    let Json(payload) = body?;

    let (user, message) = match payload.action {
        AuthAction::Register => (
            services::register(&state, &payload.email, &payload.password).await?,
            "User registered successfully",
        ),
        AuthAction::Login => (
            services::login(&state, &payload.email, &payload.password).await?,
            "Login successful",
        ),
        AuthAction::Unknown => return Err(AppError::Validation("Invalid action")),
    };

    let token = JwtKeys::from_ref(&state).sign(user.id)?;
    Ok(Json(AuthResponse {
        status: 200,
        message,
        user,
        token,
    }))
}
