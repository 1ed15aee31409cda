/**
 * Login Handler
 *
 * POST /api/auth/login
 *
 * The username field also accepts an email address. Unknown users and
 * wrong passwords get the same 401.
 */

use axum::{extract::State, response::Json};
use bcrypt::verify;
use sqlx::PgPool;
use std::sync::Arc;

use crate::backend::auth::handlers::types::{AuthResponse, LoginRequest};
use crate::backend::auth::sessions::JwtAuthenticator;
use crate::backend::auth::users::{get_user_by_email, get_user_by_username};
use crate::backend::error::BackendError;

pub async fn login(
    State(pool): State<PgPool>,
    State(authenticator): State<Arc<JwtAuthenticator>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, BackendError> {
    tracing::info!("Login request for: {}", request.username);

    let user = match get_user_by_username(&pool, &request.username).await? {
        Some(user) => Some(user),
        None if request.username.contains('@') => get_user_by_email(&pool, &request.username).await?,
        None => None,
    };
    let user = user.ok_or_else(|| BackendError::unauthorized("invalid credentials"))?;

    let valid = verify(&request.password, &user.password_hash).map_err(|e| {
        tracing::error!("Failed to verify password: {:?}", e);
        BackendError::transient("password could not be verified")
    })?;
    if !valid {
        tracing::warn!("Invalid password for user: {}", user.id);
        return Err(BackendError::unauthorized("invalid credentials"));
    }

    let token = authenticator.create_token(user.id, &user.email)?;
    tracing::info!("User logged in: {}", user.id);

    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}
