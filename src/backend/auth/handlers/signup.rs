/**
 * Signup Handler
 *
 * POST /api/auth/signup
 *
 * 1. Validate username, email and password
 * 2. Hash the password with bcrypt
 * 3. Insert the user (a taken username or email is a 409)
 * 4. Return a token and the public user info
 */

use axum::{extract::State, http::StatusCode, response::Json};
use bcrypt::{hash, DEFAULT_COST};
use sqlx::PgPool;
use std::sync::Arc;

use crate::backend::auth::handlers::types::{AuthResponse, SignupRequest};
use crate::backend::auth::sessions::JwtAuthenticator;
use crate::backend::auth::users::create_user;
use crate::backend::error::BackendError;

pub async fn signup(
    State(pool): State<PgPool>,
    State(authenticator): State<Arc<JwtAuthenticator>>,
    Json(request): Json<SignupRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), BackendError> {
    tracing::info!("Signup request for username: {}", request.username);
    request.validate()?;

    let password_hash = hash(&request.password, DEFAULT_COST).map_err(|e| {
        tracing::error!("Failed to hash password: {:?}", e);
        BackendError::transient("password could not be hashed")
    })?;

    let user = create_user(&pool, &request.username, &request.email, &password_hash).await?;
    let token = authenticator.create_token(user.id, &user.email)?;

    tracing::info!("User created: {}", user.id);
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: user.into(),
        }),
    ))
}
