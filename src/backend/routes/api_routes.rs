/**
 * API Routes
 *
 * ## Public
 * - `POST /api/auth/signup`
 * - `POST /api/auth/login`
 *
 * ## Protected (bearer token)
 * - `GET /api/auth/me`
 * - `POST|GET /api/conversations`
 * - `GET /api/conversations/{conversation_id}`
 * - `GET|POST /api/conversations/{conversation_id}/participants`
 * - `GET|PATCH /api/conversations/{conversation_id}/participants/{user_id}`
 */

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::backend::auth::handlers::{get_me, login, signup};
use crate::backend::auth::JwtAuthenticator;
use crate::backend::conversations::handlers::{
    create_conversation, get_conversation, list_conversations,
};
use crate::backend::membership::handlers::{
    get_participant, invite_participant, list_participants, update_participant_status,
};
use crate::backend::middleware::auth_middleware;
use crate::backend::server::state::AppState;

pub fn configure_api_routes(
    router: Router<AppState>,
    authenticator: Arc<JwtAuthenticator>,
) -> Router<AppState> {
    let public = Router::new()
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/login", post(login));

    let protected = Router::new()
        .route("/api/auth/me", get(get_me))
        .route(
            "/api/conversations",
            post(create_conversation).get(list_conversations),
        )
        .route("/api/conversations/{conversation_id}", get(get_conversation))
        .route(
            "/api/conversations/{conversation_id}/participants",
            get(list_participants).post(invite_participant),
        )
        .route(
            "/api/conversations/{conversation_id}/participants/{user_id}",
            get(get_participant).patch(update_participant_status),
        )
        .route_layer(middleware::from_fn_with_state(authenticator, auth_middleware));

    router.merge(public).merge(protected)
}
