//! Conversation Handlers
//!
//! - `POST /api/conversations`
//! - `GET  /api/conversations`
//! - `GET  /api/conversations/{id}`

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::backend::error::BackendError;
use crate::backend::middleware::AuthUser;
use crate::backend::server::state::PgConversationService;
use crate::shared::conversation::ListConversationsResponse;
use crate::shared::{Conversation, CreateConversationRequest};

/// Create a dialog or a group owned by the caller
///
/// # Example Request
///
/// ```json
/// {"kind": "group", "name": "Team", "member_ids": ["..."]}
/// ```
pub async fn create_conversation(
    State(service): State<PgConversationService>,
    AuthUser(user): AuthUser,
    Json(request): Json<CreateConversationRequest>,
) -> Result<(StatusCode, Json<Conversation>), BackendError> {
    let conversation = service.create(user.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

pub async fn list_conversations(
    State(service): State<PgConversationService>,
    AuthUser(user): AuthUser,
) -> Result<Json<ListConversationsResponse>, BackendError> {
    let conversations = service.list(user.user_id).await?;
    Ok(Json(ListConversationsResponse { conversations }))
}

pub async fn get_conversation(
    State(service): State<PgConversationService>,
    AuthUser(user): AuthUser,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<Conversation>, BackendError> {
    let conversation = service.get(user.user_id, conversation_id).await?;
    Ok(Json(conversation))
}
