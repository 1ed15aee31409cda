/**
 * Participant Handlers
 *
 * REST surface of the participant service. Every route is behind the auth
 * middleware; the caller id comes from the verified token.
 *
 * # Routes
 *
 * - `GET    /api/conversations/{id}/participants`
 * - `GET    /api/conversations/{id}/participants/{user_id}`
 * - `POST   /api/conversations/{id}/participants`
 * - `PATCH  /api/conversations/{id}/participants/{user_id}`
 */

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::backend::error::BackendError;
use crate::backend::middleware::AuthUser;
use crate::backend::server::state::PgParticipantService;
use crate::shared::participant::{
    InviteParticipantRequest, ListParticipantsResponse, UpdateParticipantStatusRequest,
};
use crate::shared::Participant;

pub async fn list_participants(
    State(service): State<PgParticipantService>,
    AuthUser(user): AuthUser,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<ListParticipantsResponse>, BackendError> {
    let participants = service.list(user.user_id, conversation_id).await?;
    Ok(Json(ListParticipantsResponse { participants }))
}

pub async fn get_participant(
    State(service): State<PgParticipantService>,
    AuthUser(user): AuthUser,
    Path((conversation_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Participant>, BackendError> {
    let participant = service.get(user.user_id, conversation_id, user_id).await?;
    Ok(Json(participant))
}

/// Invite a user into a group
///
/// # Errors
///
/// * `404` - caller is not a member, or the invited user does not exist
/// * `403` - caller is not an admin, or the conversation is a dialog
/// * `409` - the user already has a row in this conversation
pub async fn invite_participant(
    State(service): State<PgParticipantService>,
    AuthUser(user): AuthUser,
    Path(conversation_id): Path<Uuid>,
    Json(request): Json<InviteParticipantRequest>,
) -> Result<(StatusCode, Json<Participant>), BackendError> {
    let participant = service
        .invite(user.user_id, conversation_id, request.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(participant)))
}

/// Leave, rejoin, kick or reinstate
///
/// # Errors
///
/// * `404` - caller is not a member, or the target has no row
/// * `403` - acting on someone else without admin rights
/// * `409` - the transition is not allowed from the current status
/// * `503` - the change was committed but its notification was lost
pub async fn update_participant_status(
    State(service): State<PgParticipantService>,
    AuthUser(user): AuthUser,
    Path((conversation_id, user_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<UpdateParticipantStatusRequest>,
) -> Result<Json<Participant>, BackendError> {
    let participant = service
        .update_status(user.user_id, conversation_id, user_id, request.status)
        .await?;
    Ok(Json(participant))
}
