use axum::{
    Json, debug_handler,
    extract::{Path, State},
};
use serde::Deserialize;

use super::{ConversationManager, ConversationSummary};
use crate::{
    AppResult,
    db::{ConversationId, ConversationWithParticipants, UserId},
    res::{self, ApiResponse},
    session::AuthUser,
};

type Reply<T> = AppResult<Json<ApiResponse<T>>>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateDirectBody {
    friend_id: UserId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateGroupBody {
    group_name: String,
    participant_ids: Vec<UserId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateGroupBody {
    group_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MemberBody {
    member_id: UserId,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn create_direct(
    AuthUser(user_id): AuthUser,
    State(conversations): State<ConversationManager>,
    Json(CreateDirectBody { friend_id }): Json<CreateDirectBody>,
) -> Reply<ConversationWithParticipants> {
    let outcome = conversations.create_direct(user_id, friend_id).await?;
    let message = if outcome.created {
        "New conversation started."
    } else {
        "Existing conversation found."
    };
    Ok(res::ok(message, outcome.conversation))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn create_group(
    AuthUser(user_id): AuthUser,
    State(conversations): State<ConversationManager>,
    Json(CreateGroupBody { group_name, participant_ids }): Json<CreateGroupBody>,
) -> Reply<ConversationWithParticipants> {
    let group = conversations
        .create_group(user_id, &group_name, &participant_ids)
        .await?;
    Ok(res::ok("Group conversation created successfully.", group))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn update_group(
    AuthUser(user_id): AuthUser,
    State(conversations): State<ConversationManager>,
    Path(conversation_id): Path<ConversationId>,
    Json(UpdateGroupBody { group_name }): Json<UpdateGroupBody>,
) -> Reply<ConversationWithParticipants> {
    let group = conversations
        .update_group_info(conversation_id, user_id, group_name.as_deref())
        .await?;
    Ok(res::ok("Group conversation updated successfully.", group))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn add_member(
    AuthUser(user_id): AuthUser,
    State(conversations): State<ConversationManager>,
    Path(conversation_id): Path<ConversationId>,
    Json(MemberBody { member_id }): Json<MemberBody>,
) -> Reply<ConversationWithParticipants> {
    let group = conversations.add_member(conversation_id, user_id, member_id).await?;
    Ok(res::ok("Group member added successfully.", group))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn remove_member(
    AuthUser(user_id): AuthUser,
    State(conversations): State<ConversationManager>,
    Path((conversation_id, member_id)): Path<(ConversationId, UserId)>,
) -> Reply<ConversationWithParticipants> {
    let group = conversations
        .remove_member(conversation_id, user_id, member_id)
        .await?;
    Ok(res::ok("Group member removed successfully.", group))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn leave_group(
    AuthUser(user_id): AuthUser,
    State(conversations): State<ConversationManager>,
    Path(conversation_id): Path<ConversationId>,
) -> Reply<ConversationWithParticipants> {
    let group = conversations.leave_group(conversation_id, user_id).await?;
    Ok(res::ok("You have left the group successfully.", group))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn list_all(
    AuthUser(_): AuthUser,
    State(conversations): State<ConversationManager>,
) -> Reply<Vec<ConversationSummary>> {
    let all = conversations.list_all_conversations().await?;
    let message = format!("{} conversations.", all.len());
    Ok(res::ok(message, all))
}
