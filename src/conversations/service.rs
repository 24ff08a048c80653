use std::{collections::BTreeSet, sync::Arc};

use serde::Serialize;
use tracing::info;

use crate::{
    appresult::{ChatError, ChatResult},
    db::{Conversation, ConversationId, ConversationWithParticipants, Role, UserId},
    friends::FriendDirectory,
    locks::ConversationLocks,
    realtime::Rooms,
    store::Store,
};

const MAX_GROUP_NAME_CHARS: usize = 100;

#[derive(Debug, Clone)]
pub struct DirectOutcome {
    pub conversation: ConversationWithParticipants,
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParticipantSummary {
    pub id: UserId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub conversation_id: ConversationId,
    pub is_group: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Display name of the group admin.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin: Option<String>,
    pub participants: Vec<ParticipantSummary>,
}

impl From<ConversationWithParticipants> for ConversationSummary {
    fn from(ConversationWithParticipants { conversation, participants }: ConversationWithParticipants) -> Self {
        let admin = conversation.is_group.then(|| {
            participants
                .iter()
                .find(|p| match p.role {
                    Some(Role::Admin) => true,
                    Some(Role::Member) | None => false,
                })
                .map_or_else(|| "N/A".to_owned(), |p| p.user.name.clone())
        });

        Self {
            conversation_id: conversation.id,
            is_group: conversation.is_group,
            name: conversation.group_name,
            admin,
            participants: participants
                .into_iter()
                .map(|p| ParticipantSummary { id: p.user.id, name: p.user.name })
                .collect(),
        }
    }
}

fn validate_group_name(name: &str) -> ChatResult<&str> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_GROUP_NAME_CHARS {
        return Err(ChatError::InvalidName);
    }
    Ok(name)
}

/// Creates and administers conversations.
#[derive(Clone)]
pub struct ConversationManager {
    store: Store,
    friends: Arc<dyn FriendDirectory>,
    rooms: Arc<Rooms>,
    locks: Arc<ConversationLocks>,
}

impl ConversationManager {
    pub fn new(
        store: Store,
        friends: Arc<dyn FriendDirectory>,
        rooms: Arc<Rooms>,
        locks: Arc<ConversationLocks>,
    ) -> Self {
        Self { store, friends, rooms, locks }
    }

    async fn load(&self, id: ConversationId) -> ChatResult<ConversationWithParticipants> {
        self.store
            .conversation_with_participants(id)
            .await?
            .ok_or(ChatError::ConversationNotFound)
    }

    async fn group(&self, id: ConversationId) -> ChatResult<Conversation> {
        match self.store.conversation(id).await? {
            Some(conversation) if conversation.is_group => Ok(conversation),
            _ => Err(ChatError::NotFound),
        }
    }

    async fn group_as_admin(&self, id: ConversationId, requester_id: UserId) -> ChatResult<Conversation> {
        let group = self.group(id).await?;
        if !group.is_admin(requester_id) {
            return Err(ChatError::NotAuthorized);
        }
        Ok(group)
    }

    /// Finds or starts the 1:1 conversation between two friends.
    pub async fn create_direct(&self, initiator_id: UserId, peer_id: UserId) -> ChatResult<DirectOutcome> {
        if initiator_id == peer_id {
            return Err(ChatError::SelfConversation);
        }
        if !self.friends.are_friends(initiator_id, peer_id).await? {
            return Err(ChatError::NotFriends);
        }

        let direct = self.store.find_or_create_direct(initiator_id, peer_id).await?;
        if direct.created {
            info!(conversation_id = direct.id, initiator_id, peer_id, "direct conversation started");
        }

        Ok(DirectOutcome {
            conversation: self.load(direct.id).await?,
            created: direct.created,
        })
    }

    pub async fn create_group(
        &self,
        creator_id: UserId,
        name: &str,
        participant_ids: &[UserId],
    ) -> ChatResult<ConversationWithParticipants> {
        let name = validate_group_name(name)?;

        let members: Vec<UserId> = participant_ids
            .iter()
            .copied()
            .chain([creator_id])
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if members.len() < 2 {
            return Err(ChatError::InsufficientMembers);
        }
        if self.store.count_existing_users(&members).await? != members.len() {
            return Err(ChatError::UnknownParticipant);
        }

        let id = self.store.insert_group(name, creator_id, &members).await?;
        info!(conversation_id = id, creator_id, members = members.len(), "group created");

        self.load(id).await
    }

    /// `new_name: None` leaves the group unchanged.
    pub async fn update_group_info(
        &self,
        id: ConversationId,
        requester_id: UserId,
        new_name: Option<&str>,
    ) -> ChatResult<ConversationWithParticipants> {
        let new_name = new_name.map(validate_group_name).transpose()?;
        self.group_as_admin(id, requester_id).await?;

        if let Some(name) = new_name {
            self.store.update_group_name(id, name).await?;
            info!(conversation_id = id, "group renamed");
        }

        self.load(id).await
    }

    pub async fn add_member(
        &self,
        id: ConversationId,
        requester_id: UserId,
        new_user_id: UserId,
    ) -> ChatResult<ConversationWithParticipants> {
        let _guard = self.locks.lock(id).await;
        self.group_as_admin(id, requester_id).await?;

        if self.store.user(new_user_id).await?.is_none() {
            return Err(ChatError::UnknownParticipant);
        }
        if !self.store.insert_participant(id, new_user_id, Role::Member).await? {
            return Err(ChatError::AlreadyMember);
        }
        info!(conversation_id = id, user_id = new_user_id, "member added");

        self.load(id).await
    }

    /// The admin cannot be removed; adminship has to move first.
    pub async fn remove_member(
        &self,
        id: ConversationId,
        requester_id: UserId,
        target_user_id: UserId,
    ) -> ChatResult<ConversationWithParticipants> {
        let _guard = self.locks.lock(id).await;
        let group = self.group_as_admin(id, requester_id).await?;

        if !self.store.is_participant(id, target_user_id).await? {
            return Err(ChatError::NotAMember);
        }
        if group.is_admin(target_user_id) {
            return Err(ChatError::AdminMustTransfer);
        }
        self.drop_participant(id, target_user_id).await?;
        info!(conversation_id = id, user_id = target_user_id, "member removed");

        self.load(id).await
    }

    pub async fn leave_group(&self, id: ConversationId, user_id: UserId) -> ChatResult<ConversationWithParticipants> {
        let _guard = self.locks.lock(id).await;
        let group = self.group(id).await?;

        if !self.store.is_participant(id, user_id).await? {
            return Err(ChatError::NotAMember);
        }
        if group.is_admin(user_id) {
            return Err(ChatError::AdminMustTransfer);
        }
        self.drop_participant(id, user_id).await?;
        info!(conversation_id = id, user_id, "member left");

        self.load(id).await
    }

    async fn drop_participant(&self, id: ConversationId, user_id: UserId) -> ChatResult<()> {
        if !self.store.delete_participant(id, user_id).await? {
            return Err(ChatError::NotAMember);
        }
        let evicted = self.rooms.evict_user(id, user_id);
        if evicted > 0 {
            info!(conversation_id = id, user_id, evicted, "closed room subscriptions of departed member");
        }
        Ok(())
    }

    /// Every conversation in the system, unfiltered.
    pub async fn list_all_conversations(&self) -> ChatResult<Vec<ConversationSummary>> {
        let conversations = self.store.list_conversations().await?;
        Ok(conversations.into_iter().map(ConversationSummary::from).collect())
    }
}
