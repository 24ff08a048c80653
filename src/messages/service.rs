use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::{
    appresult::{ChatError, ChatResult},
    db::{ConversationId, Message, MessageId, UserId},
    locks::ConversationLocks,
    notify::{NotificationEvent, NotificationKind, Notifier},
    realtime::{DeletedPayload, Rooms, ServerEvent},
    store::Store,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentMessage {
    pub id: MessageId,
    pub text: String,
    pub sender_name: String,
    pub conversation_id: ConversationId,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<&Message> for SentMessage {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            text: message.text.clone(),
            sender_name: message.sender_name.clone(),
            conversation_id: message.conversation_id,
            created_at: message.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: MessageId,
    pub text: String,
    pub sender_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Message> for MessageView {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            text: message.text,
            sender_name: message.sender_name,
            created_at: message.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessages {
    pub conversation_id: ConversationId,
    pub messages: Vec<MessageView>,
}

fn require_text(text: &str) -> ChatResult<()> {
    if text.trim().is_empty() {
        return Err(ChatError::EmptyText);
    }
    Ok(())
}

/// Sends, edits, deletes and lists messages, and hands every change to the
/// realtime rooms.
///
/// Writes to one conversation hold that conversation's lock from validation
/// through the publish, so events go out in the order the writes completed
/// and a member who was just removed cannot slip a message in.
#[derive(Clone)]
pub struct MessageService {
    store: Store,
    rooms: Arc<Rooms>,
    notifier: Arc<dyn Notifier>,
    locks: Arc<ConversationLocks>,
}

impl MessageService {
    pub fn new(
        store: Store,
        rooms: Arc<Rooms>,
        notifier: Arc<dyn Notifier>,
        locks: Arc<ConversationLocks>,
    ) -> Self {
        Self { store, rooms, notifier, locks }
    }

    pub async fn send(&self, conversation_id: ConversationId, sender_id: UserId, text: &str) -> ChatResult<SentMessage> {
        require_text(text)?;

        let message = {
            let _guard = self.locks.lock(conversation_id).await;

            if self.store.conversation(conversation_id).await?.is_none() {
                return Err(ChatError::ConversationNotFound);
            }
            let message = self
                .store
                .insert_message_from_participant(conversation_id, sender_id, text)
                .await?
                .ok_or(ChatError::NotAParticipant)?;

            let delivered = self
                .rooms
                .publish(conversation_id, ServerEvent::MessageCreated((&message).into()));
            debug!(message_id = message.id, conversation_id, delivered, "message published");
            message
        };

        self.notify_recipients(&message).await;
        Ok(SentMessage::from(&message))
    }

    async fn notify_recipients(&self, message: &Message) {
        let recipients = match self.store.participant_ids(message.conversation_id).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(message_id = message.id, error = %e, "skipping notifications, participant lookup failed");
                return;
            }
        };

        for receiver_id in recipients.into_iter().filter(|&id| id != message.sender_id) {
            self.notifier.notify(NotificationEvent {
                kind: NotificationKind::NewMessage,
                sender_id: message.sender_id,
                receiver_id,
                text: "sent you a new message".to_owned(),
                entity_id: message.id.to_string(),
            });
        }
    }

    /// Loads the message, then takes its conversation's lock and loads it
    /// again so the caller sees the row as of inside the critical section.
    async fn owned_message(
        &self,
        message_id: MessageId,
        requester_id: UserId,
    ) -> ChatResult<(Message, tokio::sync::OwnedMutexGuard<()>)> {
        let conversation_id = self
            .store
            .message(message_id)
            .await?
            .ok_or(ChatError::MessageNotFound)?
            .conversation_id;

        let guard = self.locks.lock(conversation_id).await;
        let message = self.store.message(message_id).await?.ok_or(ChatError::MessageNotFound)?;
        if message.sender_id != requester_id {
            return Err(ChatError::NotOwner);
        }
        Ok((message, guard))
    }

    /// Replaces the text; only the sender may edit.
    pub async fn update(&self, message_id: MessageId, requester_id: UserId, new_text: &str) -> ChatResult<SentMessage> {
        require_text(new_text)?;

        let (_, _guard) = self.owned_message(message_id, requester_id).await?;

        if !self.store.update_message_text(message_id, new_text).await? {
            return Err(ChatError::MessageNotFound);
        }
        let message = self.store.message(message_id).await?.ok_or(ChatError::MessageNotFound)?;

        self.rooms
            .publish(message.conversation_id, ServerEvent::MessageUpdated((&message).into()));
        info!(message_id, conversation_id = message.conversation_id, "message edited");

        Ok(SentMessage::from(&message))
    }

    /// Only the sender may delete. Subscribers are told before the row is
    /// removed; the event carries the ids they need to reconcile.
    pub async fn delete(&self, message_id: MessageId, requester_id: UserId) -> ChatResult<DeletedPayload> {
        let (message, _guard) = self.owned_message(message_id, requester_id).await?;

        let deleted = DeletedPayload::from(&message);
        self.rooms
            .publish(message.conversation_id, ServerEvent::MessageDeleted(deleted.clone()));

        if !self.store.delete_message(message_id).await? {
            return Err(ChatError::MessageNotFound);
        }
        info!(message_id, conversation_id = message.conversation_id, "message deleted");

        Ok(deleted)
    }

    /// Full history, oldest first. Participants only.
    pub async fn list(&self, conversation_id: ConversationId, requester_id: UserId) -> ChatResult<ConversationMessages> {
        if self.store.conversation(conversation_id).await?.is_none() {
            return Err(ChatError::ConversationNotFound);
        }
        if !self.store.is_participant(conversation_id, requester_id).await? {
            return Err(ChatError::NotAParticipant);
        }

        let messages = self.store.messages_in(conversation_id).await?;
        Ok(ConversationMessages {
            conversation_id,
            messages: messages.into_iter().map(MessageView::from).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        appresult::ErrorKind,
        realtime::MessagePayload,
        testing::{self, ALICE, BOB, CAROL},
    };

    async fn direct(app: &testing::TestApp) -> ConversationId {
        app.conversations
            .create_direct(ALICE, BOB)
            .await
            .unwrap()
            .conversation
            .conversation
            .id
    }

    #[tokio::test]
    async fn send_returns_the_compact_projection() {
        let app = testing::app().await;
        let id = direct(&app).await;

        let sent = app.messages.send(id, ALICE, "hello").await.unwrap();

        assert_eq!(sent.text, "hello");
        assert_eq!(sent.sender_name, "Alice");
        assert_eq!(sent.conversation_id, id);

        let json = serde_json::to_value(&sent).unwrap();
        assert_eq!(json["senderName"], "Alice");
        assert!(json["createdAt"].is_string());
    }

    #[tokio::test]
    async fn rejected_sends_create_no_rows() {
        let app = testing::app().await;
        let id = direct(&app).await;

        let err = app.messages.send(id, CAROL, "let me in").await.unwrap_err();
        assert!(matches!(err, ChatError::NotAParticipant));
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let err = app.messages.send(id, ALICE, " \n\t ").await.unwrap_err();
        assert!(matches!(err, ChatError::EmptyText));
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = app.messages.send(999, ALICE, "anyone?").await.unwrap_err();
        assert!(matches!(err, ChatError::ConversationNotFound));

        assert!(app.store.messages_in(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn subscribers_get_exactly_one_created_event() {
        let app = testing::app().await;
        let id = direct(&app).await;
        let other = app.conversations.create_group(ALICE, "Other", &[CAROL]).await.unwrap().conversation.id;

        let (bob_socket, mut bob_rx) = app.rooms.connect(BOB);
        app.rooms.join(bob_socket, id);
        let (carol_socket, mut carol_rx) = app.rooms.connect(CAROL);
        app.rooms.join(carol_socket, other);

        let sent = app.messages.send(id, ALICE, "hi bob").await.unwrap();

        let stored = app.store.message(sent.id).await.unwrap().unwrap();
        let expected = ServerEvent::MessageCreated(MessagePayload::from(&stored));
        assert_eq!(bob_rx.try_recv().unwrap(), expected);
        assert!(bob_rx.try_recv().is_err());
        assert!(carol_rx.try_recv().is_err());

        let ServerEvent::MessageCreated(payload) = expected else { unreachable!() };
        assert_eq!(payload.sender.id, ALICE);
        assert_eq!(payload.sender.name, "Alice");
        assert_eq!(payload.conversation_id, id);
    }

    #[tokio::test]
    async fn late_subscribers_miss_earlier_events() {
        let app = testing::app().await;
        let id = direct(&app).await;

        app.messages.send(id, ALICE, "before").await.unwrap();
        let (socket, mut rx) = app.rooms.connect(BOB);
        app.rooms.join(socket, id);
        app.messages.send(id, ALICE, "after").await.unwrap();

        let ServerEvent::MessageCreated(payload) = rx.try_recv().unwrap() else {
            panic!("expected messageCreated");
        };
        assert_eq!(payload.text, "after");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn list_round_trips_in_order() {
        let app = testing::app().await;
        let id = direct(&app).await;

        let texts = ["one", "two", "three", "four"];
        for (i, text) in texts.iter().enumerate() {
            let sender = if i % 2 == 0 { ALICE } else { BOB };
            app.messages.send(id, sender, text).await.unwrap();
        }

        let history = app.messages.list(id, BOB).await.unwrap();

        assert_eq!(history.conversation_id, id);
        let got: Vec<_> = history.messages.iter().map(|m| (m.text.as_str(), m.sender_name.as_str())).collect();
        assert_eq!(got, vec![("one", "Alice"), ("two", "Bob"), ("three", "Alice"), ("four", "Bob")]);

        let err = app.messages.list(id, CAROL).await.unwrap_err();
        assert!(matches!(err, ChatError::NotAParticipant));
        let err = app.messages.list(999, ALICE).await.unwrap_err();
        assert!(matches!(err, ChatError::ConversationNotFound));
    }

    #[tokio::test]
    async fn only_the_sender_edits() {
        let app = testing::app().await;
        let id = direct(&app).await;
        let sent = app.messages.send(id, ALICE, "draft").await.unwrap();
        let (socket, mut rx) = app.rooms.connect(BOB);
        app.rooms.join(socket, id);

        let err = app.messages.update(sent.id, BOB, "hijacked").await.unwrap_err();
        assert!(matches!(err, ChatError::NotOwner));
        assert_eq!(app.store.message(sent.id).await.unwrap().unwrap().text, "draft");
        assert!(rx.try_recv().is_err());

        let err = app.messages.update(sent.id, ALICE, "  ").await.unwrap_err();
        assert!(matches!(err, ChatError::EmptyText));

        let updated = app.messages.update(sent.id, ALICE, "final").await.unwrap();
        assert_eq!(updated.text, "final");
        assert_eq!(updated.id, sent.id);

        let ServerEvent::MessageUpdated(payload) = rx.try_recv().unwrap() else {
            panic!("expected messageUpdated");
        };
        assert_eq!(payload.text, "final");
        assert_eq!(payload.sender.id, ALICE);

        let err = app.messages.update(999, ALICE, "x").await.unwrap_err();
        assert!(matches!(err, ChatError::MessageNotFound));
    }

    #[tokio::test]
    async fn only_the_sender_deletes() {
        let app = testing::app().await;
        let id = direct(&app).await;
        let sent = app.messages.send(id, ALICE, "oops").await.unwrap();
        let (socket, mut rx) = app.rooms.connect(BOB);
        app.rooms.join(socket, id);

        let err = app.messages.delete(sent.id, BOB).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert!(app.store.message(sent.id).await.unwrap().is_some());
        assert!(rx.try_recv().is_err());

        let deleted = app.messages.delete(sent.id, ALICE).await.unwrap();
        assert_eq!(deleted, DeletedPayload { id: sent.id, conversation_id: id, sender_id: ALICE });
        assert_eq!(rx.try_recv().unwrap(), ServerEvent::MessageDeleted(deleted));
        assert!(app.store.message(sent.id).await.unwrap().is_none());

        let err = app.messages.delete(sent.id, ALICE).await.unwrap_err();
        assert!(matches!(err, ChatError::MessageNotFound));
    }

    #[tokio::test]
    async fn removed_members_can_no_longer_post() {
        let app = testing::app().await;
        let group = app.conversations.create_group(ALICE, "Team", &[BOB, CAROL]).await.unwrap().conversation.id;

        app.messages.send(group, BOB, "hi all").await.unwrap();
        app.conversations.remove_member(group, ALICE, BOB).await.unwrap();

        let err = app.messages.send(group, BOB, "still here?").await.unwrap_err();
        assert!(matches!(err, ChatError::NotAParticipant));
        assert_eq!(app.store.messages_in(group).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sends_notify_every_other_participant() {
        let app = testing::app().await;
        let group = app.conversations.create_group(ALICE, "Team", &[BOB, CAROL]).await.unwrap().conversation.id;

        let sent = app.messages.send(group, BOB, "ping").await.unwrap();

        let events = app.notifier.events();
        let receivers: Vec<_> = events.iter().map(|e| e.receiver_id).collect();
        assert_eq!(receivers, vec![ALICE, CAROL]);
        assert!(events.iter().all(|e| e.kind == NotificationKind::NewMessage
            && e.sender_id == BOB
            && e.entity_id == sent.id.to_string()));
    }

    #[tokio::test]
    async fn concurrent_sends_publish_in_persisted_order() {
        let app = testing::app().await;
        let id = direct(&app).await;
        let (socket, mut rx) = app.rooms.connect(BOB);
        app.rooms.join(socket, id);

        let sends = (0..10).map(|i| {
            let messages = app.messages.clone();
            tokio::spawn(async move { messages.send(id, ALICE, &format!("m{i}")).await.unwrap() })
        });
        for send in sends.collect::<Vec<_>>() {
            send.await.unwrap();
        }

        let mut published = Vec::new();
        while let Ok(ServerEvent::MessageCreated(payload)) = rx.try_recv() {
            published.push(payload.id);
        }
        let persisted: Vec<_> = app.messages.list(id, BOB).await.unwrap().messages.iter().map(|m| m.id).collect();
        assert_eq!(published, persisted);
    }
}
