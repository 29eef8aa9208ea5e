//! 会话服务用例测试：全部依赖都用内存实现和手动时钟。

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use domain::{ChatEvent, DomainError, UserStatus, RECALLED_PLACEHOLDER};

use crate::clock::{Clock, ManualClock};
use crate::delivery::DeliveryRouter;
use crate::memory::{
    InMemoryConversationRepository, InMemoryMessageRepository, StaticListingDirectory,
    StaticUserDirectory,
};
use crate::presence::PresenceRegistry;
use crate::services::{
    ChatPolicy, ChatService, ChatServiceDependencies, CreateConversationRequest,
    SendMessageRequest,
};

struct Harness {
    service: ChatService,
    clock: Arc<ManualClock>,
    users: Arc<StaticUserDirectory>,
    listings: Arc<StaticListingDirectory>,
}

fn harness() -> Harness {
    let clock = Arc::new(ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap()));
    let users = Arc::new(StaticUserDirectory::new());
    let listings = Arc::new(StaticListingDirectory::new());
    let presence = Arc::new(PresenceRegistry::new(clock.clone()));
    let router = Arc::new(DeliveryRouter::new(Arc::clone(&presence)));

    let service = ChatService::new(ChatServiceDependencies {
        conversation_repository: Arc::new(InMemoryConversationRepository::new()),
        message_repository: Arc::new(InMemoryMessageRepository::new()),
        user_directory: users.clone(),
        listing_directory: listings.clone(),
        clock: clock.clone(),
        presence,
        router,
        policy: ChatPolicy::default(),
    });

    Harness {
        service,
        clock,
        users,
        listings,
    }
}

impl Harness {
    async fn active_user(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.users.add_user(id.into(), UserStatus::Active).await;
        id
    }

    async fn conversation_between(&self, a: Uuid, b: Uuid) -> Uuid {
        self.service
            .create_conversation(CreateConversationRequest {
                initiator_id: a,
                peer_id: b,
                listing_id: None,
            })
            .await
            .unwrap()
            .id
            .into()
    }

    async fn send(&self, conversation_id: Uuid, sender_id: Uuid, content: &str) -> Uuid {
        self.service
            .send_message(SendMessageRequest {
                conversation_id,
                sender_id,
                content: content.to_owned(),
                images: Vec::new(),
            })
            .await
            .unwrap()
            .id
            .into()
    }
}

fn domain_err(err: crate::ApplicationError) -> DomainError {
    err.domain().cloned().expect("expected a domain error")
}

#[tokio::test]
async fn conversation_creation_is_idempotent_and_order_independent() {
    let h = harness();
    let alice = h.active_user().await;
    let bob = h.active_user().await;

    let first = h
        .service
        .create_conversation(CreateConversationRequest {
            initiator_id: alice,
            peer_id: bob,
            listing_id: None,
        })
        .await
        .unwrap();

    let second = h
        .service
        .create_conversation(CreateConversationRequest {
            initiator_id: bob,
            peer_id: alice,
            listing_id: None,
        })
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
}

#[tokio::test]
async fn self_conversation_is_rejected() {
    let h = harness();
    let alice = h.active_user().await;

    let err = h
        .service
        .create_conversation(CreateConversationRequest {
            initiator_id: alice,
            peer_id: alice,
            listing_id: None,
        })
        .await
        .unwrap_err();
    assert_eq!(domain_err(err), DomainError::InvalidParticipants);
}

#[tokio::test]
async fn locked_or_unknown_users_cannot_start_conversations() {
    let h = harness();
    let alice = h.active_user().await;
    let locked = Uuid::new_v4();
    h.users.add_user(locked.into(), UserStatus::Locked).await;

    let err = h
        .service
        .create_conversation(CreateConversationRequest {
            initiator_id: alice,
            peer_id: locked,
            listing_id: None,
        })
        .await
        .unwrap_err();
    assert_eq!(domain_err(err), DomainError::UserLocked);

    let err = h
        .service
        .create_conversation(CreateConversationRequest {
            initiator_id: alice,
            peer_id: Uuid::new_v4(),
            listing_id: None,
        })
        .await
        .unwrap_err();
    assert_eq!(domain_err(err), DomainError::UserNotFound);
}

#[tokio::test]
async fn unknown_listing_is_dropped_but_known_listing_is_kept() {
    let h = harness();
    let alice = h.active_user().await;
    let bob = h.active_user().await;
    let listing = Uuid::new_v4();
    h.listings.add_listing(listing.into()).await;

    let with_listing = h
        .service
        .create_conversation(CreateConversationRequest {
            initiator_id: alice,
            peer_id: bob,
            listing_id: Some(listing),
        })
        .await
        .unwrap();
    assert_eq!(with_listing.listing_id, Some(listing.into()));

    let carol = h.active_user().await;
    let without = h
        .service
        .create_conversation(CreateConversationRequest {
            initiator_id: alice,
            peer_id: carol,
            listing_id: Some(Uuid::new_v4()),
        })
        .await
        .unwrap();
    assert_eq!(without.listing_id, None);
}

#[tokio::test]
async fn send_message_updates_activity_and_pushes_to_online_peer() {
    let h = harness();
    let alice = h.active_user().await;
    let bob = h.active_user().await;
    let conversation_id = h.conversation_between(alice, bob).await;

    let (tx, mut rx) = mpsc::channel(8);
    h.service.connect_user(bob, tx).await.unwrap();

    h.clock.advance(Duration::seconds(42));
    let message_id = h.send(conversation_id, alice, "东西还在吗？").await;

    // 对端在线连接应当收到 message_created
    let event = rx.recv().await.unwrap();
    match event {
        ChatEvent::MessageCreated { message, .. } => {
            assert_eq!(Uuid::from(message.id), message_id);
            assert_eq!(message.content.as_str(), "东西还在吗？");
        }
        other => panic!("unexpected event: {}", other.kind()),
    }

    let listed = h
        .service
        .list_conversations(alice, None, None)
        .await
        .unwrap();
    assert_eq!(
        listed[0].conversation.last_message_at,
        Some(h.clock.now())
    );
}

#[tokio::test]
async fn non_participant_cannot_send_or_read() {
    let h = harness();
    let alice = h.active_user().await;
    let bob = h.active_user().await;
    let mallory = h.active_user().await;
    let conversation_id = h.conversation_between(alice, bob).await;

    let err = h
        .service
        .send_message(SendMessageRequest {
            conversation_id,
            sender_id: mallory,
            content: "让我进来".to_owned(),
            images: Vec::new(),
        })
        .await
        .unwrap_err();
    assert_eq!(domain_err(err), DomainError::NotParticipant);

    let err = h
        .service
        .list_messages(conversation_id, mallory, None, None)
        .await
        .unwrap_err();
    assert_eq!(domain_err(err), DomainError::NotParticipant);
}

#[tokio::test]
async fn recall_inside_window_replaces_content_for_listing() {
    let h = harness();
    let alice = h.active_user().await;
    let bob = h.active_user().await;
    let conversation_id = h.conversation_between(alice, bob).await;
    let message_id = h.send(conversation_id, alice, "发错了").await;

    h.clock.advance(Duration::minutes(10));
    let recalled = h.service.recall_message(message_id, alice).await.unwrap();
    assert!(recalled.is_recalled);
    assert_eq!(recalled.content.as_str(), RECALLED_PLACEHOLDER);

    // 双方后续拉取看到的都是占位符
    let messages = h
        .service
        .list_messages(conversation_id, bob, None, None)
        .await
        .unwrap();
    assert_eq!(messages[0].content.as_str(), RECALLED_PLACEHOLDER);
}

#[tokio::test]
async fn recall_after_window_fails_with_expired() {
    let h = harness();
    let alice = h.active_user().await;
    let bob = h.active_user().await;
    let conversation_id = h.conversation_between(alice, bob).await;
    let message_id = h.send(conversation_id, alice, "手慢了").await;

    h.clock.advance(Duration::minutes(16));
    let err = h.service.recall_message(message_id, alice).await.unwrap_err();
    assert_eq!(domain_err(err), DomainError::RecallWindowExpired);
}

#[tokio::test]
async fn only_the_sender_may_recall() {
    let h = harness();
    let alice = h.active_user().await;
    let bob = h.active_user().await;
    let conversation_id = h.conversation_between(alice, bob).await;
    let message_id = h.send(conversation_id, alice, "你撤不了这条").await;

    let err = h.service.recall_message(message_id, bob).await.unwrap_err();
    assert_eq!(domain_err(err), DomainError::NotSender);
}

#[tokio::test]
async fn mark_as_read_transitions_once_and_broadcasts_once() {
    let h = harness();
    let alice = h.active_user().await;
    let bob = h.active_user().await;
    let conversation_id = h.conversation_between(alice, bob).await;
    let message_id = h.send(conversation_id, alice, "看到请回复").await;

    let (tx, mut rx) = mpsc::channel(8);
    h.service.connect_user(alice, tx).await.unwrap();

    h.clock.advance(Duration::seconds(5));
    let first = h.service.mark_as_read(message_id, bob).await.unwrap();
    assert!(first.is_read);
    let read_at = first.read_at;

    match rx.recv().await.unwrap() {
        ChatEvent::MessageRead { message, .. } => assert!(message.is_read),
        other => panic!("unexpected event: {}", other.kind()),
    }

    // 重复标记：read_at 不变，也不再广播
    h.clock.advance(Duration::seconds(5));
    let second = h.service.mark_as_read(message_id, bob).await.unwrap();
    assert_eq!(second.read_at, read_at);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn reading_own_message_is_a_noop() {
    let h = harness();
    let alice = h.active_user().await;
    let bob = h.active_user().await;
    let conversation_id = h.conversation_between(alice, bob).await;
    let message_id = h.send(conversation_id, alice, "自己的消息").await;

    let message = h.service.mark_as_read(message_id, alice).await.unwrap();
    assert!(!message.is_read);
}

#[tokio::test]
async fn listing_messages_auto_reads_incoming_unread() {
    let h = harness();
    let alice = h.active_user().await;
    let bob = h.active_user().await;
    let conversation_id = h.conversation_between(alice, bob).await;

    h.send(conversation_id, alice, "第一条").await;
    h.clock.advance(Duration::seconds(1));
    h.send(conversation_id, alice, "第二条").await;

    let before = h.service.list_conversations(bob, None, None).await.unwrap();
    assert_eq!(before[0].unread_count, 2);

    let messages = h
        .service
        .list_messages(conversation_id, bob, None, None)
        .await
        .unwrap();
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| m.is_read));
    assert!(messages[0].created_at <= messages[1].created_at);

    let after = h.service.list_conversations(bob, None, None).await.unwrap();
    assert_eq!(after[0].unread_count, 0);
}

#[tokio::test]
async fn conversations_order_by_recent_activity_with_unread_counts() {
    let h = harness();
    let alice = h.active_user().await;
    let bob = h.active_user().await;
    let carol = h.active_user().await;

    let with_bob = h.conversation_between(alice, bob).await;
    h.clock.advance(Duration::seconds(1));
    let with_carol = h.conversation_between(alice, carol).await;

    h.clock.advance(Duration::seconds(1));
    h.send(with_bob, bob, "最近的活动在这里").await;

    let listed = h
        .service
        .list_conversations(alice, None, None)
        .await
        .unwrap();
    assert_eq!(Uuid::from(listed[0].conversation.id), with_bob);
    assert_eq!(listed[0].unread_count, 1);
    assert_eq!(Uuid::from(listed[1].conversation.id), with_carol);
    assert_eq!(listed[1].unread_count, 0);
}

#[tokio::test]
async fn delete_conversation_cascades_to_messages() {
    let h = harness();
    let alice = h.active_user().await;
    let bob = h.active_user().await;
    let conversation_id = h.conversation_between(alice, bob).await;
    let message_id = h.send(conversation_id, alice, "马上消失").await;

    h.service
        .delete_conversation(conversation_id, alice)
        .await
        .unwrap();

    let err = h
        .service
        .list_messages(conversation_id, alice, None, None)
        .await
        .unwrap_err();
    assert_eq!(domain_err(err), DomainError::ConversationNotFound);

    let err = h.service.mark_as_read(message_id, bob).await.unwrap_err();
    assert_eq!(domain_err(err), DomainError::MessageNotFound);
}

#[tokio::test]
async fn presence_transitions_fan_out_to_conversation_peers() {
    let h = harness();
    let alice = h.active_user().await;
    let bob = h.active_user().await;
    h.conversation_between(alice, bob).await;

    let (bob_tx, mut bob_rx) = mpsc::channel(8);
    h.service.connect_user(bob, bob_tx).await.unwrap();

    // alice 上线，bob 应收到 presence_changed(online)
    let (alice_tx, _alice_rx) = mpsc::channel(8);
    let connection = h.service.connect_user(alice, alice_tx).await.unwrap();
    match bob_rx.recv().await.unwrap() {
        ChatEvent::PresenceChanged {
            user_id, is_online, ..
        } => {
            assert_eq!(Uuid::from(user_id), alice);
            assert!(is_online);
        }
        other => panic!("unexpected event: {}", other.kind()),
    }

    h.clock.advance(Duration::seconds(30));
    h.service.disconnect_user(alice, connection).await.unwrap();
    match bob_rx.recv().await.unwrap() {
        ChatEvent::PresenceChanged {
            user_id,
            is_online,
            last_seen,
        } => {
            assert_eq!(Uuid::from(user_id), alice);
            assert!(!is_online);
            assert_eq!(last_seen, Some(h.clock.now()));
        }
        other => panic!("unexpected event: {}", other.kind()),
    }

    let info = h.service.presence_of(alice).await;
    assert!(!info.is_online);
}

#[tokio::test]
async fn locked_user_cannot_connect() {
    let h = harness();
    let locked = Uuid::new_v4();
    h.users.add_user(locked.into(), UserStatus::Locked).await;

    let (tx, _rx) = mpsc::channel(8);
    let err = h.service.connect_user(locked, tx).await.unwrap_err();
    assert_eq!(domain_err(err), DomainError::UserLocked);
}

#[tokio::test]
async fn empty_and_oversized_content_are_rejected() {
    let h = harness();
    let alice = h.active_user().await;
    let bob = h.active_user().await;
    let conversation_id = h.conversation_between(alice, bob).await;

    let err = h
        .service
        .send_message(SendMessageRequest {
            conversation_id,
            sender_id: alice,
            content: "   ".to_owned(),
            images: Vec::new(),
        })
        .await
        .unwrap_err();
    assert!(matches!(
        domain_err(err),
        DomainError::InvalidArgument { .. }
    ));

    let err = h
        .service
        .send_message(SendMessageRequest {
            conversation_id,
            sender_id: alice,
            content: "长".repeat(2001),
            images: Vec::new(),
        })
        .await
        .unwrap_err();
    assert!(matches!(
        domain_err(err),
        DomainError::InvalidArgument { .. }
    ));
}
