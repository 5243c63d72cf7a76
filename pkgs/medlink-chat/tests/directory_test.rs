//! Tests for the conversation directory as seen through ModeController
//!
//! These tests cover:
//! - Loading each role tab in server order
//! - The name filter
//! - Degraded mode on transient failures and recovery afterwards
//! - Auth failures handed to the auth collaborator

mod common;

use common::{conversation_payload, Harness};
use medlink_chat::{filter, ChatError, ChatEvent, NoticeLevel, Role};

#[tokio::test]
async fn test_load_conversations_preserves_server_order() {
    let mut harness = Harness::new();
    harness.conversations.set_list(
        Role::Doctor,
        vec![
            conversation_payload("room-3", "Dr. Zed"),
            conversation_payload("room-1", "Dr. Amal"),
            conversation_payload("room-2", "Dr. Mira"),
        ],
    );

    let list = harness.chat.load_conversations(Role::Doctor).await.unwrap();

    let ids: Vec<_> = list.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["room-3", "room-1", "room-2"]);
    assert!(list.iter().all(|c| c.role == Role::Doctor));
    assert!(!harness.chat.is_directory_degraded());

    let events = harness.drain_events();
    assert!(events.contains(&ChatEvent::ConversationsUpdated {
        tab: Role::Doctor,
        count: 3,
        degraded: false,
    }));
}

#[tokio::test]
async fn test_switching_tabs_replaces_list() {
    let mut harness = Harness::new();
    harness
        .conversations
        .set_list(Role::Patient, vec![conversation_payload("p1", "Naina")]);
    harness
        .conversations
        .set_list(Role::Doctor, vec![conversation_payload("d1", "Dr. Amal")]);

    harness.chat.load_conversations(Role::Patient).await.unwrap();
    harness.chat.load_conversations(Role::Doctor).await.unwrap();
    assert_eq!(harness.chat.conversations().len(), 1);
    assert_eq!(harness.chat.conversations()[0].id, "d1");

    // refresh reloads the tab selected last
    harness.chat.refresh_conversations().await.unwrap();
    assert_eq!(harness.chat.conversations()[0].id, "d1");
    assert_eq!(harness.conversations.calls(), 3);
}

#[tokio::test]
async fn test_malformed_entries_are_dropped() {
    let mut harness = Harness::new();
    let mut nameless = conversation_payload("room-x", "x");
    nameless.name = "  ".to_string();
    harness.conversations.set_list(
        Role::Patient,
        vec![
            conversation_payload("room-a", "Naina"),
            nameless,
            conversation_payload("", "No Id"),
        ],
    );

    let list = harness.chat.load_conversations(Role::Patient).await.unwrap();

    assert_eq!(list.len(), 1);
    assert_eq!(list[0].name, "Naina");
}

#[tokio::test]
async fn test_filter_is_case_insensitive_subsequence() {
    let mut harness = Harness::new();
    harness.conversations.set_list(
        Role::Patient,
        vec![
            conversation_payload("room-1", "Naina"),
            conversation_payload("room-2", "Archi"),
            conversation_payload("room-3", "Naina"),
        ],
    );
    harness.chat.load_conversations(Role::Patient).await.unwrap();

    let hits = harness.chat.filter_conversations("NA");
    let ids: Vec<_> = hits.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["room-1", "room-3"]);

    assert_eq!(harness.chat.filter_conversations("").len(), 3);
    assert!(harness.chat.filter_conversations("zzz").is_empty());

    // filtering never touches the list itself
    assert_eq!(harness.chat.conversations().len(), 3);
    assert_eq!(filter(harness.chat.conversations(), "arch").len(), 1);
}

#[tokio::test]
async fn test_transient_failure_shows_placeholders() {
    let mut harness = Harness::new();
    harness.conversations.fail_with_status(Some(503));

    let list = harness.chat.load_conversations(Role::Patient).await.unwrap();

    assert_eq!(list.len(), 1);
    assert_eq!(list[0].id, "placeholder-care-team");
    assert!(harness.chat.is_directory_degraded());

    let events = harness.drain_events();
    assert!(events.iter().any(|e| matches!(
        e,
        ChatEvent::Notice(n) if n.level == NoticeLevel::Warning
    )));
    assert!(events.contains(&ChatEvent::ConversationsUpdated {
        tab: Role::Patient,
        count: 1,
        degraded: true,
    }));

    // the next good response clears degraded mode
    harness.conversations.fail_with_status(None);
    harness
        .conversations
        .set_list(Role::Patient, vec![conversation_payload("room-a", "Naina")]);
    let list = harness.chat.refresh_conversations().await.unwrap();
    assert_eq!(list[0].id, "room-a");
    assert!(!harness.chat.is_directory_degraded());
}

#[tokio::test]
async fn test_auth_failure_is_surfaced_not_masked() {
    let mut harness = Harness::new().with_rooms().await;
    harness.drain_events();
    harness.conversations.fail_with_status(Some(401));

    let err = harness
        .chat
        .refresh_conversations()
        .await
        .unwrap_err();

    assert!(matches!(err, ChatError::Auth { status: 401 }));
    assert!(!harness.chat.is_directory_degraded());
    assert_eq!(harness.chat.conversations().len(), 2);

    let events = harness.drain_events();
    assert!(events.contains(&ChatEvent::AuthRequired { status: 401 }));
}

#[tokio::test]
async fn test_refresh_keeps_open_room_read() {
    let mut harness = Harness::new().with_rooms().await;
    harness.open_room("room-a").await;

    let mut unread = conversation_payload("room-a", "Naina");
    unread.unread = true;
    unread.last_message = Some("new".to_string());
    harness.conversations.set_list(
        Role::Patient,
        vec![unread, conversation_payload("room-b", "Archi")],
    );
    harness.chat.refresh_conversations().await.unwrap();

    let room_a = harness.conversation("room-a");
    assert!(!room_a.unread);
    assert_eq!(room_a.last_message.as_deref(), Some("new"));
}
