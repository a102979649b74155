use chrono::{DateTime, Duration, TimeZone, Utc};

use super::*;

fn at(minute: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).single().expect("time") + Duration::minutes(minute)
}

fn message(id: &str, conversation: &str, sender: &str, minute: i64) -> Message {
    Message {
        id: id.into(),
        conversation_id: conversation.into(),
        sender_id: sender.into(),
        body: format!("body of {id}"),
        created_at: at(minute),
    }
}

fn conversation(id: &str, minute: Option<i64>) -> Conversation {
    let mut conversation = Conversation::new(id, format!("peer-{id}"));
    conversation.last_message_at = minute.map(at);
    conversation
}

fn ids(store: &ConversationStore) -> Vec<&str> {
    store
        .conversations()
        .iter()
        .map(|conversation| conversation.id.as_str())
        .collect()
}

fn assert_sorted_desc(store: &ConversationStore) {
    let stamps: Vec<_> = store
        .conversations()
        .iter()
        .map(|conversation| conversation.last_message_at)
        .collect();
    assert!(
        stamps.windows(2).all(|pair| pair[0] >= pair[1]),
        "not sorted: {stamps:?}"
    );
}

#[test]
fn replayed_message_is_not_duplicated() {
    let mut store = ConversationStore::default();
    store.set_conversations(vec![conversation("c1", Some(2))]);
    store.open_conversation(
        "c1".into(),
        vec![message("m1", "c1", "u2", 1), message("m2", "c1", "u2", 2)],
    );

    let applied = store.apply_incoming_message(message("m2", "c1", "u2", 2));

    assert_eq!(applied, Applied::Duplicate);
    let sequence: Vec<_> = store.messages().iter().map(|m| m.id.as_str()).collect();
    assert_eq!(sequence, vec!["m1", "m2"]);
}

#[test]
fn distinct_ids_all_land_exactly_once() {
    let mut store = ConversationStore::default();
    store.set_conversations(vec![conversation("c1", None)]);
    store.open_conversation("c1".into(), Vec::new());

    let incoming = ["a", "b", "a", "c", "b", "d", "a"];
    for (minute, id) in incoming.iter().enumerate() {
        store.apply_incoming_message(message(id, "c1", "u2", minute as i64));
    }

    let sequence: Vec<_> = store.messages().iter().map(|m| m.id.as_str()).collect();
    assert_eq!(sequence, vec!["a", "b", "c", "d"]);
}

#[test]
fn out_of_order_delivery_keeps_delivery_order() {
    let mut store = ConversationStore::default();
    store.set_conversations(vec![conversation("c1", None)]);
    store.open_conversation("c1".into(), Vec::new());

    store.apply_incoming_message(message("late", "c1", "u2", 5));
    store.apply_incoming_message(message("early", "c1", "u2", 1));

    let sequence: Vec<_> = store.messages().iter().map(|m| m.id.as_str()).collect();
    assert_eq!(sequence, vec!["late", "early"]);
    let summary = store.conversation(&"c1".into()).expect("summary");
    assert_eq!(summary.last_message_at, Some(at(5)));
    assert_eq!(summary.last_message.as_deref(), Some("body of late"));
}

#[test]
fn older_message_for_closed_conversation_counts_unread_but_keeps_preview() {
    let mut store = ConversationStore::default();
    store.set_local_user(Some("me".into()));
    store.set_conversations(vec![conversation("c1", None)]);
    store.apply_incoming_message(message("fresh", "c1", "u2", 5));

    let applied = store.apply_incoming_message(message("stale", "c1", "u2", 1));

    assert_eq!(applied, Applied::SummaryOnly);
    let summary = store.conversation(&"c1".into()).expect("summary");
    assert_eq!(summary.unread_count, 2);
    assert_eq!(summary.last_message.as_deref(), Some("body of fresh"));
    assert_eq!(summary.last_message_at, Some(at(5)));
}

#[test]
fn message_for_other_conversation_updates_summary_but_not_sequence() {
    let mut store = ConversationStore::default();
    store.set_local_user(Some("me".into()));
    store.set_conversations(vec![conversation("c1", Some(1)), conversation("c2", Some(0))]);
    store.open_conversation("c1".into(), Vec::new());

    let applied = store.apply_incoming_message(message("m9", "c2", "u2", 10));

    assert_eq!(applied, Applied::SummaryOnly);
    assert!(store.messages().is_empty());
    assert_eq!(ids(&store), vec!["c2", "c1"]);
    let summary = store.conversation(&"c2".into()).expect("summary");
    assert_eq!(summary.last_message.as_deref(), Some("body of m9"));
    assert_eq!(summary.unread_count, 1);
}

#[test]
fn own_messages_elsewhere_do_not_count_as_unread() {
    let mut store = ConversationStore::default();
    store.set_local_user(Some("me".into()));
    store.set_conversations(vec![conversation("c2", Some(0))]);

    store.apply_incoming_message(message("m1", "c2", "me", 3));

    assert_eq!(
        store.conversation(&"c2".into()).expect("summary").unread_count,
        0
    );
}

#[test]
fn message_for_unknown_conversation_is_ignored() {
    let mut store = ConversationStore::default();
    assert_eq!(
        store.apply_incoming_message(message("m1", "nowhere", "u2", 1)),
        Applied::Ignored
    );
    assert!(store.conversations().is_empty());
}

#[test]
fn blank_ids_fail_closed() {
    let mut store = ConversationStore::default();
    store.set_conversations(vec![conversation("c1", None)]);
    store.open_conversation("c1".into(), Vec::new());

    assert_eq!(
        store.apply_incoming_message(message("", "c1", "u2", 1)),
        Applied::Ignored
    );
    assert!(store.messages().is_empty());
}

#[test]
fn upsert_new_most_recent_conversation_goes_first() {
    let mut store = ConversationStore::default();
    store.set_conversations(vec![
        conversation("c1", Some(3)),
        conversation("c2", Some(1)),
        conversation("c3", None),
    ]);

    store.upsert_conversation(conversation("c9", Some(60)));

    assert_eq!(ids(&store), vec!["c9", "c1", "c2", "c3"]);
}

#[test]
fn upsert_replaces_existing_entry_in_place() {
    let mut store = ConversationStore::default();
    store.set_conversations(vec![conversation("c1", Some(3)), conversation("c2", Some(1))]);

    let mut updated = conversation("c2", Some(1));
    updated.last_message = Some("edited".into());
    store.upsert_conversation(updated);

    assert_eq!(ids(&store), vec!["c1", "c2"]);
    assert_eq!(store.conversations().len(), 2);
    assert_eq!(
        store.conversation(&"c2".into()).expect("c2").last_message.as_deref(),
        Some("edited")
    );
}

#[test]
fn equal_timestamps_keep_stable_order_across_reconciliations() {
    let mut store = ConversationStore::default();
    store.set_conversations(vec![
        conversation("a", Some(5)),
        conversation("b", Some(5)),
        conversation("c", Some(5)),
    ]);
    let first = ids(&store).join(",");

    for _ in 0..3 {
        store.upsert_conversation(conversation("b", Some(5)));
        store.apply_incoming_message(message("x", "unknown", "u", 5));
    }

    assert_eq!(ids(&store).join(","), first);
}

#[test]
fn summary_list_stays_sorted_after_mixed_operations() {
    let mut store = ConversationStore::default();
    store.set_conversations(vec![
        conversation("c1", Some(1)),
        conversation("c2", Some(7)),
        conversation("c3", None),
    ]);
    store.open_conversation("c3".into(), Vec::new());

    store.apply_incoming_message(message("m1", "c3", "u", 9));
    assert_sorted_desc(&store);
    store.upsert_conversation(conversation("c4", Some(4)));
    assert_sorted_desc(&store);
    store.apply_incoming_message(message("m2", "c1", "u", 12));
    assert_sorted_desc(&store);
    store.upsert_conversation(conversation("c2", None));
    assert_sorted_desc(&store);

    assert_eq!(ids(&store), vec!["c1", "c3", "c4", "c2"]);
}

#[test]
fn set_conversations_replaces_wholesale_and_drops_duplicates() {
    let mut store = ConversationStore::default();
    store.set_conversations(vec![conversation("old", Some(1))]);
    store.set_conversations(vec![
        conversation("c1", Some(1)),
        conversation("c1", Some(9)),
        conversation("c2", Some(2)),
    ]);
    assert_eq!(ids(&store), vec!["c2", "c1"]);
}

#[test]
fn opening_conversation_clears_unread_and_dedupes_history() {
    let mut store = ConversationStore::default();
    let mut unread = conversation("c1", Some(1));
    unread.unread_count = 4;
    store.set_conversations(vec![unread]);

    store.open_conversation(
        "c1".into(),
        vec![
            message("m1", "c1", "u2", 1),
            message("m1", "c1", "u2", 1),
            message("foreign", "c2", "u2", 1),
        ],
    );

    assert_eq!(store.messages().len(), 1);
    assert_eq!(
        store.conversation(&"c1".into()).expect("c1").unread_count,
        0
    );
}

#[test]
fn older_history_page_is_prepended_without_duplicates() {
    let mut store = ConversationStore::default();
    store.open_conversation(
        "c1".into(),
        vec![message("m3", "c1", "u2", 3), message("m4", "c1", "u2", 4)],
    );

    let added = store.merge_history(
        &"c1".into(),
        vec![
            message("m2", "c1", "u2", 2),
            message("m1", "c1", "u2", 1),
            message("m3", "c1", "u2", 3),
        ],
    );

    assert_eq!(added, 2);
    let sequence: Vec<_> = store.messages().iter().map(|m| m.id.as_str()).collect();
    assert_eq!(sequence, vec!["m1", "m2", "m3", "m4"]);
    assert_eq!(store.merge_history(&"other".into(), Vec::new()), 0);
}

#[test]
fn closing_stops_appending() {
    let mut store = ConversationStore::default();
    store.set_conversations(vec![conversation("c1", None)]);
    store.open_conversation("c1".into(), Vec::new());
    store.close_conversation();

    assert_eq!(
        store.apply_incoming_message(message("m1", "c1", "u2", 1)),
        Applied::SummaryOnly
    );
    assert!(store.messages().is_empty());
    assert!(store.open_conversation_id().is_none());
}

#[test]
fn notification_updates_summary_of_unopened_conversation() {
    let mut store = ConversationStore::default();
    store.set_conversations(vec![conversation("c1", Some(5)), conversation("c2", Some(1))]);

    let applied = store.apply_notification(&MessageNotification {
        conversation_id: "c2".into(),
        sender_id: Some("u2".into()),
        message: Some("ping".into()),
        created_at: Some(at(8)),
    });

    assert!(applied);
    assert_eq!(ids(&store), vec!["c2", "c1"]);
    assert_eq!(
        store.conversation(&"c2".into()).expect("c2").unread_count,
        1
    );
}

#[test]
fn sparse_notification_changes_nothing() {
    let mut store = ConversationStore::default();
    store.set_conversations(vec![conversation("c1", Some(5))]);
    assert!(!store.apply_notification(&MessageNotification {
        conversation_id: "c1".into(),
        sender_id: None,
        message: None,
        created_at: None,
    }));
}
