use super::*;

#[test]
fn repeated_online_events_keep_one_entry_and_offline_removes_it() {
    let mut presence = PresenceTracker::default();
    assert!(presence.online_users().is_empty());

    presence.user_online("u1".into());
    assert_eq!(presence.online_users(), vec![UserId::from("u1")]);

    presence.user_online("u1".into());
    assert_eq!(presence.online_users(), vec![UserId::from("u1")]);

    presence.user_offline(&"u1".into());
    assert!(presence.online_users().is_empty());
    assert!(!presence.is_online(&"u1".into()));
}

#[test]
fn offline_for_unknown_user_is_harmless() {
    let mut presence = PresenceTracker::default();
    presence.user_offline(&"ghost".into());
    assert!(presence.online_users().is_empty());
}

#[test]
fn typing_start_overwrites_previous_typist() {
    let mut presence = PresenceTracker::default();
    presence.typing_started("c1".into(), "u1".into());
    presence.typing_started("c1".into(), "u2".into());
    assert_eq!(presence.typing_in(&"c1".into()), Some(&UserId::from("u2")));
}

#[test]
fn message_arrival_clears_typing_for_that_conversation_only() {
    let mut presence = PresenceTracker::default();
    presence.typing_started("c1".into(), "u1".into());
    presence.typing_started("c2".into(), "u2".into());

    presence.message_arrived(&"c1".into());

    assert!(presence.typing_in(&"c1".into()).is_none());
    assert_eq!(presence.typing_in(&"c2".into()), Some(&UserId::from("u2")));
}

#[test]
fn typing_stop_clears_conversation_entry() {
    let mut presence = PresenceTracker::default();
    presence.typing_started("c1".into(), "u1".into());
    assert_eq!(
        presence.typing_stopped(&"c1".into()),
        Some(UserId::from("u1"))
    );
    assert!(presence.typing_in(&"c1".into()).is_none());
}

#[test]
fn reset_empties_online_set_and_typing_map() {
    let mut presence = PresenceTracker::default();
    presence.user_online("u1".into());
    presence.typing_started("c1".into(), "u1".into());
    presence.reset();
    assert!(presence.online_users().is_empty());
    assert!(presence.typing_in(&"c1".into()).is_none());
}

#[test]
fn blank_ids_are_ignored() {
    let mut presence = PresenceTracker::default();
    presence.user_online("".into());
    presence.typing_started(" ".into(), "u1".into());
    assert!(presence.online_users().is_empty());
    assert!(presence.typing_in(&" ".into()).is_none());
}
