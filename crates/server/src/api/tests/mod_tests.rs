use super::*;

async fn setup() -> (ChatDirectory, UserId, UserId, ConversationId) {
    let directory = ChatDirectory::default();
    let buyer = UserId::from("buyer");
    let seller = UserId::from("seller");
    let conversation = get_or_create_conversation(
        &directory,
        &buyer,
        &seller,
        Some(ListingId::from("listing-1")),
    )
    .await
    .expect("conversation");
    (directory, buyer, seller, conversation.id)
}

#[tokio::test]
async fn get_or_create_returns_existing_conversation_for_both_sides() {
    let (directory, buyer, seller, conversation_id) = setup().await;

    let again = get_or_create_conversation(
        &directory,
        &seller,
        &buyer,
        Some(ListingId::from("listing-1")),
    )
    .await
    .expect("existing");
    assert_eq!(again.id, conversation_id);
    assert_eq!(again.other_user.id, buyer);

    let other_listing = get_or_create_conversation(&directory, &buyer, &seller, None)
        .await
        .expect("separate conversation");
    assert_ne!(other_listing.id, conversation_id);
}

#[tokio::test]
async fn cannot_start_conversation_with_yourself() {
    let directory = ChatDirectory::default();
    let me = UserId::from("me");
    let err = get_or_create_conversation(&directory, &me, &me, None)
        .await
        .expect_err("should fail");
    assert!(matches!(err.code, ErrorCode::Validation));
}

#[tokio::test]
async fn posting_updates_summary_and_receiver_unread() {
    let (directory, buyer, seller, conversation_id) = setup().await;

    let message = post_message(&directory, &buyer, &conversation_id, &seller, "  is it available? ")
        .await
        .expect("posted");
    assert_eq!(message.body, "is it available?");

    let seller_view = list_conversations(&directory, &seller).await.expect("list");
    assert_eq!(seller_view.len(), 1);
    assert_eq!(seller_view[0].unread_count, 1);
    assert_eq!(seller_view[0].last_message.as_deref(), Some("is it available?"));

    let buyer_view = list_conversations(&directory, &buyer).await.expect("list");
    assert_eq!(buyer_view[0].unread_count, 0);
}

#[tokio::test]
async fn outsiders_cannot_post_or_read() {
    let (directory, buyer, _seller, conversation_id) = setup().await;
    let outsider = UserId::from("outsider");

    let err = post_message(&directory, &outsider, &conversation_id, &buyer, "hi")
        .await
        .expect_err("should fail");
    assert!(matches!(err.code, ErrorCode::Forbidden));

    let err = list_messages(&directory, &outsider, &conversation_id, 1)
        .await
        .expect_err("should fail");
    assert!(matches!(err.code, ErrorCode::Forbidden));
    assert!(!directory.is_participant(&outsider, &conversation_id).await);
}

#[tokio::test]
async fn empty_and_oversized_bodies_are_rejected() {
    let (directory, buyer, seller, conversation_id) = setup().await;
    for body in ["   ".to_string(), "x".repeat(MAX_MESSAGE_CHARS + 1)] {
        let err = post_message(&directory, &buyer, &conversation_id, &seller, &body)
            .await
            .expect_err("should fail");
        assert!(matches!(err.code, ErrorCode::Validation));
    }
}

#[tokio::test]
async fn history_pages_count_back_from_newest() {
    let (directory, buyer, seller, conversation_id) = setup().await;
    for n in 0..(PAGE_SIZE + 5) {
        post_message(&directory, &buyer, &conversation_id, &seller, &format!("m{n}"))
            .await
            .expect("posted");
    }

    let first = list_messages(&directory, &seller, &conversation_id, 1)
        .await
        .expect("page 1");
    assert_eq!(first.messages.len(), PAGE_SIZE);
    assert_eq!(first.messages[0].body, "m5");
    assert_eq!(first.has_more, Some(true));

    let second = list_messages(&directory, &seller, &conversation_id, 2)
        .await
        .expect("page 2");
    let bodies: Vec<_> = second.messages.iter().map(|m| m.body.as_str()).collect();
    assert_eq!(bodies, vec!["m0", "m1", "m2", "m3", "m4"]);
    assert_eq!(second.has_more, Some(false));

    let seller_view = list_conversations(&directory, &seller).await.expect("list");
    assert_eq!(seller_view[0].unread_count, 0);
}

#[tokio::test]
async fn unknown_conversation_is_not_found() {
    let directory = ChatDirectory::default();
    let err = list_messages(&directory, &"u1".into(), &"nope".into(), 1)
        .await
        .expect_err("should fail");
    assert!(matches!(err.code, ErrorCode::NotFound));
}
