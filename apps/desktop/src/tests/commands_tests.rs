use super::*;

#[test]
fn plain_text_is_a_message() {
    assert_eq!(
        parse_line("  hello there ").expect("parsed"),
        Some(TerminalCommand::Say("hello there".into()))
    );
    assert_eq!(parse_line("   ").expect("parsed"), None);
}

#[test]
fn slash_commands_take_arguments() {
    assert_eq!(
        parse_line("/open c1").expect("parsed"),
        Some(TerminalCommand::Open("c1".into()))
    );
    assert_eq!(
        parse_line("/start seller listing-9").expect("parsed"),
        Some(TerminalCommand::Start {
            user_id: "seller".into(),
            listing_id: Some("listing-9".into()),
        })
    );
    assert_eq!(
        parse_line("/start seller").expect("parsed"),
        Some(TerminalCommand::Start {
            user_id: "seller".into(),
            listing_id: None,
        })
    );
    assert_eq!(
        parse_line("/older 3").expect("parsed"),
        Some(TerminalCommand::Older(3))
    );
}

#[test]
fn malformed_commands_return_usage() {
    assert!(parse_line("/open").is_err());
    assert!(parse_line("/older 1").is_err());
    assert!(parse_line("/older many").is_err());
    assert!(parse_line("/dance").is_err());
}
