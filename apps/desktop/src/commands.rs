//! Lines typed at the chat prompt.

use shared::domain::{ConversationId, ListingId, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalCommand {
    List,
    Open(ConversationId),
    Start {
        user_id: UserId,
        listing_id: Option<ListingId>,
    },
    Older(u32),
    Close,
    Who,
    Quit,
    Say(String),
}

/// `None` for blank lines; `Err` carries a usage hint.
pub fn parse_line(line: &str) -> Result<Option<TerminalCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(TerminalCommand::Say(line.to_string())));
    };

    let mut parts = rest.split_whitespace();
    let command = match (parts.next(), parts.next(), parts.next()) {
        (Some("list"), None, _) => TerminalCommand::List,
        (Some("open"), Some(id), None) => TerminalCommand::Open(id.into()),
        (Some("start"), Some(user), listing) => TerminalCommand::Start {
            user_id: user.into(),
            listing_id: listing.map(ListingId::from),
        },
        (Some("older"), Some(page), None) => match page.parse::<u32>() {
            Ok(page) if page >= 2 => TerminalCommand::Older(page),
            _ => return Err("usage: /older <page>=2..".into()),
        },
        (Some("close"), None, _) => TerminalCommand::Close,
        (Some("who"), None, _) => TerminalCommand::Who,
        (Some("quit"), None, _) => TerminalCommand::Quit,
        _ => {
            return Err(
                "commands: /list, /open <id>, /start <user> [listing], /older <page>, /close, /who, /quit"
                    .into(),
            )
        }
    };
    Ok(Some(command))
}

#[cfg(test)]
#[path = "tests/commands_tests.rs"]
mod tests;
