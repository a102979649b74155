use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{
    load_settings, ChatClient, ChatHandle, ClientNotice, Credentials, EventKind, InboundEvent,
};
use shared::domain::{ConversationId, Message, UserId};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast,
};
use tracing::warn;

mod commands;

use commands::{parse_line, TerminalCommand};

#[derive(Parser, Debug)]
struct Args {
    /// Id of the signed-in user.
    #[arg(long)]
    user_id: String,
    /// Bearer token, as printed by `tools mint-token`.
    #[arg(long)]
    token: String,
    #[arg(long)]
    settings: Option<PathBuf>,
    /// Conversation to open right after connecting.
    #[arg(long)]
    open: Option<String>,
}

struct OpenConversation {
    id: ConversationId,
    other_user: UserId,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let settings = load_settings(args.settings.as_deref())?;
    let client = ChatClient::with_websocket(&settings);
    let handle = client.handle();
    spawn_notice_printer(&handle);
    for kind in EventKind::ALL {
        handle.subscribe(kind, print_event).await?;
    }

    let mut notices = handle.notices();
    client
        .connect_and_wait(Credentials::new(args.user_id.as_str(), args.token))
        .await
        .context("failed to connect")?;
    let count = client
        .refresh_conversations()
        .await
        .context("failed to load conversations")?;
    println!("{count} conversation(s); type /list to show them");

    let mut current = None;
    if let Some(id) = args.open {
        current = open(&client, id.into()).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => line,
                None => break,
            },
            notice = notices.recv() => {
                match notice {
                    Ok(notice) => {
                        if let Some(id) = rejoin_target(&notice, current.as_ref()) {
                            handle.join_room(id)?;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
                continue;
            }
        };
        let command = match parse_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(usage) => {
                println!("{usage}");
                continue;
            }
        };
        match command {
            TerminalCommand::Quit => break,
            TerminalCommand::List => print_conversations(&handle).await?,
            TerminalCommand::Open(id) => {
                if let Some(previous) = current.take() {
                    client.close_conversation(previous.id)?;
                }
                current = open(&client, id).await;
            }
            TerminalCommand::Start {
                user_id,
                listing_id,
            } => match client.start_conversation(user_id, listing_id).await {
                Ok(conversation) => println!("conversation {}", conversation.id),
                Err(error) => println!("! {error}"),
            },
            TerminalCommand::Older(page) => match &current {
                Some(open) => match client.load_older_messages(open.id.clone(), page).await {
                    Ok(fetched) => println!("loaded {fetched} older message(s)"),
                    Err(error) => println!("! {error}"),
                },
                None => println!("no open conversation"),
            },
            TerminalCommand::Close => {
                if let Some(open) = current.take() {
                    client.close_conversation(open.id)?;
                }
            }
            TerminalCommand::Who => {
                let online = handle.online_users().await?;
                println!("online: {online:?}");
            }
            TerminalCommand::Say(text) => match &current {
                Some(open) => handle.send_message(open.id.clone(), open.other_user.clone(), text)?,
                None => println!("open a conversation first"),
            },
        }
    }

    client.shutdown().await?;
    Ok(())
}

/// Rooms are not replayed after a reconnect, so the open conversation has to be joined again.
fn rejoin_target(
    notice: &ClientNotice,
    current: Option<&OpenConversation>,
) -> Option<ConversationId> {
    match (notice, current) {
        (ClientNotice::Reconnected, Some(open)) => Some(open.id.clone()),
        _ => None,
    }
}

async fn open(client: &ChatClient, id: ConversationId) -> Option<OpenConversation> {
    if let Err(error) = client.open_conversation(id.clone()).await {
        warn!(conversation_id = %id, %error, "failed to open conversation");
        println!("! {error}");
        return None;
    }
    let snapshot = match client.handle().snapshot().await {
        Ok(snapshot) => snapshot,
        Err(error) => {
            println!("! {error}");
            return None;
        }
    };
    for message in &snapshot.messages {
        print_message(message);
    }
    let other_user = snapshot
        .conversations
        .iter()
        .find(|conversation| conversation.id == id)
        .map(|conversation| conversation.other_user.id.clone());
    match other_user {
        Some(other_user) => Some(OpenConversation { id, other_user }),
        None => {
            println!("! conversation {id} is not in your list");
            None
        }
    }
}

async fn print_conversations(handle: &ChatHandle) -> Result<()> {
    let snapshot = handle.snapshot().await?;
    for conversation in snapshot.conversations {
        println!(
            "{}  with {}  unread={}  {}",
            conversation.id,
            conversation.other_user.id,
            conversation.unread_count,
            conversation.last_message.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

fn print_message(message: &Message) {
    println!(
        "[{}] {}: {}",
        message.created_at.format("%H:%M"),
        message.sender_id,
        message.body
    );
}

fn print_event(event: &InboundEvent) {
    match event {
        InboundEvent::MessageReceived(message) => print_message(message),
        InboundEvent::UserOnline(user) => println!("* {user} is online"),
        InboundEvent::UserOffline(user) => println!("* {user} went offline"),
        InboundEvent::TypingStart { user_id, .. } => println!("* {user_id} is typing..."),
        InboundEvent::TypingStop { .. } | InboundEvent::SendAck(_) => {}
        InboundEvent::SendError { error } => println!("! send failed: {error}"),
        InboundEvent::MessageNotification(notice) => println!(
            "* new message in {}: {}",
            notice.conversation_id,
            notice.message.as_deref().unwrap_or("")
        ),
    }
}

fn spawn_notice_printer(handle: &ChatHandle) {
    let mut notices = handle.notices();
    tokio::spawn(async move {
        loop {
            let notice = match notices.recv().await {
                Ok(notice) => notice,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "notice printer fell behind");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            match notice {
                ClientNotice::Connected => println!("* connected"),
                ClientNotice::Dropped => println!("* connection dropped"),
                ClientNotice::Reconnecting {
                    attempt,
                    max_attempts,
                } => println!("* reconnecting ({attempt}/{max_attempts})"),
                ClientNotice::Reconnected => println!("* reconnected"),
                ClientNotice::HandshakeRejected { reason } => {
                    println!("! server refused the connection: {reason}")
                }
                ClientNotice::ConnectionLost => println!("! connection lost; restart to retry"),
                ClientNotice::Disconnected => println!("* disconnected"),
            }
        }
    });
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
