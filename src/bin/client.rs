//! TCP Chat Client - Entry Point
//!
//! Connects, claims a nickname and sends each stdin line as a chat message.
//! Events print as JSON lines, or as plain text with `--fallback`.

use std::env;
use std::process::ExitCode;
use std::sync::mpsc::Receiver;
use std::thread;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tcp_chat::event::SYSTEM_USERNAME;
use tcp_chat::{ChatClient, ClientArgs, ClientError, ClientEvent};

const USAGE: &str = "Usage: tcp_chat_client [--fallback] [--port N] <server-ip> <nickname>";

/// Local command that leaves the chat
const QUIT_COMMAND: &str = "/quit";

fn render_text(event: &ClientEvent) -> String {
    match event {
        ClientEvent::NicknameResponse { message, .. } => format!("[{}] {}", SYSTEM_USERNAME, message),
        ClientEvent::Chat { username, message } => format!("{}: {}", username, message),
        ClientEvent::UserJoined { username } => format!("* {} joined the chat", username),
        ClientEvent::UserLeft { username } => format!("* {} left the chat", username),
        ClientEvent::UserList { users } => format!("Users: {}", users.join(", ")),
        ClientEvent::Disconnected => "* Disconnected from server".to_string(),
        ClientEvent::Alert { message } => format!("[{}] {}", SYSTEM_USERNAME, message),
    }
}

/// Print events until the channel closes; signals the first disconnect
fn print_events(events: Receiver<ClientEvent>, fallback: bool, disconnected: oneshot::Sender<()>) {
    let mut disconnected = Some(disconnected);
    for event in events {
        if fallback {
            println!("{}", render_text(&event));
        } else {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("Failed to serialize event: {}", e),
            }
        }

        if event == ClientEvent::Disconnected {
            if let Some(tx) = disconnected.take() {
                let _ = tx.send(());
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tcp_chat=warn")),
        )
        .init();

    let args = match ClientArgs::parse(env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("{}", USAGE);
            return ExitCode::FAILURE;
        }
    };

    let fallback = args.config.fallback;
    let (client, events) = ChatClient::new(args.config);
    let (disconnected_tx, mut disconnected_rx) = oneshot::channel();
    let printer = thread::spawn(move || print_events(events, fallback, disconnected_tx));

    if let Err(e) = client.connect_with_nickname(&args.server, &args.nickname) {
        error!("Failed to join chat: {}", e);
        drop(client);
        let _ = printer.join();
        return ExitCode::FAILURE;
    }
    info!("Joined {} as {}", args.server, args.nickname);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, leaving chat");
                break;
            }
            _ = &mut disconnected_rx => break,
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        error!("Failed to read stdin: {}", e);
                        break;
                    }
                };
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }
                if text == QUIT_COMMAND {
                    break;
                }
                match client.send_chat(text) {
                    Ok(()) => {}
                    Err(ClientError::NicknameRequired) => {
                        eprintln!("Waiting for the server to accept your nickname");
                    }
                    Err(e) => warn!("Message not sent: {}", e),
                }
            }
        }
    }

    client.disconnect();
    drop(client);
    let _ = printer.join();
    ExitCode::SUCCESS
}
