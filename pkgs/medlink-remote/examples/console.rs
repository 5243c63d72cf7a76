use clap::Parser;
use medlink_chat::{ChatConfig, ChatEvent, ModeController, Role, SessionScope};
use medlink_remote::{collaborators, RemoteConfig};
use std::io::{self, Write};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// MedLink console - chat with patients and colleagues from a terminal
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Id of the signed-in user
    #[arg(short, long)]
    user: String,

    /// REST API base URL (overrides MEDLINK_API_URL)
    #[arg(long)]
    api_url: Option<String>,

    /// Socket base URL (overrides MEDLINK_SOCKET_URL)
    #[arg(long)]
    socket_url: Option<String>,

    /// Keep one socket for the user instead of one per room
    #[arg(long)]
    per_user_socket: bool,
}

fn show_help() {
    println!("\nAvailable commands:");
    println!("  help, h                 Show this help");
    println!("  list <doctors|patients> Load a conversation tab");
    println!("  filter <text>           Filter conversations by name");
    println!("  open <n>                Open conversation number n");
    println!("  leave                   Leave the open conversation");
    println!("  ai                      Open the AI assistant");
    println!("  close-ai                Close the AI assistant");
    println!("  search <text>           Search doctors");
    println!("  connect <doctor-id>     Send a connection request");
    println!("  requests                Show pending requests");
    println!("  accept <id> / reject <id>");
    println!("  retry <message-id>      Retry a failed message");
    println!("  quit, q                 Exit");
    println!("  anything else           Send as a message");
}

fn print_event(event: &ChatEvent, chat: &ModeController) {
    match event {
        ChatEvent::ModeChanged { mode } => println!("-- mode: {}", mode.name()),
        ChatEvent::TimelineUpdated { room, .. } => {
            if let Some(last) = chat.timeline_for(room).last() {
                println!("[{}] {}: {} ({:?})", room, last.sender_id, last.text, last.delivery);
            }
        }
        ChatEvent::ConversationTouched { room, unread: true } => {
            println!("-- new message in {}", room)
        }
        ChatEvent::SessionChanged { key, state } => println!("-- socket {}: {:?}", key, state),
        ChatEvent::AssistantUpdated { .. } => {
            if let Some(turn) = chat.assistant_thread().last() {
                println!("[assistant] {:?}: {}", turn.role, turn.text);
            }
        }
        ChatEvent::Notice(notice) => println!("!! {}", notice.message),
        ChatEvent::AuthRequired { status } => println!("!! please sign in again ({})", status),
        other => debug!("Event: {:?}", other),
    }
}

/// Returns false when the user asked to quit
async fn process_command(input: &str, chat: &mut ModeController) -> bool {
    let (command, rest) = match input.split_once(' ') {
        Some((command, rest)) => (command, rest.trim()),
        None => (input, ""),
    };

    // errors are already reported as notices
    match command {
        "help" | "h" | "?" => show_help(),
        "quit" | "exit" | "q" => return false,
        "list" => {
            let tab = if rest.starts_with("doc") {
                Role::Doctor
            } else {
                Role::Patient
            };
            if let Ok(list) = chat.load_conversations(tab).await {
                for (i, c) in list.iter().enumerate() {
                    let marker = if c.unread { "*" } else { " " };
                    println!("{:>3}{} {}  {}", i, marker, c.name, c.last_message.as_deref().unwrap_or(""));
                }
            }
        }
        "filter" => {
            for c in chat.filter_conversations(rest) {
                println!("  {} ({})", c.name, c.id);
            }
        }
        "open" => match rest.parse::<usize>().ok().and_then(|i| chat.conversations().get(i).cloned()) {
            Some(conversation) => {
                let _ = chat.select_conversation(&conversation).await;
            }
            None => println!("No such conversation"),
        },
        "leave" => chat.leave_conversation(),
        "ai" => {
            let _ = chat.open_ai_assistant().await;
        }
        "close-ai" => {
            let _ = chat.close_ai_assistant().await;
        }
        "search" => {
            if let Ok(results) = chat.search_doctors(rest).await {
                for r in results {
                    println!(
                        "  {}  {}  {}",
                        r.doctor.id,
                        r.doctor.full_name,
                        r.doctor.specialization.as_deref().unwrap_or("-")
                    );
                }
            }
        }
        "connect" => {
            let _ = chat.send_connection_request(rest).await;
        }
        "requests" => {
            if let Ok(pending) = chat.fetch_pending_requests().await {
                for r in pending {
                    println!("  {}  from {}", r.id, r.doctor.full_name);
                }
            }
        }
        "accept" => {
            let _ = chat.accept_request(rest).await;
        }
        "reject" => {
            let _ = chat.reject_request(rest).await;
        }
        "retry" => {
            let _ = chat.retry_message(rest).await;
        }
        _ => {
            let _ = chat.send_message(input).await;
        }
    }
    true
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut remote = RemoteConfig::from_env()?;
    if let Some(url) = args.api_url {
        remote.api_url = url;
    }
    if let Some(url) = args.socket_url {
        remote.socket_url = url;
    }

    let scope = if args.per_user_socket {
        SessionScope::PerUser
    } else {
        SessionScope::PerRoom
    };
    let config = ChatConfig::new(args.user.clone()).with_session_scope(scope);

    info!("Starting console for {}", args.user);
    let (mut chat, mut events) = ModeController::new(config, collaborators(&remote)?);

    let (stdin_sender, mut stdin_receiver) = tokio::sync::mpsc::unbounded_channel::<String>();
    let stdin_handle = tokio::spawn(async move {
        use tokio::io::{AsyncBufReadExt, BufReader};
        let mut stdin = BufReader::new(tokio::io::stdin());
        let mut line = String::new();

        loop {
            line.clear();
            match stdin.read_line(&mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = line.trim().to_string();
                    if !line.is_empty() && stdin_sender.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    show_help();
    let mut running = true;
    while running {
        print!("> ");
        io::stdout().flush()?;

        tokio::select! {
            result = chat.process_next() => {
                result?;
            }

            Some(event) = events.recv() => {
                print_event(&event, &chat);
            }

            Some(input) = stdin_receiver.recv() => {
                if !process_command(&input, &mut chat).await {
                    running = false;
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                running = false;
            }
        }
    }

    chat.shutdown();
    stdin_handle.abort();
    Ok(())
}
