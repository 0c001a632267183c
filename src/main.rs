//! Parley - Turn-based voice tutor
//!
//! Console front-end for the conversation session. Typed turns go through
//! the same cycle as spoken ones; host speech engines can be wired in where
//! the platform provides them.

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use parley::{export, Session, SessionConfig, SessionEvent};
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Turn-based voice tutor console")]
struct Args {
    /// Backend base URL
    #[arg(long, default_value = "http://localhost:5000")]
    backend_url: String,

    /// Initial language tag (en-US or zh-CN)
    #[arg(short, long, default_value = "en-US")]
    language: String,

    /// Per-request backend timeout in seconds
    #[arg(long, default_value = "30")]
    request_timeout: u64,

    /// Where /export writes the downloaded document
    #[arg(long, default_value = "chat_history.md")]
    export_path: PathBuf,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    info!("Starting parley voice tutor");

    let config = SessionConfig::new()
        .with_backend_url(&args.backend_url)
        .with_language(&args.language)
        .with_request_timeout_secs(args.request_timeout);
    let (session, handle) = Session::new(config)?;
    let handle = Arc::new(handle);

    let worker_handles = session.start()?;
    let printer = spawn_event_printer(Arc::clone(&handle), args.export_path.clone());

    println!("parley - type text to talk, /help for commands");
    run_repl(&handle);

    for worker in worker_handles {
        let _ = worker.join();
    }
    let _ = printer.join();
    info!("parley stopped");

    Ok(())
}

/// Print session events until the session shuts down
fn spawn_event_printer(
    handle: Arc<parley::SessionHandle>,
    export_path: PathBuf,
) -> thread::JoinHandle<()> {
    thread::spawn(move || loop {
        let event = match handle.recv_event() {
            Ok(event) => event,
            Err(_) => break,
        };

        match event {
            SessionEvent::StateChanged(state) => println!("[{}]", state),
            SessionEvent::Interim(text) => println!("  ... {}", text),
            SessionEvent::TurnRecorded(entry) => {
                println!("You ({}s, {} words): {}", entry.duration_secs, entry.word_count, entry.message)
            }
            SessionEvent::ReplyRecorded(entry) => println!("Tutor: {}", entry.message),
            SessionEvent::ReplyFinished { duration_secs } => {
                println!("  (spoke for {}s)", duration_secs)
            }
            SessionEvent::Status(message) => println!("! {}", message),
            SessionEvent::Models(models) => {
                println!("Models:");
                for model in &models {
                    let marker = if model.is_default { "*" } else { " " };
                    println!("  {} {} ({})", marker, model.name, model.id);
                }
            }
            SessionEvent::SystemPrompt(prompt) => println!("System prompt:\n{}", prompt),
            SessionEvent::SystemPromptSaved => println!("System prompt saved."),
            SessionEvent::HistoryExported(bytes) => {
                match export::write_export(&export_path, &bytes) {
                    Ok(()) => println!("Exported {} bytes to {}", bytes.len(), export_path.display()),
                    Err(e) => eprintln!("error: {}", e.user_message()),
                }
            }
            SessionEvent::Error(message) => eprintln!("error: {}", message),
            SessionEvent::Shutdown => break,
        }
    })
}

/// Read commands and typed turns from stdin until quit or EOF
fn run_repl(handle: &parley::SessionHandle) {
    let stdin = io::stdin();
    let mut requested_shutdown = false;

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (command, rest) = match line.split_once(' ') {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        let sent = match command {
            "/listen" => handle.start_listening(),
            "/stop" => {
                if handle.is_listening() {
                    handle.stop_listening()
                } else if handle.is_speaking() {
                    handle.stop_speaking()
                } else {
                    println!("Nothing to stop.");
                    Ok(())
                }
            }
            "/models" => handle.refresh_models(),
            "/model" if !rest.is_empty() => handle.select_model(rest),
            "/lang" if !rest.is_empty() => handle.select_language(rest),
            "/prompt" => {
                if rest.is_empty() {
                    handle.fetch_system_prompt()
                } else {
                    handle.save_system_prompt(rest)
                }
            }
            "/export" => handle.export_history(),
            "/copy" => {
                copy_history(handle);
                Ok(())
            }
            "/state" => {
                print_state(handle);
                Ok(())
            }
            "/help" => {
                print_help();
                Ok(())
            }
            "/quit" | "/exit" => {
                requested_shutdown = true;
                handle.shutdown()
            }
            _ if command.starts_with('/') => {
                println!("Unknown command: {} (try /help)", command);
                Ok(())
            }
            _ => handle.submit_text(line),
        };

        if let Err(e) = sent {
            eprintln!("error: {}", e.user_message());
        }
        if requested_shutdown {
            break;
        }
    }

    if !requested_shutdown {
        let _ = handle.shutdown();
    }
}

/// Render the history locally and hand it to the platform clipboard
fn copy_history(handle: &parley::SessionHandle) {
    let entries = handle.history().snapshot();
    if entries.is_empty() {
        println!("No chat history to copy.");
        return;
    }

    let document = export::render_markdown(&entries, Utc::now());
    match export::copy_to_clipboard(&document) {
        Ok(()) => println!("Chat history copied to clipboard."),
        Err(e) => eprintln!("error: {}", e.user_message()),
    }
}

fn print_state(handle: &parley::SessionHandle) {
    let snapshot = handle.state().snapshot();
    let model = snapshot.selections.model_id.as_deref().unwrap_or("(none)");
    println!(
        "{} ({}) | model {} | {} entries",
        snapshot.conversation,
        snapshot.selections.language_code(),
        model,
        handle.history().len()
    );
    if let Some(status) = snapshot.status {
        println!("! {}", status);
    }
}

fn print_help() {
    println!("Commands:");
    println!("  /listen          begin a listening turn");
    println!("  /stop            stop listening (submits the turn) or stop playback");
    println!("  /models          reload the model catalog");
    println!("  /model <id>      choose a model from the catalog");
    println!("  /lang <tag>      choose a language (en-US, zh-CN)");
    println!("  /prompt          show the system prompt");
    println!("  /prompt <text>   replace the system prompt");
    println!("  /export          export history through the backend");
    println!("  /copy            copy history to the clipboard");
    println!("  /state           show session state");
    println!("  /quit            shut down");
    println!("Anything else is sent as a typed turn.");
}
