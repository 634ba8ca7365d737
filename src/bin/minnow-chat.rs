//! Interactive chat client for a remote agent service.
//!
//! This binary provides a streaming REPL over the minnow session store:
//! sessions persist across runs, turns stream with live progress, and
//! Ctrl-C cancels the in-flight turn without losing what already arrived.
//!
//! # Usage
//!
//! ```bash
//! # Talk to a local agent service
//! minnow-chat
//!
//! # Point at a deployment and pick a persona
//! minnow-chat --base-url https://agents.example.com/flask/agent --mask ticket-1
//! ```
//!
//! # Commands
//!
//! While chatting, you can use slash commands:
//! - `/help` - Show available commands
//! - `/new [mask]` - Start a new session, optionally from a persona
//! - `/list` - List sessions
//! - `/switch <n>` - Select a session
//! - `/clear` - Clear the current session's history
//! - `/retry` - Re-run the last failed turn
//! - `/questions [related]` - Show suggested questions
//! - `/think on|off` - Toggle deep thinking
//! - `/quit` - Exit

use std::sync::Arc;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use minnow::store::StoreUpdate;
use minnow::{
    AgentClient, ChatStore, LoadingStage, Mask, MessageRole, QuestionKind, StoreConfig,
};

/// Command-line arguments for the minnow-chat tool.
#[derive(arrrg_derive::CommandLine, Debug, Default, PartialEq, Eq)]
struct ChatArgs {
    /// Base URL of the agent service.
    #[arrrg(optional, "Agent service base URL", "URL")]
    base_url: Option<String>,

    /// Persona preset to start with.
    #[arrrg(optional, "Persona preset id (see /masks)", "MASK")]
    mask: Option<String>,

    /// Where to persist sessions and the user id.
    #[arrrg(optional, "Data directory (default: ./.minnow)", "DIR")]
    data_dir: Option<String>,

    /// Verbose logging.
    #[arrrg(flag, "Enable debug logging")]
    verbose: bool,
}

/// A parsed slash command.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ReplCommand {
    Help,
    New(Option<String>),
    Masks,
    List,
    Switch(usize),
    Clear,
    Delete,
    Fork,
    Retry,
    Questions(QuestionKind),
    Think(bool),
    Topic,
    Quit,
}

fn parse_command(line: &str) -> Option<Result<ReplCommand, String>> {
    let line = line.strip_prefix('/')?;
    let mut parts = line.split_whitespace();
    let command = parts.next().unwrap_or("");
    let arg = parts.next();

    let parsed = match command {
        "help" => Ok(ReplCommand::Help),
        "new" => Ok(ReplCommand::New(arg.map(String::from))),
        "masks" => Ok(ReplCommand::Masks),
        "list" => Ok(ReplCommand::List),
        "switch" => match arg.and_then(|a| a.parse::<usize>().ok()) {
            Some(index) => Ok(ReplCommand::Switch(index)),
            None => Err("usage: /switch <index>".to_string()),
        },
        "clear" => Ok(ReplCommand::Clear),
        "delete" => Ok(ReplCommand::Delete),
        "fork" => Ok(ReplCommand::Fork),
        "retry" => Ok(ReplCommand::Retry),
        "questions" => match arg {
            Some("related") => Ok(ReplCommand::Questions(QuestionKind::Related)),
            _ => Ok(ReplCommand::Questions(QuestionKind::Default)),
        },
        "think" => match arg {
            Some("on") => Ok(ReplCommand::Think(true)),
            Some("off") => Ok(ReplCommand::Think(false)),
            _ => Err("usage: /think on|off".to_string()),
        },
        "topic" => Ok(ReplCommand::Topic),
        "quit" | "exit" => Ok(ReplCommand::Quit),
        other => Err(format!("unknown command: /{other} (try /help)")),
    };
    Some(parsed)
}

fn help_text() -> &'static str {
    "/help                Show this help
/new [mask]          Start a new session, optionally from a persona
/masks               List persona presets
/list                List sessions
/switch <n>          Select session n
/clear               Clear the current session's history
/delete              Delete the current session
/fork                Fork the current session
/retry               Re-run the last failed turn
/questions [related] Show suggested questions
/think on|off        Toggle deep thinking
/topic               Show the current topic
/quit                Exit"
}

fn stage_label(stage: LoadingStage) -> &'static str {
    match stage {
        LoadingStage::Connecting => "connecting",
        LoadingStage::Processing => "processing",
        LoadingStage::Generating => "generating",
        LoadingStage::Thinking => "thinking",
        LoadingStage::ToolCalling => "calling tools",
        LoadingStage::Error => "error",
    }
}

/// Prints stage transitions while a turn streams.
fn spawn_progress_printer(store: Arc<ChatStore>) {
    let mut updates = store.subscribe();
    tokio::spawn(async move {
        let mut last_stage: Option<LoadingStage> = None;
        while let Ok(update) = updates.recv().await {
            let StoreUpdate::Message {
                session_id,
                message_id,
            } = update
            else {
                continue;
            };
            let stage = store.with_session(&session_id, |session| {
                session
                    .messages
                    .iter()
                    .find(|m| m.id == message_id && m.streaming)
                    .and_then(|m| m.loading_stage)
            });
            if let Some(Some(stage)) = stage {
                if last_stage != Some(stage) {
                    eprintln!("  [{}]", stage_label(stage));
                    last_stage = Some(stage);
                }
            } else {
                last_stage = None;
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, _) = ChatArgs::from_command_line_relaxed("minnow-chat [OPTIONS]");

    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let client = AgentClient::new(args.base_url.clone())?;
    let storage = minnow::storage::FileStorage::new(
        args.data_dir.clone().unwrap_or_else(|| ".minnow".to_string()),
    )?;
    let store = Arc::new(ChatStore::new(
        Arc::new(client),
        Arc::new(storage),
        StoreConfig::default(),
    )?);

    let masks = minnow::mask::builtin_masks();
    if let Some(mask_id) = &args.mask {
        match minnow::mask::find_mask(&masks, mask_id) {
            Some(mask) => {
                store.new_session(Some(mask.clone()));
            }
            None => {
                eprintln!("unknown mask: {mask_id} (try /masks)");
            }
        }
    }

    // Ctrl-C cancels the in-flight turn; partial output stays.
    let interrupt_store = Arc::clone(&store);
    ctrlc::set_handler(move || {
        if !interrupt_store.cancel_current() {
            std::process::exit(0);
        }
    })?;

    spawn_progress_printer(Arc::clone(&store));

    let mut rl = DefaultEditor::new()?;
    let session = store.current_session();
    println!(
        "minnow-chat (persona: {}, user: {})",
        if session.mask.name.is_empty() {
            "default"
        } else {
            &session.mask.name
        },
        store.user_id()
    );
    println!("Type /help for commands, /quit to exit\n");

    loop {
        let readline = rl.readline("You: ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                if let Some(command) = parse_command(line) {
                    match command {
                        Ok(ReplCommand::Quit) => {
                            println!("Goodbye!");
                            break;
                        }
                        Ok(command) => run_command(&store, &masks, command).await,
                        Err(message) => println!("{message}"),
                    }
                    continue;
                }

                if let Err(err) = store.send_user_input(line, Vec::new()).await {
                    println!("error: {err}");
                    continue;
                }
                let session = store.current_session();
                if let Some(reply) = session
                    .messages
                    .iter()
                    .rev()
                    .find(|m| m.role == MessageRole::Assistant)
                {
                    println!("\nAgent:\n{}\n", reply.content);
                }
            }
            Err(ReadlineError::Interrupted) => {
                // The ctrlc handler already cancelled any live turn.
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                eprintln!("readline error: {err}");
                break;
            }
        }
    }

    Ok(())
}

async fn run_command(store: &Arc<ChatStore>, masks: &[Mask], command: ReplCommand) {
    match command {
        ReplCommand::Help => {
            for line in help_text().lines() {
                println!("    {line}");
            }
        }
        ReplCommand::New(mask_id) => {
            let mask = mask_id
                .as_deref()
                .and_then(|id| minnow::mask::find_mask(masks, id));
            if mask_id.is_some() && mask.is_none() {
                println!("unknown mask (try /masks); starting a default session");
            }
            store.new_session(mask.cloned());
            println!("Started session: {}", store.current_session().topic);
        }
        ReplCommand::Masks => {
            for mask in masks {
                println!("  {:12} {} - {}", mask.id, mask.name, mask.description);
            }
        }
        ReplCommand::List => {
            let current = store.current_index();
            for (index, session) in store.sessions().iter().enumerate() {
                let marker = if index == current { "*" } else { " " };
                println!(
                    "{marker} [{index}] {} ({} messages)",
                    session.topic,
                    session.messages.len()
                );
            }
        }
        ReplCommand::Switch(index) => {
            store.select_session(index);
            println!("Switched to: {}", store.current_session().topic);
        }
        ReplCommand::Clear => {
            store.clear_history().await;
            println!("History cleared.");
        }
        ReplCommand::Delete => {
            let index = store.current_index();
            if store.delete_session(index).await.is_some() {
                println!("Session deleted.");
            }
        }
        ReplCommand::Fork => {
            store.fork_current();
            println!("Forked into: {}", store.current_session().topic);
        }
        ReplCommand::Retry => {
            if let Err(err) = store.retry_last_turn().await {
                println!("cannot retry: {err}");
                return;
            }
            let session = store.current_session();
            if let Some(reply) = session
                .messages
                .iter()
                .rev()
                .find(|m| m.role == MessageRole::Assistant)
            {
                println!("\nAgent:\n{}\n", reply.content);
            }
        }
        ReplCommand::Questions(kind) => match store.suggested_questions(kind).await {
            Ok(questions) => {
                for question in questions {
                    println!("  - {}", question.text);
                }
            }
            Err(err) => println!("no suggestions: {err}"),
        },
        ReplCommand::Think(enabled) => {
            let session_id = store.current_session().id.clone();
            store.update_session(&session_id, |session| {
                session.deep_thinking = enabled;
            });
            println!(
                "Deep thinking {}.",
                if enabled { "enabled" } else { "disabled" }
            );
        }
        ReplCommand::Topic => {
            println!("Topic: {}", store.current_session().topic);
        }
        ReplCommand::Quit => unreachable!("handled by the caller"),
    }
}
