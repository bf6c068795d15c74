//! potpie - talk to a Potpie agent from the terminal

mod config;
mod render;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use potpie_chat::{
    ChatService, ClientConfig, ContextNode, HttpConversationApi, ImageAttachment, MessagePayload,
    ResumeOutcome, SessionId, StreamUpdate,
};
use render::Renderer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// potpie - stream conversations with a Potpie agent
#[derive(Parser, Debug)]
#[command(name = "potpie")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Conversation service URL (overrides config and environment)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// User id for session ids (overrides config and environment)
    #[arg(long, global = true)]
    user: Option<String>,

    /// Bearer token (overrides config and environment)
    #[arg(long, global = true)]
    token: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a message and stream the reply
    Send {
        conversation: String,
        message: String,
        /// Context node as ID or ID:NAME (repeatable)
        #[arg(long = "node")]
        nodes: Vec<String>,
        /// Previously uploaded attachment id (repeatable)
        #[arg(long = "attachment")]
        attachments: Vec<String>,
        /// Image file to upload with the message (repeatable)
        #[arg(long = "image")]
        images: Vec<PathBuf>,
        /// Use this session id instead of generating one
        #[arg(long)]
        session: Option<String>,
        /// Send even if a task is already running for the conversation
        #[arg(long)]
        force: bool,
    },
    /// Reattach to a running session
    Resume {
        conversation: String,
        /// Session to resume; detected from the service when omitted
        #[arg(long)]
        session: Option<String>,
    },
    /// Regenerate the last reply
    Regenerate {
        conversation: String,
        /// Context node as ID or ID:NAME (repeatable)
        #[arg(long = "node")]
        nodes: Vec<String>,
    },
    /// Show background task and session status
    Status { conversation: String },
    /// Print conversation history
    History {
        conversation: String,
        #[arg(long, default_value_t = 0)]
        start: usize,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Stop the running background task
    Stop { conversation: String },
    /// Print the session id a new message would use
    SessionId {
        conversation: String,
        /// Pivot message id (defaults to the current time)
        #[arg(long)]
        pivot: Option<String>,
    },
    /// Initialize config file
    InitConfig,
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "potpie=debug,potpie_chat=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn user_id(args: &Args, config: &config::Config) -> anyhow::Result<String> {
    args.user
        .clone()
        .or_else(|| config.user_id())
        .context("no user id configured; pass --user, set POTPIE_USER_ID, or add user_id to the config file")
}

fn build_service(args: &Args, config: &config::Config) -> anyhow::Result<ChatService> {
    let base_url = args
        .base_url
        .clone()
        .or_else(|| config.base_url())
        .context("no service URL configured; pass --base-url, set POTPIE_BASE_URL, or add base_url to the config file")?;

    let mut client = ClientConfig::new(base_url);
    if let Some(token) = args.token.clone().or_else(|| config.token()) {
        client = client.with_bearer_token(token);
    }
    let api = HttpConversationApi::new(client)?;

    Ok(ChatService::new(Arc::new(api), user_id(args, config)?)
        .with_retry_config(config.retry_config())
        .with_poll_config(config.poll_config()))
}

/// Parse `ID` or `ID:NAME`
fn parse_node(spec: &str) -> ContextNode {
    match spec.split_once(':') {
        Some((id, name)) if !name.is_empty() => ContextNode::new(id, name),
        Some((id, _)) => ContextNode::new(id, id),
        None => ContextNode::new(spec, spec),
    }
}

fn mime_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

fn load_image(path: &Path) -> anyhow::Result<ImageAttachment> {
    let data = std::fs::read(path).with_context(|| format!("reading image {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    Ok(ImageAttachment {
        file_name,
        mime_type: mime_type_for(path).to_string(),
        data,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = config::Config::load();

    match &args.command {
        Command::InitConfig => {
            let path = config::Config::init().context("creating config file")?;
            println!("Config file created at: {}", path.display());
            println!("\nExample config:\n{}", config::example_config());
            return Ok(());
        }
        Command::SessionId {
            conversation,
            pivot,
        } => {
            let user = user_id(&args, &config)?;
            let id = potpie_chat::generate_session_id(conversation, &user, pivot.as_deref());
            println!("{}", id);
            return Ok(());
        }
        _ => {}
    }

    let chat = build_service(&args, &config)?;

    match args.command {
        Command::Send {
            conversation,
            message,
            nodes,
            attachments,
            images,
            session,
            force,
        } => {
            if !force {
                let status = chat.check_background_task_status(&conversation).await;
                if status.is_active {
                    bail!(
                        "conversation {} already has a running task; use `potpie resume` or pass --force",
                        conversation
                    );
                }
            }

            let mut payload =
                MessagePayload::new(message).with_nodes(nodes.iter().map(|n| parse_node(n)).collect());
            if !attachments.is_empty() {
                payload = payload.with_attachment_ids(attachments);
            }
            for path in &images {
                payload = payload.with_image(load_image(path)?);
            }
            if let Some(id) = session {
                payload = payload.with_session_id(SessionId::new(id));
            }

            let mut renderer = Renderer::stdio();
            let outcome = chat
                .stream_message(&conversation, payload, &mut |u: &StreamUpdate| renderer.update(u))
                .await?;
            renderer.finish(&outcome);
        }
        Command::Resume {
            conversation,
            session,
        } => {
            let mut renderer = Renderer::stdio();
            match session {
                Some(id) => {
                    let result = chat
                        .resume_active_session(
                            &conversation,
                            &SessionId::new(id),
                            &mut |u: &StreamUpdate| renderer.update(u),
                        )
                        .await;
                    match result {
                        ResumeOutcome::Resumed(outcome) => renderer.finish(&outcome),
                        ResumeOutcome::Failed(reason) => bail!("could not resume session: {}", reason),
                    }
                }
                None => {
                    let result = chat
                        .reattach(&conversation, &mut |u: &StreamUpdate| renderer.update(u))
                        .await?;
                    match result {
                        Some(outcome) => renderer.finish(&outcome),
                        None => eprintln!("No active session for conversation {}", conversation),
                    }
                }
            }
        }
        Command::Regenerate {
            conversation,
            nodes,
        } => {
            let nodes = nodes.iter().map(|n| parse_node(n)).collect();
            let mut renderer = Renderer::stdio();
            let outcome = chat
                .regenerate_message(&conversation, nodes, &mut |u: &StreamUpdate| renderer.update(u))
                .await?;
            renderer.finish(&outcome);
        }
        Command::Status { conversation } => {
            let status = chat.check_background_task_status(&conversation).await;
            let session = chat.detect_active_session(&conversation).await?;
            let report = serde_json::json!({
                "task": status,
                "session": session,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::History {
            conversation,
            start,
            limit,
        } => {
            let messages = chat.load_messages(&conversation, start, limit).await?;
            if messages.is_empty() {
                eprintln!("No messages");
            }
            for message in messages {
                let kind = message.message_type.as_deref().unwrap_or("MESSAGE");
                println!("[{}] {}", kind, message.content);
                for citation in message.citations.unwrap_or_default() {
                    println!("    - {}", citation);
                }
            }
        }
        Command::Stop { conversation } => {
            chat.stop_message(&conversation).await?;
            println!("Stopped task for conversation {}", conversation);
        }
        Command::SessionId { .. } | Command::InitConfig => {}
    }

    Ok(())
}
