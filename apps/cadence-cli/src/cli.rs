use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use cadence_capabilities::InMemoryCalendar;
use cadence_config::{load_config, CadenceConfig};
use cadence_core::types::ConversationTurn;
use cadence_runtime::{AssistantApp, MessageRequest};

const DEFAULT_CONFIG: &str = "configs/cadence.yaml";

#[derive(Debug, Parser)]
#[command(name = "cadence", about = "Cadence scheduling assistant")]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Handle one message and print the response as JSON
    Ask(AskArgs),
    /// Read one message per stdin line, keeping conversation and ledger
    Chat(ChatArgs),
}

#[derive(Debug, Args, Clone)]
struct SessionArgs {
    #[arg(long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,
    /// JSON calendar fixture (`{"users": {...}}`); empty calendar when omitted
    #[arg(long)]
    fixture: Option<PathBuf>,
    #[arg(long, default_value = "demo")]
    user: String,
    /// Date the user is looking at (YYYY-MM-DD); defaults to today
    #[arg(long)]
    viewing_date: Option<NaiveDate>,
}

#[derive(Debug, Args, Clone)]
struct AskArgs {
    #[command(flatten)]
    session: SessionArgs,
    #[arg(value_name = "UTTERANCE", required = true)]
    utterance: Vec<String>,
}

#[derive(Debug, Args, Clone)]
struct ChatArgs {
    #[command(flatten)]
    session: SessionArgs,
    /// Print the full JSON response after each reply
    #[arg(long)]
    json: bool,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Ask(args) => ask(args).await,
            Command::Chat(args) => chat(args).await,
        }
    }
}

async fn ask(args: AskArgs) -> anyhow::Result<()> {
    let app = build_app(&args.session)?;
    let request = MessageRequest::new(&args.session.user, args.utterance.join(" "))
        .with_viewing_date(args.session.viewing_date);
    let response = app.handle_message(request).await;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn chat(args: ChatArgs) -> anyhow::Result<()> {
    let app = build_app(&args.session)?;
    let mut conversation: Vec<ConversationTurn> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let utterance = line.trim();
        if utterance.is_empty() || utterance.starts_with('#') {
            continue;
        }
        if matches!(utterance, "exit" | "quit") {
            break;
        }

        let request = MessageRequest::new(&args.session.user, utterance)
            .with_conversation(conversation.clone())
            .with_viewing_date(args.session.viewing_date);
        let response = app.handle_message(request).await;
        let reply = response.reply_text();
        println!("{reply}");
        if args.json {
            println!("{}", serde_json::to_string_pretty(&response)?);
        }

        conversation.push(ConversationTurn::user(utterance));
        conversation.push(ConversationTurn::assistant(reply));
    }
    Ok(())
}

fn build_app(session: &SessionArgs) -> anyhow::Result<AssistantApp> {
    let config = read_config(&session.config)?;
    let calendar = match &session.fixture {
        Some(path) => InMemoryCalendar::from_fixture_file(path)
            .with_context(|| format!("failed to load fixture '{}'", path.display()))?,
        None => InMemoryCalendar::new(),
    };
    AssistantApp::from_config(config, Arc::new(calendar)).context("failed to start assistant")
}

/// The default config path may be absent; an explicit one must exist.
fn read_config(path: &Path) -> anyhow::Result<CadenceConfig> {
    if !path.exists() && path == Path::new(DEFAULT_CONFIG) {
        return Ok(CadenceConfig::default());
    }
    load_config(path).with_context(|| format!("failed to load config '{}'", path.display()))
}
