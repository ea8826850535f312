use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    DocumentChatClient, PdfFile, SessionScope, SubmitOutcome, SUGGESTED_QUESTIONS,
};
use shared::domain::{Role, Turn, TurnBody};
use storage::Storage;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, normalize_database_url};

#[derive(Parser, Debug)]
#[command(name = "docuquery", about = "Upload a PDF and ask questions about it")]
struct Cli {
    #[arg(long, default_value = "docuquery.toml")]
    config: PathBuf,
    #[arg(long)]
    api_url: Option<String>,
    #[arg(long)]
    database_url: Option<String>,
    /// Session scope the document token is stored under.
    #[arg(long)]
    scope: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the document service is up.
    Status,
    /// Upload a PDF and remember its session.
    Upload { path: PathBuf },
    /// Ask one question about the last uploaded document.
    Ask {
        #[arg(required = true)]
        question: Vec<String>,
    },
    /// Interactive conversation, optionally uploading a PDF first.
    Chat { path: Option<PathBuf> },
    /// Forget the stored session.
    Forget,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = load_settings(&cli.config)?;
    if let Some(api_url) = cli.api_url {
        settings.api_url = api_url;
    }
    if let Some(database_url) = cli.database_url {
        settings.database_url = database_url;
    }
    if let Some(scope) = cli.scope {
        settings.session_scope = scope;
    }

    let database_url = normalize_database_url(&settings.database_url);
    let storage = Storage::new(&database_url)
        .await
        .with_context(|| format!("failed to open session store at '{database_url}'"))?;
    let session = SessionScope::new(settings.session_scope.clone(), Arc::new(storage));
    let client = DocumentChatClient::new(settings.client_options(), session)?;
    info!(
        api_url = %settings.api_url,
        scope = %settings.session_scope,
        %database_url,
        "docuquery: client ready"
    );

    match cli.command {
        Command::Status => {
            client.session().check_store().await?;
            println!("session store: ok ({database_url})");
            let status = client.check_status().await?;
            println!(
                "{}: {}",
                status.status,
                status.message.as_deref().unwrap_or("")
            );
            if !status.is_ok() {
                return Err(anyhow!("document service reported status '{}'", status.status));
            }
        }
        Command::Upload { path } => upload(&client, &path).await?,
        Command::Ask { question } => {
            let question = question.join(" ");
            if client.conversation().submit(&question).await == SubmitOutcome::Ignored {
                return Err(anyhow!("question must not be empty"));
            }
            if let Some(turn) = client.conversation().turns().await.last() {
                println!("{}", render_turn(turn));
            }
        }
        Command::Chat { path } => {
            if let Some(path) = path {
                upload(&client, &path).await?;
            }
            chat(&client).await?;
        }
        Command::Forget => {
            if client.session().clear().await? {
                println!("Session for scope '{}' forgotten.", client.session().name());
            } else {
                println!("No session stored for scope '{}'.", client.session().name());
            }
        }
    }

    Ok(())
}

async fn upload(client: &DocumentChatClient, path: &Path) -> Result<()> {
    let file = PdfFile::from_path(path)
        .await
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    let response = client.start_document(&file).await?;
    println!(
        "{} (session {})",
        response
            .message
            .as_deref()
            .unwrap_or("Document uploaded"),
        response.session_id
    );
    Ok(())
}

async fn chat(client: &DocumentChatClient) -> Result<()> {
    println!("Ask anything about your document. Commands: /suggest <n>, /new <pdf>, /quit");
    for (index, suggestion) in SUGGESTED_QUESTIONS.iter().enumerate() {
        println!("  [{}] {suggestion}", index + 1);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line == "/quit" || line == "/exit" {
            break;
        }

        if let Some(path) = line.strip_prefix("/new ") {
            if let Err(err) = upload(client, Path::new(path.trim())).await {
                eprintln!("{err:#}");
            }
            continue;
        }

        if let Some(index) = line.strip_prefix("/suggest ") {
            let applied = match index.trim().parse::<usize>() {
                Ok(n) if n > 0 => client.conversation().apply_suggestion(n - 1).await,
                _ => false,
            };
            if !applied {
                eprintln!("pick a suggestion between 1 and {}", SUGGESTED_QUESTIONS.len());
                continue;
            }
            client.conversation().submit_draft().await;
        } else {
            client.conversation().set_draft(line).await;
            if client.conversation().submit_draft().await == SubmitOutcome::Ignored {
                continue;
            }
        }

        for turn in client.conversation().turns().await.iter().rev().take(2).rev() {
            println!("{}", render_turn(turn));
        }
    }

    Ok(())
}

fn render_turn(turn: &Turn) -> String {
    let speaker = match turn.role {
        Role::User => "you",
        Role::Assistant => "docuquery",
    };
    match &turn.body {
        TurnBody::Pending => format!("{speaker}> Thinking..."),
        TurnBody::Resolved(text) => format!("{speaker}> {text}"),
        TurnBody::Failed(text) => format!("{speaker}> (!) {text}"),
    }
}
