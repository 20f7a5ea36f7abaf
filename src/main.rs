//! Interactive command-line front end

use anyhow::Context;
use bytes::Bytes;
use rag_assistant::config::{Config, LogFormat, LoggingConfig};
use rag_assistant::context::{ConversationSession, TiktokenEstimator, TokenBudget};
use rag_assistant::index::InMemoryIndex;
use rag_assistant::ingest::{create_chunker, DocumentLibrary, UploadedFile};
use rag_assistant::metrics::METRICS;
use rag_assistant::orchestrator::{render, QueryOrchestrator};
use rag_assistant::providers::{
    Credentials, HttpBackendFactory, InMemoryKeyStore, KeyStore, Provider, ProviderClient,
};
use secrecy::SecretString;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

const HELP: &str = "Commands:
  :upload <path>            index a text file
  :docs                     list uploaded documents
  :delete <name-or-id>      remove a document or a single chunk
  :clear-docs               remove every indexed chunk
  :clear                    forget the conversation
  :key <provider> <key>     set an API key
  :provider <name>          switch provider (groq, openai, gemini, deepseek)
  :metrics                  print Prometheus metrics
  quit | exit | q           leave";

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.with_target(false).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load().context("Failed to load configuration")?;
    init_tracing(&config.logging);

    let estimator = Arc::new(TiktokenEstimator::new()?);
    let budget = TokenBudget::new(config.memory.clone())?;

    let index = Arc::new(InMemoryIndex::new());
    let chunker = create_chunker(config.chunking.clone(), estimator.bpe())?;
    let library = DocumentLibrary::new(index, chunker);

    let client = ProviderClient::new(
        Arc::new(HttpBackendFactory::new(config.providers.clone())),
        config.retry.clone(),
    );
    let orchestrator = QueryOrchestrator::new(library, client)
        .with_relevance_ceiling(config.retrieval.relevance_ceiling);

    let loaded = orchestrator.load_directory(&config.data_dir).await?;
    info!("Startup indexing added {} chunks", loaded);

    let keys = InMemoryKeyStore::new().from_env();
    let mut session = ConversationSession::new(budget, estimator);
    info!(session = %session.id(), "Session started");

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    stdout.write_all(format!("{}\n\n> ", HELP).as_bytes()).await?;
    stdout.flush().await?;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if matches!(line, "quit" | "exit" | "q") {
            break;
        }

        let output = if line.is_empty() {
            String::new()
        } else if let Some(command) = line.strip_prefix(':') {
            run_command(command, &orchestrator, &keys, &mut session).await
        } else {
            let credentials = Credentials::from_store(&keys);
            let provider = keys.selected_provider();
            let reply = orchestrator
                .answer(
                    &mut session,
                    line,
                    config.retrieval.n_results,
                    provider.as_str(),
                    &credentials,
                )
                .await;
            render(&reply)
        };

        if !output.is_empty() {
            stdout.write_all(format!("{}\n", output).as_bytes()).await?;
        }
        stdout.write_all(b"\n> ").await?;
        stdout.flush().await?;
    }

    Ok(())
}

async fn run_command(
    command: &str,
    orchestrator: &QueryOrchestrator,
    keys: &InMemoryKeyStore,
    session: &mut ConversationSession,
) -> String {
    let mut parts = command.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default();
    let arg = parts.next().map(str::trim).unwrap_or_default();

    match name {
        "upload" if !arg.is_empty() => match read_upload(arg).await {
            Ok(file) => match orchestrator.upload(file).await {
                Ok(receipt) => receipt.to_string(),
                Err(e) => e.to_string(),
            },
            Err(e) => format!("{:#}", e),
        },
        "docs" => match orchestrator.list_documents().await {
            Ok(docs) if docs.is_empty() => "No documents uploaded".to_string(),
            Ok(docs) => docs
                .iter()
                .map(|d| format!("{} ({}, {} bytes, {} chunks)", d.name, d.file_type, d.size, d.chunks))
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => e.to_string(),
        },
        "delete" if !arg.is_empty() => match orchestrator.delete(arg).await {
            Ok(removed) => format!("Deleted {} ({} chunks)", arg, removed),
            Err(e) => e.to_string(),
        },
        "clear-docs" => match orchestrator.clear_all().await {
            Ok(report) => report.to_string(),
            Err(e) => e.to_string(),
        },
        "clear" => {
            orchestrator.clear_history(session);
            "Conversation cleared".to_string()
        }
        "key" => {
            let mut kv = arg.splitn(2, char::is_whitespace);
            match (kv.next().map(str::parse::<Provider>), kv.next()) {
                (Some(Ok(provider)), Some(key)) if !key.trim().is_empty() => {
                    keys.set(provider, SecretString::new(key.trim().to_string()));
                    format!("{} API key saved", provider)
                }
                (Some(Err(e)), _) => e.to_string(),
                _ => "Usage: :key <provider> <key>".to_string(),
            }
        }
        "provider" => match arg.parse::<Provider>() {
            Ok(provider) => {
                keys.select(provider);
                format!("Using {}", provider)
            }
            Err(e) => e.to_string(),
        },
        "metrics" => METRICS.export_prometheus(),
        _ => HELP.to_string(),
    }
}

async fn read_upload(path: &str) -> anyhow::Result<UploadedFile> {
    let path = Path::new(path);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .context("Upload path has no file name")?;
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(UploadedFile::new(name, Bytes::from(data)))
}
