//! Aula application entry point.
//!
//! `aula serve` runs the answer endpoint; `aula chat` is the terminal client.

mod cli;
mod terminal;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, watch};

use aula_api::handlers::HealthResponse;
use aula_api::AppState;
use aula_chat::{ChatSession, ConversationStore, Screen};
use aula_core::{AssistError, AulaConfig};
use aula_ingest::{KnowledgeBase, UploadedFile};
use aula_stream::AnswerStreamClient;

use cli::{CliArgs, Command};
use terminal::TerminalRenderer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();
    let config_file = args.resolve_config_path();
    let from_file = config_file.exists();
    let mut config = if from_file {
        AulaConfig::load(&config_file)?
    } else {
        AulaConfig::default()
    };
    args.apply_overrides(&mut config);
    config.validate()?;

    // Logs go to stderr so they never interleave with the chat transcript.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(args.resolve_log_level(&config))),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        path = %config_file.display(),
        from_file,
        "Starting Aula v{}",
        env!("CARGO_PKG_VERSION")
    );

    match args.command {
        Command::Serve { .. } => serve(config).await,
        Command::Chat { docs, .. } => chat(config, docs).await,
    }
}

// =============================================================================
// aula serve
// =============================================================================

async fn serve(config: AulaConfig) -> Result<(), Box<dyn std::error::Error>> {
    let knowledge = match config.server.knowledge_dir.as_deref() {
        Some(dir) => KnowledgeBase::load_dir(Path::new(dir)),
        None => KnowledgeBase::placeholder(),
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::from_config(config, knowledge)?;
    let configured = state.is_configured();
    let router = aula_api::create_router(state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind; is another instance running?");
            return Err(e.into());
        }
    };

    tracing::info!(addr = %addr, configured, "Answer endpoint listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}

// =============================================================================
// aula chat
// =============================================================================

async fn chat(config: AulaConfig, docs: Vec<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let endpoint = config.client.endpoint.clone();
    let http = reqwest::Client::new();
    let configured = endpoint_configured(&http, &endpoint).await;

    let client = Arc::new(AnswerStreamClient::with_client(http, endpoint));
    let session = if docs.is_empty() {
        ChatSession::preloaded(client)
    } else {
        ChatSession::upload(client)
    }
    .with_conversational(config.client.conversational);

    let mut stdout = std::io::stdout();
    if session.screen(configured) == Screen::SetupNeeded {
        terminal::write_setup_needed(&mut stdout)?;
        return Ok(());
    }

    let (rendered_tx, mut rendered) = watch::channel(0u64);
    let renderer = tokio::spawn(render_loop(Arc::clone(session.store()), rendered_tx));

    writeln!(stdout, "{}", terminal::HELP)?;
    if !docs.is_empty() {
        load_documents(&session, &docs).await;
    }
    show_uploader_if_needed(&session, configured)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line.split_whitespace().next() {
            Some("/quit") | Some("/exit") => break,
            Some("/clear") => {
                session.clear_chat()?;
            }
            Some("/reset") => {
                session.reset()?;
            }
            Some("/upload") => {
                let paths: Vec<PathBuf> = line.split_whitespace().skip(1).map(PathBuf::from).collect();
                load_documents(&session, &paths).await;
            }
            _ if session.screen(configured) == Screen::Uploader => {}
            _ => {
                session.submit(line).await?;
            }
        }

        // Let the renderer catch up before taking the next line.
        let revision = session.store().snapshot()?.revision;
        let _ = rendered.wait_for(|r| *r >= revision).await;
        show_uploader_if_needed(&session, configured)?;
    }

    renderer.abort();
    Ok(())
}

/// Ask the endpoint whether it has a model credential. An unreachable
/// endpoint counts as configured; the failure then shows up in the chat.
async fn endpoint_configured(http: &reqwest::Client, endpoint: &str) -> bool {
    let health_url = match reqwest::Url::parse(endpoint).and_then(|u| u.join("/health")) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(endpoint = %endpoint, error = %e, "Invalid endpoint URL");
            return true;
        }
    };
    match http.get(health_url.clone()).send().await {
        Ok(response) => match response.json::<HealthResponse>().await {
            Ok(health) => health.configured,
            Err(e) => {
                tracing::warn!(url = %health_url, error = %e, "Unexpected health response");
                true
            }
        },
        Err(e) => {
            tracing::warn!(url = %health_url, error = %e, "Endpoint health check failed");
            true
        }
    }
}

async fn load_documents(session: &ChatSession, paths: &[PathBuf]) {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        match UploadedFile::from_path(path).await {
            Ok(file) => files.push(file),
            Err(e) => {
                println!("{}: {}", path.display(), e);
                return;
            }
        }
    }
    println!("{}", terminal::PROCESSING);
    // Failures are recorded on the session and shown by the uploader screen.
    if let Err(e) = session.load_documents(files).await {
        tracing::debug!(error = %e, "Upload rejected");
    }
}

fn show_uploader_if_needed(session: &ChatSession, configured: bool) -> Result<(), AssistError> {
    if session.screen(configured) != Screen::Uploader {
        return Ok(());
    }
    if let Some(error) = session.last_error()? {
        println!("{}", error);
    }
    println!("{}", terminal::UPLOAD_PROMPT);
    Ok(())
}

/// Print every published snapshot; report the rendered revision.
async fn render_loop(store: Arc<ConversationStore>, rendered: watch::Sender<u64>) {
    let mut updates = store.subscribe();
    let mut renderer = TerminalRenderer::new();
    let mut stdout = std::io::stdout();

    if let Ok(snapshot) = store.snapshot() {
        let _ = renderer.render(&snapshot, &mut stdout);
        rendered.send_replace(renderer.last_revision());
    }

    loop {
        let snapshot = match updates.recv().await {
            Ok(snapshot) => snapshot,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Renderer lagged; redrawing from latest state");
                match store.snapshot() {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        tracing::error!(error = %e, "Cannot read conversation");
                        break;
                    }
                }
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        if let Err(e) = renderer.render(&snapshot, &mut stdout) {
            tracing::error!(error = %e, "Terminal write failed");
            break;
        }
        rendered.send_replace(renderer.last_revision());
    }
}
