use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use research_pipeline_lib::completion::HttpCompletionClient;
use research_pipeline_lib::config::{load_credential, ConfigLoader, PipelineConfig};
use research_pipeline_lib::models::{CreateJobRequest, ProgressEvent};
use research_pipeline_lib::poller::{HttpJobApi, JobPoller};
use research_pipeline_lib::server::{self, ServerAppState};
use research_pipeline_lib::shutdown::{register_signal_handlers, ShutdownState};

/// Research Pipeline - asynchronous research document generation
#[derive(Parser, Debug)]
#[command(name = "research-pipeline")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.research-pipeline/config.toml)
    #[arg(long, global = true, env = "RESEARCH_PIPELINE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server
    Serve {
        /// Port to bind the server to
        #[arg(long)]
        port: Option<u16>,

        /// Address to bind the server to
        #[arg(long)]
        bind: Option<String>,

        /// Completion provider preset (anthropic, openai, zai, minimax)
        #[arg(long)]
        provider: Option<String>,

        /// Model override for the completion provider
        #[arg(long)]
        model: Option<String>,
    },

    /// Create a research job on a running server and wait for the document
    Research {
        /// Server base URL
        #[arg(long, default_value = "http://127.0.0.1:3420", env = "RESEARCH_SERVER_URL")]
        server: String,

        /// Research topic
        #[arg(long)]
        topic: String,

        /// Additional context for the research
        #[arg(long)]
        context: Option<String>,

        /// Named entity (company, product) to look up specifically
        #[arg(long)]
        entity: Option<String>,

        /// Preferred reference, repeatable
        #[arg(long = "source")]
        sources: Vec<String>,

        /// Status checks before giving up (defaults to poller.max_attempts)
        #[arg(long)]
        max_attempts: Option<u32>,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<PipelineConfig> {
    let loader = match path {
        Some(path) => ConfigLoader::new().with_path(path),
        None => ConfigLoader::new(),
    };
    loader.load().context("Failed to load configuration")
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    let result = rt.block_on(async move {
        let config = load_config(cli.config.as_ref())?;
        match cli.command {
            Command::Serve {
                port,
                bind,
                provider,
                model,
            } => run_server_mode(config, port, bind, provider, model).await,
            Command::Research {
                server,
                topic,
                context,
                entity,
                sources,
                max_attempts,
            } => {
                let mut request = CreateJobRequest::new(topic);
                request.context = context;
                request.entity = entity;
                if !sources.is_empty() {
                    request.sources = Some(sources);
                }
                run_research(config, &server, request, max_attempts).await
            }
        }
    });

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run_server_mode(
    mut config: PipelineConfig,
    port: Option<u16>,
    bind: Option<String>,
    provider: Option<String>,
    model: Option<String>,
) -> Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    if let Some(provider) = provider {
        config.completion.provider = provider;
    }
    if model.is_some() {
        config.completion.model = model;
    }

    let shutdown_state = ShutdownState::new();
    if let Err(e) = register_signal_handlers(shutdown_state.clone()) {
        log::warn!("Failed to register signal handlers: {}", e);
    }

    // A missing credential is reported per job creation, not at startup
    let credential = load_credential(&config.completion.provider);
    let client = HttpCompletionClient::new(&config.completion, credential)?;

    let server_settings = config.server.clone();
    let state = ServerAppState::new(Arc::new(client), config, shutdown_state);

    // In-flight jobs are failed inside the server's shutdown signal
    server::run_server(state, &server_settings)
        .await
        .map_err(|e| anyhow!(e))
}

async fn run_research(
    config: PipelineConfig,
    server_url: &str,
    request: CreateJobRequest,
    max_attempts: Option<u32>,
) -> Result<()> {
    let api = HttpJobApi::new(server_url)?;

    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            eprintln!("[{:>3}%] {}", event.percent, event.message);
        }
    });

    let mut settings = config.poller.clone();
    if let Some(max_attempts) = max_attempts {
        settings.max_attempts = max_attempts;
    }
    let poller = JobPoller::new(Arc::new(api), settings).with_progress(tx);

    let outcome = poller.create_and_await(&request).await;
    drop(poller);
    let _ = printer.await;

    let document = outcome?;
    println!("{}", document);
    Ok(())
}
