use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use talent_harvest::api::create_router;
use talent_harvest::api::models::GenerateQueryResponse;
use talent_harvest::config::CONFIG;
use talent_harvest::data_models::SearchRequest;
use talent_harvest::db::{CandidateRepo, CandidateStore, Database, MemoryCandidateStore};
use talent_harvest::oracle::AnthropicOracle;
use talent_harvest::pipeline::Pipeline;
use talent_harvest::query_generator::QueryGenerator;

#[derive(Parser)]
#[command(name = "talent-harvest", version, about = "Candidate sourcing and enrichment")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Listen address, overrides SERVER_ADDR
        #[arg(long)]
        addr: Option<String>,
    },
    /// Run one search and print every event as a JSON line
    Search {
        query: String,
        /// Also search GitHub and StackOverflow
        #[arg(long)]
        wide_net: bool,
        #[arg(long, default_value_t = 3)]
        max_pages: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
        /// Keep candidates in memory instead of MongoDB
        #[arg(long)]
        memory_store: bool,
    },
    /// Print the search queries generated for a request
    Dork { query: String },
}

async fn build_store(memory: bool) -> anyhow::Result<Arc<dyn CandidateStore>> {
    if memory {
        return Ok(Arc::new(MemoryCandidateStore::new()));
    }
    let db = Database::from_config().await?;
    let repo = CandidateRepo::new(&db);
    if let Err(e) = repo.ensure_indexes().await {
        log::warn!("could not ensure candidate indexes: {:#}", e);
    }
    Ok(Arc::new(repo))
}

async fn serve(addr: Option<String>) -> anyhow::Result<()> {
    let store = build_store(false).await?;
    let pipeline = Arc::new(Pipeline::from_config(&CONFIG, store)?);
    let addr = addr.unwrap_or_else(|| CONFIG.server_addr.clone());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    log::info!("listening on {}", addr);

    axum::serve(listener, create_router(pipeline))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("HTTP server failed")
}

async fn search(request: SearchRequest, memory_store: bool) -> anyhow::Result<()> {
    request.validate(CONFIG.pipeline.max_pages)?;

    let store = build_store(memory_store).await?;
    let pipeline = Arc::new(Pipeline::from_config(&CONFIG, store)?);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let mut events = pipeline.run(request, cancel);
    while let Some(event) = events.next().await {
        println!("{}", serde_json::to_string(&event)?);
    }
    Ok(())
}

async fn dork(query: &str) -> anyhow::Result<()> {
    let oracle = Arc::new(AnthropicOracle::from_config(&CONFIG)?);
    let queries = QueryGenerator::new(oracle).generate_queries(query).await?;
    let response = GenerateQueryResponse {
        dork: queries.first().cloned().unwrap_or_default(),
        queries,
    };
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber (handles both tracing and log crate)
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(true)
        .init();

    match Cli::parse().command {
        Command::Serve { addr } => serve(addr).await,
        Command::Search {
            query,
            wide_net,
            max_pages,
            offset,
            memory_store,
        } => {
            let request = SearchRequest {
                query,
                wide_net,
                max_pages,
                offset,
            };
            search(request, memory_store).await
        }
        Command::Dork { query } => dork(&query).await,
    }
}
