use std::sync::Arc;

use agent_loop::{run_question, Protocol, SearchContext};
use clap::Parser;
use common::{
    llm::OpenAiCompletionModel,
    storage::db::SurrealDbClient,
    utils::{config::get_config, embedding::EmbeddingProvider},
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Answer a question about an entity's disclosure documents.
#[derive(Debug, Parser)]
#[command(name = "disclosure-navigator")]
struct Cli {
    /// The question to answer.
    #[arg(long)]
    question: String,

    /// Entity code hint appended to the question, e.g. "180101.SZ".
    #[arg(long)]
    entity_code: Option<String>,

    /// Prefer the expanded edition of the document.
    #[arg(long)]
    expanded: bool,

    /// Conversation round budget; defaults to the configured value.
    #[arg(long)]
    max_rounds: Option<usize>,

    /// Conversation protocol: "native" or "simulated".
    #[arg(long, default_value = "native")]
    protocol: Protocol,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let config = get_config()?;

    let db = SurrealDbClient::new(
        &config.surrealdb_address,
        &config.surrealdb_username,
        &config.surrealdb_password,
        &config.surrealdb_namespace,
        &config.surrealdb_database,
    )
    .await?;
    db.ensure_indexes(config.embedding_dimensions as usize)
        .await?;

    let openai_client = Arc::new(async_openai::Client::with_config(
        async_openai::config::OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url),
    ));
    let embedder = EmbeddingProvider::new_openai(
        openai_client.clone(),
        config.embedding_model.clone(),
        config.embedding_dimensions,
    );
    let model = Arc::new(OpenAiCompletionModel::new(
        openai_client,
        config.completion_model.clone(),
    ));

    info!(
        embedding_backend = embedder.backend_label(),
        embedding_dimension = embedder.dimension(),
        "resources initialized"
    );

    let ctx = SearchContext::new(db, embedder, model);
    let question = compose_question(&cli);
    let max_rounds = cli.max_rounds.unwrap_or(config.max_rounds as usize);

    let outcome = run_question(&ctx, &question, max_rounds, cli.protocol).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    Ok(())
}

fn compose_question(cli: &Cli) -> String {
    let mut question = cli.question.clone();
    if let Some(code) = &cli.entity_code {
        question.push_str(&format!("\n(entity code: {code})"));
    }
    if cli.expanded {
        question.push_str("\n(use the expanded edition of the document)");
    }
    question
}
