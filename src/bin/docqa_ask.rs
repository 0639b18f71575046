use anyhow::{Context, Result};
use clap::Parser;
use docqa::{
    config::Config,
    logging,
    qa::{QaSystem, QueryInput},
};

#[derive(Parser)]
#[command(
    name = "docqa-ask",
    about = "Answer questions about a PDF document and print the results as JSON"
)]
struct Cli {
    /// PDF path or http(s) URL. Overrides `DOCQA_SOURCE`.
    #[arg(long)]
    source: Option<String>,
    /// Print the corpus summary to stderr before answering.
    #[arg(long)]
    summary: bool,
    /// Questions to answer; several are answered concurrently and printed in order.
    #[arg(required = true)]
    questions: Vec<String>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing();
    let cli = Cli::parse();

    let config = Config::load().context("failed to load configuration")?;
    let source = cli
        .source
        .or_else(|| config.source.clone())
        .context("no document source; pass --source or set DOCQA_SOURCE")?;

    let system = QaSystem::from_config(&config, &source).context("failed to configure QA system")?;
    let summary = system
        .initialize()
        .await
        .with_context(|| format!("failed to ingest {source}"))?;
    if cli.summary {
        eprintln!(
            "{}",
            serde_json::to_string_pretty(&summary).context("failed to encode summary")?
        );
    }

    let mut questions = cli.questions;
    let input = if questions.len() == 1 {
        QueryInput::Single(questions.remove(0))
    } else {
        QueryInput::Batch(questions)
    };
    let output = system.answer(input).await.context("failed to answer")?;
    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("failed to encode answers")?
    );
    Ok(())
}
