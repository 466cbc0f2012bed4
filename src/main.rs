use anyhow::{Context, Result};
use biz_analyst::config::AnalystConfig;
use biz_analyst::data_assistant::{DataAssistant, Explanation, Outcome, EXAMPLE_QUESTIONS};
use biz_analyst::llm::ChatCompletionClient;
use biz_analyst::tables::{preview_dataset, CanonicalTables, Dataset};
use clap::{Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "biz-analyst")]
#[command(about = "Answer business questions about sales, discount, marketing and tax data")]
struct Args {
    /// Path to the directory holding the CSV datasets (default: ./data)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Optional JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Model identifier (overrides config and ANALYST_LLM_MODEL)
    #[arg(long, global = true)]
    model: Option<String>,

    /// Groq API key (or set GROQ_API_KEY env var)
    #[arg(long, global = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a business question in natural language
    Ask {
        question: String,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the shape and first rows of a dataset
    Preview {
        /// sales, coupons, marketing, tax or customers
        dataset: Dataset,

        #[arg(short, long, default_value_t = 20)]
        rows: usize,
    },
    /// List example questions
    Examples,
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = AnalystConfig::load(args.config.as_deref())?;
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    if let Some(model) = args.model {
        config.model = model;
    }
    if let Some(key) = args.api_key {
        config.api_key = Some(key);
    }
    config.validate()?;

    // Process env is only written here, before the runtime spawns its workers.
    if let Some(rows) = polars_row_limit(std::env::var_os(POLARS_FMT_MAX_ROWS), config.display_rows) {
        std::env::set_var(POLARS_FMT_MAX_ROWS, rows);
    }

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?
        .block_on(run(args.command, config))
}

const POLARS_FMT_MAX_ROWS: &str = "POLARS_FMT_MAX_ROWS";

/// Row limit to export for polars table rendering; an explicit user setting wins.
fn polars_row_limit(current: Option<OsString>, display_rows: usize) -> Option<String> {
    match current {
        Some(_) => None,
        None => Some(display_rows.to_string()),
    }
}

async fn run(command: Command, config: AnalystConfig) -> Result<()> {
    match command {
        Command::Examples => {
            println!("Example questions you can ask:");
            for (i, question) in EXAMPLE_QUESTIONS.iter().enumerate() {
                println!("{:>2}. {}", i + 1, question);
            }
        }
        Command::Preview { dataset, rows } => {
            let preview = preview_dataset(&config.data_dir, dataset, rows)?;
            println!("{}", preview);
        }
        Command::Ask { question, json } => {
            let tables = CanonicalTables::load(&config.data_dir)
                .with_context(|| format!("Failed to load datasets from {}", config.data_dir.display()))?;
            let client = Arc::new(ChatCompletionClient::from_config(&config)?);
            let assistant = DataAssistant::new(&tables, client, &config)?;
            info!("Assistant ready ({} enriched rows)", assistant.table().len());

            let response = assistant.answer(&question).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
                return Ok(());
            }

            println!("\n=== Intent: {} ===", response.intent);
            match &response.outcome {
                Outcome::NotUnderstood => {
                    println!("I couldn't clearly understand this question. Try one of:");
                    for question in EXAMPLE_QUESTIONS.iter().take(3) {
                        println!("  - {}", question);
                    }
                }
                Outcome::Analysed {
                    result,
                    preview,
                    explanation,
                } => {
                    println!("\n=== Analysis Preview ===");
                    println!("{}", result.head_frame(config.display_rows)?);
                    println!(
                        "\n=== Explanation (based on {} of {} rows) ===",
                        preview.rows_shown(),
                        preview.total_rows()
                    );
                    match explanation {
                        Explanation::Generated(text) => println!("{}", text),
                        Explanation::Unavailable(reason) => {
                            println!("(explanation unavailable: {})", reason)
                        }
                    }
                }
            }
        }
    }

    Ok(())
}
