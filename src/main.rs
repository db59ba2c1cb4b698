use ad_insights::config::PipelineConfig;
use ad_insights::llm::{select_backend, GenerativeBackend, OfflineBackend};
use ad_insights::report;
use ad_insights::runner::PipelineRunner;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ad-insights")]
#[command(about = "Agentic Facebook Ads performance analysis")]
struct Args {
    /// What to analyse, in natural language
    #[arg(default_value = "Analyze ad performance and generate insights.")]
    query: String,

    /// Path to the pipeline configuration
    #[arg(short, long, default_value = "config/config.json")]
    config: PathBuf,

    /// Where to write insights.json, creatives.json and report.md
    /// (default: reports.dir from the configuration)
    #[arg(short, long)]
    reports_dir: Option<PathBuf>,

    /// OpenAI API key (or set OPENAI_API_KEY env var)
    #[arg(long)]
    api_key: Option<String>,

    /// Model name (or set OPENAI_MODEL env var)
    #[arg(long)]
    model: Option<String>,

    /// Use the deterministic offline backend even if an API key is set
    #[arg(long)]
    offline: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    info!("Ad insights pipeline starting...");
    info!("Query: {}", args.query);

    let mut config = PipelineConfig::load(&args.config)?;
    config.apply_env();
    if let Some(model) = args.model {
        config.llm.model = model;
    }

    let backend: Arc<dyn GenerativeBackend> = if args.offline {
        Arc::new(OfflineBackend::new())
    } else {
        let api_key = args.api_key.or_else(|| std::env::var("OPENAI_API_KEY").ok());
        select_backend(&config.llm, api_key)
    };

    let reports_dir = args.reports_dir.unwrap_or_else(|| config.reports.dir.clone());
    let runner = PipelineRunner::new(config, backend)?;
    let bundle = runner.run(&args.query).await?;
    let written = report::save(&bundle, &reports_dir)?;

    println!("\n=== Pipeline Results ===");
    println!(
        "Hypotheses: {}",
        bundle.hypotheses.as_ref().map_or(0, Vec::len)
    );
    println!(
        "Evaluated insights: {}",
        bundle.evaluated.as_ref().map_or(0, Vec::len)
    );
    println!(
        "Creative ideas: {}",
        bundle.creatives.as_ref().map_or(0, Vec::len)
    );
    for path in written {
        println!("Wrote {}", path.display());
    }
    if let Some(log) = runner.audit().log_file() {
        println!("Audit log: {}", log.display());
    }

    Ok(())
}
