use clap::Parser;
use project_analyzer::{Config, Orchestrator};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "project-analyzer")]
#[command(about = "Writes an LLM-generated analysis report into every source directory of a project")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Project directory to analyze
    #[arg(default_value = ".")]
    path: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load()?;
    config.require_api_key()?;

    let target_path = std::path::absolute(&cli.path)?;
    if !target_path.is_dir() {
        eprintln!("❌ Error: {} is not a valid directory", target_path.display());
        return Ok(());
    }
    config.target_directory = target_path.clone();

    println!("🚀 Starting directory analysis: {}", target_path.display());
    let start_time = Instant::now();

    let orchestrator = Orchestrator::new(config)?;
    let summary = orchestrator.run().await?;

    summary.print_summary();
    println!(
        "\n✅ All directories analyzed in {:.2}s",
        start_time.elapsed().as_secs_f64()
    );

    Ok(())
}
