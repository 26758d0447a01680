use crate::{
    analyzer::{DirectoryAnalyzer, DirectoryOutcome},
    config::Config,
    file_discovery::FileDiscovery,
    llm::AnalysisClient,
};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub directories: usize,
    pub written: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: &DirectoryOutcome) {
        match outcome {
            DirectoryOutcome::Written(_) => self.written += 1,
            DirectoryOutcome::Failed { .. } => self.failed += 1,
            DirectoryOutcome::Skipped(_) => self.skipped += 1,
        }
    }

    pub fn print_summary(&self) {
        println!("\n📊 Analysis Summary");
        println!("===================");
        println!("  Directories scanned: {}", self.directories);
        println!("  Reports written:     {}", self.written);
        println!("  Failed:              {}", self.failed);
        println!("  Skipped:             {}", self.skipped);
    }
}

pub struct Orchestrator {
    root: PathBuf,
    discovery: FileDiscovery,
    analyzer: Arc<DirectoryAnalyzer>,
    max_concurrent: usize,
}

impl Orchestrator {
    pub fn new(config: Config) -> Result<Self> {
        let client = AnalysisClient::new(&config)?;
        Ok(Self {
            root: config.target_directory.clone(),
            discovery: FileDiscovery::new(&config),
            analyzer: Arc::new(DirectoryAnalyzer::new(&config, client)),
            max_concurrent: config.analysis.max_concurrent_requests.max(1),
        })
    }

    /// Analyze every directory under the target directory, at most `max_concurrent` at a time.
    ///
    /// A failing directory never affects its siblings; failures only show up in the summary.
    pub async fn run(&self) -> Result<RunSummary> {
        let tasks = self.discovery.discover_directories(&self.root);
        info!("Found {} directories to analyze", tasks.len());

        let mut summary = RunSummary {
            directories: tasks.len(),
            ..RunSummary::default()
        };

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut set = JoinSet::new();

        for task in tasks {
            let sem = semaphore.clone();
            let analyzer = self.analyzer.clone();
            set.spawn(async move {
                let _permit = sem
                    .acquire_owned()
                    .await
                    .context("Concurrency limiter closed")?;
                let outcome = analyzer.analyze_directory(&task).await;
                outcome.with_context(|| format!("Analysis of {} failed", task.display_name))
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(outcome)) => summary.record(&outcome),
                Ok(Err(e)) => {
                    error!("{:#}", e);
                    summary.failed += 1;
                }
                Err(e) => {
                    error!("Directory task aborted: {}", e);
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }
}
