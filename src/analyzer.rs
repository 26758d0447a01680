use crate::{
    config::{AnalysisConfig, Config},
    content::{load_file, truncate_content, Bundle},
    file_discovery::{DirectoryTask, FileDiscovery},
    llm::{AnalysisClient, AnalysisError},
    validator::{missing_sections, verify_report},
};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

pub const REPORT_FILE_PREFIX: &str = "directory_analysis_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    SkipListed,
    NoEligibleFiles,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryOutcome {
    Written(PathBuf),
    /// No valid report after `attempts` calls to the model.
    Failed { attempts: u32 },
    Skipped(SkipReason),
}

pub struct DirectoryAnalyzer {
    discovery: FileDiscovery,
    client: AnalysisClient,
    retry: AnalysisConfig,
}

impl DirectoryAnalyzer {
    pub fn new(config: &Config, client: AnalysisClient) -> Self {
        Self {
            discovery: FileDiscovery::new(config),
            client,
            retry: config.analysis.clone(),
        }
    }

    /// Load every eligible direct-child file of the task's directory.
    ///
    /// Returns `None` when the directory has nothing to analyze.
    pub fn collect_bundle(&self, task: &DirectoryTask) -> Result<Option<Bundle>> {
        let files = self
            .discovery
            .eligible_files(&task.path)
            .with_context(|| format!("Failed to list {}", task.path.display()))?;

        let mut bundle = Bundle::new();
        for file_path in &files {
            let rel_path = file_path
                .strip_prefix(&task.path)
                .unwrap_or(file_path)
                .to_string_lossy()
                .to_string();
            debug!(directory = %task.display_name, "Reading {}", rel_path);
            bundle.push(rel_path, load_file(file_path));
        }

        if bundle.is_empty() {
            return Ok(None);
        }

        info!(directory = %task.display_name, "Found {} files", bundle.len());
        Ok(Some(bundle))
    }

    pub async fn analyze_directory(&self, task: &DirectoryTask) -> Result<DirectoryOutcome> {
        if self.discovery.should_skip_directory(&task.path) {
            info!(directory = %task.display_name, "Skipping excluded directory");
            return Ok(DirectoryOutcome::Skipped(SkipReason::SkipListed));
        }

        let bundle = match self.collect_bundle(task)? {
            Some(bundle) => bundle,
            None => return Ok(DirectoryOutcome::Skipped(SkipReason::NoEligibleFiles)),
        };

        let content = truncate_content(&bundle.render(), self.retry.max_content_length);

        info!(directory = %task.display_name, "Sending to the model for analysis");
        let mut report = self.client.analyze(&content, &task.display_name).await;
        let mut attempts: u32 = 1;

        // Independent of the client's own transport retries.
        let mut retry_count: u32 = 0;
        while retry_count < self.retry.max_retries {
            match &report {
                Ok(text) if verify_report(text) => {
                    let output_file = write_report(&task.path, text, Local::now())?;
                    info!(
                        directory = %task.display_name,
                        "Report saved to {}",
                        output_file.display()
                    );
                    return Ok(DirectoryOutcome::Written(output_file));
                }
                Ok(text) => log_rejection(task, None, text),
                Err(e) => log_rejection(task, Some(e), ""),
            }

            retry_count += 1;
            if retry_count < self.retry.max_retries {
                warn!(
                    directory = %task.display_name,
                    "Analysis result invalid, retry {}",
                    retry_count
                );
                tokio::time::sleep(self.retry.backoff(retry_count)).await;
                report = self.client.analyze(&content, &task.display_name).await;
                attempts += 1;
            }
        }

        error!(
            directory = %task.display_name,
            "Analysis still invalid after {} attempts",
            attempts
        );
        Ok(DirectoryOutcome::Failed { attempts })
    }
}

fn log_rejection(task: &DirectoryTask, err: Option<&AnalysisError>, text: &str) {
    match err {
        Some(e) => warn!(
            directory = %task.display_name,
            transient = e.is_retryable(),
            "Analysis failed: {}",
            e
        ),
        None => warn!(
            directory = %task.display_name,
            chars = text.trim().chars().count(),
            missing = ?missing_sections(text),
            "Report rejected by validation"
        ),
    }
}

pub fn report_file_name(timestamp: DateTime<Local>) -> String {
    format!("{}{}.md", REPORT_FILE_PREFIX, timestamp.format("%Y%m%d_%H%M%S"))
}

/// Write the accepted report into the analyzed directory itself. Earlier reports are kept.
pub fn write_report(dir: &Path, report: &str, timestamp: DateTime<Local>) -> Result<PathBuf> {
    let output_file = dir.join(report_file_name(timestamp));
    fs::write(&output_file, report)
        .with_context(|| format!("Failed to write {}", output_file.display()))?;
    Ok(output_file)
}
