pub mod config;
pub mod file_discovery;
pub mod content;
pub mod validator;
pub mod llm;
pub mod analyzer;
pub mod orchestrator;

pub use config::Config;
pub use file_discovery::{DirectoryTask, FileDiscovery};
pub use llm::{AnalysisClient, AnalysisError};
pub use analyzer::{DirectoryAnalyzer, DirectoryOutcome};
pub use orchestrator::{Orchestrator, RunSummary};

pub type Result<T> = anyhow::Result<T>;
