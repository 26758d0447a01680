use crate::config::Config;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// One directory scheduled for analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryTask {
    pub path: PathBuf,
    /// Path relative to the analysis root, `.` for the root itself.
    pub display_name: String,
}

impl DirectoryTask {
    pub fn new(path: PathBuf, root: &Path) -> Self {
        let display_name = match path.strip_prefix(root) {
            Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
            Ok(rel) => rel.to_string_lossy().to_string(),
            Err(_) => path.to_string_lossy().to_string(),
        };
        Self { path, display_name }
    }
}

#[derive(Debug, Clone)]
pub struct FileDiscovery {
    skip_dirs: Vec<String>,
    excluded_path_fragment: String,
    file_extensions: Vec<String>,
}

impl FileDiscovery {
    pub fn new(config: &Config) -> Self {
        Self {
            skip_dirs: config.skip_dirs.clone(),
            excluded_path_fragment: config.excluded_path_fragment.clone(),
            file_extensions: config
                .file_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    /// Every directory under `root` (root included) that survives both exclusion checks.
    ///
    /// Unreadable entries are logged and skipped rather than aborting the walk.
    pub fn discover_directories(&self, root: &Path) -> Vec<DirectoryTask> {
        let mut tasks = Vec::new();

        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_dir() {
                continue;
            }

            let path = entry.path();
            if self.is_excluded_path(path) || self.should_skip_directory(path) {
                continue;
            }

            tasks.push(DirectoryTask::new(path.to_path_buf(), root));
        }

        tasks
    }

    /// Literal substring match against the whole path, not just the basename.
    pub fn is_excluded_path(&self, path: &Path) -> bool {
        !self.excluded_path_fragment.is_empty()
            && path
                .to_string_lossy()
                .contains(self.excluded_path_fragment.as_str())
    }

    pub fn should_skip_directory(&self, dir: &Path) -> bool {
        dir.file_name()
            .map(|name| {
                let name = name.to_string_lossy();
                self.skip_dirs.iter().any(|skip| *skip == name)
            })
            .unwrap_or(false)
    }

    pub fn should_analyze_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let ext = ext.to_lowercase();
                self.file_extensions.contains(&ext)
            })
            .unwrap_or(false)
    }

    /// Direct-child files of `dir` with an analyzable extension, sorted by name.
    pub fn eligible_files(&self, dir: &Path) -> crate::Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && self.should_analyze_file(&path) {
                files.push(path);
            }
        }

        files.sort();
        Ok(files)
    }
}
