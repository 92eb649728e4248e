//! Input file discovery
//!
//! Walks the input tree for files matching the configured pattern and tags
//! each with its telemetry category. The expected layout is
//!
//! ```text
//! input/
//!   bms/
//!     EV6/
//!       device_01.csv
//!   gps/
//!     EV6/
//!       device_01.csv
//! ```
//!
//! but a category marker in the file name (`aicar_bms_2212.csv`) works too.

use crate::error::{PreprocessError, Result};
use crate::models::Category;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// One file found under the input root
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    /// Path relative to the input root
    pub relative: PathBuf,
    pub category: Option<Category>,
}

impl DiscoveredFile {
    /// Checkpoint key for this file
    ///
    /// `<category>_<basename>`; when two files of one category share a
    /// basename the relative path replaces it, so their keys stay distinct.
    pub fn checkpoint_key(&self, basename_collides: bool) -> Option<String> {
        let category = self.category?;
        if basename_collides {
            Some(category.key_for(&self.relative.to_string_lossy().replace('\\', "/")))
        } else {
            Some(category.file_key(&self.path))
        }
    }
}

/// File discovery over an input directory
#[derive(Debug)]
pub struct FileDiscovery {
    input_path: PathBuf,
    pattern: glob::Pattern,
    excluded: Vec<PathBuf>,
}

impl FileDiscovery {
    pub fn new(input_path: PathBuf, pattern: &str) -> Result<Self> {
        let pattern = glob::Pattern::new(pattern).map_err(|e| PreprocessError::Configuration {
            message: format!("invalid file pattern '{}': {}", pattern, e),
        })?;
        Ok(Self {
            input_path,
            pattern,
            excluded: Vec::new(),
        })
    }

    /// Skip everything under `path` (e.g. an output directory inside the input)
    pub fn exclude(mut self, path: PathBuf) -> Self {
        self.excluded.push(path);
        self
    }

    /// Discover matching files, sorted by path
    pub fn discover(&self) -> Result<Vec<DiscoveredFile>> {
        if !self.input_path.is_dir() {
            return Err(PreprocessError::InputNotFound {
                path: self.input_path.clone(),
            });
        }

        debug!("Searching for files in: {}", self.input_path.display());

        let mut files = Vec::new();
        let walker = WalkDir::new(&self.input_path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !self.excluded.iter().any(|ex| entry.path().starts_with(ex)));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable directory entry: {}", e);
                    continue;
                }
            };
            if entry.file_type().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if !self.pattern.matches(&name) {
                continue;
            }

            let path = entry.path().to_path_buf();
            let relative = path
                .strip_prefix(&self.input_path)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| PathBuf::from(entry.file_name()));
            let category = Category::from_path(&relative);
            files.push(DiscoveredFile {
                path,
                relative,
                category,
            });
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        debug!("Found {} files", files.len());
        Ok(files)
    }
}

/// Basenames that occur more than once within a category
pub fn colliding_basenames(files: &[DiscoveredFile]) -> HashMap<(Category, String), usize> {
    let mut counts: HashMap<(Category, String), usize> = HashMap::new();
    for file in files {
        if let (Some(category), Some(name)) = (file.category, file.path.file_name()) {
            *counts
                .entry((category, name.to_string_lossy().to_string()))
                .or_default() += 1;
        }
    }
    counts.retain(|_, count| *count > 1);
    counts
}
