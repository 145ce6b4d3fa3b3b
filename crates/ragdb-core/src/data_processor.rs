//! Loads plain-text documents from a directory tree for ingest.
//!
//! Each file becomes one `SourceDocument` with `path`, `title` (file stem)
//! and `category` (parent directory relative to the root) metadata.
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::Result;
use crate::types::Meta;

const EXTENSIONS: &[&str] = &["txt", "md"];

#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    pub text: String,
    pub metadata: Meta,
}

#[derive(Default)]
pub struct DataProcessor;

impl DataProcessor {
    pub fn new() -> Self { Self }

    pub fn process_directory(&self, data_dir: &Path) -> Result<Vec<SourceDocument>> {
        self.load(data_dir, None)
    }

    pub fn process_directory_limited(&self, data_dir: &Path, limit: usize) -> Result<Vec<SourceDocument>> {
        self.load(data_dir, Some(limit))
    }

    fn load(&self, data_dir: &Path, limit: Option<usize>) -> Result<Vec<SourceDocument>> {
        let mut files = self.list_text_files(data_dir);
        if files.is_empty() {
            info!(dir = %data_dir.display(), "no text files found");
            return Ok(vec![]);
        }
        if let Some(limit) = limit {
            if files.len() > limit {
                files.truncate(limit);
                info!(limit, "limited to first files");
            }
        }
        let mut docs = Vec::with_capacity(files.len());
        for (file_index, file_path) in files.iter().enumerate() {
            debug!(n = file_index + 1, total = files.len(), path = %file_path.display(), "reading file");
            let text = self.read_file_content(file_path)?;
            if text.trim().is_empty() {
                debug!(path = %file_path.display(), "skipping empty file");
                continue;
            }
            let mut metadata = Meta::new();
            metadata.insert("path".to_string(), file_path.to_string_lossy().to_string());
            metadata.insert("title".to_string(), self.extract_title(file_path));
            metadata.insert("category".to_string(), self.get_facet_from_path(file_path, data_dir));
            docs.push(SourceDocument { text, metadata });
        }
        info!(files = files.len(), documents = docs.len(), "loaded directory");
        Ok(docs)
    }

    fn read_file_content(&self, file_path: &Path) -> Result<String> {
        match fs::read_to_string(file_path) {
            Ok(content) => Ok(content),
            Err(_) => Ok(String::from_utf8_lossy(&fs::read(file_path)?).to_string()),
        }
    }

    fn extract_title(&self, file_path: &Path) -> String {
        file_path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default()
    }

    fn get_facet_from_path(&self, file_path: &Path, data_dir: &Path) -> String {
        let relative_path = file_path.strip_prefix(data_dir).unwrap_or(file_path);
        match relative_path.parent().and_then(|p| p.to_str()) {
            Some(facet) if !facet.is_empty() => facet.to_string(),
            _ => "misc".to_string(),
        }
    }

    fn list_text_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().to_path_buf())
            .filter(|p| p.extension().and_then(|s| s.to_str()).is_some_and(|ext| EXTENSIONS.contains(&ext)))
            .collect();
        files.sort();
        files
    }
}
