use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    PlainText,
    Pdf,
}

impl DocumentFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "txt" | "md" => Some(Self::PlainText),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    pub fn from_filename(name: &str) -> Option<Self> {
        Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

/// Every supported document under `dir`, sorted by path so runs are repeatable.
pub fn walk_directory(dir: &Path) -> Vec<(PathBuf, DocumentFormat)> {
    let mut files: Vec<(PathBuf, DocumentFormat)> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let path = entry.into_path();
            let format = DocumentFormat::from_extension(path.extension()?.to_str()?)?;
            Some((path, format))
        })
        .collect();
    files.sort_by(|a, b| a.0.cmp(&b.0));
    files
}
