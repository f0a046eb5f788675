//! File discovery under the active prefix.

use std::collections::HashSet;

use snowdrift_core::emit;
use snowdrift_core::metrics::events::FilesDiscovered;
use snowdrift_core::{StorageError, StorageProvider};
use tracing::{debug, info};

/// A discovered object. Created by discovery and passed unchanged to every
/// later stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileRef {
    pub bucket: String,
    pub key: String,
    /// Lower-cased extension without the dot.
    pub extension: String,
}

impl FileRef {
    /// Build a reference for `key`, or `None` for directory markers and keys
    /// without an extension.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Option<Self> {
        let key = key.into();
        let extension = extension_of(&key)?;
        Some(Self {
            bucket: bucket.into(),
            key,
            extension,
        })
    }

    /// Basename of the key.
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }

    /// Basename without its final extension.
    pub fn stem(&self) -> &str {
        let name = self.file_name();
        match name.rfind('.') {
            Some(pos) if pos > 0 => &name[..pos],
            _ => name,
        }
    }

    /// Path below `prefix`, as the stage sees it. Keys outside the prefix
    /// are returned whole.
    pub fn relative_to(&self, prefix: &str) -> &str {
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            return &self.key;
        }
        self.key
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(&self.key)
    }
}

/// Lower-cased extension of a key's basename, if it has one.
pub fn extension_of(key: &str) -> Option<String> {
    if key.ends_with('/') {
        return None;
    }
    let name = key.rsplit('/').next()?;
    match name.rfind('.') {
        Some(pos) if pos > 0 && pos + 1 < name.len() => Some(name[pos + 1..].to_ascii_lowercase()),
        _ => None,
    }
}

/// List files under `prefix` whose extension is in `extensions`, sorted by
/// key. Extensions are compared case-insensitively, with or without a dot.
pub async fn discover_files(
    storage: &StorageProvider,
    prefix: &str,
    extensions: &[String],
) -> Result<Vec<FileRef>, StorageError> {
    let allowed: HashSet<String> = extensions
        .iter()
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .collect();

    let keys = storage.list(prefix).await?;
    let listed = keys.len();

    let files: Vec<FileRef> = keys
        .into_iter()
        .filter_map(|key| FileRef::new(storage.bucket(), key))
        .filter(|file| allowed.contains(&file.extension))
        .collect();

    debug!(prefix, listed, matched = files.len(), "Filtered listing by extension");
    emit!(FilesDiscovered {
        count: files.len() as u64,
    });

    if files.is_empty() {
        info!(prefix, "No files found");
    } else {
        let keys: Vec<&str> = files.iter().map(|file| file.key.as_str()).collect();
        info!(prefix, count = files.len(), files = ?keys, "Discovered files");
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_ref_parts() {
        let file = FileRef::new("landing", "raw_data/2024/Orders.CSV").unwrap();
        assert_eq!(file.extension, "csv");
        assert_eq!(file.file_name(), "Orders.CSV");
        assert_eq!(file.stem(), "Orders");
        assert_eq!(file.relative_to("raw_data"), "2024/Orders.CSV");
        assert_eq!(file.relative_to("raw_data/"), "2024/Orders.CSV");
        assert_eq!(file.relative_to("raw"), "raw_data/2024/Orders.CSV");
        assert_eq!(file.relative_to(""), "raw_data/2024/Orders.CSV");
    }

    #[test]
    fn test_stem_keeps_inner_dots() {
        let file = FileRef::new("landing", "raw_data/sales.2024.csv").unwrap();
        assert_eq!(file.stem(), "sales.2024");
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("raw/a.csv").as_deref(), Some("csv"));
        assert_eq!(extension_of("raw/a.TXT").as_deref(), Some("txt"));
        assert_eq!(extension_of("raw/README"), None);
        assert_eq!(extension_of("raw/.hidden"), None);
        assert_eq!(extension_of("raw/trailing."), None);
        assert_eq!(extension_of("raw/dir.csv/"), None);
    }

    #[tokio::test]
    async fn test_discover_filters_and_sorts() {
        let storage = StorageProvider::in_memory("landing");
        for key in [
            "raw_data/b.csv",
            "raw_data/a.CSV",
            "raw_data/notes.md",
            "raw_data/nested/c.txt",
            "raw_data/noext",
            "archive/old.csv",
        ] {
            storage.put(key, "id\n1\n").await.unwrap();
        }

        let extensions = vec![".csv".to_string(), "TXT".to_string()];
        let files = discover_files(&storage, "raw_data", &extensions).await.unwrap();
        let keys: Vec<&str> = files.iter().map(|f| f.key.as_str()).collect();

        assert_eq!(
            keys,
            vec!["raw_data/a.CSV", "raw_data/b.csv", "raw_data/nested/c.txt"]
        );
        assert!(files.iter().all(|f| f.bucket == "landing"));
    }

    #[tokio::test]
    async fn test_discover_empty_prefix_is_ok() {
        let storage = StorageProvider::in_memory("landing");
        let files = discover_files(&storage, "raw_data", &["csv".to_string()])
            .await
            .unwrap();
        assert!(files.is_empty());
    }
}
