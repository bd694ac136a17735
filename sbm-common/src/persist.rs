//! Whole-document persistence helpers
//!
//! Every persisted state document (queue state, download history, song
//! creation history) is rewritten in full on each mutation. Writes go to a
//! sibling `.tmp` file which is flushed and then renamed over the target, so a
//! process killed mid-write leaves either the old or the new document, never a
//! torn one.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Path of the staging file used while writing `target`
pub fn temp_path_for(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    target.with_file_name(name)
}

/// Write raw bytes to `target` atomically (temp file + rename)
pub fn write_bytes_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp_path = temp_path_for(target);
    let write_result = (|| -> Result<()> {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(())
    })();

    if let Err(e) = write_result {
        // Leave no stale staging file behind
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    if let Err(e) = fs::rename(&temp_path, target) {
        let _ = fs::remove_file(&temp_path);
        return Err(Error::Io(e));
    }

    debug!(path = %target.display(), bytes = bytes.len(), "Document written");
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically
pub fn write_json_atomic<T: Serialize + ?Sized>(target: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_bytes_atomic(target, &bytes)
}

/// Load a JSON document, or the default value if the file does not exist yet
///
/// A file that exists but cannot be parsed is an error: silently replacing it
/// with a default would overwrite the user's data on the next save.
pub fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        debug!(path = %path.display(), "Document missing, starting empty");
        return Ok(T::default());
    }

    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        warn!(path = %path.display(), "Document is empty, starting empty");
        return Ok(T::default());
    }

    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!(
            "Malformed document {}: {}",
            path.display(),
            e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
    struct Doc {
        name: String,
        items: Vec<u32>,
    }

    #[test]
    fn test_temp_path_is_sibling() {
        let target = Path::new("/data/queue_state.json");
        assert_eq!(temp_path_for(target), PathBuf::from("/data/queue_state.json.tmp"));
    }

    #[test]
    fn test_write_then_read_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("doc.json");
        let doc = Doc {
            name: "queue".to_string(),
            items: vec![1, 2, 3],
        };

        write_json_atomic(&path, &doc).unwrap();

        let loaded: Doc = read_json_or_default(&path).unwrap();
        assert_eq!(loaded, doc);
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn test_missing_file_yields_default() {
        let dir = TempDir::new().unwrap();
        let loaded: Doc = read_json_or_default(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded, Doc::default());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        let result: Result<Doc> = read_json_or_default(&path);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_write_fails_when_parent_is_a_file() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "x").unwrap();

        let result = write_json_atomic(&blocker.join("doc.json"), &Doc::default());
        assert!(result.is_err());
    }
}
