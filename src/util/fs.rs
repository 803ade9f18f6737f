use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Writes `content` to `path` through a temporary sibling file and a rename,
/// so readers see either the old file or the complete new one.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    // SEC-009: unpredictable temp name, created exclusively
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let temp_path = path.with_extension(format!("tmp.{:016x}", suffix));

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)
        .with_context(|| {
            format!(
                "Failed to create temporary file '{}': check directory permissions",
                temp_path.display()
            )
        })?;

    let written = file
        .write_all(content)
        .and_then(|()| file.sync_all())
        .with_context(|| format!("Failed to write temporary file '{}'", temp_path.display()));
    drop(file);

    written
        .and_then(|()| {
            std::fs::rename(&temp_path, path).with_context(|| {
                format!(
                    "Failed to rename '{}' to '{}'",
                    temp_path.display(),
                    path.display()
                )
            })
        })
        .inspect_err(|_| {
            let _ = std::fs::remove_file(&temp_path);
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("feedmill_fs_{}_{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_write_atomic_replaces_file() {
        let dir = temp_dir("replace");
        let path = dir.join("subs.opml");
        std::fs::write(&path, "old").unwrap();

        write_atomic(&path, b"new contents").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new contents");
        let leftovers: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_write_atomic_missing_directory_fails() {
        let path = std::env::temp_dir()
            .join("feedmill_fs_does_not_exist")
            .join("nested")
            .join("out.opml");
        let err = write_atomic(&path, b"x").unwrap_err();
        assert!(err.to_string().contains("Failed to create temporary file"));
    }
}
