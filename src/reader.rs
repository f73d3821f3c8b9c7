use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::model::LogFile;

/// Parses one completion log file. Malformed JSON is a defect in the input
/// data and aborts the run.
pub fn read_log_file(path: &Path) -> Result<LogFile> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let log: LogFile = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(log)
}

/// Every file under `root`, recursively, in directory-traversal order.
pub fn walk_files(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        bail!("not a directory: {}", root.display());
    }
    let mut files = Vec::new();
    collect_files(root, &mut files)?;
    Ok(files)
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;

    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?;

        if file_type.is_dir() {
            collect_files(&path, files)?;
        } else if file_type.is_file() {
            files.push(path);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    const SAMPLE_LOG: &str = r#"{
        "filePath": "src/Main.kt",
        "sessions": [
            {
                "id": "s-1",
                "expectedText": "foo",
                "_lookups": [
                    {
                        "popupLatency": 12.5,
                        "suggestions": [
                            {
                                "text": "foo",
                                "contributor": "A",
                                "contributorKind": "k1",
                                "createdLatency": 10,
                                "resultsetLatency": 11,
                                "indicatorLatency": 12,
                                "lookupLatency": 13,
                                "renderedLatency": 14
                            }
                        ]
                    }
                ]
            }
        ]
    }"#;

    #[test]
    fn parses_the_log_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        fs::write(&path, SAMPLE_LOG).unwrap();

        let log = read_log_file(&path).unwrap();
        assert_eq!(log.file_path, "src/Main.kt");
        assert_eq!(log.sessions.len(), 1);

        let session = &log.sessions[0];
        assert_eq!(session.id, "s-1");
        assert_eq!(session.expected_text, "foo");
        assert_eq!(session.lookups.len(), 1);
        assert!(session.latencies.is_none());

        let lookup = &session.lookups[0];
        assert_eq!(lookup.popup_latency, 12.5);
        assert_eq!(lookup.suggestions[0].contributor_kind, "k1");
        assert_eq!(lookup.suggestions[0].created_latency, 10.0);
        assert_eq!(lookup.suggestions[0].rendered_latency, 14.0);
    }

    #[test]
    fn malformed_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{not json").unwrap();

        assert!(read_log_file(&path).is_err());
    }

    #[test]
    fn walk_recurses_into_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("nested/deeper")).unwrap();
        fs::write(dir.path().join("top.json"), "{}").unwrap();
        fs::write(dir.path().join("nested/deeper/leaf.json"), "{}").unwrap();

        let files = walk_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().any(|p| p.ends_with("top.json")));
        assert!(files.iter().any(|p| p.ends_with("nested/deeper/leaf.json")));
    }
}
