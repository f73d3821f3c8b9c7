use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::latency::reconstruct;
use crate::metrics::{self, Metric};
use crate::model::{LatencyField, Session};
use crate::reader;

/// Evaluates a single log file, or every file under a directory as one
/// corpus with a shared aggregate metric set.
pub fn run(path: &Path, out: &mut dyn Write) -> Result<()> {
    if path.is_file() {
        evaluate_file(path, None, out)
    } else {
        evaluate_corpus(path, out)
    }
}

/// Drives one log file's sessions through a fresh per-file metric set and,
/// when given, a shared aggregate set. Prints only the per-file set; the
/// aggregate set is printed by the corpus driver once all files are done.
pub fn evaluate_file(
    path: &Path,
    mut aggregate: Option<&mut [Box<dyn Metric>]>,
    out: &mut dyn Write,
) -> Result<()> {
    let log = reader::read_log_file(path)?;
    let mut file_metrics = metrics::registry();

    writeln!(out, "{}", log.file_path)?;

    for mut session in log.sessions {
        annotate(&mut session)
            .with_context(|| format!("invalid session in {}", path.display()))?;

        for metric in &mut file_metrics {
            metric.update(&session);
        }
        if let Some(metrics) = aggregate.as_deref_mut() {
            for metric in metrics {
                metric.update(&session);
            }
        }
    }

    print_metrics(&file_metrics, out)?;
    Ok(())
}

/// Walks every file under `root`, sharing one aggregate metric set across
/// all of them, then prints the corpus-wide summary.
pub fn evaluate_corpus(root: &Path, out: &mut dyn Write) -> Result<()> {
    let mut aggregate = metrics::registry();

    let files = reader::walk_files(root)?;
    info!(root = %root.display(), file_count = files.len(), "evaluating corpus");

    for file in &files {
        evaluate_file(file, Some(&mut aggregate), out)?;
    }

    writeln!(out, "aggregated metrics for all files:")?;
    print_metrics(&aggregate, out)?;
    Ok(())
}

/// Checks the one-lookup structural invariant and caches the attributed
/// durations on the session before any metric sees it.
pub(crate) fn annotate(session: &mut Session) -> Result<()> {
    if session.lookups.len() != 1 {
        bail!(
            "session {} has {} lookups, expected exactly 1",
            session.id,
            session.lookups.len()
        );
    }
    let latencies = reconstruct(&session.lookup().suggestions, LatencyField::Created);
    session.latencies = latencies;
    Ok(())
}

fn print_metrics(metrics: &[Box<dyn Metric>], out: &mut dyn Write) -> Result<()> {
    for metric in metrics {
        write!(out, "  ")?;
        metric.print(out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn write_log(path: &Path, file_path: &str, sessions: &str) {
        let body = format!(r#"{{"filePath": "{file_path}", "sessions": [{sessions}]}}"#);
        fs::write(path, body).unwrap();
    }

    const MATCHING_SESSION: &str = r#"{
        "id": "s-1",
        "expectedText": "foo",
        "_lookups": [{
            "popupLatency": 10,
            "suggestions": [
                {"text": "foo", "contributor": "A", "contributorKind": "k1",
                 "createdLatency": 10, "resultsetLatency": 11, "indicatorLatency": 12,
                 "lookupLatency": 13, "renderedLatency": 14},
                {"text": "bar", "contributor": "A", "contributorKind": "k1",
                 "createdLatency": 20, "resultsetLatency": 21, "indicatorLatency": 22,
                 "lookupLatency": 23, "renderedLatency": 24}
            ]
        }]
    }"#;

    #[test]
    fn evaluate_file_prints_the_per_file_block() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("log.json");
        write_log(&log_path, "src/Main.kt", MATCHING_SESSION);

        let mut out = Vec::new();
        evaluate_file(&log_path, None, &mut out).unwrap();
        let report = String::from_utf8(out).unwrap();

        assert!(report.starts_with("src/Main.kt\n"));
        assert!(report.contains("  recall: 1.000 (1 / 1)\n"));
        assert!(report.contains("  contiguous recall: 1.000 (1 / 1, skipped = 0)\n"));
        assert!(report.contains("  mean popup latency: 10.000 (10.000 / 1)\n"));
        assert!(report.contains("  min oracle latency: 10.000 (10.000 / 1, skipped = 0)\n"));
        // Both suggestions share one window, so the attributed cost is 20.
        assert!(report.contains("  min reorder oracle latency: 20.000 (20.000 / 1, skipped = 0)\n"));
        assert!(!report.contains("aggregated"));
    }

    #[test]
    fn evaluate_file_feeds_the_shared_aggregate_set() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("log.json");
        write_log(&log_path, "src/Main.kt", MATCHING_SESSION);

        let mut aggregate = metrics::registry();
        let mut out = Vec::new();
        evaluate_file(&log_path, Some(&mut aggregate), &mut out).unwrap();
        evaluate_file(&log_path, Some(&mut aggregate), &mut out).unwrap();

        let mut aggregate_out = Vec::new();
        print_metrics(&aggregate, &mut aggregate_out).unwrap();
        let aggregate_report = String::from_utf8(aggregate_out).unwrap();

        assert!(aggregate_report.contains("  recall: 1.000 (2 / 2)\n"));
    }

    #[test]
    fn evaluate_corpus_recurses_and_prints_the_aggregate_block() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("nested")).unwrap();
        write_log(&dir.path().join("a.json"), "src/A.kt", MATCHING_SESSION);
        write_log(&dir.path().join("nested/b.json"), "src/B.kt", MATCHING_SESSION);

        let mut out = Vec::new();
        evaluate_corpus(dir.path(), &mut out).unwrap();
        let report = String::from_utf8(out).unwrap();

        assert!(report.contains("src/A.kt\n"));
        assert!(report.contains("src/B.kt\n"));
        let aggregate_block = report
            .split("aggregated metrics for all files:\n")
            .nth(1)
            .expect("aggregate block present");
        assert!(aggregate_block.contains("  recall: 1.000 (2 / 2)\n"));
    }

    #[test]
    fn a_session_with_two_lookups_aborts_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("log.json");
        write_log(
            &log_path,
            "src/Main.kt",
            r#"{
                "id": "s-broken",
                "expectedText": "foo",
                "_lookups": [
                    {"popupLatency": 1, "suggestions": []},
                    {"popupLatency": 2, "suggestions": []}
                ]
            }"#,
        );

        let mut out = Vec::new();
        let err = evaluate_file(&log_path, None, &mut out).unwrap_err();
        assert!(format!("{err:#}").contains("s-broken"));
    }
}
