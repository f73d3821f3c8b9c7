use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use flate2::read::GzDecoder;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::cli::DatasetArgs;
use crate::metrics::ratio;
use crate::model::Session;
use crate::reader;
use crate::util::{ensure_directory, now_utc_string, write_json_pretty};

use super::evaluate::annotate;

const SESSIONS_SUBDIR: &str = "data/files/jsons";
const FEATURES_SUBDIR: &str = "features";

const SESSION_UID_FEATURE: &str = "ml_ctx_cce_sessionUid";

const CATEGORICAL_FEATURES: [&str; 7] = [
    "ml_ctx_kotlin_file_type",
    "ml_ctx_common_is_in_line_beginning",
    "ml_ctx_common_case_sensitivity",
    "ml_ctx_common_is_after_dot",
    "ml_ctx_common_parent_1",
    "ml_ctx_common_parent_2",
    "ml_ctx_common_parent_3",
];

const NUMERIC_FEATURES: [&str; 3] = [
    "ml_ctx_common_line_num",
    "ml_ctx_common_col_num",
    "ml_ctx_common_indent_level",
];

/// Dev and test each take this share of the distinct source files.
const HOLDOUT_FRACTION: f64 = 0.2;

/// One training example: the contributor identity that would have served the
/// accepted suggestion fastest, plus the context features to predict it from.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetRow {
    pub session_id: String,
    pub source_file: String,
    pub target: String,
    pub categorical: BTreeMap<String, String>,
    pub numeric: BTreeMap<String, f64>,
}

/// A session joined with the log file it was recorded in.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session: Session,
    pub source_file: String,
}

#[derive(Debug, Default)]
pub struct Partition {
    pub files: Vec<String>,
    pub rows: Vec<DatasetRow>,
}

#[derive(Debug)]
pub struct DatasetSplit {
    pub train: Partition,
    pub dev: Partition,
    pub test: Partition,
}

#[derive(Debug, Serialize)]
struct PartitionCounts {
    name: &'static str,
    file_count: usize,
    row_count: usize,
}

#[derive(Debug, Serialize)]
struct DatasetManifest {
    manifest_version: u32,
    generated_at: String,
    seed: u64,
    session_count: usize,
    feature_count: usize,
    row_count: usize,
    partitions: Vec<PartitionCounts>,
}

pub fn run(args: DatasetArgs) -> Result<()> {
    let sessions = read_sessions(&args.roots)?;
    let features = read_features(&args.roots)?;
    let rows = build_rows(&features, &sessions)?;
    info!(row_count = rows.len(), "assembled dataset rows");

    let split = split_rows(rows, args.seed);

    ensure_directory(&args.out_dir)?;
    write_json_pretty(&args.out_dir.join("train.json"), &split.train.rows)?;
    write_json_pretty(&args.out_dir.join("dev.json"), &split.dev.rows)?;
    write_json_pretty(&args.out_dir.join("test.json"), &split.test.rows)?;

    let manifest = DatasetManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        seed: args.seed,
        session_count: sessions.len(),
        feature_count: features.len(),
        row_count: split.train.rows.len() + split.dev.rows.len() + split.test.rows.len(),
        partitions: vec![
            counts("train", &split.train),
            counts("dev", &split.dev),
            counts("test", &split.test),
        ],
    };
    write_json_pretty(&args.out_dir.join("dataset_manifest.json"), &manifest)?;

    info!(path = %args.out_dir.display(), "wrote dataset artifacts");
    Ok(())
}

fn counts(name: &'static str, partition: &Partition) -> PartitionCounts {
    PartitionCounts {
        name,
        file_count: partition.files.len(),
        row_count: partition.rows.len(),
    }
}

/// Reads every log under each export root's `data/files/jsons`, indexing
/// annotated sessions by id. Duplicate ids are a defect in the export.
pub fn read_sessions(roots: &[PathBuf]) -> Result<BTreeMap<String, SessionRecord>> {
    let mut records: BTreeMap<String, SessionRecord> = BTreeMap::new();

    for root in roots {
        let dir = root.join(SESSIONS_SUBDIR);
        for path in reader::walk_files(&dir)? {
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let log = reader::read_log_file(&path)?;
            for mut session in log.sessions {
                annotate(&mut session)
                    .with_context(|| format!("invalid session in {}", path.display()))?;
                if records.contains_key(&session.id) {
                    bail!("duplicate session id {}", session.id);
                }
                records.insert(
                    session.id.clone(),
                    SessionRecord {
                        session,
                        source_file: log.file_path.clone(),
                    },
                );
                if records.len() % 100 == 0 {
                    info!(count = records.len(), "read sessions");
                }
            }
        }
    }

    info!(count = records.len(), "read sessions");
    Ok(records)
}

/// Reads every gzip feature archive under each export root's `features`
/// directory, indexing each archive's context map by session uid. Archives
/// without a uid are skipped; duplicate uids are a defect in the export.
pub fn read_features(roots: &[PathBuf]) -> Result<BTreeMap<String, Value>> {
    let mut features: BTreeMap<String, Value> = BTreeMap::new();

    for root in roots {
        let dir = root.join(FEATURES_SUBDIR);
        for path in reader::walk_files(&dir)? {
            if path.extension().and_then(|ext| ext.to_str()) != Some("gz") {
                continue;
            }
            let context = read_feature_archive(&path)?;
            let Some(uid) = context
                .get(SESSION_UID_FEATURE)
                .and_then(Value::as_str)
                .map(str::to_string)
            else {
                continue;
            };
            if features.insert(uid.clone(), context).is_some() {
                bail!("duplicate feature archive for session {uid}");
            }
            if features.len() % 100 == 0 {
                info!(count = features.len(), "read feature archives");
            }
        }
    }

    info!(count = features.len(), "read feature archives");
    Ok(features)
}

fn read_feature_archive(path: &Path) -> Result<Value> {
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut raw = Vec::new();
    GzDecoder::new(file)
        .read_to_end(&mut raw)
        .with_context(|| format!("failed to decompress {}", path.display()))?;

    let parsed: Value = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    let entries = parsed
        .as_array()
        .with_context(|| format!("feature archive is not an array: {}", path.display()))?;
    if entries.len() != 1 {
        bail!(
            "feature archive {} has {} entries, expected exactly 1",
            path.display(),
            entries.len()
        );
    }

    entries[0]
        .pointer("/common/context")
        .cloned()
        .with_context(|| format!("feature archive missing common.context: {}", path.display()))
}

/// Inner-joins feature archives with sessions. A row needs successful
/// latency attribution and at least one suggestion matching the accepted
/// text; its target is the matching contributor with the smallest attributed
/// duration.
pub fn build_rows(
    features: &BTreeMap<String, Value>,
    sessions: &BTreeMap<String, SessionRecord>,
) -> Result<Vec<DatasetRow>> {
    let mut rows = Vec::new();

    for (session_id, context) in features {
        let Some(record) = sessions.get(session_id) else {
            warn!(session_id = %session_id, "no session for feature archive, skipping");
            continue;
        };
        let session = &record.session;
        let Some(latencies) = &session.latencies else {
            continue;
        };

        let target = session
            .lookup()
            .suggestions
            .iter()
            .filter(|suggestion| suggestion.text == session.expected_text)
            .filter_map(|suggestion| {
                let key = suggestion.key();
                latencies.get(&key).copied().map(|duration| (duration, key))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        let Some((_, target_key)) = target else {
            continue;
        };

        let mut categorical = BTreeMap::new();
        for feature in CATEGORICAL_FEATURES {
            let value = context
                .get(feature)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            categorical.insert(feature.to_string(), value);
        }

        let mut numeric = BTreeMap::new();
        for feature in NUMERIC_FEATURES {
            let value = numeric_feature(context.get(feature)).with_context(|| {
                format!("session {session_id}: missing numeric feature {feature}")
            })?;
            numeric.insert(feature.to_string(), value);
        }

        rows.push(DatasetRow {
            session_id: session_id.clone(),
            source_file: record.source_file.clone(),
            target: target_key.to_string(),
            categorical,
            numeric,
        });
    }

    Ok(rows)
}

fn numeric_feature(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}

/// Deterministic train/dev/test split keyed by source file, so every
/// session of one file lands in the same partition. Same seed and input,
/// same partitions.
pub fn split_rows(rows: Vec<DatasetRow>, seed: u64) -> DatasetSplit {
    let mut rng = StdRng::seed_from_u64(seed);

    let mut files: Vec<String> = rows
        .iter()
        .map(|row| row.source_file.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    files.shuffle(&mut rng);

    let holdout = (files.len() as f64 * HOLDOUT_FRACTION) as usize;
    let train_count = files.len() - 2 * holdout;

    let mut split = DatasetSplit {
        train: Partition {
            files: files[..train_count].to_vec(),
            rows: Vec::new(),
        },
        dev: Partition {
            files: files[train_count..train_count + holdout].to_vec(),
            rows: Vec::new(),
        },
        test: Partition {
            files: files[train_count + holdout..].to_vec(),
            rows: Vec::new(),
        },
    };

    for row in rows {
        let partition = if split.train.files.contains(&row.source_file) {
            &mut split.train
        } else if split.dev.files.contains(&row.source_file) {
            &mut split.dev
        } else {
            &mut split.test
        };
        partition.rows.push(row);
    }

    split.train.rows.shuffle(&mut rng);
    split.dev.rows.shuffle(&mut rng);
    split.test.rows.shuffle(&mut rng);

    split
}

/// How a trained contributor-choice policy would have fared: the mean
/// attributed duration of each predicted identity and the recall of its
/// suggestions, averaged over all predictions.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionScore {
    pub latency: f64,
    pub recall: f64,
}

pub fn score_predictions(
    predictions: &BTreeMap<String, String>,
    sessions: &BTreeMap<String, SessionRecord>,
) -> Result<PredictionScore> {
    let mut total_latency = 0.0;
    let mut total_found = 0u64;

    for (session_id, predicted) in predictions {
        let record = sessions
            .get(session_id)
            .with_context(|| format!("no session {session_id} for prediction"))?;
        let session = &record.session;
        let latencies = session
            .latencies
            .as_ref()
            .with_context(|| format!("session {session_id} has no attributed latencies"))?;

        if let Some(duration) = latencies
            .iter()
            .find(|(key, _)| key.to_string() == *predicted)
            .map(|(_, duration)| *duration)
        {
            total_latency += duration;
        }

        let found = session.lookup().suggestions.iter().any(|suggestion| {
            suggestion.key().to_string() == *predicted && suggestion.text == session.expected_text
        });
        total_found += u64::from(found);
    }

    let count = predictions.len() as f64;
    Ok(PredictionScore {
        latency: ratio(total_latency, count),
        recall: ratio(total_found as f64, count),
    })
}
