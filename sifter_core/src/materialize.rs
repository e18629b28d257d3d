use crate::index::SampleIndex;
use log::{debug, warn};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A single sample that could not be copied into the collection directory.
#[derive(Error, Debug)]
#[error("Failed to copy {input:?} to {output:?}: {reason}")]
pub struct CopyError {
    pub input: PathBuf,
    pub output: PathBuf,
    pub reason: String,
}

/// Outcome of materializing an index: the successfully written collection
/// paths (in index order) and every per-file failure. Per-file errors never
/// abort the run; a large batch's one unreadable sample must not discard
/// the rest of the collection.
#[derive(Debug, Default)]
pub struct CopyReport {
    pub copied: Vec<PathBuf>,
    pub failed: Vec<CopyError>,
}

impl CopyReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Errors that abort materialization as a whole, as opposed to the per-file
/// failures collected in a [`CopyReport`].
#[derive(Error, Debug)]
pub enum MaterializeError {
    #[error("Failed to create collection directory {0:?}: {1}")]
    OutDir(PathBuf, String),

    #[error("Failed to write sample list {0:?}: {1}")]
    ListWrite(PathBuf, String),
}

/// Copies each indexed sample verbatim into the collection directory under
/// its canonical output name, creating the directory if absent.
///
/// Returns the per-file [`CopyReport`]; only a failure to create the
/// collection directory itself is fatal. Copies are idempotent, so a rerun
/// simply overwrites identical bytes.
pub fn copy_samples(index: &SampleIndex) -> Result<CopyReport, MaterializeError> {
    let out_dir = std::path::absolute(index.out_dir())
        .map_err(|e| MaterializeError::OutDir(index.out_dir().to_path_buf(), e.to_string()))?;
    fs::create_dir_all(&out_dir)
        .map_err(|e| MaterializeError::OutDir(out_dir.clone(), e.to_string()))?;

    let mut report = CopyReport::default();
    for entry in index.entries() {
        let destination = out_dir.join(&entry.output);
        match fs::copy(&entry.input, &destination) {
            Ok(_) => {
                debug!("Collected {:?} as '{}'", entry.input, entry.output);
                report.copied.push(destination);
            }
            Err(e) => {
                warn!("Failed to collect {:?}: {}", entry.input, e);
                report.failed.push(CopyError {
                    input: entry.input.clone(),
                    output: destination,
                    reason: e.to_string(),
                });
            }
        }
    }
    Ok(report)
}

/// Writes the collected file paths to `path`, one per line.
pub fn write_sample_list(path: &Path, files: &[PathBuf]) -> Result<(), MaterializeError> {
    let file = File::create(path)
        .map_err(|e| MaterializeError::ListWrite(path.to_path_buf(), e.to_string()))?;
    let mut writer = BufWriter::new(file);
    for file_path in files {
        writeln!(writer, "{}", file_path.display())
            .map_err(|e| MaterializeError::ListWrite(path.to_path_buf(), e.to_string()))?;
    }
    writer
        .flush()
        .map_err(|e| MaterializeError::ListWrite(path.to_path_buf(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::SampleEntry;
    use std::fs;
    use tempfile::tempdir;

    fn entry(input: PathBuf, fuzzer: &str) -> SampleEntry {
        let basename = input.file_name().unwrap().to_string_lossy().into_owned();
        SampleEntry {
            output: format!("{fuzzer}:{basename}"),
            input,
            fuzzer: fuzzer.to_string(),
        }
    }

    #[test]
    fn copy_samples_round_trips_bytes_under_canonical_names() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("queue");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("sample0"), b"alpha").unwrap();
        fs::write(src.join("sample1"), b"beta").unwrap();

        let out = dir.path().join("collection");
        let index = SampleIndex::new(
            out.clone(),
            vec![
                entry(src.join("sample0"), "fuzz000"),
                entry(src.join("sample1"), "fuzz000"),
            ],
        );

        let report = copy_samples(&index).unwrap();
        assert!(report.is_complete());
        assert_eq!(
            report.copied,
            vec![out.join("fuzz000:sample0"), out.join("fuzz000:sample1")]
        );

        let mut listed: Vec<String> = fs::read_dir(&out)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        listed.sort();
        assert_eq!(listed, vec!["fuzz000:sample0", "fuzz000:sample1"]);
        assert_eq!(fs::read(out.join("fuzz000:sample0")).unwrap(), b"alpha");
        assert_eq!(fs::read(out.join("fuzz000:sample1")).unwrap(), b"beta");
    }

    #[test]
    fn unreadable_source_is_collected_as_a_failure_not_an_abort() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("queue");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("sample0"), b"present").unwrap();

        let out = dir.path().join("collection");
        let index = SampleIndex::new(
            out.clone(),
            vec![
                entry(src.join("missing"), "fuzz000"),
                entry(src.join("sample0"), "fuzz000"),
            ],
        );

        let report = copy_samples(&index).unwrap();
        assert_eq!(report.copied, vec![out.join("fuzz000:sample0")]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].input, src.join("missing"));
        assert!(!report.is_complete());
    }

    #[test]
    fn write_sample_list_emits_one_path_per_line() {
        let dir = tempdir().unwrap();
        let list = dir.path().join("collected_files");
        let files = vec![
            PathBuf::from("/collection/fuzz000:sample0"),
            PathBuf::from("/collection/fuzz000:sample1"),
        ];
        write_sample_list(&list, &files).unwrap();

        let contents = fs::read_to_string(&list).unwrap();
        assert_eq!(
            contents,
            "/collection/fuzz000:sample0\n/collection/fuzz000:sample1\n"
        );
    }

    #[test]
    fn write_sample_list_to_invalid_location_fails() {
        let dir = tempdir().unwrap();
        let bad = dir.path().join("no_such_dir").join("list");
        match write_sample_list(&bad, &[]) {
            Err(MaterializeError::ListWrite(path, _)) => assert_eq!(path, bad),
            other => panic!("Expected ListWrite error, got {other:?}"),
        }
    }
}
