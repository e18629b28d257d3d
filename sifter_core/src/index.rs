use crate::discovery::FuzzerInstance;
use crate::samples::list_samples;
use crate::store::{KeyScheme, RecordStore, StoreError};
use log::debug;
use rand::seq::SliceRandom;
use rand_core::RngCore;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while constructing a [`SampleIndex`].
///
/// Index construction is all-or-nothing: a duplicate output name is surfaced
/// here, before any sample bytes are copied, rather than silently
/// overwriting one sample with another in the collection directory.
#[derive(Error, Debug)]
pub enum IndexError {
    /// Two samples would collide on the same canonical output name.
    #[error(
        "Duplicate sample output name '{output}': {first:?} and {second:?} \
         would overwrite each other in the collection directory"
    )]
    DuplicateOutput {
        output: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// Deriving a record-store key for a sample failed.
    #[error("Record store interaction failed while indexing: {0}")]
    Store(#[from] StoreError),

    /// An I/O error occurred while resolving paths.
    #[error("Index I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for IndexError {
    fn from(err: std::io::Error) -> Self {
        IndexError::Io(err.to_string())
    }
}

/// One indexed sample: where it came from, which instance owns it, and the
/// collision-free name it will carry in the collection directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleEntry {
    /// Absolute path of the source sample file.
    pub input: PathBuf,
    /// Identity of the owning fuzzer instance.
    pub fuzzer: String,
    /// Canonical output name, `<fuzzer>:<basename>`. Unique across the
    /// whole index because the instance identity is embedded.
    pub output: String,
}

/// A deduplicated, ordered mapping from fuzzer samples to their canonical
/// collection identities, plus the directory the collection materializes
/// into.
///
/// Entry order reflects instance-then-sample enumeration order and is not
/// guaranteed sorted; callers requiring determinism sort the accessor
/// results themselves. Built fresh per collection run by
/// [`build_sample_index`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleIndex {
    out_dir: PathBuf,
    entries: Vec<SampleEntry>,
}

impl SampleIndex {
    pub fn new(out_dir: PathBuf, entries: Vec<SampleEntry>) -> Self {
        Self { out_dir, entries }
    }

    /// The target collection directory samples materialize into.
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn entries(&self) -> &[SampleEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Source paths of all indexed samples, in entry order.
    pub fn inputs(&self) -> Vec<&Path> {
        self.entries.iter().map(|e| e.input.as_path()).collect()
    }

    /// Canonical output names of all indexed samples, in entry order.
    pub fn outputs(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.output.as_str()).collect()
    }

    /// Absolute destination path for `entry` inside the collection
    /// directory.
    pub fn output_path(&self, entry: &SampleEntry) -> PathBuf {
        self.out_dir.join(&entry.output)
    }

    /// Retains a uniformly random subset of at most `keep` entries.
    ///
    /// Entry order after subsampling is the shuffle order, not the original
    /// enumeration order. A `keep` of zero empties the index; a `keep` at
    /// or above `len()` leaves the entry set unchanged (though shuffled).
    pub fn subsample(&mut self, keep: usize, rng: &mut dyn RngCore) {
        self.entries.shuffle(rng);
        self.entries.truncate(keep);
    }
}

/// Label an instance contributes to its samples' output names.
///
/// A single-instance sync dir carries its absolute path as identity; the
/// path's final component keeps the output a plain filename.
fn output_label(name: &str) -> &str {
    let path = Path::new(name);
    if path.is_absolute() {
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(name)
    } else {
        name
    }
}

/// Builds the sample index for one collection run.
///
/// For each instance (in the given order) and each of its present kinds,
/// enumerates the sample files as absolute paths and appends one
/// [`SampleEntry`] per file. When `seen` is supplied, samples whose
/// `keys`-derived identity the store already records are skipped — this is
/// what makes re-runs incremental. The caller is responsible for `put`ting
/// the survivors back into the store once they have actually been
/// processed.
///
/// # Errors
/// [`IndexError::DuplicateOutput`] if two samples map to the same output
/// name. With distinct instances that cannot happen; it can when one
/// instance carries the same basename in both `crashes` and `queue`, which
/// this design treats as fatal rather than silently preferring one kind.
pub fn build_sample_index(
    sync_dir: &Path,
    out_dir: &Path,
    instances: &[FuzzerInstance],
    seen: Option<&dyn RecordStore>,
    keys: KeyScheme,
) -> Result<SampleIndex, IndexError> {
    let sync_dir = std::path::absolute(sync_dir)?;
    let mut claimed: HashMap<String, PathBuf> = HashMap::new();
    let mut entries = Vec::new();

    for instance in instances {
        let label = output_label(&instance.name);
        for &kind in &instance.kinds {
            let dir = instance.sample_dir(&sync_dir, kind);
            let (_, samples) = list_samples(&dir, true);
            for input in samples {
                if let Some(store) = seen {
                    let key = keys.key_for(&input)?;
                    if store.has(&key) {
                        debug!("Skipping already recorded sample {:?}", input);
                        continue;
                    }
                }
                let basename = input
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let output = format!("{}:{}", label, basename);
                if let Some(first) = claimed.get(&output) {
                    return Err(IndexError::DuplicateOutput {
                        output,
                        first: first.clone(),
                        second: input,
                    });
                }
                claimed.insert(output.clone(), input.clone());
                entries.push(SampleEntry {
                    input,
                    fuzzer: instance.name.clone(),
                    output,
                });
            }
        }
    }
    Ok(SampleIndex::new(out_dir.to_path_buf(), entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::SampleKind;
    use crate::store::JsonRecordStore;
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;
    use std::fs;
    use tempfile::tempdir;

    fn seed_queue(sync: &Path, instance: &str, names: &[&str]) {
        let dir = sync.join(instance).join("queue");
        fs::create_dir_all(&dir).unwrap();
        for name in names {
            fs::write(dir.join(name), format!("{instance}/{name}")).unwrap();
        }
    }

    fn queue_instances(names: &[&str]) -> Vec<FuzzerInstance> {
        names
            .iter()
            .map(|n| FuzzerInstance::new(*n, vec![SampleKind::Queue]))
            .collect()
    }

    #[test]
    fn index_covers_every_instance_and_embeds_the_fuzzer_identity() {
        let sync = tempdir().unwrap();
        let names = ["sample0", "sample1", "sample2", "sample3", "sample4"];
        seed_queue(sync.path(), "fuzz000", &names);
        seed_queue(sync.path(), "fuzz001", &names);
        let out = sync.path().join("out");

        let index = build_sample_index(
            sync.path(),
            &out,
            &queue_instances(&["fuzz000", "fuzz001"]),
            None,
            KeyScheme::SourcePath,
        )
        .unwrap();

        assert_eq!(index.len(), 10);
        let mut outputs: Vec<String> = index.outputs().iter().map(|s| s.to_string()).collect();
        outputs.sort();
        let mut expected = Vec::new();
        for instance in ["fuzz000", "fuzz001"] {
            for name in &names {
                expected.push(format!("{instance}:{name}"));
            }
        }
        assert_eq!(outputs, expected);

        for entry in index.entries() {
            assert!(entry.input.is_absolute());
            assert!(entry.input.ends_with(entry.output.split(':').next_back().unwrap()));
            assert!(entry.output.starts_with(&entry.fuzzer));
        }
    }

    #[test]
    fn colliding_basenames_across_instances_stay_unique() {
        let sync = tempdir().unwrap();
        seed_queue(sync.path(), "fuzz000", &["sample0"]);
        seed_queue(sync.path(), "fuzz001", &["sample0"]);
        let out = sync.path().join("out");

        let index = build_sample_index(
            sync.path(),
            &out,
            &queue_instances(&["fuzz000", "fuzz001"]),
            None,
            KeyScheme::SourcePath,
        )
        .unwrap();

        let mut outputs = index.outputs();
        outputs.sort_unstable();
        assert_eq!(outputs, vec!["fuzz000:sample0", "fuzz001:sample0"]);
    }

    #[test]
    fn same_basename_in_crashes_and_queue_of_one_instance_is_fatal() {
        let sync = tempdir().unwrap();
        for kind in ["crashes", "queue"] {
            let dir = sync.path().join("fuzz000").join(kind);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("sample0"), kind).unwrap();
        }
        let out = sync.path().join("out");
        let instances = vec![FuzzerInstance::new(
            "fuzz000",
            vec![SampleKind::Crashes, SampleKind::Queue],
        )];

        match build_sample_index(sync.path(), &out, &instances, None, KeyScheme::SourcePath) {
            Err(IndexError::DuplicateOutput { output, .. }) => {
                assert_eq!(output, "fuzz000:sample0");
            }
            other => panic!("Expected DuplicateOutput, got {other:?}"),
        }
    }

    #[test]
    fn recorded_samples_are_skipped_and_a_second_run_is_empty() {
        let sync = tempdir().unwrap();
        seed_queue(sync.path(), "fuzz000", &["sample0", "sample1"]);
        let out = sync.path().join("out");
        let instances = queue_instances(&["fuzz000"]);
        let store_path = sync.path().join("records.json");
        let mut store = JsonRecordStore::open(store_path).unwrap();

        let first = build_sample_index(
            sync.path(),
            &out,
            &instances,
            Some(&store),
            KeyScheme::SourcePath,
        )
        .unwrap();
        assert_eq!(first.len(), 2);

        for entry in first.entries() {
            let key = KeyScheme::SourcePath.key_for(&entry.input).unwrap();
            store.put(&key);
        }

        let second = build_sample_index(
            sync.path(),
            &out,
            &instances,
            Some(&store),
            KeyScheme::SourcePath,
        )
        .unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn subsample_is_seed_deterministic_and_bounded() {
        let sync = tempdir().unwrap();
        let names: Vec<String> = (0..20).map(|i| format!("sample{i}")).collect();
        let name_refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        seed_queue(sync.path(), "fuzz000", &name_refs);
        let out = sync.path().join("out");
        let instances = queue_instances(&["fuzz000"]);

        let full = build_sample_index(sync.path(), &out, &instances, None, KeyScheme::SourcePath)
            .unwrap();

        let mut once = full.clone();
        let mut rng = ChaCha8Rng::from_seed([7; 32]);
        once.subsample(5, &mut rng);
        assert_eq!(once.len(), 5);
        for entry in once.entries() {
            assert!(full.entries().contains(entry));
        }

        let mut again = full.clone();
        let mut rng = ChaCha8Rng::from_seed([7; 32]);
        again.subsample(5, &mut rng);
        assert_eq!(once, again);

        let mut generous = full.clone();
        let mut rng = ChaCha8Rng::from_seed([7; 32]);
        generous.subsample(100, &mut rng);
        assert_eq!(generous.len(), full.len());
    }

    #[test]
    fn single_instance_identity_contributes_a_plain_output_label() {
        let sync = tempdir().unwrap();
        let dir = sync.path().join("crashes");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("sample0"), "boom").unwrap();
        let out = sync.path().join("out");

        let absolute = std::path::absolute(sync.path()).unwrap();
        let instances = vec![FuzzerInstance::new(
            absolute.to_string_lossy(),
            vec![SampleKind::Crashes],
        )];
        let index =
            build_sample_index(sync.path(), &out, &instances, None, KeyScheme::SourcePath)
                .unwrap();

        assert_eq!(index.len(), 1);
        let label = absolute.file_name().unwrap().to_str().unwrap();
        assert_eq!(index.outputs(), vec![format!("{label}:sample0")]);
    }
}
