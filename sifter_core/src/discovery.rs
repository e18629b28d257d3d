use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while locating fuzzer instances under a synchronization
/// directory. These are fatal: no collection work starts without a readable
/// sync dir.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// The synchronization directory is missing or not a directory.
    #[error("Sync directory {0:?} does not exist or is not a directory")]
    SyncDirMissing(PathBuf),

    /// An I/O error occurred while scanning the synchronization directory.
    /// Contains a string describing the underlying I/O error.
    #[error("Discovery I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for DiscoveryError {
    fn from(err: std::io::Error) -> Self {
        DiscoveryError::Io(err.to_string())
    }
}

/// The two sample sub-directories a fuzzer instance can expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SampleKind {
    Crashes,
    Queue,
}

impl SampleKind {
    /// On-disk directory name used by the fuzzing engine for this kind.
    pub fn dir_name(&self) -> &'static str {
        match self {
            SampleKind::Crashes => "crashes",
            SampleKind::Queue => "queue",
        }
    }
}

impl fmt::Display for SampleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// One parallel fuzzer worker, identified by its directory.
///
/// `name` is the instance's relative directory name under the sync dir, or
/// the absolute path of the sync dir itself when the sync dir is a single
/// instance. `kinds` lists the sample sub-directories present for this
/// instance, in the order they were requested.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FuzzerInstance {
    pub name: String,
    pub kinds: Vec<SampleKind>,
}

impl FuzzerInstance {
    pub fn new(name: impl Into<String>, kinds: Vec<SampleKind>) -> Self {
        Self {
            name: name.into(),
            kinds,
        }
    }

    /// Path of this instance's sample directory for `kind`.
    ///
    /// Joining an absolute `name` onto `sync_dir` yields the absolute path
    /// unchanged, so this works for both layouts.
    pub fn sample_dir(&self, sync_dir: &Path, kind: SampleKind) -> PathBuf {
        sync_dir.join(&self.name).join(kind.dir_name())
    }
}

/// Shape of the synchronization directory, as a tagged result so callers
/// branch on the tag rather than re-inspecting paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncLayout {
    /// The sync dir itself is one fuzzer instance (it directly contains a
    /// `crashes`/`queue` sub-directory). The instance name is the absolute
    /// path of the sync dir.
    SingleInstance(FuzzerInstance),
    /// The sync dir is a root of per-instance sub-directories.
    Nested(Vec<FuzzerInstance>),
}

impl SyncLayout {
    /// Flattens the layout into the discovered instance list.
    pub fn into_instances(self) -> Vec<FuzzerInstance> {
        match self {
            SyncLayout::SingleInstance(instance) => vec![instance],
            SyncLayout::Nested(instances) => instances,
        }
    }
}

/// Locates fuzzer instances under `sync_dir` that expose a `kind` sample
/// directory.
///
/// Instances lacking the requested kind are silently excluded. The order of
/// nested instances is whatever the directory iteration yields; callers
/// needing determinism sort by name.
pub fn discover_instances(
    sync_dir: &Path,
    kind: SampleKind,
) -> Result<SyncLayout, DiscoveryError> {
    if !sync_dir.is_dir() {
        return Err(DiscoveryError::SyncDirMissing(sync_dir.to_path_buf()));
    }

    if sync_dir.join(kind.dir_name()).is_dir() {
        let absolute = std::path::absolute(sync_dir)?;
        let instance = FuzzerInstance::new(absolute.to_string_lossy(), vec![kind]);
        return Ok(SyncLayout::SingleInstance(instance));
    }

    let mut instances = Vec::new();
    for entry in fs::read_dir(sync_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() && path.join(kind.dir_name()).is_dir() {
            let name = entry.file_name().to_string_lossy().into_owned();
            instances.push(FuzzerInstance::new(name, vec![kind]));
        }
    }
    Ok(SyncLayout::Nested(instances))
}
