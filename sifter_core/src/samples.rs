use crate::discovery::{FuzzerInstance, SampleKind};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

/// Lists the regular files in `dir`, non-recursively.
///
/// Returns `(count, files)` where `count` always equals `files.len()`.
/// `absolute = false` yields basenames, `absolute = true` yields
/// `dir/basename`. A missing or empty directory yields `(0, [])` — an
/// instance with zero samples is not an error.
pub fn list_samples(dir: &Path, absolute: bool) -> (usize, Vec<PathBuf>) {
    let Ok(read_dir) = fs::read_dir(dir) else {
        return (0, Vec::new());
    };

    let mut files = Vec::new();
    for entry in read_dir.flatten() {
        let path = entry.path();
        if path.is_file() {
            if absolute {
                files.push(path);
            } else {
                files.push(PathBuf::from(entry.file_name()));
            }
        }
    }
    (files.len(), files)
}

/// Per-instance sample listing: `(instance name, [(kind, basenames)])`.
pub type InstanceSamples = (String, Vec<(SampleKind, Vec<PathBuf>)>);

/// Enumerates every requested kind of every instance and reports how many
/// samples each holds. The nested shape preserves which kind each sample
/// came from; this feeds the pre-collection summary, not the index.
pub fn collect_samples(
    sync_dir: &Path,
    instances: &[FuzzerInstance],
) -> (usize, Vec<InstanceSamples>) {
    let mut total = 0;
    let mut collected = Vec::with_capacity(instances.len());

    for instance in instances {
        let mut per_kind = Vec::with_capacity(instance.kinds.len());
        for &kind in &instance.kinds {
            let dir = instance.sample_dir(sync_dir, kind);
            let (count, samples) = list_samples(&dir, false);
            info!("Found {} samples in '{}' ({})", count, instance.name, kind);
            total += count;
            per_kind.push((kind, samples));
        }
        collected.push((instance.name.clone(), per_kind));
    }
    (total, collected)
}
