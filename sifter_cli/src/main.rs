use sifter_core::config::SifterConfig;
use sifter_core::discovery::{SampleKind, discover_instances};
use sifter_core::index::{SampleIndex, build_sample_index};
use sifter_core::materialize::{copy_samples, write_sample_list};
use sifter_core::runner::{
    RunnerError, RunnerSettings, ScriptOutcome, ScriptRunner, ScriptStatus,
};
use sifter_core::samples::collect_samples;
use sifter_core::script::{GdbScriptSettings, generate_triage_script};
use sifter_core::store::{JsonRecordStore, KeyScheme, RecordStore};

use clap::Parser;
use log::{info, warn};
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Collects crash samples from parallel fuzzer \
instances into one deduplicated directory and triages them under gdb.")]
struct Cli {
    /// Synchronization directory holding per-instance fuzzer outputs.
    sync_dir: PathBuf,
    /// Collection directory the deduplicated samples are copied into.
    collection_dir: PathBuf,
    /// Target binary and arguments; use '@@' for the sample file position,
    /// omit it for targets reading from stdin.
    #[clap(last = true, required = true, num_args = 1..)]
    target_cmd: Vec<String>,
    /// TOML config file (debugger binary, exploitable extension, timeout).
    #[clap(short, long)]
    config_file: Option<PathBuf>,
    /// Record store for incremental runs; already recorded samples are
    /// skipped and newly collected ones are recorded.
    #[clap(short, long)]
    database: Option<PathBuf>,
    /// Key the record store by sample content digest instead of source path.
    #[clap(long)]
    digest_keys: bool,
    /// Collect queue samples instead of crash samples.
    #[clap(long)]
    queue: bool,
    /// Randomly subsample the collection down to at most this many files.
    #[clap(short = 'n', long)]
    sample_count: Option<usize>,
    /// RNG seed for reproducible subsampling.
    #[clap(long)]
    seed: Option<u64>,
    /// Write the list of collected files to this path.
    #[clap(short, long)]
    file_list: Option<PathBuf>,
    /// Generate triage script(s) at this path without executing them.
    #[clap(short, long)]
    generate_script: Option<PathBuf>,
    /// Generate triage script(s) at this path and execute them.
    #[clap(short, long)]
    execute_script: Option<PathBuf>,
    /// One independently executable script per sample.
    #[clap(short, long)]
    intermediate: bool,
    /// Worker count for executing intermediate script batches.
    #[clap(short, long)]
    jobs: Option<usize>,
    /// Echo debugger output instead of only summarizing it.
    #[clap(short, long)]
    verbose: bool,
}

fn init_logger(verbose: bool) {
    let level = if verbose {
        simplelog::LevelFilter::Debug
    } else {
        simplelog::LevelFilter::Info
    };
    simplelog::CombinedLogger::init(vec![simplelog::TermLogger::new(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )])
    .expect("logger is initialized once");
}

fn mark_collected(
    store: &mut JsonRecordStore,
    index: &SampleIndex,
    failed_inputs: &HashSet<&Path>,
    keys: KeyScheme,
) {
    for entry in index.entries() {
        if failed_inputs.contains(entry.input.as_path()) {
            continue;
        }
        match keys.key_for(&entry.input) {
            Ok(key) => store.put(&key),
            Err(e) => warn!("Not recording {:?}: {}", entry.input, e),
        }
    }
}

fn summarize_executions(results: &[Result<ScriptOutcome, RunnerError>]) {
    let mut timeouts = 0;
    let mut failures = 0;
    let mut spawn_errors = 0;
    for result in results {
        match result {
            Ok(outcome) => match &outcome.status {
                ScriptStatus::Timeout => timeouts += 1,
                status if !status.is_success() => failures += 1,
                _ => {}
            },
            Err(e) => {
                warn!("{}", e);
                spawn_errors += 1;
            }
        }
    }
    info!(
        "Executed {} triage script(s): {} timed out, {} exited non-zero, {} failed to launch",
        results.len(),
        timeouts,
        failures,
        spawn_errors
    );
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let config = match &cli.config_file {
        Some(path) => SifterConfig::load_from_file(path)?,
        None => {
            let default_path = PathBuf::from("sifter.toml");
            if default_path.exists() {
                SifterConfig::load_from_file(&default_path)?
            } else {
                SifterConfig::default()
            }
        }
    };

    let kind = if cli.queue {
        SampleKind::Queue
    } else {
        SampleKind::Crashes
    };
    let instances = discover_instances(&cli.sync_dir, kind)?.into_instances();
    if instances.is_empty() {
        info!("No fuzzer instances with a '{}' directory under {:?}", kind, cli.sync_dir);
        return Ok(());
    }
    info!("Found {} fuzzer instance(s) in {:?}", instances.len(), cli.sync_dir);

    let (total, _) = collect_samples(&cli.sync_dir, &instances);
    info!("{} sample(s) present before filtering", total);

    let keys = if cli.digest_keys {
        KeyScheme::ContentDigest
    } else {
        KeyScheme::SourcePath
    };
    let mut store = match &cli.database {
        Some(path) => Some(JsonRecordStore::open(path.clone())?),
        None => None,
    };

    let mut index = build_sample_index(
        &cli.sync_dir,
        &cli.collection_dir,
        &instances,
        store.as_ref().map(|s| s as &dyn RecordStore),
        keys,
    )?;

    if let Some(keep) = cli.sample_count {
        let seed = cli.seed.unwrap_or_else(rand::random);
        info!("Subsampling down to {} file(s) with seed {}", keep, seed);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        index.subsample(keep, &mut rng);
    }

    if index.is_empty() {
        info!("No new samples to collect");
        return Ok(());
    }
    info!(
        "Collecting {} new sample(s) into {:?}",
        index.len(),
        cli.collection_dir
    );

    let report = copy_samples(&index)?;
    if !report.is_complete() {
        warn!(
            "{} of {} sample(s) could not be collected:",
            report.failed.len(),
            index.len()
        );
        for failure in &report.failed {
            warn!("  {}", failure);
        }
    }

    if let Some(list_path) = &cli.file_list {
        if let Err(e) = write_sample_list(list_path, &report.copied) {
            warn!("{}", e);
        }
    }

    if let Some(store) = store.as_mut() {
        let failed_inputs: HashSet<&Path> =
            report.failed.iter().map(|f| f.input.as_path()).collect();
        mark_collected(store, &index, &failed_inputs, keys);
        store.persist()?;
    }

    let script_path = cli.execute_script.as_ref().or(cli.generate_script.as_ref());
    let Some(script_path) = script_path else {
        info!("Collected {} sample(s); no triage script requested", report.copied.len());
        return Ok(());
    };

    let target_cmd = cli.target_cmd.join(" ");
    let script_settings = GdbScriptSettings {
        exploitable_script: config.debugger.exploitable_script.clone(),
    };
    let scripts = generate_triage_script(
        script_path,
        &index,
        &target_cmd,
        &script_settings,
        cli.intermediate,
    )?;
    info!("Generated {} triage script(s)", scripts.len());

    if cli.execute_script.is_some() {
        let runner = ScriptRunner::new(RunnerSettings {
            gdb_binary: config.debugger.gdb_binary.clone(),
            timeout: config.debugger.timeout(),
            verbose: cli.verbose,
        });
        let cancel = AtomicBool::new(false);
        let jobs = cli.jobs.unwrap_or(config.triage.jobs);
        let results = if cli.intermediate {
            runner.run_batch(&scripts, jobs, &cancel)
        } else {
            scripts.iter().map(|s| runner.run(s)).collect()
        };
        summarize_executions(&results);
    }

    Ok(())
}
