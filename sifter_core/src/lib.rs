pub mod config;
pub mod discovery;
pub mod index;
pub mod materialize;
pub mod runner;
pub mod samples;
pub mod script;
pub mod store;

pub use config::{DebuggerSettings, SifterConfig, TriageSettings};
pub use discovery::{
    DiscoveryError, FuzzerInstance, SampleKind, SyncLayout, discover_instances,
};
pub use index::{IndexError, SampleEntry, SampleIndex, build_sample_index};
pub use materialize::{
    CopyError, CopyReport, MaterializeError, copy_samples, write_sample_list,
};
pub use runner::{RunnerError, RunnerSettings, ScriptOutcome, ScriptRunner, ScriptStatus};
pub use samples::{collect_samples, list_samples};
pub use script::{
    FILE_PLACEHOLDER, GdbScriptSettings, ScriptError, generate_triage_script, stdin_mode,
};
pub use store::{JsonRecordStore, KeyScheme, RecordStore, StoreError};
