use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct DebuggerSettings {
    #[serde(default = "default_gdb_binary")]
    pub gdb_binary: PathBuf,
    #[serde(default)]
    pub exploitable_script: Option<PathBuf>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_gdb_binary() -> PathBuf {
    PathBuf::from("gdb")
}

fn default_timeout_ms() -> u64 {
    60_000
}

impl DebuggerSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for DebuggerSettings {
    fn default() -> Self {
        Self {
            gdb_binary: default_gdb_binary(),
            exploitable_script: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct TriageSettings {
    #[serde(default = "default_jobs")]
    pub jobs: usize,
}

fn default_jobs() -> usize {
    1
}

impl Default for TriageSettings {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct SifterConfig {
    #[serde(default)]
    pub debugger: DebuggerSettings,
    #[serde(default)]
    pub triage: TriageSettings,
}

impl SifterConfig {
    pub fn load_from_file(path: &PathBuf) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        let config: SifterConfig = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from config file {:?}: {}", path, e)
        })?;

        Ok(config)
    }
}
