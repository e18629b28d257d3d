use crate::index::SampleIndex;
use log::{debug, warn};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Placeholder token in a target command line marking where a sample's file
/// path is substituted.
pub const FILE_PLACEHOLDER: &str = "@@";

/// Errors raised while generating triage scripts. Script generation is
/// fatal when it fails: a triage run that produced no script produced no
/// usable output.
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Failed to write triage script {0:?}: {1}")]
    Write(PathBuf, String),

    #[error("Target command line is empty")]
    EmptyTargetCommand,
}

/// Returns `true` if the target consumes samples on standard input.
///
/// A command line containing the `@@` placeholder token is file-mode; the
/// sample path is substituted for the token. Without the token, sample
/// bytes are piped to the target's stdin.
pub fn stdin_mode(target_cmd: &str) -> bool {
    !target_cmd.split_whitespace().any(|t| t == FILE_PLACEHOLDER)
}

/// Configuration threaded into script generation, rather than ambient
/// process-wide state, so concurrent runs cannot interfere.
#[derive(Debug, Clone, Default)]
pub struct GdbScriptSettings {
    /// Path to the debugger's exploitability-classification extension.
    /// When unset, scripts are still emitted but rely on the debugger's
    /// default crash summary — a degraded-but-valid mode.
    pub exploitable_script: Option<PathBuf>,
}

fn script_header(target_bin: &str, settings: &GdbScriptSettings) -> String {
    let mut header = String::new();
    header.push_str("set pagination off\n");
    header.push_str("set width unlimited\n");
    let _ = writeln!(header, "file '{}'", target_bin);
    match &settings.exploitable_script {
        Some(extension) => {
            let _ = writeln!(header, "source '{}'", extension.display());
        }
        None => {
            warn!(
                "No exploitability extension configured; scripts will rely on \
                 the debugger's default crash summary"
            );
        }
    }
    header
}

/// One classification stanza: a marker line carrying the sample's canonical
/// name, the replay command, and the classifier invocation.
fn sample_stanza(
    output_name: &str,
    sample_path: &Path,
    target_args: &[&str],
    use_stdin: bool,
    settings: &GdbScriptSettings,
) -> String {
    let mut stanza = String::new();
    let _ = writeln!(stanza, "echo \\n===[ {} ]===\\n", output_name);

    let mut run_line = String::from("run");
    if use_stdin {
        for arg in target_args {
            run_line.push(' ');
            run_line.push_str(arg);
        }
        let _ = write!(run_line, " < '{}'", sample_path.display());
    } else {
        for arg in target_args {
            run_line.push(' ');
            if *arg == FILE_PLACEHOLDER {
                let _ = write!(run_line, "'{}'", sample_path.display());
            } else {
                run_line.push_str(arg);
            }
        }
    }
    stanza.push_str(&run_line);
    stanza.push('\n');

    if settings.exploitable_script.is_some() {
        stanza.push_str("exploitable\n");
    }
    stanza
}

/// Numbered sibling path for an intermediate script: `script` -> `script.3`.
fn numbered_script_path(path: &Path, number: usize) -> PathBuf {
    let mut os_string = path.as_os_str().to_os_string();
    os_string.push(format!(".{number}"));
    PathBuf::from(os_string)
}

fn write_script(path: &Path, contents: &str) -> Result<(), ScriptError> {
    fs::write(path, contents).map_err(|e| ScriptError::Write(path.to_path_buf(), e.to_string()))
}

/// Emits the debugger script(s) that replay every materialized sample
/// against `target_cmd` under gdb with the classification extension.
///
/// With `intermediate = false` a single combined script at `path` holds one
/// stanza per sample, executed sequentially. With `intermediate = true`
/// each sample gets its own independently executable numbered script
/// (`path.0`, `path.1`, ...), which isolates one sample's debugger crash
/// from the rest and enables parallel execution.
///
/// Returns the paths of the scripts written, in sample order.
pub fn generate_triage_script(
    path: &Path,
    index: &SampleIndex,
    target_cmd: &str,
    settings: &GdbScriptSettings,
    intermediate: bool,
) -> Result<Vec<PathBuf>, ScriptError> {
    let tokens: Vec<&str> = target_cmd.split_whitespace().collect();
    let (&target_bin, target_args) = tokens
        .split_first()
        .ok_or(ScriptError::EmptyTargetCommand)?;
    let use_stdin = stdin_mode(target_cmd);
    let header = script_header(target_bin, settings);

    if intermediate {
        let mut written = Vec::with_capacity(index.len());
        for (number, entry) in index.entries().iter().enumerate() {
            let sample_path = index.output_path(entry);
            let mut contents = header.clone();
            contents.push_str(&sample_stanza(
                &entry.output,
                &sample_path,
                target_args,
                use_stdin,
                settings,
            ));
            contents.push_str("quit\n");

            let script_path = numbered_script_path(path, number);
            write_script(&script_path, &contents)?;
            debug!("Wrote intermediate triage script {:?}", script_path);
            written.push(script_path);
        }
        Ok(written)
    } else {
        let mut contents = header;
        for entry in index.entries() {
            let sample_path = index.output_path(entry);
            contents.push_str(&sample_stanza(
                &entry.output,
                &sample_path,
                target_args,
                use_stdin,
                settings,
            ));
        }
        contents.push_str("quit\n");
        write_script(path, &contents)?;
        debug!("Wrote triage script {:?}", path);
        Ok(vec![path.to_path_buf()])
    }
}
