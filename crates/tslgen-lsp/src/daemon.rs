//! The generator running as a long-lived daemon.
//!
//! The daemon reads one JSON request per line on stdin and regenerates the
//! requested primitives. It has no framed acknowledgement: a stdout line
//! containing `Ready` or `Done`, or any line on stderr, marks it idle again.
//! This is a best-effort heuristic and is kept as such.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::profile::GeneratorProfile;

/// Stdout markers of an idle daemon.
const IDLE_MARKERS: [&str; 2] = ["Ready", "Done"];

/// Message shown when a build is requested while one is running.
pub const ALREADY_ACTIVE: &str = "Build already active, please wait for it to finish.";

/// Errors talking to the daemon or running the build.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("generator daemon has no {0} pipe")]
    MissingPipe(&'static str),

    #[error("failed to send request to the generator daemon: {0}")]
    Write(#[source] std::io::Error),

    #[error("failed to encode generator request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("generator daemon exited")]
    Exited,

    #[error("`{step}` failed ({status}):\n{output}")]
    StepFailed {
        step: String,
        status: String,
        output: String,
    },
}

/// How to launch the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonCommand {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
}

impl DaemonCommand {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        DaemonCommand {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            current_dir: None,
        }
    }

    /// `<interpreter> <root>/main.py -o <build dir> -d -s`
    pub fn generator(
        interpreter: &str,
        root: &Path,
        profile: &GeneratorProfile,
        build_dir: &Path,
    ) -> Self {
        let script = root.join(profile.entry_script);
        DaemonCommand {
            program: interpreter.to_string(),
            args: vec![
                script.display().to_string(),
                "-o".to_string(),
                build_dir.display().to_string(),
                "-d".to_string(),
                "-s".to_string(),
            ],
            current_dir: Some(root.to_path_buf()),
        }
    }

    fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// One generation request, written as a single JSON line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerateRequest {
    pub lscpu_flags: Vec<String>,
    pub primitives: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateOutcome {
    /// The request was sent and the daemon reported it finished.
    Generated,
    /// The daemon was still busy; nothing was sent.
    AlreadyActive,
}

/// A running generator daemon.
pub struct GeneratorDaemon {
    command: String,
    process: Mutex<Child>,
    stdin: Mutex<ChildStdin>,
    idle: Arc<watch::Sender<bool>>,
    readers: Vec<JoinHandle<()>>,
}

impl GeneratorDaemon {
    /// Start the daemon. It counts as busy until it first reports idle.
    pub fn spawn(command: &DaemonCommand) -> Result<Self, DaemonError> {
        let command_line = command.command_line();
        info!(command = %command_line, "Starting generator daemon");

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &command.current_dir {
            cmd.current_dir(dir);
        }
        let mut process = cmd.spawn().map_err(|source| DaemonError::Spawn {
            command: command_line.clone(),
            source,
        })?;

        let stdin = process.stdin.take().ok_or(DaemonError::MissingPipe("stdin"))?;
        let stdout = process.stdout.take().ok_or(DaemonError::MissingPipe("stdout"))?;
        let stderr = process.stderr.take().ok_or(DaemonError::MissingPipe("stderr"))?;

        let idle = Arc::new(watch::Sender::new(false));
        let readers = vec![
            tokio::spawn(watch_output(stdout, idle.clone(), false)),
            tokio::spawn(watch_output(stderr, idle.clone(), true)),
        ];

        Ok(GeneratorDaemon {
            command: command_line,
            process: Mutex::new(process),
            stdin: Mutex::new(stdin),
            idle,
            readers,
        })
    }

    pub fn is_idle(&self) -> bool {
        *self.idle.borrow()
    }

    /// Wait until the daemon reports idle.
    pub async fn ready(&self) {
        let mut idle = self.idle.subscribe();
        // The sender lives in `self`, so this only ends once idle.
        let _ = idle.wait_for(|idle| *idle).await;
    }

    /// Send `request` and wait for the daemon to finish it.
    ///
    /// A busy daemon is left alone and [`GenerateOutcome::AlreadyActive`]
    /// is returned.
    pub async fn generate(&self, request: &GenerateRequest) -> Result<GenerateOutcome, DaemonError> {
        let claimed = self.idle.send_if_modified(|idle| std::mem::replace(idle, false));
        if !claimed {
            debug!("Generator daemon busy");
            return Ok(GenerateOutcome::AlreadyActive);
        }

        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        {
            let mut stdin = self.stdin.lock().await;
            if let Err(e) = write_line(&mut stdin, &line).await {
                self.idle.send_replace(true);
                return Err(DaemonError::Write(e));
            }
        }
        debug!(request = %line.trim_end(), "Sent generator request");

        self.ready().await;
        if self.readers.iter().all(JoinHandle::is_finished) {
            return Err(DaemonError::Exited);
        }
        Ok(GenerateOutcome::Generated)
    }

    /// Stop the daemon.
    pub async fn shutdown(&self) {
        debug!(command = %self.command, "Shutting down generator daemon");
        for reader in &self.readers {
            reader.abort();
        }
        let _ = self.process.lock().await.kill().await;
        self.idle.send_replace(true);
    }
}

async fn write_line(stdin: &mut ChildStdin, line: &str) -> std::io::Result<()> {
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await
}

/// Read `stream` line by line, flipping `idle` on markers (or on any line
/// when `any_line` is set). End of stream also counts as idle.
async fn watch_output<R>(stream: R, idle: Arc<watch::Sender<bool>>, any_line: bool)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                debug!(line = %line, "generator");
                if any_line || IDLE_MARKERS.iter().any(|marker| line.contains(marker)) {
                    idle.send_replace(true);
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read generator output");
                break;
            }
        }
    }
    idle.send_replace(true);
}

/// CPU flags of this machine from `/proc/cpuinfo`; empty where unavailable.
pub fn local_cpu_flags() -> Vec<String> {
    match std::fs::read_to_string("/proc/cpuinfo") {
        Ok(cpuinfo) => parse_cpu_flags(&cpuinfo),
        Err(e) => {
            debug!(error = %e, "No /proc/cpuinfo");
            Vec::new()
        }
    }
}

/// Flags of the first `flags` (or `Features`) line, sorted.
pub fn parse_cpu_flags(cpuinfo: &str) -> Vec<String> {
    let Some(flags) = cpuinfo.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        matches!(key.trim(), "flags" | "Features").then_some(value)
    }) else {
        return Vec::new();
    };
    let mut flags: Vec<String> = flags.split_whitespace().map(str::to_string).collect();
    flags.sort();
    flags.dedup();
    flags
}

/// One external command of the build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildStep {
    pub program: String,
    pub args: Vec<String>,
}

impl BuildStep {
    fn new(program: impl Into<String>, args: &[&str]) -> Self {
        BuildStep {
            program: program.into(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
        }
    }

    fn command_line(&self) -> String {
        format!("{} {}", self.program, self.args.join(" "))
    }
}

/// Configure, build and run the tests of one primitive on one extension.
pub fn build_steps(
    profile: &GeneratorProfile,
    build_dir: &Path,
    extension: &str,
    primitive: &str,
) -> Vec<BuildStep> {
    let source = build_dir.display().to_string();
    let binary = build_dir.join("build");
    let binary_dir = binary.display().to_string();
    let test_binary = binary
        .join("src")
        .join("test")
        .join(format!("{}_test", profile.name));
    vec![
        BuildStep::new("cmake", &["-S", &source, "-B", &binary_dir]),
        BuildStep::new("cmake", &["--build", &binary_dir, "-j"]),
        BuildStep::new(
            test_binary.display().to_string(),
            &[&format!("[{extension}][{primitive}]")],
        ),
    ]
}

/// Run `steps` in order, stopping at the first failure.
///
/// Returns the combined output of all steps.
pub async fn run_build(steps: &[BuildStep], current_dir: &Path) -> Result<String, DaemonError> {
    let mut log = String::new();
    for step in steps {
        info!(step = %step.command_line(), "Running build step");
        let output = Command::new(&step.program)
            .args(&step.args)
            .current_dir(current_dir)
            .output()
            .await
            .map_err(|source| DaemonError::Spawn {
                command: step.command_line(),
                source,
            })?;
        let text = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        if !output.status.success() {
            return Err(DaemonError::StepFailed {
                step: step.command_line(),
                status: output.status.to_string(),
                output: text,
            });
        }
        log.push_str(&text);
    }
    Ok(log)
}
