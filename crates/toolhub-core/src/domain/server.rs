//! Tool server domain types.
//!
//! A [`ServerDescriptor`] is the static launch recipe for one tool server;
//! [`ConnectionState`] and [`ServerStatus`] describe what the orchestrator
//! currently knows about the running instance.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Commands whose first positional argument is the script they run.
///
/// For these the script is part of the launch target and must exist before
/// the process is spawned.
const SCRIPT_INTERPRETERS: &[&str] = &[
    "python", "python3", "node", "deno", "bun", "ruby", "perl", "sh", "bash",
];

/// Interpreter flags that run inline code or a module instead of a script.
const INLINE_CODE_FLAGS: &[&str] = &["-c", "-e", "-m", "-p", "--eval", "--print"];

/// Interpreter flags whose value is the following argument.
const VALUE_FLAGS: &[&str] = &[
    "-X", "-W", "-r", "-I", "--require", "--import", "--loader", "--config", "--env-file",
];

/// Subcommands that precede the script (`deno run server.ts`).
const RUN_SUBCOMMANDS: &[(&str, &str)] = &[("deno", "run"), ("bun", "run")];

const fn default_enabled() -> bool {
    true
}

/// Static configuration for launching one tool server.
///
/// Descriptors are loaded once at startup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerDescriptor {
    /// Unique key for the server; also the qualifier for its tools.
    pub name: String,

    /// Executable to run (bare name looked up on `PATH`, or a path).
    pub command: String,

    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment overrides merged onto the orchestrator's environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Working directory for the child process.
    #[serde(
        default,
        alias = "cwd",
        alias = "working_dir",
        skip_serializing_if = "Option::is_none"
    )]
    pub working_directory: Option<PathBuf>,

    /// Human-readable label.
    #[serde(default)]
    pub description: String,

    /// Disabled servers are never started.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Script the launch depends on, when it cannot be inferred from `args`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<PathBuf>,
}

impl ServerDescriptor {
    /// Create an enabled descriptor with no arguments.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_directory: None,
            description: String::new(),
            enabled: true,
            entry_point: None,
        }
    }

    /// Set the argument list.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Add an environment override.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the enabled flag.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set an explicit entry point.
    #[must_use]
    pub fn with_entry_point(mut self, path: impl Into<PathBuf>) -> Self {
        self.entry_point = Some(path.into());
        self
    }

    /// Check the descriptor for structural problems.
    ///
    /// This does not touch the filesystem; launch target checks happen when
    /// the server is started.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Server name cannot be empty".to_string());
        }
        if self.name.contains(['.', '/']) || self.name.contains(char::is_whitespace) {
            return Err(format!(
                "Server name '{}' must not contain '.', '/' or whitespace",
                self.name
            ));
        }
        if self.command.is_empty() {
            return Err(format!("Server '{}' has an empty command", self.name));
        }
        if self.command.contains(char::is_whitespace) && !Path::new(&self.command).exists() {
            return Err(format!(
                "Server '{}': command must be an executable name/path only. \
                 Put flags and arguments in the 'args' field.",
                self.name
            ));
        }
        Ok(())
    }

    /// The script this launch depends on, resolved against the working directory.
    ///
    /// Uses `entry_point` when set. Otherwise, when the command is a known
    /// script interpreter, the script argument is inferred. Inference gives
    /// up (no pre-launch check) when the argument is not clearly a file.
    pub fn resolved_entry_point(&self) -> Option<PathBuf> {
        let candidate = match &self.entry_point {
            Some(explicit) => explicit.clone(),
            None => PathBuf::from(script_argument(self.program()?, &self.args)?),
        };

        if candidate.is_absolute() {
            return Some(candidate);
        }
        Some(match &self.working_directory {
            Some(dir) => dir.join(candidate),
            None => candidate,
        })
    }

    /// Interpreter name, when the command is one.
    fn program(&self) -> Option<&str> {
        let program = Path::new(&self.command)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.command);
        SCRIPT_INTERPRETERS
            .iter()
            .copied()
            .find(|interpreter| *interpreter == program)
    }
}

/// First argument an interpreter would run as a script.
fn script_argument<'a>(program: &str, args: &'a [String]) -> Option<&'a str> {
    let mut args = args.iter().map(String::as_str);

    // Flags may come before the subcommand as well as after it
    let mut subcommand = RUN_SUBCOMMANDS
        .iter()
        .find(|(interpreter, _)| *interpreter == program)
        .map(|(_, sub)| *sub);

    while let Some(arg) = args.next() {
        if INLINE_CODE_FLAGS.contains(&arg) {
            return None;
        }
        if VALUE_FLAGS.contains(&arg) {
            args.next();
            continue;
        }
        if arg.starts_with('-') {
            continue;
        }
        if subcommand.take().is_some_and(|sub| sub == arg) {
            continue;
        }
        return looks_like_file(arg).then_some(arg);
    }
    None
}

/// A relative or absolute path, or a name with an extension.
fn looks_like_file(arg: &str) -> bool {
    let path = Path::new(arg);
    path.extension().is_some() || path.components().count() > 1
}

/// Lifecycle state of one server connection.
///
/// `Dead` is terminal: a dead connection is replaced, never revived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No process yet.
    #[default]
    Disconnected,
    /// Process is being spawned.
    Spawning,
    /// Capability negotiation in progress.
    Handshaking,
    /// Handshake complete; tool calls allowed.
    Ready,
    /// A call failed at the transport level but the process is alive.
    Degraded,
    /// Process exited or the stream can no longer be trusted.
    Dead,
}

impl ConnectionState {
    /// Whether application-level calls may be issued in this state.
    pub const fn is_callable(self) -> bool {
        matches!(self, Self::Ready | Self::Degraded)
    }

    /// Whether this is the terminal state.
    pub const fn is_dead(self) -> bool {
        matches!(self, Self::Dead)
    }

    /// Lowercase label used in logs and status output.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Spawning => "spawning",
            Self::Handshaking => "handshaking",
            Self::Ready => "ready",
            Self::Degraded => "degraded",
            Self::Dead => "dead",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime view of one configured server for presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    pub name: String,
    pub description: String,
    pub state: ConnectionState,
    pub tool_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub restart_count: u32,
    /// Why the server is not running, if it failed to start.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}
