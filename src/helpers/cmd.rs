//! External command execution
//!
//! [`Cmd`] describes a command (program, arguments, directory, environment,
//! stdin file, and optionally the account to run it as). A
//! [`CommandRunner`] executes it. Running as another user is applied to the
//! child process only, so the tool's own identity never changes.

use crate::core::error::Error;
use crate::core::privilege::lookup_user;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Builder for an external command.
///
/// # Example
/// ```ignore
/// let cmd = Cmd::new("make").arg("-j4").dir("/srv/carto/build/osm2pgsql");
/// runner.run(&cmd)?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    env: BTreeMap<String, String>,
    user: Option<String>,
    stdin: Option<PathBuf>,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            user: None,
            stdin: None,
        }
    }

    /// A `sh -c` command line.
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("sh").arg("-c").arg(script)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory for the command.
    pub fn dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Set an environment variable for the command.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set multiple environment variables at once.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in vars {
            self.env.insert(k.into(), v.into());
        }
        self
    }

    /// Run the child as `user` (uid and primary gid).
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Feed a file to the command's stdin.
    pub fn stdin_file(mut self, path: impl AsRef<Path>) -> Self {
        self.stdin = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn get_dir(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    pub fn get_env(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    /// Build the underlying `Command`.
    fn build_command(&self) -> Result<Command> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        for (k, v) in &self.env {
            cmd.env(k, v);
        }

        if let Some(ref user) = self.user {
            let account = lookup_user(user)?;
            cmd.gid(account.gid).uid(account.uid);
        }

        match self.stdin {
            Some(ref path) => {
                let file = std::fs::File::open(path)
                    .with_context(|| format!("cannot open {}", path.display()))?;
                cmd.stdin(file);
            }
            None => {
                cmd.stdin(Stdio::null());
            }
        }

        Ok(cmd)
    }

    fn failed(&self, code: Option<i32>) -> anyhow::Error {
        Error::CommandFailed {
            cmd: self.to_string(),
            code,
        }
        .into()
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Executes commands. Bundles only talk to this trait.
pub trait CommandRunner {
    /// Run to completion; non-zero exit is [`Error::CommandFailed`].
    fn run(&self, cmd: &Cmd) -> Result<()>;

    /// Run quietly and report whether it exited with status 0.
    fn succeeds(&self, cmd: &Cmd) -> Result<bool>;

    /// Run and capture stdout; non-zero exit is [`Error::CommandFailed`].
    fn output(&self, cmd: &Cmd) -> Result<String>;
}

/// Lines of captured output shown when a quiet command fails.
const FAILURE_TAIL_LINES: usize = 20;

/// [`CommandRunner`] that spawns real processes.
///
/// Output streams to the terminal when `verbose` is set and is captured
/// otherwise (and shown only if the command fails).
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    verbose: bool,
}

impl SystemRunner {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &Cmd) -> Result<()> {
        tracing::debug!(command = %cmd, user = ?cmd.user, dir = ?cmd.cwd, "running command");
        let mut command = cmd.build_command()?;

        if self.verbose {
            let status = command
                .status()
                .with_context(|| format!("command failed to start: {}", cmd.program))?;
            if !status.success() {
                return Err(cmd.failed(status.code()));
            }
            return Ok(());
        }

        let output = command
            .output()
            .with_context(|| format!("command failed to start: {}", cmd.program))?;
        if !output.status.success() {
            let captured = format!(
                "{}{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
            let lines: Vec<&str> = captured.lines().collect();
            for line in &lines[lines.len().saturating_sub(FAILURE_TAIL_LINES)..] {
                eprintln!("     {}", line);
            }
            return Err(cmd.failed(output.status.code()));
        }
        Ok(())
    }

    fn succeeds(&self, cmd: &Cmd) -> Result<bool> {
        tracing::debug!(command = %cmd, user = ?cmd.user, "probing");
        let status = cmd
            .build_command()?
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .with_context(|| format!("command failed to start: {}", cmd.program))?;
        Ok(status.success())
    }

    fn output(&self, cmd: &Cmd) -> Result<String> {
        tracing::debug!(command = %cmd, user = ?cmd.user, "capturing output");
        let output = cmd
            .build_command()?
            .stderr(Stdio::inherit())
            .output()
            .with_context(|| format!("command failed to start: {}", cmd.program))?;
        if !output.status.success() {
            return Err(cmd.failed(output.status.code()));
        }
        String::from_utf8(output.stdout).context("invalid utf8 output")
    }
}
