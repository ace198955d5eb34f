//! External build/check toolchain
//!
//! The toolchain is opaque: it is invoked as
//! `<program> <leading args> <verb> <options> <artifact>` and only its exit
//! status and combined output are used.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Errors raised while invoking the toolchain
#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for toolchain invocations
pub type ToolchainResult<T> = Result<T, ToolchainError>;

/// One toolchain call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Mode of operation, e.g. `INSTALL` or `check`
    pub verb: String,
    pub options: Vec<String>,
    /// Archive or directory the verb operates on
    pub artifact: PathBuf,
    /// Working directory, inherited when `None`
    pub workdir: Option<PathBuf>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(verb: impl Into<String>, artifact: impl Into<PathBuf>) -> Self {
        Self {
            verb: verb.into(),
            options: Vec::new(),
            artifact: artifact.into(),
            workdir: None,
            env: Vec::new(),
        }
    }

    #[must_use]
    pub fn options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.extend(options.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Captured result of a toolchain call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    /// `None` when terminated by a signal
    pub exit_code: Option<i32>,
    /// Stdout followed by stderr
    pub output: String,
}

/// Runs toolchain invocations
#[async_trait]
pub trait Toolchain: Send + Sync {
    async fn invoke(&self, invocation: &Invocation) -> ToolchainResult<ToolOutput>;
}

/// Toolchain backed by an external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandToolchain {
    program: String,
    args: Vec<String>,
}

impl CommandToolchain {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Full argument list for an invocation, without the program
    pub fn command_line(&self, invocation: &Invocation) -> Vec<String> {
        let mut line = self.args.clone();
        line.push(invocation.verb.clone());
        line.extend(invocation.options.iter().cloned());
        line.push(invocation.artifact.display().to_string());
        line
    }
}

#[async_trait]
impl Toolchain for CommandToolchain {
    async fn invoke(&self, invocation: &Invocation) -> ToolchainResult<ToolOutput> {
        let args = self.command_line(invocation);
        debug!("Running: {} {}", self.program, args.join(" "));

        let mut cmd = Command::new(&self.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        if let Some(dir) = &invocation.workdir {
            cmd.current_dir(dir);
        }

        let output = cmd.output().await.map_err(|source| ToolchainError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(ToolOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            output: text,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_command_line_order() {
        let toolchain = CommandToolchain::new("R", vec!["CMD".to_string()]);
        let invocation = Invocation::new("INSTALL", "/dl/teal_0.1.tar.gz").options(["-l", "/lib"]);

        assert_eq!(
            toolchain.command_line(&invocation),
            ["CMD", "INSTALL", "-l", "/lib", "/dl/teal_0.1.tar.gz"]
        );
    }

    #[tokio::test]
    async fn test_captures_output_and_status() {
        let echo = CommandToolchain::new("echo", vec![]);
        let out = echo
            .invoke(&Invocation::new("check", "pkg.tar.gz").options(["--no-manual"]))
            .await
            .unwrap();

        assert!(out.success);
        assert_eq!(out.exit_code, Some(0));
        assert_eq!(out.output, "check --no-manual pkg.tar.gz\n");
    }

    #[tokio::test]
    async fn test_failure_and_stderr() {
        let sh = CommandToolchain::new("sh", vec!["-c".to_string(), "echo out; echo err >&2; exit 3".to_string()]);
        let out = sh.invoke(&Invocation::new("verb", "artifact")).await.unwrap();

        assert!(!out.success);
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.output, "out\nerr\n");
    }

    #[tokio::test]
    async fn test_workdir_and_env() {
        let tmp = TempDir::new().unwrap();
        let sh = CommandToolchain::new("sh", vec!["-c".to_string(), "pwd; echo $PKG_LIBS".to_string()]);
        let out = sh
            .invoke(&Invocation::new("verb", "x").workdir(tmp.path()).env("PKG_LIBS", "/lib"))
            .await
            .unwrap();

        let canonical = tmp.path().canonicalize().unwrap();
        assert!(out.output.contains(&canonical.display().to_string()));
        assert!(out.output.ends_with("/lib\n"));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = CommandToolchain::new("/nonexistent/bin/R", vec![])
            .invoke(&Invocation::new("check", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolchainError::Spawn { .. }));
    }
}
