//! Engine adapter that shells out to the `docker` CLI (or a compatible
//! executable).

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use rack_common::error::EngineError;
use rack_common::types::{ContainerName, ImageTag, ProcessExit};
use serde::Deserialize;

use crate::{
    BuildOptions, ContainerEngine, Credentials, EngineResult, OutputStream, ProcessHandle, command,
};

/// Container engine driven through its command-line client.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: PathBuf,
}

impl DockerCli {
    /// Locates `engine` on `PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] if the executable cannot be found.
    pub fn locate(engine: &str) -> EngineResult<Self> {
        let binary = which::which(engine).map_err(|_| EngineError::NotFound {
            binary: engine.to_string(),
        })?;
        tracing::debug!(binary = %binary.display(), "container engine located");
        Ok(Self { binary })
    }

    /// Uses an explicit executable path.
    #[must_use]
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Path of the engine executable.
    #[must_use]
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn command_line(&self, args: &[String]) -> String {
        let program = self
            .binary
            .file_name()
            .map_or_else(|| self.binary.to_string_lossy(), |n| n.to_string_lossy());
        format!("{program} {}", command::render(args))
    }

    /// Runs a command with output passed through to the terminal.
    fn passthrough(&self, args: &[String]) -> EngineResult<()> {
        let line = self.command_line(args);
        tracing::info!(command = %line, "engine");

        let status = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .status()
            .map_err(|e| EngineError::Spawn {
                command: line.clone(),
                source: e,
            })?;

        let exit = ProcessExit::from(status);
        if exit.success() {
            Ok(())
        } else {
            Err(EngineError::Failed {
                command: line,
                exit,
            })
        }
    }

    /// Runs a command and returns its stdout.
    fn capture(&self, args: &[String]) -> EngineResult<Vec<u8>> {
        let line = self.command_line(args);
        tracing::debug!(command = %line, "engine");

        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| EngineError::Spawn {
                command: line.clone(),
                source: e,
            })?;

        let exit = ProcessExit::from(output.status);
        if !exit.success() {
            tracing::debug!(
                command = %line,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "engine command failed"
            );
            return Err(EngineError::Failed {
                command: line,
                exit,
            });
        }
        Ok(output.stdout)
    }
}

/// Subset of `inspect` output the adapter reads.
#[derive(Debug, Deserialize)]
struct InspectEntry {
    #[serde(rename = "Config", default)]
    config: InspectConfig,
}

#[derive(Debug, Default, Deserialize)]
struct InspectConfig {
    #[serde(rename = "Env", default)]
    env: Option<Vec<String>>,
}

/// Parses the environment out of `inspect` JSON.
pub(crate) fn parse_inspect_env(json: &[u8]) -> Result<BTreeMap<String, String>, String> {
    let entries: Vec<InspectEntry> = serde_json::from_slice(json).map_err(|e| e.to_string())?;
    let entry = entries
        .into_iter()
        .next()
        .ok_or_else(|| "no image metadata returned".to_string())?;
    Ok(crate::env_map(entry.config.env.unwrap_or_default()))
}

impl ContainerEngine for DockerCli {
    fn build(&self, context: &Path, tag: &ImageTag, options: &BuildOptions) -> EngineResult<()> {
        self.passthrough(&command::build(context, tag, options))
    }

    fn pull(&self, image: &str) -> EngineResult<()> {
        self.passthrough(&command::pull(image))
    }

    fn tag(&self, from: &str, to: &str) -> EngineResult<()> {
        let _ = self.capture(&command::tag(from, to))?;
        Ok(())
    }

    fn push(&self, local: &str, remote: &str) -> EngineResult<()> {
        self.tag(local, remote)?;
        self.passthrough(&command::push(remote))
    }

    fn login(&self, registry: &str, credentials: &Credentials) -> EngineResult<()> {
        self.passthrough(&command::login(registry, credentials))
    }

    fn inspect_image(&self, image: &str) -> EngineResult<BTreeMap<String, String>> {
        let args = command::inspect(image);
        let stdout = self.capture(&args)?;
        parse_inspect_env(&stdout).map_err(|message| EngineError::Output {
            command: self.command_line(&args),
            message,
        })
    }

    fn run(&self, args: &[String]) -> EngineResult<Box<dyn ProcessHandle>> {
        let args = command::run(args);
        let line = self.command_line(&args);
        tracing::info!(command = %line, "engine");

        let child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EngineError::Spawn {
                command: line,
                source: e,
            })?;

        Ok(Box::new(DockerProcess { child }))
    }

    fn kill(&self, name: &ContainerName) -> EngineResult<()> {
        let _ = self.capture(&command::kill(name))?;
        Ok(())
    }

    fn remove_force(&self, name: &ContainerName) -> EngineResult<()> {
        let _ = self.capture(&command::remove_force(name))?;
        Ok(())
    }
}

/// A `run` child process.
#[derive(Debug)]
struct DockerProcess {
    child: Child,
}

impl ProcessHandle for DockerProcess {
    fn take_stdout(&mut self) -> Option<OutputStream> {
        self.child
            .stdout
            .take()
            .map(|s| Box::new(s) as OutputStream)
    }

    fn take_stderr(&mut self) -> Option<OutputStream> {
        self.child
            .stderr
            .take()
            .map(|s| Box::new(s) as OutputStream)
    }

    fn wait(&mut self) -> io::Result<ProcessExit> {
        self.child.wait().map(ProcessExit::from)
    }
}
