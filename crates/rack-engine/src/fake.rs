//! Recording fake of the container engine for tests.
//!
//! Every call is recorded as its rendered command line (without the engine
//! executable), for example `run -i --name app-web ... app/web` or
//! `kill app-web`. Container output and exit codes are scripted per
//! container name, and containers can be held "running" until killed.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{self, Cursor};
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rack_common::error::EngineError;
use rack_common::types::{ContainerName, ImageTag, ProcessExit};

use crate::{
    BuildOptions, ContainerEngine, Credentials, EngineResult, OutputStream, ProcessHandle, command,
};

/// Exit code reported for a container stopped by `kill`.
pub const KILLED_EXIT_CODE: i32 = 137;

/// Scripted behavior of one container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerScript {
    /// Lines written to stdout.
    pub stdout: Vec<String>,
    /// Lines written to stderr.
    pub stderr: Vec<String>,
    /// Exit code when not held.
    pub exit_code: i32,
    /// Keep running until killed.
    pub hold: bool,
}

impl ContainerScript {
    /// A container that exits immediately with `code`.
    #[must_use]
    pub fn exit(code: i32) -> Self {
        Self {
            exit_code: code,
            ..Self::default()
        }
    }

    /// A container that runs until killed.
    #[must_use]
    pub fn held() -> Self {
        Self {
            hold: true,
            ..Self::default()
        }
    }

    /// Adds a stdout line.
    #[must_use]
    pub fn stdout(mut self, line: &str) -> Self {
        self.stdout.push(line.to_string());
        self
    }

    /// Adds a stderr line.
    #[must_use]
    pub fn stderr(mut self, line: &str) -> Self {
        self.stderr.push(line.to_string());
        self
    }
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<String>,
    scripts: HashMap<String, ContainerScript>,
    default_script: ContainerScript,
    failures: Vec<String>,
    image_env: HashMap<String, BTreeMap<String, String>>,
    killed: HashSet<String>,
    started: usize,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-memory [`ContainerEngine`] that records calls.
#[derive(Debug, Clone, Default)]
pub struct RecordingEngine {
    shared: Arc<Shared>,
}

impl RecordingEngine {
    /// An engine whose containers exit 0 immediately unless scripted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine whose unscripted containers run until killed.
    #[must_use]
    pub fn holding() -> Self {
        let engine = Self::new();
        engine.shared.lock().default_script = ContainerScript::held();
        engine
    }

    /// Scripts the container named `container`.
    pub fn script(&self, container: &str, script: ContainerScript) {
        let _ = self
            .shared
            .lock()
            .scripts
            .insert(container.to_string(), script);
    }

    /// Makes every call whose command line starts with `prefix` fail with
    /// exit code 1.
    pub fn fail_when(&self, prefix: &str) {
        self.shared.lock().failures.push(prefix.to_string());
    }

    /// Sets the configured environment returned by `inspect_image`.
    pub fn set_image_env(&self, image: &str, env: BTreeMap<String, String>) {
        let _ = self
            .shared
            .lock()
            .image_env
            .insert(image.to_string(), env);
    }

    /// Every recorded command line, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.shared.lock().calls.clone()
    }

    /// Recorded command lines of one verb (`run`, `kill`, `tag`, ...).
    #[must_use]
    pub fn calls_of(&self, verb: &str) -> Vec<String> {
        let prefix = format!("{verb} ");
        self.shared
            .lock()
            .calls
            .iter()
            .filter(|c| c.starts_with(&prefix))
            .cloned()
            .collect()
    }

    /// Waits until at least `count` containers have been started.
    #[must_use]
    pub fn wait_for_started(&self, count: usize, timeout: Duration) -> bool {
        let guard = self.shared.lock();
        let (guard, _) = self
            .shared
            .changed
            .wait_timeout_while(guard, timeout, |s| s.started < count)
            .unwrap_or_else(PoisonError::into_inner);
        guard.started >= count
    }

    fn record(&self, args: &[String]) -> EngineResult<()> {
        let line = command::render(args);
        let mut state = self.shared.lock();
        state.calls.push(line.clone());
        if state.failures.iter().any(|p| line.starts_with(p.as_str())) {
            return Err(EngineError::Failed {
                command: line,
                exit: ProcessExit::from_code(1),
            });
        }
        Ok(())
    }
}

impl ContainerEngine for RecordingEngine {
    fn build(&self, context: &Path, tag: &ImageTag, options: &BuildOptions) -> EngineResult<()> {
        self.record(&command::build(context, tag, options))
    }

    fn pull(&self, image: &str) -> EngineResult<()> {
        self.record(&command::pull(image))
    }

    fn tag(&self, from: &str, to: &str) -> EngineResult<()> {
        self.record(&command::tag(from, to))
    }

    fn push(&self, local: &str, remote: &str) -> EngineResult<()> {
        self.tag(local, remote)?;
        self.record(&command::push(remote))
    }

    fn login(&self, registry: &str, credentials: &Credentials) -> EngineResult<()> {
        self.record(&command::login(registry, credentials))
    }

    fn inspect_image(&self, image: &str) -> EngineResult<BTreeMap<String, String>> {
        self.record(&command::inspect(image))?;
        Ok(self
            .shared
            .lock()
            .image_env
            .get(image)
            .cloned()
            .unwrap_or_default())
    }

    fn run(&self, args: &[String]) -> EngineResult<Box<dyn ProcessHandle>> {
        self.record(&command::run(args))?;

        let name = args
            .iter()
            .position(|a| a == "--name")
            .and_then(|i| args.get(i + 1))
            .cloned()
            .unwrap_or_default();

        let script = {
            let mut state = self.shared.lock();
            state.started += 1;
            state
                .scripts
                .get(&name)
                .unwrap_or(&state.default_script)
                .clone()
        };
        self.shared.changed.notify_all();

        Ok(Box::new(FakeProcess {
            shared: Arc::clone(&self.shared),
            stdout: Some(lines(&script.stdout)),
            stderr: Some(lines(&script.stderr)),
            name,
            script,
        }))
    }

    fn kill(&self, name: &ContainerName) -> EngineResult<()> {
        self.record(&command::kill(name))?;
        let _ = self.shared.lock().killed.insert(name.to_string());
        self.shared.changed.notify_all();
        Ok(())
    }

    fn remove_force(&self, name: &ContainerName) -> EngineResult<()> {
        self.record(&command::remove_force(name))
    }
}

fn lines(lines: &[String]) -> Cursor<Vec<u8>> {
    let mut bytes = Vec::new();
    for line in lines {
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
    }
    Cursor::new(bytes)
}

struct FakeProcess {
    shared: Arc<Shared>,
    name: String,
    script: ContainerScript,
    stdout: Option<Cursor<Vec<u8>>>,
    stderr: Option<Cursor<Vec<u8>>>,
}

impl ProcessHandle for FakeProcess {
    fn take_stdout(&mut self) -> Option<OutputStream> {
        self.stdout.take().map(|s| Box::new(s) as OutputStream)
    }

    fn take_stderr(&mut self) -> Option<OutputStream> {
        self.stderr.take().map(|s| Box::new(s) as OutputStream)
    }

    fn wait(&mut self) -> io::Result<ProcessExit> {
        if !self.script.hold {
            return Ok(ProcessExit::from_code(self.script.exit_code));
        }
        let guard = self.shared.lock();
        let _guard = self
            .shared
            .changed
            .wait_while(guard, |s| !s.killed.contains(&self.name))
            .unwrap_or_else(PoisonError::into_inner);
        Ok(ProcessExit::from_code(KILLED_EXIT_CODE))
    }
}
