//! Runtime driver: one container per service, from spawn to exit.

use std::thread;

use rack_common::error::RuntimeError;
use rack_common::types::ContainerName;
use rack_engine::{ContainerEngine, ProcessHandle};
use rack_manifest::Service;
use rack_manifest::env::ResolvedVar;

use crate::args::run_args;
use crate::output::Prefix;

/// Removes any stale container of the same name, then starts `run <args>`.
///
/// # Errors
///
/// Returns [`RuntimeError::Spawn`] if the engine cannot start the
/// container.
pub fn start(
    engine: &dyn ContainerEngine,
    service: &str,
    name: &ContainerName,
    args: &[String],
) -> Result<Box<dyn ProcessHandle>, RuntimeError> {
    if let Err(e) = engine.remove_force(name) {
        tracing::debug!(container = %name, error = %e, "no stale container removed");
    }
    engine.run(args).map_err(|e| RuntimeError::Spawn {
        service: service.to_string(),
        source: e,
    })
}

/// Streams the container's stdout and stderr through `prefix` and blocks
/// until it exits.
///
/// # Errors
///
/// Returns [`RuntimeError::Stream`] for an I/O error on either stream and
/// [`RuntimeError::Exited`] for an unsuccessful exit.
pub fn supervise(
    mut handle: Box<dyn ProcessHandle>,
    prefix: &Prefix,
    service: &str,
) -> Result<(), RuntimeError> {
    let stdout = handle.take_stdout();
    let stderr = handle.take_stderr();

    let streamed = thread::scope(|scope| {
        let err_task = stderr.map(|stream| scope.spawn(move || prefix.stream(stream)));
        let out_result = stdout.map_or(Ok(()), |stream| prefix.stream(stream));
        let err_result = err_task.map_or(Ok(()), |task| {
            task.join()
                .unwrap_or_else(|_| Err(std::io::Error::other("stderr reader panicked")))
        });
        out_result.and(err_result)
    });

    let exit = handle.wait().map_err(|e| RuntimeError::Stream {
        service: service.to_string(),
        source: e,
    })?;

    streamed.map_err(|e| RuntimeError::Stream {
        service: service.to_string(),
        source: e,
    })?;

    if exit.success() {
        tracing::debug!(service, "container exited cleanly");
        Ok(())
    } else {
        Err(RuntimeError::Exited {
            service: service.to_string(),
            exit,
        })
    }
}

/// Runs `service` of `app` to completion: renders its invocation, starts
/// the container and streams its output.
///
/// # Errors
///
/// Returns any error of [`run_args`], [`start`] or [`supervise`].
pub fn run_service(
    engine: &dyn ContainerEngine,
    prefix: &Prefix,
    app: &str,
    service: &Service,
    env: &[ResolvedVar],
    shift: i32,
) -> Result<(), RuntimeError> {
    let args = run_args(app, service, env, shift)?;
    let name = ContainerName::for_service(app, &service.name);
    let handle = start(engine, &service.name, &name, &args)?;
    supervise(handle, prefix, &service.name)
}
