//! Materialized `run` arguments of a service container.
//!
//! Order: `-i --name`, `-e` entries, `--privileged`, `--link`, `-p`, `-v`,
//! `--entrypoint`, the canonical image, then the command.

use rack_common::error::RuntimeError;
use rack_common::types::{ContainerName, ImageTag};
use rack_manifest::env::ResolvedVar;
use rack_manifest::ports::PortMapping;
use rack_manifest::{Service, ServiceCommand};

/// Renders the arguments following `run` for `service` of `app`.
///
/// `shift` is the effective host port shift of this service.
///
/// # Errors
///
/// Returns [`RuntimeError::InvalidPort`] for a port declaration that is
/// neither `container` nor `host:container`, or whose shifted host port
/// is out of range.
pub fn run_args(
    app: &str,
    service: &Service,
    env: &[ResolvedVar],
    shift: i32,
) -> Result<Vec<String>, RuntimeError> {
    let name = ContainerName::for_service(app, &service.name);
    let mut args = vec!["-i".to_string(), "--name".to_string(), name.to_string()];

    for var in env {
        args.push("-e".into());
        args.push(var.to_string());
    }

    if service.privileged {
        args.push("--privileged".into());
    }

    for link in &service.links {
        args.push("--link".into());
        args.push(format!(
            "{}:{}",
            ContainerName::for_service(app, &link.target),
            link.alias
        ));
    }

    for port in &service.ports {
        let mapping = PortMapping::parse(port)
            .and_then(|m| m.shifted(shift))
            .ok_or_else(|| RuntimeError::InvalidPort {
                service: service.name.clone(),
                port: port.clone(),
            })?;
        args.push("-p".into());
        args.push(mapping.to_string());
    }

    for volume in &service.volumes {
        args.push("-v".into());
        args.push(volume.clone());
    }

    if let Some(entrypoint) = &service.entrypoint {
        args.push("--entrypoint".into());
        args.push(entrypoint.clone());
    }

    args.push(ImageTag::canonical(app, &service.name).to_string());

    match &service.command {
        ServiceCommand::None => {}
        ServiceCommand::Shell(cmd) => {
            args.push("sh".into());
            args.push("-c".into());
            args.push(cmd.clone());
        }
        ServiceCommand::Argv(argv) => args.extend(argv.iter().cloned()),
    }

    Ok(args)
}
