//! Argument vectors of engine commands.
//!
//! The shapes here are the engine contract:
//!
//! ```text
//! build -t <tag> [--pull --no-cache] [-f <context>/<dockerfile>] <context>
//! pull <image>
//! tag -f <from> <to>
//! push <remote>
//! login -e <email> -u <user> -p <password> <registry>
//! inspect <image>
//! kill <name>
//! rm -f <name>
//! ```

use std::path::Path;

use rack_common::types::{ContainerName, ImageTag};

use crate::{BuildOptions, Credentials};

const REDACTED: &str = "********";

fn owned<const N: usize>(args: [&str; N]) -> Vec<String> {
    args.iter().map(ToString::to_string).collect()
}

/// `build` arguments.
#[must_use]
pub fn build(context: &Path, tag: &ImageTag, options: &BuildOptions) -> Vec<String> {
    let mut args = owned(["build", "-t", tag.as_str()]);
    if options.no_cache {
        args.extend(owned(["--pull", "--no-cache"]));
    }
    if let Some(dockerfile) = &options.dockerfile {
        args.push("-f".into());
        args.push(context.join(dockerfile).to_string_lossy().into_owned());
    }
    args.push(context.to_string_lossy().into_owned());
    args
}

/// `pull` arguments.
#[must_use]
pub fn pull(image: &str) -> Vec<String> {
    owned(["pull", image])
}

/// `tag` arguments; `-f` replaces an existing target.
#[must_use]
pub fn tag(from: &str, to: &str) -> Vec<String> {
    owned(["tag", "-f", from, to])
}

/// `push` arguments.
#[must_use]
pub fn push(remote: &str) -> Vec<String> {
    owned(["push", remote])
}

/// `login` arguments.
#[must_use]
pub fn login(registry: &str, credentials: &Credentials) -> Vec<String> {
    owned([
        "login",
        "-e",
        &credentials.email,
        "-u",
        &credentials.username,
        "-p",
        &credentials.password,
        registry,
    ])
}

/// `inspect` arguments.
#[must_use]
pub fn inspect(image: &str) -> Vec<String> {
    owned(["inspect", image])
}

/// `kill` arguments.
#[must_use]
pub fn kill(name: &ContainerName) -> Vec<String> {
    owned(["kill", name.as_str()])
}

/// `rm -f` arguments.
#[must_use]
pub fn remove_force(name: &ContainerName) -> Vec<String> {
    owned(["rm", "-f", name.as_str()])
}

/// Prepends `run` to materialized run arguments.
#[must_use]
pub fn run(args: &[String]) -> Vec<String> {
    std::iter::once("run".to_string())
        .chain(args.iter().cloned())
        .collect()
}

/// Joins arguments into a printable command line, masking the value that
/// follows `-p` in a `login` invocation.
#[must_use]
pub fn render(args: &[String]) -> String {
    let is_login = args.first().is_some_and(|a| a == "login");
    let mut rendered = Vec::with_capacity(args.len());
    let mut mask_next = false;
    for arg in args {
        if mask_next {
            rendered.push(REDACTED);
            mask_next = false;
            continue;
        }
        mask_next = is_login && arg == "-p";
        rendered.push(arg.as_str());
    }
    rendered.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_without_options() {
        let args = build(Path::new("/src/app"), &ImageTag::new("abcdefghij"), &BuildOptions::default());
        assert_eq!(render(&args), "build -t abcdefghij /src/app");
    }

    #[test]
    fn build_without_cache_uses_alternate_dockerfile() {
        let options = BuildOptions {
            no_cache: true,
            dockerfile: Some("Dockerfile.dev".into()),
        };
        let args = build(Path::new("/src/app"), &ImageTag::new("t"), &options);
        assert_eq!(
            render(&args),
            "build -t t --pull --no-cache -f /src/app/Dockerfile.dev /src/app"
        );
    }

    #[test]
    fn tag_forces_replacement() {
        assert_eq!(render(&tag("abc", "app/web")), "tag -f abc app/web");
    }

    #[test]
    fn container_commands() {
        let name = ContainerName::for_service("app", "web");
        assert_eq!(render(&kill(&name)), "kill app-web");
        assert_eq!(render(&remove_force(&name)), "rm -f app-web");
        assert_eq!(render(&run(&["-i".into()])), "run -i");
    }

    #[test]
    fn login_password_is_masked_when_rendered() {
        let creds = Credentials {
            email: "me@example.com".into(),
            username: "me".into(),
            password: "hunter2".into(),
        };
        let args = login("registry.example.com", &creds);
        assert_eq!(args[6], "hunter2");
        assert_eq!(
            render(&args),
            "login -e me@example.com -u me -p ******** registry.example.com"
        );
    }

    #[test]
    fn run_port_flag_is_not_masked() {
        let args = run(&["-p".into(), "5000:3000".into()]);
        assert_eq!(render(&args), "run -p 5000:3000");
    }
}
