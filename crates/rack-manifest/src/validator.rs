//! Static validation of a normalized manifest.
//!
//! Checks service names and link targets before anything is built or
//! started. The `build` XOR `image` rule is enforced while normalizing,
//! since [`ImageSource`](crate::model::ImageSource) cannot express a
//! violation.

use rack_common::error::LoadError;

use crate::model::Manifest;

/// Validates a manifest for semantic correctness.
///
/// # Checks performed
///
/// 1. At least one service is declared.
/// 2. Every service name is non-empty and matches `[A-Za-z0-9_-]+`.
/// 3. Every link names a declared service and has a non-empty alias.
///
/// # Errors
///
/// Returns [`LoadError::Invalid`] describing the first violation found.
pub fn validate(manifest: &Manifest) -> Result<(), LoadError> {
    tracing::debug!(services = manifest.len(), "validating manifest");
    check_not_empty(manifest)?;
    check_service_names(manifest)?;
    check_link_targets(manifest)?;
    Ok(())
}

/// Returns whether `name` is acceptable as a service name.
#[must_use]
pub fn is_valid_service_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn invalid(detail: String) -> LoadError {
    LoadError::Invalid { detail }
}

fn check_not_empty(manifest: &Manifest) -> Result<(), LoadError> {
    if manifest.is_empty() {
        return Err(invalid("no services defined".into()));
    }
    Ok(())
}

fn check_service_names(manifest: &Manifest) -> Result<(), LoadError> {
    for name in manifest.names() {
        if !is_valid_service_name(name) {
            return Err(invalid(format!(
                "service name {name:?} is invalid: use only letters, digits, '_' and '-'"
            )));
        }
    }
    Ok(())
}

fn check_link_targets(manifest: &Manifest) -> Result<(), LoadError> {
    for service in manifest.services() {
        for link in &service.links {
            if manifest.service(&link.target).is_none() {
                return Err(invalid(format!(
                    "service {} links to undefined service {:?}",
                    service.name, link.target
                )));
            }
            if link.alias.is_empty() {
                return Err(invalid(format!(
                    "service {} has an empty alias for link {:?}",
                    service.name, link.target
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::loader::parse_str;

    fn parse(yaml: &str) -> Result<Manifest, LoadError> {
        parse_str(Path::new("/app"), yaml)
    }

    #[test]
    fn valid_names() {
        assert!(is_valid_service_name("web"));
        assert!(is_valid_service_name("worker_1"));
        assert!(is_valid_service_name("web-2"));
        assert!(!is_valid_service_name(""));
        assert!(!is_valid_service_name("web.1"));
        assert!(!is_valid_service_name("my service"));
    }

    #[test]
    fn valid_manifest_succeeds() {
        let manifest = parse("web:\n  build: .\n  links:\n    - db\ndb:\n  image: postgres\n");
        assert!(manifest.is_ok(), "got: {manifest:?}");
    }

    #[test]
    fn undefined_link_target_fails() {
        let err = parse("web:\n  build: .\n  links:\n    - ghost\n").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("ghost"), "got: {msg}");
    }

    #[test]
    fn aliased_link_resolves_target() {
        let manifest = parse("web:\n  build: .\n  links:\n    - db:database\ndb:\n  image: pg\n");
        assert!(manifest.is_ok(), "got: {manifest:?}");
    }

    #[test]
    fn empty_alias_fails() {
        let err = parse("web:\n  build: .\n  links:\n    - 'db:'\ndb:\n  image: pg\n").unwrap_err();
        assert!(err.to_string().contains("empty alias"), "got: {err}");
    }

    #[test]
    fn invalid_service_name_fails() {
        let err = parse("web.1:\n  image: nginx\n").unwrap_err();
        assert!(err.to_string().contains("web.1"), "got: {err}");
    }

    #[test]
    fn empty_manifest_fails() {
        let err = parse("{}\n").unwrap_err();
        assert!(err.to_string().contains("no services"), "got: {err}");
    }
}
