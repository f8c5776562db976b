//! Wire shapes of `docker-compose.yml` as written by users.
//!
//! Several fields accept more than one YAML shape. They decode into the
//! untagged enums below and are canonicalized by the loader; nothing outside
//! this crate sees these types.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

/// Services keyed by name, the v1 top-level shape.
pub(crate) type RawServices = BTreeMap<String, RawService>;

/// Just enough of the document to tell a v1 file from a v2 envelope.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawProbe {
    pub version: Option<serde_yaml::Value>,
}

impl RawProbe {
    /// A scalar `version` key marks the v2 envelope; a mapping under that
    /// key is a v1 service that happens to be called `version`.
    pub fn is_v2(&self) -> bool {
        matches!(
            self.version,
            Some(serde_yaml::Value::String(_) | serde_yaml::Value::Number(_))
        )
    }
}

/// The v2 envelope: `version` plus a `services` mapping.
#[derive(Debug, Deserialize)]
pub(crate) struct RawComposeV2 {
    #[allow(dead_code)]
    pub version: serde_yaml::Value,
    #[serde(default)]
    pub services: RawServices,
}

/// A single service entry.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawService {
    pub build: Option<RawBuild>,
    pub dockerfile: Option<String>,
    pub image: Option<String>,
    pub command: Option<RawCommand>,
    pub entrypoint: Option<String>,
    pub environment: Option<RawKeyValues>,
    pub labels: Option<RawKeyValues>,
    pub links: Vec<String>,
    pub ports: Vec<Scalar>,
    pub privileged: bool,
    pub volumes: Vec<String>,
}

/// `build: path` or `build: { context, dockerfile }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawBuild {
    Path(String),
    Detailed {
        context: String,
        #[serde(default)]
        dockerfile: Option<String>,
    },
}

/// `command: "shell string"` or `command: [argv, tokens]`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawCommand {
    Shell(String),
    Argv(Vec<Scalar>),
}

/// `environment` and `labels` accept a mapping or a list of `K[=V]`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawKeyValues {
    Map(BTreeMap<String, Option<Scalar>>),
    List(Vec<String>),
}

/// A YAML scalar whose type the user did not pin down.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum Scalar {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_polymorphic_fields() {
        let yaml = r"
web:
  build: .
  command: bin/web --port 3000
  environment:
    RACK_ENV: development
    SECRET:
  ports:
    - 5000
    - 5001:3001
worker:
  build:
    context: ./worker
    dockerfile: Dockerfile.dev
  command: [bin/worker, 2]
  environment:
    - QUEUE
    - LEVEL=debug
";
        let services: RawServices = serde_yaml::from_str(yaml).expect("decode");
        let web = &services["web"];
        assert!(matches!(web.build, Some(RawBuild::Path(ref p)) if p == "."));
        assert!(matches!(web.command, Some(RawCommand::Shell(_))));
        assert!(matches!(web.ports[0], Scalar::Int(5000)));
        assert!(matches!(web.ports[1], Scalar::Text(ref s) if s == "5001:3001"));
        match web.environment {
            Some(RawKeyValues::Map(ref map)) => assert!(map["SECRET"].is_none()),
            ref other => panic!("unexpected environment: {other:?}"),
        }

        let worker = &services["worker"];
        assert!(matches!(
            worker.build,
            Some(RawBuild::Detailed { ref dockerfile, .. }) if dockerfile.as_deref() == Some("Dockerfile.dev")
        ));
        assert!(matches!(worker.command, Some(RawCommand::Argv(ref argv)) if argv.len() == 2));
        assert!(matches!(worker.environment, Some(RawKeyValues::List(ref l)) if l.len() == 2));
    }

    #[test]
    fn probe_detects_v2_envelope() {
        let probe: RawProbe = serde_yaml::from_str("version: '2'\nservices: {}\n").expect("probe");
        assert!(probe.is_v2());

        let probe: RawProbe = serde_yaml::from_str("web:\n  image: nginx\n").expect("probe");
        assert!(!probe.is_v2());

        let probe: RawProbe =
            serde_yaml::from_str("version:\n  image: busybox\n").expect("probe");
        assert!(!probe.is_v2());
    }

    #[test]
    fn unknown_service_keys_are_ignored() {
        let services: RawServices =
            serde_yaml::from_str("db:\n  image: postgres\n  mem_limit: 512m\n").expect("decode");
        assert_eq!(services["db"].image.as_deref(), Some("postgres"));
    }
}
