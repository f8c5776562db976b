//! End-to-end integration tests for the rack lifecycle.
//!
//! These tests drive the full pipeline against the recording engine:
//! 1. Load a manifest from disk (`.env`, volume expansion)
//! 2. Resolve start order and environment
//! 3. Plan and execute builds, pulls, and retags
//! 4. Launch, stream, and supervise containers
//! 5. Tear down on interrupt in reverse start order

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::fs;
use std::path::Path;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use rack_build::{BuildPlan, ExecuteOptions, RetryPolicy};
use rack_common::error::{ConfigError, RackError, RuntimeError};
use rack_engine::fake::{ContainerScript, RecordingEngine};
use rack_manifest::env::ProcessEnv;
use rack_runtime::{OutputMux, StartOptions};

fn write_manifest(dir: &Path, yaml: &str) {
    fs::write(dir.join("docker-compose.yml"), yaml).expect("write manifest");
}

fn options(app: &str) -> StartOptions {
    StartOptions {
        app: app.into(),
        build: true,
        use_cache: true,
        shift: 0,
        launch_spacing: Duration::from_millis(5),
        retry: RetryPolicy::once(),
        probe_host: None,
    }
}

fn quiet() -> OutputMux {
    OutputMux::new(std::io::sink(), 8, false)
}

// ── Ordering ─────────────────────────────────────────────────────────

#[test]
fn start_order_puts_dependencies_first() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_manifest(
        dir.path(),
        "web:\n  image: app\n  links: [postgres, redis]\n\
         worker_1:\n  image: app\n  links: [postgres, redis]\n\
         worker_2:\n  image: app\n  links: [postgres, redis]\n\
         postgres:\n  image: postgres\n\
         redis:\n  image: redis\n",
    );
    let manifest = rack_manifest::load(dir.path()).expect("load");

    let order = rack_manifest::graph::start_order(&manifest).expect("order");
    assert_eq!(order, vec!["postgres", "redis", "web", "worker_1", "worker_2"]);

    let engine = RecordingEngine::new();
    let (_tx, rx) = mpsc::channel();
    let errors = rack_runtime::start(
        &engine,
        &manifest,
        &options("app"),
        &ProcessEnv::default(),
        quiet(),
        rx,
    );
    assert!(errors.is_empty(), "{errors:?}");

    let launched: Vec<String> = engine
        .calls_of("run")
        .iter()
        .map(|c| c.split_whitespace().nth(3).unwrap().to_string())
        .collect();
    assert_eq!(
        launched,
        vec!["app-postgres", "app-redis", "app-web", "app-worker_1", "app-worker_2"]
    );
}

// ── Builds ───────────────────────────────────────────────────────────

#[test]
fn shared_context_builds_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_manifest(
        dir.path(),
        "a:\n  build: .\nb:\n  build: .\nc:\n  image: convox/redis\n",
    );
    let manifest = rack_manifest::load(dir.path()).expect("load");
    let engine = RecordingEngine::new();

    let plan = BuildPlan::new(&manifest, "app").expect("plan");
    plan.execute(&engine, &ExecuteOptions::default()).expect("execute");

    assert_eq!(engine.calls_of("build").len(), 1);
    assert_eq!(engine.calls_of("pull"), vec!["pull convox/redis"]);
    let tags = engine.calls_of("tag");
    let group_tag = plan.builds[0].tag.to_string();
    assert_eq!(
        tags,
        vec![
            format!("tag -f {group_tag} app/a"),
            format!("tag -f {group_tag} app/b"),
            "tag -f convox/redis app/c".to_string(),
        ]
    );
}

#[cfg(unix)]
#[test]
fn symlinked_contexts_share_one_build() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::create_dir(dir.path().join("src")).expect("mkdir");
    std::os::unix::fs::symlink(dir.path().join("src"), dir.path().join("alias")).expect("symlink");
    write_manifest(dir.path(), "a:\n  build: ./src\nb:\n  build: ./alias\n");
    let manifest = rack_manifest::load(dir.path()).expect("load");
    let engine = RecordingEngine::new();

    let plan = BuildPlan::new(&manifest, "app").expect("plan");
    plan.execute(&engine, &ExecuteOptions::default()).expect("execute");

    assert_eq!(plan.builds.len(), 1);
    assert_eq!(plan.builds[0].services, vec!["a", "b"]);
    assert_eq!(engine.calls_of("build").len(), 1);
    assert_eq!(engine.calls_of("tag").len(), 2);
}

// ── Environment ──────────────────────────────────────────────────────

#[test]
fn missing_environment_starts_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_manifest(dir.path(), "web:\n  image: x\n  environment: [RACK_E2E_UNSET_FOO]\n");
    let manifest = rack_manifest::load(dir.path()).expect("load");
    let engine = RecordingEngine::new();
    let (_tx, rx) = mpsc::channel();

    let errors = rack_runtime::start(
        &engine,
        &manifest,
        &options("app"),
        &ProcessEnv::capture(&manifest),
        quiet(),
        rx,
    );

    match &errors[..] {
        [RackError::Config(ConfigError::MissingEnvironment { names })] => {
            assert_eq!(names, &["RACK_E2E_UNSET_FOO"]);
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert!(engine.calls_of("run").is_empty());
}

#[test]
fn dotenv_values_reach_the_container() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_manifest(dir.path(), "web:\n  image: x\n  environment: [RACK_E2E_TOKEN]\n");
    fs::write(dir.path().join(".env"), "RACK_E2E_TOKEN=\"abc\"\n").expect("write .env");
    let manifest = rack_manifest::load(dir.path()).expect("load");
    let engine = RecordingEngine::new();
    let (_tx, rx) = mpsc::channel();

    let errors = rack_runtime::start(
        &engine,
        &manifest,
        &options("app"),
        &ProcessEnv::capture(&manifest),
        quiet(),
        rx,
    );

    assert!(errors.is_empty(), "{errors:?}");
    assert!(engine.calls_of("run")[0].contains("-e RACK_E2E_TOKEN=abc"));
}

// ── Invocation ───────────────────────────────────────────────────────

#[test]
fn ports_render_in_both_forms() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_manifest(
        dir.path(),
        "api:\n  image: x\n  ports: [\"5000:3000\"]\nweb:\n  image: y\n  ports: [\"3000\"]\n",
    );
    let manifest = rack_manifest::load(dir.path()).expect("load");
    let engine = RecordingEngine::new();
    let (_tx, rx) = mpsc::channel();

    let errors = rack_runtime::start(
        &engine,
        &manifest,
        &options("app"),
        &ProcessEnv::default(),
        quiet(),
        rx,
    );

    assert!(errors.is_empty(), "{errors:?}");
    let runs = engine.calls_of("run");
    assert!(runs[0].contains("-p 5000:3000"), "{}", runs[0]);
    assert!(runs[1].contains("-p 3000:3000"), "{}", runs[1]);
}

#[test]
fn relative_volumes_are_absolutized() {
    let manifest = rack_manifest::parse_str(
        Path::new("/x/y"),
        "web:\n  image: x\n  volumes: [\"./data:/var/data\"]\n",
    )
    .expect("parse");
    let engine = RecordingEngine::new();
    let (_tx, rx) = mpsc::channel();

    let errors = rack_runtime::start(
        &engine,
        &manifest,
        &options("app"),
        &ProcessEnv::default(),
        quiet(),
        rx,
    );

    assert!(errors.is_empty(), "{errors:?}");
    assert!(engine.calls_of("run")[0].contains("-v /x/y/data:/var/data"));
}

// ── Supervision ──────────────────────────────────────────────────────

#[test]
fn interrupt_kills_in_reverse_start_order() {
    let manifest = rack_manifest::parse_str(
        Path::new("/app"),
        "a:\n  image: x\n  links: [b]\nb:\n  image: y\n",
    )
    .expect("parse");
    let engine = RecordingEngine::holding();
    let (tx, rx) = mpsc::channel();

    let errors = thread::scope(|s| {
        let run = s.spawn(|| {
            rack_runtime::start(
                &engine,
                &manifest,
                &options("app"),
                &ProcessEnv::default(),
                quiet(),
                rx,
            )
        });
        assert!(engine.wait_for_started(2, Duration::from_secs(10)));
        tx.send(()).expect("signal");
        run.join().expect("supervisor thread")
    });

    assert!(matches!(errors[..], [RackError::Interrupted]), "{errors:?}");

    let calls = engine.calls();
    let lifecycle: Vec<&str> = calls
        .iter()
        .map(String::as_str)
        .filter(|c| c.starts_with("run ") || c.starts_with("kill "))
        .collect();
    assert_eq!(lifecycle.len(), 4);
    assert!(lifecycle[0].contains("--name app-b"));
    assert!(lifecycle[1].contains("--name app-a"));
    assert_eq!(lifecycle[2..], ["kill app-a", "kill app-b"]);
}

#[test]
fn failure_before_interrupt_is_still_reported() {
    let manifest = rack_manifest::parse_str(
        Path::new("/app"),
        "a:\n  image: x\nb:\n  image: y\nc:\n  image: z\n",
    )
    .expect("parse");
    let engine = RecordingEngine::holding();
    engine.script("app-b", ContainerScript::exit(1).stderr("crashed"));
    let (tx, rx) = mpsc::channel();
    let options = StartOptions {
        launch_spacing: Duration::from_millis(1500),
        ..options("app")
    };

    let errors = thread::scope(|s| {
        let run = s.spawn(|| {
            rack_runtime::start(
                &engine,
                &manifest,
                &options,
                &ProcessEnv::default(),
                quiet(),
                rx,
            )
        });
        assert!(engine.wait_for_started(2, Duration::from_secs(10)));
        thread::sleep(Duration::from_millis(200));
        tx.send(()).expect("signal");
        run.join().expect("supervisor thread")
    });

    assert_eq!(errors.len(), 2, "{errors:?}");
    assert!(errors.iter().any(RackError::is_interrupted));
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, RackError::Runtime(RuntimeError::Exited { service, .. }) if service == "b")),
        "{errors:?}"
    );

    let calls = engine.calls();
    let lifecycle: Vec<&str> = calls
        .iter()
        .map(String::as_str)
        .filter(|c| c.starts_with("run ") || c.starts_with("kill "))
        .collect();
    assert_eq!(lifecycle.len(), 4, "{lifecycle:?}");
    assert!(lifecycle[0].contains("--name app-a"));
    assert!(lifecycle[1].contains("--name app-b"));
    assert_eq!(lifecycle[2..], ["kill app-b", "kill app-a"]);
}

#[test]
fn failing_service_leaves_peers_running_to_completion() {
    let manifest = rack_manifest::parse_str(
        Path::new("/app"),
        "a:\n  image: x\nb:\n  image: y\n",
    )
    .expect("parse");
    let engine = RecordingEngine::new();
    engine.script("app-a", ContainerScript::exit(1).stderr("crashed"));
    engine.script("app-b", ContainerScript::exit(0).stdout("done"));
    let (_tx, rx) = mpsc::channel();

    let errors = rack_runtime::start(
        &engine,
        &manifest,
        &options("app"),
        &ProcessEnv::default(),
        quiet(),
        rx,
    );

    assert_eq!(errors.len(), 1);
    assert!(errors[0].to_string().contains("service a exited"), "{}", errors[0]);
    assert!(engine.calls_of("kill").is_empty());
}
