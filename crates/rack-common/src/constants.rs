//! System-wide constants and defaults.

/// Manifest file read from the application directory.
pub const DEFAULT_MANIFEST_FILE: &str = "docker-compose.yml";

/// Optional environment file merged into the effective process environment.
pub const ENV_FILE: &str = ".env";

/// Container engine executable used when none is configured.
pub const DEFAULT_ENGINE: &str = "docker";

/// Length of the ephemeral tag assigned to each unique build context.
pub const BUILD_TAG_LENGTH: usize = 10;

/// Delay between two service launches, in milliseconds.
pub const DEFAULT_LAUNCH_SPACING_MS: u64 = 1_000;

/// Number of attempts for registry pulls and pushes.
pub const DEFAULT_REGISTRY_ATTEMPTS: u32 = 5;

/// First backoff delay between registry retries, in milliseconds.
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1_000;

/// Timeout for a single host port probe, in milliseconds.
pub const PORT_PROBE_TIMEOUT_MS: u64 = 200;

/// Label overriding the port shift of a single service.
pub const SHIFT_LABEL: &str = "rack.start.shift";

/// Name shown in the prefix of run-wide messages.
pub const SYSTEM_PREFIX_NAME: &str = "rack";

/// Tag pushed when none is given.
pub const DEFAULT_PUSH_TAG: &str = "latest";

/// Email sent to registries that still require one on login.
pub const DEFAULT_LOGIN_EMAIL: &str = "user@rack.local";

/// Application name used in CLI output.
pub const APP_NAME: &str = "rack";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "rack";

/// Exit code used when a second signal forces the process down.
pub const FORCED_EXIT_CODE: i32 = 130;
