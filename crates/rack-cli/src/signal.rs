//! Ctrl+C and SIGTERM handling for `rack start`.
//!
//! The first signal is forwarded to the supervisor, which tears the app
//! down. A second signal exits immediately.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};

use rack_common::constants::FORCED_EXIT_CODE;

use crate::output::{BOLD, RESET};

/// Installs the process signal handler and returns the receiver the
/// supervisor listens on.
///
/// # Errors
///
/// Returns an error if a handler is already installed.
pub fn install() -> anyhow::Result<Receiver<()>> {
    let (tx, rx) = mpsc::channel();
    let count = Arc::new(AtomicUsize::new(0));
    let handler = Handler { tx, count };
    ctrlc::set_handler(move || handler.on_signal())
        .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {e}"))?;
    Ok(rx)
}

struct Handler {
    tx: Sender<()>,
    count: Arc<AtomicUsize>,
}

impl Handler {
    fn on_signal(&self) {
        if self.record() {
            std::process::exit(FORCED_EXIT_CODE);
        }
        eprintln!("  Stopping containers... press {BOLD}Ctrl+C{RESET} again to force exit.");
        let _ = self.tx.send(());
    }

    /// Counts a signal; returns whether it is a repeat.
    fn record(&self) -> bool {
        self.count.fetch_add(1, Ordering::SeqCst) > 0
    }
}
