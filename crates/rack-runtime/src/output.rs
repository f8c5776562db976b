//! Line multiplexer for container output.
//!
//! Every line is written as `<name padded> | <text>` under one lock, so
//! lines from different services interleave only at line boundaries.

use std::io::{self, BufRead, BufReader, IsTerminal, Read, Write};
use std::sync::{Arc, Mutex, PoisonError};

use rack_common::constants::SYSTEM_PREFIX_NAME;

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

/// Colors assigned to services by start position.
pub const PALETTE: [&str; 5] = [
    "\x1b[36m", // cyan
    "\x1b[33m", // yellow
    "\x1b[32m", // green
    "\x1b[35m", // magenta
    "\x1b[34m", // blue
];

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Shared destination of all prefixed output.
#[derive(Clone)]
pub struct OutputMux {
    writer: SharedWriter,
    width: usize,
    color: bool,
}

impl std::fmt::Debug for OutputMux {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputMux")
            .field("width", &self.width)
            .field("color", &self.color)
            .finish_non_exhaustive()
    }
}

impl OutputMux {
    /// Multiplexer over `writer`. Prefixes are padded to `longest_name`
    /// (never narrower than the system prefix).
    pub fn new(writer: impl Write + Send + 'static, longest_name: usize, color: bool) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
            width: longest_name.max(SYSTEM_PREFIX_NAME.len()),
            color,
        }
    }

    /// Multiplexer over the process stdout, colored when it is a terminal.
    #[must_use]
    pub fn stdout(longest_name: usize) -> Self {
        let color = io::stdout().is_terminal();
        Self::new(io::stdout(), longest_name, color)
    }

    /// Prefix of the service started at position `index`.
    #[must_use]
    pub fn prefix(&self, name: &str, index: usize) -> Prefix {
        let color = PALETTE[index % PALETTE.len()];
        self.make_prefix(name, color)
    }

    /// Prefix for run-wide messages.
    #[must_use]
    pub fn system(&self) -> Prefix {
        self.make_prefix(SYSTEM_PREFIX_NAME, BOLD)
    }

    fn make_prefix(&self, name: &str, color: &str) -> Prefix {
        let padded = format!("{name:<width$} |", width = self.width);
        let label = if self.color {
            format!("{color}{padded}{RESET}")
        } else {
            padded
        };
        Prefix {
            mux: self.clone(),
            label,
        }
    }

    fn write_line(&self, label: &str, text: &str) -> io::Result<()> {
        let line = format!("{label} {text}\n");
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(line.as_bytes())?;
        writer.flush()
    }
}

/// A service's (or the system's) labelled handle on the multiplexer.
#[derive(Debug, Clone)]
pub struct Prefix {
    mux: OutputMux,
    label: String,
}

impl Prefix {
    /// Writes one line.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying writer fails.
    pub fn line(&self, text: &str) -> io::Result<()> {
        self.mux.write_line(&self.label, text)
    }

    /// Copies `reader` line by line until end of stream. A final line
    /// without a newline is still written as a whole line.
    ///
    /// # Errors
    ///
    /// Returns the first read or write error.
    pub fn stream(&self, reader: impl Read) -> io::Result<()> {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                return Ok(());
            }
            while matches!(buf.last(), Some(b'\n' | b'\r')) {
                let _ = buf.pop();
            }
            self.line(&String::from_utf8_lossy(&buf))?;
        }
    }
}
