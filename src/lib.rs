//! SpookyAppX: a cross-platform smoke test.
//!
//! Every run appends one timestamped line to `~/spookyappx.log`. Without
//! flags a small window is shown; `--headless` prints diagnostics instead and
//! `--log-only` only writes the log entry.
//!
//! Set `SPOOKYAPPX_LOG` (`error`, `warn`, `info`, `debug`, `trace`) for
//! diagnostic output on stderr. Defaults to `warn`.

pub mod cli;
pub mod gui;
pub mod logging;

use gui::{Launch, ToolkitUnavailable};
use logging::LogFile;
use std::any::Any;
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};

pub const CRASHED_PREFIX: &str = "spookyappx crashed: ";

const USAGE: &str = "\
Usage:
  spookyappx               GUI mode if available, headless otherwise
  spookyappx --headless    print to the terminal instead of opening a window
  spookyappx --log-only    write a log entry and exit

Options:
  -h, --help               print this help
  -V, --version            print the version";

/// Command-line switches. Unknown arguments are ignored.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Flags {
    pub headless: bool,
    pub log_only: bool,
    pub help: bool,
    pub version: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Help,
    Version,
    LogOnly,
    Headless,
    Presentation,
}

impl Flags {
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Self {
        let has = |names: &[&str]| args.iter().any(|a| names.contains(&a.as_ref()));
        Self {
            headless: has(&["--headless"]),
            log_only: has(&["--log-only"]),
            help: has(&["--help", "-h"]),
            version: has(&["--version", "-V"]),
        }
    }

    /// `--log-only` wins over `--headless` when both are given.
    pub fn mode(&self) -> Mode {
        if self.help {
            Mode::Help
        } else if self.version {
            Mode::Version
        } else if self.log_only {
            Mode::LogOnly
        } else if self.headless {
            Mode::Headless
        } else {
            Mode::Presentation
        }
    }
}

// ── Frontends ──────────────────────────────────────────────────

/// One way of running the app. Console output goes to `out`; the return value
/// is the process exit code.
pub trait Frontend {
    fn run(&self, log: &LogFile, out: &mut dyn Write) -> anyhow::Result<i32>;
}

pub struct Headless;

impl Frontend for Headless {
    fn run(&self, log: &LogFile, out: &mut dyn Write) -> anyhow::Result<i32> {
        Ok(cli::run_headless(log, out)?)
    }
}

pub struct LogOnly;

impl Frontend for LogOnly {
    fn run(&self, log: &LogFile, out: &mut dyn Write) -> anyhow::Result<i32> {
        Ok(cli::run_log_only(log, out)?)
    }
}

/// The window, or [`Headless`] when no window can be opened.
pub struct Presentation {
    probe: fn() -> Result<(), ToolkitUnavailable>,
}

impl Default for Presentation {
    fn default() -> Self {
        Self {
            probe: gui::probe_toolkit,
        }
    }
}

impl Presentation {
    pub fn with_probe(probe: fn() -> Result<(), ToolkitUnavailable>) -> Self {
        Self { probe }
    }
}

impl Frontend for Presentation {
    fn run(&self, log: &LogFile, out: &mut dyn Write) -> anyhow::Result<i32> {
        let launch = match (self.probe)() {
            Ok(()) => gui::run_window(log, &mut *out)?,
            Err(reason) => Launch::Unavailable(reason),
        };
        match launch {
            Launch::Ran(code) => Ok(code),
            Launch::Unavailable(reason) => {
                tracing::debug!(%reason, "falling back to headless");
                writeln!(
                    out,
                    "GUI toolkit not available, falling back to headless. Error: {}",
                    reason
                )?;
                Headless.run(log, out)
            }
        }
    }
}

// ── Entry point ────────────────────────────────────────────────

/// Level from `SPOOKYAPPX_LOG`; unknown values fall back to `warn`. A
/// subscriber installed earlier (e.g. by an embedding binary) is kept.
pub fn init_tracing() {
    let level = std::env::var("SPOOKYAPPX_LOG")
        .ok()
        .and_then(|v| v.parse::<tracing::Level>().ok())
        .unwrap_or(tracing::Level::WARN);

    if let Err(e) = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .try_init()
    {
        tracing::debug!(error = %e, "tracing subscriber already installed");
    }
}

/// Parses `args` (without the program name), runs the selected frontend
/// against the default log file and returns the exit code.
pub fn run<S: AsRef<str>>(args: &[S]) -> u8 {
    let mode = Flags::parse(args).mode();
    tracing::debug!(?mode, "dispatch");

    let frontend: Box<dyn Frontend> = match mode {
        Mode::Help | Mode::Version => {
            cli::attach_console(true);
            if mode == Mode::Help {
                println!("{}", USAGE);
            } else {
                println!("spookyappx {}", env!("CARGO_PKG_VERSION"));
            }
            return 0;
        }
        Mode::LogOnly => {
            cli::attach_console(true);
            Box::new(LogOnly)
        }
        Mode::Headless => {
            cli::attach_console(true);
            Box::new(Headless)
        }
        Mode::Presentation => {
            cli::attach_console(false);
            Box::new(Presentation::default())
        }
    };

    run_guarded(
        frontend.as_ref(),
        &LogFile::default_location(),
        &mut io::stdout(),
    )
}

/// Runs `frontend`, turning an escaped error or panic into exit code 1 after
/// reporting it on `out` and in the log.
pub fn run_guarded(frontend: &dyn Frontend, log: &LogFile, out: &mut dyn Write) -> u8 {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| frontend.run(log, &mut *out)));
    let error = match outcome {
        Ok(Ok(code)) => return u8::try_from(code).unwrap_or(1),
        Ok(Err(e)) => format!("{:#}", e),
        Err(payload) => panic_message(payload.as_ref()),
    };

    let _ = writeln!(out, "Unhandled error: {}", error);
    if let Err(e) = log.append(&format!("{}{}", CRASHED_PREFIX, error)) {
        tracing::warn!(error = %e, "failed to log crash");
    }
    1
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
