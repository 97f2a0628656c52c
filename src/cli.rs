use crate::logging::LogFile;
use colored::*;
use std::io::{self, Write};

pub const HEADLESS_STARTED: &str = "spookyappx started (headless)";
pub const LOG_ONLY_RUN: &str = "spookyappx log-only run";

/// Release builds on Windows use the GUI subsystem and start without a
/// console. Attach to the parent's console, and allocate a fresh one when
/// `allocate` is set and there is no parent console.
pub fn attach_console(allocate: bool) {
    #[cfg(windows)]
    unsafe {
        extern "system" {
            fn AttachConsole(dwProcessId: u32) -> i32;
            fn AllocConsole() -> i32;
        }
        if AttachConsole(0xFFFFFFFF) == 0 && allocate {
            AllocConsole();
        }
    }
    #[cfg(not(windows))]
    let _ = allocate;
}

/// Writes the headless log entry and prints diagnostics. Always returns 0.
pub fn run_headless(log: &LogFile, out: &mut dyn Write) -> io::Result<i32> {
    match log.append(HEADLESS_STARTED) {
        Ok(path) => writeln!(
            out,
            "SpookyAppX (headless) ran. Log written to: {}",
            path.display().to_string().green()
        )?,
        Err(e) => writeln!(out, "{} {}", "Failed to write log:".red().bold(), e)?,
    }

    let exe = std::env::current_exe()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|e| format!("<unknown: {}>", e));
    writeln!(out, "Executable: {}", exe)?;
    writeln!(out, "Platform: {}", std::env::consts::OS)?;
    writeln!(out, "Exiting.")?;
    Ok(0)
}

/// Writes one log entry. 0 when it landed, 2 when it did not.
pub fn run_log_only(log: &LogFile, out: &mut dyn Write) -> io::Result<i32> {
    match log.append(LOG_ONLY_RUN) {
        Ok(path) => {
            writeln!(out, "Log entry written to: {}", path.display())?;
            Ok(0)
        }
        Err(e) => {
            writeln!(out, "{} {}", "Failed to write log:".red().bold(), e)?;
            Ok(2)
        }
    }
}
