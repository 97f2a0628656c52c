// Hide console window in GUI mode (release builds only)
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use std::process::ExitCode;

fn main() -> ExitCode {
    spookyappx::init_tracing();
    let args: Vec<String> = std::env::args().skip(1).collect();
    ExitCode::from(spookyappx::run(args.as_slice()))
}
