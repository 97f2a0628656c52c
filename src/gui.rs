use crate::logging::LogFile;
use anyhow::Context as _;
use eframe::egui;
use std::cell::Cell;
use std::ffi::OsString;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

pub const GUI_STARTED: &str = "spookyappx started (gui)";
pub const GUI_STOPPED: &str = "spookyappx stopped (gui)";

const WINDOW_TITLE: &str = "SpookyAppX";
const WINDOW_SIZE: [f32; 2] = [360.0, 120.0];
const TOPMOST_FOR: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ToolkitUnavailable(String);

impl ToolkitUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Whether a window can be opened at all in this environment.
pub fn probe_toolkit() -> Result<(), ToolkitUnavailable> {
    probe_toolkit_with(|key| std::env::var_os(key))
}

fn probe_toolkit_with(env: impl Fn(&str) -> Option<OsString>) -> Result<(), ToolkitUnavailable> {
    if !needs_display_server() {
        return Ok(());
    }
    let set = |key: &str| env(key).is_some_and(|v| !v.is_empty());
    if set("DISPLAY") || set("WAYLAND_DISPLAY") {
        Ok(())
    } else {
        Err(ToolkitUnavailable::new(
            "no display server (neither DISPLAY nor WAYLAND_DISPLAY is set)",
        ))
    }
}

fn needs_display_server() -> bool {
    cfg!(all(
        unix,
        not(any(target_os = "macos", target_os = "ios", target_os = "android"))
    ))
}

// ── Always-on-top probe ────────────────────────────────────────

/// Window levels are a hint the compositor may not honor. Wayland has no
/// protocol for them, so the request is skipped there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopmostSupport {
    Supported,
    Unsupported,
}

impl TopmostSupport {
    pub fn detect() -> Self {
        Self::detect_with(|key| std::env::var_os(key))
    }

    fn detect_with(env: impl Fn(&str) -> Option<OsString>) -> Self {
        let wayland = needs_display_server()
            && env("WAYLAND_DISPLAY").is_some_and(|v| !v.is_empty());
        if wayland {
            Self::Unsupported
        } else {
            Self::Supported
        }
    }
}

// ── Interrupt ──────────────────────────────────────────────────

/// Ctrl+C state shared between the signal handler thread and the UI thread.
/// Triggering wakes the event loop once a context is attached.
#[derive(Default)]
struct Interrupt {
    flag: AtomicBool,
    ctx: OnceLock<egui::Context>,
}

impl Interrupt {
    fn attach(&self, ctx: egui::Context) {
        let _ = self.ctx.set(ctx);
    }

    fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        if let Some(ctx) = self.ctx.get() {
            ctx.request_repaint();
        }
    }

    fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

// ── Window ─────────────────────────────────────────────────────

/// Outcome of trying to run the window.
#[derive(Debug)]
pub enum Launch {
    /// The event loop ran and finished with this exit code.
    Ran(i32),
    /// The toolkit failed before any window existed.
    Unavailable(ToolkitUnavailable),
}

fn viewport(topmost: TopmostSupport) -> egui::ViewportBuilder {
    let viewport = egui::ViewportBuilder::default()
        .with_title(WINDOW_TITLE)
        .with_inner_size(WINDOW_SIZE)
        .with_resizable(false);
    match topmost {
        TopmostSupport::Supported => {
            viewport.with_window_level(egui::viewport::WindowLevel::AlwaysOnTop)
        }
        TopmostSupport::Unsupported => viewport,
    }
}

/// Logs the gui start and prints where it went.
fn report_start(log: &LogFile, out: &mut dyn Write) -> io::Result<()> {
    match log.append(GUI_STARTED) {
        Ok(path) => writeln!(out, "GUI started; log: {}", path.display()),
        Err(e) => writeln!(out, "GUI start: failed to write log: {}", e),
    }
}

struct SpookyApp {
    log: LogFile,
    log_label: String,
    topmost_until: Option<Instant>,
    interrupt: Arc<Interrupt>,
    stopping: bool,
}

impl SpookyApp {
    fn new(log: LogFile, topmost: TopmostSupport, interrupt: Arc<Interrupt>) -> Self {
        let log_label = format!("Log: {}", log.path().display());
        Self {
            log,
            log_label,
            topmost_until: match topmost {
                TopmostSupport::Supported => Some(Instant::now() + TOPMOST_FOR),
                TopmostSupport::Unsupported => None,
            },
            interrupt,
            stopping: false,
        }
    }

    fn quit(&mut self, ctx: &egui::Context) {
        if self.stopping {
            return;
        }
        self.stopping = true;
        if let Err(e) = self.log.append(GUI_STOPPED) {
            tracing::warn!(error = %e, "failed to log gui stop");
        }
        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
    }

    fn drop_topmost(&mut self, ctx: &egui::Context) {
        let Some(deadline) = self.topmost_until else {
            return;
        };
        let now = Instant::now();
        if now >= deadline {
            ctx.send_viewport_cmd(egui::ViewportCommand::WindowLevel(
                egui::viewport::WindowLevel::Normal,
            ));
            self.topmost_until = None;
        } else {
            ctx.request_repaint_after(deadline - now);
        }
    }

    fn ui(&mut self, ctx: &egui::Context) {
        if self.interrupt.is_set() {
            tracing::debug!("interrupt received, quitting");
            self.quit(ctx);
        }

        self.drop_topmost(ctx);

        let mut quit_clicked = false;
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(12.0);
                ui.label(egui::RichText::new("SpookyAppX running").size(18.0));
                ui.add_space(2.0);
                ui.label(egui::RichText::new(&self.log_label).size(10.0));
                ui.add_space(8.0);
                let btn = egui::Button::new("Quit").min_size(egui::vec2(96.0, 0.0));
                quit_clicked = ui.add(btn).clicked();
            });
        });

        if quit_clicked {
            self.quit(ctx);
        }
    }
}

impl eframe::App for SpookyApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.ui(ctx);
    }
}

/// Opens the window and blocks until it closes. The start status line goes
/// to `out` once the window exists.
pub fn run_window(log: &LogFile, out: &mut dyn Write) -> anyhow::Result<Launch> {
    let interrupt = Arc::new(Interrupt::default());
    let handler = interrupt.clone();
    ctrlc::set_handler(move || handler.trigger()).context("install ctrl+c handler")?;

    let topmost = TopmostSupport::detect();
    tracing::debug!(?topmost, "always-on-top support");

    let options = eframe::NativeOptions {
        viewport: viewport(topmost),
        ..Default::default()
    };

    let created = Cell::new(false);
    let app_log = log.clone();

    let result = eframe::run_native(
        WINDOW_TITLE,
        options,
        Box::new(|cc| {
            created.set(true);
            interrupt.attach(cc.egui_ctx.clone());
            if let Err(e) = report_start(&app_log, out) {
                tracing::warn!(error = %e, "failed to print gui start status");
            }
            Ok(Box::new(SpookyApp::new(app_log, topmost, interrupt)))
        }),
    );

    match result {
        Ok(()) => Ok(Launch::Ran(0)),
        Err(e) if !created.get() => Ok(Launch::Unavailable(ToolkitUnavailable::new(
            e.to_string(),
        ))),
        Err(e) => {
            eprintln!("GUI error: {}", e);
            Ok(Launch::Ran(0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LOGFILE_NAME;

    fn env_of<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<OsString> + 'a {
        move |key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| OsString::from(v))
        }
    }

    fn screen() -> egui::Rect {
        egui::Rect::from_min_size(egui::Pos2::ZERO, egui::vec2(360.0, 120.0))
    }

    fn test_app(dir: &tempfile::TempDir, topmost: TopmostSupport) -> (SpookyApp, Arc<Interrupt>) {
        let interrupt = Arc::new(Interrupt::default());
        let log = LogFile::at(dir.path().join(LOGFILE_NAME));
        (SpookyApp::new(log, topmost, interrupt.clone()), interrupt)
    }

    fn frame_with(
        app: &mut SpookyApp,
        ctx: &egui::Context,
        events: Vec<egui::Event>,
    ) -> egui::FullOutput {
        let input = egui::RawInput {
            screen_rect: Some(screen()),
            events,
            ..Default::default()
        };
        ctx.run(input, |ctx| app.ui(ctx))
    }

    fn commands(output: &egui::FullOutput) -> Vec<egui::ViewportCommand> {
        output
            .viewport_output
            .get(&egui::ViewportId::ROOT)
            .map(|v| v.commands.clone())
            .unwrap_or_default()
    }

    fn frame(app: &mut SpookyApp, ctx: &egui::Context) -> Vec<egui::ViewportCommand> {
        commands(&frame_with(app, ctx, Vec::new()))
    }

    /// Center of the painted text `label`, if any shape draws it.
    fn text_center(output: &egui::FullOutput, label: &str) -> Option<egui::Pos2> {
        fn find(shape: &egui::Shape, label: &str) -> Option<egui::Pos2> {
            match shape {
                egui::Shape::Text(text) if text.galley.text() == label => {
                    Some(text.pos + text.galley.size() / 2.0)
                }
                egui::Shape::Vec(shapes) => shapes.iter().find_map(|s| find(s, label)),
                _ => None,
            }
        }
        output.shapes.iter().find_map(|clipped| find(&clipped.shape, label))
    }

    fn primary(pos: egui::Pos2, pressed: bool) -> egui::Event {
        egui::Event::PointerButton {
            pos,
            button: egui::PointerButton::Primary,
            pressed,
            modifiers: egui::Modifiers::default(),
        }
    }

    fn log_lines(dir: &tempfile::TempDir) -> Vec<String> {
        std::fs::read_to_string(dir.path().join(LOGFILE_NAME))
            .unwrap_or_default()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    #[test]
    #[cfg(all(unix, not(any(target_os = "macos", target_os = "ios", target_os = "android"))))]
    fn toolkit_needs_a_display() {
        assert!(probe_toolkit_with(env_of(&[])).is_err());
        assert!(probe_toolkit_with(env_of(&[("DISPLAY", "")])).is_err());
        assert!(probe_toolkit_with(env_of(&[("DISPLAY", ":0")])).is_ok());
        assert!(probe_toolkit_with(env_of(&[("WAYLAND_DISPLAY", "wayland-0")])).is_ok());
    }

    #[test]
    #[cfg(all(unix, not(any(target_os = "macos", target_os = "ios", target_os = "android"))))]
    fn topmost_skipped_on_wayland() {
        assert_eq!(
            TopmostSupport::detect_with(env_of(&[("DISPLAY", ":0")])),
            TopmostSupport::Supported
        );
        assert_eq!(
            TopmostSupport::detect_with(env_of(&[("WAYLAND_DISPLAY", "wayland-0")])),
            TopmostSupport::Unsupported
        );
    }

    #[test]
    fn idle_frame_does_not_quit() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, _flag) = test_app(&dir, TopmostSupport::Unsupported);
        let ctx = egui::Context::default();

        let commands = frame(&mut app, &ctx);

        assert!(!commands.contains(&egui::ViewportCommand::Close));
        assert!(log_lines(&dir).is_empty());
    }

    #[test]
    fn interrupt_logs_stop_and_closes_once() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, interrupt) = test_app(&dir, TopmostSupport::Unsupported);
        let ctx = egui::Context::default();

        interrupt.trigger();
        let commands = frame(&mut app, &ctx);
        assert!(commands.contains(&egui::ViewportCommand::Close));

        frame(&mut app, &ctx);
        let lines = log_lines(&dir);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with(&format!("\t{}", GUI_STOPPED)));
    }

    #[test]
    fn topmost_reverts_after_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, _flag) = test_app(&dir, TopmostSupport::Supported);
        let ctx = egui::Context::default();
        let normal = egui::ViewportCommand::WindowLevel(egui::viewport::WindowLevel::Normal);

        assert!(!frame(&mut app, &ctx).contains(&normal));

        app.topmost_until = Some(Instant::now());
        assert!(frame(&mut app, &ctx).contains(&normal));
        assert_eq!(app.topmost_until, None);
    }

    #[test]
    fn unsupported_topmost_never_touches_level() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, _flag) = test_app(&dir, TopmostSupport::Unsupported);
        let ctx = egui::Context::default();

        let commands = frame(&mut app, &ctx);

        assert!(!commands
            .iter()
            .any(|c| matches!(c, egui::ViewportCommand::WindowLevel(_))));
    }

    #[test]
    fn quit_button_logs_stop_and_closes() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, _interrupt) = test_app(&dir, TopmostSupport::Unsupported);
        let ctx = egui::Context::default();

        let first = frame_with(&mut app, &ctx, Vec::new());
        let quit = text_center(&first, "Quit").expect("quit button drawn");
        assert!(text_center(&first, "SpookyAppX running").is_some());

        frame_with(&mut app, &ctx, vec![egui::Event::PointerMoved(quit)]);
        frame_with(&mut app, &ctx, vec![primary(quit, true)]);
        let released = frame_with(&mut app, &ctx, vec![primary(quit, false)]);

        assert!(commands(&released).contains(&egui::ViewportCommand::Close));
        let lines = log_lines(&dir);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with(&format!("\t{}", GUI_STOPPED)));
    }

    #[test]
    fn log_label_shows_path() {
        let dir = tempfile::tempdir().unwrap();
        let (mut app, _interrupt) = test_app(&dir, TopmostSupport::Unsupported);
        let ctx = egui::Context::default();

        let output = frame_with(&mut app, &ctx, Vec::new());

        let label = format!("Log: {}", dir.path().join(LOGFILE_NAME).display());
        assert!(text_center(&output, &label).is_some());
    }

    #[test]
    fn interrupt_wakes_attached_context() {
        let interrupt = Interrupt::default();
        let woken = Arc::new(AtomicBool::new(false));
        let ctx = egui::Context::default();
        let flag = woken.clone();
        ctx.set_request_repaint_callback(move |_| flag.store(true, Ordering::SeqCst));
        // Settle until no repaint is outstanding.
        for _ in 0..3 {
            let _ = ctx.run(egui::RawInput::default(), |_| {});
        }
        woken.store(false, Ordering::SeqCst);

        interrupt.attach(ctx);
        interrupt.trigger();

        assert!(interrupt.is_set());
        assert!(woken.load(Ordering::SeqCst));
    }

    #[test]
    fn interrupt_before_attach_is_remembered() {
        let interrupt = Interrupt::default();

        interrupt.trigger();

        assert!(interrupt.is_set());
    }

    #[test]
    fn viewport_is_fixed_size_and_titled() {
        let vp = viewport(TopmostSupport::Unsupported);

        assert_eq!(vp.title.as_deref(), Some(WINDOW_TITLE));
        assert_eq!(vp.inner_size, Some(egui::vec2(360.0, 120.0)));
        assert_eq!(vp.resizable, Some(false));
        assert_eq!(vp.window_level, None);
    }

    #[test]
    fn viewport_starts_on_top_when_supported() {
        let vp = viewport(TopmostSupport::Supported);

        assert_eq!(
            vp.window_level,
            Some(egui::viewport::WindowLevel::AlwaysOnTop)
        );
    }

    #[test]
    fn start_is_logged_and_reported() {
        let dir = tempfile::tempdir().unwrap();
        let log = LogFile::at(dir.path().join(LOGFILE_NAME));
        let mut out = Vec::new();

        report_start(&log, &mut out).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!("GUI started; log: {}\n", log.path().display())
        );
        let lines = log_lines(&dir);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with(&format!("\t{}", GUI_STARTED)));
    }

    #[test]
    fn start_log_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let log = LogFile::at(dir.path());
        let mut out = Vec::new();

        report_start(&log, &mut out).unwrap();

        assert!(String::from_utf8(out)
            .unwrap()
            .starts_with("GUI start: failed to write log: "));
    }
}
