//! Interactive live display
//!
//! [`DeployView`] is a pure state machine: [`DeployView::update`] folds one
//! message into the state and [`DeployView::render`] draws its live rows.
//! [`InteractiveRenderer`] owns the event loop that feeds it from key
//! presses, timers and the progress channels. It draws into an inline
//! viewport below the shell prompt and scrolls finished phases above it.

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::{cursor, terminal};
use deploy_api::models::SolveStatus;
use futures::{Stream, StreamExt};
use ratatui::backend::{Backend, CrosstermBackend, TestBackend};
use ratatui::buffer::Buffer;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Gauge, Paragraph, Widget};
use ratatui::{Terminal, TerminalOptions, Viewport};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::errors::CliError;
use crate::progress::mailbox::Overflow;
use crate::progress::phase::{PhaseSummary, StallMonitor, UPLOAD_PHASE};
use crate::progress::printer::{ExplainFormat, StatusPrinter};
use crate::progress::reader::UploadSample;
use crate::progress::theme::{Role, Theme};
use crate::progress::transfer::TransferTable;
use crate::progress::{PresentationControl, PresentationFeeds, PresentationOutcome, Presenter};
use crate::utils::{format_bytes, format_phase_duration, format_speed};

/// Activity shown before the builder reports anything
pub const INITIAL_MESSAGE: &str = "Reading application data";

const SPINNER_FRAMES: [&str; 8] = ["⣾", "⣽", "⣻", "⢿", "⡿", "⣟", "⣯", "⣷"];
const METER_FRAMES: [&str; 6] = ["   ", "▰  ", "▰▰ ", "▰▰▰", " ▰▰", "  ▰"];
const BAR_WIDTH: u16 = 20;
const EXPLAIN_LINES: usize = 12;
/// Activity, progress, the detail panel and the key hint
const VIEWPORT_HEIGHT: u16 = EXPLAIN_LINES as u16 + 3;
const HEADLESS_WIDTH: u16 = 120;

/// Key presses the view reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Esc,
    Interrupt,
    Other,
}

/// Input of [`DeployView::update`]
#[derive(Debug, Clone)]
pub enum ViewMsg {
    Key(Key),
    SpinnerTick,
    BarTick,
    TimeoutTick,
    Activity(String),
    Upload(UploadSample),
    Transfers(TransferTable),
    Phases(Vec<PhaseSummary>),
    Status(SolveStatus),
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Quit,
}

/// State of the live display
#[derive(Debug)]
pub struct DeployView {
    theme: Theme,
    message: String,
    upload: Option<UploadSample>,
    uploading: bool,
    transfers: TransferTable,
    // drawn bar position, eased toward the transfer ratio on each bar tick
    bar_ratio: f64,
    phases: Vec<PhaseSummary>,
    phase_started: Instant,
    show_explain: bool,
    explain: VecDeque<String>,
    printer: StatusPrinter,
    frame: usize,
    stall: StallMonitor,
    interrupted: bool,
    timed_out: bool,
    finished: bool,
}

impl DeployView {
    pub fn new(theme: Theme, stall_window: Duration, now: Instant) -> Self {
        Self {
            theme,
            message: INITIAL_MESSAGE.to_string(),
            upload: None,
            uploading: true,
            transfers: TransferTable::new(),
            bar_ratio: 0.0,
            phases: Vec::new(),
            phase_started: now,
            show_explain: false,
            explain: VecDeque::with_capacity(EXPLAIN_LINES),
            printer: StatusPrinter::new(ExplainFormat::Plain, theme),
            frame: 0,
            stall: StallMonitor::new(stall_window),
            interrupted: false,
            timed_out: false,
            finished: false,
        }
    }

    pub fn update(&mut self, msg: ViewMsg, now: Instant) -> Control {
        match msg {
            ViewMsg::Key(Key::Enter) => self.show_explain = !self.show_explain,
            ViewMsg::Key(Key::Esc) => self.show_explain = false,
            ViewMsg::Key(Key::Interrupt) => {
                self.interrupted = true;
                return Control::Quit;
            }
            ViewMsg::Key(Key::Other) => {}
            ViewMsg::SpinnerTick => self.frame = self.frame.wrapping_add(1),
            ViewMsg::BarTick => {
                let target = self.transfers.ratio().unwrap_or(0.0);
                let gap = target - self.bar_ratio;
                self.bar_ratio = if gap.abs() < 0.005 {
                    target
                } else {
                    self.bar_ratio + gap * 0.25
                };
            }
            ViewMsg::TimeoutTick => {
                if self.stall.is_stalled(now) {
                    self.timed_out = true;
                    return Control::Quit;
                }
            }
            ViewMsg::Activity(message) => self.message = message,
            ViewMsg::Upload(sample) => {
                if self.uploading {
                    self.upload = Some(sample);
                }
            }
            ViewMsg::Transfers(table) => {
                if !table.is_empty() {
                    self.stall.on_transfer();
                }
                self.transfers = table;
            }
            ViewMsg::Phases(phases) => {
                if self.uploading && phases.iter().any(|p| p.name == UPLOAD_PHASE) {
                    self.uploading = false;
                    self.stall.enter_building(now);
                }
                if phases.len() != self.phases.len() {
                    self.phase_started = now;
                }
                self.phases = phases;
            }
            ViewMsg::Status(status) => {
                for line in self.printer.render(&status) {
                    if self.explain.len() == EXPLAIN_LINES {
                        self.explain.pop_front();
                    }
                    self.explain.push_back(line);
                }
            }
            ViewMsg::Done => {
                self.finished = true;
                return Control::Quit;
            }
        }
        Control::Continue
    }

    pub fn interrupted(&self) -> bool {
        self.interrupted
    }

    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    pub fn is_uploading(&self) -> bool {
        self.uploading
    }

    pub fn explain_visible(&self) -> bool {
        self.show_explain
    }

    pub fn completed_phases(&self) -> &[PhaseSummary] {
        &self.phases
    }

    /// Aggregate build progress in percent
    pub fn percent(&self) -> Option<u8> {
        self.transfers.ratio().map(|r| (r * 100.0).round() as u8)
    }

    /// Still drawing live rows
    fn is_live(&self) -> bool {
        !self.finished && !self.interrupted && !self.timed_out
    }

    /// Line printed above the live rows once `phase` is over
    pub fn phase_line(&self, phase: &PhaseSummary) -> Line<'static> {
        let theme = self.theme;
        let time = format!("({})", format_phase_duration(phase.duration));
        let mut spans = vec![
            Span::raw("  "),
            theme.span("✓", Role::Check),
            Span::raw(" "),
            theme.span(phase.name.clone(), Role::PhaseName),
            Span::raw(" "),
            theme.span(time, Role::PhaseTime),
        ];
        if !phase.details.is_empty() {
            spans.push(Span::raw(format!(" - {}", phase.details)));
        }
        Line::from(spans)
    }

    /// Draw the live rows: activity, progress, detail panel and key hint
    pub fn render(&self, area: Rect, buf: &mut Buffer, now: Instant) {
        if !self.is_live() {
            return;
        }
        let theme = self.theme;
        let [activity, progress, panel] = Layout::vertical([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(0),
        ])
        .areas(area);

        let spinner = SPINNER_FRAMES[self.frame % SPINNER_FRAMES.len()];
        let elapsed = format!(
            "({})",
            format_phase_duration(now.saturating_duration_since(self.phase_started))
        );
        let lead = if self.uploading {
            METER_FRAMES[self.frame % METER_FRAMES.len()]
        } else {
            spinner
        };
        Paragraph::new(Line::from(vec![
            Span::raw(format!("  {} {}... ", lead, self.message)),
            theme.span(elapsed, Role::PhaseTime),
        ]))
        .render(activity, buf);

        if self.uploading {
            let (bytes, speed) = self
                .upload
                .map(|s| (s.bytes_read, s.bytes_per_second))
                .unwrap_or_default();
            let info = format!("{} uploaded at {}", format_bytes(bytes), format_speed(speed));
            Paragraph::new(Line::from(vec![
                Span::raw(format!("      {} ", spinner)),
                theme.span(info, Role::Prefix),
            ]))
            .render(progress, buf);
        } else {
            let label = Line::from(vec![
                Span::raw(format!("      {} ", spinner)),
                theme.span(format!("Fetching {} items:", self.transfers.len()), Role::Prefix),
                Span::raw(" "),
            ]);
            let [label_area, bar_area, summary_area] = Layout::horizontal([
                Constraint::Length(label.width() as u16),
                Constraint::Length(BAR_WIDTH),
                Constraint::Min(0),
            ])
            .areas(progress);
            let percent = self.percent().unwrap_or(0);
            Paragraph::new(label).render(label_area, buf);
            Gauge::default()
                .ratio(self.bar_ratio.clamp(0.0, 1.0))
                .label(format!("{:>3}%", percent))
                .gauge_style(theme.style(Role::Prefix))
                .use_unicode(true)
                .render(bar_area, buf);
            Paragraph::new(format!(" {}", self.transfers.summary())).render(summary_area, buf);
        }

        let mut lines: Vec<Line<'static>> = Vec::new();
        if self.show_explain {
            lines.extend(self.explain.iter().map(|l| Line::raw(format!("      {}", l))));
            lines.push(Line::from(theme.span("      [enter: hide explain]", Role::Faint)));
        } else {
            lines.push(Line::from(theme.span("      [enter: explain]", Role::Faint)));
        }
        Paragraph::new(lines).render(panel, buf);
    }

    /// Position of the drawn progress bar, between 0 and 1
    pub fn bar_ratio(&self) -> f64 {
        self.bar_ratio
    }
}

/// Stream of key presses
pub type KeyStream = Pin<Box<dyn Stream<Item = Key> + Send>>;

/// Interactive renderer options
#[derive(Debug, Clone)]
pub struct Options {
    pub theme: Theme,
    pub stall_window: Duration,
    pub spinner_interval: Duration,
    pub bar_interval: Duration,
    pub timeout_check_interval: Duration,
    /// Capacity of the status mailbox behind the detail panel
    pub status_capacity: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            theme: Theme::plain(),
            stall_window: Duration::from_secs(60),
            spinner_interval: Duration::from_millis(1000 / 7),
            bar_interval: Duration::from_millis(100),
            timeout_check_interval: Duration::from_secs(1),
            status_capacity: 64,
        }
    }
}

/// Restores the terminal when dropped
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self, CliError> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        let _ = crossterm::execute!(std::io::stderr(), cursor::Show);
    }
}

fn inline_viewport() -> TerminalOptions {
    TerminalOptions {
        viewport: Viewport::Inline(VIEWPORT_HEIGHT),
    }
}

/// Event loop driving a [`DeployView`]
pub struct InteractiveRenderer {
    options: Options,
    keys: KeyStream,
    owns_terminal: bool,
}

impl InteractiveRenderer {
    /// Renderer reading keys from the terminal and drawing on stderr.
    ///
    /// The terminal is left untouched until [`Presenter::present`] starts, so
    /// Ctrl+C still raises SIGINT during the prechecks.
    pub fn terminal(options: Options) -> Self {
        let keys = EventStream::new().filter_map(|event| async move {
            match event {
                Ok(Event::Key(key)) => map_key(key),
                _ => None,
            }
        });
        Self {
            options,
            keys: Box::pin(keys),
            owns_terminal: true,
        }
    }

    /// Renderer with injected keys, drawing into an off-screen buffer
    pub fn headless(options: Options, keys: impl Stream<Item = Key> + Send + 'static) -> Self {
        Self {
            options,
            keys: Box::pin(keys),
            owns_terminal: false,
        }
    }

    async fn drive<B: Backend + Send>(
        mut self,
        terminal: &mut Terminal<B>,
        mut feeds: PresentationFeeds,
        control: &PresentationControl,
    ) -> Result<PresentationOutcome, CliError> {
        let mut view = DeployView::new(self.options.theme, self.options.stall_window, Instant::now());
        let mut printed_phases = 0usize;

        let mut spinner = tokio::time::interval(self.options.spinner_interval);
        spinner.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut bar = tokio::time::interval(self.options.bar_interval);
        bar.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut timeout = tokio::time::interval(self.options.timeout_check_interval);
        timeout.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            print_phases(terminal, &view, &mut printed_phases)?;
            let now = Instant::now();
            terminal.draw(|frame| view.render(frame.area(), frame.buffer_mut(), now))?;

            let msg = tokio::select! {
                biased;
                _ = control.done.cancelled() => ViewMsg::Done,
                _ = control.op.cancelled() => ViewMsg::Done,
                Some(key) = self.keys.next() => ViewMsg::Key(key),
                Some(phases) = feeds.phases.next() => ViewMsg::Phases(phases),
                Some(table) = feeds.transfers.next() => ViewMsg::Transfers(table),
                Some(status) = feeds.statuses.recv() => ViewMsg::Status(status),
                Some(sample) = feeds.upload.next() => ViewMsg::Upload(sample),
                Some(message) = feeds.activity.next() => ViewMsg::Activity(message),
                _ = spinner.tick() => ViewMsg::SpinnerTick,
                _ = bar.tick() => ViewMsg::BarTick,
                _ = timeout.tick() => ViewMsg::TimeoutTick,
            };

            if view.update(msg, Instant::now()) == Control::Quit {
                break;
            }
        }

        if let Some(phases) = feeds.phases.take_pending() {
            view.update(ViewMsg::Phases(phases), Instant::now());
        }
        view.update(ViewMsg::Done, Instant::now());
        print_phases(terminal, &view, &mut printed_phases)?;
        // the emptied viewport is where the final report starts
        terminal.draw(|frame| {
            let area = frame.area();
            frame.set_cursor_position((area.x, area.y));
        })?;

        let outcome = PresentationOutcome {
            interrupted: view.interrupted(),
            timed_out: view.timed_out(),
        };
        if outcome.interrupted || outcome.timed_out {
            debug!(?outcome, "live display ended the operation");
            control.op.cancel();
        }
        Ok(outcome)
    }
}

/// Scroll newly completed phases into the lines above the viewport
fn print_phases<B: Backend>(
    terminal: &mut Terminal<B>,
    view: &DeployView,
    printed: &mut usize,
) -> Result<(), CliError> {
    let fresh: Vec<Line<'static>> = view
        .completed_phases()
        .iter()
        .skip(*printed)
        .map(|phase| view.phase_line(phase))
        .collect();
    if fresh.is_empty() {
        return Ok(());
    }
    *printed += fresh.len();
    terminal.insert_before(fresh.len() as u16, |buf| {
        let area = buf.area;
        Paragraph::new(fresh).render(area, buf);
    })?;
    Ok(())
}

fn map_key(key: KeyEvent) -> Option<Key> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    let mapped = match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Key::Interrupt,
        KeyCode::Enter => Key::Enter,
        KeyCode::Esc => Key::Esc,
        _ => Key::Other,
    };
    Some(mapped)
}

#[async_trait]
impl Presenter for InteractiveRenderer {
    fn status_overflow(&self) -> Overflow {
        Overflow::DropNewest
    }

    async fn present(
        self: Box<Self>,
        feeds: PresentationFeeds,
        control: PresentationControl,
    ) -> Result<PresentationOutcome, CliError> {
        if !self.owns_terminal {
            let backend = TestBackend::new(HEADLESS_WIDTH, VIEWPORT_HEIGHT);
            let mut terminal = Terminal::with_options(backend, inline_viewport())?;
            return self.drive(&mut terminal, feeds, &control).await;
        }

        let raw_mode = match RawModeGuard::enable() {
            Ok(guard) => Some(guard),
            Err(e) => {
                warn!("raw mode unavailable, keys need Enter: {}", e);
                None
            }
        };
        let backend = CrosstermBackend::new(std::io::stderr());
        let mut terminal = Terminal::with_options(backend, inline_viewport())?;
        let outcome = self.drive(&mut terminal, feeds, &control).await;
        drop(raw_mode);
        outcome
    }
}
