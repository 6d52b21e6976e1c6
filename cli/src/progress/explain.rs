//! Non-interactive, line oriented presentation

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::errors::CliError;
use crate::progress::mailbox::Overflow;
use crate::progress::phase::{PhaseSummary, StallMonitor, UPLOAD_PHASE};
use crate::progress::printer::{ExplainFormat, StatusPrinter};
use crate::progress::reader::UploadSample;
use crate::progress::theme::Theme;
use crate::progress::{PresentationControl, PresentationFeeds, PresentationOutcome, Presenter};
use crate::utils::{format_bytes, format_phase_duration, format_speed};

/// Minimum delay between two upload progress lines
pub const UPLOAD_LINE_INTERVAL: Duration = Duration::from_millis(500);

/// Explain renderer options
#[derive(Debug, Clone)]
pub struct Options {
    pub format: ExplainFormat,
    pub theme: Theme,
    pub stall_window: Duration,
    pub stall_check_interval: Duration,
    /// Whether the side channel is a terminal and can rewrite its last line
    pub side_is_terminal: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            format: ExplainFormat::Plain,
            theme: Theme::plain(),
            stall_window: Duration::from_secs(60),
            stall_check_interval: Duration::from_secs(1),
            side_is_terminal: false,
        }
    }
}

/// Prints every decoded build status; upload progress, builder messages and
/// phase lines go to a side channel
pub struct ExplainRenderer {
    options: Options,
    printer: StatusPrinter,
    out: Box<dyn Write + Send>,
    side: Box<dyn Write + Send>,
}

impl ExplainRenderer {
    pub fn new(options: Options, out: Box<dyn Write + Send>, side: Box<dyn Write + Send>) -> Self {
        let printer = StatusPrinter::new(options.format, options.theme);
        Self {
            options,
            printer,
            out,
            side,
        }
    }

    /// Statuses on stdout, upload progress on stderr
    pub fn stdio(options: Options) -> Self {
        Self::new(options, Box::new(std::io::stdout()), Box::new(std::io::stderr()))
    }
}

struct UploadLine {
    last_written: Option<Instant>,
    last_sample: Option<UploadSample>,
    done: bool,
}

#[async_trait]
impl Presenter for ExplainRenderer {
    fn status_overflow(&self) -> Overflow {
        Overflow::Wait
    }

    async fn present(
        mut self: Box<Self>,
        mut feeds: PresentationFeeds,
        control: PresentationControl,
    ) -> Result<PresentationOutcome, CliError> {
        let mut outcome = PresentationOutcome::default();
        let mut stall = StallMonitor::new(self.options.stall_window);
        let mut upload = UploadLine {
            last_written: None,
            last_sample: None,
            done: false,
        };
        let mut printed_phases = 0usize;

        let mut check = tokio::time::interval(self.options.stall_check_interval);
        check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = control.done.cancelled() => break,
                _ = control.op.cancelled() => {
                    debug!("explain output stopped by cancellation");
                    break;
                }
                Some(status) = feeds.statuses.recv() => {
                    for line in self.printer.render(&status) {
                        writeln!(self.out, "{}", line)?;
                    }
                }
                Some(phases) = feeds.phases.next() => {
                    self.print_phases(&phases, &mut printed_phases, &mut upload, &mut stall)?;
                }
                Some(table) = feeds.transfers.next() => {
                    if !table.is_empty() {
                        stall.on_transfer();
                    }
                }
                Some(sample) = feeds.upload.next(), if !upload.done => {
                    upload.last_sample = Some(sample);
                    let now = Instant::now();
                    let due = upload
                        .last_written
                        .map_or(true, |at| now.duration_since(at) >= UPLOAD_LINE_INTERVAL);
                    if due {
                        upload.last_written = Some(now);
                        self.write_upload_line(&sample)?;
                    }
                }
                Some(message) = feeds.activity.next() => {
                    let line = self.options.theme.highlight(&message);
                    self.write_side_line(&line)?;
                }
                _ = check.tick() => {
                    if stall.is_stalled(Instant::now()) {
                        outcome.timed_out = true;
                        control.op.cancel();
                        break;
                    }
                }
            }
        }

        // statuses already queued by a finished submission are still printed
        while let Ok(status) = feeds.statuses.try_recv() {
            for line in self.printer.render(&status) {
                writeln!(self.out, "{}", line)?;
            }
        }
        if let Some(phases) = feeds.phases.take_pending() {
            self.print_phases(&phases, &mut printed_phases, &mut upload, &mut stall)?;
        }

        self.out.flush()?;
        self.side.flush()?;
        Ok(outcome)
    }
}

impl ExplainRenderer {
    fn write_upload_line(&mut self, sample: &UploadSample) -> Result<(), CliError> {
        let text = format!(
            "Uploading artifacts: {} at {}",
            format_bytes(sample.bytes_read),
            format_speed(sample.bytes_per_second)
        );
        if self.options.side_is_terminal {
            write!(self.side, "\r\x1b[K{}", text)?;
        } else {
            writeln!(self.side, "{}", text)?;
        }
        self.side.flush()?;
        Ok(())
    }

    /// Stdout carries only status lines, so everything else goes to the side channel
    fn write_side_line(&mut self, line: &str) -> Result<(), CliError> {
        if self.options.side_is_terminal {
            write!(self.side, "\r\x1b[K")?;
        }
        writeln!(self.side, "{}", line)?;
        self.side.flush()?;
        Ok(())
    }

    fn print_phases(
        &mut self,
        phases: &[PhaseSummary],
        printed: &mut usize,
        upload: &mut UploadLine,
        stall: &mut StallMonitor,
    ) -> Result<(), CliError> {
        for phase in phases.iter().skip(*printed) {
            if phase.name == UPLOAD_PHASE {
                upload.done = true;
                stall.enter_building(Instant::now());
                if self.options.side_is_terminal {
                    write!(self.side, "\r\x1b[K")?;
                }
                let bytes = upload.last_sample.map(|s| s.bytes_read).unwrap_or_default();
                let secs = phase.duration.as_secs_f64();
                let speed = if secs > 0.0 { bytes as f64 / secs } else { 0.0 };
                writeln!(
                    self.side,
                    "Upload complete: {} in {:.1}s at {}",
                    format_bytes(bytes),
                    secs,
                    format_speed(speed)
                )?;
                self.side.flush()?;
            } else {
                let theme = self.options.theme;
                let time = format!("({})", format_phase_duration(phase.duration));
                let mut line = format!(
                    "{} {} {}",
                    theme.check(),
                    theme.phase_name(&phase.name),
                    theme.phase_time(&time)
                );
                if !phase.details.is_empty() {
                    line.push_str(&format!(" - {}", phase.details));
                }
                self.write_side_line(&line)?;
            }
        }
        *printed = phases.len().max(*printed);
        Ok(())
    }
}
