//! Progress reporting reader

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, ReadBuf};
use tokio::time::Instant;

/// Default sampling interval
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// Time window used to smooth the transfer rate
const SPEED_WINDOW: Duration = Duration::from_secs(5);

/// Point in time snapshot of an upload
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UploadSample {
    /// Cumulative bytes read so far
    pub bytes_read: i64,
    /// Smoothed rate in bytes per second
    pub bytes_per_second: f64,
    /// Time since the first read was attempted
    pub elapsed: Duration,
}

/// Callback receiving samples. Must not block.
pub type ProgressCallback = Box<dyn Fn(UploadSample) + Send + Sync>;

/// Wraps a byte source, passing reads through unchanged and reporting
/// progress at most once per sampling interval plus once at end of input.
pub struct ProgressReader<R> {
    inner: R,
    bytes_read: i64,
    started: Instant,
    last_report: Instant,
    interval: Duration,
    speed: SpeedWindow,
    finished: bool,
    on_progress: ProgressCallback,
}

impl<R: AsyncRead + Unpin> ProgressReader<R> {
    pub fn new(inner: R, on_progress: ProgressCallback) -> Self {
        Self::with_interval(inner, DEFAULT_SAMPLE_INTERVAL, on_progress)
    }

    pub fn with_interval(inner: R, interval: Duration, on_progress: ProgressCallback) -> Self {
        let now = Instant::now();
        Self {
            inner,
            bytes_read: 0,
            started: now,
            last_report: now,
            interval,
            speed: SpeedWindow::new(SPEED_WINDOW),
            finished: false,
            on_progress,
        }
    }

    /// Bytes passed through so far
    pub fn bytes_read(&self) -> i64 {
        self.bytes_read
    }

    fn report(&mut self, now: Instant) {
        self.last_report = now;
        self.speed.add(now, self.bytes_read);
        let elapsed = now.duration_since(self.started);
        let bytes_per_second = self.speed.rate().unwrap_or_else(|| {
            let secs = elapsed.as_secs_f64().max(0.001);
            self.bytes_read as f64 / secs
        });
        (self.on_progress)(UploadSample {
            bytes_read: self.bytes_read,
            bytes_per_second,
            elapsed,
        });
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ProgressReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let result = Pin::new(&mut this.inner).poll_read(cx, buf);

        if let Poll::Ready(Ok(())) = &result {
            let n = buf.filled().len() - before;
            let now = Instant::now();
            if n > 0 {
                this.bytes_read += n as i64;
                if now.duration_since(this.last_report) >= this.interval {
                    this.report(now);
                }
            } else if !this.finished && buf.remaining() > 0 {
                this.finished = true;
                this.report(now);
            }
        }

        result
    }
}

/// Sliding window of cumulative byte counts
struct SpeedWindow {
    window: Duration,
    samples: Vec<(Instant, i64)>,
}

impl SpeedWindow {
    fn new(window: Duration) -> Self {
        Self {
            window,
            samples: Vec::new(),
        }
    }

    fn add(&mut self, at: Instant, cumulative: i64) {
        self.samples.push((at, cumulative));
        let cutoff = at.checked_sub(self.window);
        if let Some(cutoff) = cutoff {
            self.samples.retain(|(t, _)| *t >= cutoff);
        }
    }

    /// Rate over the window, `None` with fewer than two samples
    fn rate(&self) -> Option<f64> {
        let (first_at, first_bytes) = *self.samples.first()?;
        let (last_at, last_bytes) = *self.samples.last()?;
        let elapsed = last_at.duration_since(first_at);
        if elapsed.is_zero() {
            return None;
        }
        Some((last_bytes - first_bytes) as f64 / elapsed.as_secs_f64())
    }
}
