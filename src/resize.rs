//! Container-width observation, coalesced to one layout recompute per frame.
//!
//! - `ResizeCoalescer` - pure state machine: latest width wins within a frame
//! - `ResizeSignal` - tokio task ticking at frame cadence, owning the coalescer

use std::time::Duration;

use flume::{Receiver, Sender};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Frame interval in milliseconds (~60fps).
pub const FRAME_INTERVAL_MS: u64 = 16;

/// Tracks the last width handed to layout and the width waiting for the next frame.
#[derive(Debug, Default)]
pub struct ResizeCoalescer {
    last_emitted: Option<u32>,
    pending: Option<u32>,
    closed: bool,
}

impl ResizeCoalescer {
    /// Records an observed width.
    ///
    /// Returns true when a frame needs to be scheduled, i.e. nothing was pending yet.
    pub fn observe(&mut self, width: f64) -> bool {
        if self.closed {
            return false;
        }
        let width = floor_width(width);
        if self.last_emitted == Some(width) {
            // Bounced back to the width already laid out.
            self.pending = None;
            return false;
        }
        let schedule = self.pending.is_none();
        self.pending = Some(width);
        schedule
    }

    /// Called on a frame; yields the width to lay out, if any.
    pub fn on_frame(&mut self) -> Option<u32> {
        let width = self.pending.take()?;
        self.last_emitted = Some(width);
        Some(width)
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Drops any pending recompute and ignores further observations.
    pub fn cancel(&mut self) {
        self.pending = None;
        self.closed = true;
    }
}

fn floor_width(width: f64) -> u32 {
    if width.is_finite() && width > 0.0 {
        width.floor().min(u32::MAX as f64) as u32
    } else {
        0
    }
}

/// Running width observer. Dropping it or calling [`shutdown`](Self::shutdown)
/// cancels any pending recompute and stops observing.
pub struct ResizeSignal {
    scope: CancellationToken,
    task: JoinHandle<()>,
}

impl ResizeSignal {
    /// Spawns the observer.
    ///
    /// `widths` carries raw container widths as the host measures them;
    /// `recompute` receives at most one floored width per frame.
    pub fn spawn(widths: Receiver<f64>, recompute: Sender<u32>, frame: Duration) -> Self {
        let scope = CancellationToken::new();
        let task = tokio::spawn(run(widths, recompute, frame, scope.clone()));
        Self { scope, task }
    }

    pub fn with_default_frame(widths: Receiver<f64>, recompute: Sender<u32>) -> Self {
        Self::spawn(widths, recompute, Duration::from_millis(FRAME_INTERVAL_MS))
    }

    /// Cancels the pending frame and waits for the observer to stop.
    pub async fn shutdown(mut self) {
        self.scope.cancel();
        let _ = (&mut self.task).await;
    }
}

impl Drop for ResizeSignal {
    fn drop(&mut self) {
        self.scope.cancel();
    }
}

async fn run(
    widths: Receiver<f64>,
    recompute: Sender<u32>,
    frame: Duration,
    scope: CancellationToken,
) {
    let mut coalescer = ResizeCoalescer::default();
    let mut ticker = tokio::time::interval(frame);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = scope.cancelled() => {
                coalescer.cancel();
                break;
            }
            width = widths.recv_async() => {
                let Ok(width) = width else { break };
                trace!(width, "observed container width");
                if coalescer.observe(width) {
                    ticker.reset();
                }
            }
            _ = ticker.tick(), if coalescer.has_pending() => {
                if let Some(width) = coalescer.on_frame() {
                    if recompute.send_async(width).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
    debug!("resize observer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: Duration = Duration::from_millis(FRAME_INTERVAL_MS);

    #[test]
    fn test_latest_width_wins() {
        let mut c = ResizeCoalescer::default();
        assert!(c.observe(800.2));
        assert!(!c.observe(900.9));
        assert!(!c.observe(1000.5));
        assert_eq!(c.on_frame(), Some(1000));
        assert_eq!(c.on_frame(), None);
    }

    #[test]
    fn test_same_width_is_ignored() {
        let mut c = ResizeCoalescer::default();
        c.observe(1200.0);
        assert_eq!(c.on_frame(), Some(1200));
        assert!(!c.observe(1200.7));
        assert!(!c.has_pending());
    }

    #[test]
    fn test_bounce_back_clears_pending() {
        let mut c = ResizeCoalescer::default();
        c.observe(1200.0);
        c.on_frame();
        assert!(c.observe(1300.0));
        assert!(!c.observe(1200.0));
        assert_eq!(c.on_frame(), None);
    }

    #[test]
    fn test_cancel_drops_pending() {
        let mut c = ResizeCoalescer::default();
        c.observe(640.0);
        c.cancel();
        assert_eq!(c.on_frame(), None);
        assert!(!c.observe(700.0));
        assert!(!c.has_pending());
    }

    #[test]
    fn test_invalid_widths_floor_to_zero() {
        assert_eq!(floor_width(f64::NAN), 0);
        assert_eq!(floor_width(-3.0), 0);
        assert_eq!(floor_width(99.99), 99);
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_coalesces_burst() {
        let (width_tx, width_rx) = flume::unbounded();
        let (out_tx, out_rx) = flume::unbounded();
        let signal = ResizeSignal::spawn(width_rx, out_tx, FRAME);

        width_tx.send(800.4).unwrap();
        width_tx.send(900.7).unwrap();
        width_tx.send(1000.9).unwrap();

        assert_eq!(out_rx.recv_async().await.unwrap(), 1000);
        tokio::time::sleep(FRAME * 4).await;
        assert!(out_rx.try_recv().is_err());

        width_tx.send(1100.0).unwrap();
        assert_eq!(out_rx.recv_async().await.unwrap(), 1100);

        signal.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pending_frame() {
        let (width_tx, width_rx) = flume::unbounded();
        let (out_tx, out_rx) = flume::unbounded();
        let signal = ResizeSignal::spawn(width_rx, out_tx, FRAME);

        width_tx.send(1024.0).unwrap();
        signal.shutdown().await;

        tokio::time::sleep(FRAME * 4).await;
        assert!(out_rx.try_recv().is_err());
        assert!(width_tx.send(2048.0).is_err());
    }
}
