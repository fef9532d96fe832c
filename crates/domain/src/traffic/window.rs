use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default horizon when none (or zero) is configured.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
struct WindowPoint {
    at: Instant,
    increment: u64,
}

/// Thread-safe sliding-window throughput estimator.
///
/// Holds byte *increments* rather than absolute totals, which makes the
/// estimate immune to counter resets and capture pauses. After any
/// operation every retained point lies in `(now - window, now]`, in
/// insertion order.
#[derive(Debug)]
pub struct TrafficWindow {
    window: Duration,
    points: Mutex<VecDeque<WindowPoint>>,
}

impl TrafficWindow {
    pub fn new(window: Duration) -> Self {
        let window = if window.is_zero() {
            DEFAULT_WINDOW
        } else {
            window
        };
        Self {
            window,
            points: Mutex::new(VecDeque::with_capacity(32)),
        }
    }

    /// Append a byte increment observed now, discarding expired points.
    pub fn record(&self, increment: u64) {
        self.record_at(increment, Instant::now());
    }

    /// Estimated throughput in bytes per second.
    ///
    /// Returns 0.0 for an empty window. The span runs from the oldest
    /// retained point to now, so a single-point window (zero span) also
    /// yields 0.0 instead of an unbounded rate. The denominator is
    /// deliberately measured to now, not to the newest point.
    pub fn rate(&self) -> f64 {
        self.rate_at(Instant::now())
    }

    pub(crate) fn record_at(&self, increment: u64, now: Instant) {
        let mut points = self.points.lock().unwrap_or_else(|e| e.into_inner());
        Self::expire(&mut points, now, self.window);
        points.push_back(WindowPoint { at: now, increment });
    }

    pub(crate) fn rate_at(&self, now: Instant) -> f64 {
        let mut points = self.points.lock().unwrap_or_else(|e| e.into_inner());
        Self::expire(&mut points, now, self.window);

        let Some(oldest) = points.front() else {
            return 0.0;
        };

        let span = now.duration_since(oldest.at).as_secs_f64();
        if span <= 0.0 {
            return 0.0;
        }

        let total: u64 = points.iter().map(|p| p.increment).sum();
        total as f64 / span
    }

    /// Sum of the increments currently retained (test and invariant hook).
    pub fn retained_bytes(&self) -> u64 {
        let points = self.points.lock().unwrap_or_else(|e| e.into_inner());
        points.iter().map(|p| p.increment).sum()
    }

    fn expire(points: &mut VecDeque<WindowPoint>, now: Instant, window: Duration) {
        // Points are weakly monotonic, so expiry only ever trims the front.
        while let Some(front) = points.front() {
            if now.duration_since(front.at) < window {
                break;
            }
            points.pop_front();
        }
    }
}
