use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::types::CaptureStatistics;

/// Width of the sliding window `average_fps` is computed over.
pub const FPS_WINDOW: Duration = Duration::from_secs(1);

/// Frame counters shared between the capture thread and the UI.
///
/// Counters only grow until [`StatsTracker::reset`] is called; they survive
/// source switches. Reads are eventually consistent.
#[derive(Debug, Default)]
pub struct StatsTracker {
    captured: AtomicU64,
    dropped: AtomicU64,
    deliveries: Mutex<VecDeque<Instant>>,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call once per frame handed to the frame callback.
    pub fn record_frame(&self, now: Instant) {
        self.captured.fetch_add(1, Ordering::Relaxed);
        let mut window = self.deliveries.lock().unwrap_or_else(|e| e.into_inner());
        window.push_back(now);
        evict(&mut window, now);
    }

    pub fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_captured(&self) -> u64 {
        self.captured.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, now: Instant) -> CaptureStatistics {
        let mut window = self.deliveries.lock().unwrap_or_else(|e| e.into_inner());
        evict(&mut window, now);
        CaptureStatistics {
            frames_captured: self.frames_captured(),
            frames_dropped: self.frames_dropped(),
            average_fps: window.len() as f64 / FPS_WINDOW.as_secs_f64(),
        }
    }

    pub fn reset(&self) {
        self.captured.store(0, Ordering::Relaxed);
        self.dropped.store(0, Ordering::Relaxed);
        self.deliveries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

fn evict(window: &mut VecDeque<Instant>, now: Instant) {
    while window
        .front()
        .map_or(false, |t| now.saturating_duration_since(*t) > FPS_WINDOW)
    {
        window.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_counts_deliveries_inside_the_window() {
        let stats = StatsTracker::new();
        let t0 = Instant::now();
        for i in 0..30 {
            stats.record_frame(t0 + Duration::from_millis(i * 10));
        }
        let snap = stats.snapshot(t0 + Duration::from_millis(300));
        assert_eq!(snap.frames_captured, 30);
        assert_eq!(snap.average_fps, 30.0);

        // Two seconds later the window is empty but the totals remain.
        let later = stats.snapshot(t0 + Duration::from_secs(2));
        assert_eq!(later.average_fps, 0.0);
        assert_eq!(later.frames_captured, 30);
    }

    #[test]
    fn drops_are_counted_separately_and_reset_clears_everything() {
        let stats = StatsTracker::new();
        let now = Instant::now();
        stats.record_frame(now);
        stats.record_drop();
        stats.record_drop();

        let snap = stats.snapshot(now);
        assert_eq!((snap.frames_captured, snap.frames_dropped), (1, 2));

        stats.reset();
        assert_eq!(stats.snapshot(now), CaptureStatistics::default());
    }
}
