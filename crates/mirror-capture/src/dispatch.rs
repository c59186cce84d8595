//! Per-session frame delivery.
//!
//! ```text
//!   OS thread ──deliver()──▶ gate open? ─▶ busy? ─▶ throttled? ─▶ callback? ─▶ callback(frame)
//!                               │ no          │ yes      │ yes          │ none
//!                               └─────────────┴──────────┴──────────────┴──▶ framesDropped += 1
//! ```
//!
//! `close()` takes the gate for writing, so it returns only after any
//! delivery that already passed the gate has finished.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, TryLockError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use mirror_core::{pixels, FrameData, StatsTracker, FRAME_BYTES_PER_PIXEL};
use tracing::debug;

/// Frame sink registered with a capture session.
pub type FrameCallback = Box<dyn Fn(&FrameData<'_>) + Send + Sync>;

pub(crate) type SharedCallback = Arc<dyn Fn(&FrameData<'_>) + Send + Sync>;

/// The one callback slot of a capturer, shared with every session it opens.
pub(crate) type CallbackSlot = Arc<RwLock<Option<SharedCallback>>>;

/// Outcome of a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Dropped(DropReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The session is stopping or stopped.
    Closed,
    /// The previous frame is still inside the callback.
    Busy,
    /// Arrived sooner than the target frame interval allows.
    Throttled,
    NoCallback,
    /// The OS delivered a frame but no surface could be acquired.
    SurfaceLost,
}

/// Milliseconds since the Unix epoch, the timestamp carried by `FrameData`.
pub fn timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub struct FrameDispatcher {
    callback:     CallbackSlot,
    stats:        Arc<StatsTracker>,
    gate:         RwLock<bool>,
    busy:         AtomicBool,
    min_interval: Option<Duration>,
    last:         Mutex<Option<Instant>>,
    placeholder:  Mutex<Vec<u8>>,
}

impl FrameDispatcher {
    pub(crate) fn new(
        callback: CallbackSlot,
        stats: Arc<StatsTracker>,
        frame_interval: Option<Duration>,
    ) -> Self {
        // Accept frames slightly early so OS jitter does not halve the rate.
        let min_interval = frame_interval.map(|i| i.mul_f64(0.9));
        Self {
            callback,
            stats,
            gate: RwLock::new(true),
            busy: AtomicBool::new(false),
            min_interval,
            last: Mutex::new(None),
            placeholder: Mutex::new(Vec::new()),
        }
    }

    /// Standalone dispatcher with its own callback and counters.
    pub fn detached(callback: FrameCallback, frame_interval: Option<Duration>) -> Self {
        Self::new(
            Arc::new(RwLock::new(Some(Arc::from(callback)))),
            Arc::new(StatsTracker::new()),
            frame_interval,
        )
    }

    pub fn stats(&self) -> &StatsTracker {
        &self.stats
    }

    pub fn deliver(&self, frame: &FrameData<'_>) -> Delivery {
        self.deliver_at(frame, Instant::now())
    }

    pub fn deliver_at(&self, frame: &FrameData<'_>, now: Instant) -> Delivery {
        let open = match self.gate.try_read() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
            Err(TryLockError::WouldBlock) => return self.drop_frame(DropReason::Closed),
        };
        if !*open {
            return self.drop_frame(DropReason::Closed);
        }

        if self.busy.swap(true, Ordering::Acquire) {
            return self.drop_frame(DropReason::Busy);
        }
        let _busy = BusyGuard(&self.busy);

        {
            let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
            if let (Some(min), Some(prev)) = (self.min_interval, *last) {
                if now.saturating_duration_since(prev) < min {
                    return self.drop_frame(DropReason::Throttled);
                }
            }
            *last = Some(now);
        }

        let callback = self
            .callback
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let Some(callback) = callback else {
            return self.drop_frame(DropReason::NoCallback);
        };

        callback(frame);
        self.stats.record_frame(now);
        drop(open);
        Delivery::Delivered
    }

    /// Deliver a dark-gray frame of the expected size in place of a frame
    /// whose surface could not be read.
    pub fn deliver_placeholder(&self, width: u32, height: u32, timestamp_ms: u64) -> Delivery {
        if width == 0 || height == 0 {
            return self.drop_frame(DropReason::SurfaceLost);
        }
        let mut buffer = self.placeholder.lock().unwrap_or_else(|e| e.into_inner());
        let len = width as usize * height as usize * FRAME_BYTES_PER_PIXEL;
        if buffer.len() != len {
            *buffer = pixels::placeholder_frame(width, height);
        }
        let frame = FrameData {
            data: &buffer[..],
            width,
            height,
            stride: width as usize * FRAME_BYTES_PER_PIXEL,
            timestamp_ms,
        };
        debug!("Placeholder frame {width}x{height}");
        self.deliver(&frame)
    }

    /// Count a frame the OS announced but that could not be acquired.
    pub fn record_surface_loss(&self) -> Delivery {
        self.drop_frame(DropReason::SurfaceLost)
    }

    /// Stop accepting frames; blocks until an in-flight callback returns.
    ///
    /// Must not be called from inside the frame callback.
    pub fn close(&self) {
        *self.gate.write().unwrap_or_else(|e| e.into_inner()) = false;
    }

    pub fn is_closed(&self) -> bool {
        !*self.gate.read().unwrap_or_else(|e| e.into_inner())
    }

    fn drop_frame(&self, reason: DropReason) -> Delivery {
        self.stats.record_drop();
        Delivery::Dropped(reason)
    }
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;
    use std::sync::mpsc;
    use std::thread;

    fn frame(data: &[u8]) -> FrameData<'_> {
        FrameData {
            data,
            width: 2,
            height: 2,
            stride: 8,
            timestamp_ms: 0,
        }
    }

    fn counting() -> (Arc<AtomicU64>, FrameCallback) {
        let count = Arc::new(AtomicU64::new(0));
        let seen = count.clone();
        (count, Box::new(move |_: &FrameData<'_>| {
            seen.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn unthrottled_frames_are_all_delivered() {
        let (count, cb) = counting();
        let dispatcher = FrameDispatcher::detached(cb, None);
        let buf = [0u8; 16];
        for _ in 0..5 {
            assert_eq!(dispatcher.deliver(&frame(&buf)), Delivery::Delivered);
        }
        assert_eq!(count.load(Ordering::SeqCst), 5);
        assert_eq!(dispatcher.stats().frames_captured(), 5);
    }

    #[test]
    fn frames_inside_the_interval_are_dropped() {
        let (count, cb) = counting();
        let dispatcher = FrameDispatcher::detached(cb, Some(Duration::from_millis(100)));
        let buf = [0u8; 16];
        let t0 = Instant::now();

        assert_eq!(dispatcher.deliver_at(&frame(&buf), t0), Delivery::Delivered);
        assert_eq!(
            dispatcher.deliver_at(&frame(&buf), t0 + Duration::from_millis(20)),
            Delivery::Dropped(DropReason::Throttled)
        );
        assert_eq!(
            dispatcher.deliver_at(&frame(&buf), t0 + Duration::from_millis(95)),
            Delivery::Delivered
        );
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(dispatcher.stats().frames_dropped(), 1);
    }

    #[test]
    fn missing_callback_counts_as_drop() {
        let dispatcher = FrameDispatcher::new(
            Arc::new(RwLock::new(None)),
            Arc::new(StatsTracker::new()),
            None,
        );
        let buf = [0u8; 16];
        assert_eq!(
            dispatcher.deliver(&frame(&buf)),
            Delivery::Dropped(DropReason::NoCallback)
        );
        assert_eq!(dispatcher.stats().frames_dropped(), 1);
    }

    #[test]
    fn placeholder_is_gray_and_tightly_packed() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let dispatcher = FrameDispatcher::detached(
            Box::new(move |f: &FrameData<'_>| {
                assert_eq!(f.stride, 12);
                sink.lock().unwrap().extend_from_slice(f.data);
            }),
            None,
        );
        assert_eq!(dispatcher.deliver_placeholder(3, 2, 7), Delivery::Delivered);
        let data = seen.lock().unwrap();
        assert_eq!(data.len(), 24);
        assert!(data.iter().all(|&b| b == pixels::PLACEHOLDER_GRAY));
    }

    #[test]
    fn close_waits_for_in_flight_callback_and_rejects_later_frames() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let finished = Arc::new(AtomicBool::new(false));
        let done = finished.clone();

        let dispatcher = Arc::new(FrameDispatcher::detached(
            Box::new(move |_: &FrameData<'_>| {
                entered_tx.send(()).unwrap();
                release_rx.lock().unwrap().recv().unwrap();
                done.store(true, Ordering::SeqCst);
            }),
            None,
        ));

        let worker = {
            let dispatcher = dispatcher.clone();
            thread::spawn(move || {
                let buf = [0u8; 16];
                dispatcher.deliver(&frame(&buf))
            })
        };
        entered_rx.recv().unwrap();

        // A second frame while the first is in the callback is dropped.
        let buf = [0u8; 16];
        assert_eq!(dispatcher.deliver(&frame(&buf)), Delivery::Dropped(DropReason::Busy));

        let closer = {
            let dispatcher = dispatcher.clone();
            thread::spawn(move || dispatcher.close())
        };
        thread::sleep(Duration::from_millis(50));
        assert!(!finished.load(Ordering::SeqCst));

        release_tx.send(()).unwrap();
        closer.join().unwrap();
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(worker.join().unwrap(), Delivery::Delivered);

        assert!(dispatcher.is_closed());
        assert_eq!(dispatcher.deliver(&frame(&buf)), Delivery::Dropped(DropReason::Closed));
    }
}
