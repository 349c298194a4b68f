use tokio::sync::watch;

/// Observable download progress for a single item.
///
/// Guarantees observers see a non-decreasing fraction in `[0.0, 1.0]`, with
/// the terminal `1.0` published exactly once by [`ProgressTracker::finish`].
/// Intermediate updates are capped just below `1.0` so that a byte counter
/// reaching the expected size cannot publish the terminal value before the
/// artifact has actually been moved into place.
#[derive(Debug)]
pub struct ProgressTracker {
    tx: watch::Sender<f64>,
}

const INTERMEDIATE_CAP: f64 = 0.99;

impl ProgressTracker {
    pub fn new() -> Self {
        ProgressTracker {
            tx: watch::channel(0.0).0,
        }
    }

    /// Subscribe to progress updates.
    pub fn subscribe(&self) -> watch::Receiver<f64> {
        self.tx.subscribe()
    }

    /// Report an intermediate fraction. Values below the current fraction or
    /// outside `[0, 1]` are ignored.
    pub fn set_fraction(&self, fraction: f64) {
        let clamped = fraction.clamp(0.0, INTERMEDIATE_CAP);
        self.tx.send_if_modified(|current| {
            if clamped > *current {
                *current = clamped;
                true
            } else {
                false
            }
        });
    }

    /// Report progress as bytes transferred against an expected total.
    /// An unknown total keeps the fraction where it is.
    pub fn set_bytes(&self, transferred: u64, expected: u64) {
        if expected > 0 {
            self.set_fraction(transferred as f64 / expected as f64);
        }
    }

    /// Publish the terminal `1.0`. Idempotent: only the first call notifies
    /// observers.
    pub fn finish(&self) {
        self.tx.send_if_modified(|current| {
            if *current < 1.0 {
                *current = 1.0;
                true
            } else {
                false
            }
        });
    }

    /// Current fraction.
    pub fn fraction(&self) -> f64 {
        *self.tx.borrow()
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}
