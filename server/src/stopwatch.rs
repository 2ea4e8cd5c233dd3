use std::time::{Duration, Instant};

/// Logs the time spent between its creation and its drop.
pub struct Stopwatch {
    label: String,
    started: Instant,
}

impl Stopwatch {
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Drop for Stopwatch {
    fn drop(&mut self) {
        log::debug!("{}: {:.1}s", self.label, self.elapsed().as_secs_f64());
    }
}
