use chrono::{DateTime, Utc};

/// Wall-clock source for session timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall clock that follows Tokio's (possibly paused) clock, so tests can
/// move both the countdown timer and session timestamps with
/// `tokio::time::advance`.
#[cfg(test)]
pub(crate) struct TokioClock {
    base: DateTime<Utc>,
    origin: tokio::time::Instant,
    offset: std::sync::Mutex<chrono::Duration>,
}

#[cfg(test)]
impl TokioClock {
    pub fn new() -> Self {
        Self {
            base: Utc::now(),
            origin: tokio::time::Instant::now(),
            offset: std::sync::Mutex::new(chrono::Duration::zero()),
        }
    }

    /// Jump the wall clock without touching Tokio time.
    pub fn shift(&self, by: chrono::Duration) {
        let mut offset = self.offset.lock().unwrap();
        *offset = *offset + by;
    }
}

#[cfg(test)]
impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.origin.elapsed()).unwrap();
        self.base + elapsed + *self.offset.lock().unwrap()
    }
}
