use std::{borrow::Cow, time::Instant};

use log::info;

/// Logs how often `increment` is called, once per window.
///
/// Useful for watching the rate of a frame or detection stream without
/// flooding the log.
pub struct RateLogger {
    start: Instant,
    epoch: usize,
    count: usize,
    /// Window length in seconds.
    pub window_size: f32,
    target: Cow<'static, str>,
}

impl RateLogger {
    pub fn new(target: impl Into<Cow<'static, str>>) -> Self {
        Self {
            start: Instant::now(),
            epoch: 0,
            count: 0,
            window_size: 1.0,
            target: target.into(),
        }
    }

    pub fn increment(&mut self) {
        let current_epoch = (self.start.elapsed().as_secs_f32() / self.window_size) as usize;
        if self.epoch != current_epoch {
            info!(target: self.target.as_ref(), "{:.4} Hz", self.count as f32 / self.window_size);
            self.count = 0;
            self.epoch = current_epoch;
        }
        self.count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_reset_between_windows() {
        let mut rate = RateLogger::new("test-rate");
        rate.window_size = 1000.0;
        for _ in 0..5 {
            rate.increment();
        }
        assert_eq!(rate.count, 5);
        assert_eq!(rate.epoch, 0);
    }
}
