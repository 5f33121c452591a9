/// Minimum interval between frames that enter the analysis path.
///
/// Time comes from the caller (frame timestamps), so the throttle is
/// deterministic and needs no clock of its own.
#[derive(Debug, Clone)]
pub struct FrameThrottler {
    min_interval_ms: u64,
    last_accepted: Option<u64>,
}

impl FrameThrottler {
    pub fn new(min_interval_ms: u64) -> Self {
        Self {
            min_interval_ms,
            last_accepted: None,
        }
    }

    pub fn min_interval_ms(&self) -> u64 {
        self.min_interval_ms
    }

    /// Accept iff at least the minimum interval has passed since the last
    /// accepted frame. The first frame is always accepted.
    pub fn should_process(&mut self, now_ms: u64) -> bool {
        if let Some(last) = self.last_accepted {
            if now_ms.saturating_sub(last) < self.min_interval_ms {
                return false;
            }
        }
        self.last_accepted = Some(now_ms);
        true
    }

    pub fn reset(&mut self) {
        self.last_accepted = None;
    }
}
