/// Rate limiter for repetitive log lines: lets the first event through, then
/// every `every`-th one.
#[derive(Debug, Clone)]
pub struct LogThrottle {
    every: u64,
    seen: u64,
}

impl LogThrottle {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            seen: 0,
        }
    }

    /// Record an event and report whether it should be logged.
    pub fn should_log(&mut self) -> bool {
        self.seen += 1;
        self.seen == 1 || self.seen % self.every == 0
    }

    pub fn seen(&self) -> u64 {
        self.seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_then_every_nth() {
        let mut throttle = LogThrottle::new(3);
        let logged: Vec<bool> = (0..7).map(|_| throttle.should_log()).collect();
        assert_eq!(logged, vec![true, false, true, false, false, true, false]);
        assert_eq!(throttle.seen(), 7);
    }
}
