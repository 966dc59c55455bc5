use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use plantscan_contracts::analysis::AnalysisError;

/// 15 requests per minute on the free analysis quota.
pub const MIN_INTERVAL: Duration = Duration::from_secs(4);

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        self.origin + offset
    }
}

/// Admission gate spacing outbound analysis calls at least `min_interval`
/// apart. It never waits or queues; a rejected caller gets the remaining
/// wait and decides whether to retry.
pub struct RateGate {
    clock: Arc<dyn Clock>,
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_interval(clock, MIN_INTERVAL)
    }

    pub fn with_interval(clock: Arc<dyn Clock>, min_interval: Duration) -> Self {
        Self {
            clock,
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    pub fn admit(&self) -> Result<(), AnalysisError> {
        self.admit_at(self.clock.now())
    }

    pub fn admit_at(&self, now: Instant) -> Result<(), AnalysisError> {
        let mut last_call = self
            .last_call
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = *last_call {
            let elapsed = now.saturating_duration_since(previous);
            if elapsed < self.min_interval {
                return Err(AnalysisError::RateLimitExceeded {
                    wait_seconds: round_wait(self.min_interval - elapsed),
                });
            }
        }
        *last_call = Some(now);
        Ok(())
    }
}

// One decimal, never shown as zero while the caller still has to wait.
fn round_wait(remaining: Duration) -> f64 {
    ((remaining.as_secs_f64() * 10.0).round() / 10.0).max(0.1)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::time::Duration;

    use plantscan_contracts::analysis::AnalysisError;

    use super::{Clock, ManualClock, RateGate, MIN_INTERVAL};

    fn wait_seconds(result: Result<(), AnalysisError>) -> Option<f64> {
        match result {
            Err(AnalysisError::RateLimitExceeded { wait_seconds }) => Some(wait_seconds),
            _ => None,
        }
    }

    #[test]
    fn first_call_is_admitted() {
        let gate = RateGate::new(Arc::new(ManualClock::new()));
        assert!(gate.admit().is_ok());
    }

    #[test]
    fn early_call_reports_remaining_wait() {
        let clock = Arc::new(ManualClock::new());
        let gate = RateGate::new(clock.clone());
        assert!(gate.admit().is_ok());

        clock.advance(Duration::from_secs(1));
        assert_eq!(wait_seconds(gate.admit()), Some(3.0));

        clock.advance(Duration::from_millis(1750));
        assert_eq!(wait_seconds(gate.admit()), Some(1.3));
    }

    #[test]
    fn rejected_calls_do_not_move_the_window() {
        let clock = Arc::new(ManualClock::new());
        let gate = RateGate::new(clock.clone());
        gate.admit().ok();
        for _ in 0..3 {
            clock.advance(Duration::from_secs(1));
            assert!(gate.admit().is_err());
        }
        clock.advance(Duration::from_secs(1));
        assert!(gate.admit().is_ok());
    }

    #[test]
    fn admissions_are_never_closer_than_interval() {
        let clock = Arc::new(ManualClock::new());
        let gate = RateGate::new(clock.clone());
        let mut admitted = Vec::new();
        for step_ms in [0_u64, 700, 1300, 2500, 500, 3999, 1, 4000, 100, 6000] {
            clock.advance(Duration::from_millis(step_ms));
            if gate.admit().is_ok() {
                admitted.push(clock.now());
            }
        }
        assert!(admitted.len() >= 3);
        for pair in admitted.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= MIN_INTERVAL);
        }
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let clock = Arc::new(ManualClock::new());
        let gate = RateGate::new(clock.clone());
        let earlier = clock.now();
        clock.advance(Duration::from_secs(10));
        assert!(gate.admit().is_ok());
        assert_eq!(wait_seconds(gate.admit_at(earlier)), Some(4.0));
    }

    #[test]
    fn concurrent_callers_get_one_admission() {
        let gate = Arc::new(RateGate::new(Arc::new(ManualClock::new())));
        let barrier = Arc::new(Barrier::new(8));
        let admitted = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                let barrier = barrier.clone();
                let admitted = admitted.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    if gate.admit().is_ok() {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().ok();
        }
        assert_eq!(admitted.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn custom_interval() {
        let clock = Arc::new(ManualClock::new());
        let gate = RateGate::with_interval(clock.clone(), Duration::from_secs(10));
        gate.admit().ok();
        clock.advance(Duration::from_secs(4));
        assert_eq!(wait_seconds(gate.admit()), Some(6.0));
    }
}
