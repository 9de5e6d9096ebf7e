use std::time::Duration;

/// Linear, capped reconnect delays.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Added to the previous delay on every failed attempt.
    pub step: Duration,
    /// Ceiling; retries continue forever at this interval.
    pub max: Duration,
    /// Forget the accumulated delay once a connection opens.
    pub reset_on_open: bool,
}

impl BackoffPolicy {
    pub const DEFAULT_STEP: Duration = Duration::from_millis(1000);
    pub const DEFAULT_MAX: Duration = Duration::from_millis(60_000);
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            step: Self::DEFAULT_STEP,
            max: Self::DEFAULT_MAX,
            reset_on_open: false,
        }
    }
}

/// Current position in the backoff sequence. Starts unset.
#[derive(Clone, Debug)]
pub struct Backoff {
    policy: BackoffPolicy,
    current: Option<Duration>,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            current: None,
        }
    }

    /// `min(previous + step, max)`, with an implicit previous of zero.
    pub fn next_delay(&mut self) -> Duration {
        let next = self
            .current
            .unwrap_or_default()
            .saturating_add(self.policy.step)
            .min(self.policy.max);
        self.current = Some(next);
        next
    }

    pub fn on_open(&mut self) {
        if self.policy.reset_on_open {
            self.current = None;
        }
    }

    pub fn current(&self) -> Option<Duration> {
        self.current
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }
}
