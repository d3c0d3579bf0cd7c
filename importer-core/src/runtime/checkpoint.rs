use std::time::{Duration, Instant};

/// Decides when a running job checkpoints its sink
pub trait CheckpointTrigger: Send + 'static {
    /// Return true if a checkpoint should be taken now
    fn should_trigger(&mut self) -> bool;
}

/// Fires once per interval of wall clock time, the first time one interval
/// after the job started
#[derive(Debug)]
pub struct IntervalCheckpoints {
    interval: Duration,
    since: Instant,
}

impl IntervalCheckpoints {
    /// Checkpoint every `interval`
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            since: Instant::now(),
        }
    }
}

impl CheckpointTrigger for IntervalCheckpoints {
    fn should_trigger(&mut self) -> bool {
        let due = self.since.elapsed() >= self.interval;
        if due {
            self.since = Instant::now();
        }
        due
    }
}

/// Never triggers, sinks are only checkpointed when the job ends
#[derive(Debug)]
pub struct NoCheckpoints;

impl CheckpointTrigger for NoCheckpoints {
    #[inline(always)]
    fn should_trigger(&mut self) -> bool {
        false
    }
}
