use crate::settings::PipelineSettings;

/// Decides after which appends a training cycle runs.
///
/// Training fires once the log holds at least one full window plus a target,
/// and then every time its length is a multiple of `every`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainingTrigger {
    window: usize,
    every: usize,
}

impl TrainingTrigger {
    pub fn new(window: usize, every: usize) -> Self {
        Self {
            window,
            every: every.max(1),
        }
    }

    pub fn should_train(&self, log_len: usize) -> bool {
        log_len > self.window && log_len % self.every == 0
    }
}

impl From<&PipelineSettings> for TrainingTrigger {
    fn from(settings: &PipelineSettings) -> Self {
        Self::new(settings.window, settings.train_every())
    }
}

/// Tracks which windows this session has already trained on.
///
/// Windows are identified by the log position of their target record. The
/// cursor only moves after a successful cycle, so failed windows are retried
/// on the next trigger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrainingCursor {
    next_target: usize,
    cap: usize,
}

impl TrainingCursor {
    pub fn new(cap: usize) -> Self {
        Self {
            next_target: 0,
            cap: cap.max(1),
        }
    }

    /// First target position to train on for a log of `log_len` records,
    /// keeping at most `cap` windows.
    pub fn first_target(&self, log_len: usize) -> usize {
        self.next_target.max(log_len.saturating_sub(self.cap))
    }

    pub fn advance_to(&mut self, log_len: usize) {
        self.next_target = self.next_target.max(log_len);
    }

    pub fn rewind(&mut self) {
        self.next_target = 0;
    }
}
