//! One-shot alert latch.
//!
//! The latch sits between the per-frame alert condition and the notifier:
//!
//! - `Idle` + condition true  -> `Alerted`, the caller sends one notification.
//! - `Alerted` + condition true -> no-op.
//! - condition false never un-latches. A target that leaves the frame and
//!   comes back is still the same episode until the operator resets.
//! - `reset()` is the only way back to `Idle`.
//!
//! The latch records a notification as attempted the moment it fires, whether
//! or not delivery succeeds, so a failed notification is not retried within
//! the same episode.

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LatchState {
    /// No target seen since the last reset.
    #[default]
    Idle,
    /// Notification attempted; episode ongoing.
    Alerted,
}

/// What the caller should do after feeding the latch one reading.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LatchDecision {
    /// Condition false; nothing to do.
    Quiet,
    /// Condition became true while idle: send exactly one notification.
    Notify,
    /// Condition true but already alerted.
    Hold,
}

#[derive(Clone, Debug, Default)]
pub struct AlertLatch {
    state: LatchState,
    episode_active: bool,
    fired: u64,
    resets: u64,
}

impl AlertLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one frame's alert condition.
    pub fn observe(&mut self, condition: bool) -> LatchDecision {
        self.episode_active = condition;
        match (self.state, condition) {
            (_, false) => LatchDecision::Quiet,
            (LatchState::Idle, true) => {
                self.state = LatchState::Alerted;
                self.fired += 1;
                LatchDecision::Notify
            }
            (LatchState::Alerted, true) => LatchDecision::Hold,
        }
    }

    /// Operator un-latch.
    pub fn reset(&mut self) {
        if self.state == LatchState::Alerted {
            log::info!("alert latch reset after {} alert(s)", self.fired);
        }
        self.state = LatchState::Idle;
        self.episode_active = false;
        self.resets += 1;
    }

    pub fn state(&self) -> LatchState {
        self.state
    }

    pub fn is_alerted(&self) -> bool {
        self.state == LatchState::Alerted
    }

    /// Whether the most recent reading had the condition true.
    pub fn episode_active(&self) -> bool {
        self.episode_active
    }

    /// Times the latch has fired since creation.
    pub fn fired(&self) -> u64 {
        self.fired
    }

    pub fn resets(&self) -> u64 {
        self.resets
    }
}
