use serde::Serialize;

/// Observable coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    PendingDebounce,
    Refreshing,
}

/// What the driver must do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    None,
    /// (Re)start the debounce timer.
    ArmTimer,
    /// Spawn a refresh cycle and cancel any armed timer.
    StartRefresh,
}

/// Debounce + single-flight refresh state machine. Holds no clock: the
/// driver reports timer fires and cycle completions as events.
#[derive(Debug, Default)]
pub struct RefreshMachine {
    refreshing: bool,
    timer_armed: bool,
    pending_requests: u32,
    /// A timer fired during a cycle; one more cycle is owed.
    rerun: bool,
}

impl RefreshMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        if self.refreshing {
            Phase::Refreshing
        } else if self.timer_armed {
            Phase::PendingDebounce
        } else {
            Phase::Idle
        }
    }

    /// Requests received since the timer was last armed from idle.
    pub fn pending_requests(&self) -> u32 {
        self.pending_requests
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing
    }

    /// Debounced trigger (webhook, periodic timer).
    pub fn on_request(&mut self) -> Effect {
        self.timer_armed = true;
        self.pending_requests = self.pending_requests.saturating_add(1);
        Effect::ArmTimer
    }

    /// Debounce timer elapsed.
    pub fn on_timer(&mut self) -> Effect {
        if !self.timer_armed {
            return Effect::None;
        }
        self.timer_armed = false;
        self.pending_requests = 0;

        if self.refreshing {
            self.rerun = true;
            Effect::None
        } else {
            self.start()
        }
    }

    /// Startup path: bypasses the debounce, skipped while a cycle runs.
    pub fn on_immediate(&mut self) -> Effect {
        if self.refreshing {
            Effect::None
        } else {
            self.start()
        }
    }

    /// The in-flight cycle finished, successfully or not.
    pub fn on_complete(&mut self) -> Effect {
        self.refreshing = false;
        if std::mem::take(&mut self.rerun) {
            self.start()
        } else {
            Effect::None
        }
    }

    /// A starting cycle observes every request received so far.
    fn start(&mut self) -> Effect {
        self.refreshing = true;
        self.timer_armed = false;
        self.pending_requests = 0;
        Effect::StartRefresh
    }
}
