use serde::Serialize;

/// Gate in front of outbound generation requests.
///
/// `cooldown_remaining_secs > 0` always implies `can_request == false`. A
/// claim with no cooldown (a request in flight) is only released by the
/// controller, never by a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThrottleState {
    pub can_request: bool,
    pub cooldown_remaining_secs: u64,
    #[serde(skip)]
    epoch: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    InFlight,
    Cooling,
}

impl Default for ThrottleState {
    fn default() -> Self {
        Self {
            can_request: true,
            cooldown_remaining_secs: 0,
            epoch: 0,
        }
    }
}

impl ThrottleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        if self.cooldown_remaining_secs > 0 {
            Phase::Cooling
        } else if self.can_request {
            Phase::Idle
        } else {
            Phase::InFlight
        }
    }

    /// Epoch of the most recently started cooldown.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Takes the single request slot. Returns false when it is not free.
    pub fn try_claim(&mut self) -> bool {
        if !self.can_request {
            return false;
        }
        self.can_request = false;
        true
    }

    /// Returns to Idle immediately, discarding any pending cooldown.
    pub fn release(&mut self) {
        self.can_request = true;
        self.cooldown_remaining_secs = 0;
        self.epoch += 1;
    }

    /// Starts a new cooldown, superseding any previous one. Returns its epoch.
    pub fn start_cooldown(&mut self, secs: u64) -> u64 {
        if secs == 0 {
            self.release();
            return self.epoch;
        }
        self.epoch += 1;
        self.can_request = false;
        self.cooldown_remaining_secs = secs;
        self.epoch
    }

    pub fn tick(&mut self) {
        if self.cooldown_remaining_secs == 0 {
            return;
        }
        self.cooldown_remaining_secs -= 1;
        if self.cooldown_remaining_secs == 0 {
            self.can_request = true;
        }
    }

    /// Tick issued by a scheduled ticker. Ignored when `epoch` is stale.
    pub fn tick_for(&mut self, epoch: u64) -> bool {
        if epoch != self.epoch {
            return false;
        }
        self.tick();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_idle() {
        let state = ThrottleState::new();
        assert!(state.can_request);
        assert_eq!(state.cooldown_remaining_secs, 0);
        assert_eq!(state.phase(), Phase::Idle);
    }

    #[test]
    fn test_claim_is_exclusive() {
        let mut state = ThrottleState::new();
        assert!(state.try_claim());
        assert_eq!(state.phase(), Phase::InFlight);
        assert!(!state.try_claim());

        // ticks never release an in-flight claim
        state.tick();
        assert!(!state.can_request);

        state.release();
        assert!(state.try_claim());
    }

    #[test]
    fn test_ticks_release_exactly_at_zero() {
        let mut state = ThrottleState::new();
        state.try_claim();
        state.start_cooldown(5);

        for remaining in (1..5).rev() {
            state.tick();
            assert_eq!(state.cooldown_remaining_secs, remaining);
            assert!(!state.can_request);
        }
        state.tick();
        assert!(state.can_request);
        assert_eq!(state.phase(), Phase::Idle);

        state.tick();
        assert_eq!(state.cooldown_remaining_secs, 0);
        assert!(state.can_request);
    }

    #[test]
    fn test_new_cooldown_supersedes_old_ticker() {
        let mut state = ThrottleState::new();
        let first = state.start_cooldown(60);
        let second = state.start_cooldown(3);
        assert_ne!(first, second);

        assert!(!state.tick_for(first));
        assert_eq!(state.cooldown_remaining_secs, 3);
        assert!(state.tick_for(second));
        assert_eq!(state.cooldown_remaining_secs, 2);
    }

    #[test]
    fn test_zero_cooldown_releases() {
        let mut state = ThrottleState::new();
        state.try_claim();
        state.start_cooldown(0);
        assert_eq!(state.phase(), Phase::Idle);
    }
}
