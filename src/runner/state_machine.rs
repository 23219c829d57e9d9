use crate::runner::error::{RunnerError, RunnerResult};

/// Consecutive non-zero exits within one round that mark the VPN as suspect
pub const SUSPECT_FAILURE_STREAK: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Making attempt `round_attempt` (1-based) of the current round
    Attempting { round_attempt: u32 },
    RestartingVpn,
    Succeeded,
    Exhausted,
}

impl RetryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RetryState::Succeeded | RetryState::Exhausted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryEvent {
    AttemptSucceeded,
    AttemptFailed {
        retryable: bool,
        nonzero_exit: bool,
        /// Health probe verdict; only consulted when the round is used up
        vpn_unhealthy: bool,
    },
    VpnRestarted,
    Cancelled,
}

/// Attempt and restart bookkeeping for one runner call
///
/// Every attempt counts toward `test_attempts`, across rounds. A round that
/// runs out of attempts ends in a restart only if the VPN looks unhealthy
/// and restart budget remains; otherwise the run is exhausted.
#[derive(Debug, Clone)]
pub struct RetryStateMachine {
    max_test_attempts: u32,
    max_vpn_restarts: u32,
    state: RetryState,
    test_attempts: u32,
    vpn_restart_attempts: u32,
    failure_streak: u32,
}

impl RetryStateMachine {
    pub fn new(max_test_attempts: u32, max_vpn_restarts: u32) -> Self {
        Self {
            max_test_attempts: max_test_attempts.max(1),
            max_vpn_restarts,
            state: RetryState::Attempting { round_attempt: 1 },
            test_attempts: 0,
            vpn_restart_attempts: 0,
            failure_streak: 0,
        }
    }

    pub fn current_state(&self) -> RetryState {
        self.state
    }

    pub fn test_attempts(&self) -> u32 {
        self.test_attempts
    }

    pub fn vpn_restart_attempts(&self) -> u32 {
        self.vpn_restart_attempts
    }

    /// Whether a failure of the current attempt would end the round with a
    /// restart still affordable, so the VPN's health is worth probing.
    pub fn needs_health_probe(&self) -> bool {
        match self.state {
            RetryState::Attempting { round_attempt } => {
                round_attempt >= self.max_test_attempts
                    && self.vpn_restart_attempts < self.max_vpn_restarts
            }
            _ => false,
        }
    }

    pub fn transition(&mut self, event: RetryEvent) -> RunnerResult<RetryState> {
        let next = match (self.state, event) {
            (RetryState::Attempting { .. }, RetryEvent::AttemptSucceeded) => {
                self.test_attempts += 1;
                RetryState::Succeeded
            }

            (
                RetryState::Attempting { round_attempt },
                RetryEvent::AttemptFailed {
                    retryable,
                    nonzero_exit,
                    vpn_unhealthy,
                },
            ) => {
                self.test_attempts += 1;
                self.failure_streak = if nonzero_exit { self.failure_streak + 1 } else { 0 };

                if !retryable {
                    RetryState::Exhausted
                } else if round_attempt < self.max_test_attempts {
                    RetryState::Attempting {
                        round_attempt: round_attempt + 1,
                    }
                } else {
                    let suspect = vpn_unhealthy || self.failure_streak >= SUSPECT_FAILURE_STREAK;
                    if suspect && self.vpn_restart_attempts < self.max_vpn_restarts {
                        RetryState::RestartingVpn
                    } else {
                        RetryState::Exhausted
                    }
                }
            }

            (RetryState::RestartingVpn, RetryEvent::VpnRestarted) => {
                self.vpn_restart_attempts += 1;
                self.failure_streak = 0;
                RetryState::Attempting { round_attempt: 1 }
            }

            (state, RetryEvent::Cancelled) if !state.is_terminal() => RetryState::Exhausted,

            (state, event) => {
                return Err(RunnerError::InvalidTransition(format!(
                    "Cannot handle {event:?} in state {state:?}"
                )));
            }
        };

        self.state = next;
        Ok(next)
    }
}
