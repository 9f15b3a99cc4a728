//! Pure reconnect state machine for the websocket supervisor. Kept
//! side-effect free so its transitions can be exhaustively unit tested
//! without a socket or a clock.

use ral_types::ReconnectConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Disconnected,
    Connecting { attempt: u32 },
    Connected,
    Reconnecting { attempt: u32 },
    Failed,
}

#[derive(Debug, Clone)]
pub enum Event {
    ConnectSucceeded,
    ConnectFailed { message: String },
    SocketClosed,
    ReconnectTimerFired,
    Shutdown,
}

#[derive(Debug, Clone)]
pub enum Action {
    OpenSocket,
    CloseSocket,
    ResubscribeAll,
    ScheduleReconnect { delay_ms: u64 },
    EmitReconnecting { attempt: u32, delay_ms: u64 },
    EmitReconnected { attempts: u32 },
    EmitFailed { message: String },
}

#[derive(Debug, Clone, Copy)]
pub struct Supervisor {
    pub phase: Phase,
    pub config: ReconnectConfig,
}

impl Supervisor {
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            phase: Phase::Disconnected,
            config,
        }
    }

    #[must_use]
    pub fn handle(mut self, event: Event) -> (Self, Vec<Action>) {
        let (next_phase, actions) = match (self.phase, event) {
            (Phase::Disconnected | Phase::Connecting { .. }, Event::ConnectSucceeded) => {
                let attempt = match self.phase {
                    Phase::Connecting { attempt } => attempt,
                    _ => 0,
                };
                let mut actions = vec![Action::ResubscribeAll];
                if attempt > 0 {
                    actions.push(Action::EmitReconnected { attempts: attempt });
                }
                (Phase::Connected, actions)
            }
            (Phase::Connecting { attempt }, Event::ConnectFailed { message }) => {
                let next_attempt = attempt + 1;
                if next_attempt > self.config.max_attempts {
                    (Phase::Failed, vec![Action::EmitFailed { message }])
                } else {
                    let delay = super::backoff::delay_for_attempt(&self.config, next_attempt);
                    (
                        Phase::Reconnecting { attempt: next_attempt },
                        vec![
                            Action::EmitReconnecting {
                                attempt: next_attempt,
                                delay_ms: delay,
                            },
                            Action::ScheduleReconnect { delay_ms: delay },
                        ],
                    )
                }
            }
            (Phase::Reconnecting { attempt }, Event::ReconnectTimerFired) => {
                (Phase::Connecting { attempt }, vec![Action::OpenSocket])
            }
            (Phase::Connected, Event::SocketClosed) => {
                let attempt = 1;
                let delay = super::backoff::delay_for_attempt(&self.config, attempt);
                (
                    Phase::Reconnecting { attempt },
                    vec![
                        Action::EmitReconnecting { attempt, delay_ms: delay },
                        Action::ScheduleReconnect { delay_ms: delay },
                    ],
                )
            }
            (Phase::Failed, _) => (Phase::Failed, Vec::new()),
            (_, Event::Shutdown) => (Phase::Disconnected, vec![Action::CloseSocket]),
            (phase, _) => (phase, Vec::new()),
        };
        self.phase = next_phase;
        (self, actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ReconnectConfig {
        ReconnectConfig {
            base_delay_ms: 100,
            max_delay_ms: 1000,
            jitter_ms: 0,
            max_attempts: 2,
        }
    }

    #[test]
    fn initial_connect_resubscribes_without_reconnected_notice() {
        let sm = Supervisor::new(config());
        let (sm, actions) = sm.handle(Event::ConnectSucceeded);
        assert_eq!(sm.phase, Phase::Connected);
        assert!(matches!(actions.as_slice(), [Action::ResubscribeAll]));
    }

    #[test]
    fn socket_close_enters_reconnecting_with_backoff_scheduled() {
        let sm = Supervisor::new(config());
        let (sm, _) = sm.handle(Event::ConnectSucceeded);
        let (sm, actions) = sm.handle(Event::SocketClosed);
        assert_eq!(sm.phase, Phase::Reconnecting { attempt: 1 });
        assert!(actions.iter().any(|a| matches!(a, Action::ScheduleReconnect { .. })));
    }

    #[test]
    fn reconnect_timer_transitions_to_connecting_and_opens_socket() {
        let sm = Supervisor::new(config());
        let (sm, _) = sm.handle(Event::ConnectSucceeded);
        let (sm, _) = sm.handle(Event::SocketClosed);
        let (sm, actions) = sm.handle(Event::ReconnectTimerFired);
        assert_eq!(sm.phase, Phase::Connecting { attempt: 1 });
        assert!(matches!(actions.as_slice(), [Action::OpenSocket]));
    }

    #[test]
    fn successful_reconnect_emits_reconnected_with_attempt_count() {
        let sm = Supervisor::new(config());
        let (sm, _) = sm.handle(Event::ConnectSucceeded);
        let (sm, _) = sm.handle(Event::SocketClosed);
        let (sm, _) = sm.handle(Event::ReconnectTimerFired);
        let (sm, actions) = sm.handle(Event::ConnectSucceeded);
        assert_eq!(sm.phase, Phase::Connected);
        assert!(actions.iter().any(|a| matches!(a, Action::EmitReconnected { attempts: 1 })));
    }

    #[test]
    fn exhausting_max_attempts_transitions_to_failed() {
        let sm = Supervisor::new(config());
        let (mut sm, _) = sm.handle(Event::ConnectSucceeded);
        sm = sm.handle(Event::SocketClosed).0;
        for _ in 0..config().max_attempts {
            sm = sm.handle(Event::ReconnectTimerFired).0;
            let (next, actions) = sm.handle(Event::ConnectFailed { message: "boom".into() });
            sm = next;
            if sm.phase == Phase::Failed {
                assert!(actions.iter().any(|a| matches!(a, Action::EmitFailed { .. })));
                return;
            }
        }
        panic!("expected supervisor to reach Failed within max_attempts reconnects");
    }

    #[test]
    fn failed_is_terminal() {
        let mut sm = Supervisor::new(ReconnectConfig {
            max_attempts: 0,
            ..config()
        });
        sm = sm.handle(Event::ConnectSucceeded).0;
        sm = sm.handle(Event::SocketClosed).0;
        sm = sm.handle(Event::ReconnectTimerFired).0;
        let (sm, _) = sm.handle(Event::ConnectFailed { message: "boom".into() });
        assert_eq!(sm.phase, Phase::Failed);
        let (sm, actions) = sm.handle(Event::ReconnectTimerFired);
        assert_eq!(sm.phase, Phase::Failed);
        assert!(actions.is_empty());
    }
}
