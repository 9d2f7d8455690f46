use serde::{Deserialize, Serialize};
use statig::prelude::*;
use std::fmt;

use crate::domain::EmployeeId;

/// What happened to the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The backend acknowledged the subscription.
    Confirmed,
    /// No acknowledgement arrived within the confirm timeout.
    ConfirmTimeout,
    /// The subscription failed or was dropped by the backend.
    ChannelError,
    /// The owner is going away.
    Close,
}

/// Which channel currently keeps the view fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelMode {
    Connecting,
    LivePush,
    FallbackPoll,
    Closed,
}

impl ChannelMode {
    pub fn is_polling(self) -> bool {
        self == ChannelMode::FallbackPoll
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelMode::Connecting => "connecting",
            ChannelMode::LivePush => "live_push",
            ChannelMode::FallbackPoll => "fallback_poll",
            ChannelMode::Closed => "closed",
        }
    }
}

impl fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Default)]
struct Supervisor {
    employee_id: EmployeeId,
}

#[state_machine(initial = "State::connecting()")]
impl Supervisor {
    #[state]
    fn connecting(&mut self, event: &ChannelEvent) -> Outcome<State> {
        match event {
            ChannelEvent::Confirmed => {
                tracing::info!(employee_id = %self.employee_id, "Push channel confirmed");
                Transition(State::live_push())
            }
            ChannelEvent::ConfirmTimeout => {
                tracing::warn!(
                    employee_id = %self.employee_id,
                    "Push channel did not confirm in time, falling back to polling"
                );
                Transition(State::fallback_poll())
            }
            ChannelEvent::ChannelError => {
                tracing::warn!(employee_id = %self.employee_id, "Push channel failed before confirming");
                Transition(State::fallback_poll())
            }
            ChannelEvent::Close => Transition(State::closed()),
        }
    }

    #[state]
    fn live_push(&mut self, event: &ChannelEvent) -> Outcome<State> {
        match event {
            ChannelEvent::ChannelError => {
                tracing::warn!(employee_id = %self.employee_id, "Push channel lost, falling back to polling");
                Transition(State::fallback_poll())
            }
            ChannelEvent::Close => Transition(State::closed()),
            _ => Handled,
        }
    }

    #[state]
    fn fallback_poll(&mut self, event: &ChannelEvent) -> Outcome<State> {
        match event {
            ChannelEvent::Confirmed => {
                tracing::info!(employee_id = %self.employee_id, "Push channel confirmed late, stopping poll");
                Transition(State::live_push())
            }
            ChannelEvent::Close => Transition(State::closed()),
            _ => Handled,
        }
    }

    #[state]
    fn closed(&mut self, event: &ChannelEvent) -> Outcome<State> {
        tracing::trace!(employee_id = %self.employee_id, ?event, "Ignoring channel event after close");
        Handled
    }
}

/// Push/poll supervisor for one coordinator.
///
/// `connecting` waits for the subscription acknowledgement; the timeout or
/// a channel error moves to `fallback_poll`; a (late) confirmation always
/// lands in `live_push`. `closed` absorbs everything.
pub struct ChannelSupervisor {
    machine: StateMachine<Supervisor>,
}

impl ChannelSupervisor {
    pub fn new(employee_id: EmployeeId) -> Self {
        Self {
            machine: Supervisor { employee_id }.state_machine(),
        }
    }

    pub fn mode(&self) -> ChannelMode {
        match self.machine.state() {
            State::Connecting { .. } => ChannelMode::Connecting,
            State::LivePush { .. } => ChannelMode::LivePush,
            State::FallbackPoll { .. } => ChannelMode::FallbackPoll,
            State::Closed { .. } => ChannelMode::Closed,
        }
    }

    /// Feed one event; returns the new mode when it changed.
    pub fn handle(&mut self, event: ChannelEvent) -> Option<ChannelMode> {
        let before = self.mode();
        self.machine.handle(&event);
        let after = self.mode();
        (before != after).then_some(after)
    }
}
