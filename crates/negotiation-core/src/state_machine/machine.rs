use std::sync::Arc;
use tracing::{debug, info, warn};

use super::history::TransitionHistory;
use super::table::{NegotiationState, TransitionResult, TransitionTable, Trigger};
use super::NEGOTIATION_TABLE;

/// Why a trigger was not allowed to start a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    /// The machine is closed; every trigger is a no-op
    Closed { trigger: Trigger },
    /// The trigger is not legal from the current state
    Invalid { trigger: Trigger, from: NegotiationState },
    /// Another transition has begun and not yet completed
    Pending { trigger: Trigger, pending: Trigger },
}

impl std::fmt::Display for Refusal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed { trigger } => write!(f, "{} ignored, connection closed", trigger),
            Self::Invalid { trigger, from } => write!(f, "invalid transition {} from {}", trigger, from),
            Self::Pending { trigger, pending } => {
                write!(f, "{} refused while {} is pending", trigger, pending)
            }
        }
    }
}

/// A transition that passed the table check and awaits its guarded operation
#[derive(Debug)]
#[must_use = "a pending transition must be committed, cancelled or failed"]
pub struct PendingTransition {
    trigger: Trigger,
    from: NegotiationState,
    to: NegotiationState,
}

impl PendingTransition {
    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    pub fn from(&self) -> NegotiationState {
        self.from
    }

    pub fn to(&self) -> NegotiationState {
        self.to
    }
}

/// Negotiation state machine
///
/// Every guarded operation runs between [`begin`](Self::begin) and one of
/// [`commit`](Self::commit), [`cancel`](Self::cancel) or [`fail`](Self::fail).
/// Only committed transitions (including the `error` transition raised by
/// `fail`) are written to the history.
#[derive(Debug)]
pub struct NegotiationStateMachine {
    table: Arc<TransitionTable>,
    state: NegotiationState,
    history: TransitionHistory,
    pending: Option<Trigger>,
}

impl NegotiationStateMachine {
    pub fn new(history_limit: usize) -> Self {
        Self::with_table(NEGOTIATION_TABLE.clone(), history_limit)
    }

    pub fn with_table(table: Arc<TransitionTable>, history_limit: usize) -> Self {
        Self {
            table,
            state: NegotiationState::Initial,
            history: TransitionHistory::new(history_limit),
            pending: None,
        }
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn history(&self) -> &TransitionHistory {
        &self.history
    }

    pub fn is_closed(&self) -> bool {
        self.state == NegotiationState::Closed
    }

    pub fn pending(&self) -> Option<Trigger> {
        self.pending
    }

    /// Check `trigger` against the table and reserve the transition
    pub fn begin(&mut self, trigger: Trigger) -> Result<PendingTransition, Refusal> {
        if let Some(pending) = self.pending {
            warn!(
                "FSM Error Pending transition: {}, from: {}, pending: {}",
                trigger, self.state, pending
            );
            return Err(Refusal::Pending { trigger, pending });
        }

        match self.table.evaluate(self.state, trigger) {
            TransitionResult::Allowed { from, to } => {
                debug!("FSM before {}, from: {}, to: {}", trigger, from, to);
                self.pending = Some(trigger);
                Ok(PendingTransition { trigger, from, to })
            }
            TransitionResult::Denied { from: NegotiationState::Closed } => {
                info!("Trying to transition a closed FSM, transition: {}", trigger);
                Err(Refusal::Closed { trigger })
            }
            TransitionResult::Denied { from } => {
                warn!("FSM Error Invalid transition: {}, from: {}", trigger, from);
                Err(Refusal::Invalid { trigger, from })
            }
        }
    }

    /// Complete a transition whose guarded operation succeeded
    pub fn commit(&mut self, transition: PendingTransition) -> NegotiationState {
        let PendingTransition { trigger, from, to } = transition;
        self.pending = None;
        self.state = to;
        let sequence = self.history.record(from, to, trigger);
        debug!(sequence, "FSM onTransition, transition: {}, from: {}, to: {}", trigger, from, to);

        if from != to {
            match to {
                NegotiationState::Stable => info!("FSM reached STABLE, from: {}", from),
                NegotiationState::Closed => info!("FSM reached close, from: {}", from),
                NegotiationState::Failed => warn!("FSM reached failed, from: {}", from),
                NegotiationState::Initial => {}
            }
        }
        self.state
    }

    /// Drop a transition whose guarded operation declined to proceed
    pub fn cancel(&mut self, transition: PendingTransition) -> NegotiationState {
        self.pending = None;
        debug!(
            "FSM transition cancelled: {}, staying in {}",
            transition.trigger, self.state
        );
        self.state
    }

    /// Drop a transition whose guarded operation failed and raise `error`
    pub fn fail(&mut self, transition: PendingTransition, reason: &str) -> NegotiationState {
        self.pending = None;
        warn!(
            "FSM Error Transition Failed, message: {}, from: {}, to: {}, printing history:",
            reason, transition.from, transition.to
        );
        for record in self.history.iter() {
            warn!("{}", record);
        }
        self.raise_error(reason)
    }

    /// Fire the `error` trigger
    pub fn raise_error(&mut self, reason: &str) -> NegotiationState {
        match self.begin(Trigger::Error) {
            Ok(transition) => {
                debug!("Raising error: {}", reason);
                self.commit(transition)
            }
            Err(_) => self.state,
        }
    }

    /// Run a transition that has no guarded operation
    pub fn fire(&mut self, trigger: Trigger) -> Result<NegotiationState, Refusal> {
        let transition = self.begin(trigger)?;
        Ok(self.commit(transition))
    }
}

impl Default for NegotiationStateMachine {
    fn default() -> Self {
        Self::new(super::history::HISTORY_SIZE_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::history::HISTORY_SIZE_LIMIT;
    use NegotiationState::*;

    #[test]
    fn starts_initial_with_empty_history() {
        let machine = NegotiationStateMachine::default();
        assert_eq!(machine.state(), Initial);
        assert!(machine.history().is_empty());
        assert_eq!(machine.pending(), None);
    }

    #[test]
    fn commit_records_history() {
        let mut machine = NegotiationStateMachine::default();
        let transition = machine.begin(Trigger::CreateOffer).unwrap();
        assert_eq!(transition.to(), Stable);
        assert_eq!(machine.commit(transition), Stable);

        let record = machine.history().last().unwrap();
        assert_eq!((record.from, record.to, record.trigger), (Initial, Stable, Trigger::CreateOffer));
    }

    #[test]
    fn cancel_leaves_state_and_history_untouched() {
        let mut machine = NegotiationStateMachine::default();
        let transition = machine.begin(Trigger::CreateOffer).unwrap();
        assert_eq!(machine.cancel(transition), Initial);
        assert!(machine.history().is_empty());
    }

    #[test]
    fn fail_moves_to_failed_and_records_error() {
        let mut machine = NegotiationStateMachine::default();
        machine.fire(Trigger::CreateOffer).unwrap();

        let transition = machine.begin(Trigger::ProcessAnswer).unwrap();
        assert_eq!(machine.fail(transition, "bad sdp"), Failed);

        let triggers: Vec<_> = machine.history().iter().map(|r| r.trigger).collect();
        assert_eq!(triggers, vec![Trigger::CreateOffer, Trigger::Error]);
    }

    #[test]
    fn second_begin_is_refused_while_pending() {
        let mut machine = NegotiationStateMachine::default();
        let first = machine.begin(Trigger::CreateOffer).unwrap();
        assert_eq!(
            machine.begin(Trigger::AddStream).unwrap_err(),
            Refusal::Pending { trigger: Trigger::AddStream, pending: Trigger::CreateOffer }
        );
        machine.commit(first);
        assert!(machine.begin(Trigger::AddStream).is_ok());
    }

    #[test]
    fn closed_is_absorbing() {
        let mut machine = NegotiationStateMachine::default();
        machine.fire(Trigger::Close).unwrap();
        let before = machine.history().len();

        for trigger in Trigger::ALL {
            assert_eq!(machine.fire(trigger).unwrap_err(), Refusal::Closed { trigger });
        }
        assert_eq!(machine.raise_error("late failure"), Closed);
        assert_eq!(machine.history().len(), before);
    }

    #[test]
    fn custom_table_refuses_invalid_transition() {
        let mut table = TransitionTable::new();
        table.insert(
            Trigger::Close,
            crate::state_machine::table::Transition::new(&[Stable], crate::state_machine::table::Target::State(Closed)),
        );
        let mut machine = NegotiationStateMachine::with_table(Arc::new(table), HISTORY_SIZE_LIMIT);
        assert_eq!(
            machine.fire(Trigger::Close).unwrap_err(),
            Refusal::Invalid { trigger: Trigger::Close, from: Initial }
        );
        assert_eq!(machine.state(), Initial);
    }
}
