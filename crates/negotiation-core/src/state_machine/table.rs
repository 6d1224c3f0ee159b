use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Coarse negotiation phase of a peer connection
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NegotiationState {
    /// No offer/answer exchange has completed yet
    Initial,
    /// The last offer/answer exchange completed
    Stable,
    /// A guarded operation failed; negotiation may be retried
    Failed,
    /// Terminal
    Closed,
}

impl NegotiationState {
    /// States from which the connection can still negotiate
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Closed)
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initial => write!(f, "initial"),
            Self::Stable => write!(f, "stable"),
            Self::Failed => write!(f, "failed"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Events that drive the negotiation state machine
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Trigger {
    CreateOffer,
    ProcessOffer,
    ProcessAnswer,
    NegotiateMaxBw,
    AddIceCandidate,
    AddStream,
    RemoveStream,
    Close,
    Error,
}

impl Trigger {
    pub const ALL: [Trigger; 9] = [
        Trigger::CreateOffer,
        Trigger::ProcessOffer,
        Trigger::ProcessAnswer,
        Trigger::NegotiateMaxBw,
        Trigger::AddIceCandidate,
        Trigger::AddStream,
        Trigger::RemoveStream,
        Trigger::Close,
        Trigger::Error,
    ];

    /// Triggers that produce or consume an SDP
    pub fn is_sdp_exchange(&self) -> bool {
        matches!(
            self,
            Self::CreateOffer | Self::ProcessOffer | Self::ProcessAnswer | Self::NegotiateMaxBw
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateOffer => "create-offer",
            Self::ProcessOffer => "process-offer",
            Self::ProcessAnswer => "process-answer",
            Self::NegotiateMaxBw => "negotiate-max-bw",
            Self::AddIceCandidate => "add-ice-candidate",
            Self::AddStream => "add-stream",
            Self::RemoveStream => "remove-stream",
            Self::Close => "close",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// States from which every trigger except `error` may fire
pub const ACTIVE_STATES: &[NegotiationState] = &[
    NegotiationState::Initial,
    NegotiationState::Failed,
    NegotiationState::Stable,
];

/// Where a transition leads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    State(NegotiationState),
    /// Self-loop: the state does not change
    Unchanged,
}

/// Transition definition - which states a trigger may fire from and where it leads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: Vec<NegotiationState>,
    pub target: Target,
}

impl Transition {
    pub fn new(from: &[NegotiationState], target: Target) -> Self {
        Self {
            from: from.to_vec(),
            target,
        }
    }

    fn resolve(&self, current: NegotiationState) -> NegotiationState {
        match self.target {
            Target::State(state) => state,
            Target::Unchanged => current,
        }
    }
}

/// Result of evaluating a trigger against the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionResult {
    Allowed {
        from: NegotiationState,
        to: NegotiationState,
    },
    Denied {
        from: NegotiationState,
    },
}

/// Table of legal transitions keyed by trigger
#[derive(Debug, Clone)]
pub struct TransitionTable {
    transitions: HashMap<Trigger, Transition>,
}

impl TransitionTable {
    pub fn new() -> Self {
        Self {
            transitions: HashMap::new(),
        }
    }

    /// The negotiation table: SDP exchanges converge on `stable`, side
    /// operations loop, `close` is terminal and `error` lands in `failed`.
    pub fn standard() -> Self {
        use NegotiationState::*;

        let mut table = Self::new();
        for trigger in [
            Trigger::CreateOffer,
            Trigger::ProcessOffer,
            Trigger::ProcessAnswer,
            Trigger::NegotiateMaxBw,
        ] {
            table.insert(trigger, Transition::new(ACTIVE_STATES, Target::State(Stable)));
        }
        for trigger in [Trigger::AddIceCandidate, Trigger::AddStream, Trigger::RemoveStream] {
            table.insert(trigger, Transition::new(ACTIVE_STATES, Target::Unchanged));
        }
        table.insert(Trigger::Close, Transition::new(ACTIVE_STATES, Target::State(Closed)));
        // closed absorbs errors too
        table.insert(Trigger::Error, Transition::new(ACTIVE_STATES, Target::State(Failed)));
        table
    }

    pub fn insert(&mut self, trigger: Trigger, transition: Transition) {
        self.transitions.insert(trigger, transition);
    }

    pub fn get(&self, trigger: Trigger) -> Option<&Transition> {
        self.transitions.get(&trigger)
    }

    pub fn transition_count(&self) -> usize {
        self.transitions.len()
    }

    /// Evaluate `trigger` in `state` without side effects
    pub fn evaluate(&self, state: NegotiationState, trigger: Trigger) -> TransitionResult {
        match self.transitions.get(&trigger) {
            Some(transition) if transition.from.contains(&state) => TransitionResult::Allowed {
                from: state,
                to: transition.resolve(state),
            },
            _ => TransitionResult::Denied { from: state },
        }
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for trigger in Trigger::ALL {
            if !self.transitions.contains_key(&trigger) {
                errors.push(format!("Trigger {} has no transition", trigger));
            }
        }

        for state in ACTIVE_STATES {
            let can_close = self
                .get(Trigger::Close)
                .map(|t| t.from.contains(state))
                .unwrap_or(false);
            if !can_close {
                errors.push(format!("Active state {} cannot be closed", state));
            }
        }

        let closed_exits: Vec<_> = self
            .transitions
            .iter()
            .filter(|(_, t)| t.from.contains(&NegotiationState::Closed))
            .map(|(trigger, _)| trigger.to_string())
            .collect();
        if !closed_exits.is_empty() {
            errors.push(format!("Terminal state closed has exits: {:?}", closed_exits));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Default for TransitionTable {
    fn default() -> Self {
        Self::standard()
    }
}
