//! Negotiation queue
//!
//! Serializes everything that produces a new local description so that at
//! most one offer/answer round is in flight per peer connection. A round
//! stays in flight from the moment its offer is emitted until the remote
//! answer is processed, the remote side reports an error, or the connection
//! closes.

use std::collections::VecDeque;
use std::fmt;

use tracing::debug;

use crate::adapter::AdapterCall;
use crate::config::ConfigUpdate;
use crate::state_machine::Trigger;

/// How a queued configuration update ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The new caps were negotiated into the SDP and answered
    Negotiated,
    /// Only an `updatestream` message was needed and it was sent
    Signaled,
    /// Nothing in the update required any action
    Unchanged,
    Failed(String),
    /// The connection closed before the update completed
    Cancelled,
}

/// Completion callback of `update_configuration`
pub type UpdateCallback = Box<dyn FnOnce(UpdateOutcome) + Send + 'static>;

/// A request waiting for its negotiation round
pub enum QueuedNegotiation {
    CreateOffer {
        is_subscribe: bool,
        ice_restart: bool,
    },
    NegotiateMaxBw {
        update: ConfigUpdate,
        callback: Option<UpdateCallback>,
    },
}

impl fmt::Debug for QueuedNegotiation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateOffer { is_subscribe, ice_restart } => f
                .debug_struct("CreateOffer")
                .field("is_subscribe", is_subscribe)
                .field("ice_restart", ice_restart)
                .finish(),
            Self::NegotiateMaxBw { update, callback } => f
                .debug_struct("NegotiateMaxBw")
                .field("update", update)
                .field("has_callback", &callback.is_some())
                .finish(),
        }
    }
}

impl QueuedNegotiation {
    pub fn trigger(&self) -> Trigger {
        match self {
            Self::CreateOffer { .. } => Trigger::CreateOffer,
            Self::NegotiateMaxBw { .. } => Trigger::NegotiateMaxBw,
        }
    }

    /// Split into the adapter call and the callback to hold while in flight
    pub fn into_call(self) -> (AdapterCall, Option<UpdateCallback>) {
        match self {
            Self::CreateOffer { is_subscribe, ice_restart } => {
                (AdapterCall::CreateOffer { is_subscribe, ice_restart }, None)
            }
            Self::NegotiateMaxBw { update, callback } => (AdapterCall::NegotiateMaxBw(update), callback),
        }
    }
}

struct InFlight {
    trigger: Trigger,
    callback: Option<UpdateCallback>,
}

/// FIFO of pending negotiations plus the in-flight slot
#[derive(Default)]
pub struct NegotiationQueue {
    pending: VecDeque<QueuedNegotiation>,
    in_flight: Option<InFlight>,
}

impl fmt::Debug for NegotiationQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NegotiationQueue")
            .field("pending", &self.pending)
            .field("in_flight", &self.in_flight.as_ref().map(|r| r.trigger))
            .finish()
    }
}

impl NegotiationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a request. A plain offer identical to one already waiting is
    /// coalesced into it.
    pub fn push(&mut self, request: QueuedNegotiation) {
        if let QueuedNegotiation::CreateOffer { is_subscribe, ice_restart } = &request {
            let duplicate = self.pending.iter().any(|queued| {
                matches!(
                    queued,
                    QueuedNegotiation::CreateOffer { is_subscribe: s, ice_restart: r }
                        if s == is_subscribe && r == ice_restart
                )
            });
            if duplicate {
                debug!("Coalescing create-offer with a queued one");
                return;
            }
        }
        debug!("Enqueuing {}, queued: {}", request.trigger(), self.pending.len() + 1);
        self.pending.push_back(request);
    }

    /// Next request to run, if no round is in flight
    pub fn next_ready(&mut self) -> Option<QueuedNegotiation> {
        if self.in_flight.is_some() {
            return None;
        }
        self.pending.pop_front()
    }

    /// Mark a round as in flight until its answer arrives
    pub fn start(&mut self, trigger: Trigger, callback: Option<UpdateCallback>) {
        debug!("Negotiation round in flight: {}", trigger);
        self.in_flight = Some(InFlight { trigger, callback });
    }

    /// Finish the in-flight round. Returns false if none was in flight.
    pub fn complete(&mut self, outcome: UpdateOutcome) -> bool {
        match self.in_flight.take() {
            Some(round) => {
                debug!("Negotiation round {} completed: {:?}", round.trigger, outcome);
                if let Some(callback) = round.callback {
                    callback(outcome);
                }
                true
            }
            None => false,
        }
    }

    /// Drop everything, reporting `Cancelled` to every waiting callback
    pub fn cancel_all(&mut self) {
        self.complete(UpdateOutcome::Cancelled);
        for request in self.pending.drain(..) {
            if let QueuedNegotiation::NegotiateMaxBw { callback: Some(callback), .. } = request {
                callback(UpdateOutcome::Cancelled);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }
}
