pub mod history;
pub mod machine;
pub mod table;

pub use history::{TransitionHistory, TransitionRecord, HISTORY_SIZE_LIMIT};
pub use machine::{NegotiationStateMachine, PendingTransition, Refusal};
pub use table::{
    NegotiationState, Target, Transition, TransitionResult, TransitionTable, Trigger, ACTIVE_STATES,
};

use lazy_static::lazy_static;
use std::sync::Arc;

lazy_static! {
    /// The negotiation transition table shared by every state machine
    pub static ref NEGOTIATION_TABLE: Arc<TransitionTable> = Arc::new(build_negotiation_table());
}

fn build_negotiation_table() -> TransitionTable {
    let table = TransitionTable::standard();
    if let Err(errors) = table.validate() {
        tracing::error!("Negotiation transition table failed validation: {:?}", errors);
    }
    tracing::debug!("Built negotiation table with {} transitions", table.transition_count());
    table
}
