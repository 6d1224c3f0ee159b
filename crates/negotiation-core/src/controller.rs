//! Peer connection negotiation controller
//!
//! Funnels every external trigger (application commands, engine
//! notifications, inbound signaling) through the state machine, which runs
//! the matching transport adapter operation only when the current state
//! permits it. Offers are serialized through the negotiation queue.
//!
//! All failures stay inside the controller: they show up as state changes,
//! history records, negotiation logs and emitted signaling messages.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::adapter::{AdapterCall, NegotiationLog, Precondition, TransportAdapter};
use crate::config::{ConfigUpdate, NegotiationConfig, SimulcastConfig};
use crate::engine::{EngineEvent, MediaEngine};
use crate::error::Result;
use crate::queue::{NegotiationQueue, QueuedNegotiation, UpdateCallback, UpdateOutcome};
use crate::signaling::{SignalingMessage, SignalingSender};
use crate::state_machine::{
    NegotiationState, NegotiationStateMachine, Refusal, TransitionHistory, Trigger,
};
use crate::types::{MediaStream, SessionDescription, StreamId};

/// Result of pushing one trigger through the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The guarded operation ran and the transition was committed
    Completed(NegotiationState),
    /// The guarded operation declined; nothing changed
    Cancelled,
    /// The guarded operation failed and `error` was raised
    Failed(String),
    /// The state machine refused the trigger
    Refused(Refusal),
}

impl DispatchOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Negotiation controller for one peer connection
#[derive(Debug)]
pub struct PeerConnectionController {
    machine: NegotiationStateMachine,
    adapter: TransportAdapter,
    queue: NegotiationQueue,
}

impl PeerConnectionController {
    pub fn new(
        config: NegotiationConfig,
        engine: Arc<dyn MediaEngine>,
        signaling: SignalingSender,
    ) -> Result<Self> {
        config.validate()?;
        info!(
            "Creating negotiation controller, p2p: {}, simulcast: {}, managed: {}",
            config.p2p,
            config.simulcast.is_some(),
            config.managed
        );
        Ok(Self {
            machine: NegotiationStateMachine::new(config.history_limit),
            adapter: TransportAdapter::new(config, engine, signaling),
            queue: NegotiationQueue::new(),
        })
    }

    pub fn state(&self) -> NegotiationState {
        self.machine.state()
    }

    pub fn history(&self) -> &TransitionHistory {
        self.machine.history()
    }

    pub fn negotiation_logs(&self) -> &NegotiationLog {
        self.adapter.negotiation_logs()
    }

    pub fn config(&self) -> &NegotiationConfig {
        self.adapter.config()
    }

    pub fn adapter(&self) -> &TransportAdapter {
        &self.adapter
    }

    /// Requests waiting for the in-flight round to finish
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Whether an offer is waiting for its answer
    pub fn is_negotiating(&self) -> bool {
        self.queue.is_in_flight()
    }

    /// Run one guarded operation under the state machine
    pub async fn dispatch(&mut self, call: AdapterCall) -> DispatchOutcome {
        let transition = match self.machine.begin(call.trigger()) {
            Ok(transition) => transition,
            Err(refusal) => return DispatchOutcome::Refused(refusal),
        };

        match self.adapter.execute(call).await {
            Ok(Precondition::Proceed) => DispatchOutcome::Completed(self.machine.commit(transition)),
            Ok(Precondition::Cancel) => {
                self.machine.cancel(transition);
                DispatchOutcome::Cancelled
            }
            Err(e) => {
                let reason = e.to_string();
                self.adapter
                    .record_log(format!("{} failed: {}", transition.trigger(), reason));
                let trigger = transition.trigger();
                self.machine.fail(transition, &reason);
                // only a failed answer ends the round in flight
                if trigger == Trigger::ProcessAnswer {
                    self.queue.complete(UpdateOutcome::Failed(reason.clone()));
                }
                DispatchOutcome::Failed(reason)
            }
        }
    }

    /// Start queued negotiations while no round is in flight
    async fn drain_queue(&mut self) {
        while let Some(request) = self.queue.next_ready() {
            let (call, callback) = request.into_call();
            let trigger = call.trigger();
            match self.dispatch(call).await {
                DispatchOutcome::Completed(_) => self.queue.start(trigger, callback),
                outcome => {
                    debug!("Queued {} did not start: {:?}", trigger, outcome);
                    if let Some(callback) = callback {
                        callback(match outcome {
                            DispatchOutcome::Refused(Refusal::Closed { .. }) => UpdateOutcome::Cancelled,
                            DispatchOutcome::Refused(refusal) => UpdateOutcome::Failed(refusal.to_string()),
                            DispatchOutcome::Failed(reason) => UpdateOutcome::Failed(reason),
                            _ => UpdateOutcome::Failed(format!("{} cancelled", trigger)),
                        });
                    }
                }
            }
        }
    }

    /// Process a message received from the remote peer
    pub async fn handle_signaling_message(&mut self, message: SignalingMessage) -> NegotiationState {
        debug!("processSignalingMessage, type: {}", message.type_name());
        self.adapter
            .record_log(format!("processSignalingMessage, type: {}", message.type_name()));

        match message {
            SignalingMessage::Offer { sdp, .. } => {
                self.dispatch(AdapterCall::ProcessOffer(SessionDescription::offer(sdp)))
                    .await;
            }
            SignalingMessage::Answer { sdp, .. } => {
                let outcome = self
                    .dispatch(AdapterCall::ProcessAnswer(SessionDescription::answer(sdp)))
                    .await;
                if outcome.is_completed() {
                    self.queue.complete(UpdateOutcome::Negotiated);
                }
            }
            SignalingMessage::Candidate { candidate } => {
                self.dispatch(AdapterCall::AddIceCandidate(candidate)).await;
            }
            SignalingMessage::OfferError { .. } => {
                warn!("message: Remote peer could not apply our offer");
                self.queue
                    .complete(UpdateOutcome::Failed("remote offer-error".to_string()));
                self.machine.raise_error("remote offer-error");
            }
            SignalingMessage::Error { previous_type } => {
                let previous = previous_type.as_deref().unwrap_or("unknown");
                error!("message: Received error signaling message, state: {}", previous);
                self.queue.complete(UpdateOutcome::Failed(format!(
                    "remote error after {}",
                    previous
                )));
            }
            SignalingMessage::UpdateStream { .. } => {
                debug!("Ignoring inbound updatestream");
            }
        }

        self.drain_queue().await;
        self.machine.state()
    }

    /// Parse and process a JSON signaling payload; malformed payloads are dropped
    pub async fn handle_signaling_json(&mut self, json: &str) -> NegotiationState {
        match SignalingMessage::from_json(json) {
            Ok(message) => self.handle_signaling_message(message).await,
            Err(e) => {
                warn!("message: Dropping malformed signaling message, error: {}", e);
                self.adapter.record_log(format!("malformed signaling message: {}", e));
                self.machine.state()
            }
        }
    }

    /// Process a notification from the media engine
    pub async fn handle_engine_event(&mut self, event: EngineEvent) {
        if self.machine.is_closed() {
            debug!("Ignoring engine event on closed connection: {:?}", event);
            return;
        }

        match event {
            EngineEvent::NegotiationNeeded => {
                if self.adapter.config().managed {
                    debug!("Negotiation needed, managed by the caller");
                    return;
                }
                self.queue.push(QueuedNegotiation::CreateOffer {
                    is_subscribe: false,
                    ice_restart: false,
                });
                self.drain_queue().await;
            }
            EngineEvent::IceCandidate(candidate) => {
                if let Err(e) = self.adapter.emit_local_candidate(candidate) {
                    warn!("message: Could not send local candidate, error: {}", e);
                }
            }
            EngineEvent::ConnectionFailed(reason) => {
                warn!("message: Connection failed, reason: {}", reason);
                self.adapter.record_log(format!("connection failed: {}", reason));
                self.report_error(&reason);
            }
            EngineEvent::Closed => {
                self.close().await;
            }
        }
    }

    /// Request a configuration change.
    ///
    /// Bandwidth caps that belong in the SDP are renegotiated through the
    /// queue; everything else goes out as `updatestream`. `callback` receives
    /// the outcome once known.
    pub async fn update_configuration(
        &mut self,
        update: ConfigUpdate,
        stream: Option<StreamId>,
        callback: Option<UpdateCallback>,
    ) {
        if self.machine.is_closed() {
            info!("Ignoring configuration update on closed connection");
            if let Some(callback) = callback {
                callback(UpdateOutcome::Cancelled);
            }
            return;
        }

        let plan = match self.adapter.update_configuration(update, stream.as_ref()) {
            Ok(plan) => plan,
            Err(e) => {
                warn!("message: Could not apply configuration, error: {}", e);
                if let Some(callback) = callback {
                    callback(UpdateOutcome::Failed(e.to_string()));
                }
                return;
            }
        };

        match plan.negotiation {
            Some(update) => {
                self.queue
                    .push(QueuedNegotiation::NegotiateMaxBw { update, callback });
                self.drain_queue().await;
            }
            None => {
                if let Some(callback) = callback {
                    callback(if plan.signaled {
                        UpdateOutcome::Signaled
                    } else {
                        UpdateOutcome::Unchanged
                    });
                }
            }
        }
    }

    /// Publish a local stream
    pub async fn add_stream(&mut self, stream: MediaStream, is_screenshare: bool) -> DispatchOutcome {
        self.dispatch(AdapterCall::AddStream { stream, is_screenshare }).await
    }

    /// Stop publishing a local stream
    pub async fn remove_stream(&mut self, stream: &StreamId) -> DispatchOutcome {
        self.dispatch(AdapterCall::RemoveStream(stream.clone())).await
    }

    /// Queue a local offer; subscribe offers ask to receive the configured kinds
    pub async fn create_offer(&mut self, is_subscribe: bool) {
        self.queue.push(QueuedNegotiation::CreateOffer {
            is_subscribe,
            ice_restart: false,
        });
        self.drain_queue().await;
    }

    /// Close the connection. Every later trigger is a no-op.
    pub async fn close(&mut self) -> NegotiationState {
        self.dispatch(AdapterCall::Close).await;
        self.queue.cancel_all();
        self.machine.state()
    }

    /// Restart ICE and queue a new offer
    pub async fn restart_ice(&mut self) {
        if self.machine.is_closed() {
            info!("Ignoring ICE restart on closed connection");
            return;
        }
        if let Err(e) = self.adapter.restart_ice().await {
            warn!("message: ICE restart failed, error: {}", e);
            self.adapter.record_log(format!("restart-ice failed: {}", e));
            return;
        }
        self.queue.push(QueuedNegotiation::CreateOffer {
            is_subscribe: false,
            ice_restart: true,
        });
        self.drain_queue().await;
    }

    /// Enable simulcast for streams added from now on
    pub fn set_simulcast(&mut self, simulcast: Option<SimulcastConfig>) {
        self.adapter.set_simulcast(simulcast);
    }

    pub async fn update_simulcast_layers_bitrate(&mut self, bitrates: &BTreeMap<String, u64>) {
        if let Err(e) = self.adapter.update_simulcast_layers_bitrate(bitrates).await {
            warn!("message: Could not update simulcast bitrates, error: {}", e);
        }
    }

    pub async fn update_simulcast_active_layers(&mut self, layers: &BTreeMap<String, bool>) {
        if let Err(e) = self.adapter.update_simulcast_active_layers(layers).await {
            warn!("message: Could not update simulcast layers, error: {}", e);
        }
    }

    pub fn set_audio(&mut self, audio: bool) {
        self.adapter.set_audio(audio);
    }

    pub fn set_video(&mut self, video: bool) {
        self.adapter.set_video(video);
    }

    /// Raise `error` on behalf of an external watchdog
    pub fn report_error(&mut self, reason: &str) -> NegotiationState {
        self.queue.complete(UpdateOutcome::Failed(reason.to_string()));
        self.machine.raise_error(reason)
    }

    /// Drive the controller from the engine and inbound signaling channels
    /// until the connection closes or both channels are gone
    pub async fn run(
        &mut self,
        mut engine_events: mpsc::UnboundedReceiver<EngineEvent>,
        mut inbound: mpsc::UnboundedReceiver<SignalingMessage>,
    ) {
        while !self.machine.is_closed() {
            tokio::select! {
                Some(event) = engine_events.recv() => {
                    self.handle_engine_event(event).await;
                }
                Some(message) = inbound.recv() => {
                    self.handle_signaling_message(message).await;
                }
                else => {
                    debug!("Engine and signaling channels closed");
                    break;
                }
            }
        }
        info!("Negotiation controller stopped in state {}", self.machine.state());
    }
}
