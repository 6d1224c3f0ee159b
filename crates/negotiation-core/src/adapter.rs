//! Transport adapter
//!
//! Translates negotiation intent into [`MediaEngine`] calls and normalizes the
//! SDP and candidates flowing in and out. Every `protected_*` operation is the
//! precondition of a state machine transition: it either proceeds, declines
//! (`Precondition::Cancel`, the transition is dropped) or fails (`Err`, the
//! machine raises `error`).

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::{ConfigUpdate, NegotiationConfig, SimulcastConfig};
use crate::engine::MediaEngine;
use crate::error::{NegotiationError, Result};
use crate::sdp::set_media_bandwidth;
use crate::signaling::{CandidatePayload, SignalingMessage, SignalingSender};
use crate::simulcast::encoding_parameters;
use crate::state_machine::{Trigger, HISTORY_SIZE_LIMIT};
use crate::types::{
    IceCandidate, MediaKind, MediaStream, OfferOptions, SessionDescription, StreamId,
    TransceiverDirection, TransceiverId, TransceiverInit,
};

/// Media section id of the tagged transceiver. Its section can't be
/// renegotiated away, so only its sender is ever cleared.
pub const TAGGED_MID: &str = "0";

/// A guarded operation, paired with the trigger that gates it
#[derive(Debug, Clone)]
pub enum AdapterCall {
    CreateOffer { is_subscribe: bool, ice_restart: bool },
    ProcessOffer(SessionDescription),
    ProcessAnswer(SessionDescription),
    AddIceCandidate(CandidatePayload),
    AddStream { stream: MediaStream, is_screenshare: bool },
    RemoveStream(StreamId),
    NegotiateMaxBw(ConfigUpdate),
    Close,
}

impl AdapterCall {
    pub fn trigger(&self) -> Trigger {
        match self {
            Self::CreateOffer { .. } => Trigger::CreateOffer,
            Self::ProcessOffer(_) => Trigger::ProcessOffer,
            Self::ProcessAnswer(_) => Trigger::ProcessAnswer,
            Self::AddIceCandidate(_) => Trigger::AddIceCandidate,
            Self::AddStream { .. } => Trigger::AddStream,
            Self::RemoveStream(_) => Trigger::RemoveStream,
            Self::NegotiateMaxBw(_) => Trigger::NegotiateMaxBw,
            Self::Close => Trigger::Close,
        }
    }
}

/// Outcome of a guarded operation that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Run the transition
    Proceed,
    /// Drop the transition, state unchanged
    Cancel,
}

/// What `update_configuration` decided to do with a request
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationPlan {
    /// Bandwidth caps that must be renegotiated into the SDP
    pub negotiation: Option<ConfigUpdate>,
    /// Whether an `updatestream` message was sent
    pub signaled: bool,
}

/// A transceiver created for a local stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedTransceiver {
    pub id: TransceiverId,
    pub kind: MediaKind,
    pub screenshare: bool,
    pub simulcast: bool,
}

/// Transceivers owned by each local stream
#[derive(Debug, Default)]
pub struct TransceiverArena {
    streams: HashMap<StreamId, Vec<OwnedTransceiver>>,
}

impl TransceiverArena {
    pub fn contains(&self, stream: &StreamId) -> bool {
        self.streams.contains_key(stream)
    }

    pub fn get(&self, stream: &StreamId) -> Option<&[OwnedTransceiver]> {
        self.streams.get(stream).map(Vec::as_slice)
    }

    fn insert(&mut self, stream: StreamId, transceivers: Vec<OwnedTransceiver>) {
        self.streams.insert(stream, transceivers);
    }

    fn remove(&mut self, stream: &StreamId) -> Option<Vec<OwnedTransceiver>> {
        self.streams.remove(stream)
    }

    fn simulcast_transceivers(&self) -> impl Iterator<Item = &OwnedTransceiver> {
        self.streams.values().flatten().filter(|t| t.simulcast)
    }
}

/// Bounded textual log of negotiation activity, for diagnostics
#[derive(Debug, Clone)]
pub struct NegotiationLog {
    entries: VecDeque<String>,
    limit: usize,
}

impl NegotiationLog {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    pub fn push(&mut self, entry: impl AsRef<str>) {
        if self.entries.len() >= self.limit {
            self.entries.pop_front();
        }
        self.entries
            .push_back(format!("{} {}", Utc::now().to_rfc3339(), entry.as_ref()));
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Wraps the media engine and owns the transceiver arena
pub struct TransportAdapter {
    engine: Arc<dyn MediaEngine>,
    signaling: SignalingSender,
    config: NegotiationConfig,
    transceivers: TransceiverArena,
    pending_remote_candidates: VecDeque<IceCandidate>,
    has_remote_description: bool,
    logs: NegotiationLog,
}

impl std::fmt::Debug for TransportAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportAdapter")
            .field("config", &self.config)
            .field("transceivers", &self.transceivers)
            .field("pending_remote_candidates", &self.pending_remote_candidates.len())
            .field("has_remote_description", &self.has_remote_description)
            .finish()
    }
}

impl TransportAdapter {
    pub fn new(config: NegotiationConfig, engine: Arc<dyn MediaEngine>, signaling: SignalingSender) -> Self {
        Self {
            engine,
            signaling,
            config,
            transceivers: TransceiverArena::default(),
            pending_remote_candidates: VecDeque::new(),
            has_remote_description: false,
            logs: NegotiationLog::new(HISTORY_SIZE_LIMIT),
        }
    }

    pub fn config(&self) -> &NegotiationConfig {
        &self.config
    }

    pub fn transceivers(&self) -> &TransceiverArena {
        &self.transceivers
    }

    pub fn negotiation_logs(&self) -> &NegotiationLog {
        &self.logs
    }

    pub fn record_log(&mut self, entry: impl AsRef<str>) {
        self.logs.push(entry);
    }

    /// Remote candidates held back until a remote description is applied
    pub fn buffered_candidates(&self) -> usize {
        self.pending_remote_candidates.len()
    }

    /// Run the guarded operation of `call`
    pub async fn execute(&mut self, call: AdapterCall) -> Result<Precondition> {
        match call {
            AdapterCall::CreateOffer { is_subscribe, ice_restart } => {
                self.protected_create_offer(is_subscribe, ice_restart).await
            }
            AdapterCall::ProcessOffer(offer) => self.protected_process_offer(offer).await,
            AdapterCall::ProcessAnswer(answer) => self.protected_process_answer(answer).await,
            AdapterCall::AddIceCandidate(payload) => self.protected_add_ice_candidate(payload).await,
            AdapterCall::AddStream { stream, is_screenshare } => {
                self.protected_add_stream(stream, is_screenshare).await
            }
            AdapterCall::RemoveStream(stream) => self.protected_remove_stream(&stream).await,
            AdapterCall::NegotiateMaxBw(update) => self.protected_negotiate_max_bw(update).await,
            AdapterCall::Close => self.protected_close().await,
        }
    }

    async fn protected_create_offer(&mut self, is_subscribe: bool, ice_restart: bool) -> Result<Precondition> {
        let options = OfferOptions {
            offer_to_receive_audio: is_subscribe && self.config.audio,
            offer_to_receive_video: is_subscribe && self.config.video,
            ice_restart,
        };
        debug!("Creating offer, isSubscribe: {}, iceRestart: {}", is_subscribe, ice_restart);

        let offer = match self.engine.create_offer(options).await {
            Ok(offer) => offer,
            Err(e) => {
                warn!("message: Error creating offer, error: {}", e);
                self.logs.push(format!("create-offer failed: {}", e));
                return Ok(Precondition::Cancel);
            }
        };

        let offer = self.limit_bandwidth(offer);
        if let Err(e) = self.engine.set_local_description(offer.clone()).await {
            warn!("message: Error setting local description, error: {}", e);
            self.logs.push(format!("create-offer failed: {}", e));
            return Ok(Precondition::Cancel);
        }

        self.emit_local_description(&offer)?;
        Ok(Precondition::Proceed)
    }

    async fn protected_process_offer(&mut self, offer: SessionDescription) -> Result<Precondition> {
        match self.answer_remote_offer(offer).await {
            Ok(answer) => {
                self.emit_local_description(&answer)?;
                Ok(Precondition::Proceed)
            }
            Err(e) => {
                warn!("message: Error during negotiation, message: {}", e);
                self.logs.push(format!("process-offer failed: {}", e));
                let sdp = self
                    .engine
                    .local_description()
                    .map(|d| d.sdp)
                    .unwrap_or_default();
                self.signaling.send(SignalingMessage::OfferError {
                    sdp,
                    config: self.description_config(),
                })?;
                Err(e)
            }
        }
    }

    async fn answer_remote_offer(&mut self, offer: SessionDescription) -> Result<SessionDescription> {
        self.engine
            .set_remote_description(offer)
            .await
            .map_err(|e| NegotiationError::engine("set_remote_description", e))?;
        self.remote_description_applied().await;

        let answer = self
            .engine
            .create_answer()
            .await
            .map_err(|e| NegotiationError::engine("create_answer", e))?;
        let answer = self.limit_bandwidth(answer);
        self.engine
            .set_local_description(answer.clone())
            .await
            .map_err(|e| NegotiationError::engine("set_local_description", e))?;
        Ok(answer)
    }

    async fn protected_process_answer(&mut self, answer: SessionDescription) -> Result<Precondition> {
        self.engine
            .set_remote_description(answer)
            .await
            .map_err(|e| NegotiationError::engine("set_remote_description", e))?;
        self.remote_description_applied().await;
        Ok(Precondition::Proceed)
    }

    async fn remote_description_applied(&mut self) {
        self.has_remote_description = true;
        let buffered = std::mem::take(&mut self.pending_remote_candidates);
        if !buffered.is_empty() {
            debug!("Applying {} buffered remote candidates", buffered.len());
        }
        for candidate in buffered {
            if let Err(e) = self.engine.add_ice_candidate(candidate).await {
                warn!("message: Buffered candidate rejected, error: {}", e);
            }
        }
    }

    async fn protected_add_ice_candidate(&mut self, payload: CandidatePayload) -> Result<Precondition> {
        let candidate = match payload.normalize() {
            Ok(Some(candidate)) => candidate,
            Ok(None) => return Ok(Precondition::Proceed),
            Err(e) => {
                warn!("message: Ignoring malformed candidate, error: {}", e);
                self.logs.push(format!("malformed candidate: {}", e));
                return Ok(Precondition::Cancel);
            }
        };

        if !self.has_remote_description {
            if self.pending_remote_candidates.len() >= HISTORY_SIZE_LIMIT {
                warn!(
                    "message: Remote candidate buffer full, dropping oldest, limit: {}",
                    HISTORY_SIZE_LIMIT
                );
                self.pending_remote_candidates.pop_front();
            }
            debug!("Buffering remote candidate until a remote description is set");
            self.pending_remote_candidates.push_back(candidate);
            return Ok(Precondition::Proceed);
        }

        match self.engine.add_ice_candidate(candidate).await {
            Ok(()) => Ok(Precondition::Proceed),
            Err(e) => {
                warn!("message: Candidate rejected by engine, error: {}", e);
                Ok(Precondition::Cancel)
            }
        }
    }

    async fn protected_add_stream(&mut self, stream: MediaStream, is_screenshare: bool) -> Result<Precondition> {
        if self.transceivers.contains(&stream.id) {
            warn!("message: Stream already added, streamId: {}", stream.id);
            return Ok(Precondition::Cancel);
        }

        let mut owned = Vec::with_capacity(stream.tracks.len());
        for track in &stream.tracks {
            let send_encodings = match (&self.config.simulcast, track.kind) {
                (Some(simulcast), MediaKind::Video) => encoding_parameters(simulcast, is_screenshare),
                _ => Vec::new(),
            };
            let simulcast = !send_encodings.is_empty();
            let init = TransceiverInit {
                direction: TransceiverDirection::SendRecv,
                stream_ids: vec![stream.id.clone()],
                send_encodings,
            };

            match self.engine.add_transceiver(track, init).await {
                Ok(id) => {
                    debug!("Added {} transceiver {} for stream {}", track.kind, id, stream.id);
                    owned.push(OwnedTransceiver {
                        id,
                        kind: track.kind,
                        screenshare: is_screenshare,
                        simulcast,
                    });
                }
                Err(e) => {
                    // keep what was created so remove_stream can undo it
                    self.transceivers.insert(stream.id.clone(), owned);
                    return Err(NegotiationError::engine("add_transceiver", e));
                }
            }
        }

        info!("Stream {} added with {} transceivers", stream.id, owned.len());
        self.transceivers.insert(stream.id, owned);
        Ok(Precondition::Proceed)
    }

    async fn protected_remove_stream(&mut self, stream: &StreamId) -> Result<Precondition> {
        let Some(owned) = self.transceivers.remove(stream) else {
            warn!("message: Trying to remove unknown stream, streamId: {}", stream);
            return Ok(Precondition::Cancel);
        };

        let mut first_error = None;
        for transceiver in owned {
            let tagged = self.engine.transceiver_mid(transceiver.id).as_deref() == Some(TAGGED_MID);
            let result = if tagged {
                debug!("Clearing sender of tagged transceiver {}", transceiver.id);
                self.engine
                    .remove_track(transceiver.id)
                    .await
                    .map_err(|e| NegotiationError::engine("remove_track", e))
            } else {
                debug!("Stopping transceiver {}", transceiver.id);
                self.engine
                    .stop_transceiver(transceiver.id)
                    .await
                    .map_err(|e| NegotiationError::engine("stop_transceiver", e))
            };
            if let Err(e) = result {
                warn!("message: Error removing transceiver {}, error: {}", transceiver.id, e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(Precondition::Proceed),
        }
    }

    async fn protected_negotiate_max_bw(&mut self, update: ConfigUpdate) -> Result<Precondition> {
        let offer = self
            .engine
            .create_offer(OfferOptions::default())
            .await
            .map_err(|e| NegotiationError::engine("create_offer", e))?;

        // fresh SDP carries no caps, so apply every stored one
        let offer = self.limit_bandwidth(offer);
        self.engine
            .set_local_description(offer.clone())
            .await
            .map_err(|e| NegotiationError::engine("set_local_description", e))?;
        debug!(
            "Renegotiating bandwidth, maxVideoBW: {:?}, maxAudioBW: {:?}",
            update.max_video_bw, update.max_audio_bw
        );
        self.emit_local_description(&offer)?;
        Ok(Precondition::Proceed)
    }

    async fn protected_close(&mut self) -> Result<Precondition> {
        if let Err(e) = self.engine.close().await {
            warn!("message: Error closing engine, error: {}", e);
        }
        self.pending_remote_candidates.clear();
        self.has_remote_description = false;
        Ok(Precondition::Proceed)
    }

    /// Apply the configured caps to a local description
    fn limit_bandwidth(&self, mut description: SessionDescription) -> SessionDescription {
        if self.config.p2p {
            if let Some(video) = self.config.max_video_bw.filter(|bw| *bw > 0) {
                description.sdp = set_media_bandwidth(&description.sdp, MediaKind::Video, video);
            }
        }
        if let Some(audio) = self.config.max_audio_bw.filter(|bw| *bw > 0) {
            description.sdp = set_media_bandwidth(&description.sdp, MediaKind::Audio, audio);
        }
        description
    }

    fn description_config(&self) -> crate::signaling::DescriptionConfig {
        crate::signaling::DescriptionConfig::new(self.config.max_video_bw)
    }

    fn emit_local_description(&self, applied: &SessionDescription) -> Result<()> {
        let description = self
            .engine
            .local_description()
            .unwrap_or_else(|| applied.clone());
        self.signaling.send(SignalingMessage::description(
            &description,
            self.config.max_video_bw,
        ))
    }

    /// Clamp and store the requested caps, and send `updatestream` for
    /// everything that needs no SDP change
    pub fn update_configuration(
        &mut self,
        mut update: ConfigUpdate,
        stream: Option<&StreamId>,
    ) -> Result<ConfigurationPlan> {
        if let Some(requested) = update.requested_video_bw() {
            let applied = self.config.clamp_video_bw(requested);
            debug!(
                "message: Maxvideo Requested, value: {}, limit: {}, applied: {}",
                requested, self.config.limit_max_video_bw, applied
            );
            update.max_video_bw = Some(applied);
            self.config.max_video_bw = Some(applied);
        }
        if let Some(requested) = update.requested_audio_bw() {
            let applied = self.config.clamp_audio_bw(requested);
            update.max_audio_bw = Some(applied);
            self.config.max_audio_bw = Some(applied);
        }

        let video = update.requested_video_bw();
        let video_in_sdp = self.config.p2p && video.is_some();
        let audio = update.requested_audio_bw();
        let negotiation = if video_in_sdp || audio.is_some() {
            Some(ConfigUpdate {
                max_video_bw: if video_in_sdp { video } else { None },
                max_audio_bw: audio,
                ..ConfigUpdate::default()
            })
        } else {
            None
        };

        let signaled = (!self.config.p2p && video.is_some()) || update.has_stream_options();
        if signaled {
            debug!("message: Configuration changed, config: {:?}", update);
            self.signaling.send(SignalingMessage::UpdateStream {
                config: update,
                stream_id: stream.cloned(),
            })?;
        }

        Ok(ConfigurationPlan { negotiation, signaled })
    }

    pub fn set_simulcast(&mut self, simulcast: Option<SimulcastConfig>) {
        debug!("Simulcast enabled: {}", simulcast.is_some());
        self.config.simulcast = simulcast;
    }

    pub async fn update_simulcast_layers_bitrate(&mut self, bitrates: &BTreeMap<String, u64>) -> Result<()> {
        match self.config.simulcast.as_mut() {
            Some(simulcast) => simulcast.set_layer_bitrates(bitrates),
            None => return Ok(()),
        }
        self.push_simulcast_encodings().await
    }

    pub async fn update_simulcast_active_layers(&mut self, layers: &BTreeMap<String, bool>) -> Result<()> {
        match self.config.simulcast.as_mut() {
            Some(simulcast) => simulcast.set_active_layers(layers),
            None => return Ok(()),
        }
        self.push_simulcast_encodings().await
    }

    async fn push_simulcast_encodings(&self) -> Result<()> {
        let Some(simulcast) = self.config.simulcast.as_ref() else {
            return Ok(());
        };
        for transceiver in self.transceivers.simulcast_transceivers() {
            self.engine
                .set_send_encodings(transceiver.id, encoding_parameters(simulcast, transceiver.screenshare))
                .await
                .map_err(|e| NegotiationError::engine("set_send_encodings", e))?;
        }
        Ok(())
    }

    pub fn set_audio(&mut self, audio: bool) {
        self.config.audio = audio;
    }

    pub fn set_video(&mut self, video: bool) {
        self.config.video = video;
    }

    pub async fn restart_ice(&self) -> Result<()> {
        self.engine
            .restart_ice()
            .await
            .map_err(|e| NegotiationError::engine("restart_ice", e))
    }

    /// Send a gathered local candidate; `None` sends the end-of-candidates sentinel
    pub fn emit_local_candidate(&self, candidate: Option<IceCandidate>) -> Result<()> {
        let candidate = candidate.unwrap_or_else(|| {
            debug!("message: Gathered all candidates and sending END candidate");
            IceCandidate::end_of_candidates()
        });
        self.signaling.send(SignalingMessage::candidate(&candidate))
    }
}
