//! Shared helpers for negotiation-core integration tests
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use rtcneg_negotiation_core::engine::MediaEngine;
use rtcneg_negotiation_core::error::{EngineError, EngineResult};
use rtcneg_negotiation_core::signaling::{SignalingMessage, SignalingSender};
use rtcneg_negotiation_core::types::{
    EncodingParameters, IceCandidate, MediaStream, MediaTrack, OfferOptions, SessionDescription,
    TransceiverId, TransceiverInit,
};
use rtcneg_negotiation_core::{NegotiationConfig, PeerConnectionController};

/// Remote SDP the fake engine refuses to apply
pub const INVALID_SDP: &str = "invalid";

pub fn sample_sdp(version: u32) -> String {
    format!(
        "v=0\r\n\
o=- 4611731400430051336 {} IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
a=group:BUNDLE 0 1\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
c=IN IP4 0.0.0.0\r\n\
a=mid:0\r\n\
a=rtpmap:111 opus/48000/2\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
c=IN IP4 0.0.0.0\r\n\
a=mid:1\r\n\
a=rtpmap:96 VP8/90000\r\n",
        version
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct FakeTransceiver {
    pub id: TransceiverId,
    pub mid: String,
    pub init: TransceiverInit,
    pub has_sender: bool,
    pub stopped: bool,
}

#[derive(Debug, Default)]
struct EngineState {
    calls: Vec<String>,
    failing: HashSet<String>,
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    transceivers: Vec<FakeTransceiver>,
    candidates: Vec<IceCandidate>,
    offer_options: Vec<OfferOptions>,
    encodings: Vec<(TransceiverId, Vec<EncodingParameters>)>,
    version: u32,
}

/// Media engine fake that records every call
#[derive(Debug, Default)]
pub struct RecordingEngine {
    state: Mutex<EngineState>,
}

impl RecordingEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every later call named `call` fail
    pub fn fail_on(&self, call: &str) {
        self.state.lock().failing.insert(call.to_string());
    }

    pub fn recover(&self, call: &str) {
        self.state.lock().failing.remove(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self, call: &str) -> usize {
        self.state.lock().calls.iter().filter(|c| c.as_str() == call).count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn transceivers(&self) -> Vec<FakeTransceiver> {
        self.state.lock().transceivers.clone()
    }

    pub fn candidates(&self) -> Vec<IceCandidate> {
        self.state.lock().candidates.clone()
    }

    pub fn offer_options(&self) -> Vec<OfferOptions> {
        self.state.lock().offer_options.clone()
    }

    pub fn encodings(&self) -> Vec<(TransceiverId, Vec<EncodingParameters>)> {
        self.state.lock().encodings.clone()
    }

    pub fn local_sdp(&self) -> Option<String> {
        self.state.lock().local.as_ref().map(|d| d.sdp.clone())
    }

    fn record(&self, call: &str) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.calls.push(call.to_string());
        if state.failing.contains(call) {
            return Err(EngineError::Other(format!("{} failed", call)));
        }
        Ok(())
    }
}

#[async_trait]
impl MediaEngine for RecordingEngine {
    async fn create_offer(&self, options: OfferOptions) -> EngineResult<SessionDescription> {
        self.record("create_offer")?;
        let mut state = self.state.lock();
        state.offer_options.push(options);
        state.version += 1;
        Ok(SessionDescription::offer(sample_sdp(state.version)))
    }

    async fn create_answer(&self) -> EngineResult<SessionDescription> {
        self.record("create_answer")?;
        let mut state = self.state.lock();
        state.version += 1;
        Ok(SessionDescription::answer(sample_sdp(state.version)))
    }

    async fn set_local_description(&self, description: SessionDescription) -> EngineResult<()> {
        self.record("set_local_description")?;
        self.state.lock().local = Some(description);
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> EngineResult<()> {
        self.record("set_remote_description")?;
        if description.sdp == INVALID_SDP {
            return Err(EngineError::InvalidDescription("unparsable sdp".to_string()));
        }
        self.state.lock().remote = Some(description);
        Ok(())
    }

    fn local_description(&self) -> Option<SessionDescription> {
        self.state.lock().local.clone()
    }

    async fn add_transceiver(&self, _track: &MediaTrack, init: TransceiverInit) -> EngineResult<TransceiverId> {
        self.record("add_transceiver")?;
        let mut state = self.state.lock();
        let index = state.transceivers.len();
        let id = TransceiverId(index as u64);
        state.transceivers.push(FakeTransceiver {
            id,
            mid: index.to_string(),
            init,
            has_sender: true,
            stopped: false,
        });
        Ok(id)
    }

    fn transceiver_mid(&self, transceiver: TransceiverId) -> Option<String> {
        self.state
            .lock()
            .transceivers
            .iter()
            .find(|t| t.id == transceiver)
            .map(|t| t.mid.clone())
    }

    async fn remove_track(&self, transceiver: TransceiverId) -> EngineResult<()> {
        self.record("remove_track")?;
        let mut state = self.state.lock();
        let entry = state
            .transceivers
            .iter_mut()
            .find(|t| t.id == transceiver)
            .ok_or(EngineError::UnknownTransceiver(transceiver.0))?;
        entry.has_sender = false;
        Ok(())
    }

    async fn stop_transceiver(&self, transceiver: TransceiverId) -> EngineResult<()> {
        self.record("stop_transceiver")?;
        let mut state = self.state.lock();
        let entry = state
            .transceivers
            .iter_mut()
            .find(|t| t.id == transceiver)
            .ok_or(EngineError::UnknownTransceiver(transceiver.0))?;
        entry.stopped = true;
        entry.has_sender = false;
        Ok(())
    }

    async fn set_send_encodings(
        &self,
        transceiver: TransceiverId,
        encodings: Vec<EncodingParameters>,
    ) -> EngineResult<()> {
        self.record("set_send_encodings")?;
        self.state.lock().encodings.push((transceiver, encodings));
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> EngineResult<()> {
        self.record("add_ice_candidate")?;
        self.state.lock().candidates.push(candidate);
        Ok(())
    }

    async fn restart_ice(&self) -> EngineResult<()> {
        self.record("restart_ice")
    }

    async fn close(&self) -> EngineResult<()> {
        self.record("close")
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct Harness {
    pub controller: PeerConnectionController,
    pub engine: Arc<RecordingEngine>,
    pub outbound: mpsc::UnboundedReceiver<SignalingMessage>,
}

impl Harness {
    pub fn new(config: NegotiationConfig) -> Self {
        init_tracing();
        let engine = RecordingEngine::new();
        let (signaling, outbound) = SignalingSender::channel();
        let controller = PeerConnectionController::new(config, engine.clone(), signaling)
            .expect("valid config");
        Self { controller, engine, outbound }
    }

    /// Everything sent to the remote peer since the last call
    pub fn sent(&mut self) -> Vec<SignalingMessage> {
        let mut sent = Vec::new();
        while let Ok(message) = self.outbound.try_recv() {
            sent.push(message);
        }
        sent
    }
}

pub fn camera_stream(id: &str) -> MediaStream {
    MediaStream::new(id)
        .with_track(MediaTrack::audio(format!("{}-audio", id)))
        .with_track(MediaTrack::video(format!("{}-video", id)))
}

pub fn candidate_json(index: &str, line: &str) -> String {
    format!(
        r#"{{"type":"candidate","candidate":{{"sdpMLineIndex":{},"sdpMid":"0","candidate":"{}"}}}}"#,
        index, line
    )
}
