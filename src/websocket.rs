//! # WebSocket Voice Session Handler
//!
//! Handles the persistent voice tutoring connection at `/ws/voice`. Each
//! connection is one Actix actor owning one session: its profile, its
//! heartbeat timer, and its queue of audio turns.
//!
//! ## WebSocket Protocol:
//! 1. **Connection**: Client connects with `target_language`, `topic`,
//!    `user_age` and optional `proficiency_level` query parameters
//! 2. **Audio turns**: each binary frame from the client is one turn's input;
//!    the server answers with exactly one binary frame (the synthesized
//!    reply) per turn, in the order the frames arrived
//! 3. **Heartbeat**: the server sends `{"type":"heartbeat"}` on a fixed
//!    interval for the whole active lifetime of the session
//! 4. **Teardown**: peer disconnect, a protocol error, or any pipeline
//!    failure closes the session; no structured error is sent to the client
//!
//! ## Turn sequencing:
//! Frames that arrive while a turn is being processed are buffered and
//! drained strictly FIFO, so at most one pipeline invocation is in flight
//! per session and responses never reorder.

use crate::error::PipelineError;
use crate::state::AppState;
use crate::voice::session::{SessionEntry, UserProfile};
use crate::voice::{SessionRegistry, VoicePipeline};

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Server-to-client control messages.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Periodic keep-alive; carries no payload and requires no ack
    Heartbeat,
}

/// Lifecycle of one voice session. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    /// Connection accepted, not yet registered
    Connecting,
    /// Registered; heartbeat running, turns accepted
    Active,
    /// Teardown begun; heartbeat cancelled, no new turns
    Closing,
    /// Unregistered; no further operations permitted
    Closed,
}

/// FIFO turn buffer enforcing at most one in-flight pipeline call.
///
/// The actor pushes every inbound frame here; `enqueue` hands a frame back
/// only when no turn is running, and `complete` hands back the next buffered
/// frame (if any) once the previous response has been sent.
#[derive(Debug, Default)]
struct TurnQueue {
    in_flight: bool,
    pending: VecDeque<web::Bytes>,
}

impl TurnQueue {
    /// Buffer a frame. Returns the frame to start processing now, or `None`
    /// if a turn is already in flight.
    fn enqueue(&mut self, frame: web::Bytes) -> Option<web::Bytes> {
        self.pending.push_back(frame);
        self.next_if_idle()
    }

    /// Mark the in-flight turn finished. Returns the next frame to process,
    /// or `None` if the queue is drained.
    fn complete(&mut self) -> Option<web::Bytes> {
        self.in_flight = false;
        self.next_if_idle()
    }

    fn next_if_idle(&mut self) -> Option<web::Bytes> {
        if self.in_flight {
            return None;
        }
        let frame = self.pending.pop_front()?;
        self.in_flight = true;
        Some(frame)
    }

    fn is_in_flight(&self) -> bool {
        self.in_flight
    }
}

/// Result of one spawned pipeline turn, delivered back to the actor.
#[derive(Message)]
#[rtype(result = "()")]
struct TurnOutcome(Result<Vec<u8>, PipelineError>);

/// WebSocket actor for one voice tutoring session.
///
/// ## Ownership:
/// The actor exclusively owns its profile and connection; the only shared
/// resources are the registry (for bookkeeping) and the pipeline (stateless,
/// shared by every session). Nothing outside the actor mutates its state.
pub struct VoiceSession {
    /// Unique identifier generated at creation
    session_id: String,

    /// Immutable tutoring context for this connection
    profile: UserProfile,

    /// Shared turn pipeline
    pipeline: Arc<VoicePipeline>,

    /// Process-wide session table
    registry: Arc<SessionRegistry>,

    /// Application state, for turn metrics
    app_state: web::Data<AppState>,

    /// Keep-alive cadence
    heartbeat_interval: Duration,

    /// Handle for cancelling the heartbeat timer on close
    heartbeat_handle: Option<SpawnHandle>,

    /// Current lifecycle state
    state: SessionState,

    /// Buffered audio frames awaiting processing
    turns: TurnQueue,
}

impl VoiceSession {
    pub fn new(
        profile: UserProfile,
        pipeline: Arc<VoicePipeline>,
        registry: Arc<SessionRegistry>,
        app_state: web::Data<AppState>,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            profile,
            pipeline,
            registry,
            app_state,
            heartbeat_interval,
            heartbeat_handle: None,
            state: SessionState::Connecting,
            turns: TurnQueue::default(),
        }
    }

    /// Handle one inbound binary frame: buffer it and start a turn if none
    /// is running.
    fn handle_audio_frame(&mut self, data: web::Bytes, ctx: &mut ws::WebsocketContext<Self>) {
        if self.state != SessionState::Active {
            debug!(
                session_id = %self.session_id,
                "dropping audio frame received outside the active state"
            );
            return;
        }

        if let Some(frame) = self.turns.enqueue(data) {
            self.start_turn(frame, ctx);
        }
    }

    /// Spawn the pipeline for one frame; the outcome comes back as a
    /// `TurnOutcome` actor message so the response is written from the
    /// actor's own context.
    fn start_turn(&mut self, frame: web::Bytes, ctx: &mut ws::WebsocketContext<Self>) {
        let pipeline = Arc::clone(&self.pipeline);
        let profile = self.profile.clone();
        let addr = ctx.address();

        tokio::spawn(async move {
            let outcome = pipeline.process(&frame, &profile).await;
            addr.do_send(TurnOutcome(outcome));
        });
    }

    /// Transition to `Closing`: cancel the heartbeat so no keep-alive is
    /// sent after this point, then stop the actor. Safe to call from racing
    /// paths; only the first call does anything.
    fn begin_close(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        if matches!(self.state, SessionState::Closing | SessionState::Closed) {
            return;
        }
        self.state = SessionState::Closing;

        if let Some(handle) = self.heartbeat_handle.take() {
            ctx.cancel_future(handle);
        }

        ctx.close(None);
        ctx.stop();
    }
}

impl Actor for VoiceSession {
    type Context = ws::WebsocketContext<Self>;

    /// Connection handshake complete: register the session and start the
    /// heartbeat. Registration failure (capacity) refuses the connection.
    fn started(&mut self, ctx: &mut Self::Context) {
        let entry = SessionEntry::new(self.profile.clone());
        if let Err(err) = self.registry.register(&self.session_id, entry) {
            warn!(session_id = %self.session_id, error = %err, "refusing connection");
            ctx.close(Some(ws::CloseReason {
                code: ws::CloseCode::Again,
                description: Some(err),
            }));
            ctx.stop();
            return;
        }

        self.state = SessionState::Active;
        info!(
            session_id = %self.session_id,
            target_language = %self.profile.target_language,
            topic = %self.profile.topic,
            "voice session started"
        );

        self.heartbeat_handle = Some(ctx.run_interval(self.heartbeat_interval, |act, ctx| {
            if act.state != SessionState::Active {
                return;
            }
            match serde_json::to_string(&ControlMessage::Heartbeat) {
                Ok(json) => ctx.text(json),
                Err(err) => {
                    error!(session_id = %act.session_id, error = %err, "heartbeat failed");
                    act.begin_close(ctx);
                }
            }
        }));
    }

    /// Final cleanup. Unregistration is idempotent, so a disconnect racing
    /// an error path leaves the registry consistent.
    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.state = SessionState::Closed;
        if self.registry.unregister(&self.session_id) {
            info!(session_id = %self.session_id, "voice session cleaned up");
        }
    }
}

impl Handler<TurnOutcome> for VoiceSession {
    type Result = ();

    fn handle(&mut self, msg: TurnOutcome, ctx: &mut Self::Context) {
        if self.state != SessionState::Active {
            // The session began closing while the turn was running; the
            // result is discarded rather than sent on a dying connection.
            debug!(session_id = %self.session_id, "discarding turn outcome after close");
            return;
        }

        match msg.0 {
            Ok(audio) => {
                ctx.binary(audio);
                self.app_state.record_turn(true);

                if let Some(next) = self.turns.complete() {
                    self.start_turn(next, ctx);
                }
            }
            Err(err) => {
                error!(
                    session_id = %self.session_id,
                    stage = err.stage.as_str(),
                    error = %err,
                    "voice turn failed, closing session"
                );
                self.app_state.record_turn(false);
                self.begin_close(ctx);
            }
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for VoiceSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Binary(data)) => {
                self.handle_audio_frame(data, ctx);
            }
            Ok(ws::Message::Text(_)) => {
                // The protocol has no client-to-server text messages.
                warn!(session_id = %self.session_id, "ignoring unexpected text frame");
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Close(reason)) => {
                info!(session_id = %self.session_id, ?reason, "client closed connection");
                self.begin_close(ctx);
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!(session_id = %self.session_id, "received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!(session_id = %self.session_id, error = %err, "WebSocket protocol error");
                self.begin_close(ctx);
            }
        }
    }
}

/// WebSocket endpoint handler for `/ws/voice`.
///
/// Parses and validates the profile from the query string before upgrading;
/// a bad profile is rejected with 400 and no session is ever created.
pub async fn voice_websocket(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let profile = web::Query::<UserProfile>::from_query(req.query_string())
        .map_err(|e| actix_web::error::ErrorBadRequest(format!("invalid profile: {}", e)))?
        .into_inner();

    if let Err(err) = profile.validate() {
        return Err(actix_web::error::ErrorBadRequest(err));
    }

    info!(
        peer = ?req.connection_info().peer_addr(),
        target_language = %profile.target_language,
        "new voice connection request"
    );

    let config = app_state.get_config();
    let session = VoiceSession::new(
        profile,
        Arc::clone(&app_state.pipeline),
        Arc::clone(&app_state.registry),
        app_state.clone(),
        Duration::from_secs(config.session.heartbeat_interval_secs),
    );

    ws::start(session, &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::openai::{ChatCompletion, CollaboratorError, SpeechToText, TextToSpeech};
    use actix_web::App;
    use async_trait::async_trait;
    use futures_util::{SinkExt, StreamExt};

    /// Transcriber that fails every call, for driving the error path.
    struct BrokenTranscriber;

    #[async_trait]
    impl SpeechToText for BrokenTranscriber {
        async fn transcribe(&self, _audio: &[u8]) -> Result<String, CollaboratorError> {
            Err(CollaboratorError::Api {
                status: 503,
                body: "service unavailable".to_string(),
            })
        }
    }

    struct SilentChat;

    #[async_trait]
    impl ChatCompletion for SilentChat {
        async fn complete(
            &self,
            _system_instruction: &str,
            _user_text: &str,
        ) -> Result<String, CollaboratorError> {
            Ok(String::new())
        }
    }

    struct SilentSynthesizer;

    #[async_trait]
    impl TextToSpeech for SilentSynthesizer {
        async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, CollaboratorError> {
            Ok(Vec::new())
        }
    }

    fn app_state_with_failing_pipeline(heartbeat_secs: u64) -> AppState {
        let mut config = AppConfig::default();
        config.session.heartbeat_interval_secs = heartbeat_secs;
        let registry = Arc::new(SessionRegistry::new(config.session.max_concurrent_sessions));
        let pipeline = Arc::new(VoicePipeline::new(
            Arc::new(BrokenTranscriber),
            Arc::new(SilentChat),
            Arc::new(SilentSynthesizer),
        ));
        AppState::new(config, registry, pipeline, Arc::new(SilentChat))
    }

    fn start_server(state: AppState) -> actix_test::TestServer {
        actix_test::start(move || {
            App::new()
                .app_data(web::Data::new(state.clone()))
                .route("/ws/voice", web::get().to(voice_websocket))
        })
    }

    const CONNECT_PATH: &str = "/ws/voice?target_language=Spanish&topic=Animals&user_age=7";

    /// A turn failing in the pipeline must close the session without sending
    /// any audio frame, and the registry must drain back to zero.
    #[actix_web::test]
    async fn test_pipeline_failure_closes_session_without_audio() {
        let state = app_state_with_failing_pipeline(5);
        let registry = Arc::clone(&state.registry);
        let mut srv = start_server(state);

        let mut conn = srv.ws_at(CONNECT_PATH).await.unwrap();
        conn.send(awc::ws::Message::Binary(web::Bytes::from_static(
            b"audio-blob",
        )))
        .await
        .unwrap();

        let mut received_audio = false;
        while let Some(frame) = conn.next().await {
            match frame.unwrap() {
                awc::ws::Frame::Binary(_) => received_audio = true,
                awc::ws::Frame::Close(_) => break,
                _ => {}
            }
        }
        assert!(!received_audio, "failed turn must not emit audio");

        // Unregistration happens as the actor winds down.
        for _ in 0..50 {
            if registry.count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(registry.count(), 0);
    }

    /// With a one second interval the client must observe at least two
    /// heartbeats over two and a half seconds, each with the exact payload.
    #[actix_web::test]
    async fn test_heartbeats_arrive_on_the_configured_cadence() {
        let state = app_state_with_failing_pipeline(1);
        let mut srv = start_server(state);

        let mut conn = srv.ws_at(CONNECT_PATH).await.unwrap();

        let mut heartbeats = 0;
        let deadline = tokio::time::Instant::now() + Duration::from_millis(2500);
        while heartbeats < 2 {
            let now = tokio::time::Instant::now();
            if now >= deadline {
                break;
            }
            match tokio::time::timeout(deadline - now, conn.next()).await {
                Ok(Some(Ok(awc::ws::Frame::Text(body)))) => {
                    assert_eq!(
                        std::str::from_utf8(&body).unwrap(),
                        r#"{"type":"heartbeat"}"#
                    );
                    heartbeats += 1;
                }
                Ok(Some(Ok(_))) => {}
                Ok(Some(Err(err))) => panic!("WebSocket error: {}", err),
                Ok(None) => break,
                Err(_) => break,
            }
        }
        assert!(heartbeats >= 2, "saw {} heartbeats", heartbeats);
    }

    #[test]
    fn test_heartbeat_wire_format() {
        let json = serde_json::to_string(&ControlMessage::Heartbeat).unwrap();
        assert_eq!(json, r#"{"type":"heartbeat"}"#);
    }

    #[test]
    fn test_profile_parsed_from_query_string() {
        let profile = web::Query::<UserProfile>::from_query(
            "target_language=Spanish&topic=Animals&user_age=7",
        )
        .unwrap()
        .into_inner();

        assert_eq!(profile.target_language, "Spanish");
        assert_eq!(profile.topic, "Animals");
        assert_eq!(profile.user_age, 7);
        assert_eq!(profile.proficiency_level, "beginner");
    }

    #[test]
    fn test_profile_query_missing_fields_rejected() {
        assert!(web::Query::<UserProfile>::from_query("target_language=Spanish").is_err());
    }

    /// Frames delivered while a turn is running must buffer, drain FIFO,
    /// and never put two turns in flight.
    #[test]
    fn test_turn_queue_is_fifo_and_single_flight() {
        let mut queue = TurnQueue::default();

        let first = queue.enqueue(web::Bytes::from_static(b"f1"));
        assert_eq!(first.as_deref(), Some(b"f1".as_ref()));
        assert!(queue.is_in_flight());

        // Two more frames arrive mid-turn; neither starts.
        assert!(queue.enqueue(web::Bytes::from_static(b"f2")).is_none());
        assert!(queue.enqueue(web::Bytes::from_static(b"f3")).is_none());

        // Completions hand frames back in arrival order.
        assert_eq!(queue.complete().as_deref(), Some(b"f2".as_ref()));
        assert_eq!(queue.complete().as_deref(), Some(b"f3".as_ref()));
        assert!(queue.complete().is_none());
        assert!(!queue.is_in_flight());
    }

    #[test]
    fn test_turn_queue_idle_after_drain_accepts_new_frames() {
        let mut queue = TurnQueue::default();
        assert!(queue.enqueue(web::Bytes::from_static(b"a")).is_some());
        assert!(queue.complete().is_none());

        // A later frame on an idle queue starts immediately.
        assert_eq!(
            queue.enqueue(web::Bytes::from_static(b"b")).as_deref(),
            Some(b"b".as_ref())
        );
    }
}
