use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::events::{DescribeResponse, SessionEvent, SessionEvents, SessionId};
use super::setup::{SetupStep, SubsessionController};
use super::transport::ServerTransport;
use super::{Session, SinkFactory};
use crate::error::{Result, RtspError};
use crate::media::{FrameReassembler, Sink};
use crate::protocol::Protocol;
use crate::protocol::sdp::parse_sdp;
use crate::registry::{ClientConfig, EmptySetupPolicy};

/// Lifecycle of one session. There is no way back from `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Describing,
    SettingUp,
    Playing,
    ShuttingDown,
    Closed,
}

/// How a session ended; determines the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Duration elapsed or every substream ended.
    Completed,
    /// DESCRIBE, PLAY or sink creation failed, or nothing was playable.
    Failed,
}

impl Termination {
    pub fn exit_code(self) -> i32 {
        match self {
            Termination::Completed => 0,
            Termination::Failed => 1,
        }
    }
}

/// Shared collaborators every controller needs while handling an event.
pub struct Context {
    pub config: Arc<ClientConfig>,
    pub sinks: Box<dyn SinkFactory>,
}

/// The one cancellable scheduled operation: the expected-duration timer.
/// Dropping it cancels the timer.
struct PendingTimer {
    delay: Duration,
    task: JoinHandle<()>,
}

impl Drop for PendingTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Drives one RTSP session from DESCRIBE to TEARDOWN.
///
/// Each asynchronous completion arrives as a [`SessionEvent`] passed to
/// [`handle`](Self::handle). When the session ends, `handle` returns the
/// [`Termination`] exactly once; the controller is then `Closed` and
/// ignores further events.
pub struct SessionController {
    id: SessionId,
    url: String,
    state: SessionState,
    protocol: Box<dyn Protocol>,
    events: SessionEvents,
    session: Option<Session>,
    setup: SubsessionController,
    timer: Option<PendingTimer>,
}

impl SessionController {
    pub fn new(protocol: Box<dyn Protocol>, events: SessionEvents) -> Self {
        SessionController {
            id: events.session_id(),
            url: protocol.url().to_string(),
            state: SessionState::Idle,
            protocol,
            events,
            session: None,
            setup: SubsessionController::new(),
            timer: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The negotiated session, between a successful DESCRIBE and shutdown.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Delay of the scheduled duration timer, if one is pending.
    pub fn timer_delay(&self) -> Option<Duration> {
        self.timer.as_ref().map(|t| t.delay)
    }

    /// Issue DESCRIBE.
    pub fn begin(&mut self) {
        if self.state != SessionState::Idle {
            return;
        }
        tracing::info!(url = %self.url, session = self.id, "opening session");
        self.state = SessionState::Describing;
        self.protocol.send_describe();
    }

    /// Dispatch one event. Returns the termination when this event closed
    /// the session.
    pub fn handle(&mut self, event: SessionEvent, ctx: &mut Context) -> Option<Termination> {
        if self.state == SessionState::Closed {
            tracing::trace!(url = %self.url, ?event, "event for closed session ignored");
            return None;
        }

        match event {
            SessionEvent::DescribeComplete(result) => self.on_describe_complete(result, ctx),
            SessionEvent::SetupComplete { index, result } => {
                self.on_setup_complete(index, result, ctx)
            }
            SessionEvent::PlayComplete(result) => self.on_play_complete(result, ctx),
            SessionEvent::FrameReady { index, frame } => {
                if let Some(sink) = self.sink_mut(index) {
                    sink.on_frame_ready(frame);
                }
                None
            }
            SessionEvent::SourceClosed { index } => self.on_substream_ended(index, None),
            SessionEvent::EndOfStream { index, reason } => self.on_substream_ended(index, reason),
            SessionEvent::DurationElapsed => self.on_timer_fired(),
        }
    }

    fn on_describe_complete(
        &mut self,
        result: Result<DescribeResponse>,
        ctx: &mut Context,
    ) -> Option<Termination> {
        if self.state != SessionState::Describing {
            return None;
        }

        let description = match result.and_then(|r| Ok((parse_sdp(&r.sdp)?, r.base_url))) {
            Ok(description) => description,
            Err(e) => {
                tracing::error!(url = %self.url, error = %e, "failed to get a SDP description");
                return self.shutdown(Termination::Failed);
            }
        };

        let session = Session::from_description(&description.0, &description.1);
        if !session.has_substreams() {
            tracing::error!(
                url = %self.url,
                "session has no media subsessions (i.e., no \"m=\" lines)"
            );
            return self.shutdown(Termination::Failed);
        }

        tracing::info!(
            url = %self.url,
            substreams = session.substreams.len(),
            "obtained SDP description"
        );

        self.session = Some(session);
        self.setup = SubsessionController::new();
        self.state = SessionState::SettingUp;
        self.setup_next(ctx)
    }

    fn setup_next(&mut self, ctx: &mut Context) -> Option<Termination> {
        let session = self.session.as_mut()?;
        match self.setup.setup_next(session, self.protocol.as_mut()) {
            SetupStep::Pending(_) => None,
            SetupStep::Exhausted => self.on_all_substreams_set_up(ctx),
        }
    }

    fn on_setup_complete(
        &mut self,
        index: usize,
        result: Result<ServerTransport>,
        ctx: &mut Context,
    ) -> Option<Termination> {
        if self.state != SessionState::SettingUp || !self.setup.complete(index) {
            tracing::debug!(url = %self.url, index, "unexpected SETUP completion ignored");
            return None;
        }

        match result {
            Ok(transport) => {
                if let Err(e) = self.attach_sink(index, transport, ctx) {
                    tracing::error!(
                        url = %self.url,
                        index,
                        error = %e,
                        "failed to create a data sink for subsession"
                    );
                    return self.shutdown(Termination::Failed);
                }
            }
            Err(e) => {
                let label = self.label(index);
                tracing::warn!(url = %self.url, substream = %label, error = %e, "failed to set up subsession");
            }
        }

        self.setup_next(ctx)
    }

    fn attach_sink(
        &mut self,
        index: usize,
        transport: ServerTransport,
        ctx: &mut Context,
    ) -> Result<()> {
        let substream = self
            .session
            .as_mut()
            .and_then(|s| s.substreams.get_mut(index))
            .ok_or(RtspError::SourceUnavailable(index))?;

        let client_port = substream.client_ports.map(|p| p.rtp);
        tracing::info!(
            url = %self.url,
            substream = %substream.label(),
            client_port,
            server_port = transport.server_rtp_port,
            "set up subsession"
        );
        substream.server_transport = Some(transport);

        let consumer = ctx.sinks.create(&self.url, substream)?;
        let source = self.protocol.bound_source(substream)?;

        let mut reassembler = FrameReassembler::new(
            &self.url,
            &substream.label(),
            substream.parameter_sets.clone(),
            ctx.config.receive_buffer_size,
            source,
            consumer,
        );
        reassembler.start_playing();
        substream.sink = Some(Sink::Reassembler(reassembler));
        Ok(())
    }

    fn on_all_substreams_set_up(&mut self, ctx: &mut Context) -> Option<Termination> {
        let session = self.session.as_ref()?;

        if session.active_substreams() == 0 {
            match ctx.config.empty_setup_policy {
                EmptySetupPolicy::Shutdown => {
                    tracing::error!(url = %self.url, "no subsession could be set up");
                    return self.shutdown(Termination::Failed);
                }
                EmptySetupPolicy::PlayAnyway => {
                    tracing::warn!(url = %self.url, "no subsession was set up, sending PLAY anyway");
                }
            }
        }

        self.protocol.send_play(&session.control_url, &session.range);
        self.state = SessionState::Playing;
        None
    }

    fn on_play_complete(&mut self, result: Result<()>, ctx: &mut Context) -> Option<Termination> {
        if self.state != SessionState::Playing || self.timer.is_some() {
            return None;
        }

        if let Err(e) = result {
            tracing::error!(url = %self.url, error = %e, "failed to start playing session");
            return self.shutdown(Termination::Failed);
        }

        let duration = self
            .session
            .as_ref()
            .map_or(0.0, |s| s.range.expected_duration());

        let delay = if duration > 0.0 {
            let delay = Duration::try_from_secs_f64(duration)
                .ok()
                .and_then(|d| d.checked_add(ctx.config.duration_slop));
            if delay.is_none() {
                tracing::warn!(url = %self.url, duration, "session duration out of range, no timer");
            }
            delay
        } else {
            None
        };

        match delay {
            Some(delay) => {
                self.schedule_timer(delay);
                tracing::info!(
                    url = %self.url,
                    "started playing session (for up to {duration} seconds)"
                );
            }
            None => tracing::info!(url = %self.url, "started playing session"),
        }
        None
    }

    fn schedule_timer(&mut self, delay: Duration) {
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            events.send(SessionEvent::DurationElapsed);
        });
        self.timer = Some(PendingTimer { delay, task });
    }

    fn on_timer_fired(&mut self) -> Option<Termination> {
        if self.timer.take().is_none() {
            return None;
        }
        tracing::info!(url = %self.url, "expected duration elapsed");
        self.shutdown(Termination::Completed)
    }

    fn on_substream_ended(&mut self, index: usize, reason: Option<String>) -> Option<Termination> {
        let session = self.session.as_mut()?;
        let substream = session.substreams.get_mut(index)?;
        let sink = substream.sink.take()?;

        tracing::info!(
            url = %self.url,
            substream = %substream.label(),
            frames = sink.frames_delivered(),
            reason = reason.as_deref().unwrap_or(""),
            "subsession ended"
        );

        if session.active_substreams() == 0 {
            tracing::info!(url = %self.url, "all subsessions have ended");
            return self.shutdown(Termination::Completed);
        }
        None
    }

    /// Close the session: drop every sink, send TEARDOWN if anything was
    /// still receiving, cancel the duration timer.
    ///
    /// Only the first call returns the termination; later calls are no-ops
    /// returning `None`.
    pub fn shutdown(&mut self, termination: Termination) -> Option<Termination> {
        if matches!(self.state, SessionState::ShuttingDown | SessionState::Closed) {
            return None;
        }
        self.state = SessionState::ShuttingDown;
        self.timer = None;
        if let Some(index) = self.setup.pending() {
            tracing::debug!(url = %self.url, index, "abandoning SETUP in flight");
        }

        if let Some(mut session) = self.session.take() {
            let mut active = 0;
            for substream in &mut session.substreams {
                if let Some(sink) = substream.sink.take() {
                    active += 1;
                    tracing::debug!(
                        url = %self.url,
                        substream = %substream.label(),
                        frames = sink.frames_delivered(),
                        "closing sink"
                    );
                }
            }
            if active > 0 {
                self.protocol.send_teardown(&session.control_url);
            }
        }

        self.state = SessionState::Closed;
        tracing::info!(
            url = %self.url,
            exit_code = termination.exit_code(),
            "session closed"
        );
        Some(termination)
    }

    /// Give up the protocol once closed; see [`Protocol::into_background`].
    pub fn into_background(self) -> Option<JoinHandle<()>> {
        self.protocol.into_background()
    }

    fn sink_mut(&mut self, index: usize) -> Option<&mut Sink> {
        self.session
            .as_mut()?
            .substreams
            .get_mut(index)?
            .sink
            .as_mut()
    }

    fn label(&self, index: usize) -> String {
        self.session
            .as_ref()
            .and_then(|s| s.substreams.get(index))
            .map(|s| s.label())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Call, MockProtocol, RecordingSinks, h264_sdp, media_sdp};
    use std::cell::RefCell;
    use std::rc::Rc;
    use tokio::sync::mpsc;

    type Calls = Rc<RefCell<Vec<Call>>>;
    type Rx = mpsc::UnboundedReceiver<(SessionId, SessionEvent)>;

    struct Harness {
        controller: SessionController,
        ctx: Context,
        calls: Calls,
        rx: Rx,
        sinks: Rc<RefCell<Vec<String>>>,
    }

    fn harness_with(protocol: MockProtocol, calls: Calls, config: ClientConfig) -> Harness {
        let (tx, rx) = mpsc::unbounded_channel();
        let (sinks, created) = RecordingSinks::new();
        let controller = SessionController::new(Box::new(protocol), SessionEvents::new(1, tx));
        Harness {
            controller,
            ctx: Context {
                config: Arc::new(config),
                sinks: Box::new(sinks),
            },
            calls,
            rx,
            sinks: created,
        }
    }

    fn harness() -> Harness {
        let (protocol, calls) = MockProtocol::new();
        harness_with(protocol, calls, ClientConfig::default())
    }

    impl Harness {
        fn handle(&mut self, event: SessionEvent) -> Option<Termination> {
            self.controller.handle(event, &mut self.ctx)
        }

        fn describe(&mut self, sdp: String) -> Option<Termination> {
            self.controller.begin();
            self.handle(SessionEvent::DescribeComplete(Ok(DescribeResponse {
                base_url: "rtsp://h/s/".to_string(),
                sdp,
            })))
        }

        fn setup_ok(&mut self, index: usize) -> Option<Termination> {
            self.handle(SessionEvent::SetupComplete {
                index,
                result: Ok(ServerTransport::default()),
            })
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.borrow().clone()
        }

        fn teardowns(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c, Call::Teardown(_)))
                .count()
        }
    }

    #[tokio::test]
    async fn k_of_n_substreams_are_set_up_in_order() {
        let (mut protocol, calls) = MockProtocol::new();
        protocol.fail_activation(1);
        let mut h = harness_with(protocol, calls, ClientConfig::default());

        assert_eq!(h.describe(h264_sdp(3, Some("0-10"))), None);
        assert_eq!(h.controller.state(), SessionState::SettingUp);

        assert_eq!(h.setup_ok(0), None);
        assert_eq!(
            h.handle(SessionEvent::SetupComplete {
                index: 2,
                result: Err(RtspError::Status {
                    method: "SETUP".to_string(),
                    code: 461,
                    reason: "Unsupported Transport".to_string(),
                }),
            }),
            None
        );

        assert_eq!(
            h.calls(),
            vec![
                Call::Describe,
                Call::Activate(0),
                Call::Setup(0),
                Call::BoundSource(0),
                Call::Activate(1),
                Call::Activate(2),
                Call::Setup(2),
                Call::Play("npt=0.000-".to_string()),
            ]
        );
        assert_eq!(h.controller.state(), SessionState::Playing);
        assert_eq!(h.controller.session().map(|s| s.active_substreams()), Some(1));
        assert_eq!(h.sinks.borrow().as_slice(), &["video/H264".to_string()]);
    }

    #[tokio::test]
    async fn video_then_audio_set_up_in_declared_order() {
        let mut h = harness();
        assert_eq!(h.describe(media_sdp(&["video", "audio"], Some("0-10"))), None);
        assert_eq!(h.setup_ok(0), None);
        assert_eq!(h.setup_ok(1), None);

        assert_eq!(
            h.calls(),
            vec![
                Call::Describe,
                Call::Activate(0),
                Call::Setup(0),
                Call::BoundSource(0),
                Call::Activate(1),
                Call::Setup(1),
                Call::BoundSource(1),
                Call::Play("npt=0.000-".to_string()),
            ]
        );
        assert_eq!(
            h.sinks.borrow().as_slice(),
            &["video/H264".to_string(), "audio/PCMU".to_string()]
        );
        let controls: Vec<String> = h
            .controller
            .session()
            .map(|s| s.substreams.iter().map(|ss| ss.control_url.clone()).collect())
            .unwrap_or_default();
        assert_eq!(controls, vec!["rtsp://h/s/track1", "rtsp://h/s/track2"]);
    }

    #[tokio::test]
    async fn describe_failure_only_issues_describe() {
        let mut h = harness();
        h.controller.begin();
        let result = h.handle(SessionEvent::DescribeComplete(Err(RtspError::Status {
            method: "DESCRIBE".to_string(),
            code: 404,
            reason: "Not Found".to_string(),
        })));

        assert_eq!(result, Some(Termination::Failed));
        assert_eq!(h.calls(), vec![Call::Describe]);
        assert_eq!(h.controller.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn unparseable_description_fails() {
        let mut h = harness();
        assert_eq!(h.describe("not sdp".to_string()), Some(Termination::Failed));
        assert_eq!(h.calls(), vec![Call::Describe]);
    }

    #[tokio::test]
    async fn zero_substreams_fails_without_setup() {
        let mut h = harness();
        assert_eq!(h.describe("v=0\r\ns=empty\r\n".to_string()), Some(Termination::Failed));
        assert_eq!(h.calls(), vec![Call::Describe]);
    }

    #[tokio::test(start_paused = true)]
    async fn duration_timer_fires_at_duration_plus_slop() {
        let mut h = harness();
        let start = tokio::time::Instant::now();

        h.describe(h264_sdp(2, Some("0-10")));
        h.setup_ok(0);
        h.setup_ok(1);
        assert_eq!(h.handle(SessionEvent::PlayComplete(Ok(()))), None);
        assert_eq!(h.controller.timer_delay(), Some(Duration::from_secs(12)));

        // Nothing fires before the deadline.
        assert!(
            tokio::time::timeout(Duration::from_secs(11), h.rx.recv())
                .await
                .is_err()
        );

        let (id, event) = h.rx.recv().await.unwrap();
        assert_eq!(id, 1);
        assert!(matches!(event, SessionEvent::DurationElapsed));
        assert!(start.elapsed() >= Duration::from_secs(12));

        assert_eq!(h.handle(event), Some(Termination::Completed));
        assert_eq!(h.teardowns(), 1);
        assert_eq!(h.controller.timer_delay(), None);
    }

    #[tokio::test]
    async fn no_timer_without_positive_duration() {
        for range in [None, Some("5-5")] {
            let mut h = harness();
            h.describe(h264_sdp(1, range));
            h.setup_ok(0);
            assert_eq!(h.handle(SessionEvent::PlayComplete(Ok(()))), None);
            assert_eq!(h.controller.timer_delay(), None);
            assert_eq!(h.controller.state(), SessionState::Playing);
        }
    }

    #[tokio::test]
    async fn oversized_duration_plays_without_timer() {
        for range in ["0-inf", "0-1e20"] {
            let mut h = harness();
            h.describe(h264_sdp(1, Some(range)));
            h.setup_ok(0);
            assert_eq!(h.handle(SessionEvent::PlayComplete(Ok(()))), None, "range {range}");
            assert_eq!(h.controller.timer_delay(), None, "range {range}");
            assert_eq!(h.controller.state(), SessionState::Playing);
        }
    }

    #[tokio::test]
    async fn play_failure_fails_and_tears_down() {
        let mut h = harness();
        h.describe(h264_sdp(1, Some("0-10")));
        h.setup_ok(0);
        let result = h.handle(SessionEvent::PlayComplete(Err(RtspError::ConnectionClosed)));
        assert_eq!(result, Some(Termination::Failed));
        assert_eq!(h.teardowns(), 1);
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let mut h = harness();
        h.describe(h264_sdp(2, Some("0-10")));
        h.setup_ok(0);
        h.setup_ok(1);
        h.handle(SessionEvent::PlayComplete(Ok(())));

        assert_eq!(h.controller.shutdown(Termination::Completed), Some(Termination::Completed));
        assert_eq!(h.controller.shutdown(Termination::Failed), None);
        assert_eq!(h.handle(SessionEvent::DurationElapsed), None);
        assert_eq!(h.teardowns(), 1);
        assert!(h.controller.session().is_none());
    }

    #[tokio::test]
    async fn no_teardown_when_nothing_was_active() {
        let (mut protocol, calls) = MockProtocol::new();
        protocol.fail_activation(0);
        let config = ClientConfig {
            empty_setup_policy: EmptySetupPolicy::Shutdown,
            ..ClientConfig::default()
        };
        let mut h = harness_with(protocol, calls, config);

        assert_eq!(h.describe(h264_sdp(1, None)), Some(Termination::Failed));
        assert_eq!(h.teardowns(), 0);
        assert!(!h.calls().iter().any(|c| matches!(c, Call::Play(_))));
    }

    #[tokio::test]
    async fn play_anyway_when_nothing_was_set_up() {
        let (mut protocol, calls) = MockProtocol::new();
        protocol.fail_activation(0);
        let mut h = harness_with(protocol, calls, ClientConfig::default());

        assert_eq!(h.describe(h264_sdp(1, None)), None);
        assert_eq!(h.controller.state(), SessionState::Playing);
        assert!(h.calls().iter().any(|c| matches!(c, Call::Play(_))));
    }

    #[tokio::test]
    async fn sink_creation_failure_shuts_down() {
        let (mut protocol, calls) = MockProtocol::new();
        protocol.fail_source(0);
        let mut h = harness_with(protocol, calls, ClientConfig::default());

        h.describe(h264_sdp(2, Some("0-10")));
        assert_eq!(h.setup_ok(0), Some(Termination::Failed));
        assert!(!h.calls().contains(&Call::Setup(1)));
        assert_eq!(h.teardowns(), 0);
    }

    #[tokio::test]
    async fn end_of_every_substream_completes() {
        let mut h = harness();
        h.describe(h264_sdp(2, None));
        h.setup_ok(0);
        h.setup_ok(1);
        h.handle(SessionEvent::PlayComplete(Ok(())));

        let bye = |index| SessionEvent::EndOfStream {
            index,
            reason: Some("done".to_string()),
        };
        assert_eq!(h.handle(bye(0)), None);
        assert_eq!(h.handle(bye(0)), None, "second BYE for a closed substream");
        assert_eq!(h.handle(SessionEvent::SourceClosed { index: 1 }), Some(Termination::Completed));
        // Every sink was already closed, so no TEARDOWN goes out.
        assert_eq!(h.teardowns(), 0);
    }

    #[tokio::test]
    async fn substream_ending_during_setup_shuts_down_once_none_remain() {
        let mut h = harness();
        h.describe(h264_sdp(2, None));
        assert_eq!(h.setup_ok(0), None);
        assert!(h.calls().contains(&Call::Setup(1)));

        assert_eq!(
            h.handle(SessionEvent::SourceClosed { index: 0 }),
            Some(Termination::Completed)
        );
        assert_eq!(h.controller.state(), SessionState::Closed);

        // The SETUP still in flight completes against a closed session.
        let late = h.handle(SessionEvent::SetupComplete {
            index: 1,
            result: Err(RtspError::ConnectionClosed),
        });
        assert_eq!(late, None);
        assert!(!h.calls().iter().any(|c| matches!(c, Call::Play(_))));
        assert_eq!(h.teardowns(), 0);
    }

    #[tokio::test]
    async fn frames_reach_the_sink_and_rearm_the_source() {
        let (protocol, calls) = MockProtocol::new();
        let requests = protocol.source_requests();
        let mut h = harness_with(protocol, calls, ClientConfig::default());

        h.describe(h264_sdp(1, None));
        h.setup_ok(0);
        assert_eq!(requests.borrow().as_slice(), &[(0, 100_000)]);

        h.handle(SessionEvent::FrameReady {
            index: 0,
            frame: crate::media::Frame {
                data: bytes::Bytes::from_static(&[0x65, 1]),
                truncated: 0,
                presentation_time: Duration::ZERO,
            },
        });
        assert_eq!(requests.borrow().len(), 2);
        let frames = h
            .controller
            .session()
            .and_then(|s| s.substreams[0].sink.as_ref())
            .map(|s| s.frames_delivered());
        assert_eq!(frames, Some(1));
    }
}
