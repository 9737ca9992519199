use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::media::reassembler::DEFAULT_RECEIVE_BUFFER_SIZE;
use crate::protocol::request::USER_AGENT;
use crate::protocol::{Protocol, RtspClient};
use crate::session::controller::Context;
use crate::session::{SessionController, SessionEvent, SessionEvents, SessionId, SinkFactory, Termination};

/// How long queued TEARDOWNs may take to flush once every session closed.
const TEARDOWN_GRACE: Duration = Duration::from_millis(500);

/// What to do when DESCRIBE succeeded but no substream could be set up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmptySetupPolicy {
    /// Send PLAY regardless; the session then ends on its timer or on a
    /// server error.
    #[default]
    PlayAnyway,
    /// Shut the session down as failed.
    Shutdown,
}

/// Client-level configuration shared by every session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `User-Agent` sent with every request; also the RTCP CNAME.
    pub user_agent: String,
    /// Receive buffer capacity per substream; larger frames are truncated.
    pub receive_buffer_size: usize,
    /// Added to the expected duration before the session is shut down.
    pub duration_slop: Duration,
    pub empty_setup_policy: EmptySetupPolicy,
    /// Interval between RTCP receiver reports.
    pub rtcp_report_interval: Duration,
    /// Frames a substream queues before dropping the oldest.
    pub max_pending_frames: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: USER_AGENT.to_string(),
            receive_buffer_size: DEFAULT_RECEIVE_BUFFER_SIZE,
            duration_slop: Duration::from_secs(2),
            empty_setup_policy: EmptySetupPolicy::PlayAnyway,
            rtcp_report_interval: Duration::from_secs(5),
            max_pending_frames: 64,
        }
    }
}

/// Creates the protocol collaborator for a newly opened session.
pub trait Connector {
    fn connect(
        &mut self,
        url: &str,
        events: SessionEvents,
        config: &Arc<ClientConfig>,
    ) -> Result<Box<dyn Protocol>>;
}

/// Connects over RTSP/UDP with [`RtspClient`].
#[derive(Debug, Default)]
pub struct RtspConnector;

impl Connector for RtspConnector {
    fn connect(
        &mut self,
        url: &str,
        events: SessionEvents,
        config: &Arc<ClientConfig>,
    ) -> Result<Box<dyn Protocol>> {
        Ok(Box::new(RtspClient::new(url, events, config.clone())?))
    }
}

/// Owns every open session and the event loop that drives them.
///
/// All sessions share one event channel; [`run`](Self::run) hands each
/// event to its controller, one at a time. The registry counts open
/// sessions and finishes when the last one closes, reporting how that
/// session ended.
pub struct StreamRegistry {
    ctx: Context,
    connector: Box<dyn Connector>,
    sessions: HashMap<SessionId, SessionController>,
    next_id: SessionId,
    active: usize,
    last: Option<Termination>,
    closing: Vec<JoinHandle<()>>,
    events_tx: mpsc::UnboundedSender<(SessionId, SessionEvent)>,
    events_rx: mpsc::UnboundedReceiver<(SessionId, SessionEvent)>,
}

impl StreamRegistry {
    pub fn new(config: ClientConfig, sinks: Box<dyn SinkFactory>) -> Self {
        Self::with_connector(config, sinks, Box::new(RtspConnector))
    }

    /// Create a registry with a custom protocol connector.
    pub fn with_connector(
        config: ClientConfig,
        sinks: Box<dyn SinkFactory>,
        connector: Box<dyn Connector>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            ctx: Context {
                config: Arc::new(config),
                sinks,
            },
            connector,
            sessions: HashMap::new(),
            next_id: 1,
            active: 0,
            last: None,
            closing: Vec::new(),
            events_tx,
            events_rx,
        }
    }

    /// Open a session for `url` and issue its DESCRIBE.
    ///
    /// Returns `None` (and registers nothing) if the protocol client cannot
    /// be created, e.g. for a malformed URL. Must be called within a tokio
    /// runtime.
    pub fn open(&mut self, url: &str) -> Option<SessionId> {
        let id = self.next_id;
        let events = SessionEvents::new(id, self.events_tx.clone());

        let protocol = match self.connector.connect(url, events.clone(), &self.ctx.config) {
            Ok(protocol) => protocol,
            Err(e) => {
                tracing::error!(url, error = %e, "failed to create an RTSP client");
                return None;
            }
        };

        self.next_id += 1;
        let mut controller = SessionController::new(protocol, events);
        controller.begin();
        self.sessions.insert(id, controller);
        self.active += 1;
        Some(id)
    }

    /// Sessions that have been opened and not yet closed.
    pub fn active_sessions(&self) -> usize {
        self.active
    }

    /// Dispatch events until every open session has closed.
    ///
    /// Returns how the last session to close ended, or
    /// [`Termination::Failed`] if no session was ever opened.
    pub async fn run(&mut self) -> Termination {
        while self.active > 0 {
            let Some((id, event)) = self.events_rx.recv().await else {
                break;
            };
            let Some(controller) = self.sessions.get_mut(&id) else {
                tracing::trace!(session = id, "event for unknown session dropped");
                continue;
            };
            if let Some(termination) = controller.handle(event, &mut self.ctx) {
                self.close(id, termination);
            }
        }

        self.flush().await;
        self.last.unwrap_or(Termination::Failed)
    }

    fn close(&mut self, id: SessionId, termination: Termination) {
        let Some(controller) = self.sessions.remove(&id) else {
            return;
        };
        self.active -= 1;
        self.last = Some(termination);
        tracing::debug!(
            session = id,
            url = %controller.url(),
            remaining = self.active,
            "session removed"
        );
        if let Some(task) = controller.into_background() {
            self.closing.push(task);
        }
    }

    /// Give closed sessions' connections a moment to send TEARDOWN.
    async fn flush(&mut self) {
        let tasks = std::mem::take(&mut self.closing);
        let drained = tokio::time::timeout(TEARDOWN_GRACE, async {
            for task in tasks {
                let _ = task.await;
            }
        })
        .await;
        if drained.is_err() {
            tracing::debug!("connections still busy at exit");
        }
    }
}
