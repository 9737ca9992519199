//! Completion events delivered to the event loop.
//!
//! Every asynchronous operation (a protocol request, a frame delivery, the
//! duration timer) reports back by posting one [`SessionEvent`] tagged
//! with its [`SessionId`]. The registry dispatches them one at a time.

use tokio::sync::mpsc;

use super::transport::ServerTransport;
use crate::error::Result;
use crate::media::Frame;

/// Identifies one session within a [`StreamRegistry`](crate::StreamRegistry).
pub type SessionId = u64;

/// Successful DESCRIBE result: the SDP body and the URL that relative
/// control attributes resolve against (`Content-Base`, else
/// `Content-Location`, else the request URL).
#[derive(Debug, Clone)]
pub struct DescribeResponse {
    pub base_url: String,
    pub sdp: String,
}

#[derive(Debug)]
pub enum SessionEvent {
    /// DESCRIBE answered (or failed before an answer).
    DescribeComplete(Result<DescribeResponse>),
    /// SETUP for substream `index` answered.
    SetupComplete {
        index: usize,
        result: Result<ServerTransport>,
    },
    /// PLAY answered.
    PlayComplete(Result<()>),
    /// A frame requested by substream `index`'s sink has arrived.
    FrameReady { index: usize, frame: Frame },
    /// Substream `index`'s source can deliver no more frames.
    SourceClosed { index: usize },
    /// The server signalled the end of substream `index` (RTCP BYE).
    EndOfStream {
        index: usize,
        reason: Option<String>,
    },
    /// The expected-duration timer expired.
    DurationElapsed,
}

/// Sending half of the event loop, bound to one session.
#[derive(Debug, Clone)]
pub struct SessionEvents {
    session: SessionId,
    tx: mpsc::UnboundedSender<(SessionId, SessionEvent)>,
}

impl SessionEvents {
    pub fn new(session: SessionId, tx: mpsc::UnboundedSender<(SessionId, SessionEvent)>) -> Self {
        Self { session, tx }
    }

    pub fn session_id(&self) -> SessionId {
        self.session
    }

    /// Post an event. Returns `false` once the event loop has gone away.
    pub fn send(&self, event: SessionEvent) -> bool {
        self.tx.send((self.session, event)).is_ok()
    }

    /// Convenience for sources: wrap a frame for substream `index`.
    pub fn frame_ready(&self, index: usize, frame: Frame) -> bool {
        self.send(SessionEvent::FrameReady { index, frame })
    }
}
