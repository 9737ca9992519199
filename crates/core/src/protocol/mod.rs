//! RTSP protocol implementation (RFC 2326), client side.
//!
//! This module handles the text-based RTSP signaling protocol: building
//! requests, parsing responses and SDP, and driving one server connection
//! on behalf of a [`SessionController`](crate::session::SessionController).
//!
//! ## RTSP message format (RFC 2326 §4)
//!
//! RTSP messages follow HTTP/1.1 syntax with a different method set:
//!
//! ```text
//! DESCRIBE rtsp://server/stream RTSP/1.0\r\n
//! CSeq: 2\r\n
//! Accept: application/sdp\r\n
//! \r\n
//! ```
//!
//! Key differences from HTTP:
//! - Stateful: sessions persist across requests (RFC 2326 §3).
//! - Different methods: OPTIONS, DESCRIBE, SETUP, PLAY, PAUSE, TEARDOWN.
//! - Session header carries a server-assigned ID (RFC 2326 §12.37).
//!
//! ## Methods issued by the client
//!
//! | Method | RFC section | Purpose |
//! |--------|-------------|---------|
//! | DESCRIBE | §10.2 | Retrieve SDP session description |
//! | SETUP | §10.4 | Negotiate transport (UDP ports), one per substream |
//! | PLAY | §10.5 | Start media delivery for the aggregate URL |
//! | TEARDOWN | §10.7 | Destroy session (no response awaited) |

pub mod client;
pub mod request;
pub mod response;
pub mod sdp;
pub mod url;

pub use client::RtspClient;
pub use request::RtspRequest;
pub use response::RtspResponse;

use crate::error::Result;
use crate::media::FrameSource;
use crate::session::{ClientPorts, PlayRange, Substream};

/// The protocol collaborator a session controller drives.
///
/// Request methods return immediately; each answer arrives later as one
/// [`SessionEvent`](crate::session::SessionEvent) on the session's event
/// channel. TEARDOWN is never answered.
pub trait Protocol {
    /// URL the session was opened for.
    fn url(&self) -> &str;

    /// Issue DESCRIBE. Answered by `DescribeComplete`.
    fn send_describe(&mut self);

    /// Prepare local reception for a substream (bind client ports).
    /// Fails when the substream cannot be received at all.
    fn activate(&mut self, substream: &mut Substream) -> Result<ClientPorts>;

    /// Issue SETUP for an activated substream. Answered by `SetupComplete`.
    fn send_setup(&mut self, substream: &Substream);

    /// Issue PLAY for the aggregate control URL. Answered by `PlayComplete`.
    fn send_play(&mut self, url: &str, range: &PlayRange);

    /// Issue TEARDOWN for the aggregate control URL.
    fn send_teardown(&mut self, url: &str);

    /// Hand out the frame source bound to a set-up substream. Each
    /// substream's source can be taken once.
    fn bound_source(&mut self, substream: &Substream) -> Result<Box<dyn FrameSource>>;

    /// Give up the protocol, returning any background work still flushing
    /// requests (a queued TEARDOWN) so the caller can wait for it.
    fn into_background(self: Box<Self>) -> Option<tokio::task::JoinHandle<()>> {
        None
    }
}
