//! Client-side RTSP session model and state machine (RFC 2326 §A.1).
//!
//! A [`Session`] is built from the DESCRIBE response and owns one
//! [`Substream`] per SDP `m=` section. The [`SessionController`] walks it
//! through the negotiation sequence:
//!
//! ```text
//! Idle ─begin─► Describing ─ok─► SettingUp ─(one SETUP at a time)─► Playing
//!                   │                │                                 │
//!                   └─fail──────────►└─────────► ShuttingDown ◄────────┘
//!                                                     │
//!                                                  Closed
//! ```
//!
//! Playback ends on the expected-duration timer, an RTCP BYE on every
//! substream, or a failure; all of them go through
//! [`SessionController::shutdown`].

pub mod controller;
pub mod events;
pub mod setup;
pub mod transport;

pub use controller::{SessionController, SessionState, Termination};
pub use events::{DescribeResponse, SessionEvent, SessionEvents, SessionId};
pub use setup::{SetupStep, SubsessionController};
pub use transport::{ClientPorts, ServerTransport};

use crate::error::Result;
use crate::media::{FrameConsumer, Sink};
use crate::protocol::sdp::{self, MediaDescription, Range, SessionDescription};

/// Creates the decode/render consumer for a successfully set-up substream.
///
/// Failing here is fatal for the session (the stream cannot be consumed).
pub trait SinkFactory {
    fn create(&mut self, url: &str, substream: &Substream) -> Result<Box<dyn FrameConsumer>>;
}

/// Play range the PLAY request is issued for.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayRange {
    /// The presentation is indexed by absolute UTC time.
    Absolute { start: String, end: Option<String> },
    /// Normal play time, relative to the start of the presentation.
    Relative { start: f64, end: Option<f64> },
}

impl PlayRange {
    /// Value for the PLAY request's `Range` header (RFC 2326 §12.29).
    pub fn header_value(&self) -> String {
        match self {
            PlayRange::Absolute { start, end } => {
                format!("clock={}-{}", start, end.as_deref().unwrap_or(""))
            }
            PlayRange::Relative { start, .. } => format!("npt={:.3}-", start),
        }
    }

    /// Expected playing time in seconds: `end - start` for relative ranges
    /// with a known end, `0` otherwise.
    pub fn expected_duration(&self) -> f64 {
        match self {
            PlayRange::Relative {
                start,
                end: Some(end),
            } => end - start,
            _ => 0.0,
        }
    }
}

/// One independently delivered media stream within a [`Session`].
pub struct Substream {
    /// Position in the SDP, which is also the SETUP order.
    pub index: usize,
    pub medium: String,
    pub codec: String,
    pub protocol: String,
    pub payload_type: u8,
    pub clock_rate: u32,
    /// Absolute URL used for this substream's SETUP.
    pub control_url: String,
    /// `sprop-parameter-sets` from the SDP fmtp line, if any.
    pub parameter_sets: Option<String>,
    /// Local RTP/RTCP ports, set when the substream is activated.
    pub client_ports: Option<ClientPorts>,
    /// Server-side transport, set when SETUP succeeds.
    pub server_transport: Option<ServerTransport>,
    /// Active sink; at most one per substream.
    pub sink: Option<Sink>,
}

impl Substream {
    fn from_media(index: usize, media: &MediaDescription, base_url: &str) -> Self {
        Substream {
            index,
            medium: media.medium.clone(),
            codec: media.encoding_name.clone(),
            protocol: media.protocol.clone(),
            payload_type: media.payload_type,
            clock_rate: media.clock_rate,
            control_url: sdp::resolve_control(base_url, media.control.as_deref()),
            parameter_sets: media.fmtp_param("sprop-parameter-sets").map(str::to_string),
            client_ports: None,
            server_transport: None,
            sink: None,
        }
    }

    /// `medium/codec`, e.g. `video/H264`; used to identify the substream in logs.
    pub fn label(&self) -> String {
        format!("{}/{}", self.medium, self.codec)
    }

    pub fn is_active(&self) -> bool {
        self.sink.is_some()
    }
}

/// One negotiated media session, built from a DESCRIBE response.
pub struct Session {
    /// Aggregate control URL used for PLAY and TEARDOWN.
    pub control_url: String,
    pub substreams: Vec<Substream>,
    pub range: PlayRange,
}

impl Session {
    /// Build a session from a parsed description.
    ///
    /// The play range comes from the session-level `a=range`; without one,
    /// media-level ranges are merged (earliest start, latest end).
    pub fn from_description(description: &SessionDescription, base_url: &str) -> Self {
        let substreams = description
            .media
            .iter()
            .enumerate()
            .map(|(i, m)| Substream::from_media(i, m, base_url))
            .collect();

        let range = match &description.range {
            Some(range) => play_range(range),
            None => merge_media_ranges(&description.media),
        };

        Session {
            control_url: sdp::resolve_control(base_url, description.control.as_deref()),
            substreams,
            range,
        }
    }

    pub fn has_substreams(&self) -> bool {
        !self.substreams.is_empty()
    }

    pub fn active_substreams(&self) -> usize {
        self.substreams.iter().filter(|s| s.is_active()).count()
    }
}

fn play_range(range: &Range) -> PlayRange {
    match range {
        Range::Npt { start, end } => PlayRange::Relative {
            start: *start,
            end: *end,
        },
        Range::Clock { start, end } => PlayRange::Absolute {
            start: start.clone(),
            end: end.clone(),
        },
    }
}

fn merge_media_ranges(media: &[MediaDescription]) -> PlayRange {
    if let Some(Range::Clock { start, end }) = media
        .iter()
        .filter_map(|m| m.range.as_ref())
        .find(|r| matches!(r, Range::Clock { .. }))
    {
        return PlayRange::Absolute {
            start: start.clone(),
            end: end.clone(),
        };
    }

    let mut merged: Option<(f64, Option<f64>)> = None;
    for range in media.iter().filter_map(|m| m.range.as_ref()) {
        if let Range::Npt { start, end } = range {
            merged = Some(match merged {
                None => (*start, *end),
                Some((s, e)) => (s.min(*start), max_end(e, *end)),
            });
        }
    }

    let (start, end) = merged.unwrap_or((0.0, None));
    PlayRange::Relative { start, end }
}

fn max_end(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, None) => a,
        (None, b) => b,
    }
}
