//! Error types for the RTSP client library.

use std::fmt;

/// Errors that can occur in the RTSP client library.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Protocol**: [`Parse`](Self::Parse), [`Status`](Self::Status),
///   [`Sdp`](Self::Sdp), [`InvalidUrl`](Self::InvalidUrl).
/// - **Transport**: [`Io`](Self::Io), [`ConnectionClosed`](Self::ConnectionClosed),
///   [`UnsupportedTransport`](Self::UnsupportedTransport),
///   [`PortAllocation`](Self::PortAllocation),
///   [`SourceUnavailable`](Self::SourceUnavailable).
/// - **Media**: [`ParameterSets`](Self::ParameterSets),
///   [`SinkCreation`](Self::SinkCreation), [`Decode`](Self::Decode).
#[derive(Debug, thiserror::Error)]
pub enum RtspError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse an RTSP response message (RFC 2326 §7).
    #[error("RTSP parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// The server answered a request with a non-2xx status.
    #[error("{method} failed: {code} {reason}")]
    Status {
        method: String,
        code: u16,
        reason: String,
    },

    /// The DESCRIBE body could not be turned into a session description.
    #[error("SDP error: {0}")]
    Sdp(String),

    /// The stream URL is not a usable `rtsp://` URL.
    #[error("invalid RTSP URL: {0}")]
    InvalidUrl(String),

    /// The server closed the RTSP connection while a response was expected.
    #[error("connection closed by server")]
    ConnectionClosed,

    /// A substream declares a transport profile this client cannot receive.
    #[error("unsupported transport: {0}")]
    UnsupportedTransport(String),

    /// No even/odd UDP port pair could be bound for RTP/RTCP.
    #[error("could not allocate a client RTP/RTCP port pair")]
    PortAllocation,

    /// `sprop-parameter-sets` contained a record that is not valid base64.
    #[error("invalid parameter sets: {0}")]
    ParameterSets(#[from] base64::DecodeError),

    /// The decode/render collaborator could not be attached to a substream.
    #[error("sink creation failed: {0}")]
    SinkCreation(String),

    /// The decoder rejected a frame.
    #[error("decode error: {0}")]
    Decode(String),

    /// No bound data source exists for the substream (not activated, or
    /// already handed out).
    #[error("no data source bound for substream {0}")]
    SourceUnavailable(usize),
}

/// Specific kind of RTSP parse failure.
#[derive(Debug)]
pub enum ParseErrorKind {
    /// Input was empty (no status line).
    EmptyResponse,
    /// Status line did not have the expected `Version Code Reason` format.
    InvalidStatusLine,
    /// A header line did not contain a colon separator.
    InvalidHeader,
    /// `Content-Length` was not a number or exceeded the body size limit.
    InvalidContentLength,
    /// Status line and headers exceeded the head size limit.
    HeadTooLarge,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyResponse => write!(f, "empty response"),
            Self::InvalidStatusLine => write!(f, "invalid status line"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::InvalidContentLength => write!(f, "invalid content length"),
            Self::HeadTooLarge => write!(f, "response head too large"),
        }
    }
}

/// Convenience alias for `Result<T, RtspError>`.
pub type Result<T> = std::result::Result<T, RtspError>;
