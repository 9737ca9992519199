//! Media reception: RTP depacketization and frame reassembly.
//!
//! Data flows through this module in one direction:
//!
//! ```text
//! UDP datagram ─► rtp::RtpPacket ─► Depacketizer ─► Frame
//!     ─► FrameSource (pull, one frame per request)
//!     ─► FrameReassembler (start code + extradata)
//!     ─► FrameConsumer (decode/render collaborator)
//! ```
//!
//! ## RTP overview (RFC 3550)
//!
//! Each encoded video frame arrives as one or more RTP packets. Every RTP
//! packet carries a 12-byte fixed header ([`rtp::RtpPacket`]) containing
//! a sequence number (loss detection), a media-clock timestamp, the SSRC
//! and a marker bit.
//!
//! ## Supported payload formats
//!
//! | Codec | Module | RFC | Status |
//! |-------|--------|-----|--------|
//! | H.264 | [`h264`] | [RFC 6184](https://tools.ietf.org/html/rfc6184) | Depacketized into NAL units |
//! | other | - | - | One RTP payload per frame (passthrough) |

pub mod h264;
pub mod reassembler;
pub mod rtcp;
pub mod rtp;
pub mod sprop;

use std::time::Duration;

use bytes::Bytes;

pub use reassembler::{FrameReassembler, Sink};

use crate::error::Result;
use h264::H264Depacketizer;

/// One unit of data produced by a [`FrameSource`].
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame payload, at most the requested `max_size` bytes.
    pub data: Bytes,
    /// Bytes dropped because the frame exceeded `max_size`.
    pub truncated: usize,
    /// Presentation time relative to the first packet of the substream.
    pub presentation_time: Duration,
}

/// Pull-based source of frames for one substream.
///
/// Each call to [`get_next_frame`](Self::get_next_frame) is answered
/// asynchronously by exactly one `FrameReady` or `SourceClosed` event for
/// the substream. Dropping the source stops delivery.
pub trait FrameSource {
    /// Request the next frame, truncated to at most `max_size` bytes.
    fn get_next_frame(&mut self, max_size: usize);
}

/// A reassembled, decodable unit handed to the decode/render collaborator.
#[derive(Debug, Clone, Copy)]
pub struct AccessUnit<'a> {
    /// Parameter sets, each preceded by a start code. Identical for every
    /// unit of a substream; empty when the SDP carried none.
    pub extradata: &'a [u8],
    /// `00 00 00 01` followed by the delivered frame bytes.
    pub data: &'a [u8],
    /// Bytes lost to receive-buffer truncation.
    pub truncated: usize,
    pub presentation_time: Duration,
}

/// Consumer of reassembled access units: the decode/render side of a sink.
pub trait FrameConsumer {
    fn consume(&mut self, unit: AccessUnit<'_>) -> Result<()>;
}

/// Codec-specific conversion of RTP payloads into frames.
#[derive(Debug)]
pub enum Depacketizer {
    /// NAL units per RFC 6184.
    H264(H264Depacketizer),
    /// Every RTP payload is delivered as one frame.
    Passthrough,
}

impl Depacketizer {
    /// Pick a depacketizer for an SDP encoding name (case-insensitive).
    pub fn for_codec(encoding_name: &str) -> Self {
        if encoding_name.eq_ignore_ascii_case("H264") {
            Depacketizer::H264(H264Depacketizer::new())
        } else {
            Depacketizer::Passthrough
        }
    }

    pub fn push(&mut self, sequence: u16, payload: &[u8]) -> Vec<Bytes> {
        match self {
            Depacketizer::H264(d) => d.push(sequence, payload),
            Depacketizer::Passthrough if payload.is_empty() => Vec::new(),
            Depacketizer::Passthrough => vec![Bytes::copy_from_slice(payload)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depacketizer_selection() {
        assert!(matches!(
            Depacketizer::for_codec("h264"),
            Depacketizer::H264(_)
        ));
        assert!(matches!(
            Depacketizer::for_codec("PCMU"),
            Depacketizer::Passthrough
        ));
    }

    #[test]
    fn passthrough_delivers_payload_as_is() {
        let mut d = Depacketizer::Passthrough;
        assert_eq!(d.push(1, &[1, 2, 3]), vec![Bytes::from_static(&[1, 2, 3])]);
        assert!(d.push(2, &[]).is_empty());
    }
}
