//! Network transport layer for RTSP signaling and RTP media reception.
//!
//! RTSP uses a split transport model:
//!
//! - **TCP** ([`tcp`]): carries RTSP request/response signaling. One
//!   connection per session, one request in flight at a time.
//!
//! - **UDP** ([`udp`]): carries RTP media and RTCP control packets. Each
//!   set-up substream gets its own even/odd client port pair and a
//!   receive task.
//!
//! Future: interleaved TCP transport (RFC 2326 §10.12) would multiplex
//! RTP data onto the RTSP TCP connection using `$` framing.

pub mod tcp;
pub mod udp;

pub use tcp::RtspConnection;
pub use udp::{PortPair, RtpSource, SourceOptions};
