//! Minimal RTCP handling (RFC 3550 §6).
//!
//! The client only needs two things from RTCP:
//!
//! - Detect a **BYE** (PT 203) from the server, which is the explicit
//!   end-of-stream notification for a substream.
//! - Send periodic **receiver reports** (PT 201) with an SDES CNAME
//!   (PT 202) so the server knows the receiver is still alive.

const PT_RR: u8 = 201;
const PT_SDES: u8 = 202;
const PT_BYE: u8 = 203;
const SDES_CNAME: u8 = 1;

/// RTCP Goodbye (BYE) packet, RFC 3550 §6.6.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Goodbye {
    /// SSRC/CSRC identifiers leaving the session.
    pub sources: Vec<u32>,
    /// Reason for leaving, if given.
    pub reason: Option<String>,
}

/// Scan a (possibly compound) RTCP datagram for a BYE packet.
///
/// Malformed trailing packets stop the scan; whatever was found before
/// them is still honoured.
pub fn find_bye(mut data: &[u8]) -> Option<Goodbye> {
    while data.len() >= 4 {
        if data[0] >> 6 != 2 {
            return None;
        }
        let count = (data[0] & 0x1f) as usize;
        let packet_type = data[1];
        let len = (u16::from_be_bytes([data[2], data[3]]) as usize + 1) * 4;
        let packet = data.get(..len)?;

        if packet_type == PT_BYE {
            return Some(parse_bye(&packet[4..], count));
        }
        data = &data[len..];
    }
    None
}

fn parse_bye(body: &[u8], source_count: usize) -> Goodbye {
    let sources: Vec<u32> = body
        .chunks_exact(4)
        .take(source_count)
        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    let rest = body.get(sources.len() * 4..).unwrap_or(&[]);
    let reason = rest.split_first().and_then(|(&len, text)| {
        let text = text.get(..len as usize)?;
        (!text.is_empty()).then(|| String::from_utf8_lossy(text).into_owned())
    });

    Goodbye { sources, reason }
}

/// Build a compound packet: an empty receiver report followed by an SDES
/// chunk carrying `cname`.
///
/// No report blocks are included: the client does not track jitter or
/// loss statistics, it only signals liveness.
pub fn receiver_report(ssrc: u32, cname: &str) -> Vec<u8> {
    let mut packet = Vec::with_capacity(8 + 12 + cname.len());

    // RR: V=2, P=0, RC=0, length=1 (two 32-bit words).
    packet.extend_from_slice(&[0x80, PT_RR, 0x00, 0x01]);
    packet.extend_from_slice(&ssrc.to_be_bytes());

    // SDES: one chunk = SSRC, CNAME item, null terminator, pad to 32 bits.
    let cname = &cname.as_bytes()[..cname.len().min(255)];
    let mut chunk = Vec::with_capacity(8 + cname.len());
    chunk.extend_from_slice(&ssrc.to_be_bytes());
    chunk.push(SDES_CNAME);
    chunk.push(cname.len() as u8);
    chunk.extend_from_slice(cname);
    chunk.push(0);
    while chunk.len() % 4 != 0 {
        chunk.push(0);
    }

    let words = (4 + chunk.len()) / 4 - 1;
    packet.extend_from_slice(&[0x81, PT_SDES]);
    packet.extend_from_slice(&(words as u16).to_be_bytes());
    packet.extend_from_slice(&chunk);

    packet
}
