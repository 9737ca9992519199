/// A parsed RTP packet (RFC 3550 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |            CSRC list (CC × 32 bits), extension, payload       |
/// ```
///
/// Borrowing parse: the payload is a slice into the datagram, with CSRCs,
/// header extension and padding already stripped.
#[derive(Debug, PartialEq, Eq)]
pub struct RtpPacket<'a> {
    pub marker: bool,
    pub payload_type: u8,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub payload: &'a [u8],
}

const FIXED_HEADER_LEN: usize = 12;

impl<'a> RtpPacket<'a> {
    /// Parse a datagram. Returns `None` for anything that is not a
    /// well-formed version 2 RTP packet.
    pub fn parse(data: &'a [u8]) -> Option<Self> {
        if data.len() < FIXED_HEADER_LEN || data[0] >> 6 != 2 {
            return None;
        }

        let padding = data[0] & 0x20 != 0;
        let extension = data[0] & 0x10 != 0;
        let csrc_count = (data[0] & 0x0f) as usize;
        let marker = data[1] & 0x80 != 0;
        let payload_type = data[1] & 0x7f;
        let sequence = u16::from_be_bytes([data[2], data[3]]);
        let timestamp = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let ssrc = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);

        let mut offset = FIXED_HEADER_LEN + csrc_count * 4;
        if extension {
            // 16-bit profile id, 16-bit length in 32-bit words (RFC 3550 §5.3.1).
            let ext = data.get(offset..offset + 4)?;
            let words = u16::from_be_bytes([ext[2], ext[3]]) as usize;
            offset += 4 + words * 4;
        }

        let mut end = data.len();
        if padding {
            let pad = *data.last()? as usize;
            end = end.checked_sub(pad)?;
        }

        let payload = data.get(offset..end)?;

        Some(RtpPacket {
            marker,
            payload_type,
            sequence,
            timestamp,
            ssrc,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(first: u8, second: u8) -> Vec<u8> {
        let mut h = vec![first, second];
        h.extend_from_slice(&0x1234u16.to_be_bytes());
        h.extend_from_slice(&90000u32.to_be_bytes());
        h.extend_from_slice(&0xAABBCCDDu32.to_be_bytes());
        h
    }

    #[test]
    fn parses_fixed_header() {
        let mut data = header(0x80, 0x80 | 96);
        data.extend_from_slice(&[0x65, 0xAA]);
        let p = RtpPacket::parse(&data).unwrap();
        assert!(p.marker);
        assert_eq!(p.payload_type, 96);
        assert_eq!(p.sequence, 0x1234);
        assert_eq!(p.timestamp, 90000);
        assert_eq!(p.ssrc, 0xAABBCCDD);
        assert_eq!(p.payload, &[0x65, 0xAA]);
    }

    #[test]
    fn skips_csrc_and_extension() {
        // CC=1, X=1
        let mut data = header(0x80 | 0x10 | 0x01, 96);
        data.extend_from_slice(&[0, 0, 0, 9]); // CSRC
        data.extend_from_slice(&[0xBE, 0xDE, 0x00, 0x01]); // ext header, 1 word
        data.extend_from_slice(&[1, 2, 3, 4]); // ext body
        data.extend_from_slice(&[0x41, 0x42]);
        let p = RtpPacket::parse(&data).unwrap();
        assert_eq!(p.payload, &[0x41, 0x42]);
    }

    #[test]
    fn strips_padding() {
        let mut data = header(0x80 | 0x20, 96);
        data.extend_from_slice(&[0x41, 0x42, 0, 0, 3]);
        let p = RtpPacket::parse(&data).unwrap();
        assert_eq!(p.payload, &[0x41, 0x42]);
    }

    #[test]
    fn rejects_short_or_wrong_version() {
        assert!(RtpPacket::parse(&[0x80, 96, 0, 1]).is_none());
        let data = header(0x40, 96);
        assert!(RtpPacket::parse(&data).is_none());
    }
}
