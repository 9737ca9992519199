use bytes::Bytes;

/// H.264 RTP depacketizer (RFC 6184).
///
/// Converts RTP payloads back into NAL units (without start codes). Each
/// NAL unit becomes one delivered frame; the reassembler adds the start
/// code. Three payload structures are handled:
///
/// - **Single NAL Unit** (§5.6): types 1–23, the payload is the NAL.
///
/// - **STAP-A** (§5.7.1): type 24, several NALs each preceded by a
///   16-bit size:
///
///   ```text
///   STAP-A NAL HDR (1 byte) | NALU 1 size (2) | NALU 1 | NALU 2 size (2) | NALU 2 ...
///   ```
///
/// - **FU-A** (§5.8): type 28, one NAL split across packets:
///
///   ```text
///   FU indicator:  [F|NRI|Type=28]     (1 byte)
///   FU header:     [S|E|R|NAL_Type]    (1 byte)
///   Fragment data: [...]
///   ```
///
///   The original NAL header is rebuilt as `F|NRI` from the indicator and
///   `NAL_Type` from the FU header. A sequence gap inside a fragmented NAL
///   discards it: a decoder is better served by a missing NAL than a
///   corrupt one.
///
/// STAP-B, MTAP and FU-B (interleaved mode) are not supported and are
/// dropped with a warning.
#[derive(Debug, Default)]
pub struct H264Depacketizer {
    fragment: Option<Vec<u8>>,
    last_sequence: Option<u16>,
}

impl H264Depacketizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one RTP payload; returns the NAL units it completes, in order.
    pub fn push(&mut self, sequence: u16, payload: &[u8]) -> Vec<Bytes> {
        let in_order = match self.last_sequence {
            Some(last) => sequence == last.wrapping_add(1),
            None => true,
        };
        self.last_sequence = Some(sequence);

        if !in_order && self.fragment.take().is_some() {
            tracing::debug!(sequence, "sequence gap inside FU-A, dropping partial NAL");
        }

        let Some(&nal_header) = payload.first() else {
            return Vec::new();
        };

        match nal_header & 0x1f {
            1..=23 => {
                if self.fragment.take().is_some() {
                    tracing::debug!("FU-A interrupted by single NAL, dropping partial NAL");
                }
                vec![Bytes::copy_from_slice(payload)]
            }
            24 => self.unpack_stap_a(&payload[1..]),
            28 => self.unpack_fu_a(payload).into_iter().collect(),
            other => {
                tracing::warn!(nal_type = other, "unsupported H.264 RTP payload structure");
                Vec::new()
            }
        }
    }

    fn unpack_stap_a(&mut self, mut data: &[u8]) -> Vec<Bytes> {
        let mut nal_units = Vec::new();
        while data.len() >= 2 {
            let size = u16::from_be_bytes([data[0], data[1]]) as usize;
            let Some(nal) = data.get(2..2 + size) else {
                tracing::warn!(size, remaining = data.len() - 2, "truncated STAP-A unit");
                break;
            };
            if !nal.is_empty() {
                nal_units.push(Bytes::copy_from_slice(nal));
            }
            data = &data[2 + size..];
        }
        nal_units
    }

    fn unpack_fu_a(&mut self, payload: &[u8]) -> Option<Bytes> {
        if payload.len() < 2 {
            tracing::warn!(len = payload.len(), "FU-A payload too short");
            return None;
        }

        let fu_indicator = payload[0];
        let fu_header = payload[1];
        let start = fu_header & 0x80 != 0;
        let end = fu_header & 0x40 != 0;
        let fragment = &payload[2..];

        if start {
            if self.fragment.is_some() {
                tracing::debug!("FU-A start without end of previous NAL, dropping it");
            }
            let mut nal = Vec::with_capacity(1 + fragment.len() * 4);
            nal.push((fu_indicator & 0xe0) | (fu_header & 0x1f));
            nal.extend_from_slice(fragment);
            self.fragment = Some(nal);
        } else if let Some(nal) = self.fragment.as_mut() {
            nal.extend_from_slice(fragment);
        } else {
            tracing::trace!("FU-A continuation without start, skipping");
            return None;
        }

        if end {
            return self.fragment.take().map(Bytes::from);
        }
        None
    }

    /// Extract NAL units from an H.264 Annex B bitstream.
    ///
    /// Scans for start codes (both 4-byte `00 00 00 01` and 3-byte
    /// `00 00 01`) and returns the NAL data between them, excluding
    /// the start codes themselves.
    ///
    /// The start code length is tracked per-NAL to ensure boundaries
    /// between adjacent NALs are computed correctly when mixed 3-byte
    /// and 4-byte start codes appear.
    pub fn extract_nal_units(data: &[u8]) -> Vec<&[u8]> {
        let mut nal_units = Vec::new();
        let mut i = 0usize;

        // (nal_data_start_index, start_code_length)
        let mut start_entries: Vec<(usize, usize)> = Vec::new();

        while i < data.len() {
            if i + 3 < data.len() && data[i..i + 4] == [0, 0, 0, 1] {
                start_entries.push((i + 4, 4));
                i += 4;
            } else if i + 2 < data.len() && data[i..i + 3] == [0, 0, 1] {
                start_entries.push((i + 3, 3));
                i += 3;
            } else {
                i += 1;
            }
        }

        for (idx, &(start, _)) in start_entries.iter().enumerate() {
            let end = if idx + 1 < start_entries.len() {
                let (next_start, next_sc_len) = start_entries[idx + 1];
                next_start - next_sc_len
            } else {
                data.len()
            };

            if start < end {
                nal_units.push(&data[start..end]);
            }
        }

        nal_units
    }
}

/// Human-readable name of an H.264 NAL unit type (ITU-T H.264 Table 7-1).
pub fn nal_type_name(nal_type: u8) -> &'static str {
    match nal_type {
        1 => "non-IDR slice",
        5 => "IDR slice",
        6 => "SEI",
        7 => "SPS",
        8 => "PPS",
        9 => "access unit delimiter",
        _ => "other",
    }
}
