//! Out-of-band codec parameter sets (RFC 6184 §8.1).
//!
//! The SDP `a=fmtp` line of an H.264 substream may carry
//! `sprop-parameter-sets=<base64 SPS>,<base64 PPS>[,...]`. Decoders need
//! these NAL units before the first slice, so the reassembler turns them
//! into an extradata blob: every parameter set preceded by a 4-byte
//! Annex B start code.

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

use crate::error::Result;

/// Annex B start code used to delimit NAL units in the reconstructed stream.
pub const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Servers are inconsistent about `=` padding in sprop records, so accept both.
const SPROP_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode a `sprop-parameter-sets` value into raw parameter blocks, in order.
///
/// Empty records (e.g. from a trailing comma) are skipped. Any record that
/// is not valid base64 fails the whole set.
///
/// ```
/// use rtsp_client::media::sprop::parse_parameter_sets;
///
/// let sets = parse_parameter_sets("Z0IAHg==,aM44gA==").unwrap();
/// assert_eq!(sets, vec![vec![0x67, 0x42, 0x00, 0x1e], vec![0x68, 0xce, 0x38, 0x80]]);
/// ```
pub fn parse_parameter_sets(sprop: &str) -> Result<Vec<Vec<u8>>> {
    let mut blocks = Vec::new();
    for record in sprop.split(',') {
        let record = record.trim();
        if record.is_empty() {
            continue;
        }
        blocks.push(SPROP_ENGINE.decode(record)?);
    }
    Ok(blocks)
}

/// Concatenate parameter blocks, each preceded by [`START_CODE`].
///
/// The result's length is the sum of `4 + block.len()` over all blocks.
pub fn build_extradata(blocks: &[Vec<u8>]) -> Vec<u8> {
    let total: usize = blocks.iter().map(|b| START_CODE.len() + b.len()).sum();
    let mut extradata = Vec::with_capacity(total);
    for block in blocks {
        extradata.extend_from_slice(&START_CODE);
        extradata.extend_from_slice(block);
    }
    extradata
}
