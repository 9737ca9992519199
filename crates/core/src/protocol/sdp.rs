//! SDP (Session Description Protocol) parsing (RFC 4566 / RFC 8866).
//!
//! Consumes the SDP body returned by a DESCRIBE response. A typical body:
//!
//! ```text
//! v=0                                          ← protocol version
//! o=- 0 0 IN IP4 192.168.1.10                  ← origin
//! s=Stream                                      ← session name
//! t=0 0                                         ← timing (live stream)
//! a=control:*                                   ← aggregate control URL
//! a=range:npt=0-10                              ← play range (RFC 2326 §C.1.5)
//! m=video 0 RTP/AVP 96                          ← media description
//! a=rtpmap:96 H264/90000                        ← codec/clock rate
//! a=fmtp:96 packetization-mode=1;sprop-parameter-sets=Z0IAHpWoKA9k,aM48gA==
//! a=control:track1                              ← substream control URL
//! ```
//!
//! Only the fields the client acts on are kept; everything else is skipped.

use crate::error::{Result, RtspError};

/// A parsed session description.
#[derive(Debug, Clone, Default)]
pub struct SessionDescription {
    /// Session name (`s=`).
    pub name: Option<String>,
    /// Session-level `a=control`, if any.
    pub control: Option<String>,
    /// Session-level `a=range`, if any.
    pub range: Option<Range>,
    /// Media descriptions (`m=` sections) in declaration order.
    pub media: Vec<MediaDescription>,
}

/// One `m=` section of a session description.
#[derive(Debug, Clone, Default)]
pub struct MediaDescription {
    /// Media type (`video`, `audio`, `application`, ...).
    pub medium: String,
    /// Transport profile from the `m=` line (e.g. `RTP/AVP`).
    pub protocol: String,
    /// First payload type listed on the `m=` line.
    pub payload_type: u8,
    /// Encoding name from `a=rtpmap` (or the static payload table).
    pub encoding_name: String,
    /// RTP clock rate in Hz.
    pub clock_rate: u32,
    /// Media-level `a=control`, if any.
    pub control: Option<String>,
    /// Raw `a=fmtp` parameters for the first payload type.
    pub fmtp: Option<String>,
    /// Media-level `a=range`, if any.
    pub range: Option<Range>,
}

/// Play range from an `a=range` attribute (RFC 2326 §3.6, §3.7).
#[derive(Debug, Clone, PartialEq)]
pub enum Range {
    /// Normal play time, seconds relative to the start of the presentation.
    Npt { start: f64, end: Option<f64> },
    /// Absolute UTC time (`clock=19961108T142300Z-19961108T143520Z`).
    Clock { start: String, end: Option<String> },
}

impl MediaDescription {
    /// Look up an `a=fmtp` parameter by name (case-insensitive).
    ///
    /// `a=fmtp:96 packetization-mode=1;sprop-parameter-sets=...` ->
    /// `fmtp_param("sprop-parameter-sets")`.
    pub fn fmtp_param(&self, name: &str) -> Option<&str> {
        self.fmtp.as_deref()?.split(';').find_map(|p| {
            let (key, value) = p.trim().split_once('=')?;
            key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
        })
    }
}

/// Parse an SDP body into a [`SessionDescription`].
///
/// Returns [`RtspError::Sdp`] when the body is not SDP at all (missing
/// `v=` line) or an `m=` line is malformed. A body without any `m=` lines
/// parses successfully with an empty `media` list.
pub fn parse_sdp(body: &str) -> Result<SessionDescription> {
    let mut description = SessionDescription::default();
    let mut saw_version = false;

    for line in body.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }

        let Some((kind, value)) = line.split_once('=') else {
            tracing::trace!(line, "skipping SDP line without '='");
            continue;
        };

        match kind {
            "v" => saw_version = true,
            "s" if description.media.is_empty() => description.name = Some(value.to_string()),
            "m" => description.media.push(parse_media_line(value)?),
            "a" => {
                let (attr, attr_value) = value.split_once(':').unwrap_or((value, ""));
                match description.media.last_mut() {
                    Some(media) => apply_media_attribute(media, attr, attr_value),
                    None => match attr {
                        "control" => description.control = Some(attr_value.trim().to_string()),
                        "range" => description.range = parse_range(attr_value),
                        _ => {}
                    },
                }
            }
            _ => {}
        }
    }

    if !saw_version {
        return Err(RtspError::Sdp("missing v= line".to_string()));
    }

    tracing::debug!(
        name = description.name.as_deref().unwrap_or(""),
        media = description.media.len(),
        "parsed SDP"
    );

    Ok(description)
}

/// `m=<media> <port> <proto> <fmt> ...`
fn parse_media_line(value: &str) -> Result<MediaDescription> {
    let parts: Vec<&str> = value.split_whitespace().collect();
    if parts.len() < 4 {
        return Err(RtspError::Sdp(format!("malformed m= line: {}", value)));
    }

    let payload_type: u8 = parts[3]
        .parse()
        .map_err(|_| RtspError::Sdp(format!("bad payload type in m= line: {}", value)))?;

    let (encoding_name, clock_rate) = static_payload_type(payload_type).unwrap_or(("", 0));

    Ok(MediaDescription {
        medium: parts[0].to_string(),
        protocol: parts[2].to_string(),
        payload_type,
        encoding_name: encoding_name.to_string(),
        clock_rate,
        ..Default::default()
    })
}

fn apply_media_attribute(media: &mut MediaDescription, attr: &str, value: &str) {
    match attr {
        "control" => media.control = Some(value.trim().to_string()),
        "range" => media.range = parse_range(value),
        "rtpmap" => {
            // rtpmap:<pt> <encoding>/<clock>[/<channels>]
            let Some((pt, encoding)) = value.trim().split_once(' ') else {
                return;
            };
            if pt.parse::<u8>().ok() != Some(media.payload_type) {
                return;
            }
            let mut fields = encoding.trim().split('/');
            if let Some(name) = fields.next() {
                media.encoding_name = name.to_string();
            }
            if let Some(rate) = fields.next().and_then(|r| r.parse().ok()) {
                media.clock_rate = rate;
            }
        }
        "fmtp" => {
            let Some((pt, params)) = value.trim().split_once(' ') else {
                return;
            };
            if pt.parse::<u8>().ok() == Some(media.payload_type) {
                media.fmtp = Some(params.trim().to_string());
            }
        }
        _ => {}
    }
}

/// Encoding name and clock rate for static payload types (RFC 3551 §6).
fn static_payload_type(pt: u8) -> Option<(&'static str, u32)> {
    match pt {
        0 => Some(("PCMU", 8000)),
        8 => Some(("PCMA", 8000)),
        14 => Some(("MPA", 90000)),
        26 => Some(("JPEG", 90000)),
        32 => Some(("MPV", 90000)),
        33 => Some(("MP2T", 90000)),
        _ => None,
    }
}

/// Parse an `a=range` value: `npt=0-10.5`, `npt=now-`, `npt=00:01:00-`,
/// `clock=20200101T000000Z-20200101T000100Z`. SMPTE ranges are ignored.
pub fn parse_range(value: &str) -> Option<Range> {
    let value = value.trim();
    if let Some(npt) = value.strip_prefix("npt=") {
        let (start, end) = npt.split_once('-')?;
        let start = parse_npt_time(start)?;
        let end = match end.trim() {
            "" => None,
            e => Some(parse_npt_time(e)?),
        };
        return Some(Range::Npt { start, end });
    }
    if let Some(clock) = value.strip_prefix("clock=") {
        let (start, end) = clock.split_once('-')?;
        let start = start.trim();
        if start.is_empty() {
            return None;
        }
        let end = match end.trim() {
            "" => None,
            e => Some(e.to_string()),
        };
        return Some(Range::Clock {
            start: start.to_string(),
            end,
        });
    }
    None
}

/// `now`, plain seconds (`12.5`) or `hh:mm:ss[.frac]`. Negative and
/// non-finite values are rejected.
fn parse_npt_time(s: &str) -> Option<f64> {
    let s = s.trim();
    if s == "now" {
        return Some(0.0);
    }
    let seconds = if s.contains(':') {
        let mut total = 0.0;
        for part in s.split(':') {
            total = total * 60.0 + part.parse::<f64>().ok()?;
        }
        total
    } else {
        s.parse().ok()?
    };
    (seconds.is_finite() && seconds >= 0.0).then_some(seconds)
}

/// Resolve a control attribute against the base URL (RFC 2326 §C.1.1).
///
/// Absolute controls are used as-is, `*` or a missing control means the
/// base URL itself, and relative controls are appended to the base.
pub fn resolve_control(base: &str, control: Option<&str>) -> String {
    let control = match control.map(str::trim) {
        None | Some("") | Some("*") => return base.to_string(),
        Some(c) => c,
    };

    let lower = control.to_ascii_lowercase();
    if lower.starts_with("rtsp://") || lower.starts_with("rtsps://") {
        return control.to_string();
    }

    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        control.trim_start_matches('/')
    )
}
