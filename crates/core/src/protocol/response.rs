use crate::error::{ParseErrorKind, RtspError};

/// A parsed RTSP response (RFC 2326 §7).
///
/// RTSP responses follow HTTP/1.1 syntax:
///
/// ```text
/// RTSP-Version SP Status-Code SP Reason-Phrase CRLF
/// *(Header: Value CRLF)
/// CRLF
/// [body]
/// ```
///
/// Header lookup is case-insensitive per RFC 2326 §4.2. The body is read
/// separately by the connection once `Content-Length` is known; see
/// [`content_length`](Self::content_length).
#[derive(Debug)]
pub struct RtspResponse {
    /// Protocol version (expected: `RTSP/1.0`).
    pub version: String,
    /// Three-digit status code (RFC 2326 §7.1.1).
    pub status_code: u16,
    /// Reason phrase following the status code.
    pub reason: String,
    /// Headers as ordered (name, value) pairs. Names are stored as-received;
    /// lookups via [`get_header`](Self::get_header) are case-insensitive.
    pub headers: Vec<(String, String)>,
    /// Message body (e.g. SDP for DESCRIBE). Empty when absent.
    pub body: String,
}

impl RtspResponse {
    /// Parse the status line and headers of an RTSP response.
    ///
    /// Expects the head of a response: status line, headers, and trailing
    /// blank line. Returns [`RtspError::Parse`] on malformed input.
    pub fn parse(raw: &str) -> crate::error::Result<Self> {
        let mut lines = raw.lines();

        let status_line = lines.next().ok_or(RtspError::Parse {
            kind: ParseErrorKind::EmptyResponse,
        })?;

        let mut parts = status_line.splitn(3, ' ');
        let version = parts.next().unwrap_or("");
        let code = parts.next().and_then(|c| c.trim().parse::<u16>().ok());
        let reason = parts.next().unwrap_or("").trim();

        let status_code = match code {
            Some(code) if version.starts_with("RTSP/") => code,
            _ => {
                return Err(RtspError::Parse {
                    kind: ParseErrorKind::InvalidStatusLine,
                });
            }
        };

        if version != "RTSP/1.0" {
            tracing::warn!(version, "server sent non-RTSP/1.0 version");
        }

        let mut headers = Vec::new();

        for line in lines {
            if line.is_empty() {
                break;
            }

            let colon_pos = line.find(':').ok_or(RtspError::Parse {
                kind: ParseErrorKind::InvalidHeader,
            })?;

            let name = line[..colon_pos].trim().to_string();
            let value = line[colon_pos + 1..].trim().to_string();

            headers.push((name, value));
        }

        Ok(RtspResponse {
            version: version.to_string(),
            status_code,
            reason: reason.to_string(),
            headers,
            body: String::new(),
        })
    }

    /// Look up a header value by name (case-insensitive, per RFC 2326 §4.2).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns the CSeq header value, echoed from the request
    /// (RFC 2326 §12.17).
    pub fn cseq(&self) -> Option<u32> {
        self.get_header("CSeq").and_then(|v| v.trim().parse().ok())
    }

    /// Whether the status code is in the 2xx success class.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Number of body bytes following the blank line (RFC 2326 §12.14).
    /// Absent means no body.
    pub fn content_length(&self) -> crate::error::Result<usize> {
        match self.get_header("Content-Length") {
            Some(v) => v.trim().parse().map_err(|_| RtspError::Parse {
                kind: ParseErrorKind::InvalidContentLength,
            }),
            None => Ok(0),
        }
    }

    /// Session identifier and timeout from the `Session` header
    /// (RFC 2326 §12.37).
    ///
    /// Handles the timeout suffix: `"SESSIONID;timeout=60"` -> `("SESSIONID", Some(60))`.
    pub fn session(&self) -> Option<(String, Option<u64>)> {
        let value = self.get_header("Session")?;
        let mut parts = value.split(';');
        let id = parts.next()?.trim();
        if id.is_empty() {
            return None;
        }
        let timeout = parts
            .filter_map(|p| p.trim().strip_prefix("timeout="))
            .find_map(|t| t.trim().parse().ok());
        Some((id.to_string(), timeout))
    }
}
