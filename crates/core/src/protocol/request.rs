/// An outgoing RTSP request (RFC 2326 §6).
///
/// Serializes to the standard text format:
///
/// ```text
/// SETUP rtsp://server/stream/track1 RTSP/1.0\r\n
/// CSeq: 3\r\n
/// User-Agent: rtsp-client-rs/0.1\r\n
/// Transport: RTP/AVP;unicast;client_port=50000-50001\r\n
/// \r\n
/// ```
///
/// Uses a builder pattern: chain [`add_header`](Self::add_header), then call
/// [`serialize`](Self::serialize). `CSeq` is added by the connection when
/// the request is sent, so that numbering stays in one place.
#[must_use]
#[derive(Debug, Clone)]
pub struct RtspRequest {
    pub method: String,
    pub uri: String,
    pub headers: Vec<(String, String)>,
}

/// Client identification string included in every RTSP request
/// per RFC 2326 §12.41.
pub const USER_AGENT: &str = "rtsp-client-rs/0.1";

impl RtspRequest {
    pub fn new(method: &str, uri: &str) -> Self {
        RtspRequest {
            method: method.to_string(),
            uri: uri.to_string(),
            headers: Vec::new(),
        }
    }

    /// DESCRIBE: retrieve the SDP presentation description (RFC 2326 §10.2).
    pub fn describe(uri: &str) -> Self {
        Self::new("DESCRIBE", uri).add_header("Accept", "application/sdp")
    }

    /// SETUP: negotiate the transport for one substream (RFC 2326 §10.4).
    pub fn setup(uri: &str, transport: &str) -> Self {
        Self::new("SETUP", uri).add_header("Transport", transport)
    }

    /// PLAY: start delivery over the given range (RFC 2326 §10.5).
    pub fn play(uri: &str, range: &str) -> Self {
        Self::new("PLAY", uri).add_header("Range", range)
    }

    /// TEARDOWN: end the session (RFC 2326 §10.7).
    pub fn teardown(uri: &str) -> Self {
        Self::new("TEARDOWN", uri)
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Serialize to the RTSP text wire format. Requests sent by this client
    /// never carry a body.
    pub fn serialize(&self) -> String {
        let mut request = format!("{} {} RTSP/1.0\r\n", self.method, self.uri);

        for (name, value) in &self.headers {
            request.push_str(&format!("{}: {}\r\n", name, value));
        }

        request.push_str("\r\n");
        request
    }
}
