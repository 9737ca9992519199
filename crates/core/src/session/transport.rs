use std::net::IpAddr;

/// Client-side RTP/RTCP port pair bound during substream activation.
///
/// Per RFC 3550 §11 the RTP port is even and RTCP uses RTP + 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientPorts {
    pub rtp: u16,
    pub rtcp: u16,
}

impl ClientPorts {
    /// The `Transport` header value offered in SETUP (RFC 2326 §12.39).
    ///
    /// ```
    /// use rtsp_client::session::transport::ClientPorts;
    ///
    /// let ports = ClientPorts { rtp: 50000, rtcp: 50001 };
    /// assert_eq!(ports.transport_header(), "RTP/AVP;unicast;client_port=50000-50001");
    /// ```
    pub fn transport_header(&self) -> String {
        format!("RTP/AVP;unicast;client_port={}-{}", self.rtp, self.rtcp)
    }
}

/// Transport parameters the server committed to in its SETUP response.
///
/// ## Wire format example
///
/// ```text
/// Client → Server:
///   Transport: RTP/AVP;unicast;client_port=50000-50001
///
/// Server → Client:
///   Transport: RTP/AVP;unicast;client_port=50000-50001;server_port=5000-5001;ssrc=1A2B3C4D
/// ```
///
/// The client sends RTCP receiver reports to `server_addr:server_rtcp_port`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerTransport {
    /// Server's RTP send port, if advertised.
    pub server_rtp_port: Option<u16>,
    /// Server's RTCP port, if advertised.
    pub server_rtcp_port: Option<u16>,
    /// RTP synchronization source the server will use, if advertised.
    pub ssrc: Option<u32>,
    /// Sending address: the `source=` parameter, else the RTSP peer address.
    pub server_addr: Option<IpAddr>,
}

impl ServerTransport {
    /// Parse the `Transport` header value of a SETUP response (RFC 2326 §12.39).
    ///
    /// Looks for `server_port=RTP[-RTCP]`, `ssrc=HEX` and `source=ADDR`
    /// among semicolon-separated parameters. Unknown parameters are ignored.
    ///
    /// ## Examples
    ///
    /// ```
    /// use rtsp_client::session::transport::ServerTransport;
    ///
    /// let t = ServerTransport::parse("RTP/AVP;unicast;client_port=8000-8001;server_port=5000-5001");
    /// assert_eq!(t.server_rtp_port, Some(5000));
    /// assert_eq!(t.server_rtcp_port, Some(5001));
    /// ```
    pub fn parse(header: &str) -> Self {
        let mut transport = ServerTransport::default();

        // A server may list several transports; the first one is the one it chose.
        let chosen = header.split(',').next().unwrap_or(header);

        for part in chosen.split(';') {
            let part = part.trim();
            if let Some(ports) = part.strip_prefix("server_port=") {
                let mut port_parts = ports.split('-');
                transport.server_rtp_port = port_parts.next().and_then(|p| p.trim().parse().ok());
                transport.server_rtcp_port = match port_parts.next() {
                    Some(p) => p.trim().parse().ok(),
                    None => transport.server_rtp_port.map(|p| p.wrapping_add(1)),
                };
            } else if let Some(ssrc) = part.strip_prefix("ssrc=") {
                transport.ssrc = u32::from_str_radix(ssrc.trim(), 16).ok();
            } else if let Some(source) = part.strip_prefix("source=") {
                transport.server_addr = source.trim().parse().ok();
            }
        }
        transport
    }
}
