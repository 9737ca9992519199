use crate::error::{Result, RtspError};

/// Default RTSP port (RFC 2326 §3.2).
pub const DEFAULT_RTSP_PORT: u16 = 554;

/// The parts of an `rtsp://` URL needed to open the control connection.
///
/// The full URL string is kept untouched for request lines; only host and
/// port are split out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtspUrl {
    pub url: String,
    pub host: String,
    pub port: u16,
}

impl RtspUrl {
    /// Parse `rtsp://host[:port][/path]`.
    ///
    /// ```
    /// use rtsp_client::protocol::url::RtspUrl;
    ///
    /// let u = RtspUrl::parse("rtsp://192.168.1.10:8554/live").unwrap();
    /// assert_eq!(u.host, "192.168.1.10");
    /// assert_eq!(u.port, 8554);
    ///
    /// assert!(RtspUrl::parse("http://example.com/").is_err());
    /// ```
    pub fn parse(url: &str) -> Result<Self> {
        let url = url.trim();
        let after_scheme = url
            .strip_prefix("rtsp://")
            .ok_or_else(|| RtspError::InvalidUrl(format!("{url}: only rtsp:// is supported")))?;

        let authority = after_scheme.split('/').next().unwrap_or("");
        if authority.contains('@') {
            return Err(RtspError::InvalidUrl(format!(
                "{url}: credentials in URL are not supported"
            )));
        }

        let (host, port) = split_host_port(authority)
            .ok_or_else(|| RtspError::InvalidUrl(format!("{url}: bad host or port")))?;

        Ok(RtspUrl {
            url: url.to_string(),
            host,
            port,
        })
    }
}

/// `host`, `host:port`, `[v6]`, `[v6]:port`.
fn split_host_port(authority: &str) -> Option<(String, u16)> {
    if authority.is_empty() {
        return None;
    }

    if let Some(rest) = authority.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        let port = match tail.strip_prefix(':') {
            Some(p) => p.parse().ok()?,
            None if tail.is_empty() => DEFAULT_RTSP_PORT,
            None => return None,
        };
        return Some((host.to_string(), port));
    }

    match authority.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => Some((host.to_string(), port.parse().ok()?)),
        Some(_) => None,
        None => Some((authority.to_string(), DEFAULT_RTSP_PORT)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port() {
        let u = RtspUrl::parse("rtsp://camera.local/stream").unwrap();
        assert_eq!(u.host, "camera.local");
        assert_eq!(u.port, 554);
        assert_eq!(u.url, "rtsp://camera.local/stream");
    }

    #[test]
    fn ipv6_host() {
        let u = RtspUrl::parse("rtsp://[::1]:8554/s").unwrap();
        assert_eq!(u.host, "::1");
        assert_eq!(u.port, 8554);
    }

    #[test]
    fn rejects_bad_urls() {
        assert!(RtspUrl::parse("rtsp://").is_err());
        assert!(RtspUrl::parse("rtsp://host:notaport/").is_err());
        assert!(RtspUrl::parse("rtsp://user:pw@host/").is_err());
        assert!(RtspUrl::parse("rtsps://host/").is_err());
    }
}
