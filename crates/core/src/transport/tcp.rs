use std::net::SocketAddr;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::error::{Result, RtspError};
use crate::error::ParseErrorKind;
use crate::protocol::{RtspRequest, RtspResponse};

/// Largest response head (status line and headers) accepted from a server.
pub const MAX_HEAD_SIZE: usize = 16 * 1024;
/// Largest response body accepted; an SDP description is far smaller.
pub const MAX_BODY_SIZE: usize = 1024 * 1024;

/// One RTSP control connection to a server.
///
/// Requests are sent strictly one at a time: [`request`](Self::request)
/// writes the request and reads until the response with the matching
/// `CSeq` has arrived. The connection numbers requests, attaches the
/// `User-Agent`, and echoes the `Session` header once the server has
/// assigned one (RFC 2326 §12.37).
pub struct RtspConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    peer_addr: SocketAddr,
    user_agent: String,
    cseq: u32,
    session: Option<String>,
}

impl RtspConnection {
    pub async fn connect(host: &str, port: u16, user_agent: &str) -> Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        let peer_addr = stream.peer_addr()?;

        tracing::debug!(%peer_addr, "RTSP connection established");

        let (read_half, write_half) = stream.into_split();
        Ok(RtspConnection {
            reader: BufReader::new(read_half),
            writer: write_half,
            peer_addr,
            user_agent: user_agent.to_string(),
            cseq: 0,
            session: None,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Session ID assigned by the server's first SETUP response.
    pub fn session_id(&self) -> Option<&str> {
        self.session.as_deref()
    }

    /// Send a request and wait for its response, body included.
    ///
    /// Non-2xx responses are returned as [`RtspError::Status`].
    pub async fn request(&mut self, request: RtspRequest) -> Result<RtspResponse> {
        let method = request.method.clone();
        let cseq = self.send(request).await?;

        loop {
            let response = self.read_response().await?;
            match response.cseq() {
                Some(c) if c != cseq => {
                    tracing::debug!(expected = cseq, received = c, "skipping stale response");
                    continue;
                }
                _ => {}
            }

            tracing::debug!(
                peer = %self.peer_addr,
                method = %method,
                status = response.status_code,
                "response"
            );

            if let Some((id, timeout)) = response.session() {
                if self.session.as_deref() != Some(id.as_str()) {
                    tracing::debug!(session = %id, timeout, "server assigned session");
                    self.session = Some(id);
                }
            }

            if !response.is_success() {
                return Err(RtspError::Status {
                    method,
                    code: response.status_code,
                    reason: response.reason,
                });
            }
            return Ok(response);
        }
    }

    /// Write a request without waiting for the response. Returns its `CSeq`.
    pub async fn send(&mut self, mut request: RtspRequest) -> Result<u32> {
        self.cseq += 1;
        let cseq = self.cseq;

        request = request
            .add_header("CSeq", &cseq.to_string())
            .add_header("User-Agent", &self.user_agent);
        if let Some(session) = &self.session {
            request = request.add_header("Session", session);
        }

        tracing::debug!(
            peer = %self.peer_addr,
            method = %request.method,
            uri = %request.uri,
            cseq,
            "request"
        );

        self.writer
            .write_all(request.serialize().as_bytes())
            .await?;
        self.writer.flush().await?;
        Ok(cseq)
    }

    async fn read_response(&mut self) -> Result<RtspResponse> {
        let mut head = String::new();
        let mut consumed = 0;
        loop {
            if consumed >= MAX_HEAD_SIZE {
                return Err(RtspError::Parse {
                    kind: ParseErrorKind::HeadTooLarge,
                });
            }
            let mut line = String::new();
            let limit = (MAX_HEAD_SIZE - consumed) as u64;
            let n = (&mut self.reader).take(limit).read_line(&mut line).await?;
            if n == 0 {
                return Err(RtspError::ConnectionClosed);
            }
            consumed += n;
            if !line.ends_with('\n') && consumed < MAX_HEAD_SIZE {
                return Err(RtspError::ConnectionClosed);
            }
            // Leading blank lines between messages are tolerated.
            if line.trim().is_empty() {
                if head.is_empty() {
                    continue;
                }
                break;
            }
            head.push_str(&line);
        }

        let mut response = RtspResponse::parse(&head)?;
        let length = response.content_length()?;
        if length > MAX_BODY_SIZE {
            tracing::warn!(peer = %self.peer_addr, length, "response body too large");
            return Err(RtspError::Parse {
                kind: ParseErrorKind::InvalidContentLength,
            });
        }
        if length > 0 {
            let mut body = vec![0u8; length];
            self.reader.read_exact(&mut body).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    RtspError::ConnectionClosed
                } else {
                    RtspError::Io(e)
                }
            })?;
            response.body = String::from_utf8_lossy(&body).into_owned();
        }
        Ok(response)
    }
}
