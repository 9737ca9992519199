use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use rand::RngExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::url::RtspUrl;
use super::{Protocol, RtspRequest, RtspResponse};
use crate::error::{Result, RtspError};
use crate::media::FrameSource;
use crate::registry::ClientConfig;
use crate::session::{
    ClientPorts, DescribeResponse, PlayRange, ServerTransport, SessionEvent, SessionEvents,
    Substream,
};
use crate::transport::{PortPair, RtpSource, RtspConnection, SourceOptions};

/// Requests queued for the connection task, processed in order.
#[derive(Debug)]
enum Command {
    Describe,
    Setup {
        index: usize,
        url: String,
        transport: String,
    },
    Play {
        url: String,
        range: String,
    },
    Teardown {
        url: String,
    },
}

/// RTSP/UDP implementation of [`Protocol`].
///
/// Requests are queued to a background task that owns the TCP connection
/// (opened on the first request) and posts each answer as a
/// [`SessionEvent`]. Client port pairs are bound on activation and turned
/// into an [`RtpSource`] when the sink asks for its bound source.
pub struct RtspClient {
    url: RtspUrl,
    config: Arc<ClientConfig>,
    events: SessionEvents,
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
    port_pairs: HashMap<usize, PortPair>,
}

impl RtspClient {
    /// Create a client for `url`. Must be called within a tokio runtime.
    ///
    /// Fails only when the URL is unusable; connection problems surface
    /// later as failed request completions.
    pub fn new(url: &str, events: SessionEvents, config: Arc<ClientConfig>) -> Result<Self> {
        let url = RtspUrl::parse(url)?;
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_connection(
            url.clone(),
            config.user_agent.clone(),
            commands_rx,
            events.clone(),
        ));

        Ok(RtspClient {
            url,
            config,
            events,
            commands,
            task,
            port_pairs: HashMap::new(),
        })
    }

    fn queue(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::warn!(url = %self.url.url, "RTSP connection task has exited");
        }
    }
}

/// Profiles this client can receive: plain RTP over UDP.
fn is_udp_profile(protocol: &str) -> bool {
    protocol.eq_ignore_ascii_case("RTP/AVP") || protocol.eq_ignore_ascii_case("RTP/AVP/UDP")
}

impl Protocol for RtspClient {
    fn url(&self) -> &str {
        &self.url.url
    }

    fn send_describe(&mut self) {
        self.queue(Command::Describe);
    }

    fn activate(&mut self, substream: &mut Substream) -> Result<ClientPorts> {
        if !is_udp_profile(&substream.protocol) {
            return Err(RtspError::UnsupportedTransport(substream.protocol.clone()));
        }
        let pair = PortPair::bind()?;
        let ports = pair.ports();
        self.port_pairs.insert(substream.index, pair);
        Ok(ports)
    }

    fn send_setup(&mut self, substream: &Substream) {
        let Some(ports) = self.port_pairs.get(&substream.index).map(PortPair::ports) else {
            self.events.send(SessionEvent::SetupComplete {
                index: substream.index,
                result: Err(RtspError::SourceUnavailable(substream.index)),
            });
            return;
        };
        self.queue(Command::Setup {
            index: substream.index,
            url: substream.control_url.clone(),
            transport: ports.transport_header(),
        });
    }

    fn send_play(&mut self, url: &str, range: &PlayRange) {
        self.queue(Command::Play {
            url: url.to_string(),
            range: range.header_value(),
        });
    }

    fn send_teardown(&mut self, url: &str) {
        self.queue(Command::Teardown {
            url: url.to_string(),
        });
    }

    fn bound_source(&mut self, substream: &Substream) -> Result<Box<dyn FrameSource>> {
        let pair = self
            .port_pairs
            .remove(&substream.index)
            .ok_or(RtspError::SourceUnavailable(substream.index))?;

        let report_to = substream
            .server_transport
            .as_ref()
            .and_then(|t| Some(SocketAddr::new(t.server_addr?, t.server_rtcp_port?)));

        let options = SourceOptions {
            index: substream.index,
            codec: substream.codec.clone(),
            clock_rate: substream.clock_rate,
            report_to,
            report_interval: self.config.rtcp_report_interval,
            ssrc: rand::rng().random::<u32>(),
            cname: self.config.user_agent.clone(),
            max_pending: self.config.max_pending_frames,
        };
        Ok(Box::new(RtpSource::spawn(pair, options, self.events.clone())?))
    }

    fn into_background(self: Box<Self>) -> Option<JoinHandle<()>> {
        let RtspClient { task, .. } = *self;
        Some(task)
    }
}

/// URL that relative `a=control` attributes resolve against
/// (RFC 2326 §C.1.1).
fn base_url(response: &RtspResponse, request_url: &str) -> String {
    response
        .get_header("Content-Base")
        .or_else(|| response.get_header("Content-Location"))
        .unwrap_or(request_url)
        .to_string()
}

async fn run_connection(
    url: RtspUrl,
    user_agent: String,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: SessionEvents,
) {
    let mut connection: Option<RtspConnection> = None;

    while let Some(command) = commands.recv().await {
        if connection.is_none() {
            if matches!(command, Command::Teardown { .. }) {
                break;
            }
            match RtspConnection::connect(&url.host, url.port, &user_agent).await {
                Ok(c) => connection = Some(c),
                Err(e) => {
                    tracing::error!(url = %url.url, error = %e, "failed to connect to server");
                    if let Some(event) = failed(command, e) {
                        events.send(event);
                    }
                    continue;
                }
            }
        }
        let Some(conn) = connection.as_mut() else {
            continue;
        };

        let event = match command {
            Command::Describe => {
                let result = conn
                    .request(RtspRequest::describe(&url.url))
                    .await
                    .map(|response| DescribeResponse {
                        base_url: base_url(&response, &url.url),
                        sdp: response.body,
                    });
                SessionEvent::DescribeComplete(result)
            }
            Command::Setup {
                index,
                url: control_url,
                transport,
            } => {
                let peer = conn.peer_addr().ip();
                let result = conn
                    .request(RtspRequest::setup(&control_url, &transport))
                    .await
                    .map(|response| {
                        let mut transport = response
                            .get_header("Transport")
                            .map(ServerTransport::parse)
                            .unwrap_or_default();
                        transport.server_addr.get_or_insert(peer);
                        transport
                    });
                if result.is_ok() {
                    tracing::debug!(
                        url = %control_url,
                        session = conn.session_id().unwrap_or("-"),
                        "SETUP accepted"
                    );
                }
                SessionEvent::SetupComplete { index, result }
            }
            Command::Play {
                url: control_url,
                range,
            } => {
                let result = conn
                    .request(RtspRequest::play(&control_url, &range))
                    .await
                    .map(|_| ());
                SessionEvent::PlayComplete(result)
            }
            Command::Teardown { url: control_url } => {
                if let Err(e) = conn.send(RtspRequest::teardown(&control_url)).await {
                    tracing::debug!(url = %url.url, error = %e, "failed to send TEARDOWN");
                }
                break;
            }
        };

        let lost = matches!(
            &event,
            SessionEvent::DescribeComplete(Err(e))
                | SessionEvent::PlayComplete(Err(e))
                | SessionEvent::SetupComplete { result: Err(e), .. }
                if matches!(e, RtspError::Io(_) | RtspError::ConnectionClosed)
        );
        if lost {
            connection = None;
        }

        if !events.send(event) {
            break;
        }
    }

    tracing::debug!(url = %url.url, "RTSP connection task finished");
}

/// Completion event for a command that could not be sent at all.
fn failed(command: Command, error: RtspError) -> Option<SessionEvent> {
    match command {
        Command::Describe => Some(SessionEvent::DescribeComplete(Err(error))),
        Command::Setup { index, .. } => Some(SessionEvent::SetupComplete {
            index,
            result: Err(error),
        }),
        Command::Play { .. } => Some(SessionEvent::PlayComplete(Err(error))),
        Command::Teardown { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::sdp::parse_sdp;
    use crate::session::Session;

    fn client() -> (
        RtspClient,
        mpsc::UnboundedReceiver<(crate::session::SessionId, SessionEvent)>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = RtspClient::new(
            "rtsp://127.0.0.1:1/stream",
            SessionEvents::new(1, tx),
            Arc::new(ClientConfig::default()),
        )
        .unwrap();
        (client, rx)
    }

    #[test]
    fn base_url_prefers_content_base() {
        let response = RtspResponse::parse(
            "RTSP/1.0 200 OK\r\nContent-Location: rtsp://h/loc/\r\nContent-Base: rtsp://h/base/\r\n\r\n",
        )
        .unwrap();
        assert_eq!(base_url(&response, "rtsp://h/req"), "rtsp://h/base/");

        let response = RtspResponse::parse("RTSP/1.0 200 OK\r\nCSeq: 2\r\n\r\n").unwrap();
        assert_eq!(base_url(&response, "rtsp://h/req"), "rtsp://h/req");
    }

    #[test]
    fn rejects_non_rtsp_urls() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = RtspClient::new(
            "http://example.com/",
            SessionEvents::new(1, tx),
            Arc::new(ClientConfig::default()),
        );
        assert!(matches!(result, Err(RtspError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn activation_rejects_unsupported_profiles() {
        let (mut client, _rx) = client();
        let sdp = parse_sdp(
            "v=0\r\nm=video 0 RTP/SAVP 96\r\na=rtpmap:96 H264/90000\r\n\
             m=video 0 RTP/AVP 96\r\na=rtpmap:96 H264/90000\r\n",
        )
        .unwrap();
        let mut session = Session::from_description(&sdp, "rtsp://127.0.0.1:1/stream");

        let err = client.activate(&mut session.substreams[0]).unwrap_err();
        assert!(matches!(err, RtspError::UnsupportedTransport(p) if p == "RTP/SAVP"));

        let ports = client.activate(&mut session.substreams[1]).unwrap();
        assert_eq!(ports.rtp % 2, 0);
    }

    #[tokio::test]
    async fn unreachable_server_fails_describe() {
        let (mut client, mut rx) = client();
        client.send_describe();
        let (session, event) = rx.recv().await.unwrap();
        assert_eq!(session, 1);
        assert!(matches!(event, SessionEvent::DescribeComplete(Err(_))));
    }
}
