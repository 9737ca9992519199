use std::collections::VecDeque;
use std::net::{SocketAddr, UdpSocket as StdUdpSocket};
use std::time::Duration;

use bytes::Bytes;
use rand::RngExt;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Result, RtspError};
use crate::media::rtcp::{self, Goodbye};
use crate::media::rtp::RtpPacket;
use crate::media::{Depacketizer, Frame, FrameSource};
use crate::session::{ClientPorts, SessionEvent, SessionEvents};

/// First port of the IANA dynamic range; client RTP ports are drawn above it.
const DYNAMIC_PORT_BASE: u16 = 49152;
/// Number of even ports in `DYNAMIC_PORT_BASE..=65534`.
const EVEN_PORT_COUNT: u16 = (u16::MAX - DYNAMIC_PORT_BASE) / 2 + 1;
const BIND_ATTEMPTS: usize = 16;
/// Largest UDP payload accepted from the network.
const MAX_DATAGRAM: usize = 65_536;

/// A bound client RTP/RTCP socket pair (RTP even, RTCP = RTP + 1).
///
/// Binding happens synchronously during substream activation, before any
/// SETUP is sent, so the ports can be offered in the `Transport` header.
/// The sockets are handed to the async runtime once an [`RtpSource`] is
/// started on them.
#[derive(Debug)]
pub struct PortPair {
    rtp: StdUdpSocket,
    rtcp: StdUdpSocket,
    ports: ClientPorts,
}

impl PortPair {
    /// Bind a random even port and its successor on all interfaces.
    pub fn bind() -> Result<Self> {
        let mut rng = rand::rng();
        for _ in 0..BIND_ATTEMPTS {
            let rtp_port = DYNAMIC_PORT_BASE + 2 * (rng.random::<u16>() % EVEN_PORT_COUNT);
            let Ok(rtp) = StdUdpSocket::bind(("0.0.0.0", rtp_port)) else {
                continue;
            };
            let Ok(rtcp) = StdUdpSocket::bind(("0.0.0.0", rtp_port + 1)) else {
                continue;
            };
            tracing::trace!(rtp_port, "bound client port pair");
            return Ok(PortPair {
                rtp,
                rtcp,
                ports: ClientPorts {
                    rtp: rtp_port,
                    rtcp: rtp_port + 1,
                },
            });
        }
        Err(RtspError::PortAllocation)
    }

    pub fn ports(&self) -> ClientPorts {
        self.ports
    }
}

/// Reception parameters for one substream.
#[derive(Debug, Clone)]
pub struct SourceOptions {
    pub index: usize,
    pub codec: String,
    pub clock_rate: u32,
    /// Where receiver reports go; learned from the first incoming RTCP
    /// packet when unknown.
    pub report_to: Option<SocketAddr>,
    pub report_interval: Duration,
    /// SSRC this client reports as.
    pub ssrc: u32,
    pub cname: String,
    /// Frames queued while the sink has not asked for more; the oldest is
    /// dropped beyond this.
    pub max_pending: usize,
}

/// UDP frame source for one substream.
///
/// A background task receives RTP on the even port, depacketizes it into
/// frames and queues them; each [`get_next_frame`](FrameSource::get_next_frame)
/// releases exactly one queued frame as a `FrameReady` event. The task also
/// watches the RTCP port for BYE (posted as `EndOfStream`) and sends
/// periodic receiver reports. Dropping the source stops the task.
pub struct RtpSource {
    requests: mpsc::UnboundedSender<usize>,
    task: JoinHandle<()>,
}

impl RtpSource {
    /// Start receiving on `pair`. Must be called within a tokio runtime.
    pub fn spawn(pair: PortPair, options: SourceOptions, events: SessionEvents) -> Result<Self> {
        pair.rtp.set_nonblocking(true)?;
        pair.rtcp.set_nonblocking(true)?;
        let rtp = UdpSocket::from_std(pair.rtp)?;
        let rtcp = UdpSocket::from_std(pair.rtcp)?;

        let (requests, requests_rx) = mpsc::unbounded_channel();
        let receiver = Receiver {
            depacketizer: Depacketizer::for_codec(&options.codec),
            first_timestamp: None,
            pending: VecDeque::new(),
            wanted: None,
            goodbye: None,
            events,
            options,
        };
        let task = tokio::spawn(receiver.run(rtp, rtcp, requests_rx));

        Ok(RtpSource { requests, task })
    }
}

impl FrameSource for RtpSource {
    fn get_next_frame(&mut self, max_size: usize) {
        let _ = self.requests.send(max_size);
    }
}

impl Drop for RtpSource {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Receiver {
    options: SourceOptions,
    depacketizer: Depacketizer,
    first_timestamp: Option<u32>,
    pending: VecDeque<(Bytes, Duration)>,
    /// Outstanding request's `max_size`.
    wanted: Option<usize>,
    /// Set once a BYE arrived; the stream ends when the queue is drained.
    goodbye: Option<Goodbye>,
    events: SessionEvents,
}

impl Receiver {
    async fn run(
        mut self,
        rtp: UdpSocket,
        rtcp: UdpSocket,
        mut requests: mpsc::UnboundedReceiver<usize>,
    ) {
        let index = self.options.index;
        let mut rtp_buf = vec![0u8; MAX_DATAGRAM];
        let mut rtcp_buf = vec![0u8; MAX_DATAGRAM];
        let mut reports = tokio::time::interval(self.options.report_interval);
        reports.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            if !self.deliver() {
                return;
            }
            if self.pending.is_empty() {
                if let Some(bye) = self.goodbye.take() {
                    self.events.send(SessionEvent::EndOfStream {
                        index,
                        reason: bye.reason,
                    });
                    return;
                }
            }

            tokio::select! {
                biased;
                request = requests.recv() => match request {
                    Some(max_size) => self.wanted = Some(max_size),
                    None => return,
                },
                received = rtp.recv(&mut rtp_buf) => match received {
                    Ok(n) => self.on_rtp(&rtp_buf[..n]),
                    Err(e) => {
                        tracing::warn!(index, error = %e, "RTP receive failed");
                        self.events.send(SessionEvent::SourceClosed { index });
                        return;
                    }
                },
                received = rtcp.recv_from(&mut rtcp_buf) => match received {
                    Ok((n, from)) => {
                        if self.options.report_to.is_none() {
                            self.options.report_to = Some(from);
                        }
                        if let Some(bye) = rtcp::find_bye(&rtcp_buf[..n]) {
                            tracing::debug!(index, sources = ?bye.sources, "received RTCP BYE");
                            self.goodbye = Some(bye);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(index, error = %e, "RTCP receive failed");
                    }
                },
                _ = reports.tick() => self.send_report(&rtcp).await,
            }
        }
    }

    /// Release one queued frame if the sink is waiting for one. Returns
    /// `false` once the event loop is gone.
    fn deliver(&mut self) -> bool {
        let Some(max_size) = self.wanted else {
            return true;
        };
        let Some((mut data, presentation_time)) = self.pending.pop_front() else {
            return true;
        };

        let truncated = data.len().saturating_sub(max_size);
        data.truncate(max_size);
        self.wanted = None;

        self.events.frame_ready(
            self.options.index,
            Frame {
                data,
                truncated,
                presentation_time,
            },
        )
    }

    fn on_rtp(&mut self, datagram: &[u8]) {
        let Some(packet) = RtpPacket::parse(datagram) else {
            tracing::trace!(index = self.options.index, len = datagram.len(), "ignoring non-RTP datagram");
            return;
        };

        let first = *self.first_timestamp.get_or_insert(packet.timestamp);
        let presentation_time = if self.options.clock_rate > 0 {
            let ticks = packet.timestamp.wrapping_sub(first);
            Duration::from_secs_f64(f64::from(ticks) / f64::from(self.options.clock_rate))
        } else {
            Duration::ZERO
        };

        tracing::trace!(
            index = self.options.index,
            seq = packet.sequence,
            ts = packet.timestamp,
            marker = packet.marker,
            len = packet.payload.len(),
            "RTP packet"
        );

        for frame in self.depacketizer.push(packet.sequence, packet.payload) {
            if self.pending.len() >= self.options.max_pending {
                self.pending.pop_front();
                tracing::debug!(index = self.options.index, "frame queue full, dropping oldest frame");
            }
            self.pending.push_back((frame, presentation_time));
        }
    }

    async fn send_report(&self, rtcp: &UdpSocket) {
        let Some(to) = self.options.report_to else {
            return;
        };
        let report = rtcp::receiver_report(self.options.ssrc, &self.options.cname);
        if let Err(e) = rtcp.send_to(&report, to).await {
            tracing::debug!(index = self.options.index, %to, error = %e, "failed to send receiver report");
        }
    }
}
