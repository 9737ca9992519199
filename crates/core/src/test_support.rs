//! Test doubles for the protocol and sink collaborators.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use crate::error::{Result, RtspError};
use crate::media::{AccessUnit, FrameConsumer, FrameSource};
use crate::protocol::Protocol;
use crate::session::{
    ClientPorts, DescribeResponse, PlayRange, ServerTransport, SessionEvent, SessionEvents,
    SinkFactory, Substream,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Describe,
    Activate(usize),
    Setup(usize),
    BoundSource(usize),
    /// PLAY with its `Range` header value.
    Play(String),
    Teardown(String),
}

type SourceRequests = Rc<RefCell<Vec<(usize, usize)>>>;

/// Records every protocol call. In scripted mode it also answers DESCRIBE,
/// SETUP and PLAY successfully through the session's event channel.
pub struct MockProtocol {
    calls: Rc<RefCell<Vec<Call>>>,
    failing_activations: HashSet<usize>,
    failing_sources: HashSet<usize>,
    requests: SourceRequests,
    script: Option<(SessionEvents, String)>,
}

impl MockProtocol {
    pub fn new() -> (Self, Rc<RefCell<Vec<Call>>>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let protocol = MockProtocol {
            calls: calls.clone(),
            failing_activations: HashSet::new(),
            failing_sources: HashSet::new(),
            requests: Rc::new(RefCell::new(Vec::new())),
            script: None,
        };
        (protocol, calls)
    }

    pub fn scripted(events: SessionEvents, sdp: &str) -> (Self, Rc<RefCell<Vec<Call>>>) {
        let (mut protocol, calls) = Self::new();
        protocol.script = Some((events, sdp.to_string()));
        (protocol, calls)
    }

    pub fn fail_activation(&mut self, index: usize) {
        self.failing_activations.insert(index);
    }

    pub fn fail_source(&mut self, index: usize) {
        self.failing_sources.insert(index);
    }

    /// `(substream index, max_size)` for every frame requested from a
    /// source handed out by this protocol.
    pub fn source_requests(&self) -> SourceRequests {
        self.requests.clone()
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    fn answer(&self, event: SessionEvent) {
        if let Some((events, _)) = &self.script {
            events.send(event);
        }
    }
}

impl Protocol for MockProtocol {
    fn url(&self) -> &str {
        "rtsp://mock/stream"
    }

    fn send_describe(&mut self) {
        self.record(Call::Describe);
        if let Some((_, sdp)) = &self.script {
            self.answer(SessionEvent::DescribeComplete(Ok(DescribeResponse {
                base_url: "rtsp://mock/stream/".to_string(),
                sdp: sdp.clone(),
            })));
        }
    }

    fn activate(&mut self, substream: &mut Substream) -> Result<ClientPorts> {
        self.record(Call::Activate(substream.index));
        if self.failing_activations.contains(&substream.index) {
            return Err(RtspError::UnsupportedTransport(substream.protocol.clone()));
        }
        let rtp = 50_000 + 2 * substream.index as u16;
        Ok(ClientPorts { rtp, rtcp: rtp + 1 })
    }

    fn send_setup(&mut self, substream: &Substream) {
        self.record(Call::Setup(substream.index));
        self.answer(SessionEvent::SetupComplete {
            index: substream.index,
            result: Ok(ServerTransport::default()),
        });
    }

    fn send_play(&mut self, _url: &str, range: &PlayRange) {
        self.record(Call::Play(range.header_value()));
        self.answer(SessionEvent::PlayComplete(Ok(())));
    }

    fn send_teardown(&mut self, url: &str) {
        self.record(Call::Teardown(url.to_string()));
    }

    fn bound_source(&mut self, substream: &Substream) -> Result<Box<dyn FrameSource>> {
        self.record(Call::BoundSource(substream.index));
        if self.failing_sources.contains(&substream.index) {
            return Err(RtspError::SourceUnavailable(substream.index));
        }
        Ok(Box::new(MockSource {
            index: substream.index,
            requests: self.requests.clone(),
        }))
    }
}

struct MockSource {
    index: usize,
    requests: SourceRequests,
}

impl FrameSource for MockSource {
    fn get_next_frame(&mut self, max_size: usize) {
        self.requests.borrow_mut().push((self.index, max_size));
    }
}

/// Sink factory recording the label of every substream it was asked for.
pub struct RecordingSinks {
    created: Rc<RefCell<Vec<String>>>,
}

impl RecordingSinks {
    pub fn new() -> (Self, Rc<RefCell<Vec<String>>>) {
        let created = Rc::new(RefCell::new(Vec::new()));
        (
            RecordingSinks {
                created: created.clone(),
            },
            created,
        )
    }
}

impl SinkFactory for RecordingSinks {
    fn create(&mut self, _url: &str, substream: &Substream) -> Result<Box<dyn FrameConsumer>> {
        self.created.borrow_mut().push(substream.label());
        Ok(Box::new(DiscardConsumer))
    }
}

struct DiscardConsumer;

impl FrameConsumer for DiscardConsumer {
    fn consume(&mut self, _unit: AccessUnit<'_>) -> Result<()> {
        Ok(())
    }
}

/// SDP with `substreams` H.264 video sections and an optional session-level
/// `npt` range such as `"0-10"`.
pub fn h264_sdp(substreams: usize, npt: Option<&str>) -> String {
    media_sdp(&vec!["video"; substreams], npt)
}

/// SDP with one section per entry of `media`, in order: `"video"` is H.264
/// with parameter sets, `"audio"` is static payload type 0 (PCMU). Controls
/// are `track1..trackN`.
pub fn media_sdp(media: &[&str], npt: Option<&str>) -> String {
    let mut sdp = String::from("v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=test\r\nt=0 0\r\na=control:*\r\n");
    if let Some(range) = npt {
        sdp.push_str(&format!("a=range:npt={range}\r\n"));
    }
    for (i, medium) in media.iter().enumerate() {
        match *medium {
            "audio" => sdp.push_str("m=audio 0 RTP/AVP 0\r\n"),
            _ => sdp.push_str(
                "m=video 0 RTP/AVP 96\r\na=rtpmap:96 H264/90000\r\n\
                 a=fmtp:96 packetization-mode=1;sprop-parameter-sets=Z0IAHg==,aM44gA==\r\n",
            ),
        }
        sdp.push_str(&format!("a=control:track{}\r\n", i + 1));
    }
    sdp
}
