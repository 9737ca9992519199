use super::sprop::{START_CODE, build_extradata, parse_parameter_sets};
use super::{AccessUnit, Frame, FrameConsumer, FrameSource};

/// Default receive-buffer capacity per substream, in bytes.
pub const DEFAULT_RECEIVE_BUFFER_SIZE: usize = 100_000;

/// Turns delivered frames into self-describing, decodable access units.
///
/// Owns a fixed-capacity receive buffer whose first four bytes always hold
/// the Annex B start code; each delivered frame is written right after it.
/// On the first delivery the substream's `sprop-parameter-sets` are decoded
/// into the extradata blob, which is then reused unchanged for every
/// later frame.
///
/// The reassembler keeps itself alive by re-arming its source after every
/// delivery; it stops only when the source closes or the sink is dropped.
pub struct FrameReassembler {
    url: String,
    label: String,
    parameter_sets: Option<String>,
    capacity: usize,
    buffer: Vec<u8>,
    extradata: Option<Vec<u8>>,
    frames: u64,
    source: Box<dyn FrameSource>,
    consumer: Box<dyn FrameConsumer>,
}

impl FrameReassembler {
    pub fn new(
        url: &str,
        label: &str,
        parameter_sets: Option<String>,
        capacity: usize,
        source: Box<dyn FrameSource>,
        consumer: Box<dyn FrameConsumer>,
    ) -> Self {
        let mut buffer = Vec::with_capacity(START_CODE.len() + capacity);
        buffer.extend_from_slice(&START_CODE);
        Self {
            url: url.to_string(),
            label: label.to_string(),
            parameter_sets,
            capacity,
            buffer,
            extradata: None,
            frames: 0,
            source,
            consumer,
        }
    }

    /// Request the next frame from the bound source.
    pub fn start_playing(&mut self) {
        self.source.get_next_frame(self.capacity);
    }

    /// Handle one delivered frame and re-arm for the next.
    pub fn on_frame_ready(&mut self, frame: Frame) {
        let Frame {
            data,
            mut truncated,
            presentation_time,
        } = frame;

        let mut data = &data[..];
        if data.len() > self.capacity {
            truncated += data.len() - self.capacity;
            data = &data[..self.capacity];
        }

        if truncated > 0 {
            tracing::debug!(
                url = %self.url,
                substream = %self.label,
                received = data.len(),
                truncated,
                "frame truncated by receive buffer"
            );
        }

        if self.extradata.is_none() {
            let extradata = self.build_extradata();
            tracing::debug!(
                url = %self.url,
                substream = %self.label,
                extradata_len = extradata.len(),
                "extradata built from parameter sets"
            );
            self.extradata = Some(extradata);
        }

        self.buffer.truncate(START_CODE.len());
        self.buffer.extend_from_slice(data);
        self.frames += 1;

        tracing::trace!(
            url = %self.url,
            substream = %self.label,
            bytes = data.len(),
            pts = presentation_time.as_secs_f64(),
            "frame received"
        );

        let unit = AccessUnit {
            extradata: self.extradata.as_deref().unwrap_or(&[]),
            data: &self.buffer,
            truncated,
            presentation_time,
        };
        if let Err(e) = self.consumer.consume(unit) {
            tracing::warn!(url = %self.url, substream = %self.label, error = %e, "frame consumer rejected frame");
        }

        self.start_playing();
    }

    fn build_extradata(&self) -> Vec<u8> {
        let Some(sprop) = self.parameter_sets.as_deref() else {
            return Vec::new();
        };
        match parse_parameter_sets(sprop) {
            Ok(blocks) => build_extradata(&blocks),
            Err(e) => {
                tracing::warn!(
                    url = %self.url,
                    substream = %self.label,
                    error = %e,
                    "ignoring undecodable sprop-parameter-sets"
                );
                Vec::new()
            }
        }
    }

    /// Extradata, once the first frame has been delivered.
    pub fn extradata(&self) -> Option<&[u8]> {
        self.extradata.as_deref()
    }

    pub fn frames_delivered(&self) -> u64 {
        self.frames
    }
}

/// Per-substream consumer of delivered data.
///
/// Only the reassembling variant exists today; a file-writing sink that
/// bypasses reassembly would be a second variant selected at setup time.
pub enum Sink {
    Reassembler(FrameReassembler),
}

impl Sink {
    pub fn start_playing(&mut self) {
        match self {
            Sink::Reassembler(r) => r.start_playing(),
        }
    }

    pub fn on_frame_ready(&mut self, frame: Frame) {
        match self {
            Sink::Reassembler(r) => r.on_frame_ready(frame),
        }
    }

    pub fn frames_delivered(&self) -> u64 {
        match self {
            Sink::Reassembler(r) => r.frames_delivered(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::error::{Result, RtspError};

    #[derive(Default)]
    struct SourceLog {
        requests: Vec<usize>,
    }

    struct MockSource(Rc<RefCell<SourceLog>>);

    impl FrameSource for MockSource {
        fn get_next_frame(&mut self, max_size: usize) {
            self.0.borrow_mut().requests.push(max_size);
        }
    }

    #[derive(Default)]
    struct Received {
        units: Vec<(Vec<u8>, Vec<u8>, usize)>,
    }

    struct Recorder {
        log: Rc<RefCell<Received>>,
        fail: bool,
    }

    impl FrameConsumer for Recorder {
        fn consume(&mut self, unit: AccessUnit<'_>) -> Result<()> {
            self.log.borrow_mut().units.push((
                unit.extradata.to_vec(),
                unit.data.to_vec(),
                unit.truncated,
            ));
            if self.fail {
                return Err(RtspError::Decode("bad frame".to_string()));
            }
            Ok(())
        }
    }

    fn frame(data: &[u8]) -> Frame {
        Frame {
            data: Bytes::copy_from_slice(data),
            truncated: 0,
            presentation_time: Duration::ZERO,
        }
    }

    fn reassembler(
        sprop: Option<&str>,
        capacity: usize,
        fail: bool,
    ) -> (
        FrameReassembler,
        Rc<RefCell<SourceLog>>,
        Rc<RefCell<Received>>,
    ) {
        let source_log = Rc::new(RefCell::new(SourceLog::default()));
        let received = Rc::new(RefCell::new(Received::default()));
        let r = FrameReassembler::new(
            "rtsp://test/stream",
            "video/H264",
            sprop.map(str::to_string),
            capacity,
            Box::new(MockSource(source_log.clone())),
            Box::new(Recorder {
                log: received.clone(),
                fail,
            }),
        );
        (r, source_log, received)
    }

    #[test]
    fn start_playing_requests_with_buffer_capacity() {
        let (mut r, source, _) = reassembler(None, 1000, false);
        r.start_playing();
        assert_eq!(source.borrow().requests, vec![1000]);
    }

    #[test]
    fn frames_are_start_code_prefixed_and_rearm() {
        let (mut r, source, received) = reassembler(None, 1000, false);
        r.start_playing();
        r.on_frame_ready(frame(&[0x65, 0xAA]));
        r.on_frame_ready(frame(&[0x41, 0xBB, 0xCC]));

        let received = received.borrow();
        assert_eq!(received.units[0].1, vec![0, 0, 0, 1, 0x65, 0xAA]);
        assert_eq!(received.units[1].1, vec![0, 0, 0, 1, 0x41, 0xBB, 0xCC]);
        assert_eq!(source.borrow().requests.len(), 3, "initial + one per frame");
        assert_eq!(r.frames_delivered(), 2);
    }

    #[test]
    fn extradata_built_once_and_identical_for_every_frame() {
        let (mut r, _, received) = reassembler(Some("Z0IAHg==,aM44gA=="), 1000, false);
        assert!(r.extradata().is_none(), "built lazily");

        r.on_frame_ready(frame(&[0x65, 1]));
        let first_ptr = r.extradata().map(<[u8]>::as_ptr);
        for _ in 0..5 {
            r.on_frame_ready(frame(&[0x41, 2]));
        }
        assert_eq!(r.extradata().map(<[u8]>::as_ptr), first_ptr);

        let expected = vec![0, 0, 0, 1, 0x67, 0x42, 0x00, 0x1e, 0, 0, 0, 1, 0x68, 0xce, 0x38, 0x80];
        let received = received.borrow();
        assert_eq!(received.units.len(), 6);
        for (extradata, _, _) in &received.units {
            assert_eq!(extradata, &expected);
        }
        assert_eq!(expected.len(), (4 + 4) + (4 + 4));
    }

    #[test]
    fn missing_or_invalid_parameter_sets_give_empty_extradata() {
        let (mut r, _, _) = reassembler(None, 1000, false);
        r.on_frame_ready(frame(&[0x65]));
        assert_eq!(r.extradata(), Some(&[][..]));

        let (mut r, _, received) = reassembler(Some("!!!"), 1000, false);
        r.on_frame_ready(frame(&[0x65]));
        assert_eq!(r.extradata(), Some(&[][..]));
        assert_eq!(received.borrow().units.len(), 1, "frame still forwarded");
    }

    #[test]
    fn truncated_frames_are_still_forwarded() {
        let (mut r, _, received) = reassembler(None, 4, false);
        let mut f = frame(&[1, 2, 3, 4]);
        f.truncated = 10;
        r.on_frame_ready(f);
        // Oversize delivery is clipped to capacity rather than growing the buffer.
        r.on_frame_ready(frame(&[1, 2, 3, 4, 5, 6]));

        let received = received.borrow();
        assert_eq!(received.units[0].2, 10);
        assert_eq!(received.units[1].1, vec![0, 0, 0, 1, 1, 2, 3, 4]);
        assert_eq!(received.units[1].2, 2);
    }

    #[test]
    fn consumer_errors_do_not_stop_delivery() {
        let (mut r, source, received) = reassembler(None, 100, true);
        r.on_frame_ready(frame(&[0x65]));
        r.on_frame_ready(frame(&[0x41]));
        assert_eq!(received.borrow().units.len(), 2);
        assert_eq!(source.borrow().requests.len(), 2);
    }
}
