//! Decode/render collaborators fed by the frame reassembler.
//!
//! The reassembler hands each substream's access units to a
//! [`FrameConsumer`]; [`DecodePipeline`] is the standard consumer, pairing a
//! [`Decoder`] with a [`Renderer`]. Extradata is given to the decoder once,
//! before the first frame.
//!
//! No codec is bundled. The decoders here inspect or store the bitstream:
//!
//! | Decoder | Output |
//! |---------|--------|
//! | [`AnnexBWriter`] | Annex B elementary stream (playable with `ffplay -f h264`) |
//! | [`NalLogger`] | One `debug` line per NAL unit |

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, RtspError};
use crate::media::h264::{H264Depacketizer, nal_type_name};
use crate::media::{AccessUnit, FrameConsumer};
use crate::session::{SinkFactory, Substream};

/// What a decoder produced for one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Picture {
    pub presentation_time: Duration,
    /// Bytes of coded data the picture was decoded from.
    pub coded_size: usize,
    /// Whether the frame can be decoded without earlier frames.
    pub keyframe: bool,
}

pub trait Decoder {
    /// Prepare for `codec` (an SDP encoding name). Failing means the
    /// substream cannot be consumed.
    fn initialize(&mut self, codec: &str) -> Result<()>;

    /// Out-of-band codec configuration (start-code-framed parameter sets).
    fn set_extradata(&mut self, extradata: &[u8]) -> Result<()>;

    /// Decode one start-code-framed frame. `None` when the frame produced
    /// no picture (e.g. a parameter set or a partial picture).
    fn decode_frame(&mut self, data: &[u8], presentation_time: Duration) -> Result<Option<Picture>>;
}

pub trait Renderer {
    fn present(&mut self, picture: &Picture);
}

/// Discards every picture.
#[derive(Debug, Default)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn present(&mut self, _picture: &Picture) {}
}

/// Decoder + renderer pair consuming one substream's access units.
pub struct DecodePipeline {
    decoder: Box<dyn Decoder>,
    renderer: Box<dyn Renderer>,
    configured: bool,
}

impl DecodePipeline {
    pub fn new(
        codec: &str,
        mut decoder: Box<dyn Decoder>,
        renderer: Box<dyn Renderer>,
    ) -> Result<Self> {
        decoder.initialize(codec)?;
        Ok(DecodePipeline {
            decoder,
            renderer,
            configured: false,
        })
    }
}

impl FrameConsumer for DecodePipeline {
    fn consume(&mut self, unit: AccessUnit<'_>) -> Result<()> {
        if !self.configured {
            self.configured = true;
            if !unit.extradata.is_empty() {
                self.decoder.set_extradata(unit.extradata)?;
            }
        }
        if let Some(picture) = self.decoder.decode_frame(unit.data, unit.presentation_time)? {
            self.renderer.present(&picture);
        }
        Ok(())
    }
}

fn is_keyframe(data: &[u8]) -> bool {
    H264Depacketizer::extract_nal_units(data)
        .iter()
        .any(|nal| nal.first().is_some_and(|h| h & 0x1f == 5))
}

/// Writes the Annex B byte stream: extradata once, then every frame.
/// Output is flushed when the writer is dropped.
pub struct AnnexBWriter<W: Write> {
    out: W,
}

impl<W: Write> AnnexBWriter<W> {
    pub fn new(out: W) -> Self {
        AnnexBWriter { out }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.out.write_all(bytes)?;
        Ok(())
    }
}

impl<W: Write> Drop for AnnexBWriter<W> {
    fn drop(&mut self) {
        if let Err(e) = self.out.flush() {
            tracing::warn!(error = %e, "failed to flush Annex B output");
        }
    }
}

impl<W: Write> Decoder for AnnexBWriter<W> {
    fn initialize(&mut self, _codec: &str) -> Result<()> {
        Ok(())
    }

    fn set_extradata(&mut self, extradata: &[u8]) -> Result<()> {
        self.write(extradata)
    }

    fn decode_frame(&mut self, data: &[u8], presentation_time: Duration) -> Result<Option<Picture>> {
        self.write(data)?;
        Ok(Some(Picture {
            presentation_time,
            coded_size: data.len(),
            keyframe: is_keyframe(data),
        }))
    }
}

/// Logs the NAL units of each H.264 frame.
#[derive(Debug, Default)]
pub struct NalLogger {
    label: String,
}

impl NalLogger {
    pub fn new(label: &str) -> Self {
        NalLogger {
            label: label.to_string(),
        }
    }
}

impl Decoder for NalLogger {
    fn initialize(&mut self, codec: &str) -> Result<()> {
        if codec.is_empty() {
            return Err(RtspError::Decode("unknown codec".to_string()));
        }
        Ok(())
    }

    fn set_extradata(&mut self, extradata: &[u8]) -> Result<()> {
        for nal in H264Depacketizer::extract_nal_units(extradata) {
            let nal_type = nal.first().map_or(0, |h| h & 0x1f);
            tracing::debug!(
                substream = %self.label,
                nal_type = nal_type_name(nal_type),
                len = nal.len(),
                "parameter set"
            );
        }
        Ok(())
    }

    fn decode_frame(&mut self, data: &[u8], presentation_time: Duration) -> Result<Option<Picture>> {
        let nals = H264Depacketizer::extract_nal_units(data);
        if nals.is_empty() {
            return Err(RtspError::Decode("frame without start code".to_string()));
        }
        for nal in &nals {
            let nal_type = nal.first().map_or(0, |h| h & 0x1f);
            tracing::debug!(
                substream = %self.label,
                nal_type = nal_type_name(nal_type),
                len = nal.len(),
                pts = presentation_time.as_secs_f64(),
                "NAL unit"
            );
        }
        Ok(Some(Picture {
            presentation_time,
            coded_size: data.len(),
            keyframe: is_keyframe(data),
        }))
    }
}

/// Builds a [`DecodePipeline`] per substream: an [`AnnexBWriter`] into
/// `out_dir` when one is configured, a [`NalLogger`] otherwise.
#[derive(Debug, Default)]
pub struct PipelineSinkFactory {
    out_dir: Option<PathBuf>,
    created: usize,
}

impl PipelineSinkFactory {
    pub fn new(out_dir: Option<PathBuf>) -> Self {
        PipelineSinkFactory {
            out_dir,
            created: 0,
        }
    }

    fn output_path(&self, dir: &std::path::Path, substream: &Substream) -> PathBuf {
        let extension = if substream.codec.eq_ignore_ascii_case("H264") {
            "h264"
        } else {
            "bin"
        };
        dir.join(format!(
            "{}-{}-{}.{}",
            self.created,
            substream.medium,
            substream.codec.to_ascii_lowercase(),
            extension
        ))
    }
}

impl SinkFactory for PipelineSinkFactory {
    fn create(&mut self, url: &str, substream: &Substream) -> Result<Box<dyn FrameConsumer>> {
        let label = substream.label();
        let decoder: Box<dyn Decoder> = match &self.out_dir {
            Some(dir) => {
                let path = self.output_path(dir, substream);
                let file = File::create(&path).map_err(|e| {
                    RtspError::SinkCreation(format!("{}: {}", path.display(), e))
                })?;
                tracing::info!(url, substream = %label, path = %path.display(), "writing substream");
                Box::new(AnnexBWriter::new(BufWriter::new(file)))
            }
            None => Box::new(NalLogger::new(&label)),
        };
        self.created += 1;

        let pipeline = DecodePipeline::new(&substream.codec, decoder, Box::new(NullRenderer))
            .map_err(|e| RtspError::SinkCreation(format!("{label}: {e}")))?;
        Ok(Box::new(pipeline))
    }
}
