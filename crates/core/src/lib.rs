pub mod decode;
pub mod error;
pub mod media;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use decode::{DecodePipeline, PipelineSinkFactory};
pub use error::{Result, RtspError};
pub use registry::{ClientConfig, EmptySetupPolicy, StreamRegistry};
pub use session::{SessionController, SinkFactory, Termination};
