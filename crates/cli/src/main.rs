use std::path::PathBuf;
use std::process;

use clap::Parser;
use rtsp_client::{ClientConfig, EmptySetupPolicy, PipelineSinkFactory, StreamRegistry};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "rtsp-client",
    about = "Receive one or more RTSP streams and hand their frames to a decoder"
)]
struct Args {
    /// RTSP URLs to open (rtsp://host[:port]/path)
    #[arg(required = true, value_name = "URL")]
    urls: Vec<String>,

    /// Write each substream's Annex B stream into this directory
    #[arg(long, value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// Shut a session down instead of sending PLAY when none of its
    /// substreams could be set up
    #[arg(long)]
    require_substreams: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            process::exit(1);
        }
    };

    let config = ClientConfig {
        empty_setup_policy: if args.require_substreams {
            EmptySetupPolicy::Shutdown
        } else {
            EmptySetupPolicy::PlayAnyway
        },
        ..ClientConfig::default()
    };

    let termination = runtime.block_on(async {
        let mut registry =
            StreamRegistry::new(config, Box::new(PipelineSinkFactory::new(args.out_dir)));
        for url in &args.urls {
            registry.open(url);
        }
        registry.run().await
    });

    process::exit(termination.exit_code());
}
