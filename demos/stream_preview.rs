use anyhow::{Context, Result};
use clap::Parser;
use rtspgrab_client::{frame_stream, ClientConfig, RtspClient};
use tokio_stream::StreamExt;

/// Consume a stream's latest frames as an async stream.
#[derive(Parser)]
struct CliArgs {
    /// Stream address; leave empty for the synthetic test pattern
    #[arg(default_value = "")]
    url: String,

    /// Stop after this many frames
    #[arg(long, default_value = "300")]
    num_frames: usize,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // start() blocks until the source is settled, keep it off the reactor
    let client = tokio::task::spawn_blocking(move || -> Result<RtspClient> {
        let client = RtspClient::new(ClientConfig::new(args.url, args.verbose));
        client.start().context("Starting client")?;
        Ok(client)
    })
    .await??;

    let mut frames = frame_stream(client.reader()).take(args.num_frames);
    let mut count = 0usize;
    while let Some(frame) = frames.next().await {
        count += 1;
        if count % 50 == 0 {
            println!("frame #{} {}x{} pts {:?}", frame.sequence, frame.width, frame.height, frame.pts);
        }
    }

    tokio::task::spawn_blocking(move || client.stop()).await??;
    println!("🎉 Streamed {} frames", count);
    Ok(())
}
