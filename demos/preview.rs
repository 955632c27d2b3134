use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use rtspgrab_client::{ClientConfig, RtspClient};
use std::{
    collections::VecDeque,
    io::BufRead,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

const FPS_WINDOW_SIZE: usize = 30;

/// Poll the latest frame of an RTSP stream until Enter or Ctrl-C.
#[derive(Parser)]
struct CliArgs {
    /// Stream address; leave empty for the synthetic test pattern
    #[arg(default_value = "rtsp://localhost:8554/video_stream")]
    url: String,

    /// JSON config file (overrides `url`)
    #[arg(long)]
    config: Option<String>,

    /// Log lifecycle events at info level
    #[arg(short, long)]
    verbose: bool,

    /// Polling interval in milliseconds
    #[arg(long, default_value = "10")]
    poll_ms: u64,
}

/// Calculate FPS from timing window
fn calculate_fps(window: &VecDeque<Instant>) -> f64 {
    match (window.front(), window.back()) {
        (Some(first), Some(last)) if window.len() >= 2 => {
            (window.len() - 1) as f64 / last.duration_since(*first).as_secs_f64()
        }
        _ => 0.0,
    }
}

fn main() -> Result<()> {
    let args = CliArgs::parse();
    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let config = match &args.config {
        Some(path) => ClientConfig::from_path(path).with_context(|| format!("Loading {path}"))?,
        None => ClientConfig::new(args.url.clone(), args.verbose),
    };

    println!("🚀 rtspgrab preview");
    println!("===================");
    println!("Source: {}", config.address().unwrap_or("<synthetic>"));
    println!("Press 'Enter' to exit");
    println!();

    let run = Arc::new(AtomicBool::new(true));
    {
        let run = Arc::clone(&run);
        ctrlc::set_handler(move || run.store(false, Ordering::SeqCst)).context("Installing Ctrl-C handler")?;
    }
    {
        let run = Arc::clone(&run);
        std::thread::spawn(move || {
            let mut line = String::new();
            let _ = std::io::stdin().lock().read_line(&mut line);
            run.store(false, Ordering::SeqCst);
        });
    }

    let client = RtspClient::new(config);
    client.start().context("Starting client")?;
    info!(
        "Source {} @ {:.1} fps",
        client.source_kind().map(|k| k.to_string()).unwrap_or_default(),
        client.get_fps().unwrap_or_default()
    );

    let mut fps_times: VecDeque<Instant> = VecDeque::with_capacity(FPS_WINDOW_SIZE);
    let mut last_seq = 0u64;
    let mut count = 0u64;

    while run.load(Ordering::SeqCst) {
        let Some(frame) = client.get_frame() else {
            std::thread::sleep(Duration::from_millis(args.poll_ms));
            continue;
        };

        if frame.sequence != last_seq {
            let skipped = frame.sequence.saturating_sub(last_seq + 1);
            last_seq = frame.sequence;

            fps_times.push_back(Instant::now());
            if fps_times.len() > FPS_WINDOW_SIZE {
                fps_times.pop_front();
            }

            count += 1;
            if count % 100 == 0 {
                println!(
                    "frame #{} {}x{} | read {:.1} FPS | skipped {} since last read",
                    frame.sequence,
                    frame.width,
                    frame.height,
                    calculate_fps(&fps_times),
                    skipped
                );
            }
        }

        std::thread::sleep(Duration::from_millis(args.poll_ms));
    }

    client.stop().context("Stopping client")?;
    println!("\n🎉 Read {} distinct frames", count);
    Ok(())
}
