//! Feed an MPEG-2 TS file through the loopback consumer queue.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tsfeed_core::{FeedCallback, FeedConfig, FeedError, FeedEvent, PlayState, Result};
use tsfeed_player::{init_logging, LoopbackQueue, StreamingPlayer};

/// Stream a transport stream file into a simulated decoder queue.
#[derive(Parser, Debug)]
#[command(name = "tsfeed")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Transport stream file to play
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Time the consumer spends on each buffer
    #[arg(long = "drain-ms", default_value_t = 5)]
    drain_ms: u64,

    /// Rewind once after this many buffers were enqueued
    #[arg(long = "rewind-after", value_name = "BUFFERS")]
    rewind_after: Option<u64>,

    #[arg(long = "packet-size", default_value_t = tsfeed_core::config::MPEG2_TS_PACKET_SIZE)]
    packet_size: usize,

    #[arg(long = "packets-per-buffer", default_value_t = tsfeed_core::config::PACKETS_PER_BUFFER)]
    packets_per_buffer: usize,

    /// Number of pool buffers
    #[arg(long = "buffers", default_value_t = tsfeed_core::config::NB_BUFFERS)]
    buffers: usize,
}

struct ConsoleCallback {
    finished: Arc<AtomicBool>,
}

impl FeedCallback for ConsoleCallback {
    fn on_event(&self, event: FeedEvent) {
        match event {
            FeedEvent::Progress { bytes_fed } => log::info!("Fed {} bytes", bytes_fed),
            FeedEvent::EndOfStreamProcessed => {
                log::info!("Consumer reached end of stream");
                self.finished.store(true, Ordering::SeqCst);
            }
            FeedEvent::Error { message } => {
                log::error!("{}", message);
                self.finished.store(true, Ordering::SeqCst);
            }
            other => log::debug!("{:?}", other),
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config = FeedConfig {
        packet_size: args.packet_size,
        packets_per_buffer: args.packets_per_buffer,
        buffer_count: args.buffers,
    };
    config.validate()?;

    let queue = Arc::new(LoopbackQueue::new());
    let finished = Arc::new(AtomicBool::new(false));

    let mut player: StreamingPlayer = StreamingPlayer::new(config);
    player.add_callback(
        Arc::new(ConsoleCallback {
            finished: finished.clone(),
        }),
        500,
    );
    player.create(&args.file, queue.clone())?;

    let consumer = {
        let queue = queue.clone();
        let finished = finished.clone();
        let pace = Duration::from_millis(args.drain_ms);
        thread::spawn(move || {
            while !finished.load(Ordering::SeqCst) {
                if queue.play_state() == PlayState::Playing && !queue.complete_next() {
                    // nothing in flight
                    break;
                }
                thread::sleep(pace);
            }
        })
    };

    if let Some(threshold) = args.rewind_after {
        while !finished.load(Ordering::SeqCst) {
            let enqueued = player.status().map_or(0, |s| s.buffers_enqueued);
            if enqueued >= threshold {
                log::info!("Rewinding after {} buffers", enqueued);
                player.rewind();
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    consumer
        .join()
        .map_err(|_| FeedError::InvalidState("consumer thread panicked".to_string()))?;

    if let Some(status) = player.status() {
        log::info!(
            "Fed {} bytes in {} buffers, {} discontinuities, end of stream processed: {}",
            status.bytes_fed,
            status.buffers_enqueued,
            status.discontinuities,
            status.end_of_stream_processed
        );
    }
    player.shutdown();
    Ok(())
}

fn main() -> ExitCode {
    init_logging();
    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
