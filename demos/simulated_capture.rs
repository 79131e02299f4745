//! Simulated capture example.
//!
//! Feeds a jittery synthetic sine tone through the playback scheduler and
//! reports when each batch is rendered, then records the same tone to a
//! WAV file.
//!
//! Run with: RUST_LOG=pcm_relay=debug cargo run --example simulated_capture

use std::sync::Arc;
use std::time::{Duration, Instant};

use pcm_relay::source::{MockBackend, MockSource};
use pcm_relay::{AudioInput, CaptureEvent, CaptureOptions, ChannelSink};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

const SAMPLE_RATE: u32 = 16000;

fn tone(seconds: u64) -> MockSource {
    let mut source = MockSource::new(SAMPLE_RATE, 1);
    source.generate_sine(440.0, seconds * 1000);
    source
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Chunks arrive every 60-140 ms but each holds 128 ms of audio
    let backend = MockBackend::new(tone(3))
        .interval(Duration::from_millis(60))
        .jitter(Duration::from_millis(80));

    let input = AudioInput::builder()
        .backend(backend)
        .on_event(|event| match event {
            CaptureEvent::Audio(_) => {}
            other => println!("event: {other:?}"),
        })
        .build()?;

    let (tx, mut rx) = mpsc::channel(16);
    input.connect(Arc::new(ChannelSink::new(tx)));

    println!("Playing 3 seconds of jittery input through the scheduler...");
    input
        .start(&CaptureOptions {
            sample_rate: Some(f64::from(SAMPLE_RATE)),
            buffer_size: Some(2048),
            batch_size_limit: Some(4),
            stream_to_output: Some(true),
            ..Default::default()
        })
        .await?;

    let started = Instant::now();
    let deadline = tokio::time::sleep(Duration::from_secs(4));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            () = &mut deadline => break,
            Some(buffer) = rx.recv() => {
                println!(
                    "{:>6} ms  rendered {:>5} frames ({:?})",
                    started.elapsed().as_millis(),
                    buffer.frames(),
                    buffer.duration()
                );
            }
        }
    }

    let stats = input.stats();
    input.stop().await?;
    println!("Stats: {stats:?}");

    let path = std::env::temp_dir().join("pcm-relay-demo.wav");
    println!("Recording 1 second to {}...", path.display());
    let recorder = AudioInput::builder()
        .backend(MockBackend::new(tone(1)))
        .on_event(|event| {
            if let CaptureEvent::Finished { file } = event {
                println!("Recording finished: {file:?}");
            }
        })
        .build()?;
    recorder
        .start(&CaptureOptions {
            sample_rate: Some(f64::from(SAMPLE_RATE)),
            file: Some(path),
            ..Default::default()
        })
        .await?;
    tokio::time::sleep(Duration::from_millis(1500)).await;
    recorder.destroy().await?;

    Ok(())
}
