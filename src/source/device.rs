//! Capture from a real input device through cpal.

use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat as CpalSampleFormat, Stream, StreamConfig as CpalStreamConfig};
use parking_lot::Mutex;
use ringbuf::traits::{Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tokio::sync::oneshot;

use crate::config::AudioFormatConfig;
use crate::error::CaptureError;
use crate::source::{spawn_ring_bridge, CaptureBackend, ChunkProducer, RingBridge};

/// Ring capacity in seconds of audio at the session's format.
const RING_SECONDS: usize = 30;

/// Lists the names of all available input devices.
pub fn list_input_devices() -> Result<Vec<String>, CaptureError> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| CaptureError::backend(e.to_string()))?;

    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

/// Name of the default input device, if any.
pub fn default_input_device_name() -> Option<String> {
    cpal::default_host()
        .default_input_device()
        .and_then(|d| d.name().ok())
}

/// A capture backend reading from a cpal input device.
///
/// The cpal stream lives on a dedicated thread for the length of the
/// session. Its callback only pushes into a lock-free ring; a bridge task
/// slices the ring into `buffer_size` chunks for the session.
///
/// The device is asked for the session's sample rate and channel count;
/// `start()` fails if it cannot provide them.
///
/// # Example
///
/// ```no_run
/// use pcm_relay::source::DeviceBackend;
///
/// let backend = DeviceBackend::default_device();
/// let usb = DeviceBackend::named("USB Microphone");
/// ```
pub struct DeviceBackend {
    device_name: Option<String>,
    running: Mutex<Option<DeviceRun>>,
}

struct DeviceRun {
    stop_tx: std_mpsc::Sender<()>,
    thread: thread::JoinHandle<()>,
    bridge: RingBridge,
}

impl DeviceBackend {
    /// Captures from the system default input device.
    pub fn default_device() -> Self {
        Self {
            device_name: None,
            running: Mutex::new(None),
        }
    }

    /// Captures from the input device with the given name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
            running: Mutex::new(None),
        }
    }
}

fn find_device(name: Option<&str>) -> Result<Device, CaptureError> {
    let host = cpal::default_host();
    let Some(name) = name else {
        return host
            .default_input_device()
            .ok_or(CaptureError::NoDefaultDevice);
    };

    let devices = host
        .input_devices()
        .map_err(|e| CaptureError::backend(e.to_string()))?;
    for device in devices {
        if device.name().is_ok_and(|n| n == name) {
            return Ok(device);
        }
    }

    Err(CaptureError::DeviceNotFound {
        name: name.to_string(),
    })
}

fn open_stream(
    device_name: Option<&str>,
    channels: u16,
    sample_rate: u32,
    producer: ChunkProducer,
) -> Result<(Stream, HeapCons<i16>), CaptureError> {
    let device = find_device(device_name)?;
    let sample_format = device
        .default_input_config()
        .map_err(|e| CaptureError::backend(e.to_string()))?
        .sample_format();

    let config = CpalStreamConfig {
        channels,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let capacity = sample_rate as usize * channels as usize * RING_SECONDS;
    let (ring_tx, ring_rx) = HeapRb::<i16>::new(capacity).split();

    let stream = match sample_format {
        CpalSampleFormat::I16 => build_i16_stream(&device, &config, ring_tx, producer)?,
        CpalSampleFormat::F32 => build_f32_stream(&device, &config, ring_tx, producer)?,
        other => {
            return Err(CaptureError::backend(format!(
                "unsupported device sample format: {other:?}"
            )));
        }
    };

    stream
        .play()
        .map_err(|e| CaptureError::backend(e.to_string()))?;

    Ok((stream, ring_rx))
}

fn build_i16_stream(
    device: &Device,
    config: &CpalStreamConfig,
    mut ring: HeapProd<i16>,
    producer: ChunkProducer,
) -> Result<Stream, CaptureError> {
    device
        .build_input_stream(
            config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                // Drops samples if the ring is full
                let _ = ring.push_slice(data);
            },
            move |err| {
                tracing::error!("audio stream error: {}", err);
                producer.send_error(err.to_string());
            },
            None,
        )
        .map_err(|e| CaptureError::backend(e.to_string()))
}

fn build_f32_stream(
    device: &Device,
    config: &CpalStreamConfig,
    mut ring: HeapProd<i16>,
    producer: ChunkProducer,
) -> Result<Stream, CaptureError> {
    device
        .build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                for &sample in data {
                    let _ = ring.try_push(crate::format::f32_to_i16(sample));
                }
            },
            move |err| {
                tracing::error!("audio stream error: {}", err);
                producer.send_error(err.to_string());
            },
            None,
        )
        .map_err(|e| CaptureError::backend(e.to_string()))
}

#[async_trait]
impl CaptureBackend for DeviceBackend {
    fn name(&self) -> &str {
        self.device_name.as_deref().unwrap_or("default")
    }

    async fn initialize(&self, _config: &AudioFormatConfig) -> Result<(), CaptureError> {
        find_device(self.device_name.as_deref()).map(|_| ())
    }

    async fn start(
        &self,
        config: &AudioFormatConfig,
        producer: ChunkProducer,
    ) -> Result<(), CaptureError> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let device_name = self.device_name.clone();
        let channels = config.channels();
        let sample_rate = config.sample_rate();
        let error_producer = producer.clone();

        let thread = thread::Builder::new()
            .name("pcm-relay-capture".to_string())
            .spawn(move || {
                match open_stream(device_name.as_deref(), channels, sample_rate, error_producer) {
                    Ok((stream, consumer)) => {
                        let _ = ready_tx.send(Ok(consumer));
                        // The stream runs until stop is requested or the backend is dropped.
                        let _ = stop_rx.recv();
                        drop(stream);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| CaptureError::backend(format!("failed to spawn capture thread: {e}")))?;

        let consumer = ready_rx
            .await
            .map_err(|_| CaptureError::backend("capture thread exited during startup"))??;

        let frames = config.buffer_size() / usize::from(channels);
        let chunk_duration = Duration::from_secs_f64(frames as f64 / f64::from(sample_rate));
        let bridge = spawn_ring_bridge(
            consumer,
            config.buffer_size(),
            config.format(),
            producer,
            chunk_duration / 2,
        );

        tracing::debug!(
            device = self.name(),
            sample_rate,
            channels,
            "device capture started"
        );

        *self.running.lock() = Some(DeviceRun {
            stop_tx,
            thread,
            bridge,
        });
        Ok(())
    }

    async fn stop(&self) -> Result<(), CaptureError> {
        let run = self.running.lock().take();
        let Some(run) = run else {
            return Ok(());
        };

        let _ = run.stop_tx.send(());
        let thread = run.thread;
        tokio::task::spawn_blocking(move || thread.join())
            .await
            .map_err(|e| CaptureError::backend(e.to_string()))?
            .map_err(|_| CaptureError::backend("capture thread panicked"))?;

        run.bridge.stop().await;
        tracing::debug!(device = self.name(), "device capture stopped");
        Ok(())
    }
}
