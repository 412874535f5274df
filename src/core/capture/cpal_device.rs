// src/core/capture/cpal_device.rs
//
// Live microphone capture through CPAL. The CPAL stream pushes sample
// buffers into a bounded channel; `read_frame` returns the newest frame's
// worth of audio and drops whatever piled up while the session was pacing.

use std::sync::mpsc::{sync_channel, Receiver, TryRecvError};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::warn;

use super::{CaptureDevice, CaptureParams, CaptureStream, RecentSamples};
use crate::core::frame::AudioFrame;
use crate::error::CaptureError;

/// Callback buffers held between reads. Older buffers are dropped when full,
/// like an overrun platform buffer.
const CHANNEL_DEPTH: usize = 64;

/// The host's default input device. Resolved again on every `open`, so a
/// device plugged in after startup is picked up by the next session.
#[derive(Debug, Clone, Default)]
pub struct CpalCaptureDevice;

impl CpalCaptureDevice {
    pub fn new() -> Self {
        Self
    }
}

impl CaptureDevice for CpalCaptureDevice {
    fn open(&self, params: &CaptureParams) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| CaptureError::Unavailable("no default input device".to_string()))?;

        let config = cpal::StreamConfig {
            channels: params.channels,
            sample_rate: cpal::SampleRate(params.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (tx, rx) = sync_channel::<Vec<i16>>(CHANNEL_DEPTH);
        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let samples = data
                        .iter()
                        .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                        .collect();
                    let _ = tx.try_send(samples);
                },
                move |err| {
                    warn!("CPAL capture error: {err}");
                },
                None,
            )
            .map_err(|e| match e {
                cpal::BuildStreamError::DeviceNotAvailable => {
                    CaptureError::Unavailable(e.to_string())
                }
                cpal::BuildStreamError::StreamConfigNotSupported => {
                    CaptureError::UnsupportedFormat(e.to_string())
                }
                other => CaptureError::Unavailable(other.to_string()),
            })?;

        stream
            .play()
            .map_err(|e| CaptureError::Unavailable(e.to_string()))?;

        Ok(Box::new(CpalCaptureStream {
            stream: Some(stream),
            rx,
            recent: RecentSamples::new(),
        }))
    }

    fn name(&self) -> String {
        cpal::default_host()
            .default_input_device()
            .and_then(|d| d.name().ok())
            .unwrap_or_else(|| "default input".to_string())
    }
}

struct CpalCaptureStream {
    stream: Option<cpal::Stream>,
    rx: Receiver<Vec<i16>>,
    recent: RecentSamples,
}

impl CaptureStream for CpalCaptureStream {
    fn read_frame(&mut self, frame_bytes: usize) -> Result<AudioFrame, CaptureError> {
        if self.stream.is_none() {
            return Err(CaptureError::Closed);
        }

        let wanted = frame_bytes / 2;
        loop {
            loop {
                match self.rx.try_recv() {
                    Ok(chunk) => self.recent.push(&chunk, wanted),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        return Err(CaptureError::Read("input stream stopped".to_string()))
                    }
                }
            }
            if let Some(frame) = self.recent.take_frame(wanted) {
                return Ok(frame);
            }

            let chunk = self
                .rx
                .recv()
                .map_err(|_| CaptureError::Read("input stream stopped".to_string()))?;
            self.recent.push(&chunk, wanted);
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.pause();
        }
        self.recent.clear();
    }
}
