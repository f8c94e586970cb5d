//! Microphone capture using cpal
//!
//! Feeds the window chunker: the cpal callback folds frames to mono and
//! appends them to a shared buffer which the session loop drains with
//! [`AudioCapture::take_samples`]. The callback itself never blocks on
//! downstream processing.

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};

/// An available input device.
#[derive(Debug, Clone)]
pub struct InputDevice {
    pub name: String,
    pub is_default: bool,
    pub sample_rate: u32,
    pub channels: u16,
}

/// List input devices on the default host.
pub fn list_input_devices() -> Result<Vec<InputDevice>> {
    let host = cpal::default_host();
    let default_name = host
        .default_input_device()
        .and_then(|d| d.name().ok())
        .unwrap_or_default();

    let mut devices = Vec::new();
    for device in host.input_devices()? {
        let name = match device.name() {
            Ok(n) => n,
            Err(_) => continue,
        };
        let config = match device.default_input_config() {
            Ok(c) => c,
            Err(_) => continue,
        };
        devices.push(InputDevice {
            is_default: name == default_name,
            sample_rate: config.sample_rate().0,
            channels: config.channels(),
            name,
        });
    }
    Ok(devices)
}

/// Audio capture from an input device.
pub struct AudioCapture {
    device: cpal::Device,
    config: cpal::StreamConfig,
    stream: Option<cpal::Stream>,
    buffer: Arc<Mutex<Vec<f32>>>,
}

impl AudioCapture {
    /// Open a device by name, or the default input device.
    pub fn new(device_name: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(name) = device_name {
            host.input_devices()?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .context("input device not found")?
        } else {
            host.default_input_device()
                .context("no default input device")?
        };

        let config = device.default_input_config()?;

        tracing::info!(
            "audio capture: {} @ {} Hz, {} channels",
            device.name().unwrap_or_default(),
            config.sample_rate().0,
            config.channels()
        );

        Ok(Self {
            device,
            config: config.into(),
            stream: None,
            buffer: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Start the input stream. Idempotent.
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let buffer = self.buffer.clone();
        let channels = self.config.channels as usize;

        let stream = self.device.build_input_stream(
            &self.config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let mono: Vec<f32> = data
                    .chunks(channels)
                    .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                    .collect();
                if let Ok(mut buf) = buffer.lock() {
                    buf.extend_from_slice(&mono);
                }
            },
            |err| {
                tracing::error!("audio capture error: {}", err);
            },
            None,
        )?;

        stream.play()?;
        self.stream = Some(stream);
        Ok(())
    }

    /// Drain everything captured since the previous call.
    pub fn take_samples(&self) -> Vec<f32> {
        match self.buffer.lock() {
            Ok(mut buf) => std::mem::take(&mut *buf),
            Err(_) => Vec::new(),
        }
    }

    /// Stop the stream and return any remaining samples.
    pub fn stop(&mut self) -> Vec<f32> {
        self.stream = None;
        self.take_samples()
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn channels(&self) -> u16 {
        self.config.channels
    }
}
