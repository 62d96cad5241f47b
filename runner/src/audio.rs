//! Audio output: a cpal stream pulling PCM through the PSG mixer.
//!
//! The stream callback runs on the audio thread and holds the PSG's
//! audio lock for the duration of each buffer mix, mirroring the
//! device-callback model of the sound hardware. The stream starts
//! paused and is unpaused once the machine presents frames; warp mode
//! pauses it again.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use machine_oric::PsgAudio;

pub struct AudioOutput {
    stream: Stream,
}

impl AudioOutput {
    /// Create the output stream, initially paused.
    ///
    /// Returns None if no audio device is available.
    pub fn new(sample_rate: u32, psg: PsgAudio) -> Option<Self> {
        let host = cpal::default_host();
        let device = host.default_output_device()?;

        let config = StreamConfig {
            channels: 2,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let mut scratch: Vec<i16> = Vec::new();

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    scratch.resize(data.len(), 0);
                    psg.fill(&mut scratch);
                    for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
                        *dst = src as f32 / 32768.0;
                    }
                },
                |err| log::error!("audio stream error: {}", err),
                None,
            )
            .ok()?;

        stream.pause().ok()?;

        Some(Self { stream })
    }

    pub fn set_paused(&self, paused: bool) {
        if paused {
            if let Err(err) = self.stream.pause() {
                log::warn!("audio stream state change failed: {}", err);
            }
        } else {
            if let Err(err) = self.stream.play() {
                log::warn!("audio stream state change failed: {}", err);
            }
        }
    }
}
