//! WAV encoding via hound

use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};

use lathe_engine::types::AudioBuffer;

use crate::error::MediaResult;

/// Sample format for WAV export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WavFormat {
    Pcm16,
    Pcm24,
    #[default]
    Float32,
}

impl WavFormat {
    fn spec(self, channels: u16, sample_rate: u32) -> WavSpec {
        let (bits_per_sample, sample_format) = match self {
            WavFormat::Pcm16 => (16, SampleFormat::Int),
            WavFormat::Pcm24 => (24, SampleFormat::Int),
            WavFormat::Float32 => (32, SampleFormat::Float),
        };
        WavSpec {
            channels,
            sample_rate,
            bits_per_sample,
            sample_format,
        }
    }
}

/// Write a planar buffer to a WAV file, interleaving on the way out.
///
/// Integer formats clamp to full scale before quantizing.
pub fn write_wav(
    path: &Path,
    audio: &AudioBuffer,
    sample_rate: u32,
    format: WavFormat,
) -> MediaResult<()> {
    let channels = audio.channels();
    let spec = format.spec(channels as u16, sample_rate);
    let mut writer = WavWriter::create(path, spec)?;

    for frame in 0..audio.frames() {
        for ch in 0..channels {
            let sample = audio.channel(ch)[frame];
            match format {
                WavFormat::Pcm16 => {
                    writer.write_sample((sample.clamp(-1.0, 1.0) * 32767.0) as i16)?;
                }
                WavFormat::Pcm24 => {
                    writer.write_sample((sample.clamp(-1.0, 1.0) * 8_388_607.0) as i32)?;
                }
                WavFormat::Float32 => {
                    writer.write_sample(sample)?;
                }
            }
        }
    }

    writer.finalize()?;
    log::info!(
        "Wrote {:?}: {} frames, {} ch, {:?}",
        path,
        audio.frames(),
        channels,
        format
    );
    Ok(())
}
