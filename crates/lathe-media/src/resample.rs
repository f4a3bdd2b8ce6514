//! Sample rate conversion via rubato
//!
//! Whole-buffer conversion used when a file's rate differs from the
//! device rate. FFT-based, processed in fixed chunks so memory stays
//! bounded for long recordings.

use rubato::{FftFixedIn, Resampler};

use lathe_engine::types::{AudioBuffer, Sample};

use crate::error::{MediaError, MediaResult};

/// Input chunk size per process call
const CHUNK_FRAMES: usize = 1024;

/// FFT sub-chunks per chunk; higher trades speed for quality
const SUB_CHUNKS: usize = 2;

/// Resample a planar buffer from `source_rate` to `target_rate`.
///
/// The output length is exactly `round(frames * target / source)`; the
/// resampler's startup delay is trimmed so content keeps its position.
pub fn resample(
    audio: &AudioBuffer,
    source_rate: u32,
    target_rate: u32,
) -> MediaResult<AudioBuffer> {
    if source_rate == target_rate {
        return Ok(audio.clone());
    }

    let channels = audio.channels();
    let frames = audio.frames();
    if channels == 0 || frames == 0 {
        return Ok(AudioBuffer::silence(channels, 0));
    }

    let mut resampler = FftFixedIn::<Sample>::new(
        source_rate as usize,
        target_rate as usize,
        CHUNK_FRAMES,
        SUB_CHUNKS,
        channels,
    )
    .map_err(|e| MediaError::Resample(e.to_string()))?;

    let expected =
        (frames as f64 * target_rate as f64 / source_rate as f64).round() as usize;
    let delay = resampler.output_delay();

    let mut out: Vec<Vec<Sample>> = (0..channels)
        .map(|_| Vec::with_capacity(expected + delay + CHUNK_FRAMES))
        .collect();

    // Feed the input in fixed chunks, then keep feeding silence until
    // the tail has flushed past the resampler delay.
    let mut pos = 0;
    while out[0].len() < expected + delay {
        let needed = resampler.input_frames_next();
        let mut chunk: Vec<Vec<Sample>> = vec![vec![0.0; needed]; channels];
        if pos < frames {
            let take = (frames - pos).min(needed);
            for (ch, dst) in chunk.iter_mut().enumerate() {
                dst[..take].copy_from_slice(&audio.channel(ch)[pos..pos + take]);
            }
            pos += take;
        }

        let processed = resampler
            .process(&chunk, None)
            .map_err(|e| MediaError::Resample(e.to_string()))?;
        for (ch, processed_ch) in processed.into_iter().enumerate() {
            out[ch].extend_from_slice(&processed_ch);
        }
    }

    let planar: Vec<Vec<Sample>> = out
        .into_iter()
        .map(|ch| ch[delay..delay + expected].to_vec())
        .collect();

    log::debug!(
        "Resampled {} -> {} Hz: {} -> {} frames",
        source_rate,
        target_rate,
        frames,
        expected
    );

    Ok(AudioBuffer::from_planar(&planar))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(rate: u32, freq: f32, frames: usize) -> Vec<Sample> {
        (0..frames)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_same_rate_is_identity() {
        let audio = AudioBuffer::from_planar(&[vec![0.1, 0.2, 0.3]]);
        let out = resample(&audio, 44100, 44100).unwrap();
        assert_eq!(out.channel(0), audio.channel(0));
    }

    #[test]
    fn test_upsample_length_is_exact() {
        let wave = sine(44100, 440.0, 44100);
        let audio = AudioBuffer::from_planar(&[wave.clone(), wave]);

        let out = resample(&audio, 44100, 48000).unwrap();
        assert_eq!(out.frames(), 48000);
        assert_eq!(out.channels(), 2);
    }

    #[test]
    fn test_downsample_length_is_exact() {
        let wave = sine(96000, 440.0, 9600);
        let audio = AudioBuffer::from_planar(&[wave]);

        let out = resample(&audio, 96000, 44100).unwrap();
        assert_eq!(out.frames(), (9600.0_f64 * 44100.0 / 96000.0).round() as usize);
    }

    #[test]
    fn test_resampled_sine_keeps_amplitude() {
        let wave = sine(44100, 1000.0, 22050);
        let audio = AudioBuffer::from_planar(&[wave]);

        let out = resample(&audio, 44100, 48000).unwrap();
        // Ignore edge ringing at either end.
        let mid = &out.channel(0)[4800..out.frames() - 4800];
        let peak = mid.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        assert!((peak - 1.0).abs() < 0.05, "peak {}", peak);
    }

    #[test]
    fn test_empty_input_stays_empty() {
        let audio = AudioBuffer::silence(2, 0);
        let out = resample(&audio, 44100, 48000).unwrap();
        assert_eq!(out.frames(), 0);
    }
}
