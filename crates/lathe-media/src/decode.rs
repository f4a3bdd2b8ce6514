//! Audio file decoding via symphonia
//!
//! Decodes any container/codec symphonia recognizes into a planar
//! [`SourceBuffer`] at the file's native sample rate. Rate conversion
//! to the device rate is a separate step, see [`crate::resample`].

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use lathe_engine::source::SourceBuffer;
use lathe_engine::types::{AudioBuffer, Sample, MAX_CHANNELS};

use crate::error::{MediaError, MediaResult};

/// A decoded file: the samples plus the container facts an editor
/// needs to offer "save in the original format".
pub struct DecodedAudio {
    /// Planar samples at the file's native rate.
    pub buffer: SourceBuffer,
    /// Bit depth declared by the container, when it declares one.
    /// Lossy codecs have no meaningful value here.
    pub bits_per_sample: Option<u32>,
}

/// Decode a whole audio file into memory.
///
/// Channels beyond [`MAX_CHANNELS`] are dropped with a warning; a
/// damaged stream keeps whatever decoded cleanly before the first
/// unrecoverable error.
pub fn decode_file(path: &Path) -> MediaResult<DecodedAudio> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| MediaError::Probe(e.to_string()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| MediaError::NoAudioTrack(path.to_path_buf()))?;
    let track_id = track.id;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| MediaError::Probe("Unknown sample rate".to_string()))?;
    let bits_per_sample = track.codec_params.bits_per_sample;
    let file_channels = track
        .codec_params
        .channels
        .map(|c| c.count().max(1))
        .unwrap_or(2);

    let channels = if file_channels > MAX_CHANNELS {
        log::warn!(
            "{:?} has {} channels, keeping the first {}",
            path,
            file_channels,
            MAX_CHANNELS
        );
        MAX_CHANNELS
    } else {
        file_channels
    };

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| MediaError::Decode(e.to_string()))?;

    let mut planar: Vec<Vec<Sample>> = vec![Vec::new(); channels];
    let mut sample_buf: Option<SampleBuffer<Sample>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                log::warn!("Error reading packet from {:?}: {}", path, e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(e) => {
                // Skip damaged packets, keep the rest of the stream.
                log::warn!("Error decoding packet from {:?}: {}", path, e);
                continue;
            }
        };

        if sample_buf.is_none() {
            let spec = *decoded.spec();
            let duration = decoded.capacity() as u64;
            sample_buf = Some(SampleBuffer::new(duration, spec));
        }

        if let Some(ref mut buf) = sample_buf {
            buf.copy_interleaved_ref(decoded);
            let interleaved = buf.samples();
            for (i, &sample) in interleaved.iter().enumerate() {
                let ch = i % file_channels;
                if ch < channels {
                    planar[ch].push(sample);
                }
            }
        }
    }

    if planar.iter().all(|ch| ch.is_empty()) {
        return Err(MediaError::EmptyStream(path.to_path_buf()));
    }

    let audio = AudioBuffer::from_planar(&planar);
    log::info!(
        "Decoded {:?}: {} frames, {} ch, {} Hz",
        path,
        audio.frames(),
        audio.channels(),
        sample_rate
    );

    Ok(DecodedAudio {
        buffer: SourceBuffer::new(audio, sample_rate),
        bits_per_sample,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};

    fn write_test_wav(path: &Path, left: &[f32], right: &[f32], rate: u32) {
        let spec = WavSpec {
            channels: 2,
            sample_rate: rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for (l, r) in left.iter().zip(right) {
            writer.write_sample(*l).unwrap();
            writer.write_sample(*r).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_decode_stereo_wav_deinterleaves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");

        let left: Vec<f32> = (0..512).map(|i| i as f32 / 512.0).collect();
        let right: Vec<f32> = (0..512).map(|i| -(i as f32) / 512.0).collect();
        write_test_wav(&path, &left, &right, 44100);

        let source = decode_file(&path).unwrap().buffer;
        assert_eq!(source.frames(), 512);
        assert_eq!(source.channels(), 2);
        assert_eq!(source.sample_rate(), 44100);
        assert_eq!(source.channel(0), left.as_slice());
        assert_eq!(source.channel(1), right.as_slice());
    }

    #[test]
    fn test_decode_reports_pcm_bit_depth() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pcm16.wav");

        let spec = WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for _ in 0..64 {
            writer.write_sample(8192i16).unwrap();
        }
        writer.finalize().unwrap();

        let decoded = decode_file(&path).unwrap();
        assert_eq!(decoded.bits_per_sample, Some(16));
        assert_eq!(decoded.buffer.frames(), 64);
        assert!((decoded.buffer.channel(0)[10] - 0.25).abs() < 1e-3);
    }

    #[test]
    fn test_decode_mono_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");

        let spec = WavSpec {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for i in 0..100 {
            writer.write_sample(i as f32 * 0.01).unwrap();
        }
        writer.finalize().unwrap();

        let source = decode_file(&path).unwrap().buffer;
        assert_eq!(source.channels(), 1);
        assert_eq!(source.frames(), 100);
        assert!((source.channel(0)[50] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_decode_missing_file_is_io_error() {
        let result = decode_file(Path::new("/nonexistent/take.wav"));
        assert!(matches!(result, Err(MediaError::Io(_))));
    }

    #[test]
    fn test_decode_garbage_is_probe_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.wav");
        std::fs::write(&path, b"definitely not audio").unwrap();

        let result = decode_file(&path);
        assert!(matches!(result, Err(MediaError::Probe(_))));
    }
}
