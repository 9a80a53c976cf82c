//! Decoder boundary.
//!
//! Container decoding happens outside the engine; it only needs per-channel
//! float arrays and a sample rate. [`WavDecoder`] covers PCM and float WAV.

use std::io::Cursor;

use crate::error::DecodeError;

/// Output of an external decoder: one sample array per channel.
#[derive(Clone, Debug, Default)]
pub struct DecodedAudio {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
    pub frame_count: usize,
}

/// Turns an opaque audio container into per-channel samples.
pub trait AudioDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedAudio, DecodeError>;
}

/// WAV (RIFF) decoder for integer PCM and IEEE float files.
#[derive(Clone, Copy, Debug, Default)]
pub struct WavDecoder;

impl From<hound::Error> for DecodeError {
    fn from(e: hound::Error) -> Self {
        match e {
            hound::Error::IoError(io) => DecodeError::Io(io),
            hound::Error::Unsupported => DecodeError::Unsupported("WAV feature".into()),
            other => DecodeError::Format(other.to_string()),
        }
    }
}

impl AudioDecoder for WavDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedAudio, DecodeError> {
        let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
        let spec = reader.spec();
        let channel_count = spec.channels as usize;
        if channel_count == 0 {
            return Err(DecodeError::Format("zero channels".into()));
        }

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => {
                if spec.bits_per_sample != 32 {
                    return Err(DecodeError::Unsupported(format!(
                        "{}-bit float",
                        spec.bits_per_sample
                    )));
                }
                reader.samples::<f32>().collect::<Result<_, _>>()?
            }
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1u64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<Result<_, _>>()?
            }
        };

        let frame_count = interleaved.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frame_count); channel_count];
        for frame in interleaved.chunks_exact(channel_count) {
            for (ch, &s) in channels.iter_mut().zip(frame) {
                ch.push(s);
            }
        }
        log::debug!(
            "decoded WAV: {channel_count} ch, {} Hz, {frame_count} frames",
            spec.sample_rate
        );
        Ok(DecodedAudio { channels, sample_rate: spec.sample_rate, frame_count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(spec: hound::WavSpec, write: impl FnOnce(&mut hound::WavWriter<&mut Cursor<Vec<u8>>>)) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            write(&mut writer);
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn decodes_stereo_pcm16() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let bytes = wav_bytes(spec, |w| {
            for _ in 0..10 {
                w.write_sample(16_384i16).unwrap();
                w.write_sample(-32_768i16).unwrap();
            }
        });
        let audio = WavDecoder.decode(&bytes).unwrap();
        assert_eq!(audio.sample_rate, 22_050);
        assert_eq!(audio.frame_count, 10);
        assert_eq!(audio.channels.len(), 2);
        assert!(audio.channels[0].iter().all(|&s| (s - 0.5).abs() < 1e-6));
        assert!(audio.channels[1].iter().all(|&s| (s + 1.0).abs() < 1e-6));
    }

    #[test]
    fn decodes_mono_float() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 48_000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let bytes = wav_bytes(spec, |w| {
            for i in 0..64 {
                w.write_sample(i as f32 / 64.0).unwrap();
            }
        });
        let audio = WavDecoder.decode(&bytes).unwrap();
        assert_eq!(audio.channels[0].len(), 64);
        assert_eq!(audio.channels[0][32], 0.5);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = WavDecoder.decode(b"definitely not a riff file").unwrap_err();
        assert!(matches!(err, DecodeError::Format(_) | DecodeError::Io(_)));
    }
}
