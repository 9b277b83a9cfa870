//! In-memory WAV encoding of synthesized audio.

use crate::error::{Result, SpeakError};
use std::io::Cursor;

/// MIME type of the encoded container.
pub const WAV_CONTENT_TYPE: &str = "audio/wav";

/// Encode mono f32 samples as a 16-bit PCM WAV file in memory.
///
/// Samples are clamped to `[-1.0, 1.0]` before quantisation.
///
/// # Errors
///
/// Returns an error if the sample rate is zero or the writer fails.
pub fn encode_wav_pcm16(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    if sample_rate == 0 {
        return Err(SpeakError::Audio("sample rate must be non-zero".into()));
    }

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| SpeakError::Audio(format!("failed to create wav writer: {e}")))?;
        for &s in samples {
            writer
                .write_sample(pcm16(s))
                .map_err(|e| SpeakError::Audio(format!("failed to write wav sample: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| SpeakError::Audio(format!("failed to finalize wav: {e}")))?;
    }

    Ok(cursor.into_inner())
}

fn pcm16(sample: f32) -> i16 {
    // NaN maps to silence rather than i16::MIN.
    if sample.is_nan() {
        return 0;
    }
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn header_carries_rate_and_format() {
        let bytes = encode_wav_pcm16(&[0.0, 0.5, -0.5], 24_000).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");

        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.sample_rate, 24_000);
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.len(), 3);
    }

    #[test]
    fn out_of_range_samples_are_clamped() {
        let bytes = encode_wav_pcm16(&[2.0, -3.0, f32::NAN], 16_000).unwrap();
        let mut reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, vec![i16::MAX, -i16::MAX, 0]);
    }

    #[test]
    fn empty_input_is_valid_wav() {
        let bytes = encode_wav_pcm16(&[], 24_000).unwrap();
        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.len(), 0);
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert!(matches!(
            encode_wav_pcm16(&[0.1], 0),
            Err(SpeakError::Audio(_))
        ));
    }
}
