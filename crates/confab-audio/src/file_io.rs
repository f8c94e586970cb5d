//! Audio file I/O
//!
//! Loads recordings into the mono f32 shape the pipeline consumes.
//! WAV goes through hound; compressed formats (mp3, m4a, ogg, flac)
//! go through symphonia.

use anyhow::{Context, Result};
use hound::WavReader;
use std::path::Path;

/// Load an audio file as mono samples at `target_rate`.
pub fn load_audio_file(path: &Path, target_rate: u32) -> Result<Vec<f32>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "wav" => load_wav(path, target_rate),
        "mp3" | "m4a" | "ogg" | "flac" => load_with_symphonia(path, target_rate),
        _ => anyhow::bail!("unsupported audio format: {:?}", path),
    }
}

/// Encode mono f32 samples as 16-bit PCM WAV bytes.
///
/// Used for handing window audio to subprocess tools that expect a file
/// payload.
pub fn samples_to_wav_bytes(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    use std::io::Cursor;

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer.write_sample(sample_i16)?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

fn fold_to_mono(samples: Vec<f32>, channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples;
    }
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

fn load_wav(path: &Path, target_rate: u32) -> Result<Vec<f32>> {
    let reader = WavReader::open(path).context("failed to open WAV file")?;

    let spec = reader.spec();
    let sample_rate = spec.sample_rate;
    let channels = spec.channels as usize;

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .filter_map(|s| s.ok())
            .collect(),
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .filter_map(|s| s.ok())
                .map(|s| s as f32 / max_val)
                .collect()
        }
    };

    let mono = fold_to_mono(samples, channels);
    crate::resampling::resample(&mono, sample_rate, target_rate)
}

/// Decode a compressed file with symphonia.
fn load_with_symphonia(path: &Path, target_rate: u32) -> Result<Vec<f32>> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::DecoderOptions;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let file = std::fs::File::open(path).context("failed to open audio file")?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let probed = symphonia::default::get_probe().format(
        &Hint::new(),
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format.default_track().context("no audio track found")?;
    let sample_rate = track
        .codec_params
        .sample_rate
        .context("unknown sample rate")?;
    let channels = track
        .codec_params
        .channels
        .context("unknown channel count")?
        .count();

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();
    while let Ok(packet) = format.next_packet() {
        let decoded = decoder.decode(&packet)?;
        let spec = *decoded.spec();

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    let mono = fold_to_mono(samples, channels);
    crate::resampling::resample(&mono, sample_rate, target_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_bytes_round_trip() {
        let samples: Vec<f32> = (0..1600).map(|i| (i as f32 * 0.1).sin() * 0.4).collect();
        let bytes = samples_to_wav_bytes(&samples, 16_000).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        std::fs::write(&path, &bytes).unwrap();

        let loaded = load_audio_file(&path, 16_000).unwrap();
        assert_eq!(loaded.len(), samples.len());
        // 16-bit quantization loses a little precision
        for (a, b) in loaded.iter().zip(&samples) {
            assert!((a - b).abs() < 0.001);
        }
    }

    #[test]
    fn unsupported_extension_is_an_error() {
        assert!(load_audio_file(Path::new("notes.txt"), 16_000).is_err());
    }

    #[test]
    fn stereo_wav_folds_to_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");

        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..100 {
            writer.write_sample(16384i16).unwrap(); // left = 0.5
            writer.write_sample(0i16).unwrap(); // right = 0.0
        }
        writer.finalize().unwrap();

        let loaded = load_audio_file(&path, 16_000).unwrap();
        assert_eq!(loaded.len(), 100);
        assert!((loaded[0] - 0.25).abs() < 0.01);
    }
}
