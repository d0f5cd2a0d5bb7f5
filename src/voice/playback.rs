//! Audio playback to speakers
//!
//! The output device is acquired fresh for every play call and released
//! when it returns, so one `AudioPlayback` can be shared by the chimes and
//! the speech output. Playback blocks until the samples are drained.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, StreamConfig};

use crate::{Error, Result};

/// Decoded mono audio
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Plays audio to an output device
pub struct AudioPlayback {
    device_name: Option<String>,
}

impl AudioPlayback {
    /// Create a playback instance for the named device, or the default one
    ///
    /// # Errors
    ///
    /// Returns error if the device cannot be found
    pub fn new(device_name: Option<&str>) -> Result<Self> {
        let device = select_output_device(device_name)?;

        tracing::debug!(
            device = %device.name().unwrap_or_default(),
            "audio playback initialized"
        );

        Ok(Self {
            device_name: device_name.map(ToString::to_string),
        })
    }

    /// Play mono f32 samples recorded at `sample_rate`
    ///
    /// # Errors
    ///
    /// Returns error if playback fails
    pub fn play(&self, samples: Vec<f32>, sample_rate: u32) -> Result<()> {
        self.play_samples_blocking(samples, sample_rate)
    }

    /// Play audio from MP3 bytes
    ///
    /// # Errors
    ///
    /// Returns error if decoding or playback fails
    pub fn play_mp3(&self, mp3_data: &[u8]) -> Result<()> {
        let audio = decode_mp3(mp3_data)?;
        self.play_samples_blocking(audio.samples, audio.sample_rate)
    }

    /// Play an MP3 or WAV file, chosen by extension
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, decoded or played
    pub fn play_file(&self, path: &Path) -> Result<()> {
        let is_wav = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("wav"));

        let audio = if is_wav {
            decode_wav_file(path)?
        } else {
            decode_mp3(&std::fs::read(path)?)?
        };

        tracing::debug!(path = %path.display(), "playing file");
        self.play_samples_blocking(audio.samples, audio.sample_rate)
    }

    /// Play samples in a blocking manner
    fn play_samples_blocking(&self, samples: Vec<f32>, sample_rate: u32) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let device = select_output_device(self.device_name.as_deref())?;
        let (config, samples) = output_config_for(&device, samples, sample_rate)?;
        let rate = config.sample_rate.0;
        let channels = usize::from(config.channels);

        let sample_count = samples.len();
        let samples = Arc::new(samples);
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let stream = {
            let samples = Arc::clone(&samples);
            let position = Arc::clone(&position);
            let finished = Arc::clone(&finished);

            device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let mut pos = position.load(Ordering::Relaxed);

                        for frame in data.chunks_mut(channels) {
                            let sample = samples.get(pos).copied().unwrap_or_else(|| {
                                finished.store(true, Ordering::Release);
                                0.0
                            });
                            frame.fill(sample);

                            if pos < samples.len() {
                                pos += 1;
                            }
                        }

                        position.store(pos, Ordering::Relaxed);
                    },
                    |err| {
                        tracing::error!(error = %err, "audio playback error");
                    },
                    None,
                )
                .map_err(|e| Error::Audio(e.to_string()))?
        };

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        let duration_ms = (sample_count as u64 * 1000) / u64::from(rate);
        let start = Instant::now();
        let timeout = Duration::from_millis(duration_ms + 500);

        while !finished.load(Ordering::Acquire) {
            if start.elapsed() > timeout {
                tracing::warn!("playback did not drain before timeout");
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        // Let the device flush its last buffer
        std::thread::sleep(Duration::from_millis(100));

        drop(stream);
        tracing::debug!(samples = sample_count, sample_rate = rate, "playback complete");

        Ok(())
    }
}

/// Find an output device by name, falling back to the default device
///
/// # Errors
///
/// Returns error if the named device does not exist or there is no default
pub fn select_output_device(name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();

    let Some(name) = name else {
        return host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()));
    };

    host.output_devices()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|d| d.name().is_ok_and(|n| n == name))
        .ok_or_else(|| Error::Audio(format!("output device not found: {name}")))
}

/// Pick a stream config for `sample_rate`, resampling when the device
/// cannot run at that rate
fn output_config_for(
    device: &Device,
    samples: Vec<f32>,
    sample_rate: u32,
) -> Result<(StreamConfig, Vec<f32>)> {
    let rate = SampleRate(sample_rate);
    let supports = |channels: u16| {
        device.supported_output_configs().ok().and_then(|mut configs| {
            configs.find(|c| {
                c.channels() == channels && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
            })
        })
    };

    if let Some(supported) = supports(1).or_else(|| supports(2)) {
        return Ok((supported.with_sample_rate(rate).config(), samples));
    }

    let default = device
        .default_output_config()
        .map_err(|e| Error::Audio(format!("no suitable output config found: {e}")))?;
    let config = default.config();
    let resampled = resample(&samples, sample_rate, config.sample_rate.0)?;

    tracing::debug!(
        from = sample_rate,
        to = config.sample_rate.0,
        "resampled audio for output device"
    );

    Ok((config, resampled))
}

/// Resample mono audio using rubato
///
/// # Errors
///
/// Returns error if the resampler cannot be built or fails
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::cast_sign_loss)]
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let chunk_size = 1024;
    let sub_chunks = 2;

    let mut resampler =
        FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, chunk_size, sub_chunks, 1)
            .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

    let input: Vec<f64> = samples.iter().map(|&s| f64::from(s)).collect();
    let mut output = Vec::with_capacity(samples.len() * to_rate as usize / from_rate as usize + 1);

    for chunk in input.chunks(chunk_size) {
        let mut block = chunk.to_vec();
        block.resize(chunk_size, 0.0);
        let result = resampler
            .process(&[block], None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        output.extend_from_slice(&result[0]);
    }

    let expected = (samples.len() as f64 * f64::from(to_rate) / f64::from(from_rate)).ceil() as usize;
    output.truncate(expected);

    Ok(output.iter().map(|&s| s as f32).collect())
}

/// Decode MP3 bytes to mono f32 samples
///
/// # Errors
///
/// Returns error if the data is not valid MP3
pub fn decode_mp3(mp3_data: &[u8]) -> Result<DecodedAudio> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = None;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                #[allow(clippy::cast_sign_loss)]
                let frame_rate = frame.sample_rate as u32;
                sample_rate.get_or_insert(frame_rate);

                if frame.channels == 2 {
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    let sample_rate =
        sample_rate.ok_or_else(|| Error::Audio("MP3 contained no audio frames".to_string()))?;

    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

/// Decode a WAV file to mono f32 samples
///
/// # Errors
///
/// Returns error if the file cannot be opened or decoded
pub fn decode_wav_file(path: &Path) -> Result<DecodedAudio> {
    let reader = hound::WavReader::open(path)
        .map_err(|e| Error::Audio(format!("failed to open {}: {e}", path.display())))?;
    decode_wav(reader)
}

/// Decode WAV data from any reader to mono f32 samples
///
/// # Errors
///
/// Returns error if the data is not valid WAV
#[allow(clippy::cast_precision_loss)]
pub fn decode_wav<R: std::io::Read>(reader: hound::WavReader<R>) -> Result<DecodedAudio> {
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Audio(e.to_string()))?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::Audio(e.to_string()))?
        }
    };

    let samples = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();

    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_wav_downmixes_stereo() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..4 {
                writer.write_sample(16384_i16).unwrap();
                writer.write_sample(0_i16).unwrap();
            }
            writer.finalize().unwrap();
        }

        let reader = hound::WavReader::new(Cursor::new(cursor.into_inner())).unwrap();
        let audio = decode_wav(reader).unwrap();

        assert_eq!(audio.sample_rate, 8000);
        assert_eq!(audio.samples.len(), 4);
        assert!((audio.samples[0] - 0.25).abs() < 0.001);
    }

    #[test]
    fn test_decode_mp3_rejects_empty() {
        assert!(decode_mp3(&[]).is_err());
    }

    #[test]
    fn test_resample_same_rate_is_identity() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(resample(&samples, 16000, 16000).unwrap(), samples);
    }

    #[test]
    fn test_resample_length_follows_ratio() {
        let samples = vec![0.0_f32; 16000];
        let out = resample(&samples, 16000, 48000).unwrap();
        assert!(out.len() <= 48000);
        assert!(out.len() > 40000);
    }
}
