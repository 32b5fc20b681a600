//! Audio file I/O.
//!
//! Takes are decoded with symphonia (WAV, FLAC, MP3, Vorbis, AAC),
//! downmixed to mono by channel averaging, and brought to the engine's
//! processing sample rate with a sinc resampler. Output WAVs are written
//! as 16-bit PCM.

use hound::{SampleFormat, WavSpec, WavWriter};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("hound error: {0}")]
    Hound(#[from] hound::Error),
    #[error("symphonia error: {0}")]
    Symphonia(SymphoniaError),
    #[error("no audio track found")]
    NoAudioTrack,
    #[error("unsupported number of channels")]
    UnsupportedChannels,
    #[error("resampling error: {0}")]
    Resample(String),
}

impl From<SymphoniaError> for AudioError {
    fn from(err: SymphoniaError) -> Self {
        Self::Symphonia(err)
    }
}

/// Decode an audio file to mono f32 at `target_sr`.
///
/// Multi-channel sources are averaged down to one channel before
/// resampling. The decoded duration is whatever the container holds; the
/// comping pipeline treats one file as one whole-phrase take.
///
/// # Errors
/// Returns `crate::Error::Audio` when the file cannot be decoded or has no
/// audio track.
pub fn load_take<P: AsRef<Path>>(path: P, target_sr: u32) -> crate::Result<Vec<f32>> {
    let (samples, sr, channels) = decode(path.as_ref())?;

    let mono = downmix(&samples, channels);
    if sr == target_sr {
        return Ok(mono);
    }
    Ok(resample(&mono, sr, target_sr).map_err(crate::Error::Audio)?)
}

fn decode(path: &Path) -> crate::Result<(Vec<f32>, u32, usize)> {
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let file = std::fs::File::open(path)
        .map_err(|e| AudioError::Symphonia(SymphoniaError::IoError(e)))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(AudioError::Symphonia)?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.sample_rate.is_some())
        .ok_or(AudioError::NoAudioTrack)?
        .clone();

    let sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(0);
    if channels == 0 || sample_rate == 0 {
        return Err(AudioError::UnsupportedChannels.into());
    }

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(AudioError::Symphonia)?;

    let mut samples: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(SymphoniaError::IoError(_)) => break,
            Err(e) => return Err(AudioError::from(e).into()),
        };

        if packet.track_id() != track.id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(audio) => audio,
            Err(SymphoniaError::IoError(_)) => break,
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(AudioError::from(e).into()),
        };

        let mut sb = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        sb.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sb.samples());
    }

    Ok((samples, sample_rate, channels))
}

fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    let frames = interleaved.len() / channels;
    let mut mono = Vec::with_capacity(frames);
    for frame in 0..frames {
        let mut acc = 0.0f32;
        for ch in 0..channels {
            acc += interleaved[frame * channels + ch];
        }
        mono.push(acc / channels as f32);
    }
    mono
}

/// Sinc resampling of a mono signal.
pub fn resample(y: &[f32], src_sr: u32, dst_sr: u32) -> Result<Vec<f32>, AudioError> {
    if src_sr == dst_sr || y.is_empty() {
        return Ok(y.to_vec());
    }

    let resample_ratio = dst_sr as f64 / src_sr as f64;
    let chunk_size = 1024usize;
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(resample_ratio, 2.0, params, chunk_size, 1)
        .map_err(|e| AudioError::Resample(e.to_string()))?;

    let mut output: Vec<f32> = Vec::new();
    let mut offset = 0usize;
    while offset < y.len() {
        let end = (offset + chunk_size).min(y.len());
        let mut buf = vec![0.0f32; chunk_size];
        buf[..end - offset].copy_from_slice(&y[offset..end]);

        let chunk_out = resampler
            .process(&[buf], None)
            .map_err(|e| AudioError::Resample(e.to_string()))?;
        output.extend_from_slice(&chunk_out[0]);
        offset = end;
    }

    let expected = (y.len() as f64 * resample_ratio).round() as usize;
    output.truncate(expected);
    Ok(output)
}

/// Write a mono waveform to a 16-bit PCM WAV file. Samples are clamped to
/// [-1, 1] before quantization.
pub fn save_wav<P: AsRef<Path>>(path: P, y: &[f32], sample_rate: u32) -> crate::Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).map_err(AudioError::Hound)?;
    for &s in y {
        let sample = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(sample).map_err(AudioError::Hound)?;
    }
    writer.finalize().map_err(AudioError::Hound)?;
    Ok(())
}

/// Convert a dBFS level to a linear gain.
pub fn db_to_linear(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// Scale `y` so its peak sits at `target_dbfs`. Silence is returned
/// unchanged rather than amplified to infinity.
pub fn peak_normalize(y: &[f32], target_dbfs: f32) -> Vec<f32> {
    let peak = y.iter().fold(0.0f32, |a, &b| a.max(b.abs()));
    if peak <= 0.0 {
        return y.to_vec();
    }
    let gain = db_to_linear(target_dbfs) / peak;
    y.iter().map(|&s| s * gain).collect()
}
