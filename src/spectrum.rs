//! Power spectrogram and frequency-band helpers.
//!
//! The comping engine needs only a modest slice of spectral analysis: a
//! framed power spectrogram to measure sibilance band ratios. Frames are
//! Hann-windowed and centered with constant (zero) padding.

use crate::fft::RealFftPlan;
use crate::window;
use ndarray::Array2;

/// Compute a power spectrogram of shape (n_freq, n_frames) where
/// `n_freq = n_fft / 2 + 1`.
///
/// # Errors
/// Returns an error for empty audio or zero-sized FFT/hop parameters.
pub fn power_spectrogram(y: &[f32], n_fft: usize, hop_length: usize) -> crate::Result<Array2<f32>> {
    if y.is_empty() {
        return Err(crate::Error::EmptyAudio);
    }
    if n_fft == 0 {
        return Err(crate::Error::InvalidSize {
            name: "n_fft",
            value: 0,
            reason: "must be > 0",
        });
    }
    if hop_length == 0 {
        return Err(crate::Error::InvalidSize {
            name: "hop_length",
            value: 0,
            reason: "must be > 0",
        });
    }

    let win = window::hann(n_fft);
    let pad = n_fft / 2;
    let mut padded = vec![0.0f32; y.len() + 2 * pad];
    padded[pad..pad + y.len()].copy_from_slice(y);

    let n_frames = (padded.len() - n_fft) / hop_length + 1;
    let n_freq = n_fft / 2 + 1;
    let plan = RealFftPlan::new(n_fft);

    let frame_powers: Vec<Vec<f32>> = {
        let compute = |frame: usize| -> Vec<f32> {
            let start = frame * hop_length;
            let windowed: Vec<f32> = padded[start..start + n_fft]
                .iter()
                .zip(win.iter())
                .map(|(s, w)| s * w)
                .collect();
            plan.forward(&windowed)
                .iter()
                .map(|c| c.norm_sqr())
                .collect()
        };

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            (0..n_frames).into_par_iter().map(compute).collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            (0..n_frames).map(compute).collect()
        }
    };

    let mut spec = Array2::<f32>::zeros((n_freq, n_frames));
    for (frame, power) in frame_powers.iter().enumerate() {
        for (f, &p) in power.iter().enumerate() {
            spec[(f, frame)] = p;
        }
    }
    Ok(spec)
}

/// Center frequencies of the FFT bins for a given sample rate.
pub fn fft_frequencies(sr: u32, n_fft: usize) -> Vec<f32> {
    let n_freq = n_fft / 2 + 1;
    (0..n_freq)
        .map(|i| i as f32 * sr as f32 / n_fft as f32)
        .collect()
}

/// Mean power over all bins inside `[lo_hz, hi_hz]`, averaged across frames.
/// Returns `None` when no bin falls inside the band.
pub fn band_power(spec: &Array2<f32>, freqs: &[f32], lo_hz: f32, hi_hz: f32) -> Option<f32> {
    let (n_freq, n_frames) = (spec.shape()[0], spec.shape()[1]);
    if n_frames == 0 || n_freq == 0 || n_freq != freqs.len() {
        return None;
    }
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for (f, &hz) in freqs.iter().enumerate() {
        if hz < lo_hz || hz > hi_hz {
            continue;
        }
        for t in 0..n_frames {
            sum += spec[(f, t)] as f64;
            count += 1;
        }
    }
    if count == 0 {
        None
    } else {
        Some((sum / count as f64) as f32)
    }
}
