/// Compute a periodic Hann (raised cosine) window.
///
/// Used to taper analysis frames before the FFT in
/// [`crate::spectrum::power_spectrogram`].
pub fn hann(n: usize) -> Vec<f32> {
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![1.0];
    }
    let m = n as f32;
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / m).cos())
        .collect()
}
