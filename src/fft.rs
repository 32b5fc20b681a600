use num_complex::Complex32;
use realfft::{RealFftPlanner, RealToComplex};
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Cached forward FFT plan for complex input of arbitrary length.
///
/// Used for spectra of short feature contours (e.g. the vibrato cents
/// contour) whose length is not a power of two.
pub struct FftPlan {
    forward: Arc<dyn Fft<f32>>,
}

impl FftPlan {
    /// Create a plan for transforms of length `len`.
    pub fn new(len: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            forward: planner.plan_fft_forward(len),
        }
    }

    /// Perform the forward FFT in place.
    pub fn forward(&self, buffer: &mut [Complex32]) {
        self.forward.process(buffer);
    }
}

/// Cached real-to-complex FFT plan for analysis frames.
///
/// Returns only the non-redundant half of the spectrum
/// (`len / 2 + 1` bins).
pub struct RealFftPlan {
    plan: Arc<dyn RealToComplex<f32>>,
    len: usize,
}

impl RealFftPlan {
    /// Create a plan for real input frames of length `len`.
    pub fn new(len: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        Self {
            plan: planner.plan_fft_forward(len),
            len,
        }
    }

    /// Transform length this plan was built for.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the plan length is zero.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Forward transform of a real frame. Input shorter than the plan
    /// length is zero-padded; longer input is truncated.
    pub fn forward(&self, input: &[f32]) -> Vec<Complex32> {
        let mut buf = vec![0.0f32; self.len];
        let n = input.len().min(self.len);
        buf[..n].copy_from_slice(&input[..n]);
        let mut out = vec![Complex32::new(0.0, 0.0); self.len / 2 + 1];
        if self.plan.process(&mut buf, &mut out).is_err() {
            out.fill(Complex32::new(0.0, 0.0));
        }
        out
    }
}
