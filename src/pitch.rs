//! Fundamental-frequency tracking for vocal takes.
//!
//! A YIN-style estimator (difference function, cumulative mean
//! normalization, absolute threshold with parabolic refinement) produces a
//! per-frame `(f0, periodicity)` series. This is the default backend behind
//! [`crate::feature::FeatureProvider`]; callers with a heavier external
//! pitch extractor can supply their own series through the same trait.

/// Frames with cumulative-mean-normalized difference below this are
/// considered confidently periodic.
const YIN_THRESHOLD: f32 = 0.15;

/// Frames whose periodicity falls below this have their f0 masked to 0.0
/// (kept unvoiced), matching how downstream statistics treat silence.
const VOICING_MASK: f32 = 0.5;

/// A per-frame pitch/confidence series for one waveform.
///
/// `f0[i]` is the estimated fundamental in Hz (0.0 when unvoiced) and
/// `periodicity[i]` is a confidence in [0, 1]. Frame timestamps are spread
/// evenly over the source duration, so the series can be sliced by time
/// without knowing the tracker's hop.
#[derive(Debug, Clone, Default)]
pub struct PitchTrack {
    /// Fundamental frequency per frame in Hz; 0.0 marks unvoiced frames.
    pub f0: Vec<f32>,
    /// Periodicity/confidence per frame in [0, 1].
    pub periodicity: Vec<f32>,
}

impl PitchTrack {
    /// Number of frames.
    pub fn len(&self) -> usize {
        self.f0.len()
    }

    /// Whether the track has no frames.
    pub fn is_empty(&self) -> bool {
        self.f0.is_empty()
    }

    /// Frame timestamps spread evenly over `[0, duration_s)`.
    pub fn times(&self, duration_s: f32) -> Vec<f32> {
        let n = self.f0.len();
        if n == 0 {
            return Vec::new();
        }
        let step = duration_s / n as f32;
        (0..n).map(|i| i as f32 * step).collect()
    }

    /// Restrict the track to frames whose timestamp falls inside
    /// `[start_s, end_s]`, given the duration of the source waveform.
    /// Used in pass 2: takes are tracked once and sliced per segment.
    pub fn slice(&self, start_s: f32, end_s: f32, duration_s: f32) -> PitchTrack {
        let times = self.times(duration_s);
        let mut f0 = Vec::new();
        let mut pd = Vec::new();
        for (i, &t) in times.iter().enumerate() {
            if t >= start_s && t <= end_s {
                f0.push(self.f0[i]);
                pd.push(self.periodicity[i]);
            }
        }
        PitchTrack {
            f0,
            periodicity: pd,
        }
    }
}

/// Track pitch over `y` with YIN.
///
/// `frame_length` frames advance by `hop` samples; candidates are searched
/// in the lag range implied by `[fmin, fmax]`. Signals shorter than one
/// frame yield an empty track (a degenerate-signal condition, not an
/// error — downstream statistics fall back to neutral values).
pub fn track(y: &[f32], sr: u32, frame_length: usize, hop: usize, fmin: f32, fmax: f32) -> PitchTrack {
    if y.len() < frame_length || frame_length == 0 || hop == 0 || sr == 0 {
        return PitchTrack::default();
    }
    let fmin = fmin.max(1.0);
    let fmax = fmax.max(fmin + 1.0);

    let tau_min = ((sr as f32 / fmax).floor() as usize).max(2);
    let tau_max = ((sr as f32 / fmin).ceil() as usize).min(frame_length / 2);
    if tau_min >= tau_max {
        return PitchTrack::default();
    }

    let n_frames = (y.len() - frame_length) / hop + 1;
    let mut f0 = Vec::with_capacity(n_frames);
    let mut periodicity = Vec::with_capacity(n_frames);

    let mut diff = vec![0.0f32; tau_max + 1];
    let mut cmnd = vec![0.0f32; tau_max + 1];

    for frame_idx in 0..n_frames {
        let frame = &y[frame_idx * hop..frame_idx * hop + frame_length];
        let half = frame_length / 2;

        // Difference function d(tau) over the first half of the frame.
        for (tau, d) in diff.iter_mut().enumerate().take(tau_max + 1) {
            if tau == 0 {
                *d = 0.0;
                continue;
            }
            let mut acc = 0.0f32;
            for j in 0..half {
                let delta = frame[j] - frame[j + tau];
                acc += delta * delta;
            }
            *d = acc;
        }

        // Cumulative mean normalized difference.
        cmnd[0] = 1.0;
        let mut running = 0.0f32;
        for tau in 1..=tau_max {
            running += diff[tau];
            cmnd[tau] = if running > 0.0 {
                diff[tau] * tau as f32 / running
            } else {
                1.0
            };
        }

        // First dip under the threshold, descended to its local minimum;
        // otherwise the global minimum in range.
        let mut best_tau = 0usize;
        for tau in tau_min..tau_max {
            if cmnd[tau] < YIN_THRESHOLD {
                let mut t = tau;
                while t + 1 < tau_max && cmnd[t + 1] < cmnd[t] {
                    t += 1;
                }
                best_tau = t;
                break;
            }
        }
        if best_tau == 0 {
            let mut min_tau = tau_min;
            for tau in tau_min..tau_max {
                if cmnd[tau] < cmnd[min_tau] {
                    min_tau = tau;
                }
            }
            best_tau = min_tau;
        }

        // Parabolic interpolation around the chosen lag.
        let refined = if best_tau > tau_min && best_tau + 1 < tau_max {
            let s0 = cmnd[best_tau - 1];
            let s1 = cmnd[best_tau];
            let s2 = cmnd[best_tau + 1];
            let denom = s0 + s2 - 2.0 * s1;
            if denom.abs() > 1e-12 {
                best_tau as f32 + 0.5 * (s0 - s2) / denom
            } else {
                best_tau as f32
            }
        } else {
            best_tau as f32
        };

        let pd = (1.0 - cmnd[best_tau]).clamp(0.0, 1.0);
        let hz = if refined > 0.0 { sr as f32 / refined } else { 0.0 };
        f0.push(if pd >= VOICING_MASK { hz } else { 0.0 });
        periodicity.push(pd);
    }

    PitchTrack { f0, periodicity }
}
