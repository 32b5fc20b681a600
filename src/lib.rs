//! vocomp — vocal take comping engine.
//!
//! Given several recorded takes of the same sung phrase, vocomp scores
//! each take for accuracy (pitch, noise, sibilance, clipping) and
//! expressiveness (vibrato, dynamics, timing), segments the best take at
//! low-energy valleys, picks a winner per segment across all takes, and
//! stitches the winners back into one comped waveform with
//! boundary-centered crossfades.
//!
//! The high-level entry points are [`comp::run_comping`] for the full
//! file-to-file pipeline and [`comp::comp_phrase`] for pre-loaded audio:
//!
//! ```no_run
//! use vocomp::{comp, CompConfig};
//!
//! let config = CompConfig::with_alpha_pct(60);
//! let artifacts = comp::run_comping(
//!     "data/singer01/phrase02",
//!     "outputs/singer01-phrase02",
//!     "singer01/phrase02",
//!     Some(92.0),
//!     &config,
//! )?;
//! println!("comp written to {}", artifacts.comped_wav.display());
//! # Ok::<(), vocomp::Error>(())
//! ```
//!
//! A learned pairwise ranker ([`ranker`]) can replace the heuristic
//! accuracy ordering once enough scored phrases exist to train on.
//!
//! Enable the `parallel` cargo feature to spread spectral analysis across
//! cores with rayon.

#![forbid(unsafe_code)]

pub mod comp;
pub mod compmap;
pub mod config;
mod error;
pub mod feature;
pub mod files;
pub mod fft;
pub mod io;
pub mod pitch;
pub mod ranker;
pub mod scoring;
pub mod segment;
pub mod spectrum;
pub mod stitch;
pub mod table;
pub mod window;

pub use comp::{comp_phrase, run_comping, CompArtifacts, CompOutcome, Take};
pub use compmap::{build_comp_map, CompMap, CompMapSegment, TakeScore};
pub use config::{AccuracyWeights, CompConfig, EmotionWeights, StitchMode};
pub use error::{Error, Result};
pub use feature::{FeatureProvider, FeatureRow, RawFeatures, SpectralFeatureProvider};
pub use scoring::{score_row, Score, ScoredRow};
pub use segment::{segment_reference, Segment};
pub use stitch::{stitch, stitch_concat, stitch_with_mode};
