//! This crate simulates a binary on-off-keying (OOK) link end to end and reduces it to an eye
//! diagram. A random non-return-to-zero symbol stream is oversampled, band-limited by a
//! zero-phase Butterworth low-pass filter, and corrupted by additive Gaussian noise. The noisy
//! waveform is then folded into symbol-aligned eye realizations (optionally displaced by random
//! timing jitter), histogrammed, and fitted with a sum of Gaussians so that an empirical bit-error
//! rate can be compared with the closed-form value for the same SNR.
//!
//! Every stage is a pure function over slices, and every stage that draws random numbers takes an
//! explicit random number generator. The [`sim`] module chains the stages together.
//!
//! # Examples
//!
//! ```
//! use eyesim::sim::{self, SimParams};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let params = SimParams {
//!     symbol_count: 2000,
//!     bandwidth: Some(7.5e9),
//!     snr_db: 15.0,
//!     ..SimParams::default()
//! };
//! let mut rng = StdRng::seed_from_u64(7);
//! let output = sim::run_simulation(&params, &mut rng)?;
//! assert_eq!(output.eye.time_axis.len(), output.eye.amplitude_axis.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(
    clippy::complexity,
    clippy::pedantic,
    clippy::perf,
    clippy::style,
    clippy::suspicious,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_allocation,
    unused_import_braces,
    unused_qualifications
)]

pub mod analysis;
mod common;
pub mod eye;
pub mod filter;
pub mod noise;
pub mod signal;
pub mod sim;
pub mod theory;

pub use common::{Error, Symbol};
pub use eye::EyeDiagram;
pub use filter::{FilterStatus, FilteredTrace};
pub use noise::NoiseProfile;
pub use signal::{ModulationFormat, SignalTrace};
pub use theory::TheoreticalEyeModel;
