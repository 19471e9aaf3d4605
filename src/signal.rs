//! # Noiseless NRZ/OOK symbol stream generation
//!
//! The [`random_symbols`] function draws independent, equiprobable OOK symbols; the [`generate`]
//! function oversamples such a symbol stream into a rectangular-pulse [`SignalTrace`]; and the
//! [`samples_per_symbol`] function checks that a sample rate and a baud rate are related by an
//! integer oversampling factor.
//!
//! # Examples
//!
//! ```
//! use eyesim::signal;
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let mut rng = StdRng::seed_from_u64(1);
//! let sps = signal::samples_per_symbol(100e9, 10e9)?;
//! let trace = signal::generate(64, sps, 10e9, &mut rng)?;
//! assert_eq!(trace.samples.len(), 640);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{eye, Error, Symbol};

/// Relative tolerance within which a floating-point ratio is accepted as an integer
pub(crate) const INTEGER_RATIO_TOL: f64 = 1e-9;

/// Enumeration of supported modulation formats
#[derive(Clone, Eq, Hash, PartialEq, Debug, Copy, Default, Deserialize, Serialize)]
pub enum ModulationFormat {
    /// On-off keying (two levels, `0` and `1`)
    #[default]
    Ook,
}

impl ModulationFormat {
    /// Returns the number of amplitude levels used by the format.
    #[must_use]
    pub fn data_levels(self) -> usize {
        match self {
            ModulationFormat::Ook => 2,
        }
    }
}

impl FromStr for ModulationFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ook" => Ok(ModulationFormat::Ook),
            _ => Err(Error::InvalidParameter(format!(
                "Unsupported modulation format: {s}"
            ))),
        }
    }
}

impl std::fmt::Display for ModulationFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModulationFormat::Ook => write!(f, "OOK"),
        }
    }
}

/// Oversampled symbol stream at a fixed sample rate
#[derive(Clone, PartialEq, Debug)]
pub struct SignalTrace {
    /// Sample rate (Hz)
    pub sample_rate: f64,
    /// Symbol rate (Bd)
    pub baud_rate: f64,
    /// Number of symbols in the trace
    pub symbol_count: usize,
    /// Number of samples per symbol period
    pub samples_per_symbol: usize,
    /// Sample values (`symbol_count * samples_per_symbol` of them)
    pub samples: Vec<f64>,
}

impl SignalTrace {
    /// Returns the sample instants `k / sample_rate` for every sample of the trace.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn time_axis(&self) -> Vec<f64> {
        (0 .. self.samples.len())
            .map(|k| k as f64 / self.sample_rate)
            .collect()
    }

    /// Returns a trace with the same timing but different sample values.
    ///
    /// # Errors
    ///
    /// Returns an error if `samples.len()` differs from the length of this trace.
    pub fn with_samples(&self, samples: Vec<f64>) -> Result<Self, Error> {
        if samples.len() != self.samples.len() {
            return Err(Error::InvalidParameter(format!(
                "Expected {} samples (found {})",
                self.samples.len(),
                samples.len()
            )));
        }
        Ok(Self {
            samples,
            ..self.clone()
        })
    }
}

/// Returns the integer oversampling factor relating a sample rate to a baud rate.
///
/// # Parameters
///
/// - `sample_rate`: Sample rate (Hz).
///
/// - `baud_rate`: Symbol rate (Bd).
///
/// # Returns
///
/// - `samples_per_symbol`: `sample_rate / baud_rate`.
///
/// # Errors
///
/// Returns an error if either rate is not a positive finite number, or if their ratio is not a
/// positive integer.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn samples_per_symbol(sample_rate: f64, baud_rate: f64) -> Result<usize, Error> {
    check_positive_rate("Sample rate", sample_rate)?;
    check_positive_rate("Baud rate", baud_rate)?;
    let ratio = sample_rate / baud_rate;
    let rounded = ratio.round();
    if rounded < 1.0 || (ratio - rounded).abs() > INTEGER_RATIO_TOL * rounded {
        return Err(Error::InvalidParameter(format!(
            "Sample rate {sample_rate} Hz is not an integer multiple of baud rate {baud_rate} Bd"
        )));
    }
    Ok(rounded as usize)
}

/// Returns given number of random OOK symbols.
///
/// # Parameters
///
/// - `num_symbols`: Number of random symbols to be generated.
///
/// - `rng`: Random number generator to be used.
///
/// # Returns
///
/// - `symbols`: Independent symbols, each equally likely to be `Zero` or `One`.
pub fn random_symbols<R: Rng>(num_symbols: usize, rng: &mut R) -> Vec<Symbol> {
    (0 .. num_symbols)
        .map(|_| {
            if rng.random_bool(0.5) {
                Symbol::One
            } else {
                Symbol::Zero
            }
        })
        .collect()
}

/// Returns oversampled samples of given symbols, with each symbol held for a full period.
///
/// # Parameters
///
/// - `symbols`: Symbols to be oversampled.
///
/// - `samples_per_symbol`: Number of times each symbol level is repeated.
///
/// # Returns
///
/// - `samples`: Rectangular (NRZ) waveform of length `symbols.len() * samples_per_symbol`.
#[must_use]
pub fn oversample(symbols: &[Symbol], samples_per_symbol: usize) -> Vec<f64> {
    symbols
        .iter()
        .flat_map(|s| std::iter::repeat(s.level()).take(samples_per_symbol))
        .collect()
}

/// Returns a noiseless oversampled OOK trace.
///
/// # Parameters
///
/// - `symbol_count`: Number of symbols to be generated.
///
/// - `samples_per_symbol`: Oversampling factor.
///
/// - `baud_rate`: Symbol rate (Bd). The sample rate of the trace is
///   `baud_rate * samples_per_symbol`.
///
/// - `rng`: Random number generator to be used.
///
/// # Returns
///
/// - `trace`: Trace of `symbol_count * samples_per_symbol` samples.
///
/// # Errors
///
/// Returns an error if `symbol_count` or `samples_per_symbol` is `0`, or if `baud_rate` is not a
/// positive finite number.
#[allow(clippy::cast_precision_loss)]
pub fn generate<R: Rng>(
    symbol_count: usize,
    samples_per_symbol: usize,
    baud_rate: f64,
    rng: &mut R,
) -> Result<SignalTrace, Error> {
    if symbol_count == 0 {
        return Err(Error::InvalidParameter(
            "Number of symbols must be a positive integer".to_string(),
        ));
    }
    if samples_per_symbol == 0 {
        return Err(Error::InvalidParameter(
            "Number of samples per symbol must be a positive integer".to_string(),
        ));
    }
    check_positive_rate("Baud rate", baud_rate)?;
    let symbols = random_symbols(symbol_count, rng);
    Ok(SignalTrace {
        sample_rate: baud_rate * samples_per_symbol as f64,
        baud_rate,
        symbol_count,
        samples_per_symbol,
        samples: oversample(&symbols, samples_per_symbol),
    })
}

/// Returns a noiseless trace made of whole eye patterns, together with its eye time axis.
///
/// # Parameters
///
/// - `patterns`: Number of eye patterns (realizations) to be generated.
///
/// - `samples_per_symbol`: Oversampling factor.
///
/// - `eye_length`: Number of symbol periods per pattern.
///
/// - `baud_rate`: Symbol rate (Bd).
///
/// - `rng`: Random number generator to be used.
///
/// # Returns
///
/// - `time_axis`: Intra-pattern sample instants, restarting at `0` for every pattern.
///
/// - `trace`: Trace of `patterns * eye_length` symbols.
///
/// # Errors
///
/// Returns an error if any count is `0` or if `baud_rate` is not a positive finite number.
pub fn generate_eye_patterns<R: Rng>(
    patterns: usize,
    samples_per_symbol: usize,
    eye_length: usize,
    baud_rate: f64,
    rng: &mut R,
) -> Result<(Vec<f64>, SignalTrace), Error> {
    if patterns == 0 || eye_length == 0 {
        return Err(Error::InvalidParameter(
            "Number of patterns and eye length must be positive integers".to_string(),
        ));
    }
    let trace = generate(patterns * eye_length, samples_per_symbol, baud_rate, rng)?;
    let time_axis = eye::time_axis(samples_per_symbol * eye_length, trace.sample_rate, patterns);
    Ok((time_axis, trace))
}

/// Checks that a rate is a positive finite number.
fn check_positive_rate(name: &str, rate: f64) -> Result<(), Error> {
    if rate.is_finite() && rate > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidParameter(format!(
            "{name} must be a positive number (found {rate})"
        )))
    }
}
