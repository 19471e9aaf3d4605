//! # Additive white Gaussian noise referenced to the measured signal power
//!
//! The [`NoiseProfile`] of a signal holds its power (sample variance) and the standard deviation
//! of the noise that yields a given SNR with respect to that power. The [`inject`] function draws
//! a fresh, independent noise realization for the whole signal and adds it.
//!
//! A profile is never rescaled in place: a new reference signal or a new SNR means a new call to
//! [`NoiseProfile::new`] (or [`inject`]), which recomputes the power and redraws all of the noise.
//!
//! # Examples
//!
//! ```
//! use eyesim::noise;
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let signal = [0.0, 1.0, 1.0, 0.0, 1.0, 0.0];
//! let mut rng = StdRng::seed_from_u64(1);
//! let (profile, noisy) = noise::inject(&signal, 20.0, &mut rng)?;
//! assert!((profile.signal_power - 0.25).abs() < 1e-12);
//! assert_eq!(noisy.len(), signal.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Error;

/// Noise parameters derived from a reference signal and an SNR
#[derive(Clone, PartialEq, Debug, Copy, Deserialize, Serialize)]
pub struct NoiseProfile {
    /// Signal-to-noise ratio (dB)
    pub snr_db: f64,
    /// Signal-to-noise ratio (linear)
    pub linear_snr: f64,
    /// Signal power, i.e., mean squared deviation of the signal from its mean
    pub signal_power: f64,
    /// Standard deviation of the noise samples
    pub noise_std: f64,
}

impl NoiseProfile {
    /// Returns noise profile for given reference signal and SNR.
    ///
    /// # Parameters
    ///
    /// - `signal`: Reference signal whose power defines the `0 dB` noise level.
    ///
    /// - `snr_db`: Signal-to-noise ratio (dB).
    ///
    /// # Errors
    ///
    /// Returns an error if `signal` is empty or if `snr_db` is not finite.
    pub fn new(signal: &[f64], snr_db: f64) -> Result<Self, Error> {
        if signal.is_empty() {
            return Err(Error::MissingSignal);
        }
        if !snr_db.is_finite() {
            return Err(Error::InvalidParameter(format!(
                "SNR must be a finite number of dB (found {snr_db})"
            )));
        }
        let signal_power = signal_power(signal);
        let linear_snr = db_to_linear(snr_db);
        let noise_std = (signal_power / linear_snr).sqrt();
        debug!(signal_power, snr_db, noise_std, "noise profile");
        Ok(Self {
            snr_db,
            linear_snr,
            signal_power,
            noise_std,
        })
    }

    /// Returns noise power (variance of the noise samples).
    #[must_use]
    pub fn noise_power(&self) -> f64 {
        self.noise_std * self.noise_std
    }

    /// Returns given number of independent noise samples for this profile.
    pub fn noise<R: Rng>(&self, num_samples: usize, rng: &mut R) -> Vec<f64> {
        (0 .. num_samples)
            .map(|_| self.noise_std * rng.sample::<f64, _>(StandardNormal))
            .collect()
    }
}

/// Returns linear value of a quantity given in decibels.
#[must_use]
pub fn db_to_linear(value_db: f64) -> f64 {
    10f64.powf(0.1 * value_db)
}

/// Returns the power of a signal, i.e., the mean squared deviation from its mean.
///
/// # Parameters
///
/// - `signal`: Signal samples. An empty signal has zero power.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn signal_power(signal: &[f64]) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }
    let len = signal.len() as f64;
    let mean = signal.iter().sum::<f64>() / len;
    signal.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / len
}

/// Returns noise profile and noisy signal for given signal and SNR.
///
/// # Parameters
///
/// - `signal`: Signal to which noise must be added. Its power is the reference for `snr_db`.
///
/// - `snr_db`: Signal-to-noise ratio (dB).
///
/// - `rng`: Random number generator to be used.
///
/// # Returns
///
/// - `profile`: Noise profile computed from `signal` and `snr_db`.
///
/// - `noisy`: `signal` plus independent zero-mean Gaussian noise of standard deviation
///   `profile.noise_std`.
///
/// # Errors
///
/// Returns an error if `signal` is empty or if `snr_db` is not finite.
pub fn inject<R: Rng>(
    signal: &[f64],
    snr_db: f64,
    rng: &mut R,
) -> Result<(NoiseProfile, Vec<f64>), Error> {
    let profile = NoiseProfile::new(signal, snr_db)?;
    let noisy = signal
        .iter()
        .zip(profile.noise(signal.len(), rng))
        .map(|(x, n)| x + n)
        .collect();
    Ok((profile, noisy))
}

#[cfg(test)]
mod tests_of_functions {
    use float_eq::assert_float_eq;
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    fn alternating_signal(len: usize) -> Vec<f64> {
        (0 .. len).map(|k| if k % 2 == 0 { 0.0 } else { 1.0 }).collect()
    }

    #[test]
    fn test_db_to_linear() {
        assert_float_eq!(db_to_linear(0.0), 1.0, abs <= 1e-12);
        assert_float_eq!(db_to_linear(10.0), 10.0, rmax <= 1e-12);
        assert_float_eq!(db_to_linear(-20.0), 0.01, rmax <= 1e-12);
    }

    #[test]
    fn test_signal_power() {
        assert_float_eq!(signal_power(&[]), 0.0, abs <= 1e-12);
        assert_float_eq!(signal_power(&[3.0; 10]), 0.0, abs <= 1e-12);
        assert_float_eq!(signal_power(&alternating_signal(100)), 0.25, abs <= 1e-12);
        assert_float_eq!(signal_power(&[1.0, 2.0, 3.0, 4.0]), 1.25, abs <= 1e-12);
    }

    #[test]
    fn test_noise_profile() {
        // Invalid input
        assert!(matches!(NoiseProfile::new(&[], 10.0), Err(Error::MissingSignal)));
        assert!(NoiseProfile::new(&[0.0, 1.0], f64::NAN).is_err());
        // Valid input
        let profile = NoiseProfile::new(&alternating_signal(10), 10.0).unwrap();
        assert_float_eq!(profile.signal_power, 0.25, abs <= 1e-12);
        assert_float_eq!(profile.linear_snr, 10.0, rmax <= 1e-12);
        assert_float_eq!(profile.noise_std, 0.025f64.sqrt(), rmax <= 1e-12);
        assert_float_eq!(profile.noise_power(), 0.025, rmax <= 1e-12);
    }

    #[test]
    fn test_inject() {
        let mut rng = StdRng::seed_from_u64(23);
        assert!(matches!(inject(&[], 10.0, &mut rng), Err(Error::MissingSignal)));
        let signal = alternating_signal(100_000);
        let (profile, noisy) = inject(&signal, 6.0, &mut rng).unwrap();
        assert_eq!(noisy.len(), signal.len());
        let noise: Vec<f64> = noisy.iter().zip(&signal).map(|(y, x)| y - x).collect();
        let noise_mean = noise.iter().sum::<f64>() / 100_000.0;
        assert!(noise_mean.abs() < 0.01);
        assert_float_eq!(signal_power(&noise), profile.noise_power(), rmax <= 0.02);
    }

    #[test]
    fn test_noise_power_halves_per_3_db() {
        let signal = alternating_signal(200_000);
        let mut rng = StdRng::seed_from_u64(29);
        let (_, noisy_low) = inject(&signal, 10.0, &mut rng).unwrap();
        let (_, noisy_high) = inject(&signal, 10.0 + 10.0 * 2f64.log10(), &mut rng).unwrap();
        let var = |noisy: &[f64]| {
            let noise: Vec<f64> = noisy.iter().zip(&signal).map(|(y, x)| y - x).collect();
            signal_power(&noise)
        };
        assert_float_eq!(var(&noisy_high) / var(&noisy_low), 0.5, rmax <= 0.05);
    }

    #[test]
    fn test_inject_draws_fresh_noise() {
        let signal = alternating_signal(1000);
        let mut rng = StdRng::seed_from_u64(31);
        let (_, first) = inject(&signal, 10.0, &mut rng).unwrap();
        let (_, second) = inject(&signal, 10.0, &mut rng).unwrap();
        assert_ne!(first, second);
        let (_, replay) = inject(&signal, 10.0, &mut StdRng::seed_from_u64(31)).unwrap();
        assert_eq!(first, replay);
    }

    #[test]
    fn test_constant_signal_gets_no_noise() {
        let mut rng = StdRng::seed_from_u64(37);
        let (profile, noisy) = inject(&[0.5; 16], 10.0, &mut rng).unwrap();
        assert_float_eq!(profile.noise_std, 0.0, abs <= 1e-12);
        assert_float_eq!(noisy, vec![0.5; 16], abs_all <= 1e-12);
    }
}
