//! # Statistical analysis of eye amplitudes
//!
//! The [`histogram`] function bins amplitude samples; the [`fit_bimodal`] function fits a sum of
//! Gaussians to such a histogram by Levenberg-Marquardt least squares; the
//! [`remove_transition_samples`] function discards samples near symbol boundaries so that only
//! settled levels are fitted; and the [`estimate_ber`] function turns the fitted levels into a
//! bit-error rate.
//!
//! # Examples
//!
//! ```
//! use eyesim::analysis;
//!
//! let centers: Vec<f64> = (0 .. 200).map(|k| -0.5 + 0.01 * f64::from(k)).collect();
//! let counts: Vec<f64> = centers
//!     .iter()
//!     .map(|&x| analysis::multi_gauss(x, &[0.0, 0.1, 500.0, 1.0, 0.1, 500.0]))
//!     .collect();
//! let fit = analysis::fit_bimodal(&centers, &counts, &[0.1, 0.12, 400.0, 0.9, 0.09, 550.0])?;
//! let ber = analysis::estimate_ber(&fit)?;
//! assert!((ber - analysis::q_factor(&fit).map(eyesim::theory::q_function)?).abs() < 1e-15);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::f64::consts::PI;
use std::ops::Range;

use itertools::Itertools;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{theory, Error};

/// Rise-time/bandwidth product of a first-order system (10-90 % rise time times bandwidth)
pub const RISE_TIME_BANDWIDTH_PRODUCT: f64 = 0.35;

/// Amplitude histogram with fixed-width bins
#[derive(Clone, PartialEq, Debug)]
pub struct AmplitudeHistogram {
    /// Center of each bin
    pub bin_centers: Vec<f64>,
    /// Number of samples in each bin
    pub bin_counts: Vec<u64>,
    /// Width of every bin
    pub bin_width: f64,
}

impl AmplitudeHistogram {
    /// Returns the bin counts as floating-point values (for fitting).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn counts_as_f64(&self) -> Vec<f64> {
        self.bin_counts.iter().map(|&c| c as f64).collect()
    }
}

/// One Gaussian component `amplitude * exp(-(x - mean)^2 / (2 * sigma^2))`
#[derive(Clone, PartialEq, Debug, Copy, Deserialize, Serialize)]
pub struct GaussianComponent {
    /// Center
    pub mean: f64,
    /// Width (always reported non-negative)
    pub sigma: f64,
    /// Peak height
    pub amplitude: f64,
}

/// Result of a sum-of-Gaussians fit
#[derive(Clone, PartialEq, Debug)]
pub struct BimodalFitResult {
    /// Fitted components, in increasing order of mean
    pub components: Vec<GaussianComponent>,
    /// Fitted model evaluated at the bin centers
    pub fitted_curve: Vec<f64>,
    /// Sum of squared residuals at the solution
    pub cost: f64,
    /// Number of solver iterations taken
    pub iterations: usize,
}

/// Options for the Levenberg-Marquardt solver
#[derive(Clone, PartialEq, Debug, Copy)]
pub struct FitOptions {
    /// Maximum number of iterations
    pub max_iterations: usize,
    /// Relative cost reduction below which the fit is taken to have converged
    pub ftol: f64,
    /// Relative step size below which the fit is taken to have converged
    pub xtol: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            ftol: 1.49e-8,
            xtol: 1.49e-8,
        }
    }
}

/// Returns value of a single Gaussian with given mean, width and peak height at `x`.
#[must_use]
pub fn gauss(x: f64, mean: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mean) * (x - mean) / (2.0 * sigma * sigma)).exp()
}

/// Returns value of a sum of Gaussians at `x`.
///
/// # Parameters
///
/// - `x`: Point at which the sum is evaluated.
///
/// - `params`: Consecutive `(mean, sigma, amplitude)` triples, one per Gaussian. Trailing values
///   not forming a whole triple are ignored.
#[must_use]
pub fn multi_gauss(x: f64, params: &[f64]) -> f64 {
    params
        .chunks_exact(3)
        .map(|p| gauss(x, p[0], p[1], p[2]))
        .sum()
}

/// Returns histogram of samples over `bin_count` equal-width bins spanning their range.
///
/// The last bin includes its right edge. If all samples are equal, the range is widened to
/// `[value - 0.5, value + 0.5]`.
///
/// # Errors
///
/// Returns an error if `samples` is empty or if `bin_count` is `0`.
#[allow(clippy::cast_precision_loss)]
pub fn histogram(samples: &[f64], bin_count: usize) -> Result<AmplitudeHistogram, Error> {
    if samples.is_empty() {
        return Err(Error::MissingSignal);
    }
    if bin_count == 0 {
        return Err(Error::InvalidParameter(
            "Number of bins must be a positive integer".to_string(),
        ));
    }
    let (lo, hi) = value_range(samples);
    let mut bin_counts = vec![0; bin_count];
    for &x in samples {
        bin_counts[bin_index(x, lo, hi, bin_count)] += 1;
    }
    let bin_width = (hi - lo) / bin_count as f64;
    Ok(AmplitudeHistogram {
        bin_centers: (0 .. bin_count)
            .map(|k| lo + bin_width * (k as f64 + 0.5))
            .collect(),
        bin_counts,
        bin_width,
    })
}

/// Returns the fitted sum of Gaussians for a histogram, using default solver options.
///
/// # Parameters
///
/// - `bin_centers`: Histogram bin centers.
///
/// - `bin_counts`: Histogram counts, paired with `bin_centers`.
///
/// - `initial_guess`: Consecutive `(mean, sigma, amplitude)` triples, one per Gaussian.
///
/// # Errors
///
/// Returns an error if the inputs are inconsistent (see [`fit_bimodal_with`]) or if the solver
/// does not converge.
pub fn fit_bimodal(
    bin_centers: &[f64],
    bin_counts: &[f64],
    initial_guess: &[f64],
) -> Result<BimodalFitResult, Error> {
    fit_bimodal_with(bin_centers, bin_counts, initial_guess, &FitOptions::default())
}

/// Returns the fitted sum of Gaussians for a histogram.
///
/// # Parameters
///
/// - `bin_centers`: Histogram bin centers.
///
/// - `bin_counts`: Histogram counts, paired with `bin_centers`.
///
/// - `initial_guess`: Consecutive `(mean, sigma, amplitude)` triples, one per Gaussian.
///
/// - `options`: Solver options.
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] if `bin_centers` and `bin_counts` differ in length, if
/// `initial_guess` is empty or not made of whole triples, or if there are fewer bins than
/// parameters. Returns [`Error::FitDidNotConverge`], carrying `initial_guess`, if the model is not
/// finite at the initial guess, if no step reducing the cost can be found, or if
/// `options.max_iterations` is reached.
pub fn fit_bimodal_with(
    bin_centers: &[f64],
    bin_counts: &[f64],
    initial_guess: &[f64],
    options: &FitOptions,
) -> Result<BimodalFitResult, Error> {
    check_fit_inputs(bin_centers, bin_counts, initial_guess)?;
    let fail = |reason: String| Error::FitDidNotConverge {
        initial_guess: initial_guess.to_vec(),
        reason,
    };
    let mut params = DVector::from_column_slice(initial_guess);
    let mut residuals = residual_vector(bin_centers, bin_counts, &params);
    let mut cost = residuals.norm_squared();
    if !cost.is_finite() {
        return Err(fail("model is not finite at initial guess".to_string()));
    }
    let mut lambda = 1e-3;
    for iteration in 1 ..= options.max_iterations {
        let jac = jacobian(bin_centers, &params);
        if jac.iter().any(|v| !v.is_finite()) {
            return Err(fail(format!(
                "Jacobian is not finite at iteration {iteration}"
            )));
        }
        let jtj = jac.tr_mul(&jac);
        let grad = jac.tr_mul(&residuals);
        if grad.amax() == 0.0 {
            return Ok(fit_result(bin_centers, &params, cost, iteration));
        }
        loop {
            let mut damped = jtj.clone();
            for i in 0 .. params.len() {
                damped[(i, i)] += lambda * jtj[(i, i)].max(f64::EPSILON);
            }
            let step = damped
                .cholesky()
                .map(|chol| chol.solve(&grad))
                .filter(|s| s.iter().all(|v| v.is_finite()));
            if let Some(step) = step {
                let small_step =
                    step.norm() <= options.xtol * (params.norm() + options.xtol);
                let candidate = &params + &step;
                let candidate_residuals = residual_vector(bin_centers, bin_counts, &candidate);
                let candidate_cost = candidate_residuals.norm_squared();
                if candidate_cost.is_finite() && candidate_cost < cost {
                    let converged = small_step || cost - candidate_cost <= options.ftol * cost;
                    params = candidate;
                    residuals = candidate_residuals;
                    cost = candidate_cost;
                    lambda = (lambda / 10.0).max(1e-15);
                    if converged {
                        debug!(iteration, cost, "fit converged");
                        return Ok(fit_result(bin_centers, &params, cost, iteration));
                    }
                    break;
                }
                if small_step {
                    debug!(iteration, cost, "fit converged (no further progress)");
                    return Ok(fit_result(bin_centers, &params, cost, iteration));
                }
            }
            lambda *= 10.0;
            if lambda > 1e20 {
                return Err(fail(format!(
                    "no cost-reducing step found at iteration {iteration}"
                )));
            }
        }
    }
    Err(fail(format!(
        "maximum of {} iterations reached",
        options.max_iterations
    )))
}

/// Returns initial `(mean, sigma, amplitude)` triples for a two-level fit of given samples.
///
/// The samples are split at the midpoint of their range; the mean and standard deviation of each
/// group give the center and width of its Gaussian, and its peak height is scaled to histogram
/// counts for bins of width `bin_width`.
///
/// # Errors
///
/// Returns an error if `bin_width` is not positive or if either group is empty.
#[allow(clippy::cast_precision_loss)]
pub fn bimodal_initial_guess(samples: &[f64], bin_width: f64) -> Result<Vec<f64>, Error> {
    if !(bin_width.is_finite() && bin_width > 0.0) {
        return Err(Error::InvalidParameter(format!(
            "Bin width must be a positive number (found {bin_width})"
        )));
    }
    if samples.is_empty() {
        return Err(Error::MissingSignal);
    }
    let (lo, hi) = value_range(samples);
    let threshold = 0.5 * (lo + hi);
    let (lower, upper): (Vec<f64>, Vec<f64>) = samples.iter().partition(|&&x| x < threshold);
    let mut guess = Vec::with_capacity(6);
    for group in [lower, upper] {
        if group.is_empty() {
            return Err(Error::InvalidParameter(
                "Samples do not populate two levels".to_string(),
            ));
        }
        let len = group.len() as f64;
        let mean = group.iter().sum::<f64>() / len;
        let std = (group.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / len).sqrt();
        let sigma = std.max(0.5 * bin_width);
        guess.extend([mean, sigma, len * bin_width / (sigma * (2.0 * PI).sqrt())]);
    }
    Ok(guess)
}

/// Sample-index windows around symbol boundaries, where the signal is in transition
#[derive(Clone, PartialEq, Debug)]
pub struct TransitionWindows {
    /// Excluded index range around each interior symbol boundary, in increasing order
    ranges: Vec<Range<usize>>,
}

impl TransitionWindows {
    /// Returns transition windows for a signal.
    ///
    /// # Parameters
    ///
    /// - `bandwidth`: Channel bandwidth (Hz). The transition time is
    ///   `RISE_TIME_BANDWIDTH_PRODUCT / bandwidth`.
    ///
    /// - `sampling_time`: Time between consecutive samples (s).
    ///
    /// - `baud_rate`: Symbol rate (Bd).
    ///
    /// - `symbol_count`: Number of symbols in the signal. A window of total width equal to the
    ///   transition time is centered on each of the `symbol_count - 1` interior boundaries.
    ///
    /// # Errors
    ///
    /// Returns an error if a rate or time is not a positive finite number, or if `symbol_count`
    /// is `0`.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn new(
        bandwidth: f64,
        sampling_time: f64,
        baud_rate: f64,
        symbol_count: usize,
    ) -> Result<Self, Error> {
        if !(bandwidth.is_finite() && bandwidth > 0.0) {
            return Err(Error::InvalidBandwidth(bandwidth));
        }
        for (name, value) in [("Sampling time", sampling_time), ("Baud rate", baud_rate)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::InvalidParameter(format!(
                    "{name} must be a positive number (found {value})"
                )));
            }
        }
        if symbol_count == 0 {
            return Err(Error::InvalidParameter(
                "Number of symbols must be a positive integer".to_string(),
            ));
        }
        let samples_per_symbol = 1.0 / (baud_rate * sampling_time);
        let half_width = transition_time(bandwidth) / (2.0 * sampling_time);
        if 2.0 * half_width >= samples_per_symbol {
            warn!(
                bandwidth,
                baud_rate, "transition windows are wider than a symbol period, only samples \
                outside the first and last boundaries will remain"
            );
        }
        let ranges = (1 .. symbol_count)
            .map(|k| {
                let center = k as f64 * samples_per_symbol;
                let start = (center - half_width).round().max(0.0) as usize;
                let end = (center + half_width).round().max(0.0) as usize;
                start .. end
            })
            .collect();
        Ok(Self { ranges })
    }

    /// Returns the excluded index ranges.
    #[must_use]
    pub fn ranges(&self) -> &[Range<usize>] {
        &self.ranges
    }

    /// Returns, for each of `len` samples, whether it lies outside every transition window.
    ///
    /// Sample indices and windows are both visited in increasing order, each exactly once.
    #[must_use]
    pub fn steady_state_mask(&self, len: usize) -> Vec<bool> {
        let mut mask = vec![true; len];
        let mut r = 0;
        for (i, keep) in mask.iter_mut().enumerate() {
            while r < self.ranges.len() && self.ranges[r].end <= i {
                r += 1;
            }
            if r == self.ranges.len() {
                break;
            }
            if self.ranges[r].start <= i {
                *keep = false;
            }
        }
        mask
    }

    /// Returns the samples lying outside every transition window.
    #[must_use]
    pub fn retain_steady_state(&self, signal: &[f64]) -> Vec<f64> {
        signal
            .iter()
            .zip(self.steady_state_mask(signal.len()))
            .filter_map(|(&x, keep)| keep.then_some(x))
            .collect()
    }
}

/// Returns the 10-90 % transition time of a channel of given bandwidth.
#[must_use]
pub fn transition_time(bandwidth: f64) -> f64 {
    RISE_TIME_BANDWIDTH_PRODUCT / bandwidth
}

/// Returns the samples of a signal lying outside the transition windows around symbol
/// boundaries.
///
/// # Parameters
///
/// - `signal`: Signal samples, the first sample being at the start of the first symbol.
///
/// - `bandwidth`: Channel bandwidth (Hz).
///
/// - `sampling_time`: Time between consecutive samples (s).
///
/// - `baud_rate`: Symbol rate (Bd).
///
/// - `symbol_count`: Number of symbols in the signal.
///
/// # Errors
///
/// Returns an error if `signal` is empty, if the window parameters are invalid (see
/// [`TransitionWindows::new`]), or if the windows leave no sample.
pub fn remove_transition_samples(
    signal: &[f64],
    bandwidth: f64,
    sampling_time: f64,
    baud_rate: f64,
    symbol_count: usize,
) -> Result<Vec<f64>, Error> {
    if signal.is_empty() {
        return Err(Error::MissingSignal);
    }
    let windows = TransitionWindows::new(bandwidth, sampling_time, baud_rate, symbol_count)?;
    let kept = windows.retain_steady_state(signal);
    if kept.is_empty() {
        return Err(Error::InvalidParameter(format!(
            "Transition time of {:e} s leaves no steady-state sample in a symbol period of {:e} s",
            transition_time(bandwidth),
            1.0 / baud_rate
        )));
    }
    Ok(kept)
}

/// Returns the Q factor `(mean_1 - mean_0) / (sigma_0 + sigma_1)` of a two-level fit.
///
/// # Errors
///
/// Returns an error if the fit does not have exactly two components, or if both widths are zero.
pub fn q_factor(fit: &BimodalFitResult) -> Result<f64, Error> {
    let [low, high] = fit.components.as_slice() else {
        return Err(Error::UnsupportedDataLevels(fit.components.len()));
    };
    let width = low.sigma + high.sigma;
    if width <= 0.0 {
        return Err(Error::InvalidParameter(
            "Fitted levels have zero width".to_string(),
        ));
    }
    Ok((high.mean - low.mean) / width)
}

/// Returns the bit-error rate `Q(q_factor)` implied by a two-level fit.
///
/// With the decision threshold placed where the two Gaussians are equally many standard
/// deviations away, each level is misread with probability `Q(q_factor)`.
///
/// # Errors
///
/// Returns an error if the fit does not have exactly two components, or if both widths are zero.
pub fn estimate_ber(fit: &BimodalFitResult) -> Result<f64, Error> {
    q_factor(fit).map(theory::q_function)
}

/// Returns `(min, max)` of values, widened to `[v - 0.5, v + 0.5]` if all values equal `v`.
pub(crate) fn value_range(values: &[f64]) -> (f64, f64) {
    let (lo, hi) = values
        .iter()
        .copied()
        .minmax_by(f64::total_cmp)
        .into_option()
        .unwrap_or((0.0, 1.0));
    if lo < hi {
        (lo, hi)
    } else {
        (lo - 0.5, hi + 0.5)
    }
}

/// Returns index of the bin containing `x`, for `bins` equal bins spanning `[lo, hi]`.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub(crate) fn bin_index(x: f64, lo: f64, hi: f64, bins: usize) -> usize {
    let width = (hi - lo) / bins as f64;
    if width <= 0.0 {
        return 0;
    }
    (((x - lo) / width).floor().max(0.0) as usize).min(bins - 1)
}

/// Returns the `bins + 1` edges of equal bins spanning `[lo, hi]`.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn bin_edges(lo: f64, hi: f64, bins: usize) -> Vec<f64> {
    let width = (hi - lo) / bins as f64;
    (0 ..= bins).map(|k| lo + width * k as f64).collect()
}

/// Checks validity of fit inputs.
fn check_fit_inputs(
    bin_centers: &[f64],
    bin_counts: &[f64],
    initial_guess: &[f64],
) -> Result<(), Error> {
    if bin_centers.len() != bin_counts.len() {
        return Err(Error::InvalidParameter(format!(
            "Expected as many bin counts as bin centers ({}), found {}",
            bin_centers.len(),
            bin_counts.len()
        )));
    }
    if initial_guess.is_empty() || initial_guess.len() % 3 != 0 {
        return Err(Error::InvalidParameter(format!(
            "Initial guess must be a non-empty list of (mean, sigma, amplitude) triples, found {} \
             values",
            initial_guess.len()
        )));
    }
    if bin_centers.len() < initial_guess.len() {
        return Err(Error::InvalidParameter(format!(
            "Cannot fit {} parameters to {} bins",
            initial_guess.len(),
            bin_centers.len()
        )));
    }
    Ok(())
}

/// Returns the residuals `y - model(x)`.
fn residual_vector(x: &[f64], y: &[f64], params: &DVector<f64>) -> DVector<f64> {
    let p = params.as_slice();
    DVector::from_iterator(
        x.len(),
        x.iter().zip(y).map(|(&xi, &yi)| yi - multi_gauss(xi, p)),
    )
}

/// Returns the Jacobian of the model with respect to its parameters.
fn jacobian(x: &[f64], params: &DVector<f64>) -> DMatrix<f64> {
    let mut jac = DMatrix::zeros(x.len(), params.len());
    for (row, &xi) in x.iter().enumerate() {
        for (g, p) in params.as_slice().chunks_exact(3).enumerate() {
            let (mean, sigma, amplitude) = (p[0], p[1], p[2]);
            let dx = xi - mean;
            let e = (-dx * dx / (2.0 * sigma * sigma)).exp();
            jac[(row, 3 * g)] = amplitude * e * dx / (sigma * sigma);
            jac[(row, 3 * g + 1)] = amplitude * e * dx * dx / (sigma * sigma * sigma);
            jac[(row, 3 * g + 2)] = e;
        }
    }
    jac
}

/// Returns fit result for final parameters.
fn fit_result(x: &[f64], params: &DVector<f64>, cost: f64, iterations: usize) -> BimodalFitResult {
    let p = params.as_slice();
    let mut components: Vec<GaussianComponent> = p
        .chunks_exact(3)
        .map(|c| GaussianComponent {
            mean: c[0],
            sigma: c[1].abs(),
            amplitude: c[2],
        })
        .collect();
    components.sort_by(|a, b| a.mean.total_cmp(&b.mean));
    BimodalFitResult {
        components,
        fitted_curve: x.iter().map(|&xi| multi_gauss(xi, p)).collect(),
        cost,
        iterations,
    }
}

#[cfg(test)]
mod tests_of_functions {
    use float_eq::assert_float_eq;
    use rand::{rngs::StdRng, SeedableRng};
    use rand_distr::{Distribution, Normal};

    use super::*;

    fn synthetic_histogram(truth: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let centers: Vec<f64> = (0 .. 200).map(|k| -0.5 + 0.01 * f64::from(k)).collect();
        let counts = centers.iter().map(|&x| multi_gauss(x, truth)).collect();
        (centers, counts)
    }

    #[test]
    fn test_gauss() {
        assert_float_eq!(gauss(1.0, 1.0, 0.5, 3.0), 3.0, abs <= 1e-12);
        assert_float_eq!(gauss(1.5, 1.0, 0.5, 3.0), 3.0 * (-0.5f64).exp(), rmax <= 1e-12);
        assert_float_eq!(
            multi_gauss(0.0, &[0.0, 1.0, 2.0, 1.0, 1.0, 4.0, 9.9]),
            2.0 + 4.0 * (-0.5f64).exp(),
            rmax <= 1e-12
        );
    }

    #[test]
    fn test_histogram() {
        // Invalid input
        assert!(matches!(histogram(&[], 10), Err(Error::MissingSignal)));
        assert!(histogram(&[1.0], 0).is_err());
        // Valid input
        let hist = histogram(&[0.0, 0.1, 0.2, 0.9, 1.0, 1.0], 4).unwrap();
        assert_eq!(hist.bin_counts, [3, 0, 0, 3]);
        assert_float_eq!(hist.bin_width, 0.25, abs <= 1e-12);
        assert_float_eq!(
            hist.bin_centers,
            vec![0.125, 0.375, 0.625, 0.875],
            abs_all <= 1e-12
        );
        assert_float_eq!(hist.counts_as_f64(), vec![3.0, 0.0, 0.0, 3.0], abs_all <= 1e-12);
        // Degenerate range
        let hist = histogram(&[2.0; 5], 2).unwrap();
        assert_eq!(hist.bin_counts, [0, 5]);
        assert_float_eq!(hist.bin_centers, vec![1.75, 2.25], abs_all <= 1e-12);
    }

    #[test]
    fn test_fit_bimodal_recovers_parameters() {
        let truth = [0.0, 0.1, 1000.0, 1.0, 0.12, 800.0];
        let (centers, counts) = synthetic_histogram(&truth);
        let guess = [0.05, 0.12, 850.0, 0.9, 0.1, 950.0];
        let fit = fit_bimodal(&centers, &counts, &guess).unwrap();
        assert_eq!(fit.components.len(), 2);
        let recovered: Vec<f64> = fit
            .components
            .iter()
            .flat_map(|c| [c.mean, c.sigma, c.amplitude])
            .collect();
        assert_float_eq!(recovered[0], 0.0, abs <= 1e-3);
        for (&r, &t) in recovered.iter().zip(&truth).skip(1) {
            assert_float_eq!(r, t, rmax <= 0.01);
        }
        assert_eq!(fit.fitted_curve.len(), centers.len());
        assert_float_eq!(fit.fitted_curve, counts, abs_all <= 1e-3);
    }

    #[test]
    fn test_fit_bimodal_sorts_components_and_reports_positive_sigma() {
        let truth = [0.0, 0.1, 500.0, 1.0, 0.1, 500.0];
        let (centers, counts) = synthetic_histogram(&truth);
        let fit = fit_bimodal(&centers, &counts, &[1.1, -0.09, 450.0, -0.1, 0.11, 520.0]).unwrap();
        assert!(fit.components[0].mean < fit.components[1].mean);
        assert!(fit.components.iter().all(|c| c.sigma > 0.0));
        assert_float_eq!(fit.components[1].sigma, 0.1, rmax <= 0.01);
    }

    #[test]
    fn test_fit_bimodal_noisy_histogram() {
        let mut rng = StdRng::seed_from_u64(71);
        let low = Normal::new(0.0, 0.1).unwrap();
        let high = Normal::new(1.0, 0.1).unwrap();
        let samples: Vec<f64> = (0 .. 50_000)
            .flat_map(|_| [low.sample(&mut rng), high.sample(&mut rng)])
            .collect();
        let hist = histogram(&samples, 100).unwrap();
        let guess = bimodal_initial_guess(&samples, hist.bin_width).unwrap();
        let fit = fit_bimodal(&hist.bin_centers, &hist.counts_as_f64(), &guess).unwrap();
        assert_float_eq!(fit.components[0].mean, 0.0, abs <= 0.01);
        assert_float_eq!(fit.components[1].mean, 1.0, abs <= 0.01);
        assert_float_eq!(fit.components[0].sigma, 0.1, rmax <= 0.03);
        assert_float_eq!(fit.components[1].sigma, 0.1, rmax <= 0.03);
    }

    #[test]
    fn test_fit_bimodal_errors() {
        let (centers, counts) = synthetic_histogram(&[0.0, 0.1, 1000.0, 1.0, 0.1, 1000.0]);
        // Invalid input
        assert!(matches!(
            fit_bimodal(&centers, &counts[1 ..], &[0.0, 0.1, 1.0]),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            fit_bimodal(&centers, &counts, &[]),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            fit_bimodal(&centers, &counts, &[0.0, 0.1]),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            fit_bimodal(&centers[.. 2], &counts[.. 2], &[0.0, 0.1, 1.0]),
            Err(Error::InvalidParameter(_))
        ));
        // Solver failure carries the initial guess
        let guess = [0.3, 0.3, 100.0, 0.7, 0.3, 100.0];
        let options = FitOptions {
            max_iterations: 1,
            ..FitOptions::default()
        };
        match fit_bimodal_with(&centers, &counts, &guess, &options) {
            Err(Error::FitDidNotConverge { initial_guess, .. }) => {
                assert_float_eq!(initial_guess, guess.to_vec(), abs_all <= 1e-12);
            }
            other => panic!("expected FitDidNotConverge, found {other:?}"),
        }
        assert!(matches!(
            fit_bimodal(&centers, &counts, &[0.0, 0.0, 1000.0, 1.0, 0.1, 1000.0]),
            Err(Error::FitDidNotConverge { .. })
        ));
    }

    #[test]
    fn test_bimodal_initial_guess() {
        assert!(bimodal_initial_guess(&[0.0, 1.0], 0.0).is_err());
        assert!(matches!(
            bimodal_initial_guess(&[], 0.1),
            Err(Error::MissingSignal)
        ));
        let guess = bimodal_initial_guess(&[0.0, 0.2, 0.8, 1.0], 0.1).unwrap();
        assert_eq!(guess.len(), 6);
        assert_float_eq!(guess[0], 0.1, abs <= 1e-12);
        assert_float_eq!(guess[1], 0.1, abs <= 1e-12);
        assert_float_eq!(guess[3], 0.9, abs <= 1e-12);
        assert_float_eq!(guess[2], 0.2 / (0.1 * (2.0 * PI).sqrt()), rmax <= 1e-12);
    }

    #[test]
    fn test_transition_windows() {
        // Invalid input
        assert!(matches!(
            TransitionWindows::new(0.0, 1e-11, 1e9, 10),
            Err(Error::InvalidBandwidth(_))
        ));
        assert!(TransitionWindows::new(3.5e9, 0.0, 1e9, 10).is_err());
        assert!(TransitionWindows::new(3.5e9, 1e-11, -1e9, 10).is_err());
        assert!(TransitionWindows::new(3.5e9, 1e-11, 1e9, 0).is_err());
        // Valid input
        let windows = TransitionWindows::new(3.5e9, 1e-11, 1e9, 4).unwrap();
        assert_eq!(windows.ranges(), [95 .. 105, 195 .. 205, 295 .. 305]);
        assert!(TransitionWindows::new(3.5e9, 1e-11, 1e9, 1)
            .unwrap()
            .ranges()
            .is_empty());
    }

    #[test]
    fn test_steady_state_mask() {
        let windows = TransitionWindows {
            ranges: vec![2 .. 4, 3 .. 6, 9 .. 12],
        };
        let mask = windows.steady_state_mask(11);
        assert_eq!(
            mask,
            [true, true, false, false, false, false, true, true, true, false, false]
        );
        assert!(windows.steady_state_mask(0).is_empty());
    }

    #[test]
    fn test_transition_time() {
        assert_float_eq!(transition_time(3.5e9), 1e-10, rmax <= 1e-12);
    }

    #[test]
    fn test_remove_transition_samples() {
        let symbol_count = 50;
        let signal: Vec<f64> = (0 .. 5000).map(f64::from).collect();
        assert!(matches!(
            remove_transition_samples(&[], 3.5e9, 1e-11, 1e9, symbol_count),
            Err(Error::MissingSignal)
        ));
        let kept = remove_transition_samples(&signal, 3.5e9, 1e-11, 1e9, symbol_count).unwrap();
        // 49 interior boundaries, each excluding a 0.1 ns (10-sample) window
        assert_eq!(kept.len(), 5000 - 49 * 10);
        for &x in &kept {
            let boundary = (x / 100.0).round();
            let in_window = (1.0 ..= 49.0).contains(&boundary)
                && x >= 100.0 * boundary - 5.0
                && x < 100.0 * boundary + 5.0;
            assert!(!in_window, "sample {x} lies in a transition window");
        }
        assert_float_eq!(kept[0 .. 3].to_vec(), vec![0.0, 1.0, 2.0], abs_all <= 1e-12);
        assert!(kept.contains(&4999.0));
        // Windows wider than a symbol period leave only the samples outside the outer boundaries
        let kept = remove_transition_samples(&signal, 0.35e9, 1e-11, 1e9, symbol_count).unwrap();
        assert_eq!(kept.len(), 100);
        assert!(matches!(
            remove_transition_samples(&signal, 0.175e9, 1e-11, 1e9, symbol_count),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_q_factor_and_estimate_ber() {
        let fit = |components: Vec<GaussianComponent>| BimodalFitResult {
            components,
            fitted_curve: Vec::new(),
            cost: 0.0,
            iterations: 0,
        };
        let level = |mean, sigma| GaussianComponent {
            mean,
            sigma,
            amplitude: 1.0,
        };
        assert!(matches!(
            q_factor(&fit(vec![level(0.0, 0.1)])),
            Err(Error::UnsupportedDataLevels(1))
        ));
        assert!(q_factor(&fit(vec![level(0.0, 0.0), level(1.0, 0.0)])).is_err());
        let two = fit(vec![level(0.0, 0.1), level(1.0, 0.15)]);
        assert_float_eq!(q_factor(&two).unwrap(), 4.0, rmax <= 1e-12);
        assert_float_eq!(
            estimate_ber(&two).unwrap(),
            theory::q_function(4.0),
            rmax <= 1e-12
        );
        // Matches the closed form when the noise std is 0.5 / sqrt(snr)
        let snr = 10.0f64;
        let sigma = 0.5 / snr.sqrt();
        let matched = fit(vec![level(0.0, sigma), level(1.0, sigma)]);
        assert_float_eq!(
            estimate_ber(&matched).unwrap(),
            theory::binary_ber(snr),
            rmax <= 1e-6
        );
    }

    #[test]
    fn test_value_range_and_bins() {
        assert_eq!(value_range(&[3.0, -1.0, 2.0]), (-1.0, 3.0));
        assert_eq!(value_range(&[1.0]), (0.5, 1.5));
        assert_eq!(bin_index(0.0, 0.0, 1.0, 4), 0);
        assert_eq!(bin_index(0.26, 0.0, 1.0, 4), 1);
        assert_eq!(bin_index(1.0, 0.0, 1.0, 4), 3);
        assert_eq!(bin_index(-5.0, 0.0, 1.0, 4), 0);
        assert_float_eq!(bin_edges(0.0, 1.0, 2), vec![0.0, 0.5, 1.0], abs_all <= 1e-12);
    }
}
