//! Simulator chaining symbol generation, band-limiting, noise, eye sectioning and BER estimation
//!
//! [`run_simulation`] runs the whole pipeline for one set of [`SimParams`] and returns every
//! intermediate array in a [`SimOutput`], for a plotting collaborator to consume. [`run_sims`]
//! runs several parameter sets in parallel and saves one [`SimSummary`] per set to a JSON file.

use std::fs::File;
use std::io::BufWriter;

use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::analysis::{self, AmplitudeHistogram, BimodalFitResult, FitOptions, GaussianComponent};
use crate::theory::{TheoreticalEyeModel, TheoryConfig};
use crate::{
    eye, filter, noise, signal, Error, EyeDiagram, FilteredTrace, NoiseProfile, SignalTrace,
};

/// Parameters for eye-diagram simulation of an OOK link
#[derive(Clone, PartialEq, Debug, Copy, Deserialize, Serialize)]
pub struct SimParams {
    /// Number of symbols to be generated
    pub symbol_count: usize,
    /// Symbol rate (Bd)
    pub baud_rate: f64,
    /// Sample rate (Hz), an integer multiple of `baud_rate`
    pub sampling_rate: f64,
    /// Channel bandwidth (Hz)
    pub bandwidth: Option<f64>,
    /// Butterworth filter order
    pub filter_order: usize,
    /// Signal-to-noise ratio (dB)
    pub snr_db: f64,
    /// Number of symbol periods spanned by each eye realization
    pub eye_length: f64,
    /// Standard deviation (s) of the timing jitter of each eye realization
    pub jitter_time_std: Option<f64>,
    /// Number of amplitude histogram bins
    pub bin_count: usize,
    /// Whether the amplitude histogram is taken over the steady-state samples of the noisy trace
    /// (samples near symbol boundaries left out) instead of over the eye amplitudes
    pub remove_transitions: bool,
    /// Seed of the random number generator (drawn from the OS if `None`)
    pub random_seed: Option<u64>,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            symbol_count: 10_000,
            baud_rate: 10e9,
            sampling_rate: 160e9,
            bandwidth: Some(7.5e9),
            filter_order: filter::DEFAULT_FILTER_ORDER,
            snr_db: 15.0,
            eye_length: 2.0,
            jitter_time_std: None,
            bin_count: 100,
            remove_transitions: false,
            random_seed: None,
        }
    }
}

/// Scalar results of one simulation run
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct SimSummary {
    /// Simulation parameters
    pub params: SimParams,
    /// Number of samples per symbol period
    pub samples_per_symbol: usize,
    /// Reason the trace was passed through the filter unchanged, if it was
    pub filter_warning: Option<String>,
    /// Power of the noiseless (filtered) signal
    pub signal_power: f64,
    /// Standard deviation of the injected noise
    pub noise_std: f64,
    /// Number of eye realizations
    pub realization_count: usize,
    /// Closed-form bit-error rate for the SNR
    pub theoretical_ber: f64,
    /// Bit-error rate estimated from the amplitude histogram
    pub empirical_ber: Option<f64>,
    /// Q factor of the fitted levels
    pub q_factor: Option<f64>,
    /// Fitted Gaussian components, in increasing order of mean
    pub fit_components: Vec<GaussianComponent>,
    /// Reason the amplitude fit failed, if it did
    pub fit_failure: Option<String>,
}

/// Everything produced by one simulation run
#[derive(Clone, PartialEq, Debug)]
pub struct SimOutput {
    /// Noiseless, unfiltered trace
    pub trace: SignalTrace,
    /// Band-limited trace
    pub filtered: FilteredTrace,
    /// Noise parameters
    pub noise: NoiseProfile,
    /// Band-limited trace with noise
    pub noisy: SignalTrace,
    /// Eye diagram of the noisy trace
    pub eye: EyeDiagram,
    /// Amplitude histogram the levels were fitted to
    pub histogram: AmplitudeHistogram,
    /// Two-level fit of the histogram (`None` if the fit failed)
    pub fit: Option<BimodalFitResult>,
    /// Closed-form eye model for the SNR
    pub theory: TheoreticalEyeModel,
    /// Scalar results
    pub summary: SimSummary,
}

/// Runs simulation for one set of parameters.
///
/// # Parameters
///
/// - `params`: Simulation parameters. Its `random_seed` is not used; randomness comes from `rng`.
///
/// - `rng`: Random number generator to be used.
///
/// # Errors
///
/// Returns an error if `params` is invalid, if any stage fails, or if the amplitude fit does not
/// converge.
pub fn run_simulation<R: Rng>(params: &SimParams, rng: &mut R) -> Result<SimOutput, Error> {
    let (output, fit_error) = run_pipeline(params, &FitOptions::default(), rng)?;
    match fit_error {
        Some(err) => Err(err),
        None => Ok(output),
    }
}

/// Runs simulations for given parameters in parallel and saves summaries to a JSON file.
///
/// Run `index` uses a random number generator seeded with `random_seed + index`, or seeded from
/// the OS if `random_seed` is `None`. A run whose amplitude fit does not converge is logged and
/// kept, with `empirical_ber` set to `None` and the reason in `fit_failure`.
///
/// # Parameters
///
/// - `all_params`: Parameters for each simulation run.
///
/// - `json_filename`: Name of JSON file to which summaries must be saved.
///
/// # Errors
///
/// Returns an error if any parameter set is invalid, if any stage fails for a reason other than
/// non-convergence of the fit, or if the JSON file cannot be written.
pub fn run_sims(all_params: &[SimParams], json_filename: &str) -> Result<Vec<SimSummary>, Error> {
    run_sims_with(all_params, json_filename, &FitOptions::default())
}

/// Runs simulations with given fit options and saves summaries to a JSON file.
fn run_sims_with(
    all_params: &[SimParams],
    json_filename: &str,
    fit_options: &FitOptions,
) -> Result<Vec<SimSummary>, Error> {
    for params in all_params {
        check_sim_params(params)?;
    }
    let all_summaries = all_params
        .par_iter()
        .enumerate()
        .map(|(index, params)| {
            let mut rng = seeded_rng(params.random_seed, index);
            let (output, fit_error) = run_pipeline(params, fit_options, &mut rng)?;
            if let Some(err) = fit_error {
                warn!(snr_db = params.snr_db, "{err}");
            }
            Ok(output.summary)
        })
        .collect::<Result<Vec<SimSummary>, Error>>()?;
    let writer = BufWriter::new(File::create(json_filename)?);
    serde_json::to_writer_pretty(writer, &all_summaries)?;
    info!(json_filename, num_runs = all_summaries.len(), "saved results");
    Ok(all_summaries)
}

/// Returns random number generator for a run.
///
/// # Parameters
///
/// - `random_seed`: Base seed (the generator is seeded from the OS if `None`).
///
/// - `run_index`: Index of the run within a sweep, added to the base seed.
#[must_use]
pub fn seeded_rng(random_seed: Option<u64>, run_index: usize) -> StdRng {
    match random_seed {
        Some(seed) => StdRng::seed_from_u64(
            seed.wrapping_add(u64::try_from(run_index).unwrap_or(u64::MAX)),
        ),
        None => StdRng::from_os_rng(),
    }
}

/// Checks validity of simulation parameters.
///
/// # Errors
///
/// Returns [`Error::MissingParameter`] if `bandwidth` is unset, [`Error::InvalidBandwidth`] if it
/// is not positive, and [`Error::InvalidParameter`] for any other invalid parameter.
#[allow(clippy::cast_precision_loss)]
pub fn check_sim_params(params: &SimParams) -> Result<(), Error> {
    if params.symbol_count == 0 {
        return Err(Error::InvalidParameter(
            "Number of symbols must be a positive integer".to_string(),
        ));
    }
    signal::samples_per_symbol(params.sampling_rate, params.baud_rate)?;
    let bandwidth = params
        .bandwidth
        .ok_or_else(|| Error::MissingParameter("bandwidth".to_string()))?;
    if !(bandwidth.is_finite() && bandwidth > 0.0) {
        return Err(Error::InvalidBandwidth(bandwidth));
    }
    if params.filter_order == 0 || params.filter_order > filter::MAX_FILTER_ORDER {
        return Err(Error::InvalidParameter(format!(
            "Filter order must be between 1 and {} (found {})",
            filter::MAX_FILTER_ORDER,
            params.filter_order
        )));
    }
    if !params.snr_db.is_finite() {
        return Err(Error::InvalidParameter(format!(
            "SNR must be a finite number of dB (found {})",
            params.snr_db
        )));
    }
    if !(params.eye_length.is_finite() && params.eye_length > 0.0) {
        return Err(Error::InvalidParameter(format!(
            "Eye length must be a positive number of symbols (found {})",
            params.eye_length
        )));
    }
    if params.eye_length > params.symbol_count as f64 {
        return Err(Error::InvalidParameter(format!(
            "Eye length of {} symbols exceeds number of symbols ({})",
            params.eye_length, params.symbol_count
        )));
    }
    if let Some(std) = params.jitter_time_std {
        if !(std.is_finite() && std >= 0.0) {
            return Err(Error::InvalidParameter(format!(
                "Jitter standard deviation must be a non-negative number of seconds (found {std})"
            )));
        }
    }
    if params.bin_count < FIT_PARAM_COUNT {
        return Err(Error::InvalidParameter(format!(
            "Number of histogram bins must be at least {FIT_PARAM_COUNT} (found {})",
            params.bin_count
        )));
    }
    Ok(())
}

/// Number of parameters of a two-level Gaussian fit
const FIT_PARAM_COUNT: usize = 3 * 2;

/// Runs every stage, returning the output together with the error of a fit that did not converge.
fn run_pipeline<R: Rng>(
    params: &SimParams,
    fit_options: &FitOptions,
    rng: &mut R,
) -> Result<(SimOutput, Option<Error>), Error> {
    check_sim_params(params)?;
    let samples_per_symbol = signal::samples_per_symbol(params.sampling_rate, params.baud_rate)?;
    let trace = signal::generate(params.symbol_count, samples_per_symbol, params.baud_rate, rng)?;
    info!(num_samples = trace.samples.len(), "generated trace");
    let filtered = filter::apply_bandwidth(&trace, params.bandwidth, params.filter_order)?;
    let (noise, noisy_samples) = noise::inject(&filtered.trace.samples, params.snr_db, rng)?;
    let noisy = filtered.trace.with_samples(noisy_samples)?;
    info!(noise_std = noise.noise_std, "injected noise");
    let eye = eye::section(&noisy, params.eye_length, params.jitter_time_std, rng)?;
    info!(realization_count = eye.geometry.realization_count, "sectioned eye");
    let amplitudes = if params.remove_transitions {
        analysis::remove_transition_samples(
            &noisy.samples,
            filtered.bandwidth,
            1.0 / noisy.sample_rate,
            noisy.baud_rate,
            noisy.symbol_count,
        )?
    } else {
        eye.amplitude_axis.clone()
    };
    let histogram = analysis::histogram(&amplitudes, params.bin_count)?;
    let theory = TheoreticalEyeModel::new(TheoryConfig::binary(params.snr_db))?;
    let fit = match fit_levels(&amplitudes, &histogram, fit_options) {
        Err(err) if !matches!(err, Error::FitDidNotConverge { .. }) => return Err(err),
        fit => fit,
    };
    let (empirical_ber, q_factor) = match &fit {
        Ok(fit) => (
            Some(analysis::estimate_ber(fit)?),
            Some(analysis::q_factor(fit)?),
        ),
        Err(_) => (None, None),
    };
    info!(
        theoretical_ber = theory.ber(),
        empirical_ber, "estimated bit-error rate"
    );
    let summary = SimSummary {
        params: *params,
        samples_per_symbol,
        filter_warning: filtered.warning().map(|err| err.to_string()),
        signal_power: noise.signal_power,
        noise_std: noise.noise_std,
        realization_count: eye.geometry.realization_count,
        theoretical_ber: theory.ber(),
        empirical_ber,
        q_factor,
        fit_components: fit
            .as_ref()
            .map(|fit| fit.components.clone())
            .unwrap_or_default(),
        fit_failure: fit.as_ref().err().map(ToString::to_string),
    };
    let (fit, fit_error) = match fit {
        Ok(fit) => (Some(fit), None),
        Err(err) => (None, Some(err)),
    };
    let output = SimOutput {
        trace,
        filtered,
        noise,
        noisy,
        eye,
        histogram,
        fit,
        theory,
        summary,
    };
    Ok((output, fit_error))
}

/// Returns two-level fit of an amplitude histogram.
fn fit_levels(
    amplitudes: &[f64],
    histogram: &AmplitudeHistogram,
    fit_options: &FitOptions,
) -> Result<BimodalFitResult, Error> {
    let initial_guess = analysis::bimodal_initial_guess(amplitudes, histogram.bin_width)?;
    analysis::fit_bimodal_with(
        &histogram.bin_centers,
        &histogram.counts_as_f64(),
        &initial_guess,
        fit_options,
    )
}
