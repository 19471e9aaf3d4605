//! Eye-diagram construction
//!
//! A long trace is folded into consecutive *realizations*, each spanning `eye_length` symbol
//! periods, laid end to end and paired with a time axis that restarts at `0` for every
//! realization. Samples left over after the last whole realization are dropped.
//!
//! Timing jitter is modelled per realization: each realization is circularly rotated by its own
//! random whole-sample displacement. Samples that roll off one end reappear at the other end of
//! the same realization, so no sample ever moves into a neighbouring realization. This is a
//! sample-granular approximation of a true time delay, not a sub-sample resampling.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use tracing::debug;

use crate::{analysis, signal, Error, SignalTrace};

/// Geometry of the eye realizations drawn from a trace
#[derive(Clone, Eq, PartialEq, Debug, Copy)]
pub struct EyeGeometry {
    /// Number of samples in each realization
    pub samples_per_eye: usize,
    /// Number of whole realizations in the trace
    pub realization_count: usize,
    /// Number of trace samples used (`samples_per_eye * realization_count`)
    pub used_length: usize,
}

impl EyeGeometry {
    /// Returns eye geometry for a trace.
    ///
    /// # Parameters
    ///
    /// - `trace_len`: Number of samples in the trace.
    ///
    /// - `sample_rate`: Sample rate (Hz).
    ///
    /// - `baud_rate`: Symbol rate (Bd).
    ///
    /// - `eye_length`: Number of symbol periods spanned by each realization.
    ///
    /// # Errors
    ///
    /// Returns an error if a rate or `eye_length` is not a positive finite number, if an eye does
    /// not span a positive integer number of samples, or if the trace is shorter than one eye.
    ///
    /// # Examples
    ///
    /// ```
    /// use eyesim::eye::EyeGeometry;
    ///
    /// let geometry = EyeGeometry::new(1003, 10e9, 1e9, 5.0)?;
    /// assert_eq!(geometry.samples_per_eye, 50);
    /// assert_eq!(geometry.realization_count, 20);
    /// assert_eq!(geometry.used_length, 1000);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn new(
        trace_len: usize,
        sample_rate: f64,
        baud_rate: f64,
        eye_length: f64,
    ) -> Result<Self, Error> {
        for (name, value) in [
            ("Sample rate", sample_rate),
            ("Baud rate", baud_rate),
            ("Eye length", eye_length),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::InvalidParameter(format!(
                    "{name} must be a positive number (found {value})"
                )));
            }
        }
        let samples = sample_rate / baud_rate * eye_length;
        let rounded = samples.round();
        if rounded < 1.0 || (samples - rounded).abs() > signal::INTEGER_RATIO_TOL * rounded {
            return Err(Error::NonIntegerEyeWidth {
                sample_rate,
                baud_rate,
                eye_length,
                samples,
            });
        }
        let samples_per_eye = rounded as usize;
        let realization_count = trace_len / samples_per_eye;
        if realization_count == 0 {
            return Err(Error::InvalidParameter(format!(
                "Trace of {trace_len} samples is shorter than one eye of {samples_per_eye} samples"
            )));
        }
        Ok(Self {
            samples_per_eye,
            realization_count,
            used_length: realization_count * samples_per_eye,
        })
    }
}

/// Paired time/amplitude samples of an eye diagram
#[derive(Clone, PartialEq, Debug)]
pub struct EyeDiagram {
    /// Realization geometry
    pub geometry: EyeGeometry,
    /// Sample rate (Hz)
    pub sample_rate: f64,
    /// Intra-realization time of each sample (restarts at `0` for every realization)
    pub time_axis: Vec<f64>,
    /// Amplitude of each sample
    pub amplitude_axis: Vec<f64>,
    /// Jitter displacement (samples) applied to each realization (empty if no jitter)
    pub displacements: Vec<i64>,
}

impl EyeDiagram {
    /// Returns the time/amplitude pairs with `start <= time <= end`.
    #[must_use]
    pub fn subsection(&self, start: f64, end: f64) -> (Vec<f64>, Vec<f64>) {
        subsection(&self.time_axis, &self.amplitude_axis, start, end)
    }

    /// Returns 2-D histogram of the eye over a `bins x bins` grid.
    ///
    /// # Errors
    ///
    /// Returns an error if `bins` is `0`.
    pub fn density(&self, bins: usize) -> Result<EyeDensity, Error> {
        eye_density(&self.time_axis, &self.amplitude_axis, bins)
    }
}

/// Two-dimensional (time, amplitude) histogram of an eye diagram
#[derive(Clone, PartialEq, Debug)]
pub struct EyeDensity {
    /// Time bin edges (`bins + 1` values)
    pub time_edges: Vec<f64>,
    /// Amplitude bin edges (`bins + 1` values)
    pub amplitude_edges: Vec<f64>,
    /// Counts indexed as `counts[time_bin][amplitude_bin]`
    pub counts: Vec<Vec<u64>>,
    /// Count per bin if samples were spread evenly over the grid
    pub expected_count_per_bin: f64,
}

/// Returns the eye time axis: `k / sample_rate` for `k` in `[0, samples_per_eye)`, repeated for
/// every realization.
///
/// # Parameters
///
/// - `samples_per_eye`: Number of samples in each realization.
///
/// - `sample_rate`: Sample rate (Hz).
///
/// - `realization_count`: Number of realizations.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn time_axis(samples_per_eye: usize, sample_rate: f64, realization_count: usize) -> Vec<f64> {
    let single: Vec<f64> = (0 .. samples_per_eye)
        .map(|k| k as f64 / sample_rate)
        .collect();
    single.repeat(realization_count)
}

/// Rotates samples circularly, moving sample `i` to position `(i + shift) mod len`.
pub fn rotate(samples: &mut [f64], shift: i64) {
    if samples.is_empty() {
        return;
    }
    let len = i64::try_from(samples.len()).unwrap_or(i64::MAX);
    // `rem_euclid` result lies in `[0, len)`, so it fits in `usize`
    samples.rotate_right(usize::try_from(shift.rem_euclid(len)).unwrap_or(0));
}

/// Returns jittered eye amplitudes and the displacement applied to each realization.
///
/// # Parameters
///
/// - `amplitudes`: Eye amplitudes, `samples_per_eye` per realization. A trailing partial
///   realization, if any, is left unchanged.
///
/// - `samples_per_eye`: Number of samples in each realization.
///
/// - `jitter_samples_std`: Standard deviation (samples) of the displacement of each realization.
///
/// - `rng`: Random number generator to be used.
///
/// # Returns
///
/// - `jittered`: Amplitudes with each realization rotated by its own displacement.
///
/// - `displacements`: Displacement (whole samples) drawn for each realization.
///
/// # Errors
///
/// Returns an error if `samples_per_eye` is `0` or if `jitter_samples_std` is negative or not
/// finite.
#[allow(clippy::cast_possible_truncation)]
pub fn apply_jitter<R: Rng>(
    amplitudes: &[f64],
    samples_per_eye: usize,
    jitter_samples_std: f64,
    rng: &mut R,
) -> Result<(Vec<f64>, Vec<i64>), Error> {
    if samples_per_eye == 0 {
        return Err(Error::InvalidParameter(
            "Number of samples per eye must be a positive integer".to_string(),
        ));
    }
    let normal = Normal::new(0.0, jitter_samples_std).map_err(|_| {
        Error::InvalidParameter(format!(
            "Jitter standard deviation must be a non-negative number (found {jitter_samples_std})"
        ))
    })?;
    let mut jittered = amplitudes.to_vec();
    let mut displacements = Vec::with_capacity(amplitudes.len() / samples_per_eye);
    for realization in jittered.chunks_exact_mut(samples_per_eye) {
        let shift = normal.sample(rng).round() as i64;
        rotate(realization, shift);
        displacements.push(shift);
    }
    Ok((jittered, displacements))
}

/// Returns eye diagram of a trace.
///
/// # Parameters
///
/// - `trace`: Trace (normally filtered and noisy) to be folded.
///
/// - `eye_length`: Number of symbol periods spanned by each realization.
///
/// - `jitter_time_std`: Standard deviation (s) of the timing jitter of each realization, or
///   `None` for no jitter.
///
/// - `rng`: Random number generator to be used (only drawn from if there is jitter).
///
/// # Returns
///
/// - `eye`: Eye diagram with `time_axis` and `amplitude_axis` of equal length
///   `eye.geometry.used_length`.
///
/// # Errors
///
/// Returns an error if the eye geometry is invalid for the trace (see [`EyeGeometry::new`]), or
/// if `jitter_time_std` is negative or not finite.
///
/// # Examples
///
/// ```
/// use eyesim::{eye, signal};
/// use rand::{rngs::StdRng, SeedableRng};
///
/// let mut rng = StdRng::seed_from_u64(1);
/// let trace = signal::generate(100, 10, 1e9, &mut rng)?;
/// let eye = eye::section(&trace, 5.0, Some(5e-12), &mut rng)?;
/// assert_eq!(eye.geometry.realization_count, 20);
/// assert_eq!(eye.time_axis.len(), 1000);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn section<R: Rng>(
    trace: &SignalTrace,
    eye_length: f64,
    jitter_time_std: Option<f64>,
    rng: &mut R,
) -> Result<EyeDiagram, Error> {
    if trace.samples.is_empty() {
        return Err(Error::MissingSignal);
    }
    let geometry = EyeGeometry::new(
        trace.samples.len(),
        trace.sample_rate,
        trace.baud_rate,
        eye_length,
    )?;
    debug!(
        samples_per_eye = geometry.samples_per_eye,
        realization_count = geometry.realization_count,
        dropped = trace.samples.len() - geometry.used_length,
        "eye geometry"
    );
    let used = &trace.samples[.. geometry.used_length];
    let (amplitude_axis, displacements) = match jitter_time_std {
        Some(std) => apply_jitter(used, geometry.samples_per_eye, std * trace.sample_rate, rng)?,
        None => (used.to_vec(), Vec::new()),
    };
    Ok(EyeDiagram {
        geometry,
        sample_rate: trace.sample_rate,
        time_axis: time_axis(
            geometry.samples_per_eye,
            trace.sample_rate,
            geometry.realization_count,
        ),
        amplitude_axis,
        displacements,
    })
}

/// Returns the time/amplitude pairs whose time lies in `[start, end]`.
///
/// # Parameters
///
/// - `time_axis`: Sample times.
///
/// - `amplitude_axis`: Sample amplitudes, paired with `time_axis` (the longer of the two is
///   effectively truncated to the length of the shorter one).
///
/// - `start`, `end`: Inclusive time bounds.
#[must_use]
pub fn subsection(
    time_axis: &[f64],
    amplitude_axis: &[f64],
    start: f64,
    end: f64,
) -> (Vec<f64>, Vec<f64>) {
    time_axis
        .iter()
        .zip(amplitude_axis)
        .filter(|&(&t, _)| start <= t && t <= end)
        .map(|(&t, &a)| (t, a))
        .unzip()
}

/// Returns 2-D histogram of paired time/amplitude samples over a `bins x bins` grid spanning the
/// range of each axis (widened by `0.5` on each side if all values on an axis are equal).
///
/// # Errors
///
/// Returns an error if `bins` is `0`.
#[allow(clippy::cast_precision_loss)]
pub fn eye_density(
    time_axis: &[f64],
    amplitude_axis: &[f64],
    bins: usize,
) -> Result<EyeDensity, Error> {
    if bins == 0 {
        return Err(Error::InvalidParameter(
            "Number of bins must be a positive integer".to_string(),
        ));
    }
    let (t_lo, t_hi) = analysis::value_range(time_axis);
    let (a_lo, a_hi) = analysis::value_range(amplitude_axis);
    let mut counts = vec![vec![0u64; bins]; bins];
    let num_pairs = time_axis.len().min(amplitude_axis.len());
    for (&t, &a) in time_axis.iter().zip(amplitude_axis) {
        let i = analysis::bin_index(t, t_lo, t_hi, bins);
        let j = analysis::bin_index(a, a_lo, a_hi, bins);
        counts[i][j] += 1;
    }
    Ok(EyeDensity {
        time_edges: analysis::bin_edges(t_lo, t_hi, bins),
        amplitude_edges: analysis::bin_edges(a_lo, a_hi, bins),
        counts,
        expected_count_per_bin: num_pairs as f64 / (bins * bins) as f64,
    })
}


#[cfg(test)]
mod tests_of_functions {
    use float_eq::assert_float_eq;
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    fn ramp_trace(len: usize, samples_per_symbol: usize, baud_rate: f64) -> SignalTrace {
        SignalTrace {
            sample_rate: baud_rate * f64::from(u32::try_from(samples_per_symbol).unwrap()),
            baud_rate,
            symbol_count: len / samples_per_symbol,
            samples_per_symbol,
            samples: (0 .. len).map(|k| f64::from(u32::try_from(k).unwrap())).collect(),
        }
    }

    fn sorted(values: &[f64]) -> Vec<f64> {
        let mut v = values.to_vec();
        v.sort_by(f64::total_cmp);
        v
    }

    #[test]
    fn test_time_axis() {
        assert!(time_axis(4, 1.0, 0).is_empty());
        assert_float_eq!(
            time_axis(3, 2.0, 2),
            vec![0.0, 0.5, 1.0, 0.0, 0.5, 1.0],
            abs_all <= 1e-12
        );
    }

    #[test]
    fn test_rotate() {
        let mut x = [0.0, 1.0, 2.0, 3.0, 4.0];
        rotate(&mut x, 2);
        assert_float_eq!(x, [3.0, 4.0, 0.0, 1.0, 2.0], abs_all <= 1e-12);
        rotate(&mut x, -2);
        assert_float_eq!(x, [0.0, 1.0, 2.0, 3.0, 4.0], abs_all <= 1e-12);
        rotate(&mut x, 12);
        assert_float_eq!(x, [3.0, 4.0, 0.0, 1.0, 2.0], abs_all <= 1e-12);
        let mut empty: [f64; 0] = [];
        rotate(&mut empty, 3);
    }

    #[test]
    fn test_section_without_jitter() {
        let mut rng = StdRng::seed_from_u64(41);
        let trace = ramp_trace(1000, 10, 1e9);
        let eye = section(&trace, 5.0, None, &mut rng).unwrap();
        assert_eq!(eye.geometry.samples_per_eye, 50);
        assert_eq!(eye.geometry.realization_count, 20);
        assert_eq!(eye.geometry.used_length, 1000);
        assert_eq!(eye.time_axis.len(), 1000);
        assert_eq!(eye.amplitude_axis.len(), 1000);
        assert!(eye.displacements.is_empty());
        for block in eye.time_axis.chunks_exact(50) {
            assert_float_eq!(block[0], 0.0, abs <= 1e-20);
            assert_float_eq!(block[49], 49.0 / 1e10, rmax <= 1e-12);
        }
        assert_float_eq!(eye.amplitude_axis, trace.samples, abs_all <= 1e-12);
    }

    #[test]
    fn test_section_drops_trailing_samples() {
        let mut rng = StdRng::seed_from_u64(43);
        let trace = ramp_trace(1030, 10, 1e9);
        let eye = section(&trace, 5.0, None, &mut rng).unwrap();
        assert_eq!(eye.amplitude_axis.len(), 1000);
        assert_float_eq!(eye.amplitude_axis[999], 999.0, abs <= 1e-12);
    }

    #[test]
    fn test_section_errors() {
        let mut rng = StdRng::seed_from_u64(47);
        let trace = ramp_trace(1000, 10, 1e9);
        assert!(matches!(
            section(&trace, 0.25, None, &mut rng),
            Err(Error::NonIntegerEyeWidth { .. })
        ));
        assert!(section(&trace, 5.0, Some(-1e-12), &mut rng).is_err());
        assert!(section(&trace, 5.0, Some(f64::NAN), &mut rng).is_err());
        let empty = SignalTrace {
            samples: Vec::new(),
            ..trace
        };
        assert!(matches!(
            section(&empty, 5.0, None, &mut rng),
            Err(Error::MissingSignal)
        ));
    }

    #[test]
    fn test_jitter_stays_within_realization() {
        let mut rng = StdRng::seed_from_u64(53);
        let trace = ramp_trace(1000, 10, 1e9);
        // 1 ns at 10 GS/s spreads displacements over several samples
        let eye = section(&trace, 5.0, Some(1e-9), &mut rng).unwrap();
        assert_eq!(eye.amplitude_axis.len(), 1000);
        assert_eq!(eye.displacements.len(), 20);
        assert!(eye.displacements.iter().any(|&d| d != 0));
        for ((jittered, original), &shift) in eye
            .amplitude_axis
            .chunks_exact(50)
            .zip(trace.samples.chunks_exact(50))
            .zip(&eye.displacements)
        {
            assert_float_eq!(sorted(jittered), sorted(original), abs_all <= 1e-12);
            let mut expected = original.to_vec();
            rotate(&mut expected, shift);
            assert_float_eq!(jittered.to_vec(), expected, abs_all <= 1e-12);
        }
    }

    #[test]
    fn test_zero_jitter_is_identity() {
        let mut rng = StdRng::seed_from_u64(59);
        let trace = ramp_trace(500, 10, 1e9);
        let eye = section(&trace, 5.0, Some(0.0), &mut rng).unwrap();
        assert!(eye.displacements.iter().all(|&d| d == 0));
        assert_float_eq!(eye.amplitude_axis, trace.samples, abs_all <= 1e-12);
    }

    #[test]
    fn test_apply_jitter() {
        let mut rng = StdRng::seed_from_u64(61);
        assert!(apply_jitter(&[1.0, 2.0], 0, 1.0, &mut rng).is_err());
        assert!(apply_jitter(&[1.0, 2.0], 1, -1.0, &mut rng).is_err());
        let amplitudes: Vec<f64> = (0 .. 25).map(f64::from).collect();
        let (jittered, displacements) = apply_jitter(&amplitudes, 10, 3.0, &mut rng).unwrap();
        assert_eq!(jittered.len(), 25);
        assert_eq!(displacements.len(), 2);
        // Partial trailing realization is untouched
        assert_float_eq!(jittered[20 ..].to_vec(), amplitudes[20 ..].to_vec(), abs_all <= 1e-12);
    }

    #[test]
    fn test_subsection() {
        let time = [0.0, 1.0, 2.0, 3.0, 0.0, 1.0, 2.0, 3.0];
        let amp = [10.0, 11.0, 12.0, 13.0, 20.0, 21.0, 22.0, 23.0];
        let (t, a) = subsection(&time, &amp, 1.0, 2.0);
        assert_float_eq!(t, vec![1.0, 2.0, 1.0, 2.0], abs_all <= 1e-12);
        assert_float_eq!(a, vec![11.0, 12.0, 21.0, 22.0], abs_all <= 1e-12);
        let (t, a) = subsection(&time, &amp, 5.0, 6.0);
        assert!(t.is_empty() && a.is_empty());
    }

    #[test]
    fn test_eye_density() {
        assert!(eye_density(&[0.0], &[0.0], 0).is_err());
        let time = [0.0, 1.0, 0.0, 1.0];
        let amp = [0.0, 0.0, 1.0, 1.0];
        let density = eye_density(&time, &amp, 2).unwrap();
        assert_eq!(density.counts, vec![vec![1, 1], vec![1, 1]]);
        assert_float_eq!(density.time_edges, vec![0.0, 0.5, 1.0], abs_all <= 1e-12);
        assert_float_eq!(density.expected_count_per_bin, 1.0, abs <= 1e-12);
        let mut rng = StdRng::seed_from_u64(67);
        let eye = section(&ramp_trace(1000, 10, 1e9), 5.0, None, &mut rng).unwrap();
        let density = eye.density(10).unwrap();
        let total: u64 = density.counts.iter().flatten().sum();
        assert_eq!(total, 1000);
    }
}
