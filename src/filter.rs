//! Bandwidth limiting of a trace by a zero-phase Butterworth low-pass filter
//!
//! The filter is designed as a cascade of second-order sections obtained from the analog
//! Butterworth prototype by the bilinear transform (with the cutoff pre-warped so that the
//! `-3 dB` point lands exactly on the requested bandwidth). It is applied forward and then
//! backward over an odd extension of the signal, so the result has the squared magnitude
//! response of the filter and no phase shift: output sample `k` stays aligned with input
//! sample `k`.

use std::f64::consts::PI;

use tracing::{debug, warn};

use crate::{Error, SignalTrace};

/// Default Butterworth filter order
pub const DEFAULT_FILTER_ORDER: usize = 4;

/// Highest supported Butterworth filter order
pub const MAX_FILTER_ORDER: usize = 20;

/// Second-order IIR section, `H(z) = (b0 + b1 z^-1 + b2 z^-2) / (1 + a1 z^-1 + a2 z^-2)`
#[derive(Clone, PartialEq, Debug, Copy)]
pub struct Biquad {
    /// Numerator coefficients `[b0, b1, b2]`
    b: [f64; 3],
    /// Denominator coefficients `[a1, a2]` (`a0` is normalized to `1`)
    a: [f64; 2],
}

impl Biquad {
    /// Returns section with given coefficients.
    #[must_use]
    pub fn new(b: [f64; 3], a: [f64; 2]) -> Self {
        Self { b, a }
    }

    /// Returns the gain of the section at DC.
    #[must_use]
    pub fn dc_gain(&self) -> f64 {
        (self.b[0] + self.b[1] + self.b[2]) / (1.0 + self.a[0] + self.a[1])
    }

    /// Returns the state (Direct Form II Transposed) reached after an infinitely long constant
    /// input of given value.
    fn steady_state(&self, input: f64) -> [f64; 2] {
        let output = self.dc_gain() * input;
        [
            output - self.b[0] * input,
            self.b[2] * input - self.a[1] * output,
        ]
    }

    /// Filters samples in place, starting from given state.
    fn filter_in_place(&self, samples: &mut [f64], mut state: [f64; 2]) {
        for x in samples.iter_mut() {
            let input = *x;
            let output = self.b[0] * input + state[0];
            state[0] = self.b[1] * input - self.a[0] * output + state[1];
            state[1] = self.b[2] * input - self.a[1] * output;
            *x = output;
        }
    }

    /// Returns the magnitude of the frequency response at given normalized angular frequency.
    fn magnitude(&self, omega: f64) -> f64 {
        let (s1, c1) = omega.sin_cos();
        let (s2, c2) = (2.0 * omega).sin_cos();
        let num_re = self.b[0] + self.b[1] * c1 + self.b[2] * c2;
        let num_im = -(self.b[1] * s1 + self.b[2] * s2);
        let den_re = 1.0 + self.a[0] * c1 + self.a[1] * c2;
        let den_im = -(self.a[0] * s1 + self.a[1] * s2);
        num_re.hypot(num_im) / den_re.hypot(den_im)
    }
}

/// Digital Butterworth low-pass filter as a cascade of biquads
#[derive(Clone, PartialEq, Debug)]
pub struct ButterworthLowpass {
    /// Filter order
    order: usize,
    /// Cutoff frequency as a fraction of the Nyquist frequency
    normalized_cutoff: f64,
    /// Cascade of second-order sections
    sections: Vec<Biquad>,
}

impl ButterworthLowpass {
    /// Returns low-pass filter of given order and normalized cutoff.
    ///
    /// # Parameters
    ///
    /// - `order`: Filter order, in the range `[1, MAX_FILTER_ORDER]`.
    ///
    /// - `normalized_cutoff`: `-3 dB` frequency divided by the Nyquist frequency. Must be in the
    ///   open interval `(0, 1)`.
    ///
    /// # Errors
    ///
    /// Returns an error if `order` or `normalized_cutoff` is out of range.
    ///
    /// # Examples
    ///
    /// ```
    /// use eyesim::filter::ButterworthLowpass;
    ///
    /// let lpf = ButterworthLowpass::new(4, 0.25)?;
    /// assert!((lpf.magnitude_response(0.0) - 1.0).abs() < 1e-12);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(order: usize, normalized_cutoff: f64) -> Result<Self, Error> {
        if order == 0 || order > MAX_FILTER_ORDER {
            return Err(Error::InvalidParameter(format!(
                "Filter order must be in the range [1, {MAX_FILTER_ORDER}] (found {order})"
            )));
        }
        if !(normalized_cutoff > 0.0 && normalized_cutoff < 1.0) {
            return Err(Error::InvalidParameter(format!(
                "Normalized cutoff must be in the range (0, 1) (found {normalized_cutoff})"
            )));
        }
        Ok(Self {
            order,
            normalized_cutoff,
            sections: design_sections(order, normalized_cutoff),
        })
    }

    /// Returns the filter order.
    #[must_use]
    pub fn order(&self) -> usize {
        self.order
    }

    /// Returns the cutoff as a fraction of the Nyquist frequency.
    #[must_use]
    pub fn normalized_cutoff(&self) -> f64 {
        self.normalized_cutoff
    }

    /// Returns the second-order sections of the filter.
    #[must_use]
    pub fn sections(&self) -> &[Biquad] {
        &self.sections
    }

    /// Returns the single-pass magnitude response at given frequency (fraction of Nyquist).
    #[must_use]
    pub fn magnitude_response(&self, normalized_freq: f64) -> f64 {
        let omega = PI * normalized_freq;
        self.sections.iter().map(|s| s.magnitude(omega)).product()
    }

    /// Returns causally filtered samples (single forward pass, zero initial state).
    #[must_use]
    pub fn filter(&self, samples: &[f64]) -> Vec<f64> {
        let mut out = samples.to_vec();
        for section in &self.sections {
            section.filter_in_place(&mut out, [0.0; 2]);
        }
        out
    }

    /// Returns zero-phase filtered samples (forward-backward filtering).
    ///
    /// The signal is extended at both ends by odd reflection about its end points, and each pass
    /// starts from the steady state matching the first sample it sees, so that edge transients
    /// are suppressed. The output has the same length as the input.
    #[must_use]
    pub fn filtfilt(&self, samples: &[f64]) -> Vec<f64> {
        if samples.len() < 2 {
            return samples.to_vec();
        }
        let pad_len = (3 * (2 * self.sections.len() + 1)).min(samples.len() - 1);
        let mut ext = odd_extension(samples, pad_len);
        self.filter_with_steady_start(&mut ext);
        ext.reverse();
        self.filter_with_steady_start(&mut ext);
        ext.reverse();
        ext[pad_len .. pad_len + samples.len()].to_vec()
    }

    /// Runs the cascade in place, initializing each section at steady state for the first sample.
    fn filter_with_steady_start(&self, samples: &mut [f64]) {
        let mut first = samples[0];
        for section in &self.sections {
            section.filter_in_place(samples, section.steady_state(first));
            first *= section.dc_gain();
        }
    }
}

/// Status of the bandwidth-limiting stage
#[derive(Clone, Eq, PartialEq, Debug, Copy)]
pub enum FilterStatus {
    /// Samples were filtered
    Applied,
    /// Bandwidth not realizable at this sample rate; samples were passed through unchanged
    BandwidthExceedsNyquist,
}

/// Trace after the bandwidth-limiting stage
#[derive(Clone, PartialEq, Debug)]
pub struct FilteredTrace {
    /// Filtered (or, see `status`, unmodified) trace
    pub trace: SignalTrace,
    /// Requested channel bandwidth (Hz)
    pub bandwidth: f64,
    /// Butterworth filter order
    pub order: usize,
    /// Whether filtering was applied
    pub status: FilterStatus,
}

impl FilteredTrace {
    /// Returns the error kind explaining why the trace was passed through, if it was.
    #[must_use]
    pub fn warning(&self) -> Option<Error> {
        match self.status {
            FilterStatus::Applied => None,
            FilterStatus::BandwidthExceedsNyquist => Some(Error::BandwidthExceedsNyquist {
                bandwidth: self.bandwidth,
                sample_rate: self.trace.sample_rate,
            }),
        }
    }
}

/// Returns trace band-limited by a zero-phase Butterworth low-pass filter.
///
/// # Parameters
///
/// - `trace`: Trace to be filtered.
///
/// - `bandwidth`: Channel bandwidth (Hz), used as the `-3 dB` cutoff.
///
/// - `order`: Butterworth filter order.
///
/// # Returns
///
/// - `filtered`: Filtered trace. If `bandwidth` is at or above the Nyquist frequency
///   `trace.sample_rate / 2`, the filter cannot be realized; the samples are then passed through
///   unchanged and `filtered.status` is [`FilterStatus::BandwidthExceedsNyquist`].
///
/// # Errors
///
/// Returns an error if `bandwidth` is `None` or not positive, if `order` is out of range, or if
/// the trace has no samples.
///
/// # Examples
///
/// ```
/// use eyesim::{filter, signal, FilterStatus};
/// use rand::{rngs::StdRng, SeedableRng};
///
/// let mut rng = StdRng::seed_from_u64(1);
/// let trace = signal::generate(32, 16, 10e9, &mut rng)?;
/// let filtered = filter::apply_bandwidth(&trace, Some(7.5e9), 4)?;
/// assert_eq!(filtered.status, FilterStatus::Applied);
/// assert_eq!(filtered.trace.samples.len(), trace.samples.len());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn apply_bandwidth(
    trace: &SignalTrace,
    bandwidth: Option<f64>,
    order: usize,
) -> Result<FilteredTrace, Error> {
    let bandwidth = bandwidth.ok_or_else(|| Error::MissingParameter("bandwidth".to_string()))?;
    if !(bandwidth.is_finite() && bandwidth > 0.0) {
        return Err(Error::InvalidBandwidth(bandwidth));
    }
    if trace.samples.is_empty() {
        return Err(Error::MissingSignal);
    }
    let nyquist = trace.sample_rate / 2.0;
    if bandwidth >= nyquist {
        warn!(
            bandwidth,
            sample_rate = trace.sample_rate,
            "bandwidth exceeds Nyquist limit, signal left unfiltered"
        );
        return Ok(FilteredTrace {
            trace: trace.clone(),
            bandwidth,
            order,
            status: FilterStatus::BandwidthExceedsNyquist,
        });
    }
    let lpf = ButterworthLowpass::new(order, bandwidth / nyquist)?;
    debug!(order, normalized_cutoff = lpf.normalized_cutoff(), "filtering trace");
    Ok(FilteredTrace {
        trace: trace.with_samples(lpf.filtfilt(&trace.samples))?,
        bandwidth,
        order,
        status: FilterStatus::Applied,
    })
}

/// Returns the biquad cascade for a Butterworth low-pass filter.
#[allow(clippy::cast_precision_loss)]
fn design_sections(order: usize, normalized_cutoff: f64) -> Vec<Biquad> {
    // Sample rate taken as 2 so that the Nyquist frequency is 1
    let k = 4.0;
    let wc = k * (PI * normalized_cutoff / 2.0).tan();
    let mut sections = Vec::with_capacity(order.div_ceil(2));
    // Poles in the upper half plane; each stands for a conjugate pair
    for i in 0 .. order / 2 {
        let theta = PI * (2 * i + order + 1) as f64 / (2 * order) as f64;
        sections.push(bilinear_pole_pair(wc * theta.cos(), wc, k));
    }
    if order % 2 == 1 {
        sections.push(bilinear_real_pole(-wc, k));
    }
    sections
}

/// Bilinear transform of `|p|^2 / (s^2 - 2 Re(p) s + |p|^2)` for a pole `p` of magnitude `mag`.
fn bilinear_pole_pair(re: f64, mag: f64, k: f64) -> Biquad {
    let mag_sq = mag * mag;
    let k_sq = k * k;
    let d = k_sq - 2.0 * k * re + mag_sq;
    Biquad::new(
        [mag_sq / d, 2.0 * mag_sq / d, mag_sq / d],
        [2.0 * (mag_sq - k_sq) / d, (k_sq + 2.0 * k * re + mag_sq) / d],
    )
}

/// Bilinear transform of `-p / (s - p)` for a real pole `p`.
fn bilinear_real_pole(p: f64, k: f64) -> Biquad {
    let d = k - p;
    Biquad::new([-p / d, -p / d, 0.0], [-(k + p) / d, 0.0])
}

/// Returns signal extended at both ends by odd reflection about its end points.
fn odd_extension(samples: &[f64], pad_len: usize) -> Vec<f64> {
    let n = samples.len();
    let (first, last) = (samples[0], samples[n - 1]);
    let mut ext = Vec::with_capacity(n + 2 * pad_len);
    ext.extend((1 ..= pad_len).rev().map(|i| 2.0 * first - samples[i]));
    ext.extend_from_slice(samples);
    ext.extend((1 ..= pad_len).map(|i| 2.0 * last - samples[n - 1 - i]));
    ext
}
