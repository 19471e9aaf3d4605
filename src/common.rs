//! Types needed in multiple modules

/// Enumeration of on-off-keying symbol values
#[derive(Clone, Eq, PartialEq, Debug, Copy)]
pub enum Symbol {
    /// Symbol `0` (light off)
    Zero = 0,
    /// Symbol `1` (light on)
    One = 1,
}

impl Symbol {
    /// Returns the amplitude level carried by the symbol.
    #[must_use]
    pub fn level(self) -> f64 {
        match self {
            Symbol::Zero => 0.0,
            Symbol::One => 1.0,
        }
    }
}

/// Custom error type
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Non-positive count or rate, or otherwise malformed input
    #[error("{0}")]
    InvalidParameter(String),
    /// Required parameter not set before use
    #[error("Missing parameter: {0}")]
    MissingParameter(String),
    /// Channel bandwidth is not strictly positive
    #[error("Bandwidth of {0} Hz is not valid")]
    InvalidBandwidth(f64),
    /// Channel bandwidth cannot be realized at the given sample rate
    #[error("Bandwidth of {bandwidth} Hz exceeds Nyquist limit for sample rate {sample_rate} Hz")]
    BandwidthExceedsNyquist {
        /// Requested bandwidth (Hz)
        bandwidth: f64,
        /// Sample rate (Hz)
        sample_rate: f64,
    },
    /// Eye span does not map to an integer number of samples
    #[error(
        "Eye of {eye_length} symbols at {sample_rate} Hz / {baud_rate} Bd spans {samples} samples, \
         which is not an integer"
    )]
    NonIntegerEyeWidth {
        /// Sample rate (Hz)
        sample_rate: f64,
        /// Symbol rate (Bd)
        baud_rate: f64,
        /// Number of symbol periods per eye
        eye_length: f64,
        /// Resulting (non-integer) number of samples per eye
        samples: f64,
    },
    /// Theoretical model only handles binary signals
    #[error("{0} data levels are not supported (only 2)")]
    UnsupportedDataLevels(usize),
    /// Noise or eye operation requested before a signal exists
    #[error("No signal has been provided")]
    MissingSignal,
    /// Nonlinear least-squares solver failed
    #[error("Fit did not converge from initial guess {initial_guess:?}: {reason}")]
    FitDidNotConverge {
        /// Initial parameters the solver started from
        initial_guess: Vec<f64>,
        /// Reason for failure
        reason: String,
    },
    /// File read/write error
    #[error("{0}")]
    FileReadWriteError(#[from] std::io::Error),
    /// Serde read/write error
    #[error("{0}")]
    SerdeReadWriteError(#[from] serde_json::Error),
}
