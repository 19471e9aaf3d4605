//! This crate simulates the eye diagram of a bandwidth-limited, noisy on-off-keying link and
//! compares the bit-error rate estimated from it with the closed-form value, over a range of SNR
//! values. Simulation parameters are specified on the command line, and simulation results are
//! saved to a JSON file.
//!
//! Build the executable with `cargo build --release` and then run `./target/release/eyesim -h`
//! for help on the command-line interface. Set `RUST_LOG` (e.g., `RUST_LOG=debug`) to change the
//! log level.

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

use anyhow::Result;
use clap::{crate_name, crate_version, value_parser, Arg, ArgAction, ArgMatches, Command};
use eyesim::sim;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Main function
fn main() -> Result<()> {
    let timer = Instant::now();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let matches = command_line_parser().get_matches();
    let json_filename = &json_filename_from_matches(&matches);
    sim::run_sims(&all_sim_params(&matches), json_filename)?;
    eprintln!("Elapsed time: {:.3?}", timer.elapsed());
    Ok(())
}

/// Returns command line parser.
fn command_line_parser() -> Command {
    Command::new(crate_name!())
        .version(crate_version!())
        .about("Simulates the eye diagram and bit-error rate of an OOK link")
        .arg(symbol_count())
        .arg(baud_rate())
        .arg(sampling_rate())
        .arg(bandwidth())
        .arg(filter_order())
        .arg(first_snr_db())
        .arg(snr_step_db())
        .arg(num_snr())
        .arg(eye_length())
        .arg(jitter_time_std())
        .arg(bin_count())
        .arg(remove_transitions())
        .arg(random_seed())
        .arg(json_filename())
}

/// Returns argument for number of symbols.
fn symbol_count() -> Arg {
    Arg::new("symbol_count")
        .short('n')
        .value_parser(value_parser!(usize))
        .default_value("10000")
        .help("Number of symbols per run")
}

/// Returns argument for baud rate (Bd).
fn baud_rate() -> Arg {
    Arg::new("baud_rate")
        .short('b')
        .value_parser(value_parser!(f64))
        .default_value("10e9")
        .help("Baud rate (Bd)")
}

/// Returns argument for sampling rate (Hz).
fn sampling_rate() -> Arg {
    Arg::new("sampling_rate")
        .short('m')
        .value_parser(value_parser!(f64))
        .default_value("160e9")
        .help("Sampling rate (Hz), an integer multiple of the baud rate")
}

/// Returns argument for channel bandwidth (Hz).
fn bandwidth() -> Arg {
    Arg::new("bandwidth")
        .short('w')
        .value_parser(value_parser!(f64))
        .default_value("7.5e9")
        .help("Channel bandwidth (Hz)")
}

/// Returns argument for Butterworth filter order.
fn filter_order() -> Arg {
    Arg::new("filter_order")
        .short('o')
        .value_parser(value_parser!(usize))
        .default_value("4")
        .help("Butterworth filter order")
}

/// Returns argument for first SNR (dB).
fn first_snr_db() -> Arg {
    Arg::new("first_snr_db")
        .short('r')
        .value_parser(value_parser!(f64))
        .allow_negative_numbers(true)
        .default_value("10.0")
        .help("First SNR (dB)")
}

/// Returns argument for SNR step (dB).
fn snr_step_db() -> Arg {
    Arg::new("snr_step_db")
        .short('p')
        .value_parser(value_parser!(f64))
        .allow_negative_numbers(true)
        .default_value("1.0")
        .help("SNR step (dB)")
}

/// Returns argument for number of SNR values.
fn num_snr() -> Arg {
    Arg::new("num_snr")
        .short('s')
        .value_parser(value_parser!(u32))
        .default_value("6")
        .help("Number of SNR values")
}

/// Returns argument for eye length (symbol periods).
fn eye_length() -> Arg {
    Arg::new("eye_length")
        .short('l')
        .value_parser(value_parser!(f64))
        .default_value("2.0")
        .help("Number of symbol periods per eye")
}

/// Returns argument for standard deviation of timing jitter (s).
fn jitter_time_std() -> Arg {
    Arg::new("jitter_time_std")
        .short('j')
        .value_parser(value_parser!(f64))
        .help("Standard deviation of timing jitter (s), none if omitted")
}

/// Returns argument for number of histogram bins.
fn bin_count() -> Arg {
    Arg::new("bin_count")
        .short('c')
        .value_parser(value_parser!(usize))
        .default_value("100")
        .help("Number of amplitude histogram bins")
}

/// Returns argument for removal of transition samples.
fn remove_transitions() -> Arg {
    Arg::new("remove_transitions")
        .short('t')
        .action(ArgAction::SetTrue)
        .help("Fit levels to steady-state samples only")
}

/// Returns argument for random seed.
fn random_seed() -> Arg {
    Arg::new("random_seed")
        .short('d')
        .value_parser(value_parser!(u64))
        .help("Random seed, drawn from the OS if omitted")
}

/// Returns argument for name of JSON file to which results must be saved.
fn json_filename() -> Arg {
    Arg::new("json_filename")
        .short('f')
        .default_value("results.json")
        .help("Name of JSON file to which results must be saved")
}

/// Returns simulation parameters based on command-line arguments.
fn all_sim_params(matches: &ArgMatches) -> Vec<sim::SimParams> {
    all_snr_db_from_matches(matches)
        .into_iter()
        .map(|snr_db| sim::SimParams {
            symbol_count: symbol_count_from_matches(matches),
            baud_rate: f64_from_matches(matches, "baud_rate"),
            sampling_rate: f64_from_matches(matches, "sampling_rate"),
            bandwidth: Some(f64_from_matches(matches, "bandwidth")),
            filter_order: filter_order_from_matches(matches),
            snr_db,
            eye_length: f64_from_matches(matches, "eye_length"),
            jitter_time_std: matches.get_one::<f64>("jitter_time_std").copied(),
            bin_count: bin_count_from_matches(matches),
            remove_transitions: matches.get_flag("remove_transitions"),
            random_seed: matches.get_one::<u64>("random_seed").copied(),
        })
        .collect()
}

// OK to unwrap in the functions below: Every argument they read has a default value.

/// Returns value of a floating-point argument.
fn f64_from_matches(matches: &ArgMatches, id: &str) -> f64 {
    *matches.get_one(id).unwrap()
}

/// Returns number of symbols.
fn symbol_count_from_matches(matches: &ArgMatches) -> usize {
    *matches.get_one("symbol_count").unwrap()
}

/// Returns Butterworth filter order.
fn filter_order_from_matches(matches: &ArgMatches) -> usize {
    *matches.get_one("filter_order").unwrap()
}

/// Returns number of histogram bins.
fn bin_count_from_matches(matches: &ArgMatches) -> usize {
    *matches.get_one("bin_count").unwrap()
}

/// Returns all SNR (dB) values.
fn all_snr_db_from_matches(matches: &ArgMatches) -> Vec<f64> {
    let first_snr_db: f64 = *matches.get_one("first_snr_db").unwrap();
    let snr_step_db: f64 = *matches.get_one("snr_step_db").unwrap();
    let num_snr: u32 = *matches.get_one("num_snr").unwrap();
    (0 .. num_snr)
        .map(|n| first_snr_db + snr_step_db * f64::from(n))
        .collect()
}

/// Returns name of JSON file to which simulation results must be saved.
fn json_filename_from_matches(matches: &ArgMatches) -> String {
    matches
        .get_one::<String>("json_filename")
        .unwrap()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command_line_for_test() -> Vec<&'static str> {
        vec![
            crate_name!(),
            "-n",
            "2000",
            "-b",
            "1e9",
            "-m",
            "16e9",
            "-w",
            "0.75e9",
            "-o",
            "3",
            "-r",
            "-2.0",
            "-p",
            "0.5",
            "-s",
            "5",
            "-l",
            "3",
            "-j",
            "5e-12",
            "-c",
            "60",
            "-t",
            "-d",
            "17",
            "-f",
            "results.json",
        ]
    }

    #[test]
    fn test_command_line_parser() {
        assert!(command_line_parser()
            .try_get_matches_from(command_line_for_test())
            .is_ok());
        assert!(command_line_parser()
            .try_get_matches_from([crate_name!(), "-n", "many"])
            .is_err());
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_all_sim_params() {
        let matches = command_line_parser().get_matches_from(command_line_for_test());
        let all_params = all_sim_params(&matches);
        let all_snr_db = [-2.0, -1.5, -1.0, -0.5, 0.0];
        assert_eq!(all_params.len(), 5);
        for (idx, &params) in all_params.iter().enumerate() {
            assert_eq!(params.symbol_count, 2000);
            assert_eq!(params.baud_rate, 1e9);
            assert_eq!(params.sampling_rate, 16e9);
            assert_eq!(params.bandwidth, Some(0.75e9));
            assert_eq!(params.filter_order, 3);
            assert_eq!(params.snr_db, all_snr_db[idx]);
            assert_eq!(params.eye_length, 3.0);
            assert_eq!(params.jitter_time_std, Some(5e-12));
            assert_eq!(params.bin_count, 60);
            assert!(params.remove_transitions);
            assert_eq!(params.random_seed, Some(17));
        }
        assert_eq!(json_filename_from_matches(&matches), "results.json");
    }

    #[test]
    fn test_all_sim_params_defaults() {
        let matches = command_line_parser().get_matches_from([crate_name!()]);
        let all_params = all_sim_params(&matches);
        assert_eq!(all_params.len(), 6);
        let defaults = sim::SimParams::default();
        for params in all_params {
            assert_eq!(
                params,
                sim::SimParams {
                    snr_db: params.snr_db,
                    ..defaults
                }
            );
        }
    }
}
