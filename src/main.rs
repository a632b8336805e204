/// Main entry point for the trade load generator
///
/// This serves as a thin wrapper that delegates to the interfaces layer.
/// The actual application logic is implemented in `interfaces::cli`.

use trade_perf::interfaces::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("trade-perf: {}", e);
        std::process::exit(1);
    }
}
