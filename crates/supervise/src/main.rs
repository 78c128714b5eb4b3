mod cli;
mod error;
mod report;

use std::fmt;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use tracing_subscriber::fmt::time::FormatTime;

struct Elapsed(Instant);

impl FormatTime for Elapsed {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> fmt::Result {
        let d = self.0.elapsed();
        let secs = d.as_secs();
        write!(w, "[{:02}:{:02}:{:03}]", secs / 60, secs % 60, d.subsec_millis())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_timer(Elapsed(Instant::now()))
        .with_writer(std::io::stderr)
        .with_max_level(cli.log_level.level())
        .init();

    match cli::execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            if e.is_launch_failure() {
                ExitCode::from(report::LAUNCH_FAILED_STATUS)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
