use std::process::ExitCode;

use clap::Parser;
use qa_annotate::cli::{self, CliArgs};
use qa_annotate::logger;

fn main() -> ExitCode {
    // Initialize run log (overwrites previous run log)
    logger::init();

    let args = CliArgs::parse();
    cli::run(args)
}
