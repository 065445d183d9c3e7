use clap::Parser;

use spectool::cli::Cli;
use spectool::commands;
use spectool::logging::init_logging;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json)?;
    commands::run(cli)
}
