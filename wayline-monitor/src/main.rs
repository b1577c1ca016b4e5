use clap::Parser;
use miette::Result;

use wayline_monitor::Cli;

fn main() -> Result<()> {
    let args = Cli::parse();

    env_logger::Builder::new()
        .filter_level(args.verbose.log_level_filter())
        .init();

    wayline_monitor::run(args)?;
    Ok(())
}
