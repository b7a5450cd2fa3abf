use anyhow::Result;
use clap::Parser;
use log::LevelFilter;

mod cli;
mod probe;
mod run;

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    env_logger::Builder::new()
        .filter_level(if args.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .parse_default_env()
        .format_timestamp_millis()
        .init();

    match args.cmd {
        cli::Cmd::Run(opts) => run::run(opts),
        cli::Cmd::Probe(opts) => probe::run(opts),
    }
}
