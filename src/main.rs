mod adapters;
mod cli;
mod commands;
mod config;
mod logging;

use clap::Parser;
use cli::{Cli, Command};
use config::AppConfig;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let debug = matches!(&cli.command, Command::Sync(args) if args.debug);

    let config = match AppConfig::load(None) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load configuration: {:?}", err);
            std::process::exit(2);
        }
    };
    logging::init(debug, &config.log_path());

    let exit_code = match cli.command {
        Command::Sync(args) => match commands::sync::run(args, config).await {
            Ok(code) => code,
            Err(err) => {
                log::error!("sync failed: {:?}", err);
                1
            }
        },
        Command::Convert(args) => match commands::convert::run(args) {
            Ok(code) => code,
            Err(err) => {
                log::error!("convert failed: {:?}", err);
                1
            }
        },
    };

    std::process::exit(exit_code);
}
