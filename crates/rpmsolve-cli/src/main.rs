mod list;
mod repos;
mod resolve;

use clap::{Parser, Subcommand};
use console::style;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "rpmsolve")]
#[command(about = "Resolve RPM package transactions from JSON metadata")]
#[command(version)]
struct Args {
    /// More output (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a goal and print the resulting transaction
    Resolve(resolve::ResolveArgs),

    /// List packages of the loaded repositories
    List(list::ListArgs),
}

fn init_logger(verbose: u8) {
    let default_filter = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logger(args.verbose);

    let result = match args.command {
        Commands::Resolve(args) => resolve::execute(args),
        Commands::List(args) => list::execute(args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{} {:#}", style("Error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
