use clap::Parser;
use listscrape::cli::{self, Args};
use std::error::Error;

fn main() {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    let Err(e) = cli::run(&args) else {
        return;
    };
    eprintln!("{}", e);
    if args.verbose {
        for cause in std::iter::successors(e.source(), |s: &&dyn Error| (*s).source()) {
            eprintln!("  cause: {}", cause);
        }
    }
    std::process::exit(e.exit_code());
}
