use clap::Parser;
use colored::Colorize;
use costprobe_core::cli::{self, Cli};
use std::process;

fn main() {
    let cli = Cli::parse();

    match cli::dispatch(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("{} {e:#}", "[!]".red().bold());
            process::exit(1);
        }
    }
}
