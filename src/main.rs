use clap::Parser;
use tomato_farm_launch::cli::{self, Cli};

fn main() {
    let cli = Cli::parse();
    cli.logging().init();

    if let Err(e) = cli::run(cli) {
        tracing::error!(error = %format!("{e:#}"), "launch failed");
        std::process::exit(1);
    }
}
