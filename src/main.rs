use std::path::Path;
use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

fn main() -> ExitCode {
    if let Err(err) = try_main() {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn try_main() -> anyhow::Result<()> {
    shelfscrape::logging::init().context("init logging")?;

    let cli = shelfscrape::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    let config = shelfscrape::config::ScraperConfig::load(cli.config.as_deref().map(Path::new))
        .context("load config")?;

    match cli.command {
        shelfscrape::cli::Command::Run(args) => {
            shelfscrape::pipeline::run(&config, args).context("run")?;
        }
        shelfscrape::cli::Command::Links(args) => {
            shelfscrape::pipeline::links(&config, args).context("links")?;
        }
        shelfscrape::cli::Command::Books(args) => {
            shelfscrape::pipeline::books(&config, args).context("books")?;
        }
        shelfscrape::cli::Command::Price(args) => {
            shelfscrape::pipeline::price(&config, args).context("price")?;
        }
        shelfscrape::cli::Command::KindlePrice(args) => {
            shelfscrape::pipeline::kindle_price(&config, args).context("kindle price")?;
        }
        shelfscrape::cli::Command::Covers(args) => {
            shelfscrape::pipeline::covers(&config, args).context("covers")?;
        }
    }

    Ok(())
}
