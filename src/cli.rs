use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// YAML file overriding the default scraper settings.
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Links, books, covers and prices in one go.
    Run(RunArgs),
    Links(LinksArgs),
    Books(BooksArgs),
    Price(EnrichArgs),
    KindlePrice(EnrichArgs),
    Covers(CoversArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// List URL (must be http/https).
    #[arg(long)]
    pub url: String,

    /// Output directory for every file the run writes.
    #[arg(long)]
    pub out: String,

    /// Also look up ebook prices.
    #[arg(long)]
    pub kindle_price: bool,
}

#[derive(Debug, Args)]
pub struct LinksArgs {
    /// List URL (must be http/https).
    #[arg(long)]
    pub url: String,

    /// Output directory for `links_<list>.csv`.
    #[arg(long)]
    pub out: String,
}

#[derive(Debug, Args)]
pub struct BooksArgs {
    /// List URL (must be http/https).
    #[arg(long)]
    pub url: String,

    /// Output directory for books, broken-link and checkpoint files.
    #[arg(long)]
    pub out: String,

    /// Links file (default: `<out>/links_<list>.csv`).
    #[arg(long)]
    pub links: Option<String>,

    /// First link offset to scrape (0-indexed).
    #[arg(long, default_value_t = 0)]
    pub start: usize,

    /// Offset to stop before; 0 scrapes to the end.
    #[arg(long, default_value_t = 0)]
    pub end: usize,
}

#[derive(Debug, Args)]
pub struct EnrichArgs {
    /// List URL (names the output file).
    #[arg(long)]
    pub url: String,

    /// Books file to enrich; repeat to concatenate several in order, e.g. the
    /// partial and unprocessed files of an interrupted pass.
    #[arg(long, required = true)]
    pub books: Vec<String>,

    /// Output directory for the enriched books file.
    #[arg(long)]
    pub out: String,
}

#[derive(Debug, Args)]
pub struct CoversArgs {
    /// Books file whose covers to download.
    #[arg(long)]
    pub books: String,

    /// Output directory; images go to `<out>/img/`.
    #[arg(long)]
    pub out: String,
}
