use std::path::{Path, PathBuf};

use anyhow::Context as _;
use url::Url;

use crate::books::{MetadataRun, PassOutcome};
use crate::checkpoint::{CheckpointStore, list_id};
use crate::cli::{BooksArgs, CoversArgs, EnrichArgs, LinksArgs, RunArgs};
use crate::config::ScraperConfig;
use crate::formats::{BookRecord, LinkRecord};
use crate::render::{Browser, HttpBrowser};
use crate::robots::ExclusionSet;

pub fn run(config: &ScraperConfig, args: RunArgs) -> anyhow::Result<()> {
    let out_dir = PathBuf::from(&args.out);

    tracing::info!(url = %args.url, out = %out_dir.display(), "run: links");
    links(
        config,
        LinksArgs {
            url: args.url.clone(),
            out: args.out.clone(),
        },
    )
    .context("links")?;

    tracing::info!("run: books");
    let run = books(
        config,
        BooksArgs {
            url: args.url.clone(),
            out: args.out.clone(),
            links: None,
            start: 0,
            end: 0,
        },
    )
    .context("books")?;
    let PassOutcome::Completed { books: books_path, .. } = run.outcome else {
        tracing::warn!("run stopped after an incomplete books pass");
        return Ok(());
    };

    tracing::info!("run: covers");
    covers(
        config,
        CoversArgs {
            books: books_path.to_string_lossy().to_string(),
            out: args.out.clone(),
        },
    )
    .context("covers")?;

    tracing::info!("run: price");
    let price_path = price(
        config,
        EnrichArgs {
            url: args.url.clone(),
            books: vec![books_path.to_string_lossy().to_string()],
            out: args.out.clone(),
        },
    )
    .context("price")?;

    if args.kindle_price {
        tracing::info!("run: kindle price");
        kindle_price(
            config,
            EnrichArgs {
                url: args.url,
                books: vec![price_path.to_string_lossy().to_string()],
                out: args.out,
            },
        )
        .context("kindle price")?;
    }

    Ok(())
}

pub fn links(config: &ScraperConfig, args: LinksArgs) -> anyhow::Result<PathBuf> {
    let list_url = parse_list_url(&args.url)?;
    let store = CheckpointStore::new(&args.out, list_id(list_url.as_str()));
    let browser = HttpBrowser::new(config).context("build browser")?;
    let exclusions = fetch_exclusions(&browser, &list_url)?;

    let links = crate::paginate::collect_links(&browser, config, &exclusions, &list_url)?;
    let path = store.links();
    crate::table::save(&path, &links)
        .with_context(|| format!("save links: {}", path.display()))?;
    tracing::info!(links = links.len(), path = %path.display(), "links saved");
    Ok(path)
}

pub fn books(config: &ScraperConfig, args: BooksArgs) -> anyhow::Result<MetadataRun> {
    let list_url = parse_list_url(&args.url)?;
    let store = CheckpointStore::new(&args.out, list_id(list_url.as_str()));
    let links_path = args.links.map_or_else(|| store.links(), PathBuf::from);
    let links: Vec<LinkRecord> = crate::table::load(&links_path)
        .with_context(|| format!("load links: {}", links_path.display()))?;

    let browser = HttpBrowser::new(config).context("build browser")?;
    let exclusions = fetch_exclusions(&browser, &list_url)?;
    let run = crate::books::scrape_books(
        &browser,
        config,
        &exclusions,
        &store,
        links,
        args.start,
        args.end,
    )?;

    if let PassOutcome::Exhausted { resume_at, .. } = &run.outcome {
        tracing::warn!(
            resume_at,
            "books pass stopped early; re-run with --start {resume_at} --end {}",
            run.end
        );
    }
    Ok(run)
}

pub fn price(config: &ScraperConfig, args: EnrichArgs) -> anyhow::Result<PathBuf> {
    let (store, mut books) = open_books(&args)?;
    let browser = HttpBrowser::new(config).context("build browser")?;
    let (_, path) = crate::price::enrich_prices(&browser, config, &store, &mut books)?;
    Ok(path)
}

pub fn kindle_price(config: &ScraperConfig, args: EnrichArgs) -> anyhow::Result<PathBuf> {
    let (store, mut books) = open_books(&args)?;
    let browser = HttpBrowser::new(config).context("build browser")?;
    let (_, path) = crate::price::enrich_kindle_prices(&browser, config, &store, &mut books)?;
    Ok(path)
}

pub fn covers(config: &ScraperConfig, args: CoversArgs) -> anyhow::Result<()> {
    let books_path = Path::new(&args.books);
    let books: Vec<BookRecord> = crate::table::load(books_path)
        .with_context(|| format!("load books: {}", books_path.display()))?;
    let img_dir = Path::new(&args.out).join("img");
    crate::covers::download_covers(config, &img_dir, &books)?;
    Ok(())
}

fn open_books(args: &EnrichArgs) -> anyhow::Result<(CheckpointStore, Vec<BookRecord>)> {
    let list_url = parse_list_url(&args.url)?;
    let store = CheckpointStore::new(&args.out, list_id(list_url.as_str()));
    let books = crate::table::load_many(args.books.as_slice())
        .with_context(|| format!("load books: {}", args.books.join(", ")))?;
    Ok((store, books))
}

/// Reads the exclusion policy with a short-lived session.
pub fn fetch_exclusions(browser: &dyn Browser, list_url: &Url) -> anyhow::Result<ExclusionSet> {
    let mut session = browser.open().context("open session")?;
    let exclusions = ExclusionSet::fetch(session.as_mut(), list_url);
    session.close();
    exclusions
}

fn parse_list_url(raw: &str) -> anyhow::Result<Url> {
    let url = Url::parse(raw).context("parse --url")?;
    if url.scheme() != "http" && url.scheme() != "https" {
        anyhow::bail!("--url must be http/https: {url}");
    }
    Ok(url)
}
