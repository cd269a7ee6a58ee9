use crate::formats::PageMetadata;
use crate::render::{Dom, Element};
use crate::selectors::{Accessor, Field, Pick, Rule, Ruleset};

/// Applies a [`Ruleset`] to a loaded book page.
///
/// A missing element resolves to the rule's fallback; only the title is
/// treated as evidence that the page did not render.
#[derive(Debug, Clone, Copy)]
pub struct RecordExtractor<'a> {
    ruleset: &'a Ruleset,
}

impl<'a> RecordExtractor<'a> {
    pub fn new(ruleset: &'a Ruleset) -> Self {
        Self { ruleset }
    }

    /// `None` when the title element is absent.
    pub fn title<D: Dom + ?Sized>(&self, dom: &D) -> Option<String> {
        let rule = self.ruleset.rule(Field::Title)?;
        values(dom, rule).into_iter().next()
    }

    pub fn extract<D: Dom + ?Sized>(&self, dom: &D, title: String) -> PageMetadata {
        let scalar = |field| self.scalar(dom, field);
        let list = |field| self.list(dom, field);

        let ratings_by_stars = parse_histogram(&scalar(Field::RatingsHistogram));
        let liked_percent = liked_percent(&ratings_by_stars);
        let (publish_date, publisher) = split_publication(&scalar(Field::PublicationRow));

        PageMetadata {
            title,
            series: clean_series(&scalar(Field::Series)),
            author: scalar(Field::Author).replace("by ", ""),
            rating: scalar(Field::Rating),
            description: scalar(Field::Description),
            language: scalar(Field::Language),
            isbn: scalar(Field::Isbn),
            genres: list(Field::Genres).iter().map(|g| sub_genre(g)).collect(),
            characters: list(Field::Characters),
            book_format: scalar(Field::BookFormat),
            edition: scalar(Field::Edition),
            pages: scalar(Field::Pages).replace(" pages", ""),
            publisher,
            publish_date,
            first_publish_date: first_publish_date(&scalar(Field::FirstPublishDate)),
            awards: list(Field::Awards),
            num_ratings: parse_count(&scalar(Field::NumRatings)),
            ratings_by_stars,
            liked_percent,
            setting: list(Field::Setting)
                .into_iter()
                .map(|place| place.replace('\n', ""))
                .collect(),
            cover_image_url: scalar(Field::CoverImageUrl),
        }
    }

    fn scalar<D: Dom + ?Sized>(&self, dom: &D, field: Field) -> String {
        let Some(rule) = self.ruleset.rule(field) else {
            return String::new();
        };
        values(dom, rule)
            .into_iter()
            .next()
            .unwrap_or_else(|| rule.fallback.to_owned())
    }

    fn list<D: Dom + ?Sized>(&self, dom: &D, field: Field) -> Vec<String> {
        match self.ruleset.rule(field) {
            Some(rule) => values(dom, rule),
            None => Vec::new(),
        }
    }
}

fn values<D: Dom + ?Sized>(dom: &D, rule: &Rule) -> Vec<String> {
    let mut matches = dom.find_all(&rule.locator);
    let selected = match rule.pick {
        Pick::All => matches,
        Pick::PreferNth(n) if matches.len() > n => vec![matches.swap_remove(n)],
        Pick::First | Pick::PreferNth(_) => matches.into_iter().take(1).collect(),
    };

    let base = dom.base_url();
    let mut out = Vec::with_capacity(selected.len());
    for element in selected {
        let target = match &rule.within {
            Some(child) => match element.find_all(child).into_iter().next() {
                Some(target) => target,
                None => continue,
            },
            None => element,
        };
        let value = match &rule.accessor {
            Accessor::Text => Some(target.text().to_owned()),
            Accessor::RawText => Some(target.raw_text().to_owned()),
            Accessor::Attr(name) => target.attr(name).map(str::to_owned),
            Accessor::UrlAttr(name) => target.url_attr(name, base),
            Accessor::TextWithSibling => Some(text_with_sibling(&target)),
        };
        out.extend(value);
    }
    out
}

fn text_with_sibling(element: &Element) -> String {
    match element.sibling_text() {
        Some(sibling) if !sibling.is_empty() => format!("{} {sibling}", element.text()),
        _ => element.text().to_owned(),
    }
}

fn clean_series(text: &str) -> String {
    text.trim_matches(|c| c == '(' || c == ')').to_owned()
}

/// `"Fiction > Science Fiction"` keeps only the sub-category.
fn sub_genre(genre: &str) -> String {
    if genre.contains('>') {
        if let Some(sub) = genre.split(" > ").nth(1) {
            return sub.to_owned();
        }
    }
    genre.to_owned()
}

fn parse_count(text: &str) -> Option<u64> {
    text.trim().replace(',', "").parse().ok()
}

/// Reads the first `[...]` literal of the rating chart script.
///
/// Any unparsable bucket discards the whole histogram.
pub fn parse_histogram(script: &str) -> Vec<u64> {
    let Some((_, rest)) = script.split_once('[') else {
        return Vec::new();
    };
    let Some((literal, _)) = rest.split_once(']') else {
        return Vec::new();
    };
    literal
        .split(',')
        .map(|bucket| bucket.trim().parse::<u64>())
        .collect::<Result<Vec<_>, _>>()
        .unwrap_or_default()
}

/// Share of ratings in the top three buckets, rounded half to even.
///
/// Computed from the histogram, never from the percentage the page shows.
pub fn liked_percent(histogram: &[u64]) -> Option<u32> {
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return None;
    }
    let liked: u64 = histogram.iter().take(3).sum();
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let percent = (liked as f64 * 100.0 / total as f64).round_ties_even() as u32;
    Some(percent)
}

/// Splits the shared publication row into `(publish_date, publisher)`.
///
/// Both fields come from one parse of `"Published <date> by <publisher> (first
/// published ...)"`. When splitting on `" by "` does not yield exactly two
/// parts, the publisher is empty and the date is whatever precedes the first
/// `(`. A publisher name that itself contains `" by "` therefore loses both
/// fields' precision; this coupling is intentional and kept as-is.
pub fn split_publication(row: &str) -> (String, String) {
    let parts: Vec<&str> = row.split(" by ").collect();
    if let [date, publisher] = parts.as_slice() {
        let publisher = publisher.split(" (f").next().unwrap_or_default();
        return (
            date.replace("Published ", "").trim().to_owned(),
            publisher.trim().to_owned(),
        );
    }

    let date = parts
        .first()
        .and_then(|first| first.split('(').next())
        .unwrap_or_default();
    (date.replace("Published ", "").trim().to_owned(), String::new())
}

fn first_publish_date(text: &str) -> String {
    text.split("shed ")
        .nth(1)
        .map(|date| date.trim_matches(')').trim().to_owned())
        .unwrap_or_default()
}
