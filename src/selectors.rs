//! Declarative extraction rules: field → (locator, accessor, fallback).
//!
//! The rules are best-effort heuristics for one site's markup. Swapping a
//! locator means replacing a [`Rule`]; the extraction control flow does not
//! change.

use std::collections::BTreeMap;

use crate::formats::MISSING_ISBN;
use crate::render::Locator;

/// Logical fields read off a book page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Field {
    Title,
    Series,
    Author,
    Rating,
    Description,
    Language,
    Isbn,
    Genres,
    Characters,
    BookFormat,
    Edition,
    Pages,
    /// Shared "Published <date> by <publisher>" row.
    PublicationRow,
    FirstPublishDate,
    Awards,
    NumRatings,
    RatingsHistogram,
    Setting,
    CoverImageUrl,
}

impl Field {
    pub const ALL: [Self; 19] = [
        Self::Title,
        Self::Series,
        Self::Author,
        Self::Rating,
        Self::Description,
        Self::Language,
        Self::Isbn,
        Self::Genres,
        Self::Characters,
        Self::BookFormat,
        Self::Edition,
        Self::Pages,
        Self::PublicationRow,
        Self::FirstPublishDate,
        Self::Awards,
        Self::NumRatings,
        Self::RatingsHistogram,
        Self::Setting,
        Self::CoverImageUrl,
    ];
}

/// How a value is read from a matched element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accessor {
    Text,
    RawText,
    Attr(&'static str),
    /// Attribute resolved to an absolute URL.
    UrlAttr(&'static str),
    /// Own text, then the first following sibling's text when non-empty.
    TextWithSibling,
}

/// Which of the matches a rule keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pick {
    First,
    /// The `n`-th match when present, else the first one.
    PreferNth(usize),
    /// Every match, in document order.
    All,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub locator: Locator,
    /// Looked up inside each match of `locator`; matches without it are dropped.
    pub within: Option<Locator>,
    pub accessor: Accessor,
    pub pick: Pick,
    /// Value used when nothing matches.
    pub fallback: &'static str,
}

impl Rule {
    pub fn first(locator: Locator, accessor: Accessor) -> Self {
        Self {
            locator,
            within: None,
            accessor,
            pick: Pick::First,
            fallback: "",
        }
    }

    pub fn all(locator: Locator, accessor: Accessor) -> Self {
        Self {
            pick: Pick::All,
            ..Self::first(locator, accessor)
        }
    }

    #[must_use]
    pub fn within(mut self, child: Locator) -> Self {
        self.within = Some(child);
        self
    }

    #[must_use]
    pub fn pick(mut self, pick: Pick) -> Self {
        self.pick = pick;
        self
    }

    #[must_use]
    pub fn fallback(mut self, fallback: &'static str) -> Self {
        self.fallback = fallback;
        self
    }
}

/// Rules for every [`Field`] of a book page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ruleset {
    rules: BTreeMap<Field, Rule>,
}

impl Ruleset {
    pub fn goodreads() -> Self {
        let rules = [
            (Field::Title, Rule::first(Locator::id("bookTitle"), Accessor::Text)),
            (Field::Series, Rule::first(Locator::id("bookSeries"), Accessor::Text)),
            (Field::Author, Rule::first(Locator::id("bookAuthors"), Accessor::Text)),
            (
                Field::Rating,
                Rule::first(Locator::css(r#"span[itemprop="ratingValue"]"#), Accessor::Text),
            ),
            (
                Field::Description,
                Rule::first(Locator::css("#description span"), Accessor::Text)
                    .pick(Pick::PreferNth(1)),
            ),
            (
                Field::Language,
                Rule::first(Locator::css(r#"[itemprop="inLanguage"]"#), Accessor::Text),
            ),
            (
                Field::Isbn,
                Rule::first(Locator::css(r#"[itemprop="isbn"]"#), Accessor::Text)
                    .fallback(MISSING_ISBN),
            ),
            (
                Field::Genres,
                Rule::all(Locator::class("elementList"), Accessor::Text)
                    .within(Locator::class("left")),
            ),
            (
                Field::Characters,
                Rule::all(Locator::css(r#"a[href*="/characters/"]"#), Accessor::Text),
            ),
            (
                Field::BookFormat,
                Rule::first(Locator::css(r#"[itemprop="bookFormat"]"#), Accessor::Text),
            ),
            (
                Field::Edition,
                Rule::first(Locator::css(r#"[itemprop="bookEdition"]"#), Accessor::Text),
            ),
            (
                Field::Pages,
                Rule::first(Locator::css(r#"[itemprop="numberOfPages"]"#), Accessor::Text),
            ),
            (
                Field::PublicationRow,
                Rule::first(Locator::css(r#"div[class="row"]"#).nth(1), Accessor::Text),
            ),
            (
                Field::FirstPublishDate,
                Rule::first(Locator::css(r#"div[class="row"] > nobr"#), Accessor::Text),
            ),
            (Field::Awards, Rule::all(Locator::class("award"), Accessor::Text)),
            (
                Field::NumRatings,
                Rule::first(
                    Locator::css(r#"meta[itemprop="ratingCount"]"#),
                    Accessor::Attr("content"),
                ),
            ),
            (
                Field::RatingsHistogram,
                Rule::first(
                    Locator::css(r#"script[type="text/javascript+protovis"]"#),
                    Accessor::RawText,
                ),
            ),
            (
                Field::Setting,
                Rule::all(Locator::css(r#"a[href*="/places/"]"#), Accessor::TextWithSibling),
            ),
            (
                Field::CoverImageUrl,
                Rule::first(Locator::css("img#coverImage"), Accessor::UrlAttr("src")),
            ),
        ];

        Self {
            rules: rules.into_iter().collect(),
        }
    }

    /// Replace the rule for `field`.
    #[must_use]
    pub fn with_rule(mut self, field: Field, rule: Rule) -> Self {
        self.rules.insert(field, rule);
        self
    }

    pub fn rule(&self, field: Field) -> Option<&Rule> {
        self.rules.get(&field)
    }

    pub fn locators(&self) -> impl Iterator<Item = &Locator> {
        self.rules
            .values()
            .flat_map(|rule| std::iter::once(&rule.locator).chain(rule.within.as_ref()))
    }
}

impl Default for Ruleset {
    fn default() -> Self {
        Self::goodreads()
    }
}

/// Locators on a paginated list page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListSelectors {
    pub pagination_links: Locator,
    pub title_links: Locator,
    pub score_votes: Locator,
    pub score_votes_links: Locator,
    pub interstitial_dismiss: Locator,
    pub document_head: Locator,
}

impl Default for ListSelectors {
    fn default() -> Self {
        Self {
            pagination_links: Locator::css(r#"div.pagination a[href*="/list/show"]"#),
            title_links: Locator::class("bookTitle"),
            score_votes: Locator::css("span.smallText.uitext"),
            score_votes_links: Locator::css("a"),
            interstitial_dismiss: Locator::css(r#"img[alt="Dismiss"]"#).nth(1),
            document_head: Locator::css("head"),
        }
    }
}

/// Locators on the storefront result pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSelectors {
    pub book_price: Locator,
    pub ebook_search_box: Locator,
    pub ebook_price: Locator,
}

impl Default for StoreSelectors {
    fn default() -> Self {
        Self {
            book_price: Locator::class("srp-item-price"),
            ebook_search_box: Locator::id("twotabsearchtextbox"),
            ebook_price: Locator::class("a-price-whole"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_field_has_a_rule() {
        let ruleset = Ruleset::goodreads();
        for field in Field::ALL {
            assert!(ruleset.rule(field).is_some(), "missing rule for {field:?}");
        }
    }

    #[test]
    fn every_locator_parses() {
        let ruleset = Ruleset::goodreads();
        for locator in ruleset.locators() {
            assert!(locator.is_valid(), "invalid css: {locator}");
        }
        let list = ListSelectors::default();
        let store = StoreSelectors::default();
        for locator in [
            &list.pagination_links,
            &list.title_links,
            &list.score_votes,
            &list.interstitial_dismiss,
            &store.book_price,
            &store.ebook_price,
        ] {
            assert!(locator.is_valid(), "invalid css: {locator}");
        }
    }

    #[test]
    fn with_rule_substitutes_locator() {
        let ruleset = Ruleset::goodreads()
            .with_rule(Field::Title, Rule::first(Locator::css("h1.title"), Accessor::Text));
        assert_eq!(
            ruleset.rule(Field::Title).map(|rule| rule.locator.as_css()),
            Some("h1.title")
        );
    }
}
