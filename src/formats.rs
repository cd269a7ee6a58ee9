use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

/// ISBN stored when a book page does not carry one.
pub const MISSING_ISBN: &str = "9999999999999";

/// A list entry discovered during pagination. Identity is `url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub url: String,
    pub score: u64,
    pub votes: u64,
}

impl LinkRecord {
    /// Final path segment of the URL.
    pub fn book_id(&self) -> String {
        book_id_from_url(&self.url)
    }
}

pub fn book_id_from_url(url: &str) -> String {
    if let Ok(parsed) = Url::parse(url) {
        if let Some(last) = parsed.path_segments().and_then(|mut s| s.next_back()) {
            return last.to_owned();
        }
    }
    url.rsplit('/').next().unwrap_or_default().to_owned()
}

/// Fields read off a book page; everything but identity and popularity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMetadata {
    pub title: String,
    pub series: String,
    pub author: String,
    pub rating: String,
    pub description: String,
    pub language: String,
    pub isbn: String,
    pub genres: Vec<String>,
    pub characters: Vec<String>,
    pub book_format: String,
    pub edition: String,
    pub pages: String,
    pub publisher: String,
    pub publish_date: String,
    pub first_publish_date: String,
    pub awards: Vec<String>,
    pub num_ratings: Option<u64>,
    pub ratings_by_stars: Vec<u64>,
    pub liked_percent: Option<u32>,
    pub setting: Vec<String>,
    pub cover_image_url: String,
}

/// A scraped book. Identity is `id`.
///
/// `price` and `kindle_price` are `None` until their pass has visited the
/// record. `Some("")` means the lookup ran and found nothing; on disk that is
/// an empty cell in an existing column, while `None` is an absent column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookRecord {
    pub id: String,
    pub title: String,
    pub series: String,
    pub author: String,
    pub rating: String,
    pub description: String,
    pub language: String,
    pub isbn: String,
    #[serde(with = "json_cell")]
    pub genres: Vec<String>,
    #[serde(with = "json_cell")]
    pub characters: Vec<String>,
    pub book_format: String,
    pub edition: String,
    pub pages: String,
    pub publisher: String,
    pub publish_date: String,
    pub first_publish_date: String,
    #[serde(with = "json_cell")]
    pub awards: Vec<String>,
    pub num_ratings: Option<u64>,
    #[serde(with = "json_cell")]
    pub ratings_by_stars: Vec<u64>,
    pub liked_percent: Option<u32>,
    #[serde(with = "json_cell")]
    pub setting: Vec<String>,
    pub cover_image_url: String,
    pub popularity_score: u64,
    pub popularity_votes: u64,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_cell"
    )]
    pub price: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_cell"
    )]
    pub kindle_price: Option<String>,
}

impl BookRecord {
    pub fn new(link: &LinkRecord, page: PageMetadata) -> Self {
        Self {
            id: link.book_id(),
            title: page.title,
            series: page.series,
            author: page.author,
            rating: page.rating,
            description: page.description,
            language: page.language,
            isbn: page.isbn,
            genres: page.genres,
            characters: page.characters,
            book_format: page.book_format,
            edition: page.edition,
            pages: page.pages,
            publisher: page.publisher,
            publish_date: page.publish_date,
            first_publish_date: page.first_publish_date,
            awards: page.awards,
            num_ratings: page.num_ratings,
            ratings_by_stars: page.ratings_by_stars,
            liked_percent: page.liked_percent,
            setting: page.setting,
            cover_image_url: page.cover_image_url,
            popularity_score: link.score,
            popularity_votes: link.votes,
            price: None,
            kindle_price: None,
        }
    }

    pub fn has_isbn(&self) -> bool {
        !self.isbn.is_empty() && self.isbn != MISSING_ISBN
    }
}

/// An existing column always yields a value, even when the cell is empty.
fn present_cell<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(Some)
}

/// Sequences stored as a JSON array inside one cell.
mod json_cell {
    use serde::de::DeserializeOwned;

    use super::{Deserialize, Deserializer, Serialize, Serializer};

    #[allow(clippy::ptr_arg)]
    pub fn serialize<S, T>(items: &Vec<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        let json = serde_json::to_string(items).map_err(<S::Error as serde::ser::Error>::custom)?;
        serializer.serialize_str(&json)
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        let cell = String::deserialize(deserializer)?;
        if cell.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&cell).map_err(<D::Error as serde::de::Error>::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn book_id_is_last_path_segment() {
        let link = LinkRecord {
            url: "https://www.goodreads.com/book/show/2767052-the-hunger-games".to_owned(),
            score: 10,
            votes: 1,
        };
        assert_eq!(link.book_id(), "2767052-the-hunger-games");
        assert_eq!(book_id_from_url("book/show/42"), "42");
    }

    #[test]
    fn sentinel_isbn_is_not_searchable() {
        let mut book = BookRecord {
            isbn: MISSING_ISBN.to_owned(),
            ..BookRecord::default()
        };
        assert!(!book.has_isbn());
        book.isbn = "9780439023481".to_owned();
        assert!(book.has_isbn());
    }
}
