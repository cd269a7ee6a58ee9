use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use reqwest::header::{ACCEPT, USER_AGENT};
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::config::ScraperConfig;
use crate::error::RenderError;

/// A CSS selector with an optional match index, the equivalent of `(expr)[n]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    css: String,
    nth: Option<usize>,
}

impl Locator {
    pub fn css(css: impl Into<String>) -> Self {
        Self {
            css: css.into(),
            nth: None,
        }
    }

    pub fn id(id: &str) -> Self {
        Self::css(format!("#{id}"))
    }

    pub fn class(class: &str) -> Self {
        Self::css(format!(".{class}"))
    }

    /// Keep only the `n`-th match (0-indexed).
    #[must_use]
    pub fn nth(mut self, n: usize) -> Self {
        self.nth = Some(n);
        self
    }

    pub fn as_css(&self) -> &str {
        &self.css
    }

    pub fn is_valid(&self) -> bool {
        Selector::parse(&self.css).is_ok()
    }

    fn selector(&self) -> Option<Selector> {
        match Selector::parse(&self.css) {
            Ok(selector) => Some(selector),
            Err(err) => {
                tracing::warn!(css = %self.css, ?err, "invalid locator; treating as no match");
                None
            }
        }
    }

    fn select(&self, html: &Html) -> Vec<Element> {
        let Some(selector) = self.selector() else {
            return Vec::new();
        };
        let mut matches = html.select(&selector);
        match self.nth {
            Some(n) => matches.nth(n).map(Element::snapshot).into_iter().collect(),
            None => matches.map(Element::snapshot).collect(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.nth {
            Some(n) => write!(f, "({})[{n}]", self.css),
            None => f.write_str(&self.css),
        }
    }
}

/// Owned snapshot of one matched element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    tag: String,
    text: String,
    raw_text: String,
    attrs: BTreeMap<String, String>,
    html: String,
    sibling_text: Option<String>,
}

impl Element {
    fn snapshot(element: ElementRef<'_>) -> Self {
        let raw_text = element.text().collect::<String>();
        let attrs = element
            .value()
            .attrs()
            .map(|(name, value)| (name.to_owned(), value.to_owned()))
            .collect();
        let sibling_text = element
            .next_siblings()
            .find_map(ElementRef::wrap)
            .map(|sibling| collapse_whitespace(&sibling.text().collect::<String>()));

        Self {
            tag: element.value().name().to_owned(),
            text: collapse_whitespace(&raw_text),
            raw_text,
            attrs,
            html: element.html(),
            sibling_text,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Rendered text with whitespace runs collapsed to single spaces.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Text exactly as it appears in the document, line breaks included.
    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    /// Attribute value resolved against `base` when it is a relative URL.
    pub fn url_attr(&self, name: &str, base: Option<&Url>) -> Option<String> {
        let value = self.attr(name)?.trim();
        if value.is_empty() {
            return None;
        }
        match base {
            Some(base) => base.join(value).ok().map(String::from),
            None => Some(value.to_owned()),
        }
    }

    /// Text of the first following sibling element, if any.
    pub fn sibling_text(&self) -> Option<&str> {
        self.sibling_text.as_deref()
    }

    /// Matches of `locator` scoped to this element's subtree.
    pub fn find_all(&self, locator: &Locator) -> Vec<Element> {
        let fragment = Html::parse_fragment(&self.html);
        locator.select(&fragment)
    }
}

/// Read access to a loaded document.
pub trait Dom {
    fn find_all(&self, locator: &Locator) -> Vec<Element>;

    fn find(&self, locator: &Locator) -> Option<Element> {
        self.find_all(locator).into_iter().next()
    }

    fn base_url(&self) -> Option<&Url>;
}

/// A rendering session: one page at a time, exclusively owned by one pass.
pub trait Session: Dom {
    fn navigate(&mut self, url: &str) -> Result<(), RenderError>;

    fn current_url(&self) -> Option<&str>;

    /// Wait up to `timeout` for `locator` to match; `Timeout` when it never does.
    fn wait_for(&mut self, locator: &Locator, timeout: Duration) -> Result<Element, RenderError>;

    fn click(&mut self, element: &Element) -> Result<(), RenderError>;

    fn close(&mut self);
}

/// Opens fresh sessions; each pass opens its own and closes it when done.
pub trait Browser {
    fn open(&self) -> Result<Box<dyn Session>, RenderError>;
}

pub struct Document {
    html: Html,
    url: Option<Url>,
}

impl Document {
    pub fn parse(html: &str, url: Option<Url>) -> Self {
        Self {
            html: Html::parse_document(html),
            url,
        }
    }
}

impl Dom for Document {
    fn find_all(&self, locator: &Locator) -> Vec<Element> {
        locator.select(&self.html)
    }

    fn base_url(&self) -> Option<&Url> {
        self.url.as_ref()
    }
}

/// Static-HTML rendering over a blocking HTTP client.
#[derive(Debug, Clone)]
pub struct HttpBrowser {
    client: reqwest::blocking::Client,
    user_agent: String,
}

impl HttpBrowser {
    pub fn new(config: &ScraperConfig) -> Result<Self, RenderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(RenderError::Client)?;

        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
        })
    }
}

impl Browser for HttpBrowser {
    fn open(&self) -> Result<Box<dyn Session>, RenderError> {
        Ok(Box::new(HttpSession {
            browser: self.clone(),
            document: None,
            current_url: None,
        }))
    }
}

pub struct HttpSession {
    browser: HttpBrowser,
    document: Option<Document>,
    current_url: Option<String>,
}

impl Dom for HttpSession {
    fn find_all(&self, locator: &Locator) -> Vec<Element> {
        match &self.document {
            Some(document) => document.find_all(locator),
            None => Vec::new(),
        }
    }

    fn base_url(&self) -> Option<&Url> {
        self.document.as_ref().and_then(Document::base_url)
    }
}

impl Session for HttpSession {
    fn navigate(&mut self, url: &str) -> Result<(), RenderError> {
        let navigation_error = |message: String| RenderError::Navigation {
            url: url.to_owned(),
            message,
        };

        let response = self
            .browser
            .client
            .get(url)
            .header(USER_AGENT, &self.browser.user_agent)
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .send()
            .map_err(|err| navigation_error(err.to_string()))?;

        let status = response.status();
        let final_url = response.url().clone();
        let body = response
            .text()
            .map_err(|err| navigation_error(err.to_string()))?;
        if !status.is_success() {
            tracing::debug!(%url, %status, "non-success response; loading body as document");
        }

        self.document = Some(Document::parse(&body, Some(final_url)));
        self.current_url = Some(url.to_owned());
        Ok(())
    }

    fn current_url(&self) -> Option<&str> {
        self.current_url.as_deref()
    }

    /// A fetched document cannot change, so it is checked once and never
    /// re-requested; reloading is the retry policy's job.
    fn wait_for(&mut self, locator: &Locator, timeout: Duration) -> Result<Element, RenderError> {
        if self.document.is_none() {
            return Err(RenderError::NoPage);
        }
        self.find(locator).ok_or_else(|| RenderError::Timeout {
            locator: locator.to_string(),
            waited: timeout,
        })
    }

    fn click(&mut self, element: &Element) -> Result<(), RenderError> {
        // Overlays on a static document have nothing to dismiss.
        let Some(target) = element.url_attr("href", self.base_url()) else {
            return Ok(());
        };
        self.navigate(&target)
    }

    fn close(&mut self) {
        self.document = None;
        self.current_url = None;
    }
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
