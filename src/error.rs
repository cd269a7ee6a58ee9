use std::time::Duration;

/// Failures of the rendering capability.
///
/// A [`RenderError::Timeout`] is an expected outcome of a bounded wait and is
/// resolved by callers into an empty field; [`RenderError::Navigation`] ends
/// the invoking pass.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("navigate to {url}: {message}")]
    Navigation { url: String, message: String },

    #[error("timed out after {waited:?} waiting for `{locator}`")]
    Timeout { locator: String, waited: Duration },

    #[error("no page loaded")]
    NoPage,

    #[error("build http client: {0}")]
    Client(#[source] reqwest::Error),
}

impl RenderError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
