//! Live fiche sources.

use async_trait::async_trait;
use digesto_core::NormId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}")]
    Status { status: u16 },
    #[error("{0}")]
    Other(String),
}

/// Where a fiche's HTML comes from when neither cache tier has it.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Fetch the fiche page for `id` once. Retrying is the caller's business.
    async fn fetch(&self, id: &NormId) -> Result<String, FetchError>;
}

#[cfg(feature = "http")]
pub use http::HttpSource;

#[cfg(feature = "http")]
mod http {
    use std::time::Duration;

    use async_trait::async_trait;
    use digesto_core::NormId;
    use tracing::debug;

    use super::{DocumentSource, FetchError};

    /// Fetches fiche pages from the legislative portal over HTTP.
    pub struct HttpSource {
        client: reqwest::Client,
        base_url: String,
    }

    impl HttpSource {
        pub const TIMEOUT: Duration = Duration::from_secs(10);

        /// `base_url` is the prefix the id is appended to, e.g.
        /// `https://servicios.infoleg.gob.ar/infolegInternet/verNorma.do?id=`.
        pub fn new(base_url: impl Into<String>) -> Result<Self, FetchError> {
            let client = reqwest::Client::builder().timeout(Self::TIMEOUT).build()?;
            Ok(Self {
                client,
                base_url: base_url.into(),
            })
        }

        pub fn url_for(&self, id: &NormId) -> String {
            format!("{}{}", self.base_url, id)
        }
    }

    #[async_trait]
    impl DocumentSource for HttpSource {
        async fn fetch(&self, id: &NormId) -> Result<String, FetchError> {
            let url = self.url_for(id);
            debug!(url = %url, "fetching fiche");
            let resp = self.client.get(&url).send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    status: status.as_u16(),
                });
            }
            Ok(resp.text().await?)
        }
    }

}
