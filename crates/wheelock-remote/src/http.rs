use crate::{FetchConfig, FetchError, Fetcher, USER_AGENT};
use std::io::Read;
use wheelock_schema::FileLocation;

/// Retrieves artifacts over HTTP(S) with a blocking `ureq` agent.
///
/// One GET per artifact. Non-2xx responses and transport failures are
/// returned as errors; nothing is retried.
pub struct HttpFetcher {
    config: FetchConfig,
    agent: ureq::Agent,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> Self {
        let agent = ureq::Agent::new_with_defaults();
        Self { config, agent }
    }

    fn do_get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut req = self.agent.get(url).header("User-Agent", USER_AGENT);
        if let Some(ref token) = self.config.auth_token {
            req = req.header("Authorization", &format!("Bearer {token}"));
        }
        let resp = match req.call() {
            Ok(r) => r,
            Err(ureq::Error::StatusCode(404)) => {
                return Err(FetchError::NotFound(url.to_owned()));
            }
            Err(ureq::Error::StatusCode(code)) => {
                return Err(FetchError::Http(format!("HTTP {code} for {url}")));
            }
            Err(e) => {
                return Err(FetchError::Http(format!("{url}: {e}")));
            }
        };

        let code = resp.status().as_u16();
        if code == 404 {
            return Err(FetchError::NotFound(url.to_owned()));
        }
        if code >= 400 {
            return Err(FetchError::Http(format!("HTTP {code} for {url}")));
        }

        let mut reader = resp.into_body().into_reader();
        let mut body = Vec::new();
        reader
            .read_to_end(&mut body)
            .map_err(|e| FetchError::Http(format!("{url}: {e}")))?;
        Ok(body)
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, location: &FileLocation) -> Result<Vec<u8>, FetchError> {
        let FileLocation::Url(url) = location else {
            return Err(FetchError::UnsupportedLocation(location.to_string()));
        };
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(FetchError::UnsupportedLocation(url.clone()));
        }
        tracing::debug!("GET {url}");
        let body = self.do_get(url)?;
        tracing::debug!("GET {url}: {} bytes", body.len());
        Ok(body)
    }
}
