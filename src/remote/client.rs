//! HTTP implementation of the remote authority.

use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use tracing::debug;

use crate::config::Config;
use crate::error::RemoteError;
use crate::records::Discovery;

use super::Remote;

/// Client for the discovery collection endpoints.
///
/// Session state is ambient: the cookie store carries the login session, so
/// every request goes out with the user's credential context automatically.
#[derive(Clone)]
pub struct HttpRemote {
  http: Client,
  base_url: String,
}

impl HttpRemote {
  pub fn new(config: &Config) -> Result<Self, RemoteError> {
    let http = Client::builder().cookie_store(true).build()?;

    Ok(Self {
      http,
      base_url: config.remote.base_url.trim_end_matches('/').to_string(),
    })
  }

  fn collection_endpoint(&self) -> String {
    format!("{}/api/discoveries", self.base_url)
  }
}

#[async_trait]
impl Remote for HttpRemote {
  async fn fetch_all(&self) -> Result<HashMap<String, Discovery>, RemoteError> {
    let response = self.http.get(self.collection_endpoint()).send().await?;

    let status = response.status();
    if !status.is_success() {
      return Err(RemoteError::Rejected {
        status: status.as_u16(),
      });
    }

    let entries: HashMap<String, Discovery> = response.json().await?;
    debug!(count = entries.len(), "fetched discoveries");
    Ok(entries)
  }

  async fn push(&self, entries: &HashMap<String, Discovery>) -> Result<(), RemoteError> {
    let response = self
      .http
      .post(self.collection_endpoint())
      .json(entries)
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      return Err(RemoteError::Rejected {
        status: status.as_u16(),
      });
    }

    debug!(count = entries.len(), "pushed discoveries");
    Ok(())
  }
}
