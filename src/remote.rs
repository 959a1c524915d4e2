use std::time::Duration;

use reqwest::blocking::Client;

use crate::error::{Error, Result};

/// Islandora datastream holding the MODS record of an object.
pub const MODS_ENDPOINT: &str =
  "https://digital.lib.utk.edu/collections/islandora/object/{pid}/datastream/MODS";

pub const USER_AGENT: &str = concat!("exodus-collections/", env!("CARGO_PKG_VERSION"));

/// Where the raw MODS markup for a collection comes from.
pub trait MetadataSource {
  fn fetch(&self, pid: &str) -> Result<Vec<u8>>;
}

impl<S: MetadataSource + ?Sized> MetadataSource for &S {
  fn fetch(&self, pid: &str) -> Result<Vec<u8>> {
    (**self).fetch(pid)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
  /// URL template, `{pid}` is replaced by the collection identifier.
  pub endpoint: String,
  pub user_agent: String,
}

impl Default for FetchConfig {
  fn default() -> Self {
    FetchConfig {
      endpoint: MODS_ENDPOINT.to_string(),
      user_agent: USER_AGENT.to_string(),
    }
  }
}

impl FetchConfig {
  pub fn url_for(&self, pid: &str) -> String {
    self.endpoint.replace("{pid}", pid)
  }
}

/// Blocking HTTP source. One GET per call, no retries and no timeout.
pub struct HttpSource {
  client: Client,
  config: FetchConfig,
}

impl HttpSource {
  pub fn new(config: FetchConfig) -> Result<Self> {
    let client = Client::builder()
      .user_agent(config.user_agent.as_str())
      .timeout(None::<Duration>)
      .build()
      .map_err(Error::Client)?;
    Ok(HttpSource { client, config })
  }
}

impl MetadataSource for HttpSource {
  fn fetch(&self, pid: &str) -> Result<Vec<u8>> {
    let url = self.config.url_for(pid);
    tracing::info!(pid, url = %url, "Fetching MODS record");
    let resp = match self.client.get(&url).send() {
      Ok(resp) => resp,
      Err(source) => return Err(Error::Request { url, source }),
    };
    let status = resp.status();
    if !status.is_success() {
      return Err(Error::Status { url, status });
    }
    match resp.bytes() {
      Ok(bytes) => {
        tracing::debug!(pid, bytes = bytes.len(), "Received MODS record");
        Ok(bytes.to_vec())
      }
      Err(source) => Err(Error::Request { url, source }),
    }
  }
}
