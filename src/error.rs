use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("could not build the HTTP client")]
  Client(#[source] reqwest::Error),

  #[error("request for {url} failed")]
  Request {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  #[error("HTTP {status} for {url}")]
  Status {
    url: String,
    status: reqwest::StatusCode,
  },

  #[error("MODS record for {pid} is not well-formed XML")]
  Parse { pid: String },

  #[error("could not evaluate `{xpath}` against the MODS record for {pid}")]
  XPath { pid: String, xpath: String },

  #[error("sheet row {row} has no `{column}` column")]
  MissingColumn { row: usize, column: &'static str },

  #[error(transparent)]
  Csv(#[from] csv::Error),

  #[error(transparent)]
  Io(#[from] std::io::Error),

  #[error("could not move the finished sheet into {}", path.display())]
  Persist {
    path: PathBuf,
    #[source]
    source: tempfile::PersistError,
  },
}

pub type Result<T> = std::result::Result<T, Error>;
