//! HTTP adapters for the generator and the delivery sink.

pub mod openai;
pub mod slack;

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;

const REQUEST_TIMEOUT_SECS: u64 = 120;

pub fn http_client() -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .context("building HTTP client")
}
