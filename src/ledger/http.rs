use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;

use ccore::id::RecordId;

use crate::ledger::{LedgerError, RecordQuery};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How a query service hands back the record bytes.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Raw,
    Hex,
}

/// Query service reached over HTTP(S).
///
/// `{id}` in the url template is replaced by the display hex of the record
/// id.
pub struct HttpQuery {
    name: String,
    template: String,
    format: ResponseFormat,
    client: reqwest::Client,
}

impl HttpQuery {
    pub fn new(name: &str, template: &str, format: ResponseFormat) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| unavailable(name, e))?;

        Ok(HttpQuery {
            name: name.to_string(),
            template: template.to_string(),
            format,
            client,
        })
    }

    pub fn url_for(&self, id: &RecordId) -> String {
        self.template.replace("{id}", &id.to_display_hex())
    }
}

#[async_trait(?Send)]
impl RecordQuery for HttpQuery {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_record(&self, id: &RecordId) -> Result<Vec<u8>, LedgerError> {
        let url = self.url_for(id);
        debug!("{}: GET {}", self.name, url);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| unavailable(&self.name, e))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(LedgerError::NotFound(*id));
        }
        if !status.is_success() {
            return Err(LedgerError::BackendUnavailable {
                backend: self.name.clone(),
                reason: format!("HTTP {}", status),
            });
        }

        let body = resp.bytes().await.map_err(|e| unavailable(&self.name, e))?;
        decode_body(&self.name, self.format, &body)
    }
}

fn unavailable(name: &str, e: reqwest::Error) -> LedgerError {
    LedgerError::BackendUnavailable {
        backend: name.to_string(),
        reason: e.to_string(),
    }
}

fn decode_body(name: &str, format: ResponseFormat, body: &[u8]) -> Result<Vec<u8>, LedgerError> {
    match format {
        ResponseFormat::Raw => Ok(body.to_vec()),
        ResponseFormat::Hex => {
            let text = std::str::from_utf8(body).map_err(|e| LedgerError::BackendUnavailable {
                backend: name.to_string(),
                reason: format!("hex body is not text: {}", e),
            })?;

            hex::decode(text.trim()).map_err(|e| LedgerError::BackendUnavailable {
                backend: name.to_string(),
                reason: format!("bad hex body: {}", e),
            })
        }
    }
}
