//! Minimal Horizon REST client.
//!
//! Covers the three endpoints this service touches: account lookup for
//! sequence numbers, claimable-balance paging, and classic transaction
//! submission.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value as Json;
use thiserror::Error;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Horizon client errors
#[derive(Debug, Error)]
pub enum HorizonError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed horizon response: {0}")]
    Malformed(String),

    #[error("submission failed ({status}): {detail}")]
    Submission { status: u16, detail: String },
}

/// One claimable balance record.
#[derive(Debug, Clone, Deserialize)]
pub struct ClaimableBalance {
    pub id: String,
    pub asset: String,
    pub amount: String,
}

#[derive(Debug, Deserialize)]
struct BalancePage {
    #[serde(rename = "_embedded")]
    embedded: EmbeddedRecords,
    #[serde(rename = "_links", default)]
    links: PageLinks,
}

#[derive(Debug, Deserialize)]
struct EmbeddedRecords {
    records: Vec<ClaimableBalance>,
}

#[derive(Debug, Default, Deserialize)]
struct PageLinks {
    #[serde(default)]
    next: Option<PageLink>,
}

#[derive(Debug, Deserialize)]
struct PageLink {
    href: String,
}

pub struct HorizonClient {
    client: reqwest::Client,
    base_url: String,
}

impl HorizonClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    /// Current sequence number of an account.
    pub async fn account_sequence(&self, account: &str) -> Result<i64, HorizonError> {
        let url = format!("{}/accounts/{}", self.base_url, account);
        let body: Json = self
            .client
            .get(&url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        body.get("sequence")
            .and_then(Json::as_str)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| HorizonError::Malformed(format!("no sequence for {account}")))
    }

    /// Every claimable balance for a claimant, following `next` links until
    /// a short page.
    pub async fn claimable_balances(
        &self,
        claimant: &str,
        page_limit: u32,
    ) -> Result<Vec<ClaimableBalance>, HorizonError> {
        let mut url = format!(
            "{}/claimable_balances?claimant={}&limit={}&order=asc",
            self.base_url, claimant, page_limit
        );
        let mut records = Vec::new();
        loop {
            let page: BalancePage = self
                .client
                .get(&url)
                .timeout(REQUEST_TIMEOUT)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            let batch = page.embedded.records;
            debug!(count = batch.len(), "claimable balance page");
            let full_page = batch.len() as u32 == page_limit;
            records.extend(batch);
            match page.links.next {
                Some(next) if full_page => url = next.href,
                _ => break,
            }
        }
        Ok(records)
    }

    /// Submit a signed classic transaction envelope. Returns the hash on
    /// success; failures carry the result codes Horizon reports.
    pub async fn submit_transaction(&self, envelope_b64: &str) -> Result<String, HorizonError> {
        let url = format!("{}/transactions", self.base_url);
        let response = self
            .client
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .form(&[("tx", envelope_b64)])
            .send()
            .await?;
        let status = response.status();
        let body: Json = response
            .json()
            .await
            .map_err(|e| HorizonError::Malformed(format!("submit response: {e}")))?;
        if !status.is_success() {
            let detail = body
                .get("extras")
                .and_then(|e| e.get("result_codes"))
                .map(|c| c.to_string())
                .unwrap_or_else(|| body.to_string());
            return Err(HorizonError::Submission {
                status: status.as_u16(),
                detail,
            });
        }
        body.get("hash")
            .and_then(Json::as_str)
            .map(str::to_string)
            .ok_or_else(|| HorizonError::Malformed("submit response missing hash".to_string()))
    }
}
