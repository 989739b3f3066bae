pub mod error;

pub use error::{FlowintelError, Result};

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

/// Payload for `POST /api/case/create`.
#[derive(Debug, Clone, Serialize)]
pub struct NewCase {
    pub title: String,
    pub description: String,
    pub is_private: bool,
    pub tags: Vec<String>,
}

#[derive(Serialize)]
struct CaseNote<'a> {
    note: &'a str,
}

pub struct FlowintelClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl FlowintelClient {
    pub fn new(base_url: &str, api_key: &str, verify_cert: bool) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .danger_accept_invalid_certs(!verify_cert)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn post_json<T: Serialize>(&self, path: &str, body: &T) -> Result<Value> {
        let resp = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("X-API-KEY", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(FlowintelError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.json().await?)
    }

    /// Create a case. Returns the new case id.
    pub async fn create_case(&self, case: &NewCase) -> Result<String> {
        let data = self.post_json("/api/case/create", case).await?;
        let case_id = match data.get("case_id") {
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            _ => return Err(FlowintelError::MissingCaseId),
        };
        tracing::info!(case_id = %case_id, "Flowintel case created");
        Ok(case_id)
    }

    /// Replace the case note. Flowintel keeps a single note per case.
    pub async fn modify_case_note(&self, case_id: &str, note: &str) -> Result<Value> {
        let path = format!("/api/case/{case_id}/modif_case_note");
        self.post_json(&path, &CaseNote { note }).await
    }
}
