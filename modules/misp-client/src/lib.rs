pub mod error;
pub mod types;

pub use error::{MispError, Result};
pub use types::{Attribute, EventReport, ExportFormat, Exported, MispEvent, MispObject, Tag};

use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use types::SearchRequest;

pub struct MispClient {
    client: reqwest::Client,
    base_url: String,
    key: String,
}

impl MispClient {
    pub fn new(base_url: &str, key: &str, verify_cert: bool) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .danger_accept_invalid_certs(!verify_cert)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            key: key.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .header(AUTHORIZATION, &self.key)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .header(AUTHORIZATION, &self.key)
            .header(ACCEPT, "application/json")
    }

    /// Send a request and decode a JSON body, turning MISP's `errors`
    /// member into `MispError::Rejected`.
    async fn send_json(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let resp = request.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(MispError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = resp.json().await?;
        if let Some(errors) = body.get("errors") {
            return Err(MispError::Rejected(errors.to_string()));
        }
        Ok(body)
    }

    /// Create an event. Returns the event as stored by MISP (with its UUID).
    pub async fn add_event(&self, event: &MispEvent) -> Result<MispEvent> {
        let body = serde_json::json!({ "Event": event });
        let resp = self.send_json(self.post("/events/add").json(&body)).await?;
        let saved: MispEvent = unwrap_envelope(resp, "Event")?;
        tracing::debug!(uuid = ?saved.uuid, "MISP event created");
        Ok(saved)
    }

    pub async fn update_event(&self, event_id: Uuid, event: &MispEvent) -> Result<MispEvent> {
        let body = serde_json::json!({ "Event": event });
        let path = format!("/events/edit/{event_id}");
        let resp = self.send_json(self.post(&path).json(&body)).await?;
        unwrap_envelope(resp, "Event")
    }

    pub async fn get_event(&self, event_id: Uuid) -> Result<MispEvent> {
        let path = format!("/events/view/{event_id}");
        let resp = self.send_json(self.get(&path)).await?;
        unwrap_envelope(resp, "Event")
    }

    /// Attach a freeform report to an event. Returns the stored report.
    pub async fn add_event_report(
        &self,
        event_id: Uuid,
        report: &EventReport,
    ) -> Result<EventReport> {
        let body = serde_json::json!({ "EventReport": report });
        let path = format!("/eventReports/add/{event_id}");
        let resp = self.send_json(self.post(&path).json(&body)).await?;
        unwrap_envelope(resp, "EventReport")
    }

    /// Run MISP's entity extraction over a stored report.
    pub async fn extract_all_from_report(&self, report_id: Uuid) -> Result<Value> {
        let path = format!("/eventReports/extractAllFromReport/{report_id}");
        self.send_json(self.post(&path).body("{}")).await
    }

    pub async fn add_object(&self, event_id: Uuid, object: &MispObject) -> Result<MispObject> {
        let body = serde_json::json!({ "Object": object });
        let path = format!("/objects/add/{event_id}");
        let resp = self.send_json(self.post(&path).json(&body)).await?;
        unwrap_envelope(resp, "Object")
    }

    /// Export a single event through `restSearch` in the requested format.
    pub async fn search_event(&self, event_id: Uuid, format: ExportFormat) -> Result<Exported> {
        let search = SearchRequest {
            return_format: format.as_str(),
            eventid: event_id.to_string(),
            include_analyst_data: true,
            published: [true, false],
            include_server_correlations: false,
            include_feed_correlations: false,
            include_event_correlations: false,
            include_granular_correlations: false,
        };

        let resp = self
            .post("/events/restSearch")
            .json(&search)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(MispError::Api {
                status: status.as_u16(),
                message,
            });
        }

        if format.is_json() {
            Ok(Exported::Json(resp.json().await?))
        } else {
            Ok(Exported::Text(resp.text().await?))
        }
    }
}

/// MISP wraps single objects as `{"Event": {...}}`; accept both shapes.
fn unwrap_envelope<T: DeserializeOwned>(mut value: Value, key: &str) -> Result<T> {
    let inner = match value.get_mut(key) {
        Some(inner) => inner.take(),
        None => value,
    };
    Ok(serde_json::from_value(inner)?)
}
