pub mod error;

pub use error::{Result, RtirError};

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

/// Payload for `POST /REST/2.0/ticket`.
#[derive(Debug, Clone, Serialize)]
pub struct NewTicket {
    #[serde(rename = "Queue")]
    pub queue: String,
    #[serde(rename = "Subject")]
    pub subject: String,
    #[serde(rename = "Content")]
    pub content: String,
}

#[derive(Serialize)]
struct Comment<'a> {
    #[serde(rename = "Content")]
    content: &'a str,
    #[serde(rename = "ContentType")]
    content_type: &'static str,
}

pub struct RtirClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl RtirClient {
    pub fn new(base_url: &str, token: &str, verify_cert: bool) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .danger_accept_invalid_certs(!verify_cert)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    async fn post_json<T: Serialize>(&self, path: &str, body: &T) -> Result<Value> {
        let resp = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .query(&[("token", self.token.as_str())])
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(RtirError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.json().await?)
    }

    /// Create a ticket. Returns the new ticket id.
    pub async fn create_ticket(&self, ticket: &NewTicket) -> Result<String> {
        let data = self.post_json("/REST/2.0/ticket", ticket).await?;
        let id = ticket_id(&data).ok_or(RtirError::MissingTicketId)?;
        tracing::info!(ticket_id = %id, queue = %ticket.queue, "RTIR ticket created");
        Ok(id)
    }

    /// Add a plain-text comment to an existing ticket.
    pub async fn comment(&self, ticket_id: &str, content: &str) -> Result<Value> {
        let path = format!("/REST/2.0/ticket/{ticket_id}/comment");
        let body = Comment {
            content,
            content_type: "text/plain",
        };
        self.post_json(&path, &body).await
    }
}

/// RT answers with either `id` or `TicketId`, as a number or a string.
fn ticket_id(data: &Value) -> Option<String> {
    let raw = data.get("id").or_else(|| data.get("TicketId"))?;
    let id = match raw {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!id.is_empty()).then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn create_ticket_returns_numeric_id_as_string() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/REST/2.0/ticket"))
            .and(query_param("token", "rt-token"))
            .and(body_partial_json(json!({"Queue": "Incidents", "Subject": "[CERT] x"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 4711})))
            .mount(&server)
            .await;

        let client = RtirClient::new(&server.uri(), "rt-token", true).unwrap();
        let id = client
            .create_ticket(&NewTicket {
                queue: "Incidents".into(),
                subject: "[CERT] x".into(),
                content: "body".into(),
            })
            .await
            .unwrap();
        assert_eq!(id, "4711");
    }

    #[tokio::test]
    async fn comment_reports_api_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/REST/2.0/ticket/12/comment"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such ticket"))
            .mount(&server)
            .await;

        let client = RtirClient::new(&server.uri(), "rt-token", true).unwrap();
        let err = client.comment("12", "update").await.unwrap_err();
        assert!(matches!(err, RtirError::Api { status: 404, .. }));
    }

    #[test]
    fn ticket_id_accepts_either_key() {
        assert_eq!(ticket_id(&json!({"TicketId": "9"})), Some("9".into()));
        assert_eq!(ticket_id(&json!({"id": ""})), None);
        assert_eq!(ticket_id(&json!({})), None);
    }
}
