//! RTIR reporting: one ticket per token, comments for follow-ups.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rtir_client::{NewTicket, RtirClient};

use crate::file_config::ModuleConfig;
use crate::modules::format;
use crate::modules::registry::ModuleEnv;
use crate::modules::{ExternalId, ReportItem, ReportingModule};

pub struct RtirModule {
    client: RtirClient,
    queue: String,
    label: String,
    misp_url: String,
}

impl RtirModule {
    pub fn from_config(config: &ModuleConfig, env: &ModuleEnv) -> Result<Self> {
        let url = config.str("url").context("rtir: 'url' is required")?;
        let client = RtirClient::new(
            url,
            config.str("auth_key").unwrap_or_default(),
            config.bool_or("verify_cert", true),
        )?;

        Ok(Self {
            client,
            queue: config.string_or("queue", ""),
            label: config.string_or("name", "Draugnet"),
            misp_url: env.misp_url.clone(),
        })
    }

    fn body(&self, intro: &str, item: &ReportItem<'_>) -> String {
        let event = item.event;
        let sections = format::plain_sections(item);
        let reports = if sections.is_empty() {
            "None".to_string()
        } else {
            format::join_sections(&sections)
        };

        let mut body = format!(
            "{intro}\n\n\
             Submission type: {context}\n\n\
             Submitted by: {submitter}\n\n\
             MISP Event UUID: {uuid}\n\n\
             MISP URL: {link}\n\n\
             Tags: {tags}\n\n",
            context = item.context,
            submitter = format::submitter(event),
            uuid = format::record_uuid(event),
            link = format::record_link(&self.misp_url, event),
            tags = format::list_or_none(&format::tags(event)),
        );
        if let Some(summary) = item.enhanced_text {
            body.push_str(&format!("Summary:\n\n{summary}\n\n"));
        }
        body.push_str(&format!(
            "Reports:\n\n{rule}\n\n{reports}\n\n{rule}\n",
            rule = format::SECTION_RULE
        ));
        body
    }
}

#[async_trait]
impl ReportingModule for RtirModule {
    fn name(&self) -> &str {
        "rtir"
    }

    async fn create_item(&self, item: &ReportItem<'_>) -> Result<ExternalId> {
        let ticket = NewTicket {
            queue: self.queue.clone(),
            subject: format::subject(&self.label, item.event),
            content: self.body(
                "A new Draugnet report has been posted. Please check the MISP instance for more details.",
                item,
            ),
        };
        tracing::info!(record = %format::record_uuid(item.event), "Creating RTIR ticket");
        Ok(self.client.create_ticket(&ticket).await?)
    }

    async fn update_item(&self, external_id: &str, item: &ReportItem<'_>) -> Result<()> {
        let content = self.body("The report has been updated via Draugnet:", item);
        self.client.comment(external_id, &content).await?;
        Ok(())
    }
}
