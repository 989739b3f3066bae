//! Flowintel reporting: one case per token, reports kept in the case note.

use anyhow::{Context, Result};
use async_trait::async_trait;
use flowintel_client::{FlowintelClient, NewCase};

use crate::file_config::ModuleConfig;
use crate::modules::format;
use crate::modules::registry::ModuleEnv;
use crate::modules::{ExternalId, ReportItem, ReportingModule};

pub struct FlowintelModule {
    client: FlowintelClient,
    label: String,
    misp_url: String,
}

impl FlowintelModule {
    pub fn from_config(config: &ModuleConfig, env: &ModuleEnv) -> Result<Self> {
        let url = config.str("url").context("flowintel: 'url' is required")?;
        let client = FlowintelClient::new(
            url,
            config.str("auth_key").unwrap_or_default(),
            config.bool_or("verify_cert", true),
        )?;

        Ok(Self {
            client,
            label: config.string_or("name", "Draugnet"),
            misp_url: env.misp_url.clone(),
        })
    }

    fn header(&self, intro: &str, item: &ReportItem<'_>) -> String {
        let event = item.event;
        format!(
            "{intro}\n\n\
             **Submission type**: {context}\n\n\
             **Submitted by**: {submitter}\n\n\
             **MISP Event UUID**: {uuid}\n\n\
             **MISP URL**: {link}\n",
            context = item.context,
            submitter = format::submitter(event),
            uuid = format::record_uuid(event),
            link = format::record_link(&self.misp_url, event),
        )
    }

    fn case_description(&self, item: &ReportItem<'_>) -> String {
        let mut description = self.header(
            "A new Draugnet report has been posted. Please check the MISP instance for more details.",
            item,
        );
        if let Some(summary) = item.enhanced_text {
            description.push_str(&format!("\n{summary}\n"));
        }
        description
    }

    fn update_note(&self, item: &ReportItem<'_>) -> String {
        let mut note = self.header("The report has been updated via Draugnet:", item);
        if let Some(summary) = item.enhanced_text {
            note.push_str(&format!("\n{summary}\n"));
        }
        let sections = format::markdown_sections(item);
        let reports = if sections.is_empty() {
            "None".to_string()
        } else {
            format::join_sections(&sections)
        };
        note.push_str(&format!(
            "\n**Tags**: {tags}\n\n**Reports**:\n\n{reports}\n\n{rule}\n",
            tags = format::list_or_none(&format::tags(item.event)),
            rule = format::SECTION_RULE,
        ));
        note
    }
}

#[async_trait]
impl ReportingModule for FlowintelModule {
    fn name(&self) -> &str {
        "flowintel"
    }

    async fn create_item(&self, item: &ReportItem<'_>) -> Result<ExternalId> {
        let case = NewCase {
            title: format!(
                "{} - {}",
                format::subject(&self.label, item.event),
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
            ),
            description: self.case_description(item),
            is_private: false,
            tags: format::marking_tags(item.event),
        };
        tracing::info!(record = %format::record_uuid(item.event), "Creating Flowintel case");
        let case_id = self.client.create_case(&case).await?;

        let sections = format::plain_sections(item);
        if !sections.is_empty() {
            let notes = sections.join(&format!("\n{}\n\n", format::SECTION_RULE));
            // The case exists either way; losing its id would orphan it.
            if let Err(e) = self.client.modify_case_note(&case_id, &notes).await {
                tracing::warn!(case_id = %case_id, error = %e, "Flowintel case created but note not saved");
            }
        }
        Ok(case_id)
    }

    async fn update_item(&self, external_id: &str, item: &ReportItem<'_>) -> Result<()> {
        self.client
            .modify_case_note(external_id, &self.update_note(item))
            .await?;
        Ok(())
    }
}
