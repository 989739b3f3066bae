//! Executive summaries from a local Ollama model.

use std::sync::LazyLock;

use anyhow::Result;
use async_trait::async_trait;
use misp_client::MispEvent;
use ollama_client::OllamaClient;
use regex::Regex;
use serde_json::Value;

use crate::file_config::ModuleConfig;
use crate::modules::{ActionType, EnhancementContent, EnhancementModule, SubmissionContext};

static RE_THINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<think>.*?</think>\s*").unwrap());

pub const DEFAULT_MODEL: &str = "qwen3:30b";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

pub const DEFAULT_PROMPT: &str = "Produce a clear, concise executive summary of the submitted \
incident report received via an anonymous reporting form of a CERT.\n\n\
--- INPUT START ---\n{input}\n--- INPUT END ---\n";

pub const DEFAULT_RECORD_PROMPT: &str = "Produce a clear, concise executive summary of the \
submitted MISP report.\n\n\
--- INPUT START ---\n{input}\n--- INPUT END ---\n";

pub struct OllamaModule {
    client: OllamaClient,
    model: String,
    prompt: Option<String>,
}

impl OllamaModule {
    pub fn from_config(config: &ModuleConfig) -> Result<Self> {
        let client = OllamaClient::new(
            &config.string_or("url", ollama_client::DEFAULT_URL),
            config.u64_or("timeout", DEFAULT_TIMEOUT_SECS),
        )?;
        Ok(Self {
            client,
            model: config.string_or("model", DEFAULT_MODEL),
            prompt: config.str("prompt").map(String::from),
        })
    }

    fn prompt_for(&self, context: SubmissionContext, input: &str) -> String {
        let template = match (&self.prompt, context) {
            (Some(custom), _) => custom.as_str(),
            (None, SubmissionContext::Freetext) => DEFAULT_PROMPT,
            (None, _) => DEFAULT_RECORD_PROMPT,
        };
        template.replace("{input}", input)
    }
}

#[async_trait]
impl EnhancementModule for OllamaModule {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn run(
        &self,
        action: ActionType,
        context: SubmissionContext,
        content: &EnhancementContent,
    ) -> Result<EnhancementContent> {
        let input = match content {
            EnhancementContent::Event(event) => summarize_record(event),
            EnhancementContent::Text(text) => text.clone(),
        };
        tracing::info!(%action, %context, model = %self.model, "Requesting summary");

        let prompt = self.prompt_for(context, &input);
        let response = self.client.generate(&self.model, &prompt).await?;
        Ok(EnhancementContent::Text(strip_think(&response)))
    }
}

/// Compact description of a record, most important parts first since the
/// model truncates long prompts from the end.
pub fn summarize_record(event: &MispEvent) -> String {
    let mut summary = format!("Submission info: {}\n", event.info);

    let tags: Vec<&str> = event.tag_names().collect();
    if !tags.is_empty() {
        summary.push_str(&format!("Tags: {}\n", tags.join(", ")));
    }

    let clusters = galaxy_clusters(event);
    if !clusters.is_empty() {
        summary.push_str(&format!("Clusters: {}\n", clusters.join(", ")));
    }

    let reports: Vec<&str> = event
        .event_reports
        .iter()
        .map(|r| r.name.as_str())
        .filter(|n| !n.is_empty())
        .collect();
    if !reports.is_empty() {
        summary.push_str(&format!("Reports: {}\n", reports.join("; ")));
    }

    let objects: Vec<&str> = event
        .objects
        .iter()
        .map(|o| o.name.as_str())
        .filter(|n| !n.is_empty())
        .collect();
    if !objects.is_empty() {
        summary.push_str(&format!("Objects: {}\n", objects.join(", ")));
    }

    let attributes: Vec<&str> = event
        .attributes
        .iter()
        .map(|a| a.attribute_type.as_str())
        .collect();
    if !attributes.is_empty() {
        summary.push_str(&format!("Attributes: {}\n", attributes.join(", ")));
    }

    summary
}

/// Cluster values, either top-level or nested under `Galaxy`.
fn galaxy_clusters(event: &MispEvent) -> Vec<String> {
    let cluster_values = |clusters: Option<&Value>| -> Vec<String> {
        clusters
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|c| c.get("value").and_then(Value::as_str))
            .map(String::from)
            .collect()
    };

    let mut values = cluster_values(event.extra.get("GalaxyCluster"));
    for galaxy in event
        .extra
        .get("Galaxy")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        values.extend(cluster_values(galaxy.get("GalaxyCluster")));
    }
    values
}

pub fn strip_think(text: &str) -> String {
    RE_THINK.replace_all(text, "").into_owned()
}
