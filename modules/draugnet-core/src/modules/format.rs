//! Rendering helpers shared by the reporting modules.

use misp_client::{EventReport, MispEvent};

use super::ReportItem;
use crate::normalize::SUBMITTER_TAG_PREFIX;

pub const UNKNOWN_SUBMITTER: &str = "unknown";
pub const DEFAULT_SUBJECT: &str = "Draugnet Report";
pub const SECTION_RULE: &str = "=================================================";
const REPORT_RULE: &str = "-------------------------------------------------";

pub fn submitter(event: &MispEvent) -> &str {
    event
        .tag_names()
        .find_map(|t| t.strip_prefix(SUBMITTER_TAG_PREFIX))
        .unwrap_or(UNKNOWN_SUBMITTER)
}

/// Every tag except the submitter tag.
pub fn tags(event: &MispEvent) -> Vec<&str> {
    event
        .tag_names()
        .filter(|t| !t.starts_with(SUBMITTER_TAG_PREFIX))
        .collect()
}

/// TLP and PAP marking tags only.
pub fn marking_tags(event: &MispEvent) -> Vec<String> {
    event
        .tag_names()
        .filter(|t| matches!(t.split(':').next(), Some("tlp" | "PAP")))
        .map(String::from)
        .collect()
}

pub fn record_uuid(event: &MispEvent) -> String {
    event.uuid.map(|u| u.to_string()).unwrap_or_default()
}

pub fn record_link(misp_url: &str, event: &MispEvent) -> String {
    format!("{}/events/view/{}", misp_url.trim_end_matches('/'), record_uuid(event))
}

/// `[<label>] <record info>`
pub fn subject(label: &str, event: &MispEvent) -> String {
    let info = if event.info.trim().is_empty() {
        DEFAULT_SUBJECT
    } else {
        event.info.as_str()
    };
    format!("[{label}] {info}")
}

/// Submitted reports first, then the ones already on the record.
fn all_reports<'a>(item: &ReportItem<'a>) -> impl Iterator<Item = &'a EventReport> {
    item.reports.iter().chain(item.event.event_reports.iter())
}

pub fn plain_sections(item: &ReportItem<'_>) -> Vec<String> {
    all_reports(item)
        .map(|r| format!("{}\n{REPORT_RULE}\n\n{}", r.name, r.content))
        .collect()
}

pub fn markdown_sections(item: &ReportItem<'_>) -> Vec<String> {
    all_reports(item)
        .map(|r| format!("**{}**\n\n{}", r.name, r.content))
        .collect()
}

pub fn join_sections(sections: &[String]) -> String {
    sections.join(&format!("\n\n{SECTION_RULE}\n\n"))
}

pub fn list_or_none(items: &[&str]) -> String {
    if items.is_empty() {
        "None".to_string()
    } else {
        items.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::SubmissionContext;
    use misp_client::Tag;

    fn tagged(names: &[&str]) -> MispEvent {
        MispEvent {
            info: "Draugnet report: C2".into(),
            tags: names.iter().map(|n| Tag::new(*n)).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn submitter_and_tags_are_split() {
        let event = tagged(&["source:draugnet", "submitter:alice", "tlp:green", "PAP:RED"]);
        assert_eq!(submitter(&event), "alice");
        assert_eq!(tags(&event), vec!["source:draugnet", "tlp:green", "PAP:RED"]);
        assert_eq!(marking_tags(&event), vec!["tlp:green", "PAP:RED"]);
    }

    #[test]
    fn anonymous_submitter() {
        assert_eq!(submitter(&tagged(&["source:draugnet"])), UNKNOWN_SUBMITTER);
    }

    #[test]
    fn subject_falls_back_for_blank_info() {
        assert_eq!(subject("SOC", &tagged(&[])), "[SOC] Draugnet report: C2");
        assert_eq!(subject("SOC", &MispEvent::default()), "[SOC] Draugnet Report");
    }

    #[test]
    fn sections_list_submitted_reports_first() {
        let mut event = tagged(&[]);
        event.add_event_report("Additional report description", "older");
        let submitted = vec![EventReport::new("Draugnet Report submission", "new")];
        let item = ReportItem {
            context: SubmissionContext::Freetext,
            token: "t",
            event: &event,
            reports: &submitted,
            enhanced_text: None,
        };

        let plain = plain_sections(&item);
        assert_eq!(plain.len(), 2);
        assert!(plain[0].starts_with("Draugnet Report submission\n---"));
        assert!(plain[0].ends_with("\n\nnew"));

        let markdown = markdown_sections(&item);
        assert_eq!(markdown[1], "**Additional report description**\n\nolder");
    }
}
