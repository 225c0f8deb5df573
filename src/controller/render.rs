use crate::models::{Link, Note, Section};
use chrono::{DateTime, Local};
use serde::Serialize;

/// One row of the section list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionListItem {
    pub id: i64,
    pub title: String,
    /// Last update, Unix milliseconds
    pub stamp: i64,
}

impl From<&Section> for SectionListItem {
    fn from(section: &Section) -> Self {
        SectionListItem {
            id: section.id,
            title: section.display_title().to_string(),
            stamp: section.updated.max(section.created),
        }
    }
}

/// Everything the detail view shows. Notes are newest-first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionDetail {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub links: Vec<Link>,
    pub notes: Vec<Note>,
    pub created: i64,
    pub updated: i64,
}

impl From<Section> for SectionDetail {
    fn from(section: Section) -> Self {
        let title = section.display_title().to_string();
        let links = section
            .links
            .into_iter()
            .map(|link| {
                if link.text.trim().is_empty() {
                    Link {
                        text: link.url.clone(),
                        url: link.url,
                    }
                } else {
                    link
                }
            })
            .collect();
        let mut notes = section.notes;
        notes.reverse();

        SectionDetail {
            id: section.id,
            title,
            content: section.content,
            links,
            notes,
            created: section.created,
            updated: section.updated,
        }
    }
}

/// Where view state ends up
pub trait RenderSink {
    /// An empty slice means "no sections yet"
    fn render_list(&mut self, items: &[SectionListItem]);
    fn render_detail(&mut self, detail: &SectionDetail);
}

/// Blocking questions put to the user
pub trait UserPrompt {
    /// None when the user cancels
    fn ask(&mut self, question: &str, default: &str) -> Option<String>;
    fn confirm(&mut self, question: &str) -> bool;
    fn alert(&mut self, message: &str);
}

/// Local date-time for a Unix millisecond stamp
pub fn format_timestamp(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}
