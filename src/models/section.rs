use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Title shown for a section whose title is blank
pub const UNTITLED: &str = "Untitled";

/// Current wall-clock time in Unix milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub url: String,
    pub text: String,
}

impl Link {
    /// Builds a link, falling back to the url when no text is given.
    pub fn new(url: impl Into<String>, text: Option<&str>) -> Self {
        let url = url.into();
        let text = match text.map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => url.clone(),
        };
        Link { url, text }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub text: String,
    pub when: i64,
}

/// A persisted section: titled content, links and a note history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub notes: Vec<Note>,
    pub created: i64,
    pub updated: i64,
}

/// Represents a new section to be inserted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionInput {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub notes: Vec<Note>,
}

impl SectionInput {
    /// An empty section with only a title
    pub fn titled(title: impl Into<String>) -> Self {
        SectionInput {
            title: title.into(),
            ..Default::default()
        }
    }
}

impl Section {
    /// Creates a Section stamped with `now` as both created and updated
    pub fn new(input: SectionInput, now: i64) -> Self {
        Section {
            id: 0, // Will be set by database
            title: input.title,
            content: input.content,
            links: input.links,
            notes: input.notes,
            created: now,
            updated: now,
        }
    }

    /// Title with the placeholder applied
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            UNTITLED
        } else {
            &self.title
        }
    }

    pub fn push_note(&mut self, text: impl Into<String>, now: i64) {
        let when = self.touch(now);
        self.notes.push(Note {
            text: text.into(),
            when,
        });
    }

    pub fn push_link(&mut self, link: Link, now: i64) {
        self.links.push(link);
        self.touch(now);
    }

    pub fn set_content(&mut self, content: impl Into<String>, now: i64) {
        self.content = content.into();
        self.touch(now);
    }

    // `updated` strictly advances even when two mutations share a millisecond.
    fn touch(&mut self, now: i64) -> i64 {
        self.updated = now.max(self.updated + 1).max(self.created);
        self.updated
    }
}
