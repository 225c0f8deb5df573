//! Drives the store on behalf of the UI and pushes results into a render sink.

mod render;

pub use render::{format_timestamp, RenderSink, SectionDetail, SectionListItem, UserPrompt};

use crate::database::StoreHandle;
use crate::error::Result;
use crate::models::{now_millis, Link, Note, SectionInput};
use crate::offline::OfflineCache;
use tracing::{info, warn};

const DEFAULT_SECTION_TITLE: &str = "New section";

/// Section created on first start so the list is not empty
pub fn sample_section() -> SectionInput {
    let now = now_millis();
    SectionInput {
        title: "What is a PWA".to_string(),
        content: "A PWA (Progressive Web App) is a web application that can behave like a \
                  native one: it ships a manifest and a service worker."
            .to_string(),
        links: vec![Link::new("https://developer.mozilla.org", Some("MDN: PWA"))],
        notes: vec![Note {
            text: "Add your own comments here".to_string(),
            when: now,
        }],
    }
}

pub struct ViewController<R: RenderSink, P: UserPrompt> {
    store: StoreHandle,
    sink: R,
    prompt: P,
    current: Option<i64>,
    seed_sample: bool,
}

impl<R: RenderSink, P: UserPrompt> ViewController<R, P> {
    pub fn new(store: StoreHandle, sink: R, prompt: P) -> Self {
        ViewController {
            store,
            sink,
            prompt,
            current: None,
            seed_sample: true,
        }
    }

    pub fn with_seed_sample(mut self, seed: bool) -> Self {
        self.seed_sample = seed;
        self
    }

    /// Id of the section shown in the detail view, if any
    pub fn current(&self) -> Option<i64> {
        self.current
    }

    pub fn sink(&self) -> &R {
        &self.sink
    }

    pub fn prompt(&self) -> &P {
        &self.prompt
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    /// Seeds the sample section into an empty store and shows the list
    pub async fn init(&mut self) -> Result<()> {
        if self.seed_sample && self.store.get_all().await?.is_empty() {
            let id = self.store.create(sample_section()).await?;
            info!("Seeded sample section {}", id);
        }
        self.render_list().await
    }

    /// Registers the offline cache. Failure is logged and otherwise ignored.
    pub async fn register_offline(&self, cache: &OfflineCache) -> bool {
        match cache.register().await {
            Ok(_) => {
                info!("Offline cache registered");
                true
            }
            Err(e) => {
                warn!("Offline cache registration failed: {}", e);
                false
            }
        }
    }

    /// Renders every section, most recently updated first
    pub async fn render_list(&mut self) -> Result<()> {
        let mut sections = self.store.get_all().await?;
        sections.sort_by(|a, b| b.updated.cmp(&a.updated));

        let items: Vec<SectionListItem> = sections.iter().map(SectionListItem::from).collect();
        self.sink.render_list(&items);
        Ok(())
    }

    /// Shows one section. Returns false, after alerting, when it doesn't exist.
    pub async fn open_section(&mut self, id: i64) -> Result<bool> {
        let Some(section) = self.store.get_one(id).await? else {
            self.prompt.alert("Section not found");
            return Ok(false);
        };

        self.current = Some(id);
        self.sink.render_detail(&SectionDetail::from(section));
        Ok(true)
    }

    pub async fn back(&mut self) -> Result<()> {
        self.current = None;
        self.render_list().await
    }

    /// Asks for a title and creates an empty section with it
    pub async fn add_section(&mut self) -> Result<Option<i64>> {
        let title = match self.prompt.ask("Section title:", DEFAULT_SECTION_TITLE) {
            Some(title) if !title.trim().is_empty() => title.trim().to_string(),
            _ => return Ok(None),
        };

        let id = self.store.create(SectionInput::titled(title)).await?;
        self.render_list().await?;
        Ok(Some(id))
    }

    /// Appends a note to the open section
    pub async fn save_note(&mut self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            self.prompt.alert("Enter some text");
            return Ok(());
        }
        let Some(id) = self.current_or_alert() else {
            return Ok(());
        };

        match self.store.append_note(id, text).await? {
            Some(section) => self.sink.render_detail(&SectionDetail::from(section)),
            None => self.lost_current().await?,
        }
        Ok(())
    }

    /// Appends a link to the open section; blank text falls back to the url
    pub async fn add_link(&mut self, url: &str, text: &str) -> Result<()> {
        let url = url.trim();
        if url.is_empty() {
            self.prompt.alert("Enter a URL");
            return Ok(());
        }
        let Some(id) = self.current_or_alert() else {
            return Ok(());
        };

        let link = Link::new(url, Some(text));
        match self.store.append_link(id, link).await? {
            Some(section) => self.sink.render_detail(&SectionDetail::from(section)),
            None => self.lost_current().await?,
        }
        Ok(())
    }

    /// Deletes the open section after confirmation and returns to the list
    pub async fn delete_current(&mut self) -> Result<bool> {
        let Some(id) = self.current_or_alert() else {
            return Ok(false);
        };
        if !self.prompt.confirm("Delete this section permanently?") {
            return Ok(false);
        }

        self.store.remove(id).await?;
        self.back().await?;
        Ok(true)
    }

    /// Deletes a section from the list after confirmation
    pub async fn delete_section(&mut self, id: i64) -> Result<bool> {
        if !self.prompt.confirm("Delete section?") {
            return Ok(false);
        }

        self.store.remove(id).await?;
        if self.current == Some(id) {
            self.current = None;
        }
        self.render_list().await?;
        Ok(true)
    }

    fn current_or_alert(&mut self) -> Option<i64> {
        if self.current.is_none() {
            self.prompt.alert("No section is open");
        }
        self.current
    }

    // The open section vanished underneath us, e.g. deleted elsewhere.
    async fn lost_current(&mut self) -> Result<()> {
        self.prompt.alert("Section not found");
        self.back().await
    }
}
