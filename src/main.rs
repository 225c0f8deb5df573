use anyhow::Context;
use notebook_lib::config::load_config;
use notebook_lib::controller::{
    format_timestamp, RenderSink, SectionDetail, SectionListItem, UserPrompt, ViewController,
};
use notebook_lib::{build_offline_cache, logger, StoreHandle};
use std::io::{self, BufRead, Write};
use tracing::{info, warn};

struct ConsoleSink;

impl RenderSink for ConsoleSink {
    fn render_list(&mut self, items: &[SectionListItem]) {
        if items.is_empty() {
            println!("No sections yet. Use `new` to add one.");
            return;
        }
        for item in items {
            println!("[{}] {}  ({})", item.id, item.title, format_timestamp(item.stamp));
        }
    }

    fn render_detail(&mut self, detail: &SectionDetail) {
        println!("== {} ==", detail.title);
        if !detail.content.is_empty() {
            println!("{}", detail.content);
        }
        println!("Links:");
        for link in &detail.links {
            println!("  {} <{}>", link.text, link.url);
        }
        println!("Notes:");
        for note in &detail.notes {
            println!("  {}: {}", format_timestamp(note.when), note.text);
        }
    }
}

struct ConsolePrompt;

/// Prints `text` and reads one line; None at end of input
fn prompt_line(text: &str) -> io::Result<Option<String>> {
    print!("{}", text);
    io::stdout().flush()?;

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

// A console that cannot be read from counts as a cancelled prompt.
fn answer(text: &str) -> Option<String> {
    prompt_line(text).unwrap_or_else(|e| {
        warn!("Console prompt failed: {}", e);
        None
    })
}

impl UserPrompt for ConsolePrompt {
    fn ask(&mut self, question: &str, default: &str) -> Option<String> {
        answer(&format!("{} [{}] ", question, default)).map(|reply| {
            if reply.trim().is_empty() {
                default.to_string()
            } else {
                reply
            }
        })
    }

    fn confirm(&mut self, question: &str) -> bool {
        let reply = answer(&format!("{} [y/N] ", question));
        matches!(reply.as_deref().map(str::trim), Some("y" | "Y" | "yes"))
    }

    fn alert(&mut self, message: &str) {
        println!("! {}", message);
    }
}

const HELP: &str = "commands: list | open <id> | new | note <text> | link <url> [text] | delete [id] | back | quit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logger::init_logging();
    info!("Notebook starting...");

    let config = load_config().context("failed to load configuration")?;
    let store = StoreHandle::open(config.database_path()?)
        .await
        .context("section store is unavailable")?;

    let mut controller =
        ViewController::new(store, ConsoleSink, ConsolePrompt).with_seed_sample(config.seed_sample);

    if config.offline.enabled {
        match build_offline_cache(&config).await {
            Ok(cache) => {
                controller.register_offline(&cache).await;
            }
            Err(e) => warn!("Offline cache not available: {}", e),
        }
    }

    controller.init().await?;
    println!("{}", HELP);

    loop {
        let Some(line) = prompt_line("> ")? else { break };
        let (command, rest) = match line.trim().split_once(' ') {
            Some((command, rest)) => (command.to_string(), rest.trim().to_string()),
            None => (line.trim().to_string(), String::new()),
        };

        let result = match command.as_str() {
            "" => Ok(()),
            "list" | "back" => controller.back().await,
            "open" => match rest.parse::<i64>() {
                Ok(id) => controller.open_section(id).await.map(|_| ()),
                Err(_) => {
                    println!("usage: open <id>");
                    Ok(())
                }
            },
            "new" => controller.add_section().await.map(|_| ()),
            "note" => controller.save_note(&rest).await,
            "link" => {
                let (url, text) = rest.split_once(' ').unwrap_or((rest.as_str(), ""));
                controller.add_link(url, text).await
            }
            "delete" => match rest.parse::<i64>() {
                Ok(id) => controller.delete_section(id).await.map(|_| ()),
                Err(_) => controller.delete_current().await.map(|_| ()),
            },
            "quit" | "exit" => break,
            _ => {
                println!("{}", HELP);
                Ok(())
            }
        };

        // Storage failures are reported, not fatal to the session
        if let Err(e) = result {
            eprintln!("error: {}", e);
        }
    }

    Ok(())
}
