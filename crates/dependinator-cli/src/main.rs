use anyhow::{Context, Result, anyhow};
use clap::Parser;
use dependinator_core::ParsedItem;
use dependinator_events::{Event, EventBus, EventListener};
use dependinator_graph::{ItemSender, ModelService, ModelSettings};
use dependinator_storage::Storage;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Parser output: one JSON node or link record per line
    #[arg(short, long)]
    items: PathBuf,

    /// Path to the SQLite database holding the saved model
    #[arg(short, long, default_value = "dependinator.db")]
    db: PathBuf,

    /// Optional JSON settings file
    #[arg(short, long)]
    settings: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
    let args = Args::parse();

    let settings = match &args.settings {
        Some(path) => ModelSettings::load(path)?,
        None => ModelSettings::default(),
    };
    let mut storage = Storage::open(&args.db)
        .with_context(|| format!("Failed to open database {}", args.db.display()))?;

    let service = ModelService::new(settings, EventBus::new());
    let loaded = service.load_or_default(&storage);
    service.events().dispatch_to(&mut ConsoleNotifier);
    println!("Loaded {loaded} stored items from {}", args.db.display());

    // The refresh consumes on its own thread; this thread is the parser.
    let (sender, refresh) = service.start_refresh();
    let fed = feed_items(&args.items, sender);
    let outcome = refresh
        .join()
        .map_err(|_| anyhow!("refresh thread panicked"))?;
    let fed = fed?;
    let outcome = outcome.context("Refresh failed, stored model left unchanged")?;

    println!(
        "Applied {} of {fed} records, removed {} nodes and {} links",
        outcome.applied_items, outcome.removed_nodes, outcome.removed_links
    );

    let saved = service.save(&mut storage)?;
    let stats = service.stats();
    println!(
        "Saved {saved} items: {} nodes, {} links, {} lines",
        stats.node_count, stats.link_count, stats.line_count
    );
    Ok(())
}

/// Prints the notifications a UI would show.
struct ConsoleNotifier;

impl EventListener for ConsoleNotifier {
    fn handle_event(&mut self, event: &Event) {
        if let Event::ShowWarning { message } = event {
            eprintln!("warning: {message}");
        }
    }
}

/// Stream the records of `path` into the refresh. A malformed record fails
/// the whole refresh.
fn feed_items(path: &Path, mut sender: ItemSender) -> Result<usize> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            let _ = sender.fail(format!("cannot open {}: {err}", path.display()));
            return Err(err).with_context(|| format!("Failed to open {}", path.display()));
        }
    };

    let mut count = 0;
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let parsed = line
            .map_err(anyhow::Error::from)
            .and_then(|line| parse_record(&line));
        match parsed {
            Ok(Some(item)) => {
                sender.send(item)?;
                count += 1;
            }
            Ok(None) => {}
            Err(err) => {
                let reason = format!("{}:{}: {err:#}", path.display(), index + 1);
                let _ = sender.fail(reason.clone());
                return Err(anyhow!(reason));
            }
        }
    }
    sender.complete()?;
    Ok(count)
}

fn parse_record(line: &str) -> Result<Option<ParsedItem>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let item = serde_json::from_str(line).context("Invalid parser record")?;
    Ok(Some(item))
}
