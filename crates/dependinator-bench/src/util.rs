use dependinator_core::{NodeKind, ParsedItem, ParsedLink, ParsedNode};
use dependinator_events::EventBus;
use dependinator_graph::{ModelDb, ModelSettings, RefreshOutcome, Refresher, SharedModel, parser_channel};
use dependinator_storage::Storage;
use std::thread;
use tempfile::TempDir;

/// Shape of a generated assembly.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticShape {
    pub namespaces: usize,
    pub types_per_namespace: usize,
    pub members_per_type: usize,
    /// Outgoing references per member.
    pub links_per_member: usize,
}

impl SyntheticShape {
    pub fn member_count(&self) -> usize {
        self.namespaces * self.types_per_namespace * self.members_per_type
    }
}

fn member_name(shape: &SyntheticShape, index: usize) -> String {
    let members = shape.members_per_type;
    let types = shape.types_per_namespace;
    let member = index % members;
    let ty = (index / members) % types;
    let ns = index / (members * types);
    format!("Ns{ns}.Type{ty}.Member{member}(System.Int32)")
}

/// Deterministic parser output: every type and member record, then links
/// spreading across namespaces so line routing crosses several levels.
pub fn synthetic_items(shape: SyntheticShape) -> Vec<ParsedItem> {
    let mut items = Vec::new();
    for ns in 0..shape.namespaces {
        items.push(ParsedNode::new(format!("Ns{ns}"), NodeKind::Namespace).into());
        for ty in 0..shape.types_per_namespace {
            items.push(ParsedNode::new(format!("Ns{ns}.Type{ty}"), NodeKind::Type).into());
        }
    }

    let member_count = shape.member_count();
    for index in 0..member_count {
        items.push(ParsedNode::new(member_name(&shape, index), NodeKind::Member).into());
    }
    for index in 0..member_count {
        for offset in 1..=shape.links_per_member {
            // Multiplicative stride spreads targets over the whole model.
            let target = (index + offset * 7919) % member_count;
            if target == index {
                continue;
            }
            items.push(ParsedLink::new(member_name(&shape, index), member_name(&shape, target)).into());
        }
    }
    items
}

/// A model with `items` applied directly, without a refresh pipeline.
pub fn populated_model(items: &[ParsedItem]) -> ModelDb {
    let mut db = ModelDb::default();
    let stamp = db.begin_refresh();
    for item in items {
        db.apply_parsed_item(item, stamp);
    }
    db
}

/// Push `items` through the bounded parser queue and a refresh consumer thread.
pub fn run_refresh(model: &SharedModel, items: &[ParsedItem]) -> anyhow::Result<RefreshOutcome> {
    let settings = ModelSettings::default();
    let (mut sender, rx) = parser_channel(&settings.refresh);
    let refresher = Refresher::new(model.clone(), EventBus::new(), &settings.refresh);
    let handle = refresher.spawn(rx);

    let producer = {
        let items = items.to_vec();
        thread::spawn(move || -> anyhow::Result<()> {
            for item in items {
                sender.send(item)?;
            }
            sender.complete()?;
            Ok(())
        })
    };

    producer
        .join()
        .map_err(|_| anyhow::anyhow!("producer thread panicked"))??;
    let outcome = handle
        .join()
        .map_err(|_| anyhow::anyhow!("refresh thread panicked"))??;
    Ok(outcome)
}

/// Storage in a fresh temporary directory; keep the directory alive while
/// the storage is used.
pub fn temp_storage() -> anyhow::Result<(TempDir, Storage)> {
    let temp_dir = tempfile::tempdir()?;
    let storage = Storage::open(temp_dir.path().join("bench.db"))?;
    Ok((temp_dir, storage))
}
