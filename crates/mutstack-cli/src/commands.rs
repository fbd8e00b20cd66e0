use std::sync::Arc;

use anyhow::{anyhow, Context};
use colored::Colorize;
use serde_json::{json, Value};

use mutstack_delta::Delta;
use mutstack_engine::memory::InMemoryEmbeddedStore;
use mutstack_engine::{
    ApplyOutcome, Document, EmbeddedUpdate, EngineConfig, LinkRevert, Mutation, MutationEngine,
    RevertOutcome, RevertReport, Selector, StackEntry,
};
use mutstack_types::MutationId;

use crate::cli::*;
use crate::file::FileDocument;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    match cli.command {
        Command::Apply(args) => cmd_apply(config, args, &cli.format).await,
        Command::Revert(args) => cmd_revert(config, args, &cli.format).await,
        Command::History(args) => cmd_history(config, args, &cli.format).await,
        Command::RevertAll(args) => cmd_revert_all(config, args, &cli.format).await,
    }
}

/// A document file with its embedded collections loaded into an engine.
struct Session {
    doc: FileDocument,
    store: Arc<InMemoryEmbeddedStore>,
    engine: MutationEngine,
}

impl Session {
    fn open(config: EngineConfig, path: &std::path::Path) -> anyhow::Result<Self> {
        let doc = FileDocument::open(path)?;
        let store = Arc::new(InMemoryEmbeddedStore::new());
        doc.seed_embedded(&store)?;
        let engine = MutationEngine::new(config, store.clone());
        Ok(Self { doc, store, engine })
    }

    fn save(&self) -> anyhow::Result<()> {
        self.doc.absorb_embedded(&self.store)?;
        self.doc.save()
    }
}

fn parse_object(raw: &str, what: &str) -> anyhow::Result<Delta> {
    let value: Value = serde_json::from_str(raw).with_context(|| format!("parsing {what}"))?;
    Delta::from_json(&value).with_context(|| format!("invalid {what}"))
}

fn parse_embedded(raw: &str, comparison_key: &str) -> anyhow::Result<(String, EmbeddedUpdate)> {
    let (collection, shorthand) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected COLLECTION=JSON, got {raw:?}"))?;
    let value: Value = serde_json::from_str(shorthand).context("parsing embedded update")?;
    let shorthand = Delta::from_json_literal(&value).context("invalid embedded update")?;
    Ok((
        collection.to_string(),
        EmbeddedUpdate::new(shorthand).keyed_by(comparison_key),
    ))
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn cmd_apply(config: EngineConfig, args: ApplyArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let session = Session::open(config, &args.doc)?;
    let mut mutation = Mutation::new(session.doc.uuid().clone())
        .with_update(parse_object(&args.update, "update")?);
    for raw in &args.embedded {
        let (collection, update) = parse_embedded(raw, &args.comparison_key)?;
        mutation = mutation.with_embedded(collection, update);
    }
    if let Some(name) = &args.name {
        mutation = mutation.named(name);
    }
    if args.permanent {
        mutation = mutation.permanent();
    }

    let outcome = session.engine.apply(&session.doc, &mutation).await?;
    session.save()?;

    let ApplyOutcome::Applied(report) = outcome else {
        match format {
            OutputFormat::Json => print_json(&json!({"status": "cancelled"}))?,
            OutputFormat::Text => println!("{} Mutation cancelled.", "✗".red().bold()),
        }
        return Ok(());
    };

    match format {
        OutputFormat::Json => print_json(&json!({
            "status": "applied",
            "wrote": report.wrote,
            "fields": report.update.fields.to_json(),
            "embedded": report.embedded,
            "entry": report.entry,
        })),
        OutputFormat::Text => {
            if !report.wrote {
                println!("{} Nothing to change.", "✓".green());
                return Ok(());
            }
            println!("{} Mutation applied to {}", "✓".green().bold(), session.doc.uuid().to_string().cyan());
            for path in report.update.fields.leaf_paths() {
                println!("  {} {}", "set:".green(), path);
            }
            for collection in &report.embedded {
                println!("  {} {}", "embedded:".green(), collection.yellow());
            }
            match &report.entry {
                Some(entry) => println!("  Recorded: {}", describe(entry)),
                None => println!("  {}", "permanent, not recorded".dimmed()),
            }
            Ok(())
        }
    }
}

async fn cmd_revert(config: EngineConfig, args: RevertArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let selector = match (&args.name, &args.id) {
        (Some(name), _) => Selector::name(name.clone()),
        (None, Some(id)) => Selector::Id(id.parse::<MutationId>()?),
        (None, None) => Selector::Latest,
    };
    let session = Session::open(config, &args.doc)?;
    let outcome = session.engine.revert(&session.doc, &selector).await?;
    session.save()?;

    match format {
        OutputFormat::Json => print_json(&outcome_json(&outcome)),
        OutputFormat::Text => {
            print_outcome(&outcome, 0);
            Ok(())
        }
    }
}

async fn cmd_history(config: EngineConfig, args: HistoryArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let session = Session::open(config, &args.doc)?;
    let stack = session.engine.history(&session.doc).await?;

    match format {
        OutputFormat::Json => print_json(&json!(stack.entries())),
        OutputFormat::Text => {
            if stack.is_empty() {
                println!("No mutations recorded.");
                return Ok(());
            }
            for (index, entry) in stack.iter().enumerate().rev() {
                println!("{} {}", format!("#{index}").yellow(), describe(entry));
                for path in entry.delta.leaf_paths() {
                    println!("    {} {}", "restores".dimmed(), path);
                }
                for link in &entry.links {
                    println!("    {} {} {}", "links".dimmed(), link.uuid.to_string().cyan(), link.mutation_id.short_id());
                }
            }
            Ok(())
        }
    }
}

async fn cmd_revert_all(config: EngineConfig, args: RevertAllArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let session = Session::open(config, &args.doc)?;
    let outcomes = session.engine.revert_all(&session.doc).await?;
    session.save()?;

    match format {
        OutputFormat::Json => print_json(&Value::Array(outcomes.iter().map(outcome_json).collect())),
        OutputFormat::Text => {
            if outcomes.is_empty() {
                println!("No mutations recorded.");
            }
            for outcome in &outcomes {
                print_outcome(outcome, 0);
            }
            Ok(())
        }
    }
}

fn describe(entry: &StackEntry) -> String {
    let owner = if entry.owner { "owner".green() } else { "guest".red() };
    format!(
        "{} {} [{}] ({})",
        entry.id.short_id().dimmed(),
        entry.label().bold(),
        entry.kind.as_str().cyan(),
        owner
    )
}

fn outcome_json(outcome: &RevertOutcome) -> Value {
    match outcome {
        RevertOutcome::Cancelled => json!({"status": "cancelled"}),
        RevertOutcome::NotFound { document, selector } => json!({
            "status": "not_found",
            "document": document,
            "selector": selector.to_string(),
        }),
        RevertOutcome::Requested(result) => json!({"status": "requested", "result": result}),
        RevertOutcome::Reverted(report) => reverted_json(report),
    }
}

fn reverted_json(report: &RevertReport) -> Value {
    let links: Vec<Value> = report.links.iter().map(link_json).collect();
    json!({
        "status": "reverted",
        "entry": report.entry,
        "wrote": report.apply.wrote,
        "fields": report.apply.update.fields.to_json(),
        "links": links,
    })
}

fn link_json(link: &LinkRevert) -> Value {
    let outcome = match &link.outcome {
        Ok(outcome) => outcome_json(outcome),
        Err(e) => json!({"status": "failed", "error": e.to_string()}),
    };
    json!({"link": link.link, "outcome": outcome})
}

fn print_outcome(outcome: &RevertOutcome, depth: usize) {
    let indent = "  ".repeat(depth);
    match outcome {
        RevertOutcome::Cancelled => println!("{indent}{} Revert cancelled.", "✗".red().bold()),
        RevertOutcome::NotFound { document, selector } => {
            println!("{indent}{} No mutation matching {} on {}", "✗".red().bold(), selector, document.to_string().cyan());
        }
        RevertOutcome::Requested(result) => {
            println!("{indent}{} Revert of {} requested from the owner of {}", "→".blue().bold(), result.mutation_id.short_id(), result.document.to_string().cyan());
        }
        RevertOutcome::Reverted(report) => {
            println!("{indent}{} Reverted {}", "✓".green().bold(), describe(&report.entry));
            if !report.apply.wrote {
                println!("{indent}  {}", "no fields left to restore".dimmed());
            }
            for link in &report.links {
                println!("{indent}  {} {}", "link".dimmed(), link.link.uuid.to_string().cyan());
                match &link.outcome {
                    Ok(nested) => print_outcome(nested, depth + 2),
                    Err(e) => println!("{indent}    {} {}", "failed:".red(), e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::{Path, PathBuf};

    fn write_doc(dir: &tempfile::TempDir, value: Value) -> PathBuf {
        let path = dir.path().join("Actor.hero.json");
        std::fs::write(&path, value.to_string()).unwrap();
        path
    }

    fn read_doc(path: &Path) -> Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    async fn run(args: &[&str]) -> anyhow::Result<()> {
        let cli = Cli::try_parse_from(std::iter::once("mutstack").chain(args.iter().copied()))?;
        run_command(cli).await
    }

    #[tokio::test]
    async fn apply_then_revert_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_doc(&dir, json!({"data": {"hp": 10}}));
        let doc = path.to_str().unwrap();

        run(&["apply", "--doc", doc, "--update", r#"{"hp": 20}"#, "--name", "buff"]).await.unwrap();
        let after = read_doc(&path);
        assert_eq!(after["data"]["hp"], json!(20));
        assert_eq!(after["flags"]["mutstack"]["mutate"][0]["name"], json!("buff"));

        run(&["revert", "--doc", doc, "--name", "buff"]).await.unwrap();
        let after = read_doc(&path);
        assert_eq!(after["data"], json!({"hp": 10}));
        assert!(after.get("flags").is_none());
    }

    #[tokio::test]
    async fn permanent_apply_leaves_no_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_doc(&dir, json!({"data": {}}));
        let doc = path.to_str().unwrap();
        run(&["apply", "--doc", doc, "--update", r#"{"a.b": 1}"#, "--permanent", "--format", "json"])
            .await
            .unwrap();
        let after = read_doc(&path);
        assert_eq!(after["data"], json!({"a": {"b": 1}}));
        assert!(after.get("flags").is_none());
    }

    #[tokio::test]
    async fn embedded_updates_are_recorded_and_reverted() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_doc(&dir, json!({"data": {}}));
        let doc = path.to_str().unwrap();
        let config = dir.path().join("engine.toml");
        std::fs::write(&config, "settle_delay_ms = 0\n").unwrap();
        let config = config.to_str().unwrap();

        run(&["--config", config, "apply", "--doc", doc, "--update", "{}", "--embedded", r#"items={"Sword": {"qty": 1}}"#])
            .await
            .unwrap();
        let after = read_doc(&path);
        assert_eq!(after["embedded"]["items"]["Sword"], json!({"name": "Sword", "qty": 1}));

        run(&["--config", config, "revert-all", "--doc", doc]).await.unwrap();
        let after = read_doc(&path);
        assert!(after.get("embedded").is_none());
        assert!(after.get("flags").is_none());
    }

    #[tokio::test]
    async fn embedded_item_names_may_contain_dots() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_doc(&dir, json!({"data": {}}));
        let doc = path.to_str().unwrap();
        let config = dir.path().join("engine.toml");
        std::fs::write(&config, "settle_delay_ms = 0\n").unwrap();
        let config = config.to_str().unwrap();

        let embedded = r#"items={"Potion 1.5": {"qty": 2}}"#;
        run(&["--config", config, "apply", "--doc", doc, "--update", "{}", "--embedded", embedded])
            .await
            .unwrap();
        let after = read_doc(&path);
        assert_eq!(after["embedded"]["items"]["Potion 1.5"], json!({"name": "Potion 1.5", "qty": 2}));
        assert!(after["flags"]["mutstack"]["mutate"][0]["delta"]["embedded"]["items"]
            .get("-=Potion 1.5")
            .is_some());

        run(&["--config", config, "revert-all", "--doc", doc]).await.unwrap();
        let after = read_doc(&path);
        assert!(after.get("embedded").is_none());
        assert!(after.get("flags").is_none());
    }

    #[tokio::test]
    async fn revert_all_and_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_doc(&dir, json!({"data": {"hp": 1}}));
        let doc = path.to_str().unwrap();
        run(&["apply", "--doc", doc, "--update", r#"{"hp": 2}"#]).await.unwrap();
        run(&["apply", "--doc", doc, "--update", r#"{"-=hp": null}"#]).await.unwrap();
        run(&["history", "--doc", doc]).await.unwrap();
        assert_eq!(read_doc(&path)["flags"]["mutstack"]["mutate"].as_array().unwrap().len(), 2);

        run(&["revert-all", "--doc", doc, "--format", "json"]).await.unwrap();
        assert_eq!(read_doc(&path)["data"], json!({"hp": 1}));
    }

    #[tokio::test]
    async fn unknown_revert_target_is_reported_not_failed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_doc(&dir, json!({"data": {}}));
        let doc = path.to_str().unwrap();
        run(&["revert", "--doc", doc, "--name", "missing"]).await.unwrap();
    }

    #[tokio::test]
    async fn bad_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_doc(&dir, json!({"data": {}}));
        let doc = path.to_str().unwrap();
        assert!(run(&["apply", "--doc", doc, "--update", "[1]"]).await.is_err());
        assert!(run(&["apply", "--doc", doc, "--update", r#"{"a..b": 1}"#]).await.is_err());
        assert!(run(&["apply", "--doc", doc, "--update", "{}", "--embedded", "items"]).await.is_err());
        assert!(run(&["revert", "--doc", doc, "--id", "not-an-id"]).await.is_err());
        assert!(run(&["revert", "--doc", doc, "--name", "a", "--id", "b"]).await.is_err());
    }
}
