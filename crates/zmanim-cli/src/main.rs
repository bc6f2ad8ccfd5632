mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use serde::Serialize;
use tracing::info;

use zmanim_engine::{
    day_times, format_short_time, DateWindow, DayTypeFeed, EmptyFeed, EngineConfig, HebcalArchive,
    InMemoryStore, NoaaCalculator, Occurrence, OccurrenceStore, PopulationScheduler,
    ReferencePoint, RuleDraft,
};

use crate::cli::{CliArgs, Command};

fn main() -> Result<()> {
    let args = CliArgs::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(args.log_filter())),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Times { date, config, json } => times(date, config.as_deref(), json),
        Command::Preview {
            rules,
            from,
            through,
            config,
            feed_dir,
            json,
        } => preview(&rules, from, through, config.as_deref(), feed_dir.as_deref(), json),
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config '{}'", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

// ── times ───────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct TimeRow {
    reference: ReferencePoint,
    label: &'static str,
    time: Option<String>,
}

fn times(date: NaiveDate, config: Option<&Path>, json: bool) -> Result<()> {
    let config = load_config(config)?;
    let location = config.location()?;
    let rows: Vec<TimeRow> = day_times(&NoaaCalculator::new(), date, &location)
        .into_iter()
        .map(|line| TimeRow {
            reference: line.reference,
            label: line.reference.label(),
            time: line.time.map(format_short_time),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("{}: {}", location.name, date.format("%A, %B %-d, %Y"));
    for row in rows {
        println!("{:<22} {}", row.label, row.time.as_deref().unwrap_or("--"));
    }
    Ok(())
}

// ── preview ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct PreviewRow {
    date: NaiveDate,
    time: String,
    name: String,
    needs_review: bool,
}

impl From<Occurrence> for PreviewRow {
    fn from(occurrence: Occurrence) -> Self {
        Self {
            time: occurrence.display_time(),
            date: occurrence.date,
            name: occurrence.name,
            needs_review: occurrence.needs_review,
        }
    }
}

fn preview(
    rules: &Path,
    from: NaiveDate,
    through: NaiveDate,
    config: Option<&Path>,
    feed_dir: Option<&Path>,
    json: bool,
) -> Result<()> {
    if from > through {
        bail!("--from {from} is after --through {through}");
    }
    let config = load_config(config)?;

    let text = std::fs::read_to_string(rules)
        .with_context(|| format!("failed to read rules '{}'", rules.display()))?;
    let drafts: Vec<RuleDraft> = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse rules '{}'", rules.display()))?;

    let archive = feed_dir.or(config.feed.archive_dir.as_deref());
    let feed: Arc<dyn DayTypeFeed> = match archive {
        Some(dir) => Arc::new(HebcalArchive::new(dir)),
        None => Arc::new(EmptyFeed),
    };

    let scheduler = PopulationScheduler::from_config(&config, feed, InMemoryStore::new())?;
    for draft in drafts {
        let name = draft.name.clone();
        let (rule, report) = scheduler
            .create_rule(draft, from, Some(through))
            .with_context(|| format!("failed to materialize rule '{name}'"))?;
        info!(rule = %rule.id, name = %rule.name, inserted = report.inserted, "previewed rule");
    }

    let rows: Vec<PreviewRow> = scheduler
        .store()
        .occurrences_in(DateWindow::inclusive(from, through))?
        .into_iter()
        .map(PreviewRow::from)
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for row in rows {
        let flag = if row.needs_review { "  (needs review)" } else { "" };
        println!("{}  {:>8}  {}{}", row.date, row.time, row.name, flag);
    }
    Ok(())
}
