//! `rollcall`: reconciles registration rosters against the LMS.
//!
//! # Usage
//!
//! ```
//! rollcall intake registrations.json --out roster.json
//! rollcall combine reporte_1003.json reporte_992.json --out combinado.json
//! rollcall classify roster.json --valid lotes.json --rejected rechazados.json
//! rollcall run roster.json --dry-run
//! rollcall list succeeded
//! ```

mod audit;
mod config;
mod error;
mod moodle;
mod roster;

use std::{path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use rollcall_core::{
  batch::{BatchCounts, assign},
  eligibility::Rejection,
  intake::{RegistrationRow, approved_records},
  ledger::{Ledger, Status},
  memory::MemoryLedger,
  reconcile::{
    AuditSink, EnrollmentSink, MISSING_IDENTITY, Outcome, Reconciler, RunReport, missing,
    split_unidentified,
  },
  record::{RosterRecord, parse_identity},
  report::{CycleStatus, RegistrationStatus, combine},
};
use rollcall_store_sqlite::SqliteLedger;
use serde_json::Value;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

use crate::{
  audit::AuditTarget,
  config::Settings,
  moodle::{DryRunSink, MoodleSink},
  roster::{legacy_identities, read_rows, write_json},
};

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(author, version, about = "Enrollment reconciliation between the registration system and the LMS")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, global = true, default_value = "rollcall.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Convert registration rows into a roster of approved records.
  Intake {
    input: PathBuf,
    #[arg(long, value_name = "FILE")]
    out:   Option<PathBuf>,
  },
  /// Join the registration report with the cycle report.
  Combine {
    registrations: PathBuf,
    cycles:        PathBuf,
    #[arg(long, value_name = "FILE")]
    out:           Option<PathBuf>,
  },
  /// Classify and batch a roster without touching the ledger or the LMS.
  Classify {
    input:    PathBuf,
    #[arg(long, value_name = "FILE", default_value = "valid.json")]
    valid:    PathBuf,
    #[arg(long, value_name = "FILE", default_value = "rejected.json")]
    rejected: PathBuf,
  },
  /// Roster records whose identity the ledger has not seen.
  Missing {
    input: PathBuf,
    #[arg(long, value_name = "FILE")]
    out:   Option<PathBuf>,
  },
  /// Reconcile a roster against the LMS.
  Run {
    input:   PathBuf,
    /// Work on a copy of the ledger and only log enrollments.
    #[arg(long)]
    dry_run: bool,
  },
  /// Record as verified the roster identities the LMS already enrolls.
  Verify { input: PathBuf },
  /// Set an identity's status by hand.
  Mark { identity: String, status: String },
  /// Identities carrying a status.
  List {
    status: String,
    #[arg(long)]
    json:   bool,
  },
  /// Status changes recorded for an identity.
  History { identity: String },
  /// Dump ledger entries as JSON.
  Export {
    #[arg(long)]
    status: Option<String>,
    #[arg(long, value_name = "FILE")]
    out:    Option<PathBuf>,
  },
  /// Seed the ledger from a legacy processed-users export.
  Import {
    input:  PathBuf,
    #[arg(long, default_value = Status::MIGRATED)]
    status: String,
  },
  /// Entry count per status.
  Stats,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let settings = Settings::load(&cli.config)?;

  match cli.command {
    Command::Intake { input, out } => intake(&input, out).await,
    Command::Combine { registrations, cycles, out } => {
      let registrations: Vec<RegistrationStatus> = read_rows(&registrations).await?;
      let cycles: Vec<CycleStatus> = read_rows(&cycles).await?;
      let rows = combine(registrations, cycles);
      info!(rows = rows.len(), "reports combined");
      write_json(out.as_deref(), &rows).await?;
      Ok(ExitCode::SUCCESS)
    }
    Command::Classify { input, valid, rejected } => {
      classify(&settings, &input, valid, rejected).await
    }
    Command::Missing { input, out } => {
      let ledger = open_ledger(&settings).await?;
      let roster: Vec<RosterRecord> = read_rows(&input).await?;
      let pending = missing(&ledger, roster).await?;
      info!(count = pending.len(), "records not yet in ledger");
      write_json(out.as_deref(), &pending).await?;
      Ok(ExitCode::SUCCESS)
    }
    Command::Run { input, dry_run } => run(&settings, &input, dry_run).await,
    Command::Verify { input } => verify(&settings, &input).await,
    Command::Mark { identity, status } => {
      let status = settings.allow_list()?.check(&status)?;
      let identity = parse_identity(&identity)?;
      let ledger = open_ledger(&settings).await?;
      let entry = ledger.upsert(&identity, &status).await?;
      println!("{} → {}", entry.identity, entry.status);
      Ok(ExitCode::SUCCESS)
    }
    Command::List { status, json } => {
      let status = Status::new(&status)?;
      let ledger = open_ledger(&settings).await?;
      let ids = ledger.list_by_status(&status).await?;
      if json {
        write_json(None, &ids).await?;
      } else {
        for id in ids {
          println!("{id}");
        }
      }
      Ok(ExitCode::SUCCESS)
    }
    Command::History { identity } => {
      let ledger = open_ledger(&settings).await?;
      for event in ledger.history(&parse_identity(&identity)?).await? {
        let previous = event
          .previous_status
          .map(|s| s.to_string())
          .unwrap_or_else(|| "-".into());
        println!(
          "{}  {:<8} {} → {}",
          event.recorded_at.to_rfc3339(),
          event.action.to_string(),
          previous,
          event.status
        );
      }
      Ok(ExitCode::SUCCESS)
    }
    Command::Export { status, out } => {
      let status = status.as_deref().map(Status::new).transpose()?;
      let ledger = open_ledger(&settings).await?;
      let entries: Vec<_> = ledger
        .entries()
        .await?
        .into_iter()
        .filter(|e| status.as_ref().is_none_or(|s| &e.status == s))
        .collect();
      write_json(out.as_deref(), &entries).await?;
      Ok(ExitCode::SUCCESS)
    }
    Command::Import { input, status } => import(&settings, &input, &status).await,
    Command::Stats => {
      let ledger = open_ledger(&settings).await?;
      for (status, count) in ledger.counts().await? {
        println!("{status:<16} {count}");
      }
      Ok(ExitCode::SUCCESS)
    }
  }
}

async fn open_ledger(settings: &Settings) -> anyhow::Result<SqliteLedger> {
  let path = &settings.ledger.path;
  SqliteLedger::open(path)
    .await
    .with_context(|| format!("failed to open ledger at {path:?}"))
}

// ─── Commands ─────────────────────────────────────────────────────────────────

async fn intake(input: &std::path::Path, out: Option<PathBuf>) -> anyhow::Result<ExitCode> {
  let rows: Vec<RegistrationRow> = read_rows(input).await?;
  let total = rows.len();
  let records = approved_records(rows);
  info!(total, approved = records.len(), "registrations converted");
  write_json(out.as_deref(), &records).await?;
  Ok(ExitCode::SUCCESS)
}

async fn classify(
  settings: &Settings,
  input: &std::path::Path,
  valid_out: PathBuf,
  rejected_out: PathBuf,
) -> anyhow::Result<ExitCode> {
  let roster: Vec<RosterRecord> = read_rows(input).await?;
  let (identified, unidentified) = split_unidentified(roster);
  let (valid, mut rejected) = settings.eligibility.partition(identified);
  rejected.extend(unidentified.into_iter().map(|record| Rejection {
    record,
    reason: MISSING_IDENTITY.to_owned(),
  }));
  let assignments = assign(valid);
  let counts = BatchCounts::of(&assignments);

  write_json(Some(&valid_out), &assignments).await?;
  write_json(Some(&rejected_out), &rejected).await?;
  info!(
    valid = assignments.len(),
    rejected = rejected.len(),
    batch_one = counts.one,
    batch_two = counts.two,
    "roster classified"
  );
  Ok(ExitCode::SUCCESS)
}

async fn run(settings: &Settings, input: &std::path::Path, dry_run: bool) -> anyhow::Result<ExitCode> {
  let roster: Vec<RosterRecord> = read_rows(input).await?;
  let durable = open_ledger(settings).await?;

  let report = if dry_run {
    let snapshot = MemoryLedger::from_entries(durable.entries().await?);
    info!(seeded = snapshot.len(), "dry run on a ledger snapshot");
    reconcile(settings, Arc::new(snapshot), Arc::new(DryRunSink), Arc::new(AuditTarget::Log), roster)
      .await
  } else {
    let sink = MoodleSink::new(settings.moodle.clone())?;
    let audit = AuditTarget::from_settings(&settings.audit)?;
    reconcile(settings, Arc::new(durable), Arc::new(sink), Arc::new(audit), roster).await
  };

  print_report(&report);
  if report.ledger_failures() > 0 {
    return Ok(ExitCode::FAILURE);
  }
  Ok(ExitCode::SUCCESS)
}

async fn reconcile<L, E, A>(
  settings: &Settings,
  ledger: Arc<L>,
  sink: Arc<E>,
  audit: Arc<A>,
  roster: Vec<RosterRecord>,
) -> RunReport
where
  L: Ledger,
  E: EnrollmentSink,
  A: AuditSink,
{
  Reconciler::new(ledger, sink, audit)
    .with_rules(settings.eligibility.clone())
    .with_retry(settings.audit.retry_policy())
    .run(roster)
    .await
}

fn print_report(report: &RunReport) {
  println!("run {}", report.run_id);
  println!(
    "  enrolled {}  rejected {}  errored {}  skipped {}",
    report.enrolled(),
    report.rejected(),
    report.errored(),
    report.skipped.len()
  );
  println!(
    "  batch 1: {}  batch 2: {}  audit failures: {}",
    report.batches.one, report.batches.two, report.audit_failures
  );
  for o in &report.outcomes {
    if let Outcome::Errored { cause, .. } = &o.outcome {
      println!("  ! {} {cause}", o.record.id_number);
    }
  }
}

async fn verify(settings: &Settings, input: &std::path::Path) -> anyhow::Result<ExitCode> {
  let roster: Vec<RosterRecord> = read_rows(input).await?;
  let ledger = open_ledger(settings).await?;
  let sink = MoodleSink::new(settings.moodle.clone())?;

  let report = Reconciler::new(Arc::new(ledger), Arc::new(sink), Arc::new(AuditTarget::Log))
    .with_rules(settings.eligibility.clone())
    .verify(roster)
    .await;

  println!(
    "verified {}  missing {}  errors {}",
    report.verified.len(),
    report.missing.len(),
    report.errors.len()
  );
  for record in &report.missing {
    println!("  missing {}", record.id_number);
  }
  for (identity, failure) in &report.errors {
    println!("  ! {identity} {failure}");
  }
  Ok(ExitCode::SUCCESS)
}

async fn import(settings: &Settings, input: &std::path::Path, status: &str) -> anyhow::Result<ExitCode> {
  let status = settings.allow_list()?.check(status)?;
  let items: Vec<Value> = read_rows(input).await?;
  let ledger = open_ledger(settings).await?;

  let (mut imported, mut known) = (0usize, 0usize);
  for identity in legacy_identities(items) {
    if ledger.exists(&identity).await? {
      known += 1;
      continue;
    }
    ledger.upsert(&identity, &status).await?;
    imported += 1;
  }
  info!(imported, known, %status, "legacy export imported");
  println!("imported {imported}, already known {known}");
  Ok(ExitCode::SUCCESS)
}
