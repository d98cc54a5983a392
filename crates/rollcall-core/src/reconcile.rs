//! The reconciler. Drives a roster through the eligibility filter, the batch
//! assigner and the dedup ledger, handing new identities to an enrollment
//! sink and reporting every processed record to an audit sink.
//!
//! Every processed record ends in exactly one terminal [`Outcome`]. Records
//! whose identity the ledger already holds are skipped before any external
//! call and reported separately.

use std::{fmt, future::Future, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{Instrument as _, debug, info, info_span, warn};
use uuid::Uuid;

use crate::{
  batch::{BatchAssignment, BatchCounts, BatchLabel, assign},
  eligibility::{EligibilityRules, Rejection},
  ledger::{Ledger, Status},
  record::RosterRecord,
};

/// Rejection reason for records that carry no identity.
pub const MISSING_IDENTITY: &str = "missing identity";

// ─── Collaborators ───────────────────────────────────────────────────────────

/// Creates accounts and enrollments in the target system.
pub trait EnrollmentSink: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Create (if needed) and enroll the assignment's identity.
  fn enroll<'a>(
    &'a self,
    assignment: &'a BatchAssignment,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Whether `identity` is already enrolled in the target course.
  fn is_enrolled<'a>(
    &'a self,
    identity: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;
}

/// Receives one human-readable line per processed record.
pub trait AuditSink: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn record<'a>(
    &'a self,
    entry: &'a AuditEntry,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}

/// What the audit sink receives for each processed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
  pub run_id:      Uuid,
  pub identity:    String,
  pub full_name:   String,
  pub email:       String,
  pub phone:       String,
  pub group:       String,
  pub batch:       Option<BatchLabel>,
  pub success:     bool,
  pub message:     String,
  pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
  fn new(run_id: Uuid, record: &RosterRecord, outcome: &Outcome) -> Self {
    Self {
      run_id,
      identity: record.id_number.clone(),
      full_name: record.full_name(),
      email: record.email.clone(),
      phone: record.phone.clone(),
      group: record.group.clone(),
      batch: outcome.batch(),
      success: outcome.is_enrolled(),
      message: outcome.to_string(),
      recorded_at: Utc::now(),
    }
  }
}

/// Bounded retry for audit delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Total attempts, including the first. Zero is treated as one.
  pub max_attempts: u32,
  /// Fixed delay between attempts.
  pub backoff:      Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self { Self { max_attempts: 3, backoff: Duration::from_secs(2) } }
}

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// Why a valid record could not be enrolled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Failure {
  /// The enrollment sink refused or failed. The ledger was not touched, so
  /// a later run retries the identity.
  Enrollment(String),
  /// The ledger could not be read or written.
  Ledger(String),
}

impl fmt::Display for Failure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Enrollment(e) => write!(f, "enrollment failed: {e}"),
      Self::Ledger(e) => write!(f, "ledger failure: {e}"),
    }
  }
}

/// Terminal state of a processed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
  Enrolled { batch: BatchLabel },
  Rejected { reason: String },
  Errored { batch: Option<BatchLabel>, cause: Failure },
}

impl Outcome {
  pub fn is_enrolled(&self) -> bool { matches!(self, Self::Enrolled { .. }) }

  pub fn batch(&self) -> Option<BatchLabel> {
    match self {
      Self::Enrolled { batch } => Some(*batch),
      Self::Errored { batch, .. } => *batch,
      Self::Rejected { .. } => None,
    }
  }
}

impl fmt::Display for Outcome {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Enrolled { batch } => write!(f, "enrolled in batch {batch}"),
      Self::Rejected { reason } => write!(f, "rejected: {reason}"),
      Self::Errored { cause, .. } => write!(f, "{cause}"),
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordOutcome {
  pub record:  RosterRecord,
  #[serde(flatten)]
  pub outcome: Outcome,
}

/// Everything a reconcile run did.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
  pub run_id:         Uuid,
  pub outcomes:       Vec<RecordOutcome>,
  /// Identities skipped because the ledger already holds them.
  pub skipped:        Vec<String>,
  /// Outcomes the audit sink never accepted.
  pub audit_failures: usize,
  pub batches:        BatchCounts,
}

impl RunReport {
  pub fn enrolled(&self) -> usize { self.count(|o| matches!(o, Outcome::Enrolled { .. })) }

  pub fn rejected(&self) -> usize { self.count(|o| matches!(o, Outcome::Rejected { .. })) }

  pub fn errored(&self) -> usize { self.count(|o| matches!(o, Outcome::Errored { .. })) }

  /// Errors caused by the ledger rather than by the enrollment sink.
  pub fn ledger_failures(&self) -> usize {
    self.count(|o| matches!(o, Outcome::Errored { cause: Failure::Ledger(_), .. }))
  }

  fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
    self.outcomes.iter().filter(|o| pred(&o.outcome)).count()
  }
}

/// Result of a verification pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VerifyReport {
  /// Found enrolled and recorded as verified.
  pub verified: Vec<String>,
  /// Not enrolled in the target system.
  pub missing:  Vec<RosterRecord>,
  pub errors:   Vec<(String, Failure)>,
}

// ─── Reconciler ──────────────────────────────────────────────────────────────

/// Wires the pure core to its collaborators. Holds no global state; every
/// collaborator is passed in.
pub struct Reconciler<L, E, A> {
  ledger: Arc<L>,
  sink:   Arc<E>,
  audit:  Arc<A>,
  rules:  EligibilityRules,
  retry:  RetryPolicy,
}

impl<L, E, A> Reconciler<L, E, A>
where
  L: Ledger,
  E: EnrollmentSink,
  A: AuditSink,
{
  pub fn new(ledger: Arc<L>, sink: Arc<E>, audit: Arc<A>) -> Self {
    Self {
      ledger,
      sink,
      audit,
      rules: EligibilityRules::default(),
      retry: RetryPolicy::default(),
    }
  }

  pub fn with_rules(mut self, rules: EligibilityRules) -> Self {
    self.rules = rules;
    self
  }

  pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  pub fn rules(&self) -> &EligibilityRules { &self.rules }

  /// Reconcile `roster` end to end.
  pub async fn run(&self, roster: Vec<RosterRecord>) -> RunReport {
    let run_id = Uuid::new_v4();
    let span = info_span!("run", %run_id, records = roster.len());
    self.run_inner(run_id, roster).instrument(span).await
  }

  async fn run_inner(&self, run_id: Uuid, roster: Vec<RosterRecord>) -> RunReport {
    let (identified, unidentified) = split_unidentified(roster);
    let (valid, mut rejections) = self.rules.partition(identified);
    rejections.extend(unidentified.into_iter().map(|record| Rejection {
      record,
      reason: MISSING_IDENTITY.to_owned(),
    }));
    let assignments = assign(valid);
    let batches = BatchCounts::of(&assignments);
    info!(
      valid = assignments.len(),
      rejected = rejections.len(),
      batch_one = batches.one,
      batch_two = batches.two,
      "roster classified"
    );

    let mut report = RunReport {
      run_id,
      outcomes: Vec::new(),
      skipped: Vec::new(),
      audit_failures: 0,
      batches,
    };

    for rejection in rejections {
      debug!(identity = %rejection.record.id_number, reason = %rejection.reason, "rejected");
      let outcome = Outcome::Rejected { reason: rejection.reason };
      self.finish(&mut report, rejection.record, outcome).await;
    }

    for assignment in assignments {
      let identity = assignment.record.id_number.as_str();
      match self.ledger.exists(identity).await {
        Ok(true) => {
          debug!(%identity, "already in ledger, skipping");
          report.skipped.push(identity.to_owned());
          continue;
        }
        Ok(false) => {}
        Err(e) => {
          warn!(%identity, error = %e, "ledger lookup failed");
          let outcome = Outcome::Errored {
            batch: Some(assignment.batch),
            cause: Failure::Ledger(e.to_string()),
          };
          self.finish(&mut report, assignment.record, outcome).await;
          continue;
        }
      }

      let outcome = self.enroll(&assignment).await;
      self.finish(&mut report, assignment.record, outcome).await;
    }

    info!(
      enrolled = report.enrolled(),
      rejected = report.rejected(),
      errored = report.errored(),
      skipped = report.skipped.len(),
      audit_failures = report.audit_failures,
      "run complete"
    );
    report
  }

  async fn enroll(&self, assignment: &BatchAssignment) -> Outcome {
    let identity = assignment.record.id_number.as_str();
    let batch = assignment.batch;

    if let Err(e) = self.sink.enroll(assignment).await {
      warn!(%identity, error = %e, "enrollment failed");
      return Outcome::Errored { batch: Some(batch), cause: Failure::Enrollment(e.to_string()) };
    }

    match self.ledger.upsert(identity, &Status::succeeded()).await {
      Ok(_) => {
        debug!(%identity, %batch, "enrolled");
        Outcome::Enrolled { batch }
      }
      Err(e) => {
        warn!(%identity, error = %e, "enrolled but ledger write failed");
        Outcome::Errored { batch: Some(batch), cause: Failure::Ledger(e.to_string()) }
      }
    }
  }

  async fn finish(&self, report: &mut RunReport, record: RosterRecord, outcome: Outcome) {
    let entry = AuditEntry::new(report.run_id, &record, &outcome);
    if !self.deliver_audit(&entry).await {
      report.audit_failures += 1;
    }
    report.outcomes.push(RecordOutcome { record, outcome });
  }

  /// Push `entry` to the audit sink, retrying per the policy. Returns whether
  /// it was accepted. Never fails the run.
  async fn deliver_audit(&self, entry: &AuditEntry) -> bool {
    let attempts = self.retry.max_attempts.max(1);
    for attempt in 1..=attempts {
      match self.audit.record(entry).await {
        Ok(()) => return true,
        Err(e) => {
          debug!(identity = %entry.identity, attempt, error = %e, "audit attempt failed");
          if attempt < attempts {
            tokio::time::sleep(self.retry.backoff).await;
          }
        }
      }
    }
    warn!(identity = %entry.identity, attempts, "audit entry dropped after retries");
    false
  }

  /// Valid records not yet in the ledger, asked one by one whether the target
  /// system already enrolls them. Enrolled ones are recorded as verified.
  pub async fn verify(&self, roster: Vec<RosterRecord>) -> VerifyReport {
    let (identified, unidentified) = split_unidentified(roster);
    if !unidentified.is_empty() {
      warn!(count = unidentified.len(), "records without identity not verified");
    }
    let (valid, _) = self.rules.partition(identified);
    let mut report = VerifyReport::default();

    for record in valid {
      let identity = record.id_number.clone();
      match self.ledger.exists(&identity).await {
        Ok(true) => continue,
        Ok(false) => {}
        Err(e) => {
          report.errors.push((identity, Failure::Ledger(e.to_string())));
          continue;
        }
      }

      match self.sink.is_enrolled(&identity).await {
        Ok(true) => match self.ledger.upsert(&identity, &Status::verified()).await {
          Ok(_) => report.verified.push(identity),
          Err(e) => report.errors.push((identity, Failure::Ledger(e.to_string()))),
        },
        Ok(false) => report.missing.push(record),
        Err(e) => report.errors.push((identity, Failure::Enrollment(e.to_string()))),
      }
    }

    info!(
      verified = report.verified.len(),
      missing = report.missing.len(),
      errors = report.errors.len(),
      "verification complete"
    );
    report
  }

  /// Records whose identity the ledger does not hold yet.
  pub async fn missing(&self, roster: Vec<RosterRecord>) -> Result<Vec<RosterRecord>, L::Error> {
    missing(self.ledger.as_ref(), roster).await
  }
}

/// Split off records whose identity is blank. Neither half is reordered.
pub fn split_unidentified<I>(records: I) -> (Vec<RosterRecord>, Vec<RosterRecord>)
where
  I: IntoIterator<Item = RosterRecord>,
{
  records
    .into_iter()
    .partition(|r| !r.id_number.trim().is_empty())
}

/// Records whose identity `ledger` does not hold yet, in input order.
pub async fn missing<L: Ledger>(
  ledger: &L,
  roster: Vec<RosterRecord>,
) -> Result<Vec<RosterRecord>, L::Error> {
  let mut out = Vec::new();
  for record in roster {
    if record.id_number.trim().is_empty() {
      continue;
    }
    if !ledger.exists(&record.id_number).await? {
      out.push(record);
    }
  }
  Ok(out)
}

#[cfg(test)]
mod tests {
  use std::{
    collections::HashSet,
    sync::{
      Mutex,
      atomic::{AtomicUsize, Ordering},
    },
  };

  use super::*;
  use crate::{ledger::LedgerEntry, memory::MemoryLedger};

  #[derive(Debug, thiserror::Error)]
  #[error("{0}")]
  struct FakeError(String);

  /// Enrolls everything except identities in `fail`; remembers calls.
  #[derive(Default)]
  struct FakeSink {
    fail:     HashSet<String>,
    enrolled: HashSet<String>,
    calls:    Mutex<Vec<(String, BatchLabel)>>,
  }

  impl FakeSink {
    fn failing(ids: &[&str]) -> Self {
      Self { fail: ids.iter().map(|s| s.to_string()).collect(), ..Default::default() }
    }

    fn calls(&self) -> Vec<(String, BatchLabel)> { self.calls.lock().unwrap().clone() }
  }

  impl EnrollmentSink for FakeSink {
    type Error = FakeError;

    async fn enroll(&self, a: &BatchAssignment) -> Result<(), FakeError> {
      self.calls.lock().unwrap().push((a.record.id_number.clone(), a.batch));
      if self.fail.contains(&a.record.id_number) {
        return Err(FakeError("lms said no".into()));
      }
      Ok(())
    }

    async fn is_enrolled(&self, identity: &str) -> Result<bool, FakeError> {
      if self.fail.contains(identity) {
        return Err(FakeError("lookup failed".into()));
      }
      Ok(self.enrolled.contains(identity))
    }
  }

  /// Fails the first `fail_first` deliveries, then accepts.
  #[derive(Default)]
  struct FakeAudit {
    fail_first: usize,
    attempts:   AtomicUsize,
    accepted:   Mutex<Vec<AuditEntry>>,
  }

  impl AuditSink for FakeAudit {
    type Error = FakeError;

    async fn record(&self, entry: &AuditEntry) -> Result<(), FakeError> {
      let n = self.attempts.fetch_add(1, Ordering::SeqCst);
      if n < self.fail_first {
        return Err(FakeError("sheet unavailable".into()));
      }
      self.accepted.lock().unwrap().push(entry.clone());
      Ok(())
    }
  }

  /// A ledger whose writes always fail.
  struct BrokenLedger;

  impl Ledger for BrokenLedger {
    type Error = FakeError;

    async fn exists(&self, _: &str) -> Result<bool, FakeError> { Ok(false) }

    async fn upsert(&self, _: &str, _: &Status) -> Result<LedgerEntry, FakeError> {
      Err(FakeError("disk full".into()))
    }

    async fn list_by_status(&self, _: &Status) -> Result<Vec<String>, FakeError> {
      Ok(vec![])
    }

    async fn get(&self, _: &str) -> Result<Option<LedgerEntry>, FakeError> { Ok(None) }

    async fn entries(&self) -> Result<Vec<LedgerEntry>, FakeError> { Ok(vec![]) }
  }

  fn no_wait() -> RetryPolicy { RetryPolicy { max_attempts: 3, backoff: Duration::ZERO } }

  fn rec(id: &str, mode: &str, region: &str) -> RosterRecord {
    RosterRecord::new(id, mode, region)
  }

  fn scenario_roster() -> Vec<RosterRecord> {
    vec![
      rec("A1", "VIRTUAL", "ANTIOQUIA"),
      rec("A2", "PRESENCIAL", "CALDAS"),
      rec("A3", "HYBRID", "CALDAS"),
    ]
  }

  fn reconciler<L: Ledger>(
    ledger: Arc<L>,
    sink: Arc<FakeSink>,
    audit: Arc<FakeAudit>,
  ) -> Reconciler<L, FakeSink, FakeAudit> {
    Reconciler::new(ledger, sink, audit).with_retry(no_wait())
  }

  #[tokio::test]
  async fn run_enrolls_valid_and_rejects_invalid() {
    let ledger = Arc::new(MemoryLedger::new());
    let sink = Arc::new(FakeSink::default());
    let audit = Arc::new(FakeAudit::default());
    let r = reconciler(ledger.clone(), sink.clone(), audit.clone());

    let report = r.run(scenario_roster()).await;

    assert_eq!(report.enrolled(), 2);
    assert_eq!(report.rejected(), 1);
    assert_eq!(report.errored(), 0);
    assert_eq!(
      sink.calls(),
      vec![("A1".to_string(), BatchLabel::One), ("A2".to_string(), BatchLabel::Two)]
    );
    assert_eq!(
      ledger.list_by_status(&Status::succeeded()).await.unwrap(),
      vec!["A1".to_string(), "A2".to_string()]
    );
    assert!(!ledger.exists("A3").await.unwrap());

    let rejected = report
      .outcomes
      .iter()
      .find(|o| o.record.id_number == "A3")
      .unwrap();
    assert!(matches!(&rejected.outcome, Outcome::Rejected { reason } if reason.contains("HYBRID")));

    // One audit line per processed record.
    assert_eq!(audit.accepted.lock().unwrap().len(), 3);
    assert_eq!(report.audit_failures, 0);
  }

  #[tokio::test]
  async fn rerun_skips_processed_identities() {
    let ledger = Arc::new(MemoryLedger::new());
    let sink = Arc::new(FakeSink::default());
    let audit = Arc::new(FakeAudit::default());
    let r = reconciler(ledger.clone(), sink.clone(), audit.clone());

    r.run(scenario_roster()).await;
    let second = r.run(scenario_roster()).await;

    assert_eq!(second.enrolled(), 0);
    assert_eq!(second.skipped, vec!["A1".to_string(), "A2".to_string()]);
    assert_eq!(sink.calls().len(), 2);
    assert_eq!(ledger.len(), 2);
  }

  #[tokio::test]
  async fn failed_enrollment_leaves_ledger_untouched() {
    let ledger = Arc::new(MemoryLedger::new());
    let sink = Arc::new(FakeSink::failing(&["A2"]));
    let audit = Arc::new(FakeAudit::default());
    let r = reconciler(ledger.clone(), sink, audit.clone());

    let report = r.run(scenario_roster()).await;

    assert_eq!(report.enrolled(), 1);
    assert_eq!(report.errored(), 1);
    assert_eq!(report.ledger_failures(), 0);
    assert!(!ledger.exists("A2").await.unwrap());

    let audited = audit.accepted.lock().unwrap();
    let a2 = audited.iter().find(|e| e.identity == "A2").unwrap();
    assert!(!a2.success);
    assert!(a2.message.contains("lms said no"));
  }

  #[tokio::test]
  async fn ledger_write_failure_is_reported_distinctly() {
    let sink = Arc::new(FakeSink::default());
    let audit = Arc::new(FakeAudit::default());
    let r = reconciler(Arc::new(BrokenLedger), sink, audit);

    let report = r.run(vec![rec("A1", "VIRTUAL", "CALDAS")]).await;

    assert_eq!(report.enrolled(), 0);
    assert_eq!(report.ledger_failures(), 1);
    assert!(matches!(
      &report.outcomes[0].outcome,
      Outcome::Errored { cause: Failure::Ledger(msg), batch: Some(BatchLabel::One) }
        if msg.contains("disk full")
    ));
  }

  #[tokio::test]
  async fn audit_retries_are_bounded() {
    let audit = Arc::new(FakeAudit { fail_first: 2, ..Default::default() });
    let r = reconciler(Arc::new(MemoryLedger::new()), Arc::new(FakeSink::default()), audit.clone());

    let report = r.run(vec![rec("A1", "VIRTUAL", "CALDAS")]).await;
    assert_eq!(report.audit_failures, 0);
    assert_eq!(audit.attempts.load(Ordering::SeqCst), 3);

    let stubborn = Arc::new(FakeAudit { fail_first: usize::MAX, ..Default::default() });
    let r = reconciler(Arc::new(MemoryLedger::new()), Arc::new(FakeSink::default()), stubborn.clone());

    let report = r.run(vec![rec("A1", "VIRTUAL", "CALDAS"), rec("A2", "VIRTUAL", "CALDAS")]).await;
    // Processing continued despite the sink never accepting.
    assert_eq!(report.enrolled(), 2);
    assert_eq!(report.audit_failures, 2);
    assert_eq!(stubborn.attempts.load(Ordering::SeqCst), 6);
  }

  #[tokio::test]
  async fn empty_roster_is_a_no_op() {
    let sink = Arc::new(FakeSink::default());
    let r = reconciler(Arc::new(MemoryLedger::new()), sink.clone(), Arc::new(FakeAudit::default()));

    let report = r.run(vec![]).await;
    assert!(report.outcomes.is_empty());
    assert_eq!(report.batches.total(), 0);
    assert!(sink.calls().is_empty());
  }

  #[tokio::test]
  async fn duplicate_identity_in_roster_is_enrolled_once() {
    let sink = Arc::new(FakeSink::default());
    let r = reconciler(Arc::new(MemoryLedger::new()), sink.clone(), Arc::new(FakeAudit::default()));

    let report = r
      .run(vec![rec("A1", "VIRTUAL", "CALDAS"), rec("A1", "VIRTUAL", "CALDAS")])
      .await;
    assert_eq!(report.enrolled(), 1);
    assert_eq!(report.skipped, vec!["A1".to_string()]);
    assert_eq!(sink.calls().len(), 1);
  }

  #[tokio::test]
  async fn blank_identity_is_rejected_before_any_call() {
    let ledger = Arc::new(MemoryLedger::new());
    let sink = Arc::new(FakeSink::default());
    let audit = Arc::new(FakeAudit::default());
    let r = reconciler(ledger.clone(), sink.clone(), audit.clone());

    let roster: Vec<RosterRecord> = crate::record::parse_rows(
      r#"[
        {"idnumber": null, "profile_field_modalidad": "VIRTUAL", "profile_field_departamento": "CALDAS"},
        {"idnumber": "  ", "profile_field_modalidad": "VIRTUAL", "profile_field_departamento": "CALDAS"},
        {"idnumber": "B1", "profile_field_modalidad": "VIRTUAL", "profile_field_departamento": "CALDAS"}
      ]"#,
    )
    .unwrap();
    let report = r.run(roster).await;

    assert_eq!(sink.calls(), vec![("B1".to_string(), BatchLabel::One)]);
    assert_eq!(report.enrolled(), 1);
    assert_eq!(report.rejected(), 2);
    assert_eq!(report.batches.total(), 1);
    assert!(!ledger.exists("").await.unwrap());
    assert_eq!(ledger.len(), 1);
    assert!(report.outcomes.iter().any(
      |o| matches!(&o.outcome, Outcome::Rejected { reason } if reason == MISSING_IDENTITY)
    ));
    // Rejections are still audited.
    assert_eq!(audit.accepted.lock().unwrap().len(), 3);

    let verified = r.verify(vec![rec("", "VIRTUAL", "CALDAS")]).await;
    assert!(verified.verified.is_empty() && verified.missing.is_empty());
    assert!(!ledger.exists("").await.unwrap());
  }

  #[tokio::test]
  async fn verify_records_enrolled_identities() {
    let ledger = Arc::new(MemoryLedger::new());
    ledger.upsert("A0", &Status::succeeded()).await.unwrap();
    let sink = Arc::new(FakeSink {
      enrolled: ["A1".to_string()].into(),
      fail: ["A4".to_string()].into(),
      ..Default::default()
    });
    let r = reconciler(ledger.clone(), sink, Arc::new(FakeAudit::default()));

    let report = r
      .verify(vec![
        rec("A0", "VIRTUAL", "CALDAS"),
        rec("A1", "VIRTUAL", "CALDAS"),
        rec("A2", "VIRTUAL", "CALDAS"),
        rec("A3", "HYBRID", "CALDAS"),
        rec("A4", "VIRTUAL", "CALDAS"),
      ])
      .await;

    assert_eq!(report.verified, vec!["A1".to_string()]);
    assert_eq!(report.missing.len(), 1);
    assert_eq!(report.missing[0].id_number, "A2");
    assert_eq!(report.errors.len(), 1);
    assert_eq!(
      ledger.get("A1").await.unwrap().unwrap().status,
      Status::verified()
    );
  }

  #[tokio::test]
  async fn missing_filters_known_identities() {
    let ledger = MemoryLedger::new();
    ledger.upsert("A1", &Status::migrated()).await.unwrap();

    let out = missing(&ledger, scenario_roster()).await.unwrap();
    let ids: Vec<_> = out.iter().map(|r| r.id_number.as_str()).collect();
    assert_eq!(ids, ["A2", "A3"]);
  }
}
