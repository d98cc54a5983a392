//! Audit sinks: a spreadsheet webhook, or the log when none is configured.

use std::time::Duration;

use anyhow::Context as _;
use chrono::FixedOffset;
use reqwest::Client;
use rollcall_core::reconcile::{AuditEntry, AuditSink};
use serde::Serialize;
use tracing::{info, warn};

use crate::{
  config::AuditSettings,
  error::{Result, SinkError},
};

/// Where audit lines go for this invocation.
pub enum AuditTarget {
  Webhook(WebhookAuditSink),
  Log,
}

impl AuditTarget {
  pub fn from_settings(settings: &AuditSettings) -> anyhow::Result<Self> {
    match &settings.webhook_url {
      Some(url) if !url.is_empty() => Ok(Self::Webhook(WebhookAuditSink::new(url, settings)?)),
      _ => Ok(Self::Log),
    }
  }
}

impl AuditSink for AuditTarget {
  type Error = SinkError;

  async fn record(&self, entry: &AuditEntry) -> Result<()> {
    match self {
      Self::Webhook(sink) => sink.record(entry).await,
      Self::Log => {
        if entry.success {
          info!(identity = %entry.identity, group = %entry.group, "{}", entry.message);
        } else {
          warn!(identity = %entry.identity, group = %entry.group, "{}", entry.message);
        }
        Ok(())
      }
    }
  }
}

// ─── Webhook ─────────────────────────────────────────────────────────────────

/// POSTs one row per entry to a spreadsheet-backed webhook.
pub struct WebhookAuditSink {
  client:   Client,
  url:      String,
  sheet_id: String,
  offset:   FixedOffset,
}

#[derive(Debug, Serialize)]
struct Payload<'a> {
  sheet_id: &'a str,
  tipo:     &'static str,
  datos:    Row<'a>,
}

#[derive(Debug, Serialize)]
struct Row<'a> {
  #[serde(rename = "Cédula")]
  identity:  &'a str,
  #[serde(rename = "Nombre Completo")]
  full_name: &'a str,
  #[serde(rename = "Email")]
  email:     &'a str,
  #[serde(rename = "Examen")]
  exam:      &'a str,
  #[serde(rename = "Celular")]
  phone:     &'a str,
  #[serde(rename = "Fecha")]
  date:      String,
  #[serde(rename = "Observaciones")]
  notes:     &'a str,
}

impl WebhookAuditSink {
  pub fn new(url: &str, settings: &AuditSettings) -> anyhow::Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(settings.timeout_secs))
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self {
      client,
      url: url.to_owned(),
      sheet_id: settings.sheet_id.clone(),
      offset: settings.offset()?,
    })
  }

  fn payload<'a>(&'a self, entry: &'a AuditEntry) -> Payload<'a> {
    Payload {
      sheet_id: &self.sheet_id,
      tipo:     if entry.success { "exitoso" } else { "fallido" },
      datos:    Row {
        identity:  &entry.identity,
        full_name: &entry.full_name,
        email:     &entry.email,
        exam:      &entry.group,
        phone:     &entry.phone,
        date:      entry
          .recorded_at
          .with_timezone(&self.offset)
          .format("%Y-%m-%d %H:%M:%S")
          .to_string(),
        notes:     &entry.message,
      },
    }
  }
}

impl AuditSink for WebhookAuditSink {
  type Error = SinkError;

  async fn record(&self, entry: &AuditEntry) -> Result<()> {
    let resp = self
      .client
      .post(&self.url)
      .json(&self.payload(entry))
      .send()
      .await?;

    if !resp.status().is_success() {
      return Err(SinkError::Status(resp.status()));
    }
    Ok(())
  }
}
