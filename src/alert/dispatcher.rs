//! # Alert Dispatcher
//!
//! Turns one tick's unhealthy tubes into a mail per stakeholder. Delivery runs
//! on a spawned task so a slow mail server never delays the next tick.

use chrono::NaiveDateTime;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::telemetry::sample::{Reading, TubeId};

use super::message::{AlertFields, AlertTemplate, MailAttachment, OutgoingMail, TubeAlert};
use super::stakeholders::StakeholderList;
use super::transport::MailTransport;

/// Outcome of one delivered batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub sent: usize,
    pub failed: usize,
}

/// Best-effort alert mail sender
#[derive(Clone)]
pub struct AlertDispatcher {
    transport: Option<Arc<dyn MailTransport>>,
    stakeholders: StakeholderList,
    template: AlertTemplate,
}

impl std::fmt::Debug for AlertDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertDispatcher")
            .field("enabled", &self.is_enabled())
            .field("stakeholders", &self.stakeholders.len())
            .field("template", &self.template)
            .finish()
    }
}

impl AlertDispatcher {
    /// Log in once and build an enabled dispatcher
    ///
    /// A failed login is reported once and yields a disabled dispatcher for
    /// the rest of the process; there is no retry.
    pub async fn connect(
        transport: Arc<dyn MailTransport>,
        stakeholders: StakeholderList,
        template: AlertTemplate,
    ) -> Self {
        match transport.login().await {
            Ok(()) => Self {
                transport: Some(transport),
                stakeholders,
                template,
            },
            Err(e) => {
                error!("Mail login failed, alerts disabled: {}", e);
                Self::disabled(stakeholders, template)
            }
        }
    }

    /// A dispatcher that never sends anything
    pub fn disabled(stakeholders: StakeholderList, template: AlertTemplate) -> Self {
        Self {
            transport: None,
            stakeholders,
            template,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    /// Whether a batch handed off now would reach anyone
    pub fn has_recipients(&self) -> bool {
        self.is_enabled() && !self.stakeholders.is_empty()
    }

    /// Hand a batch off to a delivery task
    ///
    /// `unhealthy`, `readings` and `attachments` are indexed by tube (index 0
    /// is tube 1). Only tubes marked unhealthy that have a reading are
    /// reported, and only their files are attached.
    ///
    /// # Returns
    ///
    /// The delivery task, or `None` when disabled or nothing is unhealthy.
    ///
    /// # Panics
    ///
    /// Panics if the three slices differ in length, or if called outside a
    /// tokio runtime while there is something to send.
    pub fn dispatch(
        &self,
        timestamp: NaiveDateTime,
        unhealthy: &[bool],
        readings: &[Option<Reading>],
        attachments: &[PathBuf],
    ) -> Option<JoinHandle<DispatchSummary>> {
        assert_eq!(unhealthy.len(), readings.len(), "one reading per tube required");
        assert_eq!(unhealthy.len(), attachments.len(), "one attachment path per tube required");

        let transport = self.transport.clone()?;

        let alerts: Vec<TubeAlert> = unhealthy
            .iter()
            .zip(readings)
            .zip(attachments)
            .enumerate()
            .filter_map(|(index, ((&bad, reading), path))| match (bad, reading) {
                (true, Some(reading)) => Some(TubeAlert {
                    tube: (index + 1) as TubeId,
                    reading: *reading,
                    attachment: path.clone(),
                }),
                _ => None,
            })
            .collect();

        if alerts.is_empty() {
            return None;
        }

        let stakeholders = self.stakeholders.clone();
        let template = self.template.clone();
        Some(tokio::spawn(async move {
            deliver(transport, stakeholders, template, timestamp, alerts).await
        }))
    }
}

async fn deliver(
    transport: Arc<dyn MailTransport>,
    stakeholders: StakeholderList,
    template: AlertTemplate,
    timestamp: NaiveDateTime,
    alerts: Vec<TubeAlert>,
) -> DispatchSummary {
    let mut summary = DispatchSummary::default();

    let recipients = stakeholders.recipients();
    if recipients.is_empty() {
        debug!("No stakeholders to alert for {} tubes", alerts.len());
        return summary;
    }

    let attachments = read_attachments(&alerts).await;
    let subject = template.subject(&alerts);

    for recipient in recipients {
        let body = template.body(AlertFields {
            recipient_name: &recipient.name,
            timestamp,
            alerts: &alerts,
        });
        let mail = OutgoingMail {
            to_name: recipient.name,
            to_email: recipient.email.clone(),
            subject: subject.clone(),
            body,
            attachments: attachments.clone(),
        };

        match transport.send(mail).await {
            Ok(()) => summary.sent += 1,
            Err(e) => {
                warn!("Alert to {} failed: {}", recipient.email, e);
                summary.failed += 1;
            }
        }
    }

    info!(
        "Alert for {} tubes sent to {} stakeholders ({} failed)",
        alerts.len(),
        summary.sent,
        summary.failed
    );
    summary
}

/// Read each tube's file at send time, skipping files that do not exist
async fn read_attachments(alerts: &[TubeAlert]) -> Vec<MailAttachment> {
    let mut attachments = Vec::with_capacity(alerts.len());
    for alert in alerts {
        let filename = alert
            .attachment
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("tube{}.csv", alert.tube));

        match tokio::fs::read(&alert.attachment).await {
            Ok(content) => attachments.push(MailAttachment { filename, content }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No data file to attach for tube {}", alert.tube);
            }
            Err(e) => warn!(
                "Could not read {} for attachment: {}",
                alert.attachment.display(),
                e
            ),
        }
    }
    attachments
}
