//! Alert mail composition.

use chrono::NaiveDateTime;
use std::path::PathBuf;

use crate::telemetry::sample::{Reading, TubeId};

/// One unhealthy tube in an alert batch
#[derive(Debug, Clone, PartialEq)]
pub struct TubeAlert {
    pub tube: TubeId,
    pub reading: Reading,
    /// Today's CSV file for the tube; omitted from the mail if it does not exist
    pub attachment: PathBuf,
}

/// A file attached to an outgoing mail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailAttachment {
    pub filename: String,
    pub content: Vec<u8>,
}

/// A fully composed mail for one recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to_name: String,
    pub to_email: String,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<MailAttachment>,
}

/// Fields the alert body is built from
#[derive(Debug, Clone, Copy)]
pub struct AlertFields<'a> {
    pub recipient_name: &'a str,
    pub timestamp: NaiveDateTime,
    pub alerts: &'a [TubeAlert],
}

/// Subject line and greeting policy shared by every alert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertTemplate {
    pub subject: String,
    /// Prefix the body with "Hello {name},"
    pub greeting: bool,
}

impl Default for AlertTemplate {
    fn default() -> Self {
        Self {
            subject: "Bioreactor alert".to_string(),
            greeting: true,
        }
    }
}

impl AlertTemplate {
    pub fn new(subject: impl Into<String>, greeting: bool) -> Self {
        Self {
            subject: subject.into(),
            greeting,
        }
    }

    /// Subject for a batch, naming the affected tubes
    pub fn subject(&self, alerts: &[TubeAlert]) -> String {
        let tubes: Vec<String> = alerts.iter().map(|a| a.tube.to_string()).collect();
        let noun = if alerts.len() == 1 { "tube" } else { "tubes" };
        format!("{}: {} {}", self.subject, noun, tubes.join(", "))
    }

    /// Plain-text body for one recipient
    pub fn body(&self, fields: AlertFields<'_>) -> String {
        let mut lines = Vec::with_capacity(fields.alerts.len() + 6);
        if self.greeting {
            lines.push(format!("Hello {},", fields.recipient_name));
            lines.push(String::new());
        }

        lines.push(format!(
            "The following tubes crossed their alert thresholds at {} on {}:",
            fields.timestamp.format("%H:%M:%S"),
            fields.timestamp.format("%d-%m-%Y"),
        ));
        lines.push(String::new());
        for alert in fields.alerts {
            lines.push(format!(
                "  Tube {}: pH {:.2}, temperature {:.2} °C",
                alert.tube, alert.reading.ph, alert.reading.temperature
            ));
        }
        lines.push(String::new());
        lines.push("Today's readings for these tubes are attached where available.".to_string());

        lines.join("\n")
    }
}
