//! # Alert Module
//!
//! Mail alerts for unhealthy tubes.
//!
//! This module handles:
//! - The stakeholder list and its CSV file
//! - Composing alert mail with per-tube CSV attachments
//! - SMTP delivery behind the [`MailTransport`] trait
//! - Best-effort dispatch on spawned tasks

pub mod dispatcher;
pub mod message;
pub mod stakeholders;
pub mod transport;

pub use dispatcher::{AlertDispatcher, DispatchSummary};
pub use message::{AlertTemplate, MailAttachment, OutgoingMail, TubeAlert};
pub use stakeholders::{Recipient, StakeholderList};
pub use transport::{MailTransport, SmtpMailer};
