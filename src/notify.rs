//! Outbound notification port. Message composition lives here; actual
//! delivery (SMTP or otherwise) is an external collaborator behind the
//! `Notifier` trait, so the scan path stays testable without network I/O.
//!
//! Every method is fire-and-forget: delivery failures are logged by the
//! implementation and must never fail a committed attendance record.

use crate::model::attendance::{AttendanceRecord, AttendanceType};
use crate::model::user::User;

pub trait Notifier: Send + Sync {
    /// Sent after a successful registration.
    fn welcome(&self, user: &User);

    /// Sent to the acting user after their record is committed.
    fn attendance_confirmation(&self, user: &User, record: &AttendanceRecord);

    /// Broadcast to all admins when a scan lands outside the geofence.
    fn location_alert(&self, admin_emails: &[String], user: &User, record: &AttendanceRecord);
}

fn action_label(record: &AttendanceRecord) -> &'static str {
    AttendanceType::from_str(&record.kind)
        .map(|t| t.label())
        .unwrap_or("Attendance")
}

pub fn confirmation_subject(record: &AttendanceRecord) -> String {
    format!("Attendance {} Confirmation", action_label(record))
}

pub fn confirmation_body(user: &User, record: &AttendanceRecord) -> String {
    let mut body = format!(
        "Hello {}, your {} has been recorded successfully at {}. Status: {}.",
        user.name,
        action_label(record).to_lowercase(),
        record.timestamp.to_rfc3339(),
        record.status,
    );
    if let Some(notes) = &record.notes {
        body.push_str(&format!(" Notes: {notes}."));
    }
    body
}

pub fn alert_subject(user: &User) -> String {
    format!("Suspicious Location Alert - {}", user.name)
}

pub fn alert_body(user: &User, record: &AttendanceRecord) -> String {
    let location = record
        .location
        .as_ref()
        .map(|l| format!("latitude {}, longitude {}", l.latitude, l.longitude))
        .unwrap_or_else(|| "not provided".to_string());

    format!(
        "{} ({}) performed a {} at {} from outside the allowed radius. \
         Location: {}. IP: {}. Device: {}.",
        user.name,
        user.email,
        action_label(record).to_lowercase(),
        record.timestamp.to_rfc3339(),
        location,
        record.ip_address.as_deref().unwrap_or("unknown"),
        record.device_info.as_deref().unwrap_or("not provided"),
    )
}

/// Default wiring: renders each message and writes it to the application log
/// instead of handing it to a mail relay.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn welcome(&self, user: &User) {
        tracing::info!(
            to = %user.email,
            subject = "Welcome to Attendance System",
            "outbound mail"
        );
    }

    fn attendance_confirmation(&self, user: &User, record: &AttendanceRecord) {
        tracing::info!(
            to = %user.email,
            subject = %confirmation_subject(record),
            body = %confirmation_body(user, record),
            "outbound mail"
        );
    }

    fn location_alert(&self, admin_emails: &[String], user: &User, record: &AttendanceRecord) {
        tracing::warn!(
            to = %admin_emails.join(","),
            subject = %alert_subject(user),
            body = %alert_body(user, record),
            "outbound mail"
        );
    }
}
