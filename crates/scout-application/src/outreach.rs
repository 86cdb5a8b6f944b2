//! Actionable outreach suggestions derived from record attributes.
//!
//! Suggestions are deterministic: the same record and reference date always
//! yield the same suggestion, so a ranking shown twice recommends the same
//! follow-up twice.

use chrono::{Duration, NaiveDate};
use scout_core::record::Record;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Activity score above which a contractor counts as hot.
const HIGH_ACTIVITY_THRESHOLD: f64 = 0.8;
/// Days without contact after which a follow-up is due.
const STALE_CONTACT_DAYS: i64 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// One concrete follow-up for a contractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutreachSuggestion {
    pub contractor: String,
    /// What to do: "contact", "follow_up", or "schedule_meeting".
    pub action: String,
    pub reason: String,
    pub priority: Priority,
    /// ISO date (YYYY-MM-DD) to act on.
    pub suggested_date: String,
    /// "phone" when a phone number is on file, "email" otherwise.
    pub contact_method: String,
    pub contact_info: String,
}

/// Derives the follow-up for one record relative to `today`.
pub fn suggest(record: &Record, today: NaiveDate) -> OutreachSuggestion {
    let activity = record.attribute_f64("activity_score");
    let last_contact_days = record.attribute_i64("last_contact_days");
    let (contact_method, contact_info) = contact_channel(record);

    let (action, reason, priority, days_out) = match (activity, last_contact_days) {
        (Some(score), _) if score > HIGH_ACTIVITY_THRESHOLD => (
            "contact",
            "recent high activity".to_string(),
            Priority::High,
            2,
        ),
        (_, Some(days)) if days > STALE_CONTACT_DAYS => (
            "follow_up",
            format!("no contact for {days} days"),
            Priority::Medium,
            4,
        ),
        _ => (
            "schedule_meeting",
            "regular follow-up".to_string(),
            Priority::Low,
            10,
        ),
    };

    OutreachSuggestion {
        contractor: record.display_name().to_string(),
        action: action.to_string(),
        reason,
        priority,
        suggested_date: (today + Duration::days(days_out)).format("%Y-%m-%d").to_string(),
        contact_method,
        contact_info,
    }
}

/// Derives suggestions for a batch of records.
pub fn suggest_all<'a>(
    records: impl IntoIterator<Item = &'a Record>,
    today: NaiveDate,
) -> Vec<OutreachSuggestion> {
    records.into_iter().map(|r| suggest(r, today)).collect()
}

fn contact_channel(record: &Record) -> (String, String) {
    if let Some(phone) = record.attribute_str("phone").filter(|p| !p.is_empty()) {
        ("phone".to_string(), phone.to_string())
    } else {
        (
            "email".to_string(),
            record.attribute_str("url").unwrap_or_default().to_string(),
        )
    }
}
