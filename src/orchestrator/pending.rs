use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    ledger::models::{ether_to_wei, ScheduleCall},
    wallet::parse_address,
};

/// Raw schedule form input. Discarded once converted into a `ScheduleCall`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PendingSchedule {
    #[validate(length(min = 1, message = "Fields cannot be empty."))]
    pub receiver: String,
    /// Ether, e.g. "0.4"
    #[validate(length(min = 1, message = "Fields cannot be empty."))]
    pub amount: String,
    #[validate(length(min = 1, max = 280, message = "Note must be 1 to 280 characters."))]
    pub note: String,
    /// RFC 3339, or `YYYY-MM-DDTHH:MM` in UTC
    #[validate(length(min = 1, message = "Fields cannot be empty."))]
    pub scheduled_at: String,
}

impl PendingSchedule {
    /// Validate and freeze into call parameters. No network access.
    pub fn into_call(self) -> AppResult<ScheduleCall> {
        self.validate().map_err(|e| {
            let mut messages: Vec<String> = e
                .field_errors()
                .into_iter()
                .flat_map(|(field, errors)| {
                    errors.iter().map(move |err| {
                        err.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| format!("{} is invalid", field))
                    })
                })
                .collect();
            messages.sort();
            messages.dedup();
            AppError::Validation(messages.join(" "))
        })?;

        let receiver = parse_address(&self.receiver)
            .map_err(|_| AppError::Validation("Invalid receiver address.".to_string()))?;
        let amount = ether_to_wei(&self.amount)?;
        let scheduled_time = parse_scheduled_time(&self.scheduled_at)?;

        Ok(ScheduleCall {
            receiver,
            amount,
            note: self.note,
            scheduled_time,
        })
    }
}

/// Target datetime to unix seconds
pub fn parse_scheduled_time(input: &str) -> AppResult<u64> {
    let trimmed = input.trim();

    let timestamp = DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.timestamp())
        .or_else(|_| {
            NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M")
                .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S"))
                .map(|dt| dt.and_utc().timestamp())
        })
        .map_err(|_| AppError::Validation(format!("Invalid date/time: {}", trimmed)))?;

    if timestamp <= 0 {
        return Err(AppError::Validation(
            "Scheduled time must be after 1970-01-01".to_string(),
        ));
    }
    Ok(timestamp as u64)
}
