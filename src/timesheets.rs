//! Weekly timesheet entry rules.

use std::collections::HashSet;

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::NewTimesheetEntry;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryError {
    #[error("week_ending must be a Sunday")]
    WeekEndingNotSunday,
    #[error("day_of_week must be between 1 (Monday) and 7 (Sunday)")]
    DayOutOfRange,
    #[error("day {0} appears more than once")]
    DuplicateDay(i32),
    #[error("day {0}: invalid time '{1}', expected HH:MM")]
    InvalidTime(i32, String),
    #[error("day {0}: both start and finish times are required")]
    MissingTimes(i32),
    #[error("day {0}: finish time must be after start time")]
    FinishBeforeStart(i32),
}

impl From<EntryError> for AppError {
    fn from(value: EntryError) -> Self {
        AppError::bad_request(value.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EntryInput {
    pub day_of_week: i32,
    pub time_started: Option<String>,
    pub time_finished: Option<String>,
    #[serde(default)]
    pub working_in_yard: bool,
    #[serde(default)]
    pub did_not_work: bool,
    pub remarks: Option<String>,
}

pub fn validate_week_ending(date: NaiveDate) -> Result<(), EntryError> {
    if date.weekday() == Weekday::Sun {
        Ok(())
    } else {
        Err(EntryError::WeekEndingNotSunday)
    }
}

fn parse_time(day: i32, raw: Option<&str>) -> Result<Option<NaiveTime>, EntryError> {
    let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map(Some)
        .map_err(|_| EntryError::InvalidTime(day, raw.to_string()))
}

/// Minutes worked: zero for days off, otherwise finish minus start.
pub fn daily_total_minutes(
    day: i32,
    started: Option<NaiveTime>,
    finished: Option<NaiveTime>,
    did_not_work: bool,
) -> Result<i32, EntryError> {
    if did_not_work {
        return Ok(0);
    }
    match (started, finished) {
        (None, None) => Ok(0),
        (Some(start), Some(finish)) if finish > start => {
            Ok((finish - start).num_minutes() as i32)
        }
        (Some(_), Some(_)) => Err(EntryError::FinishBeforeStart(day)),
        _ => Err(EntryError::MissingTimes(day)),
    }
}

pub fn build_entries(
    timesheet_id: Uuid,
    inputs: &[EntryInput],
) -> Result<Vec<NewTimesheetEntry>, EntryError> {
    let mut seen = HashSet::new();
    let mut entries = Vec::with_capacity(inputs.len());
    for input in inputs {
        let day = input.day_of_week;
        if !(1..=7).contains(&day) {
            return Err(EntryError::DayOutOfRange);
        }
        if !seen.insert(day) {
            return Err(EntryError::DuplicateDay(day));
        }
        let (started, finished) = if input.did_not_work {
            (None, None)
        } else {
            (
                parse_time(day, input.time_started.as_deref())?,
                parse_time(day, input.time_finished.as_deref())?,
            )
        };
        let minutes = daily_total_minutes(day, started, finished, input.did_not_work)?;
        entries.push(NewTimesheetEntry {
            id: Uuid::new_v4(),
            timesheet_id,
            day_of_week: day,
            time_started: started,
            time_finished: finished,
            working_in_yard: input.working_in_yard,
            did_not_work: input.did_not_work,
            daily_total_minutes: minutes,
            remarks: input
                .remarks
                .as_ref()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
        });
    }
    entries.sort_by_key(|entry| entry.day_of_week);
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(day: i32, start: Option<&str>, finish: Option<&str>) -> EntryInput {
        EntryInput {
            day_of_week: day,
            time_started: start.map(str::to_string),
            time_finished: finish.map(str::to_string),
            working_in_yard: false,
            did_not_work: false,
            remarks: None,
        }
    }

    #[test]
    fn week_ending_must_be_sunday() {
        assert!(validate_week_ending(NaiveDate::from_ymd_opt(2025, 3, 2).unwrap()).is_ok());
        assert_eq!(
            validate_week_ending(NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()),
            Err(EntryError::WeekEndingNotSunday)
        );
    }

    #[test]
    fn computes_daily_minutes() {
        let entries = build_entries(
            Uuid::new_v4(),
            &[entry(2, Some("07:30"), Some("16:15")), entry(1, Some("08:00:00"), Some("12:00"))],
        )
        .unwrap();
        assert_eq!(entries[0].day_of_week, 1);
        assert_eq!(entries[0].daily_total_minutes, 240);
        assert_eq!(entries[1].daily_total_minutes, 525);
    }

    #[test]
    fn did_not_work_zeroes_the_day() {
        let mut off = entry(6, Some("07:00"), Some("09:00"));
        off.did_not_work = true;
        let entries = build_entries(Uuid::new_v4(), &[off]).unwrap();
        assert_eq!(entries[0].daily_total_minutes, 0);
        assert!(entries[0].time_started.is_none());
    }

    #[test]
    fn rejects_bad_entries() {
        let id = Uuid::new_v4();
        assert_eq!(
            build_entries(id, &[entry(8, None, None)]).unwrap_err(),
            EntryError::DayOutOfRange
        );
        assert_eq!(
            build_entries(id, &[entry(1, None, None), entry(1, None, None)]).unwrap_err(),
            EntryError::DuplicateDay(1)
        );
        assert_eq!(
            build_entries(id, &[entry(3, Some("17:00"), Some("08:00"))]).unwrap_err(),
            EntryError::FinishBeforeStart(3)
        );
        assert_eq!(
            build_entries(id, &[entry(4, Some("08:00"), None)]).unwrap_err(),
            EntryError::MissingTimes(4)
        );
        assert_eq!(
            build_entries(id, &[entry(5, Some("8am"), Some("17:00"))]).unwrap_err(),
            EntryError::InvalidTime(5, "8am".into())
        );
    }
}
