//! Wire types for the WebUntis API.
//!
//! These mirror the JSON shapes returned by the server: camelCase fields,
//! dates as `YYYYMMDD` numbers and times-of-day as `[H]HMM` numbers.
//! They live only for the duration of one fetch; `transform` turns them
//! into the cached model.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Deserialize;

use crate::element::{ElementRef, RawElement};
use crate::error::{UntisyncError, UntisyncResult};
use crate::lesson::LessonState;

/// One schedule slot of the weekly timetable.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPeriod {
    pub id: i64,
    #[serde(default)]
    pub lesson_text: String,
    #[serde(default)]
    pub period_text: String,
    #[serde(default)]
    pub period_info: String,
    #[serde(default)]
    pub subst_text: String,
    pub date: u32,
    pub start_time: u32,
    pub end_time: u32,
    #[serde(default)]
    pub elements: Vec<ElementRef>,
    pub cell_state: LessonState,
    #[serde(default)]
    pub is: PeriodFlags,
    #[serde(default)]
    pub exam: Option<RawPeriodExam>,
    #[serde(default)]
    pub reschedule_info: Option<RawReschedule>,
}

/// Server-reported boolean flags on a period.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodFlags {
    #[serde(default)]
    pub standard: bool,
    #[serde(default)]
    pub free: bool,
    #[serde(default)]
    pub additional: bool,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub substitution: bool,
    #[serde(default)]
    pub exam: bool,
    #[serde(default)]
    pub event: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPeriodExam {
    #[serde(default)]
    pub name: String,
    pub mark_schema_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReschedule {
    pub date: u32,
    pub start_time: u32,
    pub end_time: u32,
    pub is_source: bool,
}

/// The useful payload of the weekly timetable response: the roster plus
/// the periods keyed by the requested element id.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetablePayload {
    pub elements: Vec<RawElement>,
    pub element_periods: HashMap<String, Vec<RawPeriod>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawExam {
    pub exam_type: String,
    pub name: String,
    pub exam_date: u32,
    pub start_time: u32,
    pub end_time: u32,
    pub subject: String,
    #[serde(default)]
    pub teachers: Vec<String>,
    #[serde(default)]
    pub rooms: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawGrade {
    pub grade: RawGradeBody,
    pub subject: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawGradeBody {
    pub mark: RawMark,
    pub mark_schema_id: i64,
    pub date: u32,
    /// Milliseconds since the epoch.
    pub last_update: i64,
    #[serde(default)]
    pub text: String,
    pub exam_type: RawExamType,
    #[serde(default)]
    pub exam: Option<RawGradeExam>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMark {
    pub id: i64,
    pub name: String,
    pub mark_display_value: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawExamType {
    pub name: String,
    #[serde(default)]
    pub longname: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawGradeExam {
    pub id: i64,
    pub name: String,
    pub date: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAbsence {
    pub start_date: u32,
    pub end_date: u32,
    pub start_time: u32,
    pub end_time: u32,
    pub created_user: String,
    pub reason_id: i64,
    pub is_excused: bool,
    #[serde(default)]
    pub excuse: Option<RawExcuse>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawExcuse {
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSchoolYear {
    pub id: i64,
    pub name: String,
    pub date_range: RawDateRange,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawDateRange {
    pub start: String,
    pub end: String,
}

/// Parse a `YYYYMMDD` date number.
pub fn parse_date_number(date: u32) -> UntisyncResult<NaiveDate> {
    let year = (date / 10_000) as i32;
    let month = date / 100 % 100;
    let day = date % 100;

    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| UntisyncError::InvalidDateTime(format!("bad date number {date}")))
}

/// Parse a `[H]HMM` time-of-day number (830 means 08:30).
pub fn parse_time_number(time: u32) -> UntisyncResult<NaiveTime> {
    let hours = time / 100;
    let minutes = time % 100;

    NaiveTime::from_hms_opt(hours, minutes, 0)
        .ok_or_else(|| UntisyncError::InvalidDateTime(format!("bad time number {time}")))
}

/// Combine a date number and a time-of-day number into one timestamp.
pub fn combine_date_time(date: u32, time: u32) -> UntisyncResult<NaiveDateTime> {
    Ok(parse_date_number(date)?.and_time(parse_time_number(time)?))
}
