//! Transformed model: what the engine caches, diffs and renders.
//!
//! Lessons are produced by `transform`, merged into blocks by `merge`, and
//! round-trip through the cache as JSON. All timestamps are naive local
//! times (the school's wall clock).

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::element::StatefulElement;

/// The server-reported state of a timetable cell, refined by the
/// state-derivation step in `transform`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LessonState {
    #[serde(rename = "STANDARD")]
    Normal,
    #[serde(rename = "FREE")]
    Free,
    #[serde(rename = "CANCEL")]
    Canceled,
    #[serde(rename = "EXAM")]
    Exam,
    #[serde(rename = "SHIFT")]
    Rescheduled,
    #[serde(rename = "SUBSTITUTION")]
    Substituted,
    #[serde(rename = "ROOMSUBSTITUTION")]
    RoomSubstituted,
    #[serde(rename = "TEACHERSUBSTITUTION")]
    TeacherSubstituted,
    #[serde(rename = "ADDITIONAL")]
    Additional,
}

/// A transformed lesson: one period, or several merged ones (`duration` > 1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: i64,
    pub note: Option<String>,
    pub text: Option<String>,
    pub info: Option<String>,
    pub substitution_text: Option<String>,

    pub from: NaiveDateTime,
    pub to: NaiveDateTime,

    pub groups: Vec<StatefulElement>,
    pub subject: Option<StatefulElement>,
    pub teachers: Vec<StatefulElement>,
    pub rooms: Vec<StatefulElement>,

    pub state: LessonState,
    pub is_event: bool,

    pub exam: Option<LessonExam>,

    pub is_rescheduled: bool,
    pub reschedule: Option<Reschedule>,

    /// Number of merged periods, starts at 1.
    pub duration: u32,
    /// Total milliseconds of gaps absorbed while merging; `None` until the
    /// first merge.
    pub break_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonExam {
    pub name: String,
    pub mark_schema_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reschedule {
    /// Whether this lesson is the reschedule source (the moved-away slot)
    /// or the target.
    pub is_source: bool,
    pub other_from: NaiveDateTime,
    pub other_to: NaiveDateTime,
}

/// A week of lessons keyed by day. The map keeps keys date-ordered; each
/// day's list is ordered by start time, which the merger relies on.
pub type LessonWeek = BTreeMap<NaiveDate, Vec<Lesson>>;

impl Lesson {
    pub fn subject_name(&self) -> Option<&str> {
        self.subject.as_ref().and_then(|s| s.name.as_deref())
    }

    /// A display title for the lesson, preferring the subject name and
    /// falling back through info, text and the first teacher.
    pub fn subject_title(&self, use_long_name: bool) -> String {
        if use_long_name {
            if let Some(long) = self.subject.as_ref().and_then(|s| s.long_name.as_deref()) {
                return long.to_string();
            }
        }
        if let Some(name) = self.subject_name() {
            return name.to_string();
        }
        if let Some(info) = self.info.as_deref().filter(|s| !s.is_empty()) {
            return info.to_string();
        }
        if let Some(text) = self.text.as_deref().filter(|s| !s.is_empty()) {
            return text.to_string();
        }
        if let Some(teacher) = self.teachers.first().and_then(|t| t.name.as_deref()) {
            return teacher.to_string();
        }
        "?".to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exam {
    pub name: String,
    /// The exam type as reported by the server ("test", "Schularbeit", ...).
    pub kind: String,
    pub from: NaiveDateTime,
    pub to: NaiveDateTime,
    pub subject: String,
    pub teacher_names: Vec<String>,
    pub room_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    pub subject: String,
    pub date: NaiveDate,
    /// Epoch milliseconds of the last server-side update.
    pub last_updated: i64,
    pub text: String,
    pub schema_id: i64,
    pub mark: Mark,
    pub exam_type: ExamType,
    pub exam: Option<GradeExam>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mark {
    pub id: i64,
    pub name: String,
    pub display_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamType {
    pub name: String,
    pub long_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeExam {
    pub id: i64,
    pub name: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Absence {
    pub from: NaiveDateTime,
    pub to: NaiveDateTime,
    pub created_by: String,
    pub reason_id: i64,
    pub is_excused: bool,
    pub excused_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchoolYear {
    pub id: i64,
    pub name: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
}
