//! User configuration.
//!
//! Loaded from `<config dir>/untisync/config.toml`; every field has a
//! default so a missing file or a partial file both work.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::error::{UntisyncError, UntisyncResult};
use crate::lesson::{Lesson, LessonWeek};

/// Teacher names the server uses as "no teacher" placeholders.
pub const NO_VALUE_PLACEHOLDERS: &[&str] = &["---"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Gaps of at most this many minutes may be absorbed when merging
    /// consecutive lessons.
    pub break_min_minutes: u32,
    /// Gaps longer than this many minutes count as a long break.
    pub break_max_minutes: u32,
    pub refreshing: RefreshingConfig,
    pub cache_hours: CacheHours,
    pub notifications: NotificationsConfig,
    pub views: ViewsConfig,
    /// Per-subject overrides, keyed by subject short name. A subject maps
    /// to either one override or a list of teacher-scoped overrides.
    pub lesson_options: BTreeMap<String, LessonOverrides>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            break_min_minutes: 7,
            break_max_minutes: 45,
            refreshing: RefreshingConfig::default(),
            cache_hours: CacheHours::default(),
            notifications: NotificationsConfig::default(),
            views: ViewsConfig::default(),
            lesson_options: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshingConfig {
    /// Next-day lessons closer than this many hours switch polling from
    /// lazy to normal.
    pub normal_scope_hours: u32,
    pub normal_interval_minutes: u32,
    pub lazy_interval_minutes: u32,
}

impl Default for RefreshingConfig {
    fn default() -> RefreshingConfig {
        RefreshingConfig {
            normal_scope_hours: 12,
            normal_interval_minutes: 60,
            lazy_interval_minutes: 4 * 60,
        }
    }
}

/// Per-topic cache max-age in (fractional) hours.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheHours {
    pub user: f64,
    pub lessons: f64,
    pub exams: f64,
    pub grades: f64,
    pub absences: f64,
    pub school_years: f64,
}

impl Default for CacheHours {
    fn default() -> CacheHours {
        CacheHours {
            user: 0.25,
            lessons: 0.5,
            exams: 24.0,
            grades: 8.0,
            absences: 24.0,
            school_years: 24.0,
        }
    }
}

pub fn hours_to_delta(hours: f64) -> TimeDelta {
    TimeDelta::milliseconds((hours * 3_600_000.0) as i64)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub lessons: bool,
    pub exams: bool,
    pub grades: bool,
    pub absences: bool,
}

impl Default for NotificationsConfig {
    fn default() -> NotificationsConfig {
        NotificationsConfig {
            lessons: true,
            exams: true,
            grades: true,
            absences: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewsConfig {
    pub lessons: LessonsViewConfig,
    pub exams: ScopedViewConfig,
    pub grades: ScopedViewConfig,
    pub absences: AbsencesViewConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LessonsViewConfig {
    pub max_count: usize,
    pub show_canceled: bool,
    pub show_long_breaks: bool,
    pub show_end_times: bool,
}

impl Default for LessonsViewConfig {
    fn default() -> LessonsViewConfig {
        LessonsViewConfig {
            max_count: 8,
            show_canceled: true,
            show_long_breaks: true,
            show_end_times: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopedViewConfig {
    pub max_count: usize,
    pub scope_days: u32,
}

impl Default for ScopedViewConfig {
    fn default() -> ScopedViewConfig {
        ScopedViewConfig {
            max_count: 3,
            scope_days: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AbsencesViewConfig {
    pub max_count: usize,
}

impl Default for AbsencesViewConfig {
    fn default() -> AbsencesViewConfig {
        AbsencesViewConfig { max_count: 3 }
    }
}

/// A subject's override: either one record for all teachers, or a list of
/// teacher-scoped records of which the first matching teacher wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LessonOverrides {
    Single(SubjectOverride),
    PerTeacher(Vec<TeacherOverride>),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubjectOverride {
    pub color: Option<String>,
    pub subject_override: Option<String>,
    pub long_name_override: Option<String>,
    pub ignore_info: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeacherOverride {
    pub teacher: String,
    #[serde(flatten)]
    pub option: SubjectOverride,
}

impl Config {
    pub fn config_path() -> UntisyncResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| UntisyncError::Config("Could not determine config directory".into()))?
            .join("untisync");

        Ok(config_dir.join("config.toml"))
    }

    /// Load the config file, falling back to defaults when it is absent.
    pub fn load() -> UntisyncResult<Config> {
        let path = Self::config_path()?;

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            toml::from_str(&content).map_err(|e| UntisyncError::Config(e.to_string()))
        } else {
            Ok(Config::default())
        }
    }

    /// Find the override record applying to a lesson: the subject's single
    /// record, or the teacher-scoped record matching one of the lesson's
    /// teachers.
    pub fn override_for(&self, lesson: &Lesson) -> Option<&SubjectOverride> {
        let subject = lesson.subject_name()?;
        match self.lesson_options.get(subject)? {
            LessonOverrides::Single(option) => Some(option),
            LessonOverrides::PerTeacher(options) => options
                .iter()
                .find(|option| {
                    lesson
                        .teachers
                        .iter()
                        .any(|t| t.name.as_deref() == Some(option.teacher.as_str()))
                })
                .map(|o| &o.option),
        }
    }
}

/// Apply the configured per-subject overrides to a transformed week.
///
/// Runs after caching and diffing, so a config edit never shows up as a
/// timetable change.
pub fn apply_lesson_overrides(week: &mut LessonWeek, config: &Config) {
    for lessons in week.values_mut() {
        apply_lesson_overrides_all(lessons, config);
    }
}

pub fn apply_lesson_overrides_all(lessons: &mut [Lesson], config: &Config) {
    for lesson in lessons.iter_mut() {
        apply_override(lesson, config);
    }
}

fn apply_override(lesson: &mut Lesson, config: &Config) {
    let Some(option) = config.override_for(lesson).cloned() else {
        return;
    };

    let ignored = |field: &Option<String>| {
        field
            .as_deref()
            .is_some_and(|value| option.ignore_info.iter().any(|i| i == value))
    };

    if ignored(&lesson.info) {
        lesson.info = None;
    }
    if ignored(&lesson.note) {
        lesson.note = None;
    }
    if ignored(&lesson.text) {
        lesson.text = None;
    }

    if let Some(subject) = lesson.subject.as_mut() {
        if let Some(name) = &option.subject_override {
            subject.name = Some(name.clone());
        }
        if let Some(long_name) = &option.long_name_override {
            subject.long_name = Some(long_name.clone());
        }
    }
}
