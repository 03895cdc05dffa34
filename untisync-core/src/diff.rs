//! Change detection between the cached and the freshly fetched state.
//!
//! Each comparison yields human-readable change events that the CLI turns
//! into desktop notifications. Lesson fields are checked in a fixed
//! priority order and only the first differing category is reported, so a
//! lesson yields events from at most one category per sync.

use chrono::NaiveDateTime;

use crate::config::NO_VALUE_PLACEHOLDERS;
use crate::element::StatefulElement;
use crate::lesson::{Absence, Exam, Grade, Lesson, LessonState, LessonWeek};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    LessonAdded,
    InfoChanged,
    NoteChanged,
    TextChanged,
    /// Moved within the same day.
    Shifted,
    /// Moved to another day.
    Rescheduled,
    ExamAttached,
    LessonCanceled,
    RoomChanged,
    TeacherCancelled,
    TeacherSubstituted,
    Substituted,
    ExamAdded,
    GradeReceived,
    AbsenceRecorded,
}

/// One notifiable difference between the cached and the fresh state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub title: String,
    pub body: String,
}

impl ChangeEvent {
    fn new(kind: ChangeKind, title: String, body: String) -> ChangeEvent {
        ChangeEvent { kind, title, body }
    }
}

fn weekday(time: NaiveDateTime) -> String {
    time.format("%A").to_string()
}

fn clock(time: NaiveDateTime) -> String {
    time.format("%H:%M").to_string()
}

fn names(elements: &[StatefulElement]) -> String {
    elements
        .iter()
        .filter_map(|element| element.name.as_deref())
        .collect::<Vec<_>>()
        .join(", ")
}

fn is_placeholder(name: Option<&str>) -> bool {
    name.is_some_and(|name| NO_VALUE_PLACEHOLDERS.contains(&name))
}

/// Compare two weeks of lessons.
///
/// Days missing from the cache are skipped entirely, as are days whose
/// lesson lists are equal.
pub fn compare_lessons(old: &LessonWeek, new: &LessonWeek) -> Vec<ChangeEvent> {
    let mut events = Vec::new();

    for (day, lessons) in new {
        let Some(old_lessons) = old.get(day) else {
            continue;
        };
        if old_lessons == lessons {
            continue;
        }

        for lesson in lessons {
            match old_lessons.iter().find(|old| old.id == lesson.id) {
                None => {
                    // A reschedule target shows up as a new period; the
                    // shift event covers it.
                    if !lesson.is_rescheduled {
                        let title = lesson.subject_title(false);
                        events.push(ChangeEvent::new(
                            ChangeKind::LessonAdded,
                            format!("{title} was added"),
                            format!("{title} was added on {}", weekday(lesson.from)),
                        ));
                    }
                }
                Some(previous) => compare_lesson(previous, lesson, &mut events),
            }
        }
    }

    events
}

/// The per-lesson priority chain: the first differing category wins and
/// the rest are not checked.
fn compare_lesson(old: &Lesson, new: &Lesson, events: &mut Vec<ChangeEvent>) {
    if old == new {
        return;
    }

    let title = new.subject_title(false);
    let day = weekday(new.from);

    if old.info != new.info {
        events.push(ChangeEvent::new(
            ChangeKind::InfoChanged,
            format!("Info for {title} changed"),
            format!("on {day}: \"{}\"", new.info.as_deref().unwrap_or("")),
        ));
        return;
    }

    if old.note != new.note {
        events.push(ChangeEvent::new(
            ChangeKind::NoteChanged,
            format!("Note for {title} changed"),
            format!("on {day}: \"{}\"", new.note.as_deref().unwrap_or("")),
        ));
        return;
    }

    if old.text != new.text {
        events.push(ChangeEvent::new(
            ChangeKind::TextChanged,
            format!("Text for {title} changed"),
            format!("on {day}: \"{}\"", new.text.as_deref().unwrap_or("")),
        ));
        return;
    }

    if old.is_rescheduled != new.is_rescheduled {
        // Only the source slot of a reschedule notifies; the target would
        // duplicate it.
        if let Some(info) = new.reschedule.as_ref().filter(|info| info.is_source) {
            if info.other_from.date() == new.from.date() {
                events.push(ChangeEvent::new(
                    ChangeKind::Shifted,
                    format!("{day}: {title} was shifted"),
                    format!("from {} to {}", clock(new.from), clock(info.other_from)),
                ));
            } else {
                events.push(ChangeEvent::new(
                    ChangeKind::Rescheduled,
                    format!("{day}: {title} was rescheduled"),
                    format!(
                        "from {} to {}",
                        weekday(new.from),
                        weekday(info.other_from)
                    ),
                ));
            }
        }
        return;
    }

    if old.exam != new.exam && new.exam.is_some() {
        events.push(ChangeEvent::new(
            ChangeKind::ExamAttached,
            format!("Exam for {title} was added"),
            format!("on {day} at {}", clock(new.from)),
        ));
        return;
    }

    if old.state != new.state {
        match new.state {
            LessonState::Canceled | LessonState::Free => {
                events.push(ChangeEvent::new(
                    ChangeKind::LessonCanceled,
                    format!("{day}: {title} was cancelled"),
                    format!("{title} at {} was cancelled", clock(new.from)),
                ));
            }
            LessonState::RoomSubstituted => {
                for room in new.rooms.iter().filter(|room| room.is_substituted()) {
                    events.push(ChangeEvent::new(
                        ChangeKind::RoomChanged,
                        format!("{day}: {title} - room changed"),
                        format!(
                            "from {} to {}",
                            room.original
                                .as_ref()
                                .and_then(|o| o.name.as_deref())
                                .unwrap_or("?"),
                            room.name.as_deref().unwrap_or("?")
                        ),
                    ));
                }
            }
            LessonState::TeacherSubstituted => {
                for teacher in new.teachers.iter().filter(|t| t.is_substituted()) {
                    if is_placeholder(teacher.name.as_deref()) {
                        events.push(ChangeEvent::new(
                            ChangeKind::TeacherCancelled,
                            format!("{day}: {title} - teacher cancelled"),
                            format!(
                                "teacher {} cancelled",
                                teacher
                                    .original
                                    .as_ref()
                                    .and_then(|o| o.name.as_deref())
                                    .unwrap_or("?")
                            ),
                        ));
                        break;
                    }

                    events.push(ChangeEvent::new(
                        ChangeKind::TeacherSubstituted,
                        format!("{day}: {title} - teacher substituted"),
                        format!(
                            "from {} to {}",
                            teacher
                                .original
                                .as_ref()
                                .and_then(|o| o.name.as_deref())
                                .unwrap_or("?"),
                            teacher.name.as_deref().unwrap_or("?")
                        ),
                    ));
                }
            }
            LessonState::Substituted => {
                events.push(ChangeEvent::new(
                    ChangeKind::Substituted,
                    format!("{day}: {title} substituted"),
                    format!(
                        "{title} at {} with {} in {}",
                        clock(new.from),
                        names(&new.teachers),
                        names(&new.rooms)
                    ),
                ));
            }
            _ => {}
        }
    }
}

/// Exams are identified by subject, type and start time; anything fresh
/// under a new identity counts as added.
pub fn compare_exams(old: &[Exam], new: &[Exam]) -> Vec<ChangeEvent> {
    new.iter()
        .filter(|exam| {
            !old.iter().any(|cached| {
                cached.subject == exam.subject && cached.kind == exam.kind && cached.from == exam.from
            })
        })
        .map(|exam| {
            let rooms = exam.room_names.join(", ");
            ChangeEvent::new(
                ChangeKind::ExamAdded,
                format!("Exam {} on {}", exam.subject, exam.from.format("%d.%m.%Y")),
                format!(
                    "The {} takes place @ {} in {}.",
                    exam.kind,
                    clock(exam.from),
                    if rooms.is_empty() {
                        "an unknown room".to_string()
                    } else {
                        rooms
                    }
                ),
            )
        })
        .collect()
}

pub fn compare_grades(old: &[Grade], new: &[Grade]) -> Vec<ChangeEvent> {
    new.iter()
        .filter(|grade| !old.contains(grade))
        .map(|grade| {
            ChangeEvent::new(
                ChangeKind::GradeReceived,
                format!("You received a grade in {}", grade.subject),
                format!(
                    "you got a \"{}\" ({}) on a {}",
                    grade.mark.display_value, grade.text, grade.exam_type.name
                ),
            )
        })
        .collect()
}

pub fn compare_absences(old: &[Absence], new: &[Absence]) -> Vec<ChangeEvent> {
    new.iter()
        .filter(|absence| !old.contains(absence))
        .map(|absence| {
            ChangeEvent::new(
                ChangeKind::AbsenceRecorded,
                format!("An absence was added by {}", absence.created_by),
                format!(
                    "you were absent from {} to {}",
                    absence.from.format("%d.%m.%Y %H:%M"),
                    absence.to.format("%d.%m.%Y %H:%M")
                ),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Element, ElementState};
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 9, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn named(name: &str) -> StatefulElement {
        StatefulElement {
            id: 1,
            name: Some(name.to_string()),
            long_name: None,
            capacity: None,
            state: ElementState::Regular,
            original: None,
        }
    }

    fn substituted(name: &str, original: &str) -> StatefulElement {
        StatefulElement {
            id: 2,
            name: Some(name.to_string()),
            long_name: None,
            capacity: None,
            state: ElementState::Substituted,
            original: Some(Element {
                id: 3,
                name: Some(original.to_string()),
                long_name: None,
                capacity: None,
            }),
        }
    }

    fn lesson(id: i64, day: u32) -> Lesson {
        Lesson {
            id,
            note: None,
            text: None,
            info: None,
            substitution_text: None,
            from: at(day, 8, 0),
            to: at(day, 8, 50),
            groups: vec![],
            subject: Some(named("MA")),
            teachers: vec![named("SMI")],
            rooms: vec![named("R101")],
            state: LessonState::Normal,
            is_event: false,
            exam: None,
            is_rescheduled: false,
            reschedule: None,
            duration: 1,
            break_ms: None,
        }
    }

    fn week(lessons: Vec<Lesson>) -> LessonWeek {
        let mut week = LessonWeek::new();
        for lesson in lessons {
            week.entry(lesson.from.date()).or_default().push(lesson);
        }
        week
    }

    #[test]
    fn equal_days_produce_no_events() {
        let old = week(vec![lesson(1, 15)]);
        let new = week(vec![lesson(1, 15)]);
        assert!(compare_lessons(&old, &new).is_empty());
    }

    #[test]
    fn days_missing_from_the_cache_are_skipped() {
        let old = LessonWeek::new();
        let new = week(vec![lesson(1, 15)]);
        assert!(compare_lessons(&old, &new).is_empty());
    }

    #[test]
    fn new_lesson_reported_unless_rescheduled() {
        let mut shifted = lesson(3, 15);
        shifted.is_rescheduled = true;
        let old = week(vec![lesson(1, 15)]);
        let new = week(vec![lesson(1, 15), lesson(2, 15), shifted]);

        let events = compare_lessons(&old, &new);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::LessonAdded);
    }

    #[test]
    fn info_change_outranks_state_change() {
        let old = week(vec![lesson(1, 15)]);
        let mut changed = lesson(1, 15);
        changed.info = Some("room key at the office".to_string());
        changed.state = LessonState::Canceled;
        let new = week(vec![changed]);

        let events = compare_lessons(&old, &new);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::InfoChanged);
    }

    #[test]
    fn cancellation_is_reported_once() {
        let old = week(vec![lesson(1, 15)]);
        let mut canceled = lesson(1, 15);
        canceled.state = LessonState::Canceled;
        let new = week(vec![canceled]);

        let events = compare_lessons(&old, &new);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::LessonCanceled);
    }

    #[test]
    fn teacher_substitution_reports_each_changed_teacher() {
        let old = week(vec![lesson(1, 15)]);
        let mut changed = lesson(1, 15);
        changed.state = LessonState::TeacherSubstituted;
        changed.teachers = vec![substituted("JON", "SMI"), substituted("DOE", "RAY")];
        let new = week(vec![changed]);

        let events = compare_lessons(&old, &new);
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .all(|event| event.kind == ChangeKind::TeacherSubstituted));
    }

    #[test]
    fn placeholder_teacher_reports_cancellation_and_continues() {
        let mut placeholder = lesson(1, 15);
        placeholder.state = LessonState::TeacherSubstituted;
        placeholder.teachers = vec![substituted("---", "SMI")];
        let mut canceled = lesson(2, 15);
        canceled.state = LessonState::Canceled;

        let old = week(vec![lesson(1, 15), lesson(2, 15)]);
        let new = week(vec![placeholder, canceled]);

        // The second lesson's cancellation must still be reported.
        let events = compare_lessons(&old, &new);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, ChangeKind::TeacherCancelled);
        assert_eq!(events[1].kind, ChangeKind::LessonCanceled);
    }

    #[test]
    fn reschedule_only_notifies_from_the_source_slot() {
        let old = week(vec![lesson(1, 15)]);
        let mut moved = lesson(1, 15);
        moved.is_rescheduled = true;
        moved.reschedule = Some(crate::lesson::Reschedule {
            is_source: true,
            other_from: at(16, 10, 0),
            other_to: at(16, 10, 50),
        });
        let new = week(vec![moved.clone()]);

        let events = compare_lessons(&old, &new);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::Rescheduled);

        moved.reschedule.as_mut().unwrap().is_source = false;
        let new = week(vec![moved]);
        assert!(compare_lessons(&old, &new).is_empty());
    }

    #[test]
    fn exams_keyed_by_subject_type_and_start() {
        let exam = |subject: &str, kind: &str, day: u32| Exam {
            name: "Algebra".to_string(),
            kind: kind.to_string(),
            from: at(day, 8, 0),
            to: at(day, 9, 0),
            subject: subject.to_string(),
            teacher_names: vec![],
            room_names: vec![],
        };

        let old = vec![exam("MA", "test", 15)];
        let new = vec![exam("MA", "test", 15), exam("MA", "test", 22)];

        let events = compare_exams(&old, &new);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::ExamAdded);
    }
}
