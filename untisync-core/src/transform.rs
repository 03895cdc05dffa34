//! Raw periods to lessons.
//!
//! Resolves every element reference against the roster, derives the final
//! lesson state from the server state plus the elements' substitution
//! marks, then sorts and merges each day.

use chrono::NaiveDate;

use crate::config::Config;
use crate::element::{ElementIndex, ElementKind, StatefulElement};
use crate::error::{UntisyncError, UntisyncResult};
use crate::lesson::{
    Absence, Exam, ExamType, Grade, GradeExam, Lesson, LessonExam, LessonState, LessonWeek, Mark,
    Reschedule, SchoolYear,
};
use crate::merge::{combine_lessons, MergeOptions};
use crate::raw::{
    combine_date_time, parse_date_number, RawAbsence, RawExam, RawGrade, RawPeriod, RawSchoolYear,
    TimetablePayload,
};

/// Transform one weekly timetable payload into a merged week of lessons.
///
/// Periods of the requested element are looked up under `element_id`; a
/// payload without that key yields an empty week.
pub fn transform_timetable(
    payload: &TimetablePayload,
    element_id: i64,
    config: &Config,
) -> UntisyncResult<LessonWeek> {
    let index = ElementIndex::new(&payload.elements);
    let periods = payload
        .element_periods
        .get(&element_id.to_string())
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut week = LessonWeek::new();
    for period in periods {
        let lesson = transform_period(period, &index)?;
        week.entry(lesson.from.date()).or_default().push(lesson);
    }

    for lessons in week.values_mut() {
        lessons.sort_by_key(|lesson| lesson.from);
        *lessons = combine_lessons(lessons, config, MergeOptions::default());
    }

    Ok(week)
}

fn transform_period(period: &RawPeriod, index: &ElementIndex) -> UntisyncResult<Lesson> {
    let mut groups = Vec::new();
    let mut teachers = Vec::new();
    let mut rooms = Vec::new();
    let mut subject = None;

    for reference in &period.elements {
        let Some((kind, element)) = index.resolve_stateful(reference) else {
            continue;
        };
        match kind {
            ElementKind::Group => groups.push(element),
            ElementKind::Teacher => teachers.push(element),
            ElementKind::Room => rooms.push(element),
            ElementKind::Subject => subject = Some(element),
        }
    }

    let state = derive_state(period.cell_state, &teachers, &rooms, subject.as_ref());

    let reschedule = period
        .reschedule_info
        .as_ref()
        .map(|info| {
            Ok::<_, crate::error::UntisyncError>(Reschedule {
                is_source: info.is_source,
                other_from: combine_date_time(info.date, info.start_time)?,
                other_to: combine_date_time(info.date, info.end_time)?,
            })
        })
        .transpose()?;

    Ok(Lesson {
        id: period.id,
        note: non_empty(&period.lesson_text),
        text: non_empty(&period.period_text),
        info: non_empty(&period.period_info),
        substitution_text: non_empty(&period.subst_text),
        from: combine_date_time(period.date, period.start_time)?,
        to: combine_date_time(period.date, period.end_time)?,
        groups,
        subject,
        teachers,
        rooms,
        state,
        is_event: period.is.event,
        exam: period.exam.as_ref().map(|exam| LessonExam {
            name: exam.name.clone(),
            mark_schema_id: exam.mark_schema_id,
        }),
        is_rescheduled: period.reschedule_info.is_some(),
        reschedule,
        duration: 1,
        break_ms: None,
    })
}

/// Refine the server-reported cell state using the elements' substitution
/// marks. The rules run in order and the last match wins.
fn derive_state(
    cell_state: LessonState,
    teachers: &[StatefulElement],
    rooms: &[StatefulElement],
    subject: Option<&StatefulElement>,
) -> LessonState {
    let mut state = cell_state;

    if teachers.iter().any(StatefulElement::is_substituted) {
        state = LessonState::TeacherSubstituted;
    }
    if rooms.iter().any(StatefulElement::is_substituted) {
        state = LessonState::RoomSubstituted;
    }
    if subject.is_some_and(StatefulElement::is_substituted) {
        state = LessonState::Substituted;
    }

    state
}

/// Strip empty wire strings to `None`.
fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

pub fn transform_exams(raw: &[RawExam]) -> UntisyncResult<Vec<Exam>> {
    raw.iter()
        .map(|exam| {
            Ok(Exam {
                name: exam.name.clone(),
                kind: exam.exam_type.clone(),
                from: combine_date_time(exam.exam_date, exam.start_time)?,
                to: combine_date_time(exam.exam_date, exam.end_time)?,
                subject: exam.subject.clone(),
                teacher_names: exam.teachers.clone(),
                room_names: exam.rooms.clone(),
            })
        })
        .collect()
}

pub fn transform_grades(raw: &[RawGrade]) -> UntisyncResult<Vec<Grade>> {
    raw.iter()
        .map(|grade| {
            let body = &grade.grade;
            Ok(Grade {
                subject: grade.subject.clone(),
                date: parse_date_number(body.date)?,
                last_updated: body.last_update,
                text: body.text.clone(),
                schema_id: body.mark_schema_id,
                mark: Mark {
                    id: body.mark.id,
                    name: body.mark.name.clone(),
                    display_value: body.mark.mark_display_value,
                },
                exam_type: ExamType {
                    name: body.exam_type.name.clone(),
                    long_name: body.exam_type.longname.clone(),
                },
                exam: body
                    .exam
                    .as_ref()
                    .map(|exam| {
                        Ok::<_, UntisyncError>(GradeExam {
                            id: exam.id,
                            name: exam.name.clone(),
                            date: parse_date_number(exam.date)?,
                        })
                    })
                    .transpose()?,
            })
        })
        .collect()
}

pub fn transform_absences(raw: &[RawAbsence]) -> UntisyncResult<Vec<Absence>> {
    raw.iter()
        .map(|absence| {
            Ok(Absence {
                from: combine_date_time(absence.start_date, absence.start_time)?,
                to: combine_date_time(absence.end_date, absence.end_time)?,
                created_by: absence.created_user.clone(),
                reason_id: absence.reason_id,
                is_excused: absence.is_excused,
                excused_by: absence
                    .excuse
                    .as_ref()
                    .map(|excuse| excuse.username.clone())
                    .filter(|name| !name.is_empty()),
            })
        })
        .collect()
}

/// School year date ranges arrive as ISO `YYYY-MM-DD` strings, unlike the
/// date numbers used everywhere else.
pub fn transform_school_years(raw: &[RawSchoolYear]) -> UntisyncResult<Vec<SchoolYear>> {
    let parse = |value: &str| {
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map_err(|_| UntisyncError::InvalidDateTime(format!("bad date string {value:?}")))
    };

    raw.iter()
        .map(|year| {
            Ok(SchoolYear {
                id: year.id,
                name: year.name.clone(),
                from: parse(&year.date_range.start)?,
                to: parse(&year.date_range.end)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ElementRef, ElementState, RawElement};
    use crate::raw::PeriodFlags;
    use chrono::NaiveDate;
    use std::collections::HashMap;

    fn element(state: ElementState, substituted: bool) -> StatefulElement {
        StatefulElement {
            id: 1,
            name: Some("X".into()),
            long_name: None,
            capacity: None,
            state,
            original: substituted.then(|| crate::element::Element {
                id: 2,
                name: Some("Y".into()),
                long_name: None,
                capacity: None,
            }),
        }
    }

    #[test]
    fn room_substitution_overrides_teacher_substitution() {
        let teacher = [element(ElementState::Substituted, true)];
        let room = [element(ElementState::Substituted, true)];

        let state = derive_state(LessonState::Normal, &teacher, &room, None);
        assert_eq!(state, LessonState::RoomSubstituted);
    }

    #[test]
    fn subject_substitution_overrides_room_substitution() {
        let teacher = [element(ElementState::Substituted, true)];
        let room = [element(ElementState::Substituted, true)];
        let subject = element(ElementState::Substituted, true);

        let state = derive_state(LessonState::Normal, &teacher, &room, Some(&subject));
        assert_eq!(state, LessonState::Substituted);
    }

    #[test]
    fn subject_substitution_masks_teacher_substitution() {
        let teacher = [element(ElementState::Substituted, true)];
        let subject = element(ElementState::Substituted, true);

        let state = derive_state(LessonState::Normal, &teacher, &[], Some(&subject));
        assert_eq!(state, LessonState::Substituted);
    }

    #[test]
    fn teacher_substitution_alone() {
        let teacher = [element(ElementState::Substituted, true)];
        let subject = element(ElementState::Regular, false);

        let state = derive_state(LessonState::Normal, &teacher, &[], Some(&subject));
        assert_eq!(state, LessonState::TeacherSubstituted);
    }

    #[test]
    fn no_substitution_keeps_cell_state() {
        let teacher = [element(ElementState::Regular, false)];
        let state = derive_state(LessonState::Canceled, &teacher, &[], None);
        assert_eq!(state, LessonState::Canceled);
    }

    fn period(id: i64, date: u32, start: u32, end: u32) -> RawPeriod {
        RawPeriod {
            id,
            lesson_text: String::new(),
            period_text: String::new(),
            period_info: String::new(),
            subst_text: String::new(),
            date,
            start_time: start,
            end_time: end,
            elements: vec![ElementRef {
                kind: 3,
                id: 7,
                org_id: 0,
                state: ElementState::Regular,
            }],
            cell_state: LessonState::Normal,
            is: PeriodFlags::default(),
            exam: None,
            reschedule_info: None,
        }
    }

    fn payload(periods: Vec<RawPeriod>) -> TimetablePayload {
        let roster = vec![RawElement {
            kind: 3,
            id: 7,
            name: "MA".into(),
            long_name: Some("Maths".into()),
            room_capacity: None,
        }];
        let mut element_periods = HashMap::new();
        element_periods.insert("42".to_string(), periods);
        TimetablePayload {
            elements: roster,
            element_periods,
        }
    }

    #[test]
    fn groups_sorts_and_merges_per_day() {
        // Out of order on purpose; second day separate.
        let payload = payload(vec![
            period(2, 20220915, 855, 945),
            period(1, 20220915, 800, 850),
            period(3, 20220916, 800, 850),
        ]);

        let week = transform_timetable(&payload, 42, &Config::default()).unwrap();
        assert_eq!(week.len(), 2);

        let thursday = &week[&NaiveDate::from_ymd_opt(2022, 9, 15).unwrap()];
        assert_eq!(thursday.len(), 1);
        assert_eq!(thursday[0].duration, 2);
        assert_eq!(thursday[0].break_ms, Some(5 * 60_000));

        let friday = &week[&NaiveDate::from_ymd_opt(2022, 9, 16).unwrap()];
        assert_eq!(friday.len(), 1);
        assert_eq!(friday[0].subject_name(), Some("MA"));
    }

    #[test]
    fn reschedule_block_marks_lesson_rescheduled() {
        let mut moved = period(1, 20220915, 800, 850);
        moved.reschedule_info = Some(crate::raw::RawReschedule {
            date: 20220916,
            start_time: 1000,
            end_time: 1050,
            is_source: false,
        });

        let week = transform_timetable(&payload(vec![moved]), 42, &Config::default()).unwrap();
        let lesson = &week[&NaiveDate::from_ymd_opt(2022, 9, 15).unwrap()][0];

        // The target slot carries no shift flag, only the reschedule block.
        assert!(lesson.is_rescheduled);
        assert_eq!(lesson.reschedule.as_ref().map(|r| r.is_source), Some(false));
    }

    #[test]
    fn note_comes_from_lesson_text_and_text_from_period_text() {
        let mut raw = period(1, 20220915, 800, 850);
        raw.lesson_text = "homework due".to_string();
        raw.period_text = "moved up".to_string();

        let week = transform_timetable(&payload(vec![raw]), 42, &Config::default()).unwrap();
        let lesson = &week[&NaiveDate::from_ymd_opt(2022, 9, 15).unwrap()][0];

        assert_eq!(lesson.note.as_deref(), Some("homework due"));
        assert_eq!(lesson.text.as_deref(), Some("moved up"));
    }

    #[test]
    fn missing_element_key_yields_empty_week() {
        let payload = payload(vec![]);
        let week = transform_timetable(&payload, 999, &Config::default()).unwrap();
        assert!(week.is_empty());
    }

    #[test]
    fn school_year_dates_parse_from_iso_strings() {
        let raw = vec![RawSchoolYear {
            id: 3,
            name: "2022/23".into(),
            date_range: crate::raw::RawDateRange {
                start: "2022-09-05".into(),
                end: "2023-07-07".into(),
            },
        }];

        let years = transform_school_years(&raw).unwrap();
        assert_eq!(years[0].from, NaiveDate::from_ymd_opt(2022, 9, 5).unwrap());
        assert_eq!(years[0].to, NaiveDate::from_ymd_opt(2023, 7, 7).unwrap());

        let bad = vec![RawSchoolYear {
            id: 3,
            name: "2022/23".into(),
            date_range: crate::raw::RawDateRange {
                start: "20220905".into(),
                end: "2023-07-07".into(),
            },
        }];
        assert!(transform_school_years(&bad).is_err());
    }
}
