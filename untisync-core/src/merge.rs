//! Merging of consecutive periods into lesson blocks.
//!
//! Schools split a double or triple lesson into back-to-back periods on the
//! wire. The merger folds a day's time-ordered lessons into blocks,
//! absorbing short gaps into `break_ms` and bumping `duration` per merged
//! period. Running it again over its own output changes nothing.

use crate::config::Config;
use crate::element::StatefulElement;
use crate::lesson::Lesson;

/// Controls how strictly two adjacent lessons must match to merge.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeOptions {
    /// Merge on subject alone, ignoring state and detail differences.
    /// Used by compact previews.
    pub ignore_details: bool,
    /// Treat any gap as absorbable regardless of its length.
    pub ignore_breaks: bool,
}

/// Fold a day's time-ordered lessons into merged blocks.
pub fn combine_lessons(lessons: &[Lesson], config: &Config, options: MergeOptions) -> Vec<Lesson> {
    let break_min_ms = i64::from(config.break_min_minutes) * 60_000;

    let mut combined: Vec<Lesson> = Vec::with_capacity(lessons.len());
    for lesson in lessons {
        let Some(current) = combined.last_mut() else {
            combined.push(lesson.clone());
            continue;
        };

        let gap_ms = (lesson.from - current.to).num_milliseconds();
        let gap_ok = options.ignore_breaks || gap_ms <= break_min_ms;

        if gap_ok && should_combine(current, lesson, options) {
            current.to = lesson.to;
            current.duration += lesson.duration;
            let total = current.break_ms.get_or_insert(0);
            if gap_ms > 0 {
                *total += gap_ms;
            }
            *total += lesson.break_ms.unwrap_or(0);
        } else {
            combined.push(lesson.clone());
        }
    }

    combined
}

fn should_combine(current: &Lesson, next: &Lesson, options: MergeOptions) -> bool {
    if current.subject_name() != next.subject_name() {
        return false;
    }
    if options.ignore_details {
        return true;
    }
    current.state == next.state && details_eq(current, next)
}

/// Equality over everything except the fields that merging itself changes
/// (`from`, `to`, `duration`, `break_ms`) and the period id.
fn details_eq(a: &Lesson, b: &Lesson) -> bool {
    a.note == b.note
        && a.text == b.text
        && a.info == b.info
        && a.substitution_text == b.substitution_text
        && elements_eq(&a.groups, &b.groups)
        && a.subject == b.subject
        && elements_eq(&a.teachers, &b.teachers)
        && elements_eq(&a.rooms, &b.rooms)
        && a.is_event == b.is_event
        && a.exam == b.exam
        && a.is_rescheduled == b.is_rescheduled
        && a.reschedule == b.reschedule
}

fn elements_eq(a: &[StatefulElement], b: &[StatefulElement]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x == y)
}
