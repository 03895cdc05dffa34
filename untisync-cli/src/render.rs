//! Terminal rendering for the synced views, colored with owo_colors.

use chrono::{NaiveDate, TimeDelta};
use owo_colors::OwoColorize;
use untisync_core::config::Config;
use untisync_core::lesson::{Absence, Exam, Grade, Lesson, LessonState};
use untisync_core::merge::{combine_lessons, MergeOptions};
use untisync_core::sync::Timetable;

fn format_gap(gap: TimeDelta) -> String {
    let minutes = gap.num_minutes();
    if minutes >= 60 {
        format!("{}h {:02}m", minutes / 60, minutes % 60)
    } else {
        format!("{minutes}m")
    }
}

fn state_tag(state: LessonState) -> Option<String> {
    match state {
        LessonState::Canceled => Some("canceled".red().to_string()),
        LessonState::Free => Some("free".dimmed().to_string()),
        LessonState::TeacherSubstituted => Some("substitute teacher".yellow().to_string()),
        LessonState::RoomSubstituted => Some("room change".yellow().to_string()),
        LessonState::Substituted => Some("substituted".yellow().to_string()),
        LessonState::Rescheduled => Some("moved".yellow().to_string()),
        LessonState::Exam => Some("exam".magenta().to_string()),
        LessonState::Additional => Some("additional".green().to_string()),
        LessonState::Normal => None,
    }
}

fn render_lesson_line(lesson: &Lesson, config: &Config) -> String {
    let show_end = config.views.lessons.show_end_times;
    let time = if show_end {
        format!(
            "{} - {}",
            lesson.from.format("%H:%M"),
            lesson.to.format("%H:%M")
        )
    } else {
        lesson.from.format("%H:%M").to_string()
    };

    let title = lesson.subject_title(false);
    let mut line = if lesson.state == LessonState::Canceled {
        format!("  {} {}", time.dimmed(), title.red().strikethrough())
    } else {
        format!("  {} {}", time.dimmed(), title.bold())
    };

    if let Some(tag) = state_tag(lesson.state) {
        line.push_str(&format!(" [{tag}]"));
    }
    if let Some(teacher) = lesson.teachers.first().and_then(|t| t.name.as_deref()) {
        line.push_str(&format!(" {}", teacher.dimmed()));
    }
    if let Some(room) = lesson.rooms.first().and_then(|r| r.name.as_deref()) {
        line.push_str(&format!(" {}", room.dimmed()));
    }
    if let Some(info) = lesson.info.as_deref() {
        line.push_str(&format!("  {}", info.italic()));
    }

    line
}

/// The main day view: today's remaining lessons, falling back to the next
/// day with lessons. Long breaks get their own row.
pub fn render_lessons(timetable: &Timetable, config: &Config) {
    let (day_label, lessons): (String, &[Lesson]) = if !timetable.today_remaining.is_empty() {
        ("Today".to_string(), &timetable.today_remaining)
    } else {
        match timetable.next_day {
            Some(day) => (day.format("%A %d.%m.").to_string(), timetable.next_day_lessons()),
            None => ("Today".to_string(), &[]),
        }
    };

    println!("{}", day_label.bold().underline());

    if lessons.is_empty() {
        println!("  {}", "No lessons.".dimmed());
        return;
    }

    let break_max = TimeDelta::minutes(i64::from(config.break_max_minutes));
    let max_count = config.views.lessons.max_count;
    let mut previous_end = None;

    for lesson in lessons.iter().take(max_count) {
        if !config.views.lessons.show_canceled && lesson.state == LessonState::Canceled {
            continue;
        }

        if config.views.lessons.show_long_breaks {
            if let Some(previous_end) = previous_end {
                let gap = lesson.from - previous_end;
                if gap > break_max {
                    println!("  {}", format!("· {} break ·", format_gap(gap)).dimmed());
                }
            }
        }

        println!("{}", render_lesson_line(lesson, config));
        previous_end = Some(lesson.to);
    }
}

/// A compact one-line-per-block preview of a day, merging aggressively.
pub fn render_preview(day: NaiveDate, lessons: &[Lesson], config: &Config) {
    println!("{}", day.format("%A %d.%m.").to_string().bold().underline());

    if lessons.is_empty() {
        println!("  {}", "No lessons.".dimmed());
        return;
    }

    let merged = combine_lessons(
        lessons,
        config,
        MergeOptions {
            ignore_details: true,
            ignore_breaks: true,
        },
    );

    for block in &merged {
        let mut line = format!(
            "  {} {}",
            block.from.format("%H:%M").dimmed(),
            block.subject_title(false).bold()
        );
        if block.duration > 1 {
            line.push_str(&format!(" {}", format!("x{}", block.duration).dimmed()));
        }
        println!("{line}");
    }
}

pub fn render_exams(exams: &[Exam], config: &Config) {
    println!("{}", "Exams".bold().underline());

    if exams.is_empty() {
        println!("  {}", "No upcoming exams.".dimmed());
        return;
    }

    for exam in exams.iter().take(config.views.exams.max_count) {
        println!(
            "  {} {} {} {}",
            exam.from.format("%d.%m.").to_string().dimmed(),
            exam.subject.bold(),
            exam.name,
            format!("({})", exam.kind).dimmed()
        );
    }
}

pub fn render_grades(grades: &[Grade], config: &Config) {
    println!("{}", "Grades".bold().underline());

    if grades.is_empty() {
        println!("  {}", "No recent grades.".dimmed());
        return;
    }

    for grade in grades.iter().take(config.views.grades.max_count) {
        println!(
            "  {} {} {} {}",
            grade.date.format("%d.%m.").to_string().dimmed(),
            grade.subject.bold(),
            grade.mark.name.green(),
            format!("({})", grade.exam_type.name).dimmed()
        );
    }
}

pub fn render_absences(absences: &[Absence], config: &Config) {
    println!("{}", "Absences".bold().underline());

    if absences.is_empty() {
        println!("  {}", "No absences.".dimmed());
        return;
    }

    for absence in absences.iter().take(config.views.absences.max_count) {
        let status = if absence.is_excused {
            "excused".green().to_string()
        } else {
            "not excused".red().to_string()
        };
        println!(
            "  {} {} - {} [{status}]",
            absence.from.format("%d.%m.").to_string().dimmed(),
            absence.from.format("%H:%M"),
            absence.to.format("%H:%M"),
        );
    }
}
