use indicatif::{ProgressBar, ProgressStyle};

pub fn create_spinner(message: impl Into<String>) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&["-", "\\", "|", "/"])
            .template("{spinner} {msg}")
            .unwrap(),
    );
    spinner.set_message(message.into());
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    spinner
}

/// Parse the `--views` arguments, defaulting to all views.
pub fn parse_views(names: &[String]) -> anyhow::Result<Vec<View>> {
    if names.is_empty() {
        return Ok(vec![
            View::Lessons,
            View::Exams,
            View::Grades,
            View::Absences,
        ]);
    }

    names
        .iter()
        .map(|name| match name.as_str() {
            "lessons" => Ok(View::Lessons),
            "preview" => Ok(View::Preview),
            "exams" => Ok(View::Exams),
            "grades" => Ok(View::Grades),
            "absences" => Ok(View::Absences),
            other => Err(anyhow::anyhow!(
                "unknown view {other:?} (expected lessons, preview, exams, grades or absences)"
            )),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Lessons,
    /// A compact preview of the next day's lessons.
    Preview,
    Exams,
    Grades,
    Absences,
}

impl View {
    pub fn selection(views: &[View]) -> untisync_core::sync::TopicSelection {
        untisync_core::sync::TopicSelection {
            lessons: views.contains(&View::Lessons) || views.contains(&View::Preview),
            exams: views.contains(&View::Exams),
            grades: views.contains(&View::Grades),
            absences: views.contains(&View::Absences),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_views_select_everything() {
        let views = parse_views(&[]).unwrap();
        let selection = View::selection(&views);
        assert!(selection.lessons && selection.exams && selection.grades && selection.absences);
    }

    #[test]
    fn preview_needs_the_timetable() {
        let views = parse_views(&["preview".to_string()]).unwrap();
        let selection = View::selection(&views);
        assert!(selection.lessons);
        assert!(!selection.exams);
    }

    #[test]
    fn unknown_view_is_an_error() {
        assert!(parse_views(&["marks".to_string()]).is_err());
    }
}
