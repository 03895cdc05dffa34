use anyhow::Result;
use chrono::Local;
use untisync_core::cache::CacheStore;
use untisync_core::config::Config;
use untisync_core::sync::run_sync;

use crate::render;
use crate::utils::{create_spinner, parse_views, View};

pub async fn run(views: &[String]) -> Result<()> {
    let views = parse_views(views)?;
    let config = Config::load()?;
    let store = CacheStore::open()?;

    let spinner = create_spinner("Fetching...");
    let outcome = run_sync(&store, &config, View::selection(&views), Local::now()).await?;
    spinner.finish_and_clear();

    let mut first = true;
    for view in &views {
        if !first {
            println!();
        }
        first = false;

        match view {
            View::Lessons => {
                if let Some(timetable) = &outcome.timetable {
                    render::render_lessons(timetable, &config);
                }
            }
            View::Preview => {
                if let Some(timetable) = &outcome.timetable {
                    if let Some(day) = timetable.next_day {
                        render::render_preview(day, timetable.next_day_lessons(), &config);
                    }
                }
            }
            View::Exams => {
                if let Some(exams) = &outcome.exams {
                    render::render_exams(exams, &config);
                }
            }
            View::Grades => {
                if let Some(grades) = &outcome.grades {
                    render::render_grades(grades, &config);
                }
            }
            View::Absences => {
                if let Some(absences) = &outcome.absences {
                    render::render_absences(absences, &config);
                }
            }
        }
    }

    Ok(())
}
