//! Sync orchestration: cache freshness, topic fetching and refresh
//! planning.
//!
//! Every topic goes through [`cached_or_fetch`]: serve the cached value
//! while it is fresh, otherwise fetch, diff against the cached value and
//! overwrite it. All requested topics are fetched concurrently and the
//! sync fails as a whole if any of them does.

use std::future::Future;
use std::sync::Mutex;

use chrono::{DateTime, Days, Local, NaiveDate, NaiveDateTime, TimeDelta};
use serde::de::DeserializeOwned;

use crate::cache::CacheStore;
use crate::client::{Session, UntisClient};
use crate::config::{hours_to_delta, Config};
use crate::diff::{compare_absences, compare_exams, compare_grades, compare_lessons, ChangeEvent};
use crate::error::{UntisyncError, UntisyncResult};
use crate::lesson::{Absence, Exam, Grade, Lesson, LessonWeek, SchoolYear};
use crate::raw::{RawAbsence, RawExam, RawGrade, RawSchoolYear, TimetablePayload};
use crate::session::Credentials;
use crate::transform::{
    transform_absences, transform_exams, transform_grades, transform_school_years,
    transform_timetable,
};

// ============================================================================
// Topics
// ============================================================================

/// Everything the engine caches, one file per topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    User,
    Lessons,
    /// The next week's timetable, fetched when today is the last (or not a)
    /// day of the current week.
    LessonsNext,
    Exams,
    Grades,
    Absences,
    SchoolYears,
}

impl Topic {
    pub fn cache_key(&self) -> &'static str {
        match self {
            Topic::User => "user",
            Topic::Lessons => "lessons",
            Topic::LessonsNext => "lessons_next",
            Topic::Exams => "exams",
            Topic::Grades => "grades",
            Topic::Absences => "absences",
            Topic::SchoolYears => "school_years",
        }
    }

    pub fn max_age(&self, config: &Config) -> TimeDelta {
        let hours = &config.cache_hours;
        let hours = match self {
            Topic::User => hours.user,
            Topic::Lessons | Topic::LessonsNext => hours.lessons,
            Topic::Exams => hours.exams,
            Topic::Grades => hours.grades,
            Topic::Absences => hours.absences,
            Topic::SchoolYears => hours.school_years,
        };
        hours_to_delta(hours)
    }

    /// Whether changes to this topic may notify. The next week's lessons
    /// never do; they will be diffed once they become the current week.
    pub fn notifications_enabled(&self, config: &Config) -> bool {
        match self {
            Topic::Lessons => config.notifications.lessons,
            Topic::Exams => config.notifications.exams,
            Topic::Grades => config.notifications.grades,
            Topic::Absences => config.notifications.absences,
            Topic::User | Topic::LessonsNext | Topic::SchoolYears => false,
        }
    }
}

// ============================================================================
// Cache-or-fetch
// ============================================================================

/// A cached entry is fresh while it is younger than the topic's max age
/// and was written on the same calendar day. The day check forces a
/// refetch on the first sync of a new day no matter how generous the max
/// age is.
fn is_fresh(modified_at: DateTime<Local>, now: DateTime<Local>, max_age: TimeDelta) -> bool {
    now - modified_at <= max_age && modified_at.date_naive() == now.date_naive()
}

/// Serve a topic from cache while fresh, otherwise fetch it, diff it
/// against the cached value and replace the cache.
///
/// `fetch` returns the new value serialized; identical bytes mean no diff
/// is run. A cached value that no longer deserializes is treated as a
/// plain miss.
pub async fn cached_or_fetch<T, F, Fut, C>(
    store: &CacheStore,
    topic: Topic,
    config: &Config,
    now: DateTime<Local>,
    fetch: F,
    compare: Option<C>,
) -> UntisyncResult<(T, Vec<ChangeEvent>)>
where
    T: DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = UntisyncResult<String>>,
    C: FnOnce(&T, &T) -> Vec<ChangeEvent>,
{
    let key = topic.cache_key();
    let cached = store.read(key);

    if let Some(entry) = &cached {
        if is_fresh(entry.modified_at.with_timezone(&Local), now, topic.max_age(config)) {
            if let Ok(value) = serde_json::from_str(&entry.payload) {
                return Ok((value, Vec::new()));
            }
            eprintln!("warning: cached {key} no longer deserializes, refetching");
        }
    }

    let payload = fetch().await?;
    let value: T = serde_json::from_str(&payload)?;

    let mut events = Vec::new();
    if topic.notifications_enabled(config) {
        if let (Some(entry), Some(compare)) = (&cached, compare) {
            if entry.payload != payload {
                if let Ok(old) = serde_json::from_str::<T>(&entry.payload) {
                    events = compare(&old, &value);
                }
            }
        }
    }

    store.write(key, &payload)?;

    Ok((value, events))
}

// ============================================================================
// Refresh planning
// ============================================================================

/// Collects refresh proposals from concurrent topic fetches and keeps the
/// earliest one.
#[derive(Default)]
pub struct RefreshPlanner {
    next: Mutex<Option<DateTime<Local>>>,
}

impl RefreshPlanner {
    pub fn new() -> RefreshPlanner {
        RefreshPlanner::default()
    }

    pub fn propose(&self, candidate: DateTime<Local>) {
        let mut next = self.next.lock().unwrap_or_else(|e| e.into_inner());
        match *next {
            Some(current) if current <= candidate => {}
            _ => *next = Some(candidate),
        }
    }

    pub fn next(&self) -> Option<DateTime<Local>> {
        *self.next.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// When the timetable content itself suggests the next sync: the start of
/// the upcoming lesson, the end of the running one when a long break
/// follows, or a polling interval when the day is over.
pub fn refresh_for_lessons(
    today_remaining: &[Lesson],
    next_day: &[Lesson],
    now: NaiveDateTime,
    config: &Config,
) -> NaiveDateTime {
    if let Some(first) = today_remaining.first() {
        if first.from > now {
            return first.from;
        }
        if let Some(second) = today_remaining.get(1) {
            let break_ms = (second.from - first.to).num_milliseconds();
            if break_ms < i64::from(config.break_max_minutes) * 60_000 {
                return second.from;
            }
        }
        return first.to;
    }

    let lazy = match next_day.first() {
        Some(first) => {
            let until = first.from - now;
            until > TimeDelta::hours(i64::from(config.refreshing.normal_scope_hours))
        }
        None => true,
    };

    let minutes = if lazy {
        config.refreshing.lazy_interval_minutes
    } else {
        config.refreshing.normal_interval_minutes
    };
    now + TimeDelta::minutes(i64::from(minutes))
}

// ============================================================================
// Topic getters
// ============================================================================

/// The merged timetable view a sync produces.
#[derive(Debug, Clone)]
pub struct Timetable {
    pub week: LessonWeek,
    /// Today's lessons that have not ended yet.
    pub today_remaining: Vec<Lesson>,
    /// The next day that has lessons, skipping weekends.
    pub next_day: Option<NaiveDate>,
}

impl Timetable {
    pub fn next_day_lessons(&self) -> &[Lesson] {
        self.next_day
            .and_then(|day| self.week.get(&day))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

async fn get_lessons_for(
    client: &UntisClient,
    store: &CacheStore,
    config: &Config,
    user_id: i64,
    date: NaiveDate,
    topic: Topic,
    now: DateTime<Local>,
) -> UntisyncResult<(LessonWeek, Vec<ChangeEvent>)> {
    cached_or_fetch(
        store,
        topic,
        config,
        now,
        || async {
            let raw = client.fetch_timetable(user_id, date).await?;
            let payload: TimetablePayload = serde_json::from_str(&raw)?;
            let week = transform_timetable(&payload, user_id, config)?;
            Ok(serde_json::to_string(&week)?)
        },
        Some(compare_lessons),
    )
    .await
}

/// Fetch the current week and, when today is the last day with lessons in
/// it, the next week too.
pub async fn get_timetable(
    client: &UntisClient,
    store: &CacheStore,
    config: &Config,
    user_id: i64,
    now: DateTime<Local>,
) -> UntisyncResult<(Timetable, Vec<ChangeEvent>)> {
    let today = now.date_naive();
    let (mut week, events) =
        get_lessons_for(client, store, config, user_id, today, Topic::Lessons, now).await?;

    let mut next_day = week.keys().find(|day| **day > today).copied();

    if next_day.is_none() {
        let first_date = week.keys().next().copied().unwrap_or(today);
        let next_week_date = first_date
            .checked_add_days(Days::new(7))
            .ok_or_else(|| UntisyncError::InvalidDateTime("date overflow".into()))?;

        let (next_week, _) = get_lessons_for(
            client,
            store,
            config,
            user_id,
            next_week_date,
            Topic::LessonsNext,
            now,
        )
        .await?;

        next_day = next_week.keys().next().copied();
        week.extend(next_week);
    }

    let today_remaining = week
        .get(&today)
        .map(|lessons| {
            lessons
                .iter()
                .filter(|lesson| lesson.to > now.naive_local())
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    Ok((
        Timetable {
            week,
            today_remaining,
            next_day,
        },
        events,
    ))
}

pub async fn get_school_years(
    client: &UntisClient,
    store: &CacheStore,
    config: &Config,
    now: DateTime<Local>,
) -> UntisyncResult<Vec<SchoolYear>> {
    let (years, _) = cached_or_fetch(
        store,
        Topic::SchoolYears,
        config,
        now,
        || async {
            let raw = client.fetch_school_years().await?;
            let parsed: Vec<RawSchoolYear> = serde_json::from_str(&raw)?;
            Ok(serde_json::to_string(&transform_school_years(&parsed)?)?)
        },
        None::<fn(&Vec<SchoolYear>, &Vec<SchoolYear>) -> Vec<ChangeEvent>>,
    )
    .await?;

    Ok(years)
}

// ============================================================================
// Full sync
// ============================================================================

/// Which topics a sync run should cover.
#[derive(Debug, Clone, Copy, Default)]
pub struct TopicSelection {
    pub lessons: bool,
    pub exams: bool,
    pub grades: bool,
    pub absences: bool,
}

impl TopicSelection {
    pub fn all() -> TopicSelection {
        TopicSelection {
            lessons: true,
            exams: true,
            grades: true,
            absences: true,
        }
    }
}

/// Everything a sync run produced.
pub struct SyncOutcome {
    pub session: Session,
    pub timetable: Option<Timetable>,
    pub exams: Option<Vec<Exam>>,
    pub grades: Option<Vec<Grade>>,
    pub absences: Option<Vec<Absence>>,
    pub events: Vec<ChangeEvent>,
    /// Earliest point at which re-running the sync is expected to observe
    /// something new.
    pub next_refresh: Option<DateTime<Local>>,
}

/// Run one full sync: resolve the session, fetch all selected topics
/// concurrently and collect the change events. Any failing topic fails
/// the sync; the caches of the other topics are untouched by the failure.
pub async fn run_sync(
    store: &CacheStore,
    config: &Config,
    selection: TopicSelection,
    now: DateTime<Local>,
) -> UntisyncResult<SyncOutcome> {
    let credentials = Credentials::load()?;

    let (session, _) = cached_or_fetch(
        store,
        Topic::User,
        config,
        now,
        || async {
            let (_, session) = UntisClient::login(&credentials).await?;
            Ok(serde_json::to_string(&session)?)
        },
        None::<fn(&Session, &Session) -> Vec<ChangeEvent>>,
    )
    .await?;

    let client = UntisClient::resume(&credentials.server, &session);
    let user_id = session.user.id;
    let planner = RefreshPlanner::new();

    let timetable_task = async {
        if !selection.lessons {
            return Ok::<_, UntisyncError>(None);
        }
        let (timetable, events) = get_timetable(&client, store, config, user_id, now).await?;
        let refresh = refresh_for_lessons(
            &timetable.today_remaining,
            timetable.next_day_lessons(),
            now.naive_local(),
            config,
        );
        if let Some(refresh) = refresh.and_local_timezone(Local).earliest() {
            planner.propose(refresh);
        }
        Ok(Some((timetable, events)))
    };

    let exams_task = async {
        if !selection.exams {
            return Ok::<_, UntisyncError>(None);
        }
        let to = now
            .date_naive()
            .checked_add_days(Days::new(u64::from(config.views.exams.scope_days)))
            .ok_or_else(|| UntisyncError::InvalidDateTime("date overflow".into()))?;
        let (exams, events) = cached_or_fetch(
            store,
            Topic::Exams,
            config,
            now,
            || async {
                let raw = client.fetch_exams(user_id, now.date_naive(), to).await?;
                let parsed: Vec<RawExam> = serde_json::from_str(&raw)?;
                Ok(serde_json::to_string(&transform_exams(&parsed)?)?)
            },
            Some(|old: &Vec<Exam>, new: &Vec<Exam>| compare_exams(old, new)),
        )
        .await?;
        planner.propose(now + Topic::Exams.max_age(config) / 2);
        Ok(Some((exams, events)))
    };

    let grades_task = async {
        if !selection.grades {
            return Ok::<_, UntisyncError>(None);
        }
        let from = now
            .date_naive()
            .checked_sub_days(Days::new(u64::from(config.views.grades.scope_days)))
            .ok_or_else(|| UntisyncError::InvalidDateTime("date underflow".into()))?;
        let (grades, events) = cached_or_fetch(
            store,
            Topic::Grades,
            config,
            now,
            || async {
                let raw = client.fetch_grades(user_id, from, now.date_naive()).await?;
                let parsed: Vec<RawGrade> = serde_json::from_str(&raw)?;
                Ok(serde_json::to_string(&transform_grades(&parsed)?)?)
            },
            Some(|old: &Vec<Grade>, new: &Vec<Grade>| compare_grades(old, new)),
        )
        .await?;
        planner.propose(now + Topic::Grades.max_age(config) / 2);
        Ok(Some((grades, events)))
    };

    let absences_task = async {
        if !selection.absences {
            return Ok::<_, UntisyncError>(None);
        }
        let years = get_school_years(&client, store, config, now).await?;
        let today = now.date_naive();
        let from = years
            .iter()
            .find(|year| year.from <= today && year.to >= today)
            .map(|year| year.from)
            .unwrap_or(today);
        let (absences, events) = cached_or_fetch(
            store,
            Topic::Absences,
            config,
            now,
            || async {
                let raw = client.fetch_absences(user_id, from, today).await?;
                let parsed: Vec<RawAbsence> = serde_json::from_str(&raw)?;
                Ok(serde_json::to_string(&transform_absences(&parsed)?)?)
            },
            Some(|old: &Vec<Absence>, new: &Vec<Absence>| compare_absences(old, new)),
        )
        .await?;
        planner.propose(now + Topic::Absences.max_age(config) / 2);
        Ok(Some((absences, events)))
    };

    let (timetable, exams, grades, absences) =
        tokio::try_join!(timetable_task, exams_task, grades_task, absences_task)?;

    fn unpack<T>(part: Option<(T, Vec<ChangeEvent>)>, events: &mut Vec<ChangeEvent>) -> Option<T> {
        part.map(|(data, mut part_events)| {
            events.append(&mut part_events);
            data
        })
    }

    let mut events = Vec::new();
    let mut timetable = unpack(timetable, &mut events);
    let exams = unpack(exams, &mut events);
    let grades = unpack(grades, &mut events);
    let absences = unpack(absences, &mut events);

    // Overrides come last so that editing them never looks like a
    // timetable change.
    if let Some(timetable) = timetable.as_mut() {
        crate::config::apply_lesson_overrides(&mut timetable.week, config);
        crate::config::apply_lesson_overrides_all(&mut timetable.today_remaining, config);
    }

    Ok(SyncOutcome {
        session,
        timetable,
        exams,
        grades,
        absences,
        events,
        next_refresh: planner.next(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ElementState, StatefulElement};
    use crate::lesson::LessonState;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn freshness_requires_same_day_and_max_age() {
        let max_age = TimeDelta::hours(8);

        let written = local(2022, 9, 15, 10, 0);
        assert!(is_fresh(written, local(2022, 9, 15, 14, 0), max_age));
        assert!(!is_fresh(written, local(2022, 9, 15, 19, 0), max_age));

        // Within max age but past midnight: stale.
        let written = local(2022, 9, 15, 23, 0);
        assert!(!is_fresh(written, local(2022, 9, 16, 1, 0), max_age));
    }

    #[test]
    fn planner_keeps_the_earliest_proposal() {
        let planner = RefreshPlanner::new();
        assert!(planner.next().is_none());

        planner.propose(local(2022, 9, 15, 12, 0));
        planner.propose(local(2022, 9, 15, 14, 0));
        planner.propose(local(2022, 9, 15, 9, 0));

        assert_eq!(planner.next(), Some(local(2022, 9, 15, 9, 0)));
    }

    fn lesson(from: NaiveDateTime, to: NaiveDateTime) -> Lesson {
        Lesson {
            id: 1,
            note: None,
            text: None,
            info: None,
            substitution_text: None,
            from,
            to,
            groups: vec![],
            subject: Some(StatefulElement {
                id: 1,
                name: Some("MA".into()),
                long_name: None,
                capacity: None,
                state: ElementState::Regular,
                original: None,
            }),
            teachers: vec![],
            rooms: vec![],
            state: LessonState::Normal,
            is_event: false,
            exam: None,
            is_rescheduled: false,
            reschedule: None,
            duration: 1,
            break_ms: None,
        }
    }

    #[test]
    fn lesson_refresh_follows_the_day_structure() {
        let config = Config::default();
        let day = NaiveDate::from_ymd_opt(2022, 9, 15).unwrap();
        let at = |h: u32, m: u32| day.and_hms_opt(h, m, 0).unwrap();

        // Upcoming lesson: refresh at its start.
        let today = vec![lesson(at(10, 0), at(10, 50))];
        assert_eq!(refresh_for_lessons(&today, &[], at(9, 0), &config), at(10, 0));

        // Running lesson with a short break after: refresh at the next start.
        let today = vec![lesson(at(8, 0), at(8, 50)), lesson(at(9, 0), at(9, 50))];
        assert_eq!(refresh_for_lessons(&today, &[], at(8, 30), &config), at(9, 0));

        // Running lesson with a long break after: refresh at its end.
        let today = vec![lesson(at(8, 0), at(8, 50)), lesson(at(11, 0), at(11, 50))];
        assert_eq!(refresh_for_lessons(&today, &[], at(8, 30), &config), at(8, 50));

        // Day over, next lesson soon: normal polling interval.
        let tomorrow = vec![lesson(at(8, 0) + TimeDelta::days(1), at(8, 50) + TimeDelta::days(1))];
        let refresh = refresh_for_lessons(&[], &tomorrow, at(22, 0), &config);
        assert_eq!(refresh, at(22, 0) + TimeDelta::minutes(60));

        // Day over, next lesson far away: lazy polling interval.
        let refresh = refresh_for_lessons(&[], &tomorrow, at(12, 0), &config);
        assert_eq!(refresh, at(12, 0) + TimeDelta::minutes(240));
    }

    #[tokio::test]
    async fn fresh_cache_skips_the_fetch() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open_at(dir.path().to_path_buf()).unwrap();
        let config = Config::default();
        let now = Local::now();

        store.write("grades", r#"["cached"]"#).unwrap();

        let (value, events) = cached_or_fetch(
            &store,
            Topic::Grades,
            &config,
            now,
            || async { panic!("fetch must not run") },
            None::<fn(&Vec<String>, &Vec<String>) -> Vec<ChangeEvent>>,
        )
        .await
        .unwrap();

        let value: Vec<String> = value;
        assert_eq!(value, vec!["cached".to_string()]);
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn stale_cache_fetches_and_diffs() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open_at(dir.path().to_path_buf()).unwrap();
        let config = Config::default();
        let now = Local::now();

        let yesterday = now - TimeDelta::days(1);
        store
            .write_at("grades", r#"["old"]"#, yesterday.with_timezone(&chrono::Utc))
            .unwrap();

        let (value, events) = cached_or_fetch(
            &store,
            Topic::Grades,
            &config,
            now,
            || async { Ok(r#"["old","new"]"#.to_string()) },
            Some(|old: &Vec<String>, new: &Vec<String>| {
                assert_eq!(old.len(), 1);
                assert_eq!(new.len(), 2);
                vec![ChangeEvent {
                    kind: crate::diff::ChangeKind::GradeReceived,
                    title: "new".into(),
                    body: String::new(),
                }]
            }),
        )
        .await
        .unwrap();

        let value: Vec<String> = value;
        assert_eq!(value.len(), 2);
        assert_eq!(events.len(), 1);

        // The cache now holds the fetched payload.
        let entry = store.read("grades").unwrap();
        assert_eq!(entry.payload, r#"["old","new"]"#);
    }

    #[tokio::test]
    async fn unchanged_payload_skips_the_diff() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open_at(dir.path().to_path_buf()).unwrap();
        let config = Config::default();
        let now = Local::now();

        let yesterday = now - TimeDelta::days(1);
        store
            .write_at("grades", r#"["same"]"#, yesterday.with_timezone(&chrono::Utc))
            .unwrap();

        let (_, events) = cached_or_fetch(
            &store,
            Topic::Grades,
            &config,
            now,
            || async { Ok(r#"["same"]"#.to_string()) },
            Some(|_: &Vec<String>, _: &Vec<String>| -> Vec<ChangeEvent> {
                panic!("diff must not run for identical payloads")
            }),
        )
        .await
        .unwrap();

        assert!(events.is_empty());
    }
}
