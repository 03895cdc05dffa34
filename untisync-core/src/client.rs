//! HTTP client for the WebUntis API.
//!
//! Login is a three-step dance: a form POST that yields session cookies, a
//! cookie-authenticated token request that yields a bearer token, and an
//! app-data request that resolves the numeric user id. The data endpoints
//! want both the cookies and the bearer token.
//!
//! Fetchers return the relevant payload subtree re-serialized to a string,
//! which is what gets cached and compared between syncs.

use chrono::NaiveDate;
use reqwest::header::{AUTHORIZATION, COOKIE, SET_COOKIE};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{UntisyncError, UntisyncResult};
use crate::session::{Credentials, User};

/// An authenticated session: the resolved user plus the tokens the data
/// endpoints want. Cached under the `user` topic so repeated syncs skip
/// the login dance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user: User,
    pub cookies: String,
    pub token: String,
}

pub struct UntisClient {
    http: reqwest::Client,
    base_url: String,
    cookies: String,
    token: String,
}

fn date_number(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

impl UntisClient {
    /// Log in with the given credentials and return a ready client plus
    /// the session it established.
    pub async fn login(credentials: &Credentials) -> UntisyncResult<(UntisClient, Session)> {
        let http = reqwest::Client::new();
        let base_url = format!("https://{}/WebUntis", credentials.server);

        let cookies = fetch_cookies(&http, &base_url, credentials).await?;
        let token = fetch_token(&http, &base_url, &cookies).await?;

        let client = UntisClient {
            http,
            base_url,
            cookies,
            token,
        };
        let user = client.fetch_user().await?;
        let session = Session {
            user,
            cookies: client.cookies.clone(),
            token: client.token.clone(),
        };

        Ok((client, session))
    }

    /// Rebuild a client from a cached session without logging in again.
    pub fn resume(server: &str, session: &Session) -> UntisClient {
        UntisClient {
            http: reqwest::Client::new(),
            base_url: format!("https://{server}/WebUntis"),
            cookies: session.cookies.clone(),
            token: session.token.clone(),
        }
    }

    async fn get(&self, url: &str) -> UntisyncResult<Value> {
        let response = self
            .http
            .get(url)
            .header(COOKIE, &self.cookies)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }

    async fn fetch_user(&self) -> UntisyncResult<User> {
        let url = format!("{}/api/rest/view/v1/app/data", self.base_url);
        let json = self.get(&url).await?;

        let person = &json["user"]["person"];
        let id = person["id"]
            .as_i64()
            .ok_or_else(|| UntisyncError::Api("app data response carried no user id".into()))?;
        let display_name = person["displayName"].as_str().unwrap_or_default().to_string();

        Ok(User { id, display_name })
    }

    /// Fetch the weekly timetable containing `date` for the given student.
    pub async fn fetch_timetable(&self, user_id: i64, date: NaiveDate) -> UntisyncResult<String> {
        let url = format!(
            "{}/api/public/timetable/weekly/data?elementType=5&elementId={}&date={}&formatId=2",
            self.base_url,
            user_id,
            date.format("%Y-%m-%d")
        );
        let json = self.get(&url).await?;

        extract(&json, &["data", "result", "data"], "timetable")
    }

    pub async fn fetch_exams(
        &self,
        user_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> UntisyncResult<String> {
        let url = format!(
            "{}/api/exams?studentId={}&klasseId=-1&startDate={}&endDate={}",
            self.base_url,
            user_id,
            date_number(from),
            date_number(to)
        );
        let json = self.get(&url).await?;

        extract(&json, &["data", "exams"], "exams")
    }

    pub async fn fetch_grades(
        &self,
        user_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> UntisyncResult<String> {
        let url = format!(
            "{}/api/classreg/grade/gradeList?personId={}&startDate={}&endDate={}",
            self.base_url,
            user_id,
            date_number(from),
            date_number(to)
        );
        let json = self.get(&url).await?;

        extract(&json, &["data"], "grades")
    }

    pub async fn fetch_absences(
        &self,
        user_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> UntisyncResult<String> {
        let url = format!(
            "{}/api/classreg/absences/students?studentId={}&startDate={}&endDate={}\
             &excuseStatusId=-3&includeTodaysAbsence=true",
            self.base_url,
            user_id,
            date_number(from),
            date_number(to)
        );
        let json = self.get(&url).await?;

        extract(&json, &["data", "absences"], "absences")
    }

    pub async fn fetch_school_years(&self) -> UntisyncResult<String> {
        let url = format!("{}/api/rest/view/v1/schoolyears", self.base_url);
        let json = self.get(&url).await?;

        extract(&json, &[], "school years")
    }
}

async fn fetch_cookies(
    http: &reqwest::Client,
    base_url: &str,
    credentials: &Credentials,
) -> UntisyncResult<String> {
    let response = http
        .post(format!("{base_url}/j_spring_security_check"))
        .form(&[
            ("school", credentials.school.as_str()),
            ("j_username", credentials.username.as_str()),
            ("j_password", credentials.password.as_str()),
            ("token", ""),
        ])
        .send()
        .await?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(UntisyncError::Login(format!(
            "school {} not found on this server",
            credentials.school
        )));
    }

    let cookies: Vec<String> = response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .map(str::to_string)
        .collect();

    if cookies.is_empty() {
        return Err(UntisyncError::Login("server returned no session cookies".into()));
    }

    Ok(cookies.join(";"))
}

async fn fetch_token(
    http: &reqwest::Client,
    base_url: &str,
    cookies: &str,
) -> UntisyncResult<String> {
    let token = http
        .get(format!("{base_url}/api/token/new"))
        .header(COOKIE, cookies)
        .send()
        .await?
        .text()
        .await?;

    // A failed login still answers 200, but with an error page instead of
    // the raw token.
    if token.is_empty() || token.contains("loginError") {
        return Err(UntisyncError::Login("wrong username or password".into()));
    }

    Ok(token)
}

/// Walk into the response at `path` and re-serialize the subtree.
fn extract(json: &Value, path: &[&str], what: &str) -> UntisyncResult<String> {
    let mut current = json;
    for key in path {
        current = current
            .get(key)
            .ok_or_else(|| UntisyncError::Api(format!("{what} response missing field {key:?}")))?;
    }
    Ok(serde_json::to_string(current)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_walks_nested_payloads() {
        let json: Value =
            serde_json::from_str(r#"{"data":{"result":{"data":{"elements":[]}}}}"#).unwrap();

        let payload = extract(&json, &["data", "result", "data"], "timetable").unwrap();
        assert_eq!(payload, r#"{"elements":[]}"#);

        let err = extract(&json, &["data", "exams"], "exams").unwrap_err();
        assert!(matches!(err, UntisyncError::Api(_)));
    }
}
