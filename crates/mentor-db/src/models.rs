//! Database row types — these map directly to SQLite rows.
//! Distinct from the mentor-types domain models to keep the DB layer
//! independent; conversions live here.

use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use mentor_types::models::{
    Appointment, Course, HomeworkSubmission, Role, SignupState, User,
};

pub struct UserRow {
    pub user_id: i64,
    pub nickname: Option<String>,
    pub sign_up: String,
    pub role: i64,
}

impl UserRow {
    pub fn into_user(self) -> Result<User> {
        Ok(User {
            user_id: self.user_id,
            nickname: self.nickname,
            signup: SignupState::parse(&self.sign_up)
                .with_context(|| format!("bad sign_up value '{}'", self.sign_up))?,
            role: Role::from_i64(self.role)
                .with_context(|| format!("bad role value {}", self.role))?,
        })
    }
}

pub struct CourseRow {
    pub id: i64,
    pub name: String,
    pub owner_id: i64,
    pub registration_deadline: String,
    pub sheet_url: String,
    pub imported_at: String,
}

impl CourseRow {
    pub fn into_course(self) -> Result<Course> {
        Ok(Course {
            id: self.id,
            name: self.name,
            owner_id: self.owner_id,
            registration_deadline: NaiveDate::parse_from_str(
                &self.registration_deadline,
                "%Y-%m-%d",
            )
            .with_context(|| {
                format!("bad registration_deadline '{}'", self.registration_deadline)
            })?,
            sheet_url: self.sheet_url,
            imported_at: parse_utc(&self.imported_at)?,
        })
    }
}

pub struct AppointmentRow {
    pub id: i64,
    pub teacher_id: i64,
    pub student_id: i64,
    pub course_id: i64,
    pub weekday: String,
    pub time: String,
}

impl AppointmentRow {
    pub fn into_appointment(self) -> Result<Appointment> {
        Ok(Appointment {
            id: self.id,
            teacher_id: self.teacher_id,
            student_id: self.student_id,
            course_id: self.course_id,
            weekday: Weekday::from_str(&self.weekday)
                .ok()
                .with_context(|| format!("bad weekday '{}'", self.weekday))?,
            time: NaiveTime::parse_from_str(&self.time, "%H:%M")
                .with_context(|| format!("bad time '{}'", self.time))?,
        })
    }
}

pub struct HomeworkRow {
    pub user_id: i64,
    pub course_id: i64,
    pub link: String,
    pub submitted_at: String,
}

impl HomeworkRow {
    pub fn into_submission(self) -> Result<HomeworkSubmission> {
        Ok(HomeworkSubmission {
            user_id: self.user_id,
            course_id: self.course_id,
            link: self.link,
            submitted_at: parse_utc(&self.submitted_at)?,
        })
    }
}

/// Released learning unit, as shown in the weekly digest.
pub struct SkillRow {
    pub name: String,
    pub link: String,
}

/// Timestamps are written as RFC 3339. SQLite's own `datetime('now')`
/// default produces "YYYY-MM-DD HH:MM:SS", so accept that too.
pub fn parse_utc(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
        })
        .with_context(|| format!("bad timestamp '{}'", raw))
}
