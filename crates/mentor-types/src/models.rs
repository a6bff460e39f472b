use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Messenger-assigned user identifier (Telegram uses signed 64-bit ids).
pub type UserId = i64;

/// SQLite rowid of a course.
pub type CourseId = i64;

/// Access level stored per user. Ordered so `role >= Role::Operator`
/// reads naturally in permission checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Member,
    Operator,
    Admin,
}

impl Role {
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Role::Member),
            1 => Some(Role::Operator),
            2 => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            Role::Member => 0,
            Role::Operator => 1,
            Role::Admin => 2,
        }
    }
}

/// Where a user is in the signup flow. New users must pick a nickname
/// before anything else works.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignupState {
    CollectingName,
    Done,
}

impl SignupState {
    pub fn as_str(self) -> &'static str {
        match self {
            SignupState::CollectingName => "collecting_name",
            SignupState::Done => "done",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "collecting_name" => Some(SignupState::CollectingName),
            "done" => Some(SignupState::Done),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: UserId,
    pub nickname: Option<String>,
    pub signup: SignupState,
    pub role: Role,
}

/// A course created by the import flow. The enrollment secret lives only
/// in the database layer and is never carried around in this model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub name: String,
    pub owner_id: UserId,
    pub registration_deadline: NaiveDate,
    pub sheet_url: String,
    pub imported_at: DateTime<Utc>,
}

/// One scheduled learning unit inside a course. `week_number` is the
/// 1-based week in which the unit is released to enrolled students.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillSpec {
    pub name: String,
    pub link: String,
    pub week_number: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub week_number: u32,
}

/// A recurring weekly slot, not a single event. The scheduler always
/// projects it onto the nearest future occurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: i64,
    pub teacher_id: UserId,
    pub student_id: UserId,
    pub course_id: CourseId,
    pub weekday: Weekday,
    pub time: NaiveTime,
}

/// Canonical lowercase name used when persisting a weekday. Parsing goes
/// through `chrono::Weekday::from_str`, which also accepts abbreviations.
pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomeworkSubmission {
    pub user_id: UserId,
    pub course_id: CourseId,
    pub link: String,
    pub submitted_at: DateTime<Utc>,
}
