use chrono::{DateTime, NaiveDate, Utc};
use mentor_types::models::{CourseId, Role, SignupState, SkillSpec, UserId, weekday_name};

use crate::Database;
use crate::models::{
    AppointmentRow, CourseRow, HomeworkRow, SkillRow, UserRow, parse_utc,
};
use anyhow::Result;
use rusqlite::Connection;

impl Database {
    // -- Users --

    /// Insert a user on first contact. Fresh users start in the
    /// collecting-name signup state with the member role.
    pub fn create_user(&self, user_id: UserId) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO users (user_id) VALUES (?1)",
                [user_id],
            )?;
            Ok(())
        })
    }

    pub fn user_exists(&self, user_id: UserId) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row("SELECT 1 FROM users WHERE user_id = ?1", [user_id], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn get_user(&self, user_id: UserId) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, user_id))
    }

    pub fn set_nickname(&self, user_id: UserId, nickname: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET nickname = ?1 WHERE user_id = ?2",
                rusqlite::params![nickname, user_id],
            )?;
            Ok(())
        })
    }

    pub fn get_nickname(&self, user_id: UserId) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let nick: Option<Option<String>> = conn
                .query_row(
                    "SELECT nickname FROM users WHERE user_id = ?1",
                    [user_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(nick.flatten())
        })
    }

    pub fn set_signup(&self, user_id: UserId, state: SignupState) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET sign_up = ?1 WHERE user_id = ?2",
                rusqlite::params![state.as_str(), user_id],
            )?;
            Ok(())
        })
    }

    pub fn get_role(&self, user_id: UserId) -> Result<Option<Role>> {
        self.with_conn(|conn| {
            let raw: Option<i64> = conn
                .query_row(
                    "SELECT role FROM users WHERE user_id = ?1",
                    [user_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(raw.and_then(Role::from_i64))
        })
    }

    pub fn set_role(&self, user_id: UserId, role: Role) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET role = ?1 WHERE user_id = ?2",
                rusqlite::params![role.as_i64(), user_id],
            )?;
            Ok(())
        })
    }

    /// All users, as (id, display label) for selection menus.
    pub fn list_users(&self) -> Result<Vec<(UserId, String)>> {
        self.with_conn(|conn| query_user_labels(conn, "SELECT user_id, nickname FROM users"))
    }

    /// Students that have no appointment yet — the candidate list for the
    /// set-appointment flow.
    pub fn users_without_appointments(&self) -> Result<Vec<(UserId, String)>> {
        self.with_conn(|conn| {
            query_user_labels(
                conn,
                "SELECT user_id, nickname FROM users
                 WHERE user_id NOT IN (SELECT student_id FROM appointments)",
            )
        })
    }

    // -- Courses --

    pub fn insert_course(
        &self,
        name: &str,
        owner_id: UserId,
        secret: &str,
        registration_deadline: NaiveDate,
        sheet_url: &str,
        imported_at: DateTime<Utc>,
    ) -> Result<CourseId> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO courses (name, owner_id, secret, registration_deadline, sheet_url, imported_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    name,
                    owner_id,
                    secret,
                    registration_deadline.format("%Y-%m-%d").to_string(),
                    sheet_url,
                    imported_at.to_rfc3339(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn list_courses(&self) -> Result<Vec<CourseRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, owner_id, registration_deadline, sheet_url, imported_at
                 FROM courses ORDER BY id",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(CourseRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        owner_id: row.get(2)?,
                        registration_deadline: row.get(3)?,
                        sheet_url: row.get(4)?,
                        imported_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn course_name(&self, course_id: CourseId) -> Result<Option<String>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT name FROM courses WHERE id = ?1",
                    [course_id],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    pub fn course_secret(&self, course_id: CourseId) -> Result<Option<String>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT secret FROM courses WHERE id = ?1",
                    [course_id],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    pub fn courses_owned_by(&self, owner_id: UserId) -> Result<Vec<(CourseId, String)>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, name FROM courses WHERE owner_id = ?1 ORDER BY id")?;
            let rows = stmt
                .query_map([owner_id], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Skills --

    /// Bulk insert at import time; skills are read-only afterward.
    pub fn insert_skills(&self, course_id: CourseId, skills: &[SkillSpec]) -> Result<()> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "INSERT INTO skills (course_id, name, link, week_number, start_date, end_date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for skill in skills {
                stmt.execute(rusqlite::params![
                    course_id,
                    skill.name,
                    skill.link,
                    skill.week_number,
                    skill.start_date.format("%Y-%m-%d").to_string(),
                    skill.end_date.format("%Y-%m-%d").to_string(),
                ])?;
            }
            Ok(())
        })
    }

    pub fn skills_for_week(&self, course_id: CourseId, week: u32) -> Result<Vec<SkillRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name, link FROM skills
                 WHERE course_id = ?1 AND week_number = ?2
                 ORDER BY id",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![course_id, week], |row| {
                    Ok(SkillRow {
                        name: row.get(0)?,
                        link: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Enrollments --

    /// Enroll at week 0. Returns false if the (user, course) pair was
    /// already enrolled — at most one enrollment per pair.
    pub fn enroll(&self, user_id: UserId, course_id: CourseId) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO enrollments (user_id, course_id, week_number)
                 VALUES (?1, ?2, 0)",
                rusqlite::params![user_id, course_id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn unenroll(&self, user_id: UserId, course_id: CourseId) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM enrollments WHERE user_id = ?1 AND course_id = ?2",
                rusqlite::params![user_id, course_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Courses the user is enrolled in, as (id, name).
    pub fn user_courses(&self, user_id: UserId) -> Result<Vec<(CourseId, String)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.name
                 FROM enrollments e
                 JOIN courses c ON e.course_id = c.id
                 WHERE e.user_id = ?1
                 ORDER BY c.id",
            )?;
            let rows = stmt
                .query_map([user_id], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn enrolled_users(&self, course_id: CourseId) -> Result<Vec<UserId>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT user_id FROM enrollments WHERE course_id = ?1")?;
            let rows = stmt
                .query_map([course_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Every user with at least one enrollment — the scheduler's scan set.
    pub fn users_with_enrollments(&self) -> Result<Vec<UserId>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT DISTINCT user_id FROM enrollments")?;
            let rows = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn current_week(&self, user_id: UserId, course_id: CourseId) -> Result<Option<u32>> {
        self.with_conn(|conn| {
            let week: Option<i64> = conn
                .query_row(
                    "SELECT week_number FROM enrollments WHERE user_id = ?1 AND course_id = ?2",
                    rusqlite::params![user_id, course_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(week.map(|w| w.max(0) as u32))
        })
    }

    /// Advance the enrollment's week counter by exactly one. Only the
    /// accepted one-hour-after firing calls this, once per weekly cycle.
    pub fn advance_week(&self, user_id: UserId, course_id: CourseId) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE enrollments SET week_number = week_number + 1
                 WHERE user_id = ?1 AND course_id = ?2",
                rusqlite::params![user_id, course_id],
            )?;
            Ok(())
        })
    }

    // -- Appointments --

    pub fn insert_appointment(
        &self,
        teacher_id: UserId,
        student_id: UserId,
        course_id: CourseId,
        weekday: chrono::Weekday,
        time: chrono::NaiveTime,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO appointments (teacher_id, student_id, course_id, weekday, time)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    teacher_id,
                    student_id,
                    course_id,
                    weekday_name(weekday),
                    time.format("%H:%M").to_string(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn appointments_for_student(&self, student_id: UserId) -> Result<Vec<AppointmentRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, teacher_id, student_id, course_id, weekday, time
                 FROM appointments WHERE student_id = ?1",
            )?;
            let rows = stmt
                .query_map([student_id], |row| {
                    Ok(AppointmentRow {
                        id: row.get(0)?,
                        teacher_id: row.get(1)?,
                        student_id: row.get(2)?,
                        course_id: row.get(3)?,
                        weekday: row.get(4)?,
                        time: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Homework --

    pub fn submit_homework(
        &self,
        user_id: UserId,
        course_id: CourseId,
        link: &str,
        submitted_at: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO homework (user_id, course_id, link, submitted_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![user_id, course_id, link, submitted_at.to_rfc3339()],
            )?;
            Ok(())
        })
    }

    /// Most-recent-first submissions for a course.
    pub fn latest_homework(&self, course_id: CourseId, limit: u32) -> Result<Vec<HomeworkRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, course_id, link, submitted_at
                 FROM homework
                 WHERE course_id = ?1
                 ORDER BY submitted_at DESC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![course_id, limit], |row| {
                    Ok(HomeworkRow {
                        user_id: row.get(0)?,
                        course_id: row.get(1)?,
                        link: row.get(2)?,
                        submitted_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Notification ledger --

    pub fn last_notification(
        &self,
        user_id: UserId,
        course_id: CourseId,
        kind: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        self.with_conn(|conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT last_sent FROM notification_log
                     WHERE user_id = ?1 AND course_id = ?2 AND kind = ?3",
                    rusqlite::params![user_id, course_id, kind],
                    |row| row.get(0),
                )
                .optional()?;
            raw.map(|s| parse_utc(&s)).transpose()
        })
    }

    /// Upsert, not append: at most one ledger row per (user, course, kind).
    pub fn record_notification(
        &self,
        user_id: UserId,
        course_id: CourseId,
        kind: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notification_log (user_id, course_id, kind, last_sent)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (user_id, course_id, kind)
                 DO UPDATE SET last_sent = excluded.last_sent",
                rusqlite::params![user_id, course_id, kind, sent_at.to_rfc3339()],
            )?;
            Ok(())
        })
    }

    // -- Skill digest marker --

    /// Once-ever gate: true if the pair has ever received a skill digest.
    pub fn has_skill_digest(&self, user_id: UserId, course_id: CourseId) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM skills_notifications
                     WHERE user_id = ?1 AND course_id = ?2",
                    rusqlite::params![user_id, course_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn record_skill_digest(
        &self,
        user_id: UserId,
        course_id: CourseId,
        sent_at: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO skills_notifications (user_id, course_id, sent_at)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![user_id, course_id, sent_at.to_rfc3339()],
            )?;
            Ok(())
        })
    }
}

fn query_user(conn: &Connection, user_id: i64) -> Result<Option<UserRow>> {
    let mut stmt =
        conn.prepare("SELECT user_id, nickname, sign_up, role FROM users WHERE user_id = ?1")?;

    let row = stmt
        .query_row([user_id], |row| {
            Ok(UserRow {
                user_id: row.get(0)?,
                nickname: row.get(1)?,
                sign_up: row.get(2)?,
                role: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_user_labels(conn: &Connection, sql: &str) -> Result<Vec<(i64, String)>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([], |row| {
            let id: i64 = row.get(0)?;
            let nickname: Option<String> = row.get(1)?;
            Ok((id, nickname.unwrap_or_else(|| id.to_string())))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Weekday};

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn seed_course(db: &Database, owner: i64) -> CourseId {
        db.create_user(owner).unwrap();
        db.insert_course(
            "Rust basics",
            owner,
            "hunter2",
            NaiveDate::from_ymd_opt(2026, 12, 31).unwrap(),
            "https://docs.google.com/spreadsheets/d/abc123",
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn enrollment_is_unique_per_pair() {
        let db = test_db();
        let course = seed_course(&db, 1);
        db.create_user(42).unwrap();

        assert!(db.enroll(42, course).unwrap());
        assert!(!db.enroll(42, course).unwrap());
        assert_eq!(db.current_week(42, course).unwrap(), Some(0));
    }

    #[test]
    fn week_advances_by_one() {
        let db = test_db();
        let course = seed_course(&db, 1);
        db.create_user(42).unwrap();
        db.enroll(42, course).unwrap();

        for expected in 1..=3u32 {
            db.advance_week(42, course).unwrap();
            assert_eq!(db.current_week(42, course).unwrap(), Some(expected));
        }
    }

    #[test]
    fn ledger_upserts_instead_of_appending() {
        let db = test_db();
        let course = seed_course(&db, 1);
        db.create_user(42).unwrap();

        let first = Utc.with_ymd_and_hms(2026, 3, 2, 14, 0, 0).unwrap();
        let second = first + Duration::days(7);

        db.record_notification(42, course, "1_hour", first).unwrap();
        db.record_notification(42, course, "1_hour", second).unwrap();

        assert_eq!(
            db.last_notification(42, course, "1_hour").unwrap(),
            Some(second)
        );
    }

    #[test]
    fn ledger_keys_are_independent_per_kind() {
        let db = test_db();
        let course = seed_course(&db, 1);
        db.create_user(42).unwrap();

        let now = Utc.with_ymd_and_hms(2026, 3, 2, 14, 0, 0).unwrap();
        db.record_notification(42, course, "6_days", now).unwrap();

        assert!(db.last_notification(42, course, "1_day").unwrap().is_none());
    }

    #[test]
    fn latest_homework_is_newest_first_and_limited() {
        let db = test_db();
        let course = seed_course(&db, 1);
        db.create_user(42).unwrap();

        let base = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        for i in 0..5 {
            db.submit_homework(
                42,
                course,
                &format!("https://example.com/hw/{}", i),
                base + Duration::minutes(i),
            )
            .unwrap();
        }

        let rows = db.latest_homework(course, 3).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].link, "https://example.com/hw/4");
        assert_eq!(rows[2].link, "https://example.com/hw/2");
    }

    #[test]
    fn skill_digest_marker_is_once_ever() {
        let db = test_db();
        let course = seed_course(&db, 1);
        db.create_user(42).unwrap();

        assert!(!db.has_skill_digest(42, course).unwrap());
        db.record_skill_digest(42, course, Utc::now()).unwrap();
        assert!(db.has_skill_digest(42, course).unwrap());
        // A second record is a no-op, not an error.
        db.record_skill_digest(42, course, Utc::now()).unwrap();
    }

    #[test]
    fn appointment_round_trips_through_rows() {
        let db = test_db();
        let course = seed_course(&db, 1);
        db.create_user(42).unwrap();

        db.insert_appointment(
            1,
            42,
            course,
            Weekday::Mon,
            chrono::NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
        )
        .unwrap();

        let rows = db.appointments_for_student(42).unwrap();
        assert_eq!(rows.len(), 1);
        let appt = rows.into_iter().next().unwrap().into_appointment().unwrap();
        assert_eq!(appt.weekday, Weekday::Mon);
        assert_eq!(appt.time.format("%H:%M").to_string(), "15:00");
        assert_eq!(appt.course_id, course);
    }

    #[test]
    fn users_with_enrollments_is_distinct() {
        let db = test_db();
        let c1 = seed_course(&db, 1);
        let c2 = seed_course(&db, 1);
        db.create_user(42).unwrap();
        db.enroll(42, c1).unwrap();
        db.enroll(42, c2).unwrap();

        assert_eq!(db.users_with_enrollments().unwrap(), vec![42]);
    }
}
