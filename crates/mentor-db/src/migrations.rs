use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            user_id     INTEGER PRIMARY KEY,
            nickname    TEXT,
            sign_up     TEXT NOT NULL DEFAULT 'collecting_name',
            role        INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS courses (
            id                      INTEGER PRIMARY KEY AUTOINCREMENT,
            name                    TEXT NOT NULL,
            owner_id                INTEGER NOT NULL REFERENCES users(user_id),
            secret                  TEXT NOT NULL,
            registration_deadline   TEXT NOT NULL,
            sheet_url               TEXT NOT NULL,
            imported_at             TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS skills (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            course_id   INTEGER NOT NULL REFERENCES courses(id),
            name        TEXT NOT NULL,
            link        TEXT NOT NULL,
            week_number INTEGER NOT NULL,
            start_date  TEXT NOT NULL,
            end_date    TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_skills_course_week
            ON skills(course_id, week_number);

        CREATE TABLE IF NOT EXISTS enrollments (
            user_id     INTEGER NOT NULL REFERENCES users(user_id),
            course_id   INTEGER NOT NULL REFERENCES courses(id),
            week_number INTEGER NOT NULL DEFAULT 0,
            UNIQUE(user_id, course_id)
        );

        CREATE TABLE IF NOT EXISTS appointments (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            teacher_id  INTEGER NOT NULL REFERENCES users(user_id),
            student_id  INTEGER NOT NULL REFERENCES users(user_id),
            course_id   INTEGER NOT NULL REFERENCES courses(id),
            weekday     TEXT NOT NULL,
            time        TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_appointments_student
            ON appointments(student_id);

        CREATE TABLE IF NOT EXISTS homework (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id         INTEGER NOT NULL REFERENCES users(user_id),
            course_id       INTEGER NOT NULL REFERENCES courses(id),
            link            TEXT NOT NULL,
            submitted_at    TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_homework_course
            ON homework(course_id, submitted_at);

        CREATE TABLE IF NOT EXISTS notification_log (
            user_id     INTEGER NOT NULL REFERENCES users(user_id),
            course_id   INTEGER NOT NULL REFERENCES courses(id),
            kind        TEXT NOT NULL,
            last_sent   TEXT NOT NULL,
            UNIQUE(user_id, course_id, kind)
        );

        CREATE TABLE IF NOT EXISTS skills_notifications (
            user_id     INTEGER NOT NULL REFERENCES users(user_id),
            course_id   INTEGER NOT NULL REFERENCES courses(id),
            sent_at     TEXT NOT NULL,
            UNIQUE(user_id, course_id)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
