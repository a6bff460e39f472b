//! Command and flow dispatch. Every inbound update lands here; multi-step
//! conversations are driven by the per-user `FlowState`.

use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use chrono::{FixedOffset, NaiveDate, NaiveTime, Utc, Weekday};
use tracing::{debug, info, warn};

use mentor_db::Database;
use mentor_sheets::{ImportedCourse, SheetImporter};
use mentor_types::gateway::{Button, Incoming, Keyboard, Update};
use mentor_types::models::{CourseId, Role, SignupState, UserId};

use crate::gateway::MessengerGateway;
use crate::session::{FlowState, Sessions};

const PAGE_SIZE: usize = 10;
const MAX_NICKNAME_LEN: usize = 63;
const HOMEWORK_LIMIT: u32 = 50;

pub struct Bot {
    db: Arc<Database>,
    gateway: Arc<dyn MessengerGateway>,
    importer: Arc<dyn SheetImporter>,
    sessions: Sessions,
    tz: FixedOffset,
}

impl Bot {
    pub fn new(
        db: Arc<Database>,
        gateway: Arc<dyn MessengerGateway>,
        importer: Arc<dyn SheetImporter>,
        tz: FixedOffset,
    ) -> Self {
        Self {
            db,
            gateway,
            importer,
            sessions: Sessions::new(),
            tz,
        }
    }

    pub async fn handle_update(&self, update: Update) -> Result<()> {
        match update.incoming {
            Incoming::Command { name, args } => {
                self.handle_command(update.user_id, &name, &args).await
            }
            Incoming::Text(text) => self.handle_text(update.user_id, &text).await,
            Incoming::Callback(data) => self.handle_callback(update.user_id, &data).await,
        }
    }

    // -- Commands --

    async fn handle_command(&self, user_id: UserId, name: &str, _args: &str) -> Result<()> {
        // A fresh command abandons whatever flow was in progress.
        self.sessions.clear(user_id);

        match name {
            "start" => self.cmd_start(user_id).await,
            "menu" => self.cmd_menu(user_id).await,
            "courses" => self.cmd_courses(user_id).await,
            "enroll" => self.cmd_enroll(user_id).await,
            "unenroll" => self.cmd_unenroll(user_id).await,
            "addcourse" => self.cmd_addcourse(user_id).await,
            "submit_homework" => self.cmd_submit_homework(user_id).await,
            "view_homework" => self.cmd_view_homework(user_id).await,
            "set_appointment" => self.cmd_set_appointment(user_id).await,
            "set_role" => self.cmd_set_role(user_id).await,
            "get_role" => self.cmd_get_role(user_id).await,
            "announce" => self.cmd_announce(user_id).await,
            _ => {
                self.gateway
                    .send_text(user_id, "Unknown command. Try /menu.")
                    .await
            }
        }
    }

    async fn cmd_start(&self, user_id: UserId) -> Result<()> {
        if !self.db.user_exists(user_id)? {
            self.db.create_user(user_id)?;
            info!("new user {}", user_id);
            self.sessions.set(user_id, FlowState::AwaitingNickname);
            return self
                .gateway
                .send_text(user_id, "Hi! Pick a nickname for yourself.")
                .await;
        }

        let role = self.role_of(user_id)?;
        let greeting = match role {
            Role::Member => "Hi!",
            Role::Operator => "Hi, operator!",
            Role::Admin => "Hi, admin!",
        };
        self.gateway
            .send_text(user_id, &format!("{}\n\n{}", greeting, menu_text(role)))
            .await
    }

    async fn cmd_menu(&self, user_id: UserId) -> Result<()> {
        let role = self.role_of(user_id)?;
        self.gateway.send_text(user_id, &menu_text(role)).await
    }

    async fn cmd_get_role(&self, user_id: UserId) -> Result<()> {
        let role = self.role_of(user_id)?;
        self.gateway
            .send_text(user_id, &format!("Your role value is: {}", role.as_i64()))
            .await
    }

    async fn cmd_courses(&self, user_id: UserId) -> Result<()> {
        let courses = self.db.list_courses()?;
        if courses.is_empty() {
            return self
                .gateway
                .send_text(user_id, "No courses are available right now.")
                .await;
        }

        let mut text = String::from("Available courses:\n");
        for course in courses {
            text.push_str(&format!(
                "{}. {} (registration closes {})\n",
                course.id, course.name, course.registration_deadline
            ));
        }
        self.gateway.send_text(user_id, &text).await
    }

    async fn cmd_enroll(&self, user_id: UserId) -> Result<()> {
        let open = self.open_courses()?;
        if open.is_empty() {
            return self
                .gateway
                .send_text(user_id, "No courses are open for enrollment.")
                .await;
        }

        self.sessions.set(user_id, FlowState::EnrollSelect);
        let keyboard = paged_keyboard(&open, 0, "enroll", "page");
        self.gateway
            .send_menu(user_id, "Pick a course to enroll in:", &keyboard)
            .await
    }

    async fn cmd_unenroll(&self, user_id: UserId) -> Result<()> {
        let courses = self.db.user_courses(user_id)?;
        if courses.is_empty() {
            return self
                .gateway
                .send_text(user_id, "You are not enrolled in any course.")
                .await;
        }

        self.sessions.set(user_id, FlowState::UnenrollSelect);
        let keyboard = paged_keyboard(&courses, 0, "unenroll", "page");
        self.gateway
            .send_menu(user_id, "Pick a course to leave:", &keyboard)
            .await
    }

    async fn cmd_addcourse(&self, user_id: UserId) -> Result<()> {
        if !self.require_role(user_id, Role::Operator).await? {
            return Ok(());
        }
        self.sessions.set(user_id, FlowState::AddCourseUrl);
        self.gateway
            .send_text(user_id, "Send the spreadsheet URL for the course schedule.")
            .await
    }

    async fn cmd_submit_homework(&self, user_id: UserId) -> Result<()> {
        let courses = self.db.user_courses(user_id)?;
        if courses.is_empty() {
            return self
                .gateway
                .send_text(user_id, "You are not enrolled in any course.")
                .await;
        }

        self.sessions.set(user_id, FlowState::SubmitHomeworkSelect);
        let keyboard = paged_keyboard(&courses, 0, "hw", "page");
        self.gateway
            .send_menu(user_id, "Pick a course to submit homework for:", &keyboard)
            .await
    }

    async fn cmd_view_homework(&self, user_id: UserId) -> Result<()> {
        let role = self.role_of(user_id)?;
        if role < Role::Operator {
            return self.refuse(user_id).await;
        }

        let courses = if role == Role::Admin {
            self.db
                .list_courses()?
                .into_iter()
                .map(|c| (c.id, c.name))
                .collect()
        } else {
            self.db.courses_owned_by(user_id)?
        };

        if courses.is_empty() {
            return self.gateway.send_text(user_id, "No courses available.").await;
        }

        self.sessions.set(user_id, FlowState::ViewHomeworkSelect);
        let keyboard = paged_keyboard(&courses, 0, "viewhw", "page");
        self.gateway
            .send_menu(user_id, "Pick a course to review homework for:", &keyboard)
            .await
    }

    async fn cmd_set_appointment(&self, user_id: UserId) -> Result<()> {
        if !self.require_role(user_id, Role::Operator).await? {
            return Ok(());
        }

        let students = self.db.users_without_appointments()?;
        if students.is_empty() {
            return self
                .gateway
                .send_text(user_id, "Everyone already has an appointment.")
                .await;
        }

        self.sessions.set(user_id, FlowState::SetAppointmentStudent);
        let keyboard = paged_keyboard(&students, 0, "student", "spage");
        self.gateway
            .send_menu(user_id, "Pick a student:", &keyboard)
            .await
    }

    async fn cmd_set_role(&self, user_id: UserId) -> Result<()> {
        if !self.require_role(user_id, Role::Admin).await? {
            return Ok(());
        }

        let users = self.db.list_users()?;
        self.sessions.set(user_id, FlowState::SetRoleUser);
        let keyboard = paged_keyboard(&users, 0, "roleuser", "page");
        self.gateway
            .send_menu(user_id, "Pick a user to change the role of:", &keyboard)
            .await
    }

    async fn cmd_announce(&self, user_id: UserId) -> Result<()> {
        if !self.require_role(user_id, Role::Operator).await? {
            return Ok(());
        }
        self.sessions.set(user_id, FlowState::AnnounceDetails);
        self.gateway
            .send_text(user_id, "Send: course_id message")
            .await
    }

    // -- Text in a flow --

    async fn handle_text(&self, user_id: UserId, text: &str) -> Result<()> {
        let Some(state) = self.sessions.get(user_id) else {
            // The in-memory session is gone after a restart, but signup
            // state is persistent: keep collecting the nickname.
            if let Some(row) = self.db.get_user(user_id)? {
                if row.into_user()?.signup == SignupState::CollectingName {
                    return self.finish_nickname(user_id, text).await;
                }
            }
            return self
                .gateway
                .send_text(user_id, "Not sure what to do with that. Try /menu.")
                .await;
        };

        match state {
            FlowState::AwaitingNickname => self.finish_nickname(user_id, text).await,
            FlowState::AddCourseUrl => self.import_sheet(user_id, text).await,
            FlowState::AddCourseSecret {
                sheet_url,
                courses,
                index,
            } => {
                self.sessions.set(
                    user_id,
                    FlowState::AddCourseDeadline {
                        sheet_url,
                        courses: courses.clone(),
                        index,
                        secret: text.to_string(),
                    },
                );
                self.gateway
                    .send_text(
                        user_id,
                        &format!(
                            "Enter the registration deadline for {} (YYYY-MM-DD).",
                            courses[index].name
                        ),
                    )
                    .await
            }
            FlowState::AddCourseDeadline {
                sheet_url,
                courses,
                index,
                secret,
            } => {
                self.finish_course(user_id, text, sheet_url, courses, index, secret)
                    .await
            }
            FlowState::EnrollSecret { course_id } => {
                self.check_enroll_secret(user_id, course_id, text).await
            }
            FlowState::SubmitHomeworkLink { course_id } => {
                self.db
                    .submit_homework(user_id, course_id, text, Utc::now())?;
                self.sessions.clear(user_id);
                self.gateway
                    .send_text(user_id, "Homework link submitted!")
                    .await
            }
            FlowState::SetAppointmentWeekday {
                student_id,
                course_id,
            } => match Weekday::from_str(text) {
                Ok(weekday) => {
                    self.sessions.set(
                        user_id,
                        FlowState::SetAppointmentTime {
                            student_id,
                            course_id,
                            weekday,
                        },
                    );
                    self.gateway
                        .send_text(user_id, "Enter the meeting time (e.g. 15:00).")
                        .await
                }
                Err(_) => {
                    self.gateway
                        .send_text(user_id, "That is not a weekday. Try e.g. Monday.")
                        .await
                }
            },
            FlowState::SetAppointmentTime {
                student_id,
                course_id,
                weekday,
            } => match NaiveTime::parse_from_str(text, "%H:%M") {
                Ok(time) => {
                    self.db
                        .insert_appointment(user_id, student_id, course_id, weekday, time)?;
                    self.sessions.clear(user_id);
                    info!(
                        "appointment set for student {} ({} {})",
                        student_id, weekday, time
                    );
                    self.gateway
                        .send_text(user_id, "Meeting reminders are set up!")
                        .await
                }
                Err(_) => {
                    self.gateway
                        .send_text(user_id, "That is not a time. Use HH:MM, e.g. 15:00.")
                        .await
                }
            },
            FlowState::AnnounceDetails => self.send_announcement(user_id, text).await,
            _ => {
                self.gateway
                    .send_text(user_id, "Please use the buttons above.")
                    .await
            }
        }
    }

    // -- Callbacks --

    async fn handle_callback(&self, user_id: UserId, data: &str) -> Result<()> {
        let Some((prefix, rest)) = data.split_once(':') else {
            debug!("malformed callback '{}' from {}", data, user_id);
            return Ok(());
        };
        let state = self.sessions.get(user_id);

        match (prefix, state) {
            ("page", Some(FlowState::EnrollSelect)) => {
                let page = rest.parse().unwrap_or(0);
                let open = self.open_courses()?;
                let keyboard = paged_keyboard(&open, page, "enroll", "page");
                self.gateway
                    .send_menu(user_id, "Pick a course to enroll in:", &keyboard)
                    .await
            }
            ("enroll", Some(FlowState::EnrollSelect)) => {
                let course_id: CourseId = rest.parse()?;
                self.sessions
                    .set(user_id, FlowState::EnrollSecret { course_id });
                self.gateway
                    .send_text(user_id, "Enter the enrollment secret.")
                    .await
            }
            ("unenroll", Some(FlowState::UnenrollSelect)) => {
                let course_id: CourseId = rest.parse()?;
                let removed = self.db.unenroll(user_id, course_id)?;
                self.sessions.clear(user_id);
                let reply = if removed {
                    "You have left the course."
                } else {
                    "You were not enrolled in that course."
                };
                self.gateway.send_text(user_id, reply).await
            }
            ("hw", Some(FlowState::SubmitHomeworkSelect)) => {
                let course_id: CourseId = rest.parse()?;
                self.sessions
                    .set(user_id, FlowState::SubmitHomeworkLink { course_id });
                self.gateway
                    .send_text(user_id, "Send the link to your homework.")
                    .await
            }
            ("viewhw", Some(FlowState::ViewHomeworkSelect)) => {
                let course_id: CourseId = rest.parse()?;
                self.sessions.clear(user_id);
                self.show_homework(user_id, course_id).await
            }
            ("spage", Some(FlowState::SetAppointmentStudent)) => {
                let page = rest.parse().unwrap_or(0);
                let students = self.db.users_without_appointments()?;
                let keyboard = paged_keyboard(&students, page, "student", "spage");
                self.gateway
                    .send_menu(user_id, "Pick a student:", &keyboard)
                    .await
            }
            ("student", Some(FlowState::SetAppointmentStudent)) => {
                let student_id: UserId = rest.parse()?;
                let courses = self.db.user_courses(student_id)?;
                if courses.is_empty() {
                    self.sessions.clear(user_id);
                    return self
                        .gateway
                        .send_text(user_id, "That student is not enrolled in any course.")
                        .await;
                }
                self.sessions
                    .set(user_id, FlowState::SetAppointmentCourse { student_id });
                let keyboard = paged_keyboard(&courses, 0, "acourse", "page");
                self.gateway
                    .send_menu(user_id, "Pick the course the meetings are for:", &keyboard)
                    .await
            }
            ("acourse", Some(FlowState::SetAppointmentCourse { student_id })) => {
                let course_id: CourseId = rest.parse()?;
                self.sessions.set(
                    user_id,
                    FlowState::SetAppointmentWeekday {
                        student_id,
                        course_id,
                    },
                );
                self.gateway
                    .send_text(user_id, "Enter the weekday (e.g. Monday).")
                    .await
            }
            ("roleuser", Some(FlowState::SetRoleUser)) => {
                let target: UserId = rest.parse()?;
                self.sessions.set(user_id, FlowState::SetRoleValue { target });
                let keyboard = Keyboard::new().row(
                    [Role::Member, Role::Operator, Role::Admin]
                        .iter()
                        .map(|r| Button::new(r.as_i64().to_string(), format!("role:{}", r.as_i64())))
                        .collect(),
                );
                self.gateway
                    .send_menu(user_id, "Pick the new role value:", &keyboard)
                    .await
            }
            ("role", Some(FlowState::SetRoleValue { target })) => {
                let value: i64 = rest.parse()?;
                let Some(role) = Role::from_i64(value) else {
                    return self
                        .gateway
                        .send_text(user_id, "Role must be 0, 1 or 2.")
                        .await;
                };
                self.db.set_role(target, role)?;
                self.sessions.clear(user_id);
                info!("role of {} set to {:?} by {}", target, role, user_id);
                self.gateway
                    .send_text(user_id, &format!("Role of user {} updated to {}.", target, value))
                    .await
            }
            (_, state) => {
                debug!(
                    "ignoring callback '{}' from {} in state {:?}",
                    data, user_id, state
                );
                Ok(())
            }
        }
    }

    // -- Flow steps --

    async fn finish_nickname(&self, user_id: UserId, nickname: &str) -> Result<()> {
        if nickname.chars().count() > MAX_NICKNAME_LEN {
            return self
                .gateway
                .send_text(user_id, "That nickname is too long, try a shorter one.")
                .await;
        }

        self.db.set_nickname(user_id, nickname)?;
        self.db.set_signup(user_id, SignupState::Done)?;
        self.sessions.clear(user_id);
        self.gateway
            .send_text(user_id, &format!("Nickname set: {}. Try /menu.", nickname))
            .await
    }

    async fn import_sheet(&self, user_id: UserId, url: &str) -> Result<()> {
        let courses = self.importer.import(url).await;
        if courses.is_empty() {
            self.sessions.clear(user_id);
            return self
                .gateway
                .send_text(
                    user_id,
                    "Could not read that spreadsheet. Check the URL and try again.",
                )
                .await;
        }

        self.gateway
            .send_text(
                user_id,
                &format!("Loaded {} course(s) from the spreadsheet.", courses.len()),
            )
            .await?;
        self.request_course_secret(user_id, url.to_string(), courses, 0)
            .await
    }

    async fn request_course_secret(
        &self,
        user_id: UserId,
        sheet_url: String,
        courses: Vec<ImportedCourse>,
        index: usize,
    ) -> Result<()> {
        let name = courses[index].name.clone();
        self.sessions.set(
            user_id,
            FlowState::AddCourseSecret {
                sheet_url,
                courses,
                index,
            },
        );
        self.gateway
            .send_text(
                user_id,
                &format!("Enter the enrollment secret for course: {}", name),
            )
            .await
    }

    async fn finish_course(
        &self,
        user_id: UserId,
        deadline_text: &str,
        sheet_url: String,
        courses: Vec<ImportedCourse>,
        index: usize,
        secret: String,
    ) -> Result<()> {
        let Ok(deadline) = NaiveDate::parse_from_str(deadline_text, "%Y-%m-%d") else {
            return self
                .gateway
                .send_text(user_id, "Invalid date. Use YYYY-MM-DD.")
                .await;
        };

        let course = &courses[index];
        let course_id = self.db.insert_course(
            &course.name,
            user_id,
            &secret,
            deadline,
            &sheet_url,
            Utc::now(),
        )?;
        self.db.insert_skills(course_id, &course.skills)?;
        info!(
            "course '{}' imported with {} skills (id {})",
            course.name,
            course.skills.len(),
            course_id
        );

        if index + 1 < courses.len() {
            self.request_course_secret(user_id, sheet_url, courses, index + 1)
                .await
        } else {
            self.sessions.clear(user_id);
            self.gateway
                .send_text(user_id, "All courses have been added!")
                .await
        }
    }

    async fn check_enroll_secret(
        &self,
        user_id: UserId,
        course_id: CourseId,
        secret: &str,
    ) -> Result<()> {
        let expected = self.db.course_secret(course_id)?;
        if expected.as_deref() != Some(secret) {
            return self
                .gateway
                .send_text(user_id, "Wrong secret, try again.")
                .await;
        }

        self.sessions.clear(user_id);
        let reply = if self.db.enroll(user_id, course_id)? {
            info!("user {} enrolled in course {}", user_id, course_id);
            "Congratulations, you are enrolled!"
        } else {
            "You are already enrolled in this course."
        };
        self.gateway.send_text(user_id, reply).await
    }

    async fn show_homework(&self, user_id: UserId, course_id: CourseId) -> Result<()> {
        let rows = self.db.latest_homework(course_id, HOMEWORK_LIMIT)?;
        if rows.is_empty() {
            return self
                .gateway
                .send_text(user_id, "No homework has been submitted for this course.")
                .await;
        }

        let mut text = format!("Latest {} submissions:\n", rows.len());
        for row in rows {
            let who = self
                .db
                .get_nickname(row.user_id)?
                .unwrap_or_else(|| row.user_id.to_string());
            text.push_str(&format!("{}: {}\n", who, row.link));
        }
        self.gateway.send_text(user_id, &text).await
    }

    async fn send_announcement(&self, user_id: UserId, details: &str) -> Result<()> {
        let parsed = details
            .split_once(char::is_whitespace)
            .and_then(|(id, msg)| id.parse::<CourseId>().ok().map(|id| (id, msg.trim())));
        let Some((course_id, message)) = parsed else {
            return self
                .gateway
                .send_text(user_id, "Wrong format. Send: course_id message")
                .await;
        };

        let Some(course_name) = self.db.course_name(course_id)? else {
            return self
                .gateway
                .send_text(user_id, "No course with that id.")
                .await;
        };

        let students = self.db.enrolled_users(course_id)?;
        let mut delivered = 0usize;
        for student in students {
            let text = format!("Announcement for {}: {}", course_name, message);
            match self.gateway.send_text(student, &text).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!("announcement to {} failed: {}", student, e),
            }
        }

        self.sessions.clear(user_id);
        self.gateway
            .send_text(
                user_id,
                &format!("Announcement sent to {} student(s).", delivered),
            )
            .await
    }

    // -- Helpers --

    fn role_of(&self, user_id: UserId) -> Result<Role> {
        Ok(self
            .db
            .get_role(user_id)?
            .unwrap_or(Role::Member))
    }

    async fn require_role(&self, user_id: UserId, min: Role) -> Result<bool> {
        if self.role_of(user_id)? >= min {
            Ok(true)
        } else {
            self.refuse(user_id).await?;
            Ok(false)
        }
    }

    async fn refuse(&self, user_id: UserId) -> Result<()> {
        self.gateway
            .send_text(user_id, "You do not have permission to do that.")
            .await
    }

    fn open_courses(&self) -> Result<Vec<(CourseId, String)>> {
        let today = Utc::now().with_timezone(&self.tz).date_naive();
        let mut open = Vec::new();
        for row in self.db.list_courses()? {
            let course = row.into_course()?;
            if course.registration_deadline >= today {
                open.push((course.id, course.name));
            }
        }
        Ok(open)
    }
}

fn menu_text(role: Role) -> String {
    let mut text = String::from(
        "Commands:\n/courses - list courses\n/enroll - join a course\n\
         /unenroll - leave a course\n/submit_homework - send a homework link\n\
         /get_role - show your role",
    );
    if role >= Role::Operator {
        text.push_str(
            "\n/addcourse - import courses from a spreadsheet\n\
             /set_appointment - schedule weekly meetings\n\
             /view_homework - review submissions\n/announce - message a course",
        );
    }
    if role >= Role::Admin {
        text.push_str("\n/set_role - change a user's role");
    }
    text
}

/// Ten items per page with forward/back buttons carrying the page number.
fn paged_keyboard(
    items: &[(i64, String)],
    page: usize,
    item_prefix: &str,
    page_prefix: &str,
) -> Keyboard {
    let begin = (page * PAGE_SIZE).min(items.len());
    let end = (begin + PAGE_SIZE).min(items.len());

    let mut keyboard = Keyboard::single_column(
        items[begin..end]
            .iter()
            .map(|(id, label)| Button::new(label.clone(), format!("{}:{}", item_prefix, id))),
    );

    let mut nav = Vec::new();
    if page > 0 {
        nav.push(Button::new("Back", format!("{}:{}", page_prefix, page - 1)));
    }
    if end < items.len() {
        nav.push(Button::new("Next", format!("{}:{}", page_prefix, page + 1)));
    }
    if !nav.is_empty() {
        keyboard = keyboard.row(nav);
    }
    keyboard
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mentor_types::models::SkillSpec;
    use std::sync::Mutex;

    /// Records every outbound message for assertions.
    #[derive(Default)]
    struct RecordingGateway {
        sent: Mutex<Vec<(UserId, String, Option<Keyboard>)>>,
    }

    impl RecordingGateway {
        fn texts_for(&self, user_id: UserId) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|(id, _, _)| *id == user_id)
                .map(|(_, text, _)| text.clone())
                .collect()
        }

        fn last_keyboard(&self) -> Option<Keyboard> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find_map(|(_, _, kb)| kb.clone())
        }
    }

    #[async_trait]
    impl MessengerGateway for RecordingGateway {
        async fn send_text(&self, user_id: UserId, text: &str) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((user_id, text.to_string(), None));
            Ok(())
        }

        async fn send_menu(&self, user_id: UserId, text: &str, keyboard: &Keyboard) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((user_id, text.to_string(), Some(keyboard.clone())));
            Ok(())
        }
    }

    #[derive(Default)]
    struct StaticImporter {
        courses: Vec<ImportedCourse>,
    }

    #[async_trait]
    impl SheetImporter for StaticImporter {
        async fn import(&self, _url: &str) -> Vec<ImportedCourse> {
            self.courses.clone()
        }
    }

    struct Fixture {
        bot: Bot,
        db: Arc<Database>,
        gateway: Arc<RecordingGateway>,
    }

    fn fixture_with_importer(importer: StaticImporter) -> Fixture {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let gateway = Arc::new(RecordingGateway::default());
        let bot = Bot::new(
            db.clone(),
            gateway.clone(),
            Arc::new(importer),
            FixedOffset::east_opt(3 * 3600).unwrap(),
        );
        Fixture { bot, db, gateway }
    }

    fn fixture() -> Fixture {
        fixture_with_importer(StaticImporter::default())
    }

    async fn send(f: &Fixture, user_id: UserId, text: &str) {
        f.bot
            .handle_update(Update {
                user_id,
                incoming: Incoming::from_text(text),
            })
            .await
            .unwrap();
    }

    async fn press(f: &Fixture, user_id: UserId, data: &str) {
        f.bot
            .handle_update(Update {
                user_id,
                incoming: Incoming::Callback(data.to_string()),
            })
            .await
            .unwrap();
    }

    fn seed_user(f: &Fixture, user_id: UserId, role: Role) {
        f.db.create_user(user_id).unwrap();
        f.db.set_nickname(user_id, &format!("user{}", user_id)).unwrap();
        f.db.set_signup(user_id, SignupState::Done).unwrap();
        f.db.set_role(user_id, role).unwrap();
    }

    fn seed_course(f: &Fixture, owner: UserId) -> CourseId {
        f.db.insert_course(
            "Rust basics",
            owner,
            "hunter2",
            NaiveDate::from_ymd_opt(2099, 1, 1).unwrap(),
            "https://docs.google.com/spreadsheets/d/abc",
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn signup_collects_nickname() {
        let f = fixture();

        send(&f, 7, "/start").await;
        send(&f, 7, "Alice").await;

        let user = f.db.get_user(7).unwrap().unwrap().into_user().unwrap();
        assert_eq!(user.nickname.as_deref(), Some("Alice"));
        assert_eq!(user.signup, SignupState::Done);

        let texts = f.gateway.texts_for(7);
        assert!(texts[0].contains("nickname"));
        assert!(texts[1].contains("Alice"));
    }

    #[tokio::test]
    async fn overlong_nickname_is_rejected() {
        let f = fixture();
        send(&f, 7, "/start").await;
        send(&f, 7, &"x".repeat(64)).await;

        let user = f.db.get_user(7).unwrap().unwrap().into_user().unwrap();
        assert_eq!(user.nickname, None);
        assert_eq!(user.signup, SignupState::CollectingName);
    }

    #[tokio::test]
    async fn enroll_flow_checks_secret() {
        let f = fixture();
        seed_user(&f, 1, Role::Operator);
        seed_user(&f, 7, Role::Member);
        let course = seed_course(&f, 1);

        send(&f, 7, "/enroll").await;
        assert!(f.gateway.last_keyboard().is_some());

        press(&f, 7, &format!("enroll:{}", course)).await;
        send(&f, 7, "wrong").await;
        assert_eq!(f.db.current_week(7, course).unwrap(), None);

        send(&f, 7, "hunter2").await;
        assert_eq!(f.db.current_week(7, course).unwrap(), Some(0));
    }

    #[tokio::test]
    async fn member_cannot_import_courses() {
        let f = fixture();
        seed_user(&f, 7, Role::Member);

        send(&f, 7, "/addcourse").await;

        let texts = f.gateway.texts_for(7);
        assert!(texts[0].contains("permission"));
    }

    #[tokio::test]
    async fn addcourse_flow_imports_and_stores() {
        let importer = StaticImporter {
            courses: vec![ImportedCourse {
                name: "Rust basics".into(),
                skills: vec![SkillSpec {
                    name: "Ownership".into(),
                    link: "https://doc.rs/own".into(),
                    week_number: 1,
                    start_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
                    end_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
                }],
            }],
        };
        let f = fixture_with_importer(importer);
        seed_user(&f, 1, Role::Operator);

        send(&f, 1, "/addcourse").await;
        send(&f, 1, "https://docs.google.com/spreadsheets/d/abc").await;
        send(&f, 1, "hunter2").await;
        send(&f, 1, "not-a-date").await;
        send(&f, 1, "2026-06-01").await;

        let courses = f.db.list_courses().unwrap();
        assert_eq!(courses.len(), 1);
        assert_eq!(courses[0].name, "Rust basics");
        assert_eq!(f.db.skills_for_week(courses[0].id, 1).unwrap().len(), 1);

        let texts = f.gateway.texts_for(1);
        assert!(texts.iter().any(|t| t.contains("Invalid date")));
        assert!(texts.last().unwrap().contains("All courses"));
    }

    #[tokio::test]
    async fn failed_import_creates_nothing() {
        let f = fixture();
        seed_user(&f, 1, Role::Operator);

        send(&f, 1, "/addcourse").await;
        send(&f, 1, "https://example.com/not-a-sheet").await;

        assert!(f.db.list_courses().unwrap().is_empty());
        let texts = f.gateway.texts_for(1);
        assert!(texts.last().unwrap().contains("Could not read"));
    }

    #[tokio::test]
    async fn appointment_flow_validates_inputs() {
        let f = fixture();
        seed_user(&f, 1, Role::Operator);
        seed_user(&f, 42, Role::Member);
        let course = seed_course(&f, 1);
        f.db.enroll(42, course).unwrap();

        send(&f, 1, "/set_appointment").await;
        press(&f, 1, "student:42").await;
        press(&f, 1, &format!("acourse:{}", course)).await;
        send(&f, 1, "Funday").await;
        send(&f, 1, "Monday").await;
        send(&f, 1, "25:99").await;
        send(&f, 1, "15:00").await;

        let appts = f.db.appointments_for_student(42).unwrap();
        assert_eq!(appts.len(), 1);
        let appt = appts.into_iter().next().unwrap().into_appointment().unwrap();
        assert_eq!(appt.weekday, Weekday::Mon);
        assert_eq!(appt.course_id, course);
        assert_eq!(appt.teacher_id, 1);
    }

    #[tokio::test]
    async fn announcement_reaches_enrolled_students() {
        let f = fixture();
        seed_user(&f, 1, Role::Operator);
        seed_user(&f, 42, Role::Member);
        seed_user(&f, 43, Role::Member);
        let course = seed_course(&f, 1);
        f.db.enroll(42, course).unwrap();
        f.db.enroll(43, course).unwrap();

        send(&f, 1, "/announce").await;
        send(&f, 1, &format!("{} class moved to 16:00", course)).await;

        assert!(f.gateway.texts_for(42)[0].contains("class moved"));
        assert!(f.gateway.texts_for(43)[0].contains("class moved"));
        assert!(f.gateway.texts_for(1).last().unwrap().contains("2 student(s)"));
    }

    #[tokio::test]
    async fn homework_submit_and_review() {
        let f = fixture();
        seed_user(&f, 1, Role::Operator);
        seed_user(&f, 42, Role::Member);
        let course = seed_course(&f, 1);
        f.db.enroll(42, course).unwrap();

        send(&f, 42, "/submit_homework").await;
        press(&f, 42, &format!("hw:{}", course)).await;
        send(&f, 42, "https://example.com/hw1").await;

        send(&f, 1, "/view_homework").await;
        press(&f, 1, &format!("viewhw:{}", course)).await;

        let review = f.gateway.texts_for(1).last().unwrap().clone();
        assert!(review.contains("user42"));
        assert!(review.contains("https://example.com/hw1"));
    }

    #[tokio::test]
    async fn stray_text_gets_a_hint() {
        let f = fixture();
        seed_user(&f, 7, Role::Member);

        send(&f, 7, "hello there").await;

        assert!(f.gateway.texts_for(7)[0].contains("/menu"));
    }
}
