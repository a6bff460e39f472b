//! Per-user conversation state. Multi-step flows are an explicit state
//! machine: one `FlowState` per user, transient flow data carried inside
//! the variant. This map is in-memory only — losing it on restart drops
//! half-finished conversations, never persistent data.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::Weekday;
use mentor_sheets::ImportedCourse;
use mentor_types::models::{CourseId, UserId};

#[derive(Debug, Clone)]
pub enum FlowState {
    /// New user picking a nickname.
    AwaitingNickname,

    // Course import (operator+): URL, then per-course secret and deadline.
    AddCourseUrl,
    AddCourseSecret {
        sheet_url: String,
        courses: Vec<ImportedCourse>,
        index: usize,
    },
    AddCourseDeadline {
        sheet_url: String,
        courses: Vec<ImportedCourse>,
        index: usize,
        secret: String,
    },

    // Enrollment.
    EnrollSelect,
    EnrollSecret {
        course_id: CourseId,
    },
    UnenrollSelect,

    // Homework.
    SubmitHomeworkSelect,
    SubmitHomeworkLink {
        course_id: CourseId,
    },
    ViewHomeworkSelect,

    // Appointment setup (operator+).
    SetAppointmentStudent,
    SetAppointmentCourse {
        student_id: UserId,
    },
    SetAppointmentWeekday {
        student_id: UserId,
        course_id: CourseId,
    },
    SetAppointmentTime {
        student_id: UserId,
        course_id: CourseId,
        weekday: Weekday,
    },

    // Role management (admin).
    SetRoleUser,
    SetRoleValue {
        target: UserId,
    },

    // Announcements (operator+).
    AnnounceDetails,
}

/// User id -> current flow state. Absent means idle.
#[derive(Default)]
pub struct Sessions {
    inner: Mutex<HashMap<UserId, FlowState>>,
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: UserId) -> Option<FlowState> {
        self.lock().get(&user_id).cloned()
    }

    pub fn set(&self, user_id: UserId, state: FlowState) {
        self.lock().insert(user_id, state);
    }

    pub fn clear(&self, user_id: UserId) {
        self.lock().remove(&user_id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<UserId, FlowState>> {
        // Flow state is disposable, so a poisoned map is still usable.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
