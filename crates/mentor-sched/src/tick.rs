//! The scheduler loop. One tick scans every enrolled user's
//! appointments, fires whatever thresholds are crossed and approved by
//! the ledger, and on the one-hour-after firing advances the course week
//! and releases that week's skills.
//!
//! Delivery is at-least-once: a crash between send and ledger write can
//! repeat one notification after restart, never lose persistent state.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, FixedOffset, Utc};
use tracing::{debug, info, warn};

use mentor_db::Database;
use mentor_types::models::{Appointment, CourseId, UserId};

use crate::AppContext;
use crate::occurrence::next_occurrence;
use crate::threshold::{LEDGER_COOLDOWN_DAYS, Threshold};

#[derive(Debug, Default, Clone, Copy)]
pub struct TickStats {
    pub notifications_sent: usize,
    pub weeks_advanced: usize,
}

/// Runs for the process lifetime. Ticks never overlap: the next tick
/// waits for the previous body to finish.
pub async fn run_scheduler_loop(ctx: Arc<AppContext>, tick_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(tick_secs));
    info!("scheduler running, tick every {}s", tick_secs);

    loop {
        interval.tick().await;

        let now = Utc::now().with_timezone(&ctx.tz);
        match run_tick(&ctx, now).await {
            Ok(stats) if stats.notifications_sent > 0 => {
                info!(
                    "tick: {} notification(s) sent, {} week(s) advanced",
                    stats.notifications_sent, stats.weeks_advanced
                );
            }
            Ok(_) => {}
            Err(e) => warn!("tick failed: {:#}", e),
        }
    }
}

/// One pass over all users with at least one enrollment. Store errors
/// abort the tick; a failure around a single appointment is logged and
/// skipped so the rest of the scan still runs.
pub async fn run_tick(ctx: &AppContext, now: DateTime<FixedOffset>) -> Result<TickStats> {
    let mut stats = TickStats::default();

    let users = ctx.db.users_with_enrollments()?;
    debug!("tick: scanning {} user(s)", users.len());

    for user_id in users {
        for row in ctx.db.appointments_for_student(user_id)? {
            let appointment = match row.into_appointment() {
                Ok(a) => a,
                Err(e) => {
                    warn!("skipping unreadable appointment for {}: {:#}", user_id, e);
                    continue;
                }
            };

            if let Err(e) = process_appointment(ctx, &appointment, now, &mut stats).await {
                warn!(
                    "notifications for user {} appointment {} failed: {:#}",
                    user_id, appointment.id, e
                );
            }
        }
    }

    Ok(stats)
}

async fn process_appointment(
    ctx: &AppContext,
    appointment: &Appointment,
    now: DateTime<FixedOffset>,
    stats: &mut TickStats,
) -> Result<()> {
    let occurrence = next_occurrence(appointment.weekday, appointment.time, now);
    let delta_secs = (occurrence - now).num_seconds();
    let student = appointment.student_id;
    let course = appointment.course_id;

    for threshold in Threshold::ALL {
        if !threshold.is_crossed(delta_secs) {
            continue;
        }
        if !should_fire(&ctx.db, student, course, threshold, now.with_timezone(&Utc))? {
            debug!(
                "ledger suppressed {} for user {} course {}",
                threshold.kind(),
                student,
                course
            );
            continue;
        }

        let time_label = appointment.time.format("%H:%M").to_string();
        ctx.gateway
            .send_text(student, &threshold.message(&time_label))
            .await?;
        ctx.db
            .record_notification(student, course, threshold.kind(), now.with_timezone(&Utc))?;
        stats.notifications_sent += 1;
        info!(
            "sent {} to user {} for course {}",
            threshold.kind(),
            student,
            course
        );

        if threshold == Threshold::OneHourAfter {
            ctx.db.advance_week(student, course)?;
            stats.weeks_advanced += 1;
            send_skill_digest(ctx, student, course, now).await?;
        }
    }

    Ok(())
}

/// Ledger gate: fire when the key has never fired, or its last firing is
/// at least a full cooldown old.
pub fn should_fire(
    db: &Database,
    user_id: UserId,
    course_id: CourseId,
    threshold: Threshold,
    now: DateTime<Utc>,
) -> Result<bool> {
    Ok(match db.last_notification(user_id, course_id, threshold.kind())? {
        None => true,
        Some(last) => (now - last).num_days() >= LEDGER_COOLDOWN_DAYS,
    })
}

/// Release the new week's skills as a single digest message.
///
/// The marker is once-ever per (user, course): after any digest has gone
/// out, no later week will ever send another one. Weeks with no skills
/// send nothing and leave the marker unset.
pub async fn send_skill_digest(
    ctx: &AppContext,
    user_id: UserId,
    course_id: CourseId,
    now: DateTime<FixedOffset>,
) -> Result<()> {
    if ctx.db.has_skill_digest(user_id, course_id)? {
        return Ok(());
    }

    let Some(week) = ctx.db.current_week(user_id, course_id)? else {
        return Ok(());
    };
    let skills = ctx.db.skills_for_week(course_id, week)?;
    if skills.is_empty() {
        return Ok(());
    }

    let mut text = String::from("Material to study this week:\n");
    let lines: Vec<String> = skills
        .iter()
        .map(|s| format!("{}: {}", s.name, s.link))
        .collect();
    text.push_str(&lines.join("\n"));

    ctx.gateway.send_text(user_id, &text).await?;
    ctx.db
        .record_skill_digest(user_id, course_id, now.with_timezone(&Utc))?;
    info!(
        "skill digest for week {} sent to user {} (course {})",
        week, user_id, course_id
    );
    Ok(())
}
