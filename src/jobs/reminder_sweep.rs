use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::BTreeSet;
use std::ops::AddAssign;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::app::dispatch::Dispatcher;
use crate::app::email::compose_reminder;
use crate::app::reminders::{
    appointment_instant, classify, reminder_push_payload, ReminderKind, ReminderSettings,
};
use crate::app::tokens::TokenRegistry;
use crate::domain::appointment::{Appointment, ReminderChannel};
use crate::domain::user::User;
use crate::infra::queue::MailQueue;
use crate::infra::repos::{AppointmentRepo, UserRepo};
use crate::AppState;

/// Counters for one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub users_scanned: usize,
    pub appointments_scanned: usize,
    pub emails_sent: usize,
    pub pushes_sent: usize,
    pub pushes_without_devices: usize,
    pub skipped_malformed: usize,
    pub failures: usize,
    pub tokens_pruned: usize,
}

impl AddAssign for SweepReport {
    fn add_assign(&mut self, other: Self) {
        self.users_scanned += other.users_scanned;
        self.appointments_scanned += other.appointments_scanned;
        self.emails_sent += other.emails_sent;
        self.pushes_sent += other.pushes_sent;
        self.pushes_without_devices += other.pushes_without_devices;
        self.skipped_malformed += other.skipped_malformed;
        self.failures += other.failures;
        self.tokens_pruned += other.tokens_pruned;
    }
}

/// Scans every user's appointments and sends the reminders that are due.
///
/// Each channel of each appointment moves from unsent to sent at most once;
/// the flag is written only after the mail queue or at least one device
/// accepted the reminder, so failed sends are retried by the next sweep.
/// Overlapping sweeps are not guarded against.
#[derive(Clone)]
pub struct ReminderSweep {
    users: Arc<dyn UserRepo>,
    appointments: Arc<dyn AppointmentRepo>,
    tokens: TokenRegistry,
    dispatcher: Dispatcher,
    mail: Arc<dyn MailQueue>,
    settings: ReminderSettings,
}

impl ReminderSweep {
    pub fn new(state: &AppState) -> Self {
        Self {
            users: state.users.clone(),
            appointments: state.appointments.clone(),
            tokens: state.token_registry(),
            dispatcher: state.dispatcher(),
            mail: state.mail.clone(),
            settings: state.reminders.clone(),
        }
    }

    /// Runs one sweep as of `now`. Only failing to list users aborts it.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let users = self.users.list_users().await?;

        let reports: Vec<SweepReport> = stream::iter(users)
            .map(|user| self.sweep_user(user, now))
            .buffer_unordered(self.settings.sweep_concurrency.max(1))
            .collect()
            .await;

        let mut report = SweepReport::default();
        for user_report in reports {
            report += user_report;
        }

        info!(
            users = report.users_scanned,
            appointments = report.appointments_scanned,
            emails_sent = report.emails_sent,
            pushes_sent = report.pushes_sent,
            pushes_without_devices = report.pushes_without_devices,
            skipped_malformed = report.skipped_malformed,
            failures = report.failures,
            tokens_pruned = report.tokens_pruned,
            "reminder sweep finished"
        );
        Ok(report)
    }

    async fn sweep_user(&self, user: User, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport {
            users_scanned: 1,
            ..SweepReport::default()
        };

        let appointments = match self.appointments.list_for_user(user.id).await {
            Ok(appointments) => appointments,
            Err(err) => {
                warn!(error = ?err, user_id = %user.id, "failed to load appointments");
                report.failures += 1;
                return report;
            }
        };

        // loaded on first push-eligible appointment, kept in sync with pruning
        let mut tokens: Option<BTreeSet<String>> = None;

        for appointment in appointments {
            report.appointments_scanned += 1;

            let kinds = match classify(now, &appointment, self.settings.timezone) {
                Ok(kinds) => kinds,
                Err(err) => {
                    warn!(
                        error = %err,
                        user_id = %user.id,
                        appointment_id = %appointment.id,
                        "skipping appointment with unreadable date/time"
                    );
                    report.skipped_malformed += 1;
                    continue;
                }
            };

            for kind in kinds.iter() {
                if appointment.reminder_sent(kind.channel()) {
                    continue;
                }
                match kind {
                    ReminderKind::DayBefore => {
                        self.send_email_reminder(&user, &appointment, &mut report)
                            .await
                    }
                    ReminderKind::HourBefore => {
                        self.send_push_reminder(&user, &appointment, &mut tokens, &mut report)
                            .await
                    }
                }
            }
        }

        report
    }

    async fn send_email_reminder(
        &self,
        user: &User,
        appointment: &Appointment,
        report: &mut SweepReport,
    ) {
        let message = match compose_reminder(user, appointment, &self.settings) {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, appointment_id = %appointment.id, "cannot compose reminder email");
                report.skipped_malformed += 1;
                return;
            }
        };

        if let Err(err) = self.mail.enqueue(&message).await {
            warn!(
                error = ?err,
                user_id = %user.id,
                appointment_id = %appointment.id,
                "failed to enqueue reminder email, will retry next sweep"
            );
            report.failures += 1;
            return;
        }

        report.emails_sent += 1;
        info!(user_id = %user.id, appointment_id = %appointment.id, "reminder email queued");
        self.mark_sent(appointment, ReminderChannel::Email, report).await;
    }

    async fn send_push_reminder(
        &self,
        user: &User,
        appointment: &Appointment,
        tokens: &mut Option<BTreeSet<String>>,
        report: &mut SweepReport,
    ) {
        if tokens.is_none() {
            match self.tokens.list_tokens(user.id).await {
                Ok(loaded) => *tokens = Some(loaded),
                Err(err) => {
                    warn!(error = ?err, user_id = %user.id, "failed to load device tokens");
                    report.failures += 1;
                    return;
                }
            }
        }
        let Some(user_tokens) = tokens.as_mut() else {
            return;
        };

        if user_tokens.is_empty() {
            // the hour-before window closes before the next sweep, so a later
            // retry could never fire; settle the channel instead
            info!(
                user_id = %user.id,
                appointment_id = %appointment.id,
                "no registered devices, marking push reminder as settled"
            );
            report.pushes_without_devices += 1;
            self.mark_sent(appointment, ReminderChannel::Push, report).await;
            return;
        }

        let instant = match appointment_instant(&appointment.date, &appointment.time, self.settings.timezone) {
            Ok(instant) => instant,
            Err(err) => {
                warn!(error = %err, appointment_id = %appointment.id, "cannot build reminder push");
                report.skipped_malformed += 1;
                return;
            }
        };
        let payload = reminder_push_payload(appointment, &instant, &self.settings);
        let dispatch = self.dispatcher.send(user_tokens, &payload).await;

        if self.settings.prune_invalid_tokens {
            let invalid = dispatch.invalid_tokens();
            if !invalid.is_empty() {
                match self.tokens.remove_tokens(user.id, &invalid).await {
                    Ok(removed) => {
                        info!(user_id = %user.id, removed, "pruned invalid device tokens");
                        report.tokens_pruned += removed as usize;
                        for token in &invalid {
                            user_tokens.remove(token);
                        }
                    }
                    Err(err) => {
                        warn!(error = ?err, user_id = %user.id, "failed to prune invalid device tokens");
                    }
                }
            }
        }

        if !dispatch.is_success() {
            warn!(
                user_id = %user.id,
                appointment_id = %appointment.id,
                attempted = dispatch.attempted,
                "reminder push reached no device, will retry next sweep"
            );
            report.failures += 1;
            return;
        }

        report.pushes_sent += 1;
        info!(
            user_id = %user.id,
            appointment_id = %appointment.id,
            attempted = dispatch.attempted,
            succeeded = dispatch.succeeded,
            "reminder push sent"
        );
        self.mark_sent(appointment, ReminderChannel::Push, report).await;
    }

    async fn mark_sent(
        &self,
        appointment: &Appointment,
        channel: ReminderChannel,
        report: &mut SweepReport,
    ) {
        match self
            .appointments
            .mark_reminder_sent(appointment.id, channel)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                debug!(
                    appointment_id = %appointment.id,
                    channel = channel.as_str(),
                    "appointment gone or already flagged"
                );
            }
            Err(err) => {
                error!(
                    error = ?err,
                    appointment_id = %appointment.id,
                    channel = channel.as_str(),
                    "reminder sent but flag not persisted, next sweep may repeat it"
                );
                report.failures += 1;
            }
        }
    }
}

/// Runs the sweep on a fixed interval until the task is dropped.
pub async fn run(sweep: ReminderSweep, every: Duration) -> Result<()> {
    info!(interval_seconds = every.as_secs(), "reminder sweep scheduler started");
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(err) = sweep.run_once(Utc::now()).await {
            error!(error = ?err, "reminder sweep failed");
        }
    }
}
