// libs/appointment-sync-cell/src/services/projection.rs
//! Pure derivations over an appointment set. No state, no I/O: the same
//! inputs always produce the same output.

use chrono::{DateTime, TimeZone, Utc};

use crate::models::{Appointment, AppointmentStatus, StatusCounts, TriageView, ViewState};

/// True when the appointment falls on the same local calendar day as `now`.
pub fn is_today<Tz: TimeZone>(appointment: &Appointment, now: &DateTime<Tz>) -> bool {
    appointment
        .scheduled_at
        .with_timezone(&now.timezone())
        .date_naive()
        == now.date_naive()
}

/// Per-status counts plus the `today` and `upcoming` aggregates over
/// PENDING and CONFIRMED appointments. Statuses without a triage tab only
/// contribute to `total`.
pub fn count_by_status<Tz: TimeZone>(appointments: &[Appointment], now: &DateTime<Tz>) -> StatusCounts {
    let now_utc = now.with_timezone(&Utc);
    let mut counts = StatusCounts {
        total: appointments.len(),
        ..StatusCounts::default()
    };

    for appointment in appointments {
        match appointment.status {
            AppointmentStatus::Pending => counts.pending += 1,
            AppointmentStatus::Confirmed => counts.confirmed += 1,
            AppointmentStatus::Cancelled => counts.cancelled += 1,
            AppointmentStatus::Completed | AppointmentStatus::Other => {}
        }

        if appointment.status.is_active() {
            if is_today(appointment, now) {
                counts.today += 1;
            }
            if appointment.scheduled_at > now_utc {
                counts.upcoming += 1;
            }
        }
    }

    counts
}

/// Case-insensitive substring match on patient name, patient id or reason.
/// A blank query matches everything.
pub fn matches_query(appointment: &Appointment, query: &str) -> bool {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }

    [
        appointment.patient_name.as_deref(),
        Some(appointment.patient_id.as_str()),
        appointment.reason.as_deref(),
    ]
    .into_iter()
    .flatten()
    .any(|field| field.to_lowercase().contains(&needle))
}

/// Records of `active_tab` matching `query`: today's first, then by time,
/// then by id so ties never depend on input order.
pub fn filtered_sorted<Tz: TimeZone>(
    appointments: &[Appointment],
    active_tab: AppointmentStatus,
    query: &str,
    now: &DateTime<Tz>,
) -> Vec<Appointment> {
    let mut visible: Vec<(bool, &Appointment)> = appointments
        .iter()
        .filter(|a| a.status == active_tab)
        .filter(|a| matches_query(a, query))
        .map(|a| (is_today(a, now), a))
        .collect();

    visible.sort_by(|(a_today, a), (b_today, b)| {
        b_today
            .cmp(a_today)
            .then_with(|| a.scheduled_at.cmp(&b.scheduled_at))
            .then_with(|| a.id.cmp(&b.id))
    });

    visible.into_iter().map(|(_, a)| a.clone()).collect()
}

pub fn triage_view<Tz: TimeZone>(
    appointments: &[Appointment],
    view: &ViewState,
    now: &DateTime<Tz>,
) -> TriageView {
    TriageView {
        active_tab: view.active_tab,
        search_query: view.search_query.clone(),
        counts: count_by_status(appointments, now),
        appointments: filtered_sorted(appointments, view.active_tab, &view.search_query, now),
    }
}
