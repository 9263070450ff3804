// libs/doctor-cell/src/services/availability.rs
use chrono::{Datelike, Duration, NaiveDate, NaiveTime};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use cache_cell::DirectoryCache;
use shared_database::RecordStore;
use shared_models::{
    error::AppError, weekday_index, weekday_name, AppointmentFilter, AppointmentStatus, Availability,
    AvailabilityWindow, Identity, Role, SortOrder,
};
use shared_utils::validation::parse_time;

use crate::models::{AvailabilityEntry, DayProjection, DoctorError, TimeWindow};

pub const MAX_PROJECTION_DAYS: u32 = 60;

pub struct AvailabilityService {
    store: Arc<dyn RecordStore>,
    cache: Arc<DirectoryCache>,
}

impl AvailabilityService {
    pub fn new(store: Arc<dyn RecordStore>, cache: Arc<DirectoryCache>) -> Self {
        Self { store, cache }
    }

    /// Replace the doctor's whole weekly schedule.
    ///
    /// Days outside 0..=6 and days without both times are skipped. Any
    /// malformed time or any window with start >= end rejects the entire
    /// submission and leaves the stored schedule untouched.
    #[instrument(skip(self, identity, entries), fields(entries = entries.len()))]
    pub async fn set_weekly_availability(
        &self,
        identity: &Identity,
        doctor_id: i64,
        entries: Vec<AvailabilityEntry>,
    ) -> Result<Vec<Availability>, DoctorError> {
        if identity.role != Role::Doctor || identity.user_id != doctor_id {
            return Err(DoctorError::Unauthorized(
                "Doctors can only edit their own availability".to_string(),
            ));
        }
        self.require_doctor(doctor_id).await?;

        let windows = validate_entries(&entries)?;
        let stored = self.store.replace_availability(doctor_id, windows).await?;

        self.cache.invalidate_doctor_availability(doctor_id).await;

        info!("Doctor {} availability set to {} windows", doctor_id, stored.len());
        Ok(stored)
    }

    /// The stored schedule, read straight from the record store.
    pub async fn get_weekly_availability(&self, doctor_id: i64) -> Result<Vec<Availability>, DoctorError> {
        Ok(self.store.list_availability(doctor_id).await?)
    }

    /// The patient-facing schedule, served through the cache.
    pub async fn get_published_availability(&self, doctor_id: i64) -> Result<Vec<Availability>, DoctorError> {
        Ok(self.cache.doctor_availability(doctor_id).await?)
    }

    /// One entry per day for the `n` days following `from_date`, with the
    /// weekday's windows and the times already booked on that date.
    ///
    /// Advisory only: booking admission is decided by the conflict checker.
    pub async fn project_next_n_days(
        &self,
        doctor_id: i64,
        n: u32,
        from_date: NaiveDate,
    ) -> Result<Vec<DayProjection>, DoctorError> {
        self.require_doctor(doctor_id).await?;

        let n = n.clamp(1, MAX_PROJECTION_DAYS) as i64;
        let first = from_date + Duration::days(1);
        let last = from_date + Duration::days(n);

        let schedule = self.cache.doctor_availability(doctor_id).await?;
        let mut by_day: BTreeMap<u8, Vec<TimeWindow>> = BTreeMap::new();
        for row in schedule {
            by_day.entry(row.day_of_week).or_default().push(TimeWindow {
                start_time: row.start_time,
                end_time: row.end_time,
            });
        }

        let filter = AppointmentFilter::for_doctor(doctor_id)
            .with_status(AppointmentStatus::Booked)
            .between(first, last);
        let booked = self
            .store
            .find_appointments(filter, SortOrder::Ascending, None)
            .await?;
        let mut booked_by_date: BTreeMap<NaiveDate, Vec<NaiveTime>> = BTreeMap::new();
        for appointment in booked {
            booked_by_date.entry(appointment.date).or_default().push(appointment.time);
        }

        let projection = (1..=n)
            .map(|offset| {
                let date = from_date + Duration::days(offset);
                let day = weekday_index(date.weekday());
                let windows = by_day.get(&day).cloned().unwrap_or_default();
                DayProjection {
                    date,
                    day_name: weekday_name(day).unwrap_or_default().to_string(),
                    has_availability: !windows.is_empty(),
                    windows,
                    booked_times: booked_by_date.remove(&date).unwrap_or_default(),
                }
            })
            .collect::<Vec<_>>();

        debug!("Projected {} days for doctor {}", projection.len(), doctor_id);
        Ok(projection)
    }

    async fn require_doctor(&self, doctor_id: i64) -> Result<(), DoctorError> {
        match self.store.get_user(doctor_id).await? {
            Some(user) if user.is_doctor() => Ok(()),
            _ => Err(DoctorError::NotFound),
        }
    }
}

/// Turns a raw submission into at most one window per weekday; a later entry
/// for the same day replaces an earlier one.
fn validate_entries(entries: &[AvailabilityEntry]) -> Result<Vec<AvailabilityWindow>, DoctorError> {
    let mut windows: BTreeMap<u8, AvailabilityWindow> = BTreeMap::new();

    for entry in entries {
        let Some(day) = u8::try_from(entry.day_of_week).ok().filter(|d| *d <= 6) else {
            debug!("Skipping out-of-range day {}", entry.day_of_week);
            continue;
        };
        let (Some(start), Some(end)) = (
            entry.start_time.as_deref().filter(|s| !s.trim().is_empty()),
            entry.end_time.as_deref().filter(|s| !s.trim().is_empty()),
        ) else {
            continue;
        };

        let day_name = weekday_name(day).unwrap_or_default();
        let invalid_format = |_: AppError| {
            DoctorError::ValidationError(format!("Invalid time format for {}. Use HH:MM", day_name))
        };
        let start_time = parse_time("start_time", start).map_err(invalid_format)?;
        let end_time = parse_time("end_time", end).map_err(invalid_format)?;

        if start_time >= end_time {
            return Err(DoctorError::ValidationError(format!(
                "Invalid time range for {}: start time must be before end time",
                day_name
            )));
        }

        windows.insert(
            day,
            AvailabilityWindow {
                day_of_week: day,
                start_time,
                end_time,
            },
        );
    }

    Ok(windows.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn skips_days_off_and_out_of_range_days() {
        let windows = validate_entries(&[
            AvailabilityEntry::new(0, "09:00", "17:00"),
            AvailabilityEntry::day_off(1),
            AvailabilityEntry::new(7, "09:00", "17:00"),
            AvailabilityEntry::new(-1, "09:00", "17:00"),
            AvailabilityEntry {
                day_of_week: 2,
                start_time: Some("  ".to_string()),
                end_time: Some("12:00".to_string()),
            },
        ])
        .expect("Failed to validate entries");

        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].day_of_week, 0);
    }

    #[test]
    fn later_entry_for_same_day_wins() {
        let windows = validate_entries(&[
            AvailabilityEntry::new(3, "09:00", "12:00"),
            AvailabilityEntry::new(3, "13:00", "18:00"),
        ])
        .expect("Failed to validate entries");

        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].start_time, NaiveTime::from_hms_opt(13, 0, 0).expect("valid time"));
    }

    #[test]
    fn inverted_window_names_the_day() {
        let result = validate_entries(&[
            AvailabilityEntry::new(0, "09:00", "17:00"),
            AvailabilityEntry::new(2, "17:00", "09:00"),
        ]);

        assert_matches!(result, Err(DoctorError::ValidationError(msg)) if msg.contains("Wednesday"));
    }

    #[test]
    fn equal_start_and_end_is_rejected() {
        let result = validate_entries(&[AvailabilityEntry::new(4, "10:00", "10:00")]);
        assert_matches!(result, Err(DoctorError::ValidationError(_)));
    }

    #[test]
    fn malformed_time_is_rejected() {
        let result = validate_entries(&[AvailabilityEntry::new(4, "9am", "17:00")]);
        assert_matches!(result, Err(DoctorError::ValidationError(msg)) if msg.contains("Friday"));
    }
}
