// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, warn};

use shared_models::{AppointmentStatus, Role};

use crate::models::{AppointmentError, Transition};

/// `booked` is the only initial state; `completed` and `cancelled` are
/// terminal except that a patient may still cancel a completed visit.
#[derive(Debug, Default, Clone, Copy)]
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Who may perform the transition.
    pub fn actor(&self, transition: Transition) -> Role {
        match transition {
            Transition::Reschedule | Transition::PatientCancel => Role::Patient,
            Transition::DoctorComplete | Transition::DoctorCancel => Role::Doctor,
        }
    }

    pub fn allowed_from(&self, transition: Transition) -> &'static [AppointmentStatus] {
        match transition {
            Transition::Reschedule | Transition::DoctorComplete | Transition::DoctorCancel => {
                &[AppointmentStatus::Booked]
            }
            Transition::PatientCancel => &[AppointmentStatus::Booked, AppointmentStatus::Completed],
        }
    }

    pub fn target(&self, transition: Transition) -> AppointmentStatus {
        match transition {
            Transition::Reschedule => AppointmentStatus::Booked,
            Transition::DoctorComplete => AppointmentStatus::Completed,
            Transition::PatientCancel | Transition::DoctorCancel => AppointmentStatus::Cancelled,
        }
    }

    /// Transitions available from `current`.
    pub fn get_valid_transitions(&self, current: AppointmentStatus) -> Vec<Transition> {
        [
            Transition::Reschedule,
            Transition::PatientCancel,
            Transition::DoctorComplete,
            Transition::DoctorCancel,
        ]
        .into_iter()
        .filter(|t| self.allowed_from(*t).contains(&current))
        .collect()
    }

    /// Returns the resulting status, or the rejection for this transition.
    pub fn validate_status_transition(
        &self,
        transition: Transition,
        current: AppointmentStatus,
    ) -> Result<AppointmentStatus, AppointmentError> {
        if !self.allowed_from(transition).contains(&current) {
            warn!("Rejected {} from {}", transition, current);
            return Err(AppointmentError::transition_rejected(transition, current));
        }

        let next = self.target(transition);
        debug!("Transition {}: {} -> {}", transition, current, next);
        Ok(next)
    }

    /// Maps a doctor's requested status onto a named transition.
    pub fn doctor_transition_for(&self, status: &str) -> Result<Transition, AppointmentError> {
        match status.trim().parse::<AppointmentStatus>() {
            Ok(AppointmentStatus::Completed) => Ok(Transition::DoctorComplete),
            Ok(AppointmentStatus::Cancelled) => Ok(Transition::DoctorCancel),
            _ => Err(AppointmentError::ValidationError(
                "Status must be completed or cancelled".to_string(),
            )),
        }
    }
}
