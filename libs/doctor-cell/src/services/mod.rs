pub mod availability;
pub mod doctor;
pub mod practice;

pub use availability::AvailabilityService;
pub use doctor::DoctorService;
pub use practice::PracticeService;
