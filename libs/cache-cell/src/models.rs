use serde::{Deserialize, Serialize};

/// Key holding the JSON array of every doctor account.
pub const DOCTORS_LIST_KEY: &str = "doctors_list";
pub const DOCTORS_LIST_TTL_SECONDS: u64 = 3600;
pub const DOCTOR_AVAILABILITY_TTL_SECONDS: u64 = 21600;

pub fn doctor_availability_key(doctor_id: i64) -> String {
    format!("doctor_availability_{}", doctor_id)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub invalidations: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}
