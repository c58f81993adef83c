// libs/shared/models/src/clinic.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::filters::FilterSet;

// ==============================================================================
// EXISTING ENTITIES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub full_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub id: Uuid,
    pub full_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl BookingStatus {
    /// Only active bookings occupy a provider's time.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            BookingStatus::Pending | BookingStatus::Confirmed | BookingStatus::InProgress
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub dentist_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: BookingStatus,
}

impl Booking {
    /// Half-open overlap: a booking ending at 10:30 does not collide with one starting at 10:30.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_time < end && start < self.end_time
    }
}

// ==============================================================================
// RECORDS CREATED BY THE INTAKE PIPELINE
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAppointment {
    pub patient_id: Uuid,
    pub dentist_id: Uuid,
    pub consultation_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFilterSet {
    pub owner_id: Option<Uuid>,
    pub filters: FilterSet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFilterSet {
    pub id: Uuid,
    pub owner_id: Option<Uuid>,
    pub filters: FilterSet,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, h, m, 0).unwrap()
    }

    fn booking(start: DateTime<Utc>, end: DateTime<Utc>) -> Booking {
        Booking {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            dentist_id: Uuid::new_v4(),
            start_time: start,
            end_time: end,
            status: BookingStatus::Confirmed,
        }
    }

    #[test]
    fn test_overlap_is_half_open() {
        let existing = booking(at(10, 0), at(10, 30));
        assert!(existing.overlaps(at(10, 15), at(10, 45)));
        assert!(existing.overlaps(at(9, 45), at(10, 1)));
        assert!(!existing.overlaps(at(10, 30), at(11, 0)));
        assert!(!existing.overlaps(at(9, 30), at(10, 0)));
    }

    #[test]
    fn test_cancelled_bookings_are_inactive() {
        assert!(BookingStatus::Pending.is_active());
        assert!(!BookingStatus::Cancelled.is_active());
        assert!(!BookingStatus::NoShow.is_active());
    }
}
