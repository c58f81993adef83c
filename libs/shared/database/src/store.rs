use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use shared_models::clinic::{Booking, NewAppointment, NewFilterSet, Patient, Provider, StoredFilterSet};
use shared_models::filters::FilterField;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Booking collides with existing booking(s): {0:?}")]
    Conflict(Vec<Uuid>),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Backend(format!("Failed to decode record: {}", err))
    }
}

/// Entity lookup/create operations the intake pipeline needs from the relational store.
#[async_trait]
pub trait ClinicStore: Send + Sync {
    async fn find_patient(&self, patient_id: Uuid) -> Result<Option<Patient>, StoreError>;

    async fn find_provider(&self, dentist_id: Uuid) -> Result<Option<Provider>, StoreError>;

    /// Case-insensitive substring search on the provider's name.
    async fn find_providers_by_name(&self, name: &str) -> Result<Vec<Provider>, StoreError>;

    /// Bookings for the provider that intersect `[start, end)`.
    async fn list_bookings_in_window(
        &self,
        dentist_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Booking>, StoreError>;

    /// Creates the appointment unless an active booking overlaps it, in which case
    /// `StoreError::Conflict` is returned and nothing is written.
    async fn create_appointment(&self, appointment: NewAppointment) -> Result<Uuid, StoreError>;

    async fn create_filter_set(&self, filter_set: NewFilterSet) -> Result<Uuid, StoreError>;

    async fn get_filter_set(&self, id: Uuid) -> Result<Option<StoredFilterSet>, StoreError>;

    /// Filter fields currently present in the research schema.
    async fn live_filter_fields(&self) -> Result<Vec<FilterField>, StoreError>;
}
