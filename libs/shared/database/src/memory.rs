use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use shared_models::clinic::{
    Booking, BookingStatus, NewAppointment, NewFilterSet, Patient, Provider, StoredFilterSet,
};
use shared_models::filters::FilterField;

use crate::store::{ClinicStore, StoreError};

#[derive(Default)]
struct Tables {
    patients: HashMap<Uuid, Patient>,
    providers: HashMap<Uuid, Provider>,
    bookings: Vec<Booking>,
    filter_sets: HashMap<Uuid, StoredFilterSet>,
    retired_fields: HashSet<FilterField>,
}

/// Process-local clinic store. Used when no PostgREST backend is configured and in tests.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    fail_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_patient(&self, full_name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.tables.write().await.patients.insert(
            id,
            Patient { id, full_name: full_name.to_string() },
        );
        id
    }

    pub async fn add_provider(&self, full_name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.tables.write().await.providers.insert(
            id,
            Provider { id, full_name: full_name.to_string() },
        );
        id
    }

    pub async fn add_booking(
        &self,
        patient_id: Uuid,
        dentist_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.tables.write().await.bookings.push(Booking {
            id,
            patient_id,
            dentist_id,
            start_time,
            end_time,
            status: BookingStatus::Confirmed,
        });
        id
    }

    /// Removes a field from the live research schema.
    pub async fn retire_field(&self, field: FilterField) {
        self.tables.write().await.retired_fields.insert(field);
    }

    /// Makes every subsequent write fail with a backend error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn bookings_for(&self, dentist_id: Uuid) -> Vec<Booking> {
        self.tables
            .read()
            .await
            .bookings
            .iter()
            .filter(|b| b.dentist_id == dentist_id)
            .cloned()
            .collect()
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("write rejected by storage backend".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ClinicStore for InMemoryStore {
    async fn find_patient(&self, patient_id: Uuid) -> Result<Option<Patient>, StoreError> {
        Ok(self.tables.read().await.patients.get(&patient_id).cloned())
    }

    async fn find_provider(&self, dentist_id: Uuid) -> Result<Option<Provider>, StoreError> {
        Ok(self.tables.read().await.providers.get(&dentist_id).cloned())
    }

    async fn find_providers_by_name(&self, name: &str) -> Result<Vec<Provider>, StoreError> {
        let needle = name.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .tables
            .read()
            .await
            .providers
            .values()
            .filter(|p| p.full_name.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn list_bookings_in_window(
        &self,
        dentist_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Booking>, StoreError> {
        let tables = self.tables.read().await;
        let mut bookings: Vec<Booking> = tables
            .bookings
            .iter()
            .filter(|b| b.dentist_id == dentist_id && b.overlaps(start, end))
            .cloned()
            .collect();
        bookings.sort_by_key(|b| b.start_time);
        Ok(bookings)
    }

    async fn create_appointment(&self, appointment: NewAppointment) -> Result<Uuid, StoreError> {
        self.check_writable()?;

        // Check and insert under one write lock.
        let mut tables = self.tables.write().await;
        let conflicting: Vec<Uuid> = tables
            .bookings
            .iter()
            .filter(|b| {
                b.dentist_id == appointment.dentist_id
                    && b.status.is_active()
                    && b.overlaps(appointment.start_time, appointment.end_time)
            })
            .map(|b| b.id)
            .collect();

        if !conflicting.is_empty() {
            return Err(StoreError::Conflict(conflicting));
        }

        let id = Uuid::new_v4();
        tables.bookings.push(Booking {
            id,
            patient_id: appointment.patient_id,
            dentist_id: appointment.dentist_id,
            start_time: appointment.start_time,
            end_time: appointment.end_time,
            status: BookingStatus::Pending,
        });
        debug!("Stored appointment {} for dentist {}", id, appointment.dentist_id);
        Ok(id)
    }

    async fn create_filter_set(&self, filter_set: NewFilterSet) -> Result<Uuid, StoreError> {
        self.check_writable()?;

        let id = Uuid::new_v4();
        self.tables.write().await.filter_sets.insert(
            id,
            StoredFilterSet {
                id,
                owner_id: filter_set.owner_id,
                filters: filter_set.filters,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn get_filter_set(&self, id: Uuid) -> Result<Option<StoredFilterSet>, StoreError> {
        Ok(self.tables.read().await.filter_sets.get(&id).cloned())
    }

    async fn live_filter_fields(&self) -> Result<Vec<FilterField>, StoreError> {
        let tables = self.tables.read().await;
        Ok(FilterField::ALL
            .into_iter()
            .filter(|f| !tables.retired_fields.contains(f))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, h, m, 0).unwrap()
    }

    #[tokio::test]
    async fn test_create_appointment_rejects_overlap() {
        let store = InMemoryStore::new();
        let patient = store.add_patient("Ana Costa").await;
        let dentist = store.add_provider("Dr. Rui Lopes").await;
        let existing = store.add_booking(patient, dentist, at(10, 0), at(10, 30)).await;

        let result = store
            .create_appointment(NewAppointment {
                patient_id: patient,
                dentist_id: dentist,
                consultation_id: None,
                start_time: at(10, 15),
                end_time: at(10, 45),
                reason: None,
            })
            .await;
        assert_matches!(result, Err(StoreError::Conflict(ids)) if ids == vec![existing]);

        let result = store
            .create_appointment(NewAppointment {
                patient_id: patient,
                dentist_id: dentist,
                consultation_id: None,
                start_time: at(10, 30),
                end_time: at(11, 0),
                reason: Some("cleaning".into()),
            })
            .await;
        assert!(result.is_ok());
        assert_eq!(store.bookings_for(dentist).await.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_trace() {
        let store = InMemoryStore::new();
        let dentist = store.add_provider("Dr. Rui Lopes").await;
        store.set_fail_writes(true);

        let result = store
            .create_appointment(NewAppointment {
                patient_id: Uuid::new_v4(),
                dentist_id: dentist,
                consultation_id: None,
                start_time: at(9, 0),
                end_time: at(9, 30),
                reason: None,
            })
            .await;
        assert_matches!(result, Err(StoreError::Backend(_)));
        assert!(store.bookings_for(dentist).await.is_empty());
    }

    #[tokio::test]
    async fn test_retired_fields_leave_live_schema() {
        let store = InMemoryStore::new();
        store.retire_field(FilterField::Smoker).await;
        let fields = store.live_filter_fields().await.unwrap();
        assert!(!fields.contains(&FilterField::Smoker));
        assert!(fields.contains(&FilterField::Age));
    }

    #[tokio::test]
    async fn test_provider_name_search() {
        let store = InMemoryStore::new();
        let id = store.add_provider("Dr. Marta Silva").await;
        store.add_provider("Dr. Rui Lopes").await;

        let found = store.find_providers_by_name("silva").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, id);
        assert!(store.find_providers_by_name("  ").await.unwrap().is_empty());
    }
}
