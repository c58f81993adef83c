use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tracing::{debug, error};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::clinic::{Booking, NewAppointment, NewFilterSet, Patient, Provider, StoredFilterSet};
use shared_models::filters::FilterField;

use crate::store::{ClinicStore, StoreError};

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
    service_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
            service_key: config.supabase_service_key.clone(),
        }
    }

    fn get_headers(&self) -> Result<HeaderMap, StoreError> {
        let mut headers = HeaderMap::new();

        let invalid = |_| StoreError::Backend("Store credentials contain invalid header characters".to_string());

        headers.insert("apikey", HeaderValue::from_str(&self.anon_key).map_err(invalid)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let token = if self.service_key.is_empty() { &self.anon_key } else { &self.service_key };
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).map_err(invalid)?,
        );

        Ok(headers)
    }

    pub async fn request<T>(&self, method: Method, path: &str, body: Option<Value>) -> Result<T, StoreError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making request to {}", url);

        let mut req = self.client.request(method, &url).headers(self.get_headers()?);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Store API error ({}): {}", status, error_text);

            return Err(match status.as_u16() {
                404 => StoreError::NotFound(error_text),
                409 => StoreError::Conflict(Vec::new()),
                _ => StoreError::Backend(format!("API error ({}): {}", status, error_text)),
            });
        }

        let data = response.json::<T>().await?;
        Ok(data)
    }
}

#[derive(Debug, Deserialize)]
struct BookingRpcResult {
    id: Option<Uuid>,
    #[serde(default)]
    conflicting_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
struct FieldRow {
    name: String,
}

/// `ClinicStore` backed by the Supabase PostgREST API.
///
/// Appointment creation goes through the `book_appointment_if_free` RPC, which
/// re-checks overlaps inside the database transaction before inserting.
pub struct SupabaseStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    async fn first<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, StoreError> {
        let rows: Vec<T> = self.supabase.request(Method::GET, path, None).await?;
        Ok(rows.into_iter().next())
    }
}

fn encode_time(time: DateTime<Utc>) -> String {
    urlencoding::encode(&time.to_rfc3339()).into_owned()
}

#[async_trait]
impl ClinicStore for SupabaseStore {
    async fn find_patient(&self, patient_id: Uuid) -> Result<Option<Patient>, StoreError> {
        let path = format!("/rest/v1/patients?id=eq.{}&select=id,full_name", patient_id);
        self.first(&path).await
    }

    async fn find_provider(&self, dentist_id: Uuid) -> Result<Option<Provider>, StoreError> {
        let path = format!("/rest/v1/dentists?id=eq.{}&select=id,full_name", dentist_id);
        self.first(&path).await
    }

    async fn find_providers_by_name(&self, name: &str) -> Result<Vec<Provider>, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(Vec::new());
        }
        let path = format!(
            "/rest/v1/dentists?full_name=ilike.*{}*&select=id,full_name",
            urlencoding::encode(name)
        );
        self.supabase.request(Method::GET, &path, None).await
    }

    async fn list_bookings_in_window(
        &self,
        dentist_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Booking>, StoreError> {
        let path = format!(
            "/rest/v1/appointments?dentist_id=eq.{}&start_time=lt.{}&end_time=gt.{}&order=start_time.asc",
            dentist_id,
            encode_time(end),
            encode_time(start),
        );
        self.supabase.request(Method::GET, &path, None).await
    }

    async fn create_appointment(&self, appointment: NewAppointment) -> Result<Uuid, StoreError> {
        let body = json!({
            "p_patient_id": appointment.patient_id,
            "p_dentist_id": appointment.dentist_id,
            "p_consultation_id": appointment.consultation_id,
            "p_start_time": appointment.start_time.to_rfc3339(),
            "p_end_time": appointment.end_time.to_rfc3339(),
            "p_reason": appointment.reason,
        });

        let result: BookingRpcResult = self
            .supabase
            .request(Method::POST, "/rest/v1/rpc/book_appointment_if_free", Some(body))
            .await?;

        if !result.conflicting_ids.is_empty() {
            return Err(StoreError::Conflict(result.conflicting_ids));
        }

        result
            .id
            .ok_or_else(|| StoreError::Backend("Booking RPC returned neither id nor conflicts".to_string()))
    }

    async fn create_filter_set(&self, filter_set: NewFilterSet) -> Result<Uuid, StoreError> {
        let body = json!({
            "owner_id": filter_set.owner_id,
            "filters": filter_set.filters,
        });

        let rows: Vec<StoredFilterSet> = self
            .supabase
            .request(Method::POST, "/rest/v1/filter_sets", Some(body))
            .await?;

        rows.into_iter()
            .next()
            .map(|row| row.id)
            .ok_or_else(|| StoreError::Backend("Failed to save filter set".to_string()))
    }

    async fn get_filter_set(&self, id: Uuid) -> Result<Option<StoredFilterSet>, StoreError> {
        let path = format!("/rest/v1/filter_sets?id=eq.{}", id);
        self.first(&path).await
    }

    async fn live_filter_fields(&self) -> Result<Vec<FilterField>, StoreError> {
        let rows: Vec<FieldRow> = self
            .supabase
            .request(Method::GET, "/rest/v1/filter_fields?active=is.true&select=name", None)
            .await?;

        Ok(rows
            .iter()
            .filter_map(|row| FilterField::from_name(&row.name))
            .collect())
    }
}
