use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shared_config::AppConfig;
use shared_database::{ClinicStore, StoreError, SupabaseStore};
use shared_models::clinic::{NewAppointment, NewFilterSet};
use shared_models::filters::{FilterCriterion, FilterField, FilterOperator, FilterSet, FilterValue};

fn config_for(server: &MockServer) -> AppConfig {
    AppConfig {
        supabase_url: server.uri(),
        supabase_anon_key: "test-anon-key".to_string(),
        supabase_service_key: "test-service-key".to_string(),
        ..AppConfig::default()
    }
}

fn appointment(dentist_id: Uuid) -> NewAppointment {
    NewAppointment {
        patient_id: Uuid::new_v4(),
        dentist_id,
        consultation_id: None,
        start_time: Utc.with_ymd_and_hms(2024, 6, 4, 15, 0, 0).unwrap(),
        end_time: Utc.with_ymd_and_hms(2024, 6, 4, 15, 30, 0).unwrap(),
        reason: Some("Broken filling".to_string()),
    }
}

#[tokio::test]
async fn test_find_patient_returns_first_row() {
    let mock_server = MockServer::start().await;
    let patient_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .and(query_param("id", format!("eq.{}", patient_id)))
        .and(header("Authorization", "Bearer test-service-key"))
        .and(header("apikey", "test-anon-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": patient_id, "full_name": "Ana Costa" }
        ])))
        .mount(&mock_server)
        .await;

    let store = SupabaseStore::new(&config_for(&mock_server));
    let patient = store.find_patient(patient_id).await.unwrap().unwrap();
    assert_eq!(patient.full_name, "Ana Costa");
}

#[tokio::test]
async fn test_missing_patient_is_none() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let store = SupabaseStore::new(&config_for(&mock_server));
    assert!(store.find_patient(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_booking_rpc_reports_conflicts() {
    let mock_server = MockServer::start().await;
    let dentist_id = Uuid::new_v4();
    let colliding = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/book_appointment_if_free"))
        .and(body_partial_json(json!({ "p_dentist_id": dentist_id })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": null,
            "conflicting_ids": [colliding]
        })))
        .mount(&mock_server)
        .await;

    let store = SupabaseStore::new(&config_for(&mock_server));
    let result = store.create_appointment(appointment(dentist_id)).await;
    assert_matches!(result, Err(StoreError::Conflict(ids)) if ids == vec![colliding]);
}

#[tokio::test]
async fn test_booking_rpc_returns_created_id() {
    let mock_server = MockServer::start().await;
    let created = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/book_appointment_if_free"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": created })))
        .mount(&mock_server)
        .await;

    let store = SupabaseStore::new(&config_for(&mock_server));
    let id = store.create_appointment(appointment(Uuid::new_v4())).await.unwrap();
    assert_eq!(id, created);
}

#[tokio::test]
async fn test_server_error_is_backend_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/book_appointment_if_free"))
        .respond_with(ResponseTemplate::new(500).set_body_string("connection pool exhausted"))
        .mount(&mock_server)
        .await;

    let store = SupabaseStore::new(&config_for(&mock_server));
    let result = store.create_appointment(appointment(Uuid::new_v4())).await;
    assert_matches!(result, Err(StoreError::Backend(msg)) if msg.contains("connection pool exhausted"));
}

#[tokio::test]
async fn test_filter_set_round_trip_through_rows() {
    let mock_server = MockServer::start().await;
    let id = Uuid::new_v4();
    let filters = FilterSet::new(vec![
        FilterCriterion::new(
            FilterField::Age,
            FilterOperator::Between,
            FilterValue::NumberRange { min: 30.0, max: 50.0 },
            0.9,
        )
        .unwrap(),
        FilterCriterion::new(
            FilterField::Diagnosis,
            FilterOperator::Contains,
            FilterValue::Text("periodontitis".into()),
            0.8,
        )
        .unwrap(),
    ]);
    let row = json!([{
        "id": id,
        "owner_id": null,
        "filters": filters,
        "created_at": "2024-06-03T09:00:00Z"
    }]);

    Mock::given(method("POST"))
        .and(path("/rest/v1/filter_sets"))
        .and(header("Prefer", "return=representation"))
        .respond_with(ResponseTemplate::new(201).set_body_json(row.clone()))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/filter_sets"))
        .and(query_param("id", format!("eq.{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(row))
        .mount(&mock_server)
        .await;

    let store = SupabaseStore::new(&config_for(&mock_server));
    let created = store
        .create_filter_set(NewFilterSet { owner_id: None, filters: filters.clone() })
        .await
        .unwrap();
    assert_eq!(created, id);

    let stored = store.get_filter_set(id).await.unwrap().unwrap();
    assert!(stored.filters.same_criteria(&filters));
}

#[tokio::test]
async fn test_live_fields_ignore_unknown_columns() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/filter_fields"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "name": "age" },
            { "name": "treatment_type" },
            { "name": "insurance_tier" }
        ])))
        .mount(&mock_server)
        .await;

    let store = SupabaseStore::new(&config_for(&mock_server));
    let fields = store.live_filter_fields().await.unwrap();
    assert_eq!(fields, vec![FilterField::Age, FilterField::TreatmentType]);
}
