// libs/intake-cell/src/services/commit.rs
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use extraction_cell::models::{AppointmentIntent, AppointmentTime, MAX_DURATION_MINUTES};
use shared_database::{ClinicStore, StoreError};
use shared_models::clinic::{NewAppointment, NewFilterSet, Provider};
use shared_models::error::ErrorKind;
use shared_models::filters::{FilterField, FilterSet};

use crate::models::{CommitContext, CommitResult};

/// Resolves extracted payloads against live records and performs the single create.
///
/// Never returns `Err`: every failure is folded into a [`CommitResult`].
pub struct CommitResolver {
    store: Arc<dyn ClinicStore>,
    min_confidence: f32,
    provider_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl CommitResolver {
    pub fn new(store: Arc<dyn ClinicStore>, min_confidence: f32) -> Self {
        Self {
            store,
            min_confidence: min_confidence.clamp(0.0, 1.0),
            provider_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Auto-commit path: ambiguous or low-confidence intents are rejected.
    pub async fn commit_appointment(&self, intent: &AppointmentIntent, context: &CommitContext) -> CommitResult {
        if exact_slot(intent).is_none() {
            return self.finish(ambiguous_time());
        }
        if intent.confidence < self.min_confidence {
            return self.finish(CommitResult::rejected(
                ErrorKind::ConfirmationRequired,
                format!(
                    "Extraction confidence {:.2} is below the auto-commit threshold of {:.2}",
                    intent.confidence, self.min_confidence
                ),
            ));
        }
        self.commit(intent, context).await
    }

    /// Explicit confirmation path: the user pinned the start time, so the
    /// confidence threshold no longer applies.
    pub async fn commit_confirmed_appointment(
        &self,
        intent: AppointmentIntent,
        confirmed_start: DateTime<Utc>,
        context: &CommitContext,
    ) -> CommitResult {
        if !intent.has_plausible_duration() {
            return self.finish(implausible_duration(intent.duration_minutes));
        }
        let Some(intent) = intent.confirm(confirmed_start) else {
            return self.finish(CommitResult::rejected(
                ErrorKind::InvalidInput,
                "confirmed_start is out of range",
            ));
        };
        self.commit(&intent, context).await
    }

    async fn commit(&self, intent: &AppointmentIntent, context: &CommitContext) -> CommitResult {
        let Some((start, end)) = exact_slot(intent) else {
            return self.finish(ambiguous_time());
        };
        if let Err(result) = check_slot(intent, start, end) {
            return self.finish(result);
        }

        let Some(patient_id) = context.patient_id else {
            return self.finish(CommitResult::rejected(ErrorKind::InvalidInput, "patient_id is required"));
        };
        match self.store.find_patient(patient_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                return self.finish(CommitResult::rejected(
                    ErrorKind::UnknownEntity,
                    format!("Patient {} does not exist", patient_id),
                ))
            }
            Err(err) => return self.finish(storage_error(err)),
        }

        let provider = match self.resolve_provider(intent, context).await {
            Ok(provider) => provider,
            Err(result) => return self.finish(result),
        };

        // Check and create run under one per-provider lock; the store's create is
        // itself conflict-checked for writers outside this process.
        let lock = self.provider_lock(provider.id).await;
        let _guard = lock.lock().await;

        match self.store.list_bookings_in_window(provider.id, start, end).await {
            Ok(bookings) => {
                let colliding: Vec<Uuid> = bookings
                    .iter()
                    .filter(|b| b.status.is_active() && b.overlaps(start, end))
                    .map(|b| b.id)
                    .collect();
                if !colliding.is_empty() {
                    return self.finish(CommitResult::conflict(colliding));
                }
            }
            Err(err) => return self.finish(storage_error(err)),
        }

        let appointment = NewAppointment {
            patient_id,
            dentist_id: provider.id,
            consultation_id: context.consultation_id,
            start_time: start,
            end_time: end,
            reason: intent.reason.clone(),
        };

        self.finish(match self.store.create_appointment(appointment).await {
            Ok(id) => CommitResult::created(id),
            Err(err) => storage_error(err),
        })
    }

    async fn resolve_provider(&self, intent: &AppointmentIntent, context: &CommitContext) -> Result<Provider, CommitResult> {
        if let Some(dentist_id) = context.dentist_id {
            return match self.store.find_provider(dentist_id).await {
                Ok(Some(provider)) => Ok(provider),
                Ok(None) => Err(CommitResult::rejected(
                    ErrorKind::UnknownEntity,
                    format!("Dentist {} does not exist", dentist_id),
                )),
                Err(err) => Err(storage_error(err)),
            };
        }

        let Some(name) = intent.provider.as_deref().map(str::trim).filter(|n| !n.is_empty()) else {
            return Err(CommitResult::rejected(
                ErrorKind::InvalidInput,
                "dentist_id is required when no dentist was named",
            ));
        };

        let search = name.trim_start_matches("Dr.").trim_start_matches("Dr ").trim();
        let mut matches = match self.store.find_providers_by_name(search).await {
            Ok(matches) => matches,
            Err(err) => return Err(storage_error(err)),
        };

        match matches.len() {
            1 => Ok(matches.remove(0)),
            0 => Err(CommitResult::rejected(
                ErrorKind::UnknownEntity,
                format!("No dentist matches '{}'", name),
            )),
            n => Err(CommitResult::rejected(
                ErrorKind::UnknownEntity,
                format!("'{}' matches {} dentists; pass dentist_id", name, n),
            )),
        }
    }

    async fn provider_lock(&self, provider_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.provider_locks.lock().await;
        Arc::clone(locks.entry(provider_id).or_default())
    }

    pub async fn commit_filter_set(&self, filters: &FilterSet, context: &CommitContext) -> CommitResult {
        if filters.is_empty() {
            return self.finish(CommitResult::rejected(ErrorKind::InvalidInput, "The filter set has no criteria"));
        }

        if let Some(err) = filters.criteria.iter().find_map(|c| c.check().err()) {
            return self.finish(CommitResult::rejected(ErrorKind::InvalidInput, err.to_string()));
        }

        let live = match self.store.live_filter_fields().await {
            Ok(live) => live,
            Err(err) => return self.finish(storage_error(err)),
        };
        let stale: Vec<FilterField> = filters.fields().into_iter().filter(|f| !live.contains(f)).collect();
        if !stale.is_empty() {
            let names: Vec<&str> = stale.iter().map(FilterField::as_str).collect();
            return self.finish(CommitResult::rejected(
                ErrorKind::UnknownField,
                format!("Field(s) no longer available: {}", names.join(", ")),
            ));
        }

        let new_set = NewFilterSet {
            owner_id: context.owner_id,
            filters: filters.clone(),
        };

        self.finish(match self.store.create_filter_set(new_set).await {
            Ok(id) => CommitResult::created(id),
            Err(err) => storage_error(err),
        })
    }

    fn finish(&self, result: CommitResult) -> CommitResult {
        match (&result.entity_id, &result.reason) {
            (Some(id), _) => info!("Commit created {}", id),
            (None, Some(reason)) if reason.kind == ErrorKind::StorageFailure => {
                error!("Commit failed: {}", reason.cause.as_deref().unwrap_or("unknown cause"))
            }
            (None, Some(reason)) => warn!("Commit {:?}: {}", result.outcome, reason.message),
            (None, None) => {}
        }
        result
    }
}

fn exact_slot(intent: &AppointmentIntent) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    match (&intent.when, intent.needs_confirmation) {
        (AppointmentTime::Exact { start, end }, false) => Some((*start, *end)),
        _ => None,
    }
}

/// A booking must span exactly its stated duration, forwards in time.
fn check_slot(intent: &AppointmentIntent, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), CommitResult> {
    if !intent.has_plausible_duration() {
        return Err(implausible_duration(intent.duration_minutes));
    }
    if end <= start {
        return Err(CommitResult::rejected(
            ErrorKind::InvalidInput,
            "The appointment must end after it starts",
        ));
    }
    if end - start != Duration::minutes(intent.duration_minutes) {
        return Err(CommitResult::rejected(
            ErrorKind::InvalidInput,
            format!("The appointment span does not match its {} minute duration", intent.duration_minutes),
        ));
    }
    Ok(())
}

fn implausible_duration(minutes: i64) -> CommitResult {
    CommitResult::rejected(
        ErrorKind::InvalidInput,
        format!("duration_minutes must be between 1 and {}, got {}", MAX_DURATION_MINUTES, minutes),
    )
}

fn ambiguous_time() -> CommitResult {
    CommitResult::rejected(
        ErrorKind::ConfirmationRequired,
        "The appointment time is ambiguous and must be confirmed before booking",
    )
}

fn storage_error(err: StoreError) -> CommitResult {
    match err {
        StoreError::Conflict(ids) => CommitResult::conflict(ids),
        other => CommitResult::error(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CommitOutcome;
    use assert_matches::assert_matches;
    use chrono::Duration;
    use shared_database::InMemoryStore;
    use shared_models::filters::{FilterCriterion, FilterOperator, FilterValue};
    use shared_utils::test_utils::utc;

    fn intent_at(start: DateTime<Utc>, minutes: i64) -> AppointmentIntent {
        AppointmentIntent {
            when: AppointmentTime::Exact { start, end: start + Duration::minutes(minutes) },
            time_expression: None,
            provider: None,
            reason: Some("cleaning".to_string()),
            duration_minutes: minutes,
            confidence: 0.9,
            needs_confirmation: false,
            rationale: String::new(),
            dropped_fields: vec![],
        }
    }

    struct Clinic {
        store: Arc<InMemoryStore>,
        resolver: CommitResolver,
        context: CommitContext,
    }

    async fn clinic() -> Clinic {
        let store = Arc::new(InMemoryStore::new());
        let patient_id = store.add_patient("Ana Costa").await;
        let dentist_id = store.add_provider("Dr. Joana Okafor").await;
        Clinic {
            resolver: CommitResolver::new(store.clone(), 0.5),
            store,
            context: CommitContext {
                patient_id: Some(patient_id),
                dentist_id: Some(dentist_id),
                ..CommitContext::default()
            },
        }
    }

    #[tokio::test]
    async fn test_overlap_conflicts_and_adjacent_succeeds() {
        let c = clinic().await;
        let dentist = c.context.dentist_id.unwrap();
        let existing = c
            .store
            .add_booking(Uuid::new_v4(), dentist, utc(2024, 6, 4, 10, 0), utc(2024, 6, 4, 10, 30))
            .await;

        let result = c.resolver.commit_appointment(&intent_at(utc(2024, 6, 4, 10, 15), 30), &c.context).await;
        assert_eq!(result.outcome, CommitOutcome::Conflict);
        assert_eq!(result.reason.unwrap().conflicting_ids, vec![existing]);

        let result = c.resolver.commit_appointment(&intent_at(utc(2024, 6, 4, 10, 30), 30), &c.context).await;
        assert!(result.is_created());
        assert_eq!(c.store.bookings_for(dentist).await.len(), 2);
    }

    #[tokio::test]
    async fn test_inverted_or_mismatched_slot_is_rejected() {
        let c = clinic().await;
        let dentist = c.context.dentist_id.unwrap();
        c.store
            .add_booking(Uuid::new_v4(), dentist, utc(2024, 6, 4, 10, 0), utc(2024, 6, 4, 10, 30))
            .await;

        let mut inverted = intent_at(utc(2024, 6, 4, 10, 15), 30);
        inverted.when = AppointmentTime::Exact { start: utc(2024, 6, 4, 10, 15), end: utc(2024, 6, 4, 10, 0) };
        let result = c.resolver.commit_appointment(&inverted, &c.context).await;
        assert_eq!(result.reason_kind(), Some(ErrorKind::InvalidInput));

        let mut empty = intent_at(utc(2024, 6, 4, 10, 15), 30);
        empty.when = AppointmentTime::Exact { start: utc(2024, 6, 4, 10, 15), end: utc(2024, 6, 4, 10, 15) };
        let result = c.resolver.commit_appointment(&empty, &c.context).await;
        assert_eq!(result.reason_kind(), Some(ErrorKind::InvalidInput));

        let mut stretched = intent_at(utc(2024, 6, 4, 11, 0), 30);
        stretched.when = AppointmentTime::Exact { start: utc(2024, 6, 4, 11, 0), end: utc(2024, 6, 4, 14, 0) };
        let result = c.resolver.commit_appointment(&stretched, &c.context).await;
        assert_eq!(result.reason_kind(), Some(ErrorKind::InvalidInput));

        let zero_length = intent_at(utc(2024, 6, 4, 10, 15), 0);
        let result = c.resolver.commit_appointment(&zero_length, &c.context).await;
        assert_eq!(result.reason_kind(), Some(ErrorKind::InvalidInput));

        assert_eq!(c.store.bookings_for(dentist).await.len(), 1);
    }

    #[tokio::test]
    async fn test_confirmed_commit_rejects_implausible_duration() {
        let c = clinic().await;
        let mut intent = intent_at(utc(2024, 6, 4, 10, 0), 30);
        intent.when = AppointmentTime::Unresolved;
        intent.needs_confirmation = true;
        intent.duration_minutes = 9_000_000_000_000_000;

        let result = c
            .resolver
            .commit_confirmed_appointment(intent.clone(), utc(2024, 6, 4, 10, 0), &c.context)
            .await;
        assert_eq!(result.outcome, CommitOutcome::Rejected);
        assert_eq!(result.reason_kind(), Some(ErrorKind::InvalidInput));

        intent.duration_minutes = -30;
        let result = c
            .resolver
            .commit_confirmed_appointment(intent, utc(2024, 6, 4, 10, 0), &c.context)
            .await;
        assert_eq!(result.reason_kind(), Some(ErrorKind::InvalidInput));
        assert!(c.store.bookings_for(c.context.dentist_id.unwrap()).await.is_empty());
    }

    #[tokio::test]
    async fn test_needs_confirmation_is_rejected() {
        let c = clinic().await;
        let mut intent = intent_at(utc(2024, 6, 4, 10, 0), 30);
        intent.needs_confirmation = true;

        let result = c.resolver.commit_appointment(&intent, &c.context).await;
        assert_eq!(result.outcome, CommitOutcome::Rejected);
        assert_eq!(result.reason_kind(), Some(ErrorKind::ConfirmationRequired));

        intent.when = AppointmentTime::Window { start: utc(2024, 6, 10, 8, 0), end: utc(2024, 6, 16, 20, 0) };
        let result = c.resolver.commit_confirmed_appointment(intent, utc(2024, 6, 11, 9, 0), &c.context).await;
        assert!(result.is_created());
    }

    #[tokio::test]
    async fn test_low_confidence_needs_confirmation() {
        let c = clinic().await;
        let mut intent = intent_at(utc(2024, 6, 4, 10, 0), 30);
        intent.confidence = 0.2;

        let result = c.resolver.commit_appointment(&intent, &c.context).await;
        assert_eq!(result.reason_kind(), Some(ErrorKind::ConfirmationRequired));

        let result = c.resolver.commit_confirmed_appointment(intent, utc(2024, 6, 4, 10, 0), &c.context).await;
        assert!(result.is_created());
    }

    #[tokio::test]
    async fn test_unknown_entities() {
        let c = clinic().await;
        let intent = intent_at(utc(2024, 6, 4, 10, 0), 30);

        let context = CommitContext { patient_id: Some(Uuid::new_v4()), ..c.context.clone() };
        let result = c.resolver.commit_appointment(&intent, &context).await;
        assert_eq!(result.reason_kind(), Some(ErrorKind::UnknownEntity));

        let context = CommitContext { dentist_id: Some(Uuid::new_v4()), ..c.context.clone() };
        let result = c.resolver.commit_appointment(&intent, &context).await;
        assert_eq!(result.reason_kind(), Some(ErrorKind::UnknownEntity));

        let context = CommitContext { patient_id: None, ..c.context.clone() };
        let result = c.resolver.commit_appointment(&intent, &context).await;
        assert_eq!(result.reason_kind(), Some(ErrorKind::InvalidInput));
    }

    #[tokio::test]
    async fn test_provider_resolved_by_name() {
        let c = clinic().await;
        let context = CommitContext { dentist_id: None, ..c.context.clone() };

        let mut intent = intent_at(utc(2024, 6, 4, 11, 0), 30);
        intent.provider = Some("Dr. Okafor".to_string());
        let result = c.resolver.commit_appointment(&intent, &context).await;
        assert!(result.is_created());

        c.store.add_provider("Dr. Bruno Okafor").await;
        let result = c.resolver.commit_appointment(&intent_at(utc(2024, 6, 4, 12, 0), 30), &context).await;
        assert_eq!(result.reason_kind(), Some(ErrorKind::InvalidInput));

        intent.when = AppointmentTime::Exact { start: utc(2024, 6, 4, 13, 0), end: utc(2024, 6, 4, 13, 30) };
        let result = c.resolver.commit_appointment(&intent, &context).await;
        assert_eq!(result.reason_kind(), Some(ErrorKind::UnknownEntity));
    }

    #[tokio::test]
    async fn test_storage_failure_is_error_without_write() {
        let c = clinic().await;
        c.store.set_fail_writes(true);

        let result = c.resolver.commit_appointment(&intent_at(utc(2024, 6, 4, 10, 0), 30), &c.context).await;
        assert_eq!(result.outcome, CommitOutcome::Error);
        assert_matches!(result.reason, Some(reason) if reason.cause.is_some());
        assert!(c.store.bookings_for(c.context.dentist_id.unwrap()).await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_commits_for_one_slot() {
        let c = clinic().await;
        let resolver = Arc::new(c.resolver);
        let context = c.context.clone();

        let attempts = (0..8).map(|_| {
            let resolver = Arc::clone(&resolver);
            let context = context.clone();
            tokio::spawn(async move {
                resolver
                    .commit_appointment(&intent_at(utc(2024, 6, 5, 9, 0), 30), &context)
                    .await
            })
        });
        let results: Vec<CommitResult> = futures::future::join_all(attempts)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        assert_eq!(results.iter().filter(|r| r.is_created()).count(), 1);
        assert!(results
            .iter()
            .filter(|r| !r.is_created())
            .all(|r| r.outcome == CommitOutcome::Conflict));
    }

    fn cohort() -> FilterSet {
        FilterSet::new(vec![
            FilterCriterion::new(
                FilterField::Age,
                FilterOperator::Between,
                FilterValue::NumberRange { min: 30.0, max: 50.0 },
                0.9,
            )
            .unwrap(),
            FilterCriterion::new(FilterField::Smoker, FilterOperator::Equals, FilterValue::Flag(true), 0.8).unwrap(),
        ])
    }

    #[tokio::test]
    async fn test_filter_set_round_trip() {
        let c = clinic().await;
        let filters = cohort();

        let result = c.resolver.commit_filter_set(&filters, &c.context).await;
        let id = result.entity_id.unwrap();

        let stored = c.store.get_filter_set(id).await.unwrap().unwrap();
        let mut reordered = stored.filters.clone();
        reordered.criteria.reverse();
        assert!(reordered.same_criteria(&filters));
    }

    #[tokio::test]
    async fn test_retired_field_is_unknown() {
        let c = clinic().await;
        c.store.retire_field(FilterField::Smoker).await;

        let result = c.resolver.commit_filter_set(&cohort(), &c.context).await;
        assert_eq!(result.reason_kind(), Some(ErrorKind::UnknownField));
        assert!(result.reason.unwrap().message.contains("smoker"));
    }

    #[tokio::test]
    async fn test_invalid_filter_sets_are_rejected() {
        let c = clinic().await;

        let result = c.resolver.commit_filter_set(&FilterSet::default(), &c.context).await;
        assert_eq!(result.reason_kind(), Some(ErrorKind::InvalidInput));

        let mut broken = cohort();
        broken.criteria[0].operator = FilterOperator::Contains;
        let result = c.resolver.commit_filter_set(&broken, &c.context).await;
        assert_eq!(result.reason_kind(), Some(ErrorKind::InvalidInput));
    }
}
