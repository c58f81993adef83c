use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, warn};

use extraction_cell::services::dates;
use extraction_cell::services::{LanguageModel, SchemaHint};

use crate::models::Intent;

#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, query: &str) -> Intent;
}

// ==============================================================================
// KEYWORD CLASSIFIER
// ==============================================================================

const SCHEDULING_STRONG: &[&str] = &[
    "book", "booking", "schedule", "reschedule", "appointment", "appointments", "appt", "slot", "reserve",
];

const FILTER_STRONG: &[&str] = &[
    "patients", "cohort", "filter", "filters", "criteria", "research", "study", "population", "subjects",
];

const FILTER_WEAK: &[&str] = &[
    "age", "aged", "older", "younger", "over", "under", "years", "male", "female", "men", "women", "gender",
    "diagnosis", "diagnosed", "smoker", "smokers", "smoking", "treatment", "treated", "cleaning", "filling",
    "fillings", "extraction", "extractions", "crown", "crowns", "implant", "implants", "orthodontics",
    "whitening", "checkup", "periodontitis", "caries", "gingivitis", "visited", "list", "show", "find",
];

const FILTER_PHRASES: &[&str] = &["root canal", "who have", "who had", "treatment type"];

const CONVERSATION: &[&str] = &[
    "hello", "hi", "hey", "thanks", "thank", "please", "what", "how", "why", "who", "where", "weather", "help",
];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IntentScores {
    pub scheduling: u32,
    pub filter: u32,
    pub conversation: u32,
}

/// Lexical cue scoring; strong cues count 2, weak cues 1.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn scores(&self, query: &str) -> IntentScores {
        let lowered = query.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let count = |list: &[&str]| words.iter().filter(|w| list.contains(*w)).count() as u32;

        let mut scores = IntentScores {
            scheduling: count(SCHEDULING_STRONG) * 2,
            filter: count(FILTER_STRONG) * 2 + count(FILTER_WEAK),
            conversation: count(CONVERSATION),
        };

        scores.filter += FILTER_PHRASES.iter().filter(|p| lowered.contains(*p)).count() as u32;

        let question = lowered.contains('?');
        if question {
            scores.conversation += 1;
        }

        // A resolvable time expression is a weak scheduling cue, but not on its own in a question.
        let lone_date_in_question = question && scores.scheduling == 0;
        if !lone_date_in_question
            && dates::resolve(&lowered, Utc::now(), chrono::Duration::minutes(30)).is_resolved()
        {
            scores.scheduling += 1;
        }

        scores
    }

    pub fn pick(scores: IntentScores) -> Intent {
        let candidates = [
            (Intent::AppointmentScheduling, scores.scheduling),
            (Intent::FilterExtraction, scores.filter),
        ];

        let best = candidates
            .into_iter()
            .filter(|(_, score)| *score > 0)
            .max_by(|(a, sa), (b, sb)| sa.cmp(sb).then(b.priority().cmp(&a.priority())));

        match best {
            Some((intent, _)) => intent,
            None if scores.conversation > 0 => Intent::GeneralConversation,
            None => Intent::Unknown,
        }
    }
}

#[async_trait]
impl IntentClassifier for KeywordClassifier {
    async fn classify(&self, query: &str) -> Intent {
        let scores = self.scores(query);
        let intent = Self::pick(scores);
        debug!("Keyword scores {:?} -> {}", scores, intent);
        intent
    }
}

// ==============================================================================
// MODEL CLASSIFIER
// ==============================================================================

/// One small constrained model call; any failure falls back to keywords.
pub struct ModelClassifier {
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
    fallback: KeywordClassifier,
}

impl ModelClassifier {
    pub fn new(model: Arc<dyn LanguageModel>, timeout: Duration) -> Self {
        Self {
            model,
            timeout,
            fallback: KeywordClassifier,
        }
    }

    fn hint() -> SchemaHint {
        let names: Vec<&str> = Intent::ALL.iter().map(Intent::as_str).collect();
        SchemaHint {
            schema_name: "intent_classification".to_string(),
            system_prompt: format!(
                "Classify a dental clinician's request. Reply with a JSON object {{\"intent\": <one of [{}]>}}. \
                 Use appointment_scheduling for booking visits, filter_extraction for selecting groups of patients, \
                 general_conversation for anything else a person might say, unknown if it is not language.",
                names.join(", ")
            ),
        }
    }
}

#[async_trait]
impl IntentClassifier for ModelClassifier {
    async fn classify(&self, query: &str) -> Intent {
        let reply = timeout(self.timeout, self.model.understand(query, &Self::hint())).await;

        let parsed = match reply {
            Ok(Ok(Value::Object(object))) => object
                .get("intent")
                .and_then(Value::as_str)
                .and_then(Intent::from_name),
            Ok(Ok(_)) => None,
            Ok(Err(err)) => {
                warn!("Intent model failed, using keyword classifier: {}", err);
                None
            }
            Err(_) => {
                warn!("Intent model timed out, using keyword classifier");
                None
            }
        };

        match parsed {
            Some(intent) => intent,
            None => self.fallback.classify(query).await,
        }
    }
}
