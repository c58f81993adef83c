//! Language model doubles for pipeline tests in this and downstream cells.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::services::model::{LanguageModel, ModelError, SchemaHint};

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub text: String,
    pub schema_name: String,
}

/// Replays queued replies in order and records every call.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<Value, ModelError>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, reply: Value) -> Self {
        self.push(Ok(reply));
        self
    }

    pub fn with_error(self, error: ModelError) -> Self {
        self.push(Err(error));
        self
    }

    pub fn push(&self, reply: Result<Value, ModelError>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn understand(&self, text: &str, hint: &SchemaHint) -> Result<Value, ModelError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                text: text.to_string(),
                schema_name: hint.schema_name.clone(),
            });
        }

        self.replies
            .lock()
            .ok()
            .and_then(|mut replies| replies.pop_front())
            .unwrap_or_else(|| Err(ModelError::Provider { status: 400, body: "no scripted reply left".to_string() }))
    }
}

/// Fails every call with a transport error.
#[derive(Default)]
pub struct FailingModel {
    calls: AtomicUsize,
}

impl FailingModel {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for FailingModel {
    async fn understand(&self, _text: &str, _hint: &SchemaHint) -> Result<Value, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ModelError::Transport("connection refused".to_string()))
    }
}

/// Answers only after `delay`, for exercising timeouts.
pub struct SlowModel {
    pub delay: Duration,
    pub reply: Value,
}

#[async_trait]
impl LanguageModel for SlowModel {
    async fn understand(&self, _text: &str, _hint: &SchemaHint) -> Result<Value, ModelError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.reply.clone())
    }
}
