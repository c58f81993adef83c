use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use extraction_cell::services::{
    filters::filter_schema, ConfidenceScoredExtractor, FilterExtractor, LanguageModel, ModelError, OpenAiModel,
    SchemaHint,
};
use extraction_cell::ExtractionError;
use shared_utils::test_utils::{reference_monday, TestConfig};

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-test",
        "choices": [
            { "index": 0, "message": { "role": "assistant", "content": content }, "finish_reason": "stop" }
        ]
    })
}

fn hint() -> SchemaHint {
    SchemaHint {
        schema_name: "test".to_string(),
        system_prompt: "Extract things.".to_string(),
    }
}

#[tokio::test]
async fn test_understand_sends_json_mode_request() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_mock_server(&mock_server.uri()).to_app_config();

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer test-openai-key"))
        .and(body_partial_json(json!({
            "temperature": 0,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": "Extract things." },
                { "role": "user", "content": "patients over 40" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(r#"{"fields": {"age": 40}}"#)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let model = OpenAiModel::new(&config).unwrap();
    let output = model.understand("patients over 40", &hint()).await.unwrap();
    assert_eq!(output, json!({"fields": {"age": 40}}));
}

#[tokio::test]
async fn test_fenced_reply_is_recovered() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_mock_server(&mock_server.uri()).to_app_config();

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            "Here you go:\n```json\n{\"confidence\": 0.4, \"fields\": {}}\n```",
        )))
        .mount(&mock_server)
        .await;

    let model = OpenAiModel::new(&config).unwrap();
    let output = model.understand("anything", &hint()).await.unwrap();
    assert_eq!(output["confidence"], json!(0.4));
}

#[tokio::test]
async fn test_prose_reply_is_returned_as_text() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_mock_server(&mock_server.uri()).to_app_config();

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("I am not sure what you mean.")))
        .mount(&mock_server)
        .await;

    let model = Arc::new(OpenAiModel::new(&config).unwrap());
    assert_eq!(
        model.understand("hmm", &hint()).await.unwrap(),
        json!("I am not sure what you mean.")
    );

    let filters = FilterExtractor::new(ConfidenceScoredExtractor::new(model, &config));
    let err = filters.extract("hmm", reference_monday()).await.unwrap_err();
    assert_matches!(err, ExtractionError::EmptyExtraction { .. });
}

#[tokio::test]
async fn test_server_errors_are_retried_then_unavailable() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_mock_server(&mock_server.uri()).to_app_config();

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .expect(2)
        .mount(&mock_server)
        .await;

    let model = Arc::new(OpenAiModel::new(&config).unwrap());
    let extractor = ConfidenceScoredExtractor::new(model, &config);
    let err = extractor
        .extract("patients over 40", &filter_schema(reference_monday()))
        .await
        .unwrap_err();

    assert_matches!(err, ExtractionError::Unavailable(message) if message.contains("503"));
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_mock_server(&mock_server.uri()).to_app_config();

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": {"message": "bad key"}})))
        // one direct call, one through the extractor
        .expect(2)
        .mount(&mock_server)
        .await;

    let model = OpenAiModel::new(&config).unwrap();
    let err = model.understand("anything", &hint()).await.unwrap_err();
    assert_matches!(err, ModelError::Provider { status: 401, .. });

    let extractor = ConfidenceScoredExtractor::with_policy(
        Arc::new(model),
        Duration::from_secs(2),
        3,
        Duration::from_millis(1),
    );
    let err = extractor.extract("anything", &filter_schema(reference_monday())).await.unwrap_err();
    assert_matches!(err, ExtractionError::Unavailable(_));
}
