/*!
 * Tests for the mock backend used by scan tests
 */

use archivist::errors::ProviderError;
use archivist::providers::{ChatMessage, ExtractionBackend, MockBackend};
use std::sync::Arc;

#[tokio::test]
async fn test_mockBackend_asTraitObject_shouldShareCounters() {
    let mock = MockBackend::working();
    let backend: Arc<dyn ExtractionBackend> = Arc::new(mock.clone());

    backend.generate_text("one").await.unwrap();
    backend.generate_structured("two", None).await.unwrap();

    assert_eq!(mock.request_count(), 2);
    assert_eq!(mock.prompts(), vec!["one".to_string(), "two".to_string()]);
}

#[tokio::test]
async fn test_intermittentBackend_everyThird_shouldFailThirdAndSixth() {
    let backend = MockBackend::intermittent(3);

    let mut outcomes = Vec::new();
    for i in 0..6 {
        outcomes.push(backend.generate_text(&format!("prompt {}", i)).await.is_ok());
    }

    assert_eq!(outcomes, vec![true, true, false, true, true, false]);
}

#[tokio::test]
async fn test_malformedBackend_structured_shouldReturnParseError() {
    let backend = MockBackend::malformed();

    let text = backend.generate_text("facts please").await;
    let structured = backend.generate_structured("facts please", None).await;

    assert!(text.is_ok());
    assert!(matches!(structured, Err(ProviderError::ParseError(_))));
}

#[tokio::test]
async fn test_chatCompletion_shouldJoinMessageContents() {
    let backend = MockBackend::working();

    backend
        .chat_completion(vec![ChatMessage::system("rules"), ChatMessage::user("question")])
        .await
        .unwrap();

    assert_eq!(backend.prompts(), vec!["rules\nquestion".to_string()]);
}

#[tokio::test]
async fn test_failingBackend_shouldReportNoModelInfo() {
    let backend = MockBackend::failing();

    assert!(!backend.is_available().await);
    assert!(backend.model_info().await.is_none());
    assert!(matches!(
        backend.generate_text("x").await,
        Err(ProviderError::ConnectionError(_))
    ));
}
