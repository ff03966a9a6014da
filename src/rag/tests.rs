use std::sync::Arc;

use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;
use crate::config::VectorConfig;
use crate::generation::testing::ScriptedProvider;
use crate::localization::short_query_answer;
use crate::vector::client::VectorStoreClient;
use crate::vector::{RECORD_VERSION, VectorMetadata};

fn retriever_for(server: &MockServer) -> Retriever {
    let config = VectorConfig {
        rest_url: Some(Url::parse(&server.uri()).expect("mock server uri should parse")),
        rest_token: Some("test-token".to_string()),
        namespace: "test".to_string(),
    };
    Retriever::new(Arc::new(VectorStoreClient::new(&config)), "test")
}

fn unconfigured_retriever() -> Retriever {
    Retriever::new(
        Arc::new(VectorStoreClient::new(&VectorConfig::default())),
        "test",
    )
}

fn qa_match(qa_id: i64, question: &str, answer: &str) -> serde_json::Value {
    let metadata = VectorMetadata {
        doc_type: DocumentType::Qa,
        lang: Language::Vi,
        doc_id: qa_id,
        qa_id: Some(qa_id),
        section_id: 10,
        book_id: 1,
        book_slug: "employee-handbook".to_string(),
        book_title: Some("Sổ tay nhân viên".to_string()),
        section_slug: "leave-policy".to_string(),
        section_title: Some("Chính sách nghỉ phép".to_string()),
        published: true,
        tags: Vec::new(),
        keywords: Vec::new(),
        updated_at: "2026-01-15T08:00:00+00:00".to_string(),
        question: Some(question.to_string()),
        title: None,
        record_version: RECORD_VERSION.to_string(),
    };
    json!({
        "id": format!("qa:{qa_id}:vi"),
        "score": 0.9,
        "data": format!("type: qa\nquestion: {question}\nanswer: {answer}"),
        "metadata": metadata,
    })
}

async fn mount_query(server: &MockServer, matches: Vec<serde_json::Value>) {
    Mock::given(method("POST"))
        .and(path("/query-data/test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": matches })))
        .mount(server)
        .await;
}

fn suggestions_ok() -> Result<serde_json::Value, crate::generation::GenerationError> {
    Ok(json!({
        "suggestions": [
            "Nghỉ ốm thì sao?",
            "Ai duyệt đơn nghỉ phép?",
            "Nghỉ không lương được không?",
        ]
    }))
}

#[test]
fn empty_query_gets_the_canned_answer() {
    let provider = Arc::new(ScriptedProvider::failing());
    let engine = RagEngine::new(unconfigured_retriever(), provider.clone());
    let response =
        engine.generate_rag_response("   ", Language::Vi, None, &RetrievalScope::default());

    assert_eq!(response.answer, empty_answer(Language::Vi));
    assert_eq!(response.language, Language::Vi);
    assert!(response.citations.is_empty());
    assert!(response.results.is_empty());
    assert!(response.suggestions.is_empty());
    // The model must not have been called at all.
    assert!(provider.calls.lock().expect("calls lock").is_empty());
}

#[test]
fn zero_retrieval_hits_degrade_without_generation() {
    let provider = Arc::new(ScriptedProvider::failing());
    let engine = RagEngine::new(unconfigured_retriever(), provider.clone());
    let response = engine.generate_rag_response(
        "một câu hỏi hợp lệ",
        Language::En,
        None,
        &RetrievalScope::default(),
    );
    assert_eq!(response.answer, empty_answer(Language::En));
    assert!(provider.calls.lock().expect("calls lock").is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn single_chunk_answer_with_valid_citation() {
    let server = MockServer::start().await;
    mount_query(
        &server,
        vec![qa_match(1, "Nghỉ phép năm bao nhiêu ngày?", "12 ngày.")],
    )
    .await;

    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok(json!({ "answer": "Bạn được nghỉ 12 ngày mỗi năm [1].", "citations": [1] })),
        suggestions_ok(),
    ]));
    let engine = RagEngine::new(retriever_for(&server), provider);
    let response = engine.generate_rag_response(
        "nghỉ phép năm",
        Language::Vi,
        None,
        &RetrievalScope::default(),
    );

    assert_eq!(response.answer, "Bạn được nghỉ 12 ngày mỗi năm [1].");
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.citations.len(), 1);
    assert_eq!(response.citations[0].qa_id, Some(1));
    assert_eq!(response.suggestions.len(), 3);
    assert!(response.suggestions.iter().all(|s| s.ends_with('?')));
}

#[tokio::test(flavor = "multi_thread")]
async fn hallucinated_citation_indices_are_dropped() {
    let server = MockServer::start().await;
    mount_query(
        &server,
        vec![qa_match(1, "Nghỉ phép năm bao nhiêu ngày?", "12 ngày.")],
    )
    .await;

    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok(json!({ "answer": "Câu trả lời.", "citations": [99] })),
        suggestions_ok(),
    ]));
    let engine = RagEngine::new(retriever_for(&server), provider);
    let response = engine.generate_rag_response(
        "nghỉ phép",
        Language::Vi,
        None,
        &RetrievalScope::default(),
    );

    // The answer survives; only the invalid citation disappears.
    assert_eq!(response.answer, "Câu trả lời.");
    assert!(response.citations.is_empty());
    assert_eq!(response.results.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn generation_failure_still_returns_results() {
    let server = MockServer::start().await;
    mount_query(
        &server,
        vec![
            qa_match(1, "Nghỉ phép năm?", "12 ngày."),
            qa_match(2, "Bảo hiểm y tế?", "Công ty chi trả."),
        ],
    )
    .await;

    let provider = Arc::new(ScriptedProvider::failing());
    let engine = RagEngine::new(retriever_for(&server), provider);
    let response = engine.generate_rag_response(
        "chế độ phúc lợi",
        Language::Vi,
        None,
        &RetrievalScope::default(),
    );

    assert_eq!(response.answer, empty_answer(Language::Vi));
    assert_eq!(response.results.len(), 2);
    assert!(response.citations.is_empty());
    assert!(response.suggestions.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn schema_violations_degrade_to_the_canned_answer() {
    let server = MockServer::start().await;
    mount_query(&server, vec![qa_match(1, "Nghỉ phép năm?", "12 ngày.")]).await;

    // Answer too long for the schema.
    let provider = Arc::new(ScriptedProvider::new(vec![Ok(json!({
        "answer": "x".repeat(2000),
        "citations": [1],
    }))]));
    let engine = RagEngine::new(retriever_for(&server), provider);
    let response = engine.generate_rag_response(
        "nghỉ phép",
        Language::Vi,
        None,
        &RetrievalScope::default(),
    );
    assert_eq!(response.answer, empty_answer(Language::Vi));
    assert_eq!(response.results.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn response_chunks_are_compacted() {
    let server = MockServer::start().await;
    let long_answer = "rất dài ".repeat(100);
    mount_query(&server, vec![qa_match(1, "Câu hỏi?", &long_answer)]).await;

    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok(json!({ "answer": "OK.", "citations": [1] })),
        suggestions_ok(),
    ]));
    let engine = RagEngine::new(retriever_for(&server), provider);
    let response = engine.generate_rag_response(
        "câu hỏi",
        Language::Vi,
        None,
        &RetrievalScope::default(),
    );

    let text = &response.results[0].text;
    assert!(text.chars().count() <= 323);
    assert!(text.ends_with("..."));
    assert_eq!(response.citations[0].text, response.results[0].text);
}

#[tokio::test(flavor = "multi_thread")]
async fn context_block_numbers_match_citation_contract() {
    let server = MockServer::start().await;
    mount_query(
        &server,
        vec![
            qa_match(1, "Câu một?", "Một."),
            qa_match(2, "Câu hai?", "Hai."),
        ],
    )
    .await;

    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok(json!({ "answer": "Trả lời.", "citations": [2] })),
        suggestions_ok(),
    ]));
    let engine = RagEngine::new(retriever_for(&server), provider.clone());
    let response = engine.generate_rag_response(
        "câu hỏi",
        Language::Vi,
        None,
        &RetrievalScope::default(),
    );

    assert_eq!(response.citations.len(), 1);
    assert_eq!(response.citations[0].qa_id, Some(2));

    let calls = provider.calls.lock().expect("calls lock");
    assert!(calls[0].contains("**Citation #1**"));
    assert!(calls[0].contains("**Citation #2**"));
}

#[test]
fn long_queries_are_capped_before_retrieval() {
    let provider = Arc::new(ScriptedProvider::failing());
    let engine = RagEngine::new(unconfigured_retriever(), provider);
    let query = "x".repeat(5000);
    // Unconfigured retriever returns no chunks; the point is that the
    // oversized query does not error anywhere on the way.
    let response =
        engine.generate_rag_response(&query, Language::En, None, &RetrievalScope::default());
    assert_eq!(response.answer, empty_answer(Language::En));
}

#[test]
fn short_query_message_differs_from_empty_answer() {
    assert_ne!(short_query_answer(Language::Vi), empty_answer(Language::Vi));
    assert_ne!(short_query_answer(Language::En), empty_answer(Language::En));
}
