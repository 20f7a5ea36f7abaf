//! Provider client behavior against scripted backends

mod common;

use common::*;
use rag_assistant::context::Role;
use rag_assistant::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

const CONTEXT: &str = "Relevant findings:\n\nSource 1: handbook.txt\nContent:\nStaff may work remotely two days per week.\n\n";

const LONG_CONTEXT: &str = "one two three four five six seven eight nine ten \
                            eleven twelve thirteen fourteen fifteen sixteen seventeen eighteen nineteen twenty";

/// 200-token budget, summarizing past 100, holding four 10-word exchanges
fn long_session() -> ConversationSession {
    let budget = TokenBudget::new(TokenBudgetConfig {
        token_limit: 200,
        summarize_threshold: 0.5,
        question_threshold: 0.2,
    })
    .unwrap();
    let mut session = ConversationSession::new(budget, Arc::new(WordBasedEstimator::new(1.0)));
    for i in 0..4 {
        session.record_exchange(
            &format!("q{} one two three four five six seven eight nine", i),
            &format!("a{} one two three four five six seven eight nine", i),
        );
    }
    session
}

#[tokio::test]
async fn test_successful_chat_records_exchange() {
    let script = Script::new(vec![Ok("Two days per week.".to_string())]);
    let sleeper = Arc::new(RecordingSleeper::default());
    let client = client(&script, &sleeper);
    let mut session = session();

    let answer = assert_ok!(
        client
            .chat(&mut session, Provider::Groq, "How often can staff work remotely?", CONTEXT, &groq_credentials())
            .await
    );

    assert_eq!(answer, "Two days per week.");
    assert_eq!(script.builds(), vec![Provider::Groq]);
    assert!(sleeper.sleeps().is_empty());

    let (messages, temperature) = &script.requests()[0];
    assert_eq!(*temperature, 0.0);
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role(), Role::System);
    assert_eq!(messages[1].role(), Role::User);
    assert!(messages[1].content().contains(CONTEXT));

    let history = session.history().messages();
    assert_eq!(history[0].content(), "How often can staff work remotely?");
    assert_eq!(history[1].content(), "Two days per week.");
}

#[tokio::test]
async fn test_retries_exhausted_names_alternatives() {
    let script = Script::new(vec![Err(server_error()), Err(server_error()), Err(server_error())]);
    let sleeper = Arc::new(RecordingSleeper::default());
    let client = client(&script, &sleeper);
    let mut session = session();
    let credentials = Credentials::new().with_key(Provider::OpenAi, "sk-test");

    let err = assert_err!(
        client
            .chat(&mut session, Provider::OpenAi, "question", CONTEXT, &credentials)
            .await
    );

    assert_eq!(err.kind(), ErrorKind::Transient);
    let text = err.to_string();
    assert!(text.contains("The OpenAI API is currently experiencing issues (HTTP 500 server error)"));
    assert!(text.contains("(Groq, Gemini, or Deepseek)"));
    assert_eq!(script.calls(), 3);
    assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(1), Duration::from_secs(2)]);
    assert!(session.history().is_empty());
}

#[tokio::test]
async fn test_rate_limit_is_not_retried() {
    let script = Script::new(vec![Err(ProviderError::RateLimited("slow down".to_string()))]);
    let sleeper = Arc::new(RecordingSleeper::default());
    let client = client(&script, &sleeper);

    let err = assert_err!(
        client
            .chat(&mut session(), Provider::Groq, "question", CONTEXT, &groq_credentials())
            .await
    );

    assert_eq!(err.kind(), ErrorKind::NonRetryable);
    assert!(err.to_string().starts_with("⚠️ Rate limit exceeded for Groq API."));
    assert_eq!(script.calls(), 1);
    assert!(sleeper.sleeps().is_empty());
}

#[tokio::test]
async fn test_connection_failure_is_not_retried() {
    let script = Script::new(vec![Err(ProviderError::Connection("connection refused".to_string()))]);
    let sleeper = Arc::new(RecordingSleeper::default());
    let client = client(&script, &sleeper);
    let mut session = session();
    let credentials = Credentials::new().with_key(Provider::Deepseek, "sk-test");

    let err = assert_err!(
        client
            .chat(&mut session, Provider::Deepseek, "question", CONTEXT, &credentials)
            .await
    );

    assert_eq!(err.kind(), ErrorKind::NonRetryable);
    assert_eq!(
        err.to_string(),
        "⚠️ Failed to connect to Deepseek API. Please check your internet connection and try again."
    );
    assert_eq!(script.calls(), 1);
    assert!(sleeper.sleeps().is_empty());
    assert!(session.history().is_empty());
}

#[tokio::test]
async fn test_missing_key_skips_backend() {
    let script = Script::new(vec![]);
    let sleeper = Arc::new(RecordingSleeper::default());
    let client = client(&script, &sleeper);
    let credentials = Credentials::new().with_key(Provider::Gemini, "   ");

    let err = assert_err!(
        client
            .chat(&mut session(), Provider::Gemini, "question", CONTEXT, &credentials)
            .await
    );

    assert_eq!(
        err.to_string(),
        "Error: GEMINI API key not configured. Please provide your API key in the API Settings."
    );
    assert!(script.builds().is_empty());
    assert_eq!(script.calls(), 0);
}

#[tokio::test]
async fn test_overlong_question_rejected_before_dispatch() {
    let script = Script::new(vec![]);
    let sleeper = Arc::new(RecordingSleeper::default());
    let client = client(&script, &sleeper);
    let question = "word ".repeat(1300);

    let err = assert_err!(
        client
            .chat(&mut session(), Provider::Groq, &question, CONTEXT, &groq_credentials())
            .await
    );

    assert_eq!(err.kind(), ErrorKind::Sizing);
    assert_eq!(
        err.to_string(),
        "Your question is too long. Please reduce your input to continue the conversation."
    );
    assert_eq!(script.calls(), 0);
}

#[tokio::test]
async fn test_failed_summarization_falls_back_and_still_answers() {
    let script = Script::new(vec![
        Err(ProviderError::Api {
            status: 400,
            message: "bad request".to_string(),
        }),
        Ok("Still answered.".to_string()),
    ]);
    let sleeper = Arc::new(RecordingSleeper::default());
    let client = client(&script, &sleeper).with_system_prompt("Answer briefly.");

    let mut session = long_session();

    let answer = assert_ok!(
        client
            .chat(&mut session, Provider::Groq, "what did we discuss first", LONG_CONTEXT, &groq_credentials())
            .await
    );
    assert_eq!(answer, "Still answered.");
    assert_eq!(script.calls(), 2);

    let requests = script.requests();
    assert_eq!(requests[0].1, 0.1);
    let (messages, _) = &requests[1];
    assert_eq!(messages.len(), 9);
    assert_eq!(
        messages[1].content(),
        "Previous conversation summary:\n\
         User: q0 one two three four five six seven eight nine\n\
         Assistant: a0 one two three four five six seven eight nine"
    );
    assert!(messages[2].content().starts_with("q1 "));

    // two summarized away, one new exchange added
    assert_eq!(session.history().len(), 8);
}

#[tokio::test]
async fn test_model_summary_replaces_older_history() {
    let script = Script::new(vec![
        Ok("The user asked about q0.".to_string()),
        Ok("You first asked about q0.".to_string()),
    ]);
    let sleeper = Arc::new(RecordingSleeper::default());
    let client = client(&script, &sleeper).with_system_prompt("Answer briefly.");
    let mut session = long_session();

    let answer = assert_ok!(
        client
            .chat(&mut session, Provider::Groq, "what did we discuss first", LONG_CONTEXT, &groq_credentials())
            .await
    );
    assert_eq!(answer, "You first asked about q0.");
    assert_eq!(script.calls(), 2);

    let requests = script.requests();
    let (summary_request, summary_temperature) = &requests[0];
    assert_eq!(*summary_temperature, 0.1);
    assert_eq!(summary_request.len(), 1);
    assert!(summary_request[0]
        .content()
        .contains("User: q0 one two three four five six seven eight nine"));
    assert!(!summary_request[0].content().contains("q1 "));

    let (messages, _) = &requests[1];
    assert_eq!(messages.len(), 9);
    assert_eq!(messages[0].role(), Role::System);
    assert_eq!(messages[0].content(), "Answer briefly.");
    assert_eq!(messages[1].role(), Role::System);
    assert_eq!(
        messages[1].content(),
        "Previous conversation summary:\nThe user asked about q0."
    );
    let recent: Vec<&str> = messages[2..8].iter().map(|m| m.content()).collect();
    for (pair, i) in recent.chunks(2).zip(1..) {
        assert!(pair[0].starts_with(&format!("q{} ", i)));
        assert!(pair[1].starts_with(&format!("a{} ", i)));
    }
    assert_eq!(messages[8].role(), Role::User);
    assert!(messages[8].content().contains("Question: what did we discuss first"));

    let history = session.history().messages();
    assert_eq!(history.len(), 8);
    assert!(history[0].content().starts_with("q1 "));
    assert!(history.iter().all(|m| !m.content().contains("The user asked about q0.")));
}
