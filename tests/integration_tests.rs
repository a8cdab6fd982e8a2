use mindcare::app::batch::{parse_requests, InputFormat};
use mindcare::core::{ChatMessage, Role};
use mindcare::{
    AssistError, BatchRequest, BatchRunner, ConversationSession, Engine, FailurePolicy, HistoryStore,
    Result, Scenario, ScenarioRegistry,
};
use std::sync::Arc;

/// Returns a fixed answer and records every call it receives.
struct StubEngine {
    answer: Option<String>,
    calls: Vec<Vec<ChatMessage>>,
}

impl StubEngine {
    fn answering(answer: &str) -> Self {
        Self {
            answer: Some(answer.to_string()),
            calls: Vec::new(),
        }
    }

    fn failing() -> Self {
        Self {
            answer: None,
            calls: Vec::new(),
        }
    }
}

impl Engine for StubEngine {
    fn generate(&mut self, messages: &[ChatMessage], _max_new_tokens: usize) -> Result<String> {
        self.calls.push(messages.to_vec());
        self.answer
            .clone()
            .ok_or_else(|| AssistError::Inference("model crashed".to_string()))
    }
}

fn session(engine: StubEngine) -> ConversationSession<StubEngine> {
    ConversationSession::new(engine, Arc::new(ScenarioRegistry::default()))
}

#[test]
fn test_happy_path() {
    let mut session = session(StubEngine::answering("OK"));

    let answer = session.ask("I feel anxious", "assessment", 128).unwrap();
    assert_eq!(answer, "OK");

    let turn = session.history().last().unwrap();
    assert_eq!(turn.scenario, Scenario::Assessment);
    assert_eq!(turn.question, "I feel anxious");
    assert_eq!(turn.response.as_deref(), Some("OK"));

    let call = &session.engine().calls[0];
    assert_eq!(call.len(), 2);
    assert_eq!(call[0].role, Role::System);
    assert_eq!(
        call[0].content,
        session.registry().get(Scenario::Assessment).system_prompt
    );
    assert_eq!(call[1].role, Role::User);
    assert_eq!(call[1].content, "I feel anxious");
}

#[test]
fn test_invalid_scenario_falls_back_to_default() {
    let registry = Arc::new(ScenarioRegistry::new(Scenario::Mindfulness));
    let mut session = ConversationSession::new(StubEngine::answering("OK"), registry);

    assert!(session.ask("hello", "nonexistent", 16).is_ok());
    assert_eq!(session.history().last().unwrap().scenario, Scenario::Mindfulness);
    assert_eq!(
        session.engine().calls[0][0].content,
        session.registry().get(Scenario::Mindfulness).system_prompt
    );
}

#[test]
fn test_empty_batch_never_calls_engine() {
    let mut session = session(StubEngine::answering("OK"));

    let results = BatchRunner::new(&mut session, 64).run(&[]).unwrap();
    assert!(results.is_empty());
    assert!(session.engine().calls.is_empty());
    assert!(session.history().is_empty());
}

#[test]
fn test_engine_failure_persists_partial_history() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session(StubEngine::failing());

    let err = session.ask("Nothing helps anymore", "crisis_intervention", 64).unwrap_err();
    assert!(err.is_inference());

    let store = HistoryStore::new(dir.path());
    let path = store.save_history(&session.history().snapshot(), None).unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(raw.contains("\"response\": null"));

    let turns = HistoryStore::load_history(&path).unwrap();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].scenario, Scenario::CrisisIntervention);
    assert!(turns[0].response.is_none());
}

#[test]
fn test_batch_file_to_results_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = r#"
- question: "How do I stop overthinking?"
  scenario: mindfulness
- question: "My manager keeps piling on work."
  scenario: work_stress
  max_tokens: 32
- question: "Where do I start?"
"#;
    let requests = parse_requests(input, InputFormat::Yaml).unwrap();
    let mut session = session(StubEngine::answering("Take a breath."));

    let results = BatchRunner::new(&mut session, 64)
        .policy(FailurePolicy::Isolate)
        .run(&requests)
        .unwrap();

    let store = HistoryStore::new(dir.path());
    let path = store.save_results(&results, None).unwrap();
    let loaded = HistoryStore::load_results(&path).unwrap();

    assert_eq!(loaded, results);
    let scenarios: Vec<&str> = loaded.iter().map(|r| r.scenario.as_str()).collect();
    assert_eq!(scenarios, ["mindfulness", "work_stress", "assessment"]);
    assert!(loaded.iter().all(|r| r.error.is_none()));
    assert_eq!(session.history().len(), 3);
}

#[test]
fn test_batch_abort_returns_no_results() {
    let mut session = session(StubEngine::failing());
    let requests = vec![BatchRequest::new("one"), BatchRequest::new("two")];

    let err = BatchRunner::new(&mut session, 64).run(&requests).unwrap_err();
    assert!(matches!(err, AssistError::BatchAborted { index: 0, .. }));
    assert_eq!(session.engine().calls.len(), 1);
}
