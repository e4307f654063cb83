use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tower::ServiceExt;

use math_vision::clients::{GenerativeModel, MathOcr, ModelRequest, StubOcr};
use math_vision::error::{AppError, ErrorKind, SessionError};
use math_vision::models::{ChatRole, DataUri, OcrResult};
use math_vision::services::{LlmService, OcrService};
use math_vision::{
    router, AppResult, AppState, FollowUpAnswerer, FollowUpRequest, ProblemRequest, ProblemSolver,
    SessionPhase, SessionStore,
};

/// 按模板返回固定输出，并记录所有请求
struct MockModel {
    solution: String,
    answer: String,
    broken: AtomicBool,
    requests: Mutex<Vec<ModelRequest>>,
    permits: Option<Semaphore>,
}

impl MockModel {
    fn new(solution: &str, answer: &str) -> Self {
        Self {
            solution: solution.to_string(),
            answer: answer.to_string(),
            broken: AtomicBool::new(false),
            requests: Mutex::new(Vec::new()),
            permits: None,
        }
    }

    fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.prompt.clone())
            .collect()
    }
}

#[async_trait]
impl GenerativeModel for MockModel {
    fn model_name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &ModelRequest) -> AppResult<String> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(permits) = &self.permits {
            permits.acquire().await.unwrap().forget();
        }
        if self.broken.load(Ordering::SeqCst) {
            return Ok("Sorry, I can't produce JSON today.".to_string());
        }
        let reply = match request.template_id.as_str() {
            "solveMathProblemPrompt" => json!({ "solution": self.solution }),
            _ => json!({ "answer": self.answer }),
        };
        Ok(reply.to_string())
    }
}

/// 记录调用次数的 OCR
struct CountingOcr {
    inner: StubOcr,
    calls: AtomicUsize,
}

#[async_trait]
impl MathOcr for CountingOcr {
    fn provider_name(&self) -> &str {
        "counting"
    }

    async fn recognize(&self, image: &DataUri) -> AppResult<OcrResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.recognize(image).await
    }
}

struct Harness {
    model: Arc<MockModel>,
    ocr: Arc<CountingOcr>,
    solver: ProblemSolver,
    answerer: FollowUpAnswerer,
}

fn harness_with(model: MockModel) -> Harness {
    let model = Arc::new(model);
    let ocr = Arc::new(CountingOcr {
        inner: StubOcr,
        calls: AtomicUsize::new(0),
    });
    let llm = LlmService::new(model.clone(), Duration::from_secs(5));
    let solver = ProblemSolver::new(
        OcrService::new(ocr.clone(), Duration::from_secs(5)),
        llm.clone(),
    );
    let answerer = FollowUpAnswerer::new(llm);
    Harness {
        model,
        ocr,
        solver,
        answerer,
    }
}

fn harness() -> Harness {
    harness_with(MockModel::new("Step 1: Subtract 3...", "Because..."))
}

// ========== 编排器 ==========

#[tokio::test]
async fn test_text_problem_skips_ocr() {
    let h = harness();

    let result = h
        .solver
        .solve(&ProblemRequest::from_text("2x + 3 = 7"))
        .await
        .unwrap();

    assert_eq!(result.solution, "Step 1: Subtract 3...");
    assert_eq!(h.ocr.calls.load(Ordering::SeqCst), 0);
    let prompts = h.model.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].ends_with("\n\n2x + 3 = 7"));
}

#[tokio::test]
async fn test_image_problem_uses_ocr_latex() {
    let h = harness();

    h.solver
        .solve(&ProblemRequest::from_image("data:image/png;base64,AAA="))
        .await
        .unwrap();

    assert_eq!(h.ocr.calls.load(Ordering::SeqCst), 1);
    let prompts = h.model.prompts();
    assert!(prompts[0].ends_with("\n\n\\frac{1}{2}x + 3 = 5"));
}

#[tokio::test]
async fn test_empty_request_makes_no_calls() {
    let h = harness();

    let err = h.solver.solve(&ProblemRequest::default()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MissingInput);
    assert_eq!(err.to_string(), "输入错误: no math problem provided");
    assert_eq!(h.ocr.calls.load(Ordering::SeqCst), 0);
    assert!(h.model.prompts().is_empty());
}

#[tokio::test]
async fn test_malformed_image_is_invalid_input() {
    let h = harness();

    let err = h
        .solver
        .solve(&ProblemRequest::from_image("data:image/png,not-base64"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(h.ocr.calls.load(Ordering::SeqCst), 0);
    assert!(h.model.prompts().is_empty());
}

#[tokio::test]
async fn test_follow_up_returns_answer_exactly() {
    let h = harness();

    let result = h
        .answerer
        .answer(&FollowUpRequest {
            question: "why?".to_string(),
            previous_solution: "Step 1...".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(result.answer, "Because...");
    let prompts = h.model.prompts();
    assert!(prompts[0].contains("Previous Solution: Step 1..."));
    assert!(prompts[0].contains("Follow-up Question: why?"));
}

#[tokio::test]
async fn test_unparseable_model_output() {
    let h = harness();
    h.model.broken.store(true, Ordering::SeqCst);

    let err = h
        .solver
        .solve(&ProblemRequest::from_text("1 + 1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ModelOutput);
}

// ========== 会话 ==========

#[tokio::test]
async fn test_transcript_grows_in_pairs_and_resets() {
    let h = harness();
    let store = SessionStore::new();

    let (_, snapshot) = store
        .solve(None, &ProblemRequest::from_text("2x + 3 = 7"), &h.solver)
        .await
        .unwrap();
    let sid = snapshot.session_id.clone();
    assert!(snapshot.transcript.is_empty());
    assert_eq!(snapshot.phase, SessionPhase::Solved);

    for n in 1..=3 {
        let (_, snapshot) = store
            .follow_up(&sid, &format!("question {}", n), &h.answerer)
            .await
            .unwrap();
        assert_eq!(snapshot.transcript.len(), 2 * n);
    }

    let snapshot = store.snapshot(&sid).await.unwrap();
    for (i, turn) in snapshot.transcript.iter().enumerate() {
        let expected = if i % 2 == 0 {
            ChatRole::User
        } else {
            ChatRole::Assistant
        };
        assert_eq!(turn.role, expected);
    }
    assert_eq!(snapshot.transcript[4].content, "question 3");

    // 新题目清空对话
    let (_, snapshot) = store
        .solve(Some(sid.clone()), &ProblemRequest::from_text("x^2 = 4"), &h.solver)
        .await
        .unwrap();
    assert_eq!(snapshot.session_id, sid);
    assert!(snapshot.transcript.is_empty());
}

#[tokio::test]
async fn test_failed_follow_up_keeps_transcript() {
    let h = harness();
    let store = SessionStore::new();

    let (_, snapshot) = store
        .solve(None, &ProblemRequest::from_text("2x + 3 = 7"), &h.solver)
        .await
        .unwrap();
    let sid = snapshot.session_id;
    store.follow_up(&sid, "why?", &h.answerer).await.unwrap();
    let before = store.snapshot(&sid).await.unwrap();

    h.model.broken.store(true, Ordering::SeqCst);
    let err = store.follow_up(&sid, "and then?", &h.answerer).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ModelOutput);

    let after = store.snapshot(&sid).await.unwrap();
    assert_eq!(after, before);
    assert_eq!(after.phase, SessionPhase::Solved);
}

#[tokio::test]
async fn test_failed_solve_returns_to_idle() {
    let h = harness();
    let store = SessionStore::new();

    let (_, snapshot) = store
        .solve(None, &ProblemRequest::from_text("2x + 3 = 7"), &h.solver)
        .await
        .unwrap();
    let sid = snapshot.session_id;

    h.model.broken.store(true, Ordering::SeqCst);
    assert!(store
        .solve(Some(sid.clone()), &ProblemRequest::from_text("x = ?"), &h.solver)
        .await
        .is_err());

    let snapshot = store.snapshot(&sid).await.unwrap();
    assert_eq!(snapshot.phase, SessionPhase::Idle);
    assert_eq!(snapshot.solution, None);

    let err = store.follow_up(&sid, "why?", &h.answerer).await.unwrap_err();
    assert!(matches!(err, AppError::Session(SessionError::NoSolution)));
}

#[tokio::test]
async fn test_overlapping_requests_rejected() {
    let mut model = MockModel::new("sol", "ans");
    model.permits = Some(Semaphore::new(1));
    let h = harness_with(model);
    let store = SessionStore::new();

    let (_, snapshot) = store
        .solve(None, &ProblemRequest::from_text("1 + 1"), &h.solver)
        .await
        .unwrap();
    let sid = snapshot.session_id;

    // 第二次解题会卡在模型调用上
    let pending = {
        let store = store.clone();
        let solver = h.solver.clone();
        let sid = sid.clone();
        tokio::spawn(async move {
            store
                .solve(Some(sid), &ProblemRequest::from_text("2 + 2"), &solver)
                .await
        })
    };
    while store.snapshot(&sid).await.unwrap().phase != SessionPhase::Solving {
        tokio::task::yield_now().await;
    }

    let err = store.follow_up(&sid, "why?", &h.answerer).await.unwrap_err();
    assert!(matches!(err, AppError::Session(SessionError::Busy { .. })));
    let err = store
        .solve(Some(sid.clone()), &ProblemRequest::from_text("3 + 3"), &h.solver)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SessionConflict);

    if let Some(permits) = &h.model.permits {
        permits.add_permits(1);
    }
    let (result, snapshot) = pending.await.unwrap().unwrap();
    assert_eq!(result.solution, "sol");
    assert_eq!(snapshot.phase, SessionPhase::Solved);
}

fn gated_harness(permits: usize) -> Harness {
    let mut model = MockModel::new("sol", "ans");
    model.permits = Some(Semaphore::new(permits));
    harness_with(model)
}

fn release(h: &Harness, n: usize) {
    if let Some(permits) = &h.model.permits {
        permits.add_permits(n);
    }
}

async fn wait_for_phase(store: &SessionStore, session_id: &str, phase: SessionPhase) {
    while store.snapshot(session_id).await.unwrap().phase != phase {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_cancelled_solve_releases_session() {
    let h = gated_harness(0);
    let store = SessionStore::new();
    let sid = store.create().await;

    let pending = {
        let store = store.clone();
        let solver = h.solver.clone();
        let sid = sid.clone();
        tokio::spawn(async move {
            store
                .solve(Some(sid), &ProblemRequest::from_text("2x + 3 = 7"), &solver)
                .await
        })
    };
    wait_for_phase(&store, &sid, SessionPhase::Solving).await;

    // 相当于客户端断开，处理函数的 future 被丢弃
    pending.abort();
    assert!(pending.await.unwrap_err().is_cancelled());

    let snapshot = store.snapshot(&sid).await.unwrap();
    assert_eq!(snapshot.phase, SessionPhase::Idle);
    assert_eq!(snapshot.solution, None);

    // 会话没有卡在 Busy
    let err = store
        .solve(Some(sid.clone()), &ProblemRequest::default(), &h.solver)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingInput);
}

#[tokio::test]
async fn test_cancelled_follow_up_keeps_solution() {
    let h = gated_harness(1);
    let store = SessionStore::new();

    let (_, snapshot) = store
        .solve(None, &ProblemRequest::from_text("1 + 1"), &h.solver)
        .await
        .unwrap();
    let sid = snapshot.session_id;

    let pending = {
        let store = store.clone();
        let answerer = h.answerer.clone();
        let sid = sid.clone();
        tokio::spawn(async move { store.follow_up(&sid, "why?", &answerer).await })
    };
    wait_for_phase(&store, &sid, SessionPhase::Answering).await;
    pending.abort();
    assert!(pending.await.unwrap_err().is_cancelled());

    let snapshot = store.snapshot(&sid).await.unwrap();
    assert_eq!(snapshot.phase, SessionPhase::Solved);
    assert_eq!(snapshot.solution.as_deref(), Some("sol"));
    assert!(snapshot.transcript.is_empty());

    release(&h, 1);
    let (result, snapshot) = store.follow_up(&sid, "why?", &h.answerer).await.unwrap();
    assert_eq!(result.answer, "ans");
    assert_eq!(snapshot.transcript.len(), 2);
}

#[tokio::test]
async fn test_rejected_solve_creates_no_session() {
    let h = harness();
    let store = SessionStore::new();

    for _ in 0..10 {
        let err = store
            .solve(None, &ProblemRequest::default(), &h.solver)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingInput);
    }
    assert!(store
        .solve(Some("fresh".to_string()), &ProblemRequest::default(), &h.solver)
        .await
        .is_err());

    assert_eq!(store.len().await, 0);
    assert!(store.snapshot("fresh").await.is_err());

    store
        .solve(None, &ProblemRequest::from_text("1 + 1"), &h.solver)
        .await
        .unwrap();
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn test_delete_rejected_while_busy() {
    let h = gated_harness(0);
    let store = SessionStore::new();
    let sid = store.create().await;

    let pending = {
        let store = store.clone();
        let solver = h.solver.clone();
        let sid = sid.clone();
        tokio::spawn(async move {
            store
                .solve(Some(sid), &ProblemRequest::from_text("1 + 1"), &solver)
                .await
        })
    };
    wait_for_phase(&store, &sid, SessionPhase::Solving).await;

    let err = store.remove(&sid).await.unwrap_err();
    assert!(matches!(err, AppError::Session(SessionError::Busy { .. })));

    release(&h, 1);
    let (result, snapshot) = pending.await.unwrap().unwrap();
    assert_eq!(result.solution, "sol");
    assert_eq!(snapshot.phase, SessionPhase::Solved);

    store.remove(&sid).await.unwrap();
    let err = store.snapshot(&sid).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// ========== HTTP ==========

fn app(h: &Harness) -> axum::Router {
    router(Arc::new(AppState::new(h.solver.clone(), h.answerer.clone())))
}

async fn send(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_http_solve_and_follow_up() {
    let h = harness();
    let app = app(&h);

    let (status, body) = send(
        &app,
        "POST",
        "/api/solve",
        Some(json!({ "problemText": "2x + 3 = 7" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["solution"], "Step 1: Subtract 3...");
    assert_eq!(body["phase"], "solved");
    let sid = body["sessionId"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        "POST",
        "/api/follow-up",
        Some(json!({ "sessionId": sid, "question": "why?" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], "Because...");
    assert_eq!(body["transcript"][0], json!({ "role": "user", "content": "why?" }));
    assert_eq!(
        body["transcript"][1],
        json!({ "role": "assistant", "content": "Because..." })
    );

    let (status, body) = send(&app, "GET", &format!("/api/session/{}", sid), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["transcript"].as_array().unwrap().len(), 2);

    let (status, _) = send(&app, "DELETE", &format!("/api/session/{}", sid), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = send(&app, "GET", &format!("/api/session/{}", sid), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_http_error_mapping() {
    let h = harness();
    let app = app(&h);

    let (status, body) = send(&app, "POST", "/api/solve", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "missing_input");
    assert_eq!(body["message"], "no math problem provided");

    let (status, body) = send(
        &app,
        "POST",
        "/api/solve",
        Some(json!({ "problemImage": "garbage" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");

    let (status, body) = send(
        &app,
        "POST",
        "/api/follow-up",
        Some(json!({ "sessionId": "unknown", "question": "why?" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    h.model.broken.store(true, Ordering::SeqCst);
    let (status, body) = send(
        &app,
        "POST",
        "/api/solve",
        Some(json!({ "problemText": "1 + 1" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "model_output");
}

#[tokio::test]
async fn test_http_index_and_health() {
    let h = harness();
    let app = app(&h);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("MathVision"));

    let response = app
        .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// ========== 真实服务 ==========

#[tokio::test]
#[ignore] // 需要 LLM_API_KEY：cargo test -- --ignored
async fn test_solve_with_live_model() {
    math_vision::utils::logging::init(true);

    let config = math_vision::Config::from_env();
    let solver = ProblemSolver::from_config(&config);

    let result = solver
        .solve(&ProblemRequest::from_text("2x + 3 = 7"))
        .await
        .expect("解题失败");

    println!("{}", result.solution);
    assert!(!result.solution.is_empty());
}
