//! 会话存储
//!
//! 状态迁移在写锁内完成，编排器调用在锁外进行；
//! 同一会话同一时刻最多只有一个在途请求。

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{AppResult, SessionError};
use crate::models::{ChatTurn, FollowUpResult, ProblemRequest, SolutionResult};
use crate::session::state::{SessionPhase, SessionState};
use crate::workflow::{FollowUpAnswerer, ProblemSolver};

/// 对外返回的会话快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub phase: SessionPhase,
    pub solution: Option<String>,
    pub transcript: Vec<ChatTurn>,
}

impl SessionSnapshot {
    fn of(session_id: &str, state: &SessionState) -> Self {
        Self {
            session_id: session_id.to_string(),
            phase: state.phase(),
            solution: state.solution().map(str::to_string),
            transcript: state.transcript().to_vec(),
        }
    }
}

type SessionMap = HashMap<String, SessionState>;

/// 在途请求守卫
///
/// `begin_*` 之后、`finish_*` 之前请求 future 被丢弃（客户端断开、任务取消、panic）时，
/// 把会话从 Solving / Answering 恢复过来
struct InFlight {
    sessions: Arc<RwLock<SessionMap>>,
    session_id: String,
    finished: bool,
}

impl InFlight {
    fn new(sessions: &Arc<RwLock<SessionMap>>, session_id: &str) -> Self {
        Self {
            sessions: Arc::clone(sessions),
            session_id: session_id.to_string(),
            finished: false,
        }
    }

    fn disarm(&mut self) {
        self.finished = true;
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!("[会话 {}] ⚠️ 请求未完成即被取消，恢复会话状态", self.session_id);

        if let Ok(mut sessions) = self.sessions.try_write() {
            if let Some(state) = sessions.get_mut(&self.session_id) {
                state.abandon();
            }
            return;
        }

        // 锁被占用时交给运行时稍后恢复
        let sessions = Arc::clone(&self.sessions);
        let session_id = std::mem::take(&mut self.session_id);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Some(state) = sessions.write().await.get_mut(&session_id) {
                    state.abandon();
                }
            });
        }
    }
}

fn not_found(session_id: &str) -> SessionError {
    SessionError::NotFound {
        session_id: session_id.to_string(),
    }
}

/// 进程内会话表
///
/// 会话在请求处理中时不能删除，因此 `finish_*` 时会话一定存在
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<SessionMap>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新建空会话
    pub async fn create(&self) -> String {
        let session_id = uuid::Uuid::new_v4().to_string();
        self.sessions
            .write()
            .await
            .insert(session_id.clone(), SessionState::new());
        session_id
    }

    pub async fn snapshot(&self, session_id: &str) -> AppResult<SessionSnapshot> {
        let sessions = self.sessions.read().await;
        let state = sessions.get(session_id).ok_or_else(|| not_found(session_id))?;
        Ok(SessionSnapshot::of(session_id, state))
    }

    /// 删除会话；有请求在处理中时拒绝
    pub async fn remove(&self, session_id: &str) -> AppResult<()> {
        let mut sessions = self.sessions.write().await;
        let state = sessions.get(session_id).ok_or_else(|| not_found(session_id))?;
        if state.phase().is_busy() {
            return Err(SessionError::Busy {
                session_id: session_id.to_string(),
            }
            .into());
        }
        sessions.remove(session_id);
        Ok(())
    }

    /// 当前会话数
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// 提交题目并解题
    ///
    /// 未提供或未知的 `session_id` 会新建会话；请求被拒绝时不新建
    pub async fn solve(
        &self,
        session_id: Option<String>,
        request: &ProblemRequest,
        solver: &ProblemSolver,
    ) -> AppResult<(SolutionResult, SessionSnapshot)> {
        let session_id = session_id
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        {
            let mut sessions = self.sessions.write().await;
            match sessions.get_mut(&session_id) {
                Some(state) => state.begin_solve(&session_id, request)?,
                None => {
                    let mut state = SessionState::new();
                    state.begin_solve(&session_id, request)?;
                    sessions.insert(session_id.clone(), state);
                    debug!("新建会话 {}", session_id);
                }
            }
        }
        let mut in_flight = InFlight::new(&self.sessions, &session_id);
        debug!("[会话 {}] 进入 Solving", session_id);

        let outcome = solver.solve(request).await;
        if let Err(e) = &outcome {
            warn!("[会话 {}] ❌ 解题失败: {}", session_id, e);
        }

        let snapshot = {
            let mut sessions = self.sessions.write().await;
            let state = sessions
                .get_mut(&session_id)
                .ok_or_else(|| not_found(&session_id))?;
            state.finish_solve(&outcome);
            in_flight.disarm();
            SessionSnapshot::of(&session_id, state)
        };

        Ok((outcome?, snapshot))
    }

    /// 针对当前解答追问
    pub async fn follow_up(
        &self,
        session_id: &str,
        question: &str,
        answerer: &FollowUpAnswerer,
    ) -> AppResult<(FollowUpResult, SessionSnapshot)> {
        let request = {
            let mut sessions = self.sessions.write().await;
            let state = sessions
                .get_mut(session_id)
                .ok_or_else(|| not_found(session_id))?;
            state.begin_follow_up(session_id, question)?
        };
        let mut in_flight = InFlight::new(&self.sessions, session_id);
        debug!("[会话 {}] 进入 Answering", session_id);

        let outcome = answerer.answer(&request).await;
        if let Err(e) = &outcome {
            warn!("[会话 {}] ❌ 追问失败: {}", session_id, e);
        }

        let snapshot = {
            let mut sessions = self.sessions.write().await;
            let state = sessions
                .get_mut(session_id)
                .ok_or_else(|| not_found(session_id))?;
            state.finish_follow_up(&request.question, &outcome);
            in_flight.disarm();
            SessionSnapshot::of(session_id, state)
        };

        Ok((outcome?, snapshot))
    }
}
