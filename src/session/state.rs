//! 会话状态机
//!
//! ```text
//! Idle ──submit──▶ Solving ──ok──▶ Solved ◀──ok/err── Answering
//!   ▲                 │              │                     ▲
//!   └──────err────────┘              └──────follow-up──────┘
//! ```
//!
//! 状态对象显式传入、显式修改，不依赖渲染环境。

use serde::Serialize;

use crate::error::{AppResult, InputError, SessionError};
use crate::models::{ChatTurn, FollowUpRequest, FollowUpResult, ProblemRequest, SolutionResult};

/// 会话阶段
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Idle,
    Solving,
    Solved,
    Answering,
}

impl SessionPhase {
    /// 是否有请求在处理中
    pub fn is_busy(self) -> bool {
        matches!(self, SessionPhase::Solving | SessionPhase::Answering)
    }
}

/// 单个用户会话的全部状态
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionState {
    phase: SessionPhase,
    solution: Option<String>,
    transcript: Vec<ChatTurn>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn solution(&self) -> Option<&str> {
        self.solution.as_deref()
    }

    pub fn transcript(&self) -> &[ChatTurn] {
        &self.transcript
    }

    fn ensure_idle_slot(&self, session_id: &str) -> AppResult<()> {
        if self.phase.is_busy() {
            return Err(SessionError::Busy {
                session_id: session_id.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// 提交新题目
    ///
    /// 没有任何题目来源时直接拒绝，状态不变
    pub fn begin_solve(&mut self, session_id: &str, request: &ProblemRequest) -> AppResult<()> {
        self.ensure_idle_slot(session_id)?;
        if !request.has_input() {
            return Err(InputError::MissingProblem.into());
        }
        self.phase = SessionPhase::Solving;
        Ok(())
    }

    /// 解题结束
    ///
    /// 成功：替换解答并清空对话；失败：回到 Idle，不保留任何内容
    pub fn finish_solve(&mut self, outcome: &AppResult<SolutionResult>) {
        match outcome {
            Ok(result) => {
                self.phase = SessionPhase::Solved;
                self.solution = Some(result.solution.clone());
                self.transcript.clear();
            }
            Err(_) => *self = Self::default(),
        }
    }

    /// 提交追问，返回带上当前解答的追问请求
    pub fn begin_follow_up(
        &mut self,
        session_id: &str,
        question: &str,
    ) -> AppResult<FollowUpRequest> {
        self.ensure_idle_slot(session_id)?;
        let solution = self.solution.clone().ok_or(SessionError::NoSolution)?;
        if question.trim().is_empty() {
            return Err(InputError::EmptyQuestion.into());
        }
        self.phase = SessionPhase::Answering;
        Ok(FollowUpRequest {
            question: question.to_string(),
            previous_solution: solution,
        })
    }

    /// 追问结束
    ///
    /// 成功：追加一问一答两轮；失败：对话记录不变
    pub fn finish_follow_up(&mut self, question: &str, outcome: &AppResult<FollowUpResult>) {
        if let Ok(result) = outcome {
            self.transcript.push(ChatTurn::user(question));
            self.transcript.push(ChatTurn::assistant(result.answer.clone()));
        }
        self.phase = SessionPhase::Solved;
    }

    /// 在途请求没有走到 `finish_*` 就被丢弃
    ///
    /// 按失败处理：Solving 回到 Idle，Answering 回到 Solved 且对话不变
    pub fn abandon(&mut self) {
        match self.phase {
            SessionPhase::Solving => *self = Self::default(),
            SessionPhase::Answering => self.phase = SessionPhase::Solved,
            SessionPhase::Idle | SessionPhase::Solved => {}
        }
    }
}
