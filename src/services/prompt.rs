//! 提示词模板
//!
//! 模板 = 固定的指令文本 + 命名插槽 + 声明的输出结构。
//! 插槽写作 `{{name}}` 或 `{{{name}}}`，取值来自序列化后的输入结构体（camelCase 字段名）。

use phf::phf_map;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{AppResult, LlmError};

const SLOT_PATTERN: &str = r"\{\{\{?\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}\}?";
const FENCED_JSON_PATTERN: &str = r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```";

/// 提示词模板
#[derive(Debug)]
pub struct PromptTemplate {
    pub id: &'static str,
    pub prompt: &'static str,
    /// 输出字段：(字段名, 说明)，字段类型均为字符串
    pub output_fields: &'static [(&'static str, &'static str)],
}

pub const SOLVE_MATH_PROBLEM: PromptTemplate = PromptTemplate {
    id: "solveMathProblemPrompt",
    prompt: "Solve the following math problem clearly and display the solution step-by-step like a teacher on a whiteboard. Make it suitable for a student learning in class:\n\n{{problem}}",
    output_fields: &[("solution", "The step-by-step solution to the math problem.")],
};

pub const ANSWER_FOLLOW_UP: PromptTemplate = PromptTemplate {
    id: "answerFollowUpQuestionPrompt",
    prompt: "You are a helpful math tutor. A student has asked a follow-up question about a previous solution.\n\nPrevious Solution: {{{previousSolution}}}\n\nFollow-up Question: {{{question}}}\n\nAnswer the follow-up question clearly and concisely, providing further explanation if needed.",
    output_fields: &[("answer", "The answer to the follow-up question.")],
};

static TEMPLATES: phf::Map<&'static str, PromptTemplate> = phf_map! {
    "solveMathProblemPrompt" => SOLVE_MATH_PROBLEM,
    "answerFollowUpQuestionPrompt" => ANSWER_FOLLOW_UP,
};

/// 按 ID 查找模板
pub fn lookup(template_id: &str) -> AppResult<&'static PromptTemplate> {
    TEMPLATES.get(template_id).ok_or_else(|| {
        LlmError::UnknownTemplate {
            template: template_id.to_string(),
        }
        .into()
    })
}

fn slot_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl PromptTemplate {
    /// 用输入结构体填充插槽
    ///
    /// 插槽在输入中找不到对应字段时报错
    pub fn render<I: Serialize>(&self, input: &I) -> AppResult<String> {
        let fields = serde_json::to_value(input).map_err(|e| LlmError::TemplateRender {
            template: self.id.to_string(),
            field: e.to_string(),
        })?;

        let re = Regex::new(SLOT_PATTERN).map_err(|e| LlmError::TemplateRender {
            template: self.id.to_string(),
            field: e.to_string(),
        })?;

        let mut rendered = String::with_capacity(self.prompt.len());
        let mut last = 0;
        for caps in re.captures_iter(self.prompt) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let value = fields
                .get(name.as_str())
                .ok_or_else(|| LlmError::TemplateRender {
                    template: self.id.to_string(),
                    field: name.as_str().to_string(),
                })?;
            rendered.push_str(&self.prompt[last..whole.start()]);
            rendered.push_str(&slot_value(value));
            last = whole.end();
        }
        rendered.push_str(&self.prompt[last..]);

        Ok(rendered)
    }

    /// 输出结构说明（作为系统消息发送）
    pub fn output_instruction(&self) -> String {
        let fields: Vec<String> = self
            .output_fields
            .iter()
            .map(|(name, description)| format!("- \"{}\" (string): {}", name, description))
            .collect();
        let example: Vec<String> = self
            .output_fields
            .iter()
            .map(|(name, _)| format!("\"{}\": \"...\"", name))
            .collect();

        format!(
            "Respond with a single JSON object and nothing else. The object must contain exactly these fields:\n{}\n\nExample shape: {{{}}}",
            fields.join("\n"),
            example.join(", ")
        )
    }

    /// 把模型原始输出解析为声明的输出结构
    ///
    /// 接受：纯 JSON 对象、```json 代码块、或前后夹杂文字的单个 `{...}` 对象
    pub fn parse_output<O: DeserializeOwned>(&self, raw: &str) -> AppResult<O> {
        let trimmed = raw.trim();
        let mut candidates: Vec<&str> = vec![trimmed];

        if let Ok(re) = Regex::new(FENCED_JSON_PATTERN) {
            if let Some(inner) = re.captures(trimmed).and_then(|c| c.get(1)) {
                candidates.push(inner.as_str());
            }
        }
        if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
            if start < end {
                candidates.push(&trimmed[start..=end]);
            }
        }

        let mut last_err = None;
        for candidate in candidates {
            match serde_json::from_str::<O>(candidate) {
                Ok(output) => return Ok(output),
                Err(e) => last_err = Some(e),
            }
        }

        let source: Box<dyn std::error::Error + Send + Sync> = match last_err {
            Some(e) => Box::new(e),
            None => "没有可解析的内容".into(),
        };
        Err(LlmError::OutputParseFailed {
            template: self.id.to_string(),
            response: crate::utils::logging::truncate_text(trimmed, 200),
            source,
        }
        .into())
    }
}
