//! worker 产出的结构化数据：路线图、测验、答卷与评分结果
//!
//! Roadmap 与 Quiz 经过精炼循环生成，JSON Schema 由 schemars 派生后注入 prompt；
//! validate() 返回业务规则违例列表，空表示通过。

use std::collections::{BTreeMap, HashSet};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::refine::RefineTarget;

pub const MILESTONE_STATUSES: [&str; 3] = ["todo", "in progress", "done"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Task {
    /// Name of the task
    pub name: String,
    /// Brief description of what to do
    pub description: String,
    /// URL or title of a reading resource
    #[serde(default)]
    pub resources: String,
    /// URL or title of a video resource
    #[serde(default)]
    pub youtube: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Milestone {
    /// Unique identifier, e.g. m1, m2
    pub id: String,
    pub title: String,
    /// Overview of this phase
    pub description: String,
    /// One of: todo, in progress, done
    #[serde(default = "default_status")]
    pub status: String,
    pub tasks: Vec<Task>,
}

fn default_status() -> String {
    "todo".to_string()
}

/// 学习路线图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Roadmap {
    /// The main learning goal
    pub goal: String,
    /// Estimated duration
    pub duration: String,
    pub milestones: Vec<Milestone>,
}

impl Roadmap {
    /// 按 id 或序号（从 1 开始）查找里程碑，渲染为 Plan Builder 可用的上下文
    pub fn milestone_context(&self, selector: &str) -> Option<String> {
        let selector = selector.trim();
        let milestone = self
            .milestones
            .iter()
            .find(|m| m.id.eq_ignore_ascii_case(selector))
            .or_else(|| {
                selector
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| self.milestones.get(i))
            })?;

        let tasks: Vec<String> = milestone
            .tasks
            .iter()
            .map(|t| format!("- {}: {}", t.name, t.description))
            .collect();
        Some(format!(
            "Milestone {} - {}\n{}\nTasks:\n{}",
            milestone.id,
            milestone.title,
            milestone.description,
            tasks.join("\n")
        ))
    }

    pub fn display_summary(&self) -> String {
        let mut out = format!("Roadmap: {} ({})", self.goal, self.duration);
        for m in &self.milestones {
            out.push_str(&format!("\n[{}] {} - {} task(s), {}", m.id, m.title, m.tasks.len(), m.status));
        }
        out
    }
}

impl RefineTarget for Roadmap {
    const NAME: &'static str = "roadmap";

    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.goal.trim().is_empty() {
            errors.push("goal is empty".to_string());
        }
        if self.milestones.is_empty() {
            errors.push("roadmap has no milestones".to_string());
        }
        let mut seen = HashSet::new();
        for m in &self.milestones {
            if !seen.insert(m.id.as_str()) {
                errors.push(format!("milestone id '{}' is not unique", m.id));
            }
            if m.tasks.is_empty() {
                errors.push(format!("milestone '{}' has no tasks", m.id));
            }
            if !MILESTONE_STATUSES.contains(&m.status.to_lowercase().as_str()) {
                errors.push(format!(
                    "milestone '{}' has status '{}', expected one of {:?}",
                    m.id, m.status, MILESTONE_STATUSES
                ));
            }
        }
        errors
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Mcq {
    pub question: String,
    /// Skill this question assesses
    #[serde(default)]
    pub skill: String,
    pub options: Vec<String>,
    /// Must be exactly one of the options
    pub correct_answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ArticleQuestion {
    pub question: String,
    #[serde(default)]
    pub skill: String,
    #[serde(alias = "answer")]
    pub model_answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CodingQuestion {
    pub question: String,
    pub code_snippet: String,
    pub explanation: String,
}

/// 测验
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Quiz {
    pub topic: String,
    pub proficiency_level: String,
    pub mcq_questions: Vec<Mcq>,
    #[serde(default)]
    pub article_questions: Vec<ArticleQuestion>,
    #[serde(default)]
    pub coding_questions: Vec<CodingQuestion>,
}

impl Quiz {
    pub fn display_summary(&self) -> String {
        format!(
            "Quiz on '{}' ({}): {} multiple choice, {} short answer, {} coding question(s)",
            self.topic,
            self.proficiency_level,
            self.mcq_questions.len(),
            self.article_questions.len(),
            self.coding_questions.len()
        )
    }
}

impl RefineTarget for Quiz {
    const NAME: &'static str = "quiz";

    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.mcq_questions.is_empty() {
            errors.push("quiz has no multiple choice questions".to_string());
        }
        for (i, q) in self.mcq_questions.iter().enumerate() {
            if q.options.len() < 2 {
                errors.push(format!("mcq_{i} has fewer than 2 options"));
            }
            if !q.options.contains(&q.correct_answer) {
                errors.push(format!(
                    "mcq_{i} correct_answer '{}' is not one of its options",
                    q.correct_answer
                ));
            }
        }
        errors
    }
}

/// 恢复载荷：测验原文 + 作答（键为 mcq_{i}）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizSubmission {
    pub quiz: Quiz,
    pub user_answers: BTreeMap<String, String>,
}

/// 评分结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraderOutput {
    /// 百分比，保留两位小数
    pub accuracy: f64,
    pub correct: usize,
    pub answered: usize,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub summary_text: String,
}
