//! 路线图 worker（planner）
//!
//! 先做网页与视频检索（失败降级为占位文本），再用精炼循环生成 Roadmap。

use async_trait::async_trait;
use serde_json::json;

use crate::core::{AgentError, ExecutionLogEntry, PartialState, SharedState};
use crate::memory::Message;
use crate::plan::WorkerName;
use crate::refine::{RefineOutcome, RefinementLoop};
use crate::tools::Collaborators;
use crate::workers::schema::Roadmap;
use crate::workers::{degrade, instruction_of, record_refinement, Worker};

pub struct RoadmapWorker {
    collaborators: Collaborators,
    refiner: RefinementLoop,
}

impl RoadmapWorker {
    pub fn new(collaborators: Collaborators, max_attempts: u32) -> Self {
        Self {
            refiner: RefinementLoop::new(&collaborators, max_attempts),
            collaborators,
        }
    }

    async fn research(&self, goal: &str, partial: &mut PartialState) -> String {
        let query = format!("how to learn {goal} roadmap steps resources");
        let web = match self.collaborators.web.search_web(&query).await {
            Ok(text) => text,
            Err(e) => {
                let (placeholder, entry) = degrade(self.name(), "web_search", e.into());
                partial.execution_log.push(entry);
                placeholder
            }
        };
        let videos = match self.collaborators.video.search_video(goal).await {
            Ok(videos) if videos.is_empty() => "No videos found.".to_string(),
            Ok(videos) => videos
                .iter()
                .map(|v| format!("- {} ({}) {}", v.title, v.channel, v.url))
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => {
                let (placeholder, entry) = degrade(self.name(), "video_search", e.into());
                partial.execution_log.push(entry);
                placeholder
            }
        };
        format!("WEB RESEARCH:\n{web}\n\nVIDEO RESOURCES:\n{videos}")
    }
}

#[async_trait]
impl Worker for RoadmapWorker {
    fn name(&self) -> WorkerName {
        WorkerName::Planner
    }

    async fn execute(&self, state: &SharedState) -> Result<PartialState, AgentError> {
        let instruction = instruction_of(state);
        let mut partial = PartialState::new();

        let research = self.research(instruction, &mut partial).await;
        let context = format!("{}\n\n{research}", state.conversation_summary);
        let refined = self.refiner.run::<Roadmap>(instruction, &context).await;
        let attempts = refined.attempts;
        let mut partial = record_refinement(self.name(), &refined, partial);

        match refined.outcome {
            RefineOutcome::Accepted(roadmap) => {
                let summary = roadmap.display_summary();
                partial.raw_data_storage.push(json!({ "roadmap": &roadmap }));
                partial.research_memory.push(format!("Roadmap created for: {instruction}"));
                partial.messages.push(Message::assistant(summary.clone()));
                partial.execution_log.push(ExecutionLogEntry::new(
                    self.name().as_str(),
                    "roadmap_accepted",
                    json!({ "milestones": roadmap.milestones.len(), "failed_attempts": attempts }),
                ));
                partial.final_output = Some(summary);
                partial.roadmap = Some(roadmap);
            }
            RefineOutcome::Exhausted { feedback, last } => {
                let message = format!(
                    "Could not produce an acceptable roadmap after {attempts} attempts. Last feedback: {feedback}"
                );
                if let Some(draft) = last {
                    partial.raw_data_storage.push(json!({ "rejected_roadmap": draft }));
                }
                partial.messages.push(Message::assistant(message.clone()));
                partial.last_error = Some(message.clone());
                partial.final_output = Some(message);
            }
        }
        Ok(partial)
    }
}
