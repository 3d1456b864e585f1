//! Worker 注册表：WorkerName → Worker 的静态表
//!
//! standard() 为每个 WorkerName 注册一个实现；测试可以用 register 替换单个 worker。

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::OrchestratorSection;
use crate::plan::WorkerName;
use crate::tools::Collaborators;
use crate::workers::{
    ExplainerWorker, GraderWorker, QuizWorker, RoadmapWorker, SubmissionGate, SummarizerWorker, Worker,
};

#[derive(Clone, Default)]
pub struct WorkerRegistry {
    workers: HashMap<WorkerName, Arc<dyn Worker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 全部六个 worker
    pub fn standard(collaborators: &Collaborators, settings: &OrchestratorSection) -> Self {
        let attempts = settings.max_refine_attempts;
        let mut registry = Self::new();
        registry.register(RoadmapWorker::new(collaborators.clone(), attempts));
        registry.register(QuizWorker::new(collaborators, attempts));
        registry.register(ExplainerWorker::new(collaborators.clone()));
        registry.register(SummarizerWorker::new(collaborators.clone()));
        registry.register(SubmissionGate);
        registry.register(GraderWorker::new(collaborators.clone()));
        registry
    }

    pub fn register(&mut self, worker: impl Worker + 'static) {
        self.workers.insert(worker.name(), Arc::new(worker));
    }

    pub fn get(&self, name: WorkerName) -> Option<Arc<dyn Worker>> {
        self.workers.get(&name).cloned()
    }

    pub fn names(&self) -> Vec<WorkerName> {
        WorkerName::ALL
            .into_iter()
            .filter(|n| self.workers.contains_key(n))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    #[test]
    fn test_standard_registry_covers_every_worker() {
        let collab = Collaborators::with_llm(Arc::new(MockLlmClient));
        let registry = WorkerRegistry::standard(&collab, &OrchestratorSection::default());
        assert_eq!(registry.names(), WorkerName::ALL.to_vec());
        for name in WorkerName::ALL {
            assert_eq!(registry.get(name).unwrap().name(), name);
        }
    }
}
