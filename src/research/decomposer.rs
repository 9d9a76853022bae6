// Subtask decomposer - splits one topic into three fixed research angles

use crate::models::{ResearchJob, SubtaskAngle};

use super::prompts::{build_degraded_prompt, build_recombination_template, build_subtask_prompt};

/// One independently researchable piece of a topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subtask {
    pub angle: SubtaskAngle,
    pub prompt: String,
    /// Reduced-scope prompt for the single degraded attempt
    pub degraded_prompt: String,
}

impl Subtask {
    pub fn index(&self) -> usize {
        self.angle.index()
    }

    /// Short label used in logs and progress messages
    pub fn label(&self) -> String {
        format!("subtask {} ({})", self.index() + 1, self.angle.title())
    }
}

/// Output of [`decompose`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decomposition {
    pub topic: String,
    pub subtasks: [Subtask; 3],
    pub recombination_template: String,
}

/// Split a topic into the three fixed angles plus a recombination template.
///
/// The partitioning does not depend on the topic's content; it only keeps
/// each call small enough to finish within one completion timeout.
pub fn decompose(
    topic: &str,
    context: &str,
    entity: Option<&str>,
    sources: &[String],
) -> Decomposition {
    let subtasks = SubtaskAngle::all().map(|angle| Subtask {
        angle,
        prompt: build_subtask_prompt(angle, topic, context, entity, sources),
        degraded_prompt: build_degraded_prompt(angle, topic, entity),
    });

    Decomposition {
        topic: topic.to_string(),
        subtasks,
        recombination_template: build_recombination_template(topic, context),
    }
}

/// Decompose a registered job
pub fn decompose_job(job: &ResearchJob) -> Decomposition {
    decompose(&job.topic, &job.context, job.entity.as_deref(), &job.sources)
}
