use crate::gemini::GeminiClient;
use anyhow::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;

/// Named inputs handed to a task graph run
#[derive(Debug, Clone)]
pub struct TaskInputs {
    pub topic: String,
    pub query: String,
    pub retrieval_context: String,
}

/// Something that turns retrieved context and a query into a final artifact
#[allow(async_fn_in_trait)]
pub trait TaskGraphExecutor {
    async fn kickoff(&self, inputs: &TaskInputs) -> Result<String>;
}

/// Two sequential tasks: research over the retrieved context, then a written report
pub struct ResearchCrew {
    gemini: GeminiClient,
    report_path: PathBuf,
}

impl ResearchCrew {
    pub fn new(gemini: GeminiClient, report_path: impl Into<PathBuf>) -> Self {
        ResearchCrew {
            gemini,
            report_path: report_path.into(),
        }
    }
}

impl TaskGraphExecutor for ResearchCrew {
    async fn kickoff(&self, inputs: &TaskInputs) -> Result<String> {
        info!("Running research task");
        let research = self
            .gemini
            .generate_text(&research_prompt(inputs), 0.2, 1024)
            .await
            .context("Research task failed")?;

        info!("Running reporting task");
        let report = self
            .gemini
            .generate_text(&reporting_prompt(inputs, &research), 0.3, 2048)
            .await
            .context("Reporting task failed")?;

        if let Some(parent) = self.report_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&self.report_path, &report)
            .with_context(|| format!("Failed to write report to {}", self.report_path.display()))?;
        info!("Report written to {}", self.report_path.display());

        Ok(report)
    }
}

fn research_prompt(inputs: &TaskInputs) -> String {
    format!(
        "You are a senior researcher on {topic}. Answer the question using only the \
retrieved information below. Cite the context numbers you rely on and say so \
plainly if the information is insufficient.\n\n\
Topic: {topic}\n\
Query: {query}\n\
Retrieved Information:\n{context}\n\n\
Produce a list of the key findings relevant to the query.",
        topic = inputs.topic,
        query = inputs.query,
        context = inputs.retrieval_context,
    )
}

fn reporting_prompt(inputs: &TaskInputs, research: &str) -> String {
    format!(
        "You are a reporting analyst on {topic}. Turn the research findings below into \
a clear, well-structured markdown report that answers the query. Do not add facts \
that are not in the research.\n\n\
Topic: {topic}\n\
Query: {query}\n\
Research:\n{research}",
        topic = inputs.topic,
        query = inputs.query,
        research = research,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> TaskInputs {
        TaskInputs {
            topic: "AI RAG Systems".to_string(),
            query: "What color is the sky?".to_string(),
            retrieval_context: "Context #1:\nThe sky is blue.".to_string(),
        }
    }

    #[test]
    fn test_research_prompt_carries_inputs() {
        let prompt = research_prompt(&inputs());
        assert!(prompt.contains("Topic: AI RAG Systems"));
        assert!(prompt.contains("Query: What color is the sky?"));
        assert!(prompt.contains("Retrieved Information:\nContext #1:\nThe sky is blue."));
    }

    #[test]
    fn test_reporting_prompt_uses_research_output() {
        let prompt = reporting_prompt(&inputs(), "- The sky is blue");
        assert!(prompt.contains("Research:\n- The sky is blue"));
        assert!(!prompt.contains("Retrieved Information"));
    }
}
