use crate::gemini::GeminiClient;
use anyhow::{anyhow, Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Answer quality dimensions scored after generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    ContextualPrecision,
    ContextualRecall,
    ContextualRelevancy,
    AnswerRelevancy,
    Faithfulness,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::ContextualPrecision,
        Metric::ContextualRecall,
        Metric::ContextualRelevancy,
        Metric::AnswerRelevancy,
        Metric::Faithfulness,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::ContextualPrecision => "contextual_precision",
            Metric::ContextualRecall => "contextual_recall",
            Metric::ContextualRelevancy => "contextual_relevancy",
            Metric::AnswerRelevancy => "answer_relevancy",
            Metric::Faithfulness => "faithfulness",
        }
    }

    fn criterion(&self) -> &'static str {
        match self {
            Metric::ContextualPrecision => {
                "Are the context passages that are relevant to the query ranked above the irrelevant ones?"
            }
            Metric::ContextualRecall => {
                "Does the context contain all the information needed to answer the query?"
            }
            Metric::ContextualRelevancy => {
                "What fraction of the context is relevant to the query?"
            }
            Metric::AnswerRelevancy => "Does the response directly address the query?",
            Metric::Faithfulness => {
                "Is every claim in the response supported by the context, with no contradictions?"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricResult {
    pub score: f32,
    pub passed: bool,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallResult {
    pub score: f32,
    pub passed: bool,
}

/// Per-metric results plus the mean score and whether every metric passed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub metrics: BTreeMap<Metric, MetricResult>,
    pub overall: OverallResult,
}

impl EvaluationReport {
    /// Build a report from raw `(metric, score, reason)` triples
    pub fn from_scores(threshold: f32, scores: Vec<(Metric, f32, String)>) -> Self {
        let metrics: BTreeMap<Metric, MetricResult> = scores
            .into_iter()
            .map(|(metric, score, reason)| {
                (
                    metric,
                    MetricResult {
                        score,
                        passed: score >= threshold,
                        reason,
                    },
                )
            })
            .collect();

        let overall = if metrics.is_empty() {
            OverallResult {
                score: 0.0,
                passed: false,
            }
        } else {
            OverallResult {
                score: metrics.values().map(|m| m.score).sum::<f32>() / metrics.len() as f32,
                passed: metrics.values().all(|m| m.passed),
            }
        };

        EvaluationReport { metrics, overall }
    }
}

/// Scores a generated answer against the context it was grounded on
#[allow(async_fn_in_trait)]
pub trait AnswerScorer {
    async fn evaluate(
        &self,
        query: &str,
        contexts: &[String],
        response: &str,
    ) -> Result<EvaluationReport>;
}

/// Uses the generation model as a judge, one request per metric
pub struct LlmJudge {
    gemini: GeminiClient,
    threshold: f32,
}

impl LlmJudge {
    pub fn new(gemini: GeminiClient, threshold: f32) -> Self {
        LlmJudge { gemini, threshold }
    }
}

impl AnswerScorer for LlmJudge {
    async fn evaluate(
        &self,
        query: &str,
        contexts: &[String],
        response: &str,
    ) -> Result<EvaluationReport> {
        if contexts.is_empty() {
            return Err(anyhow!("Cannot evaluate a response without retrieved contexts"));
        }
        let context = contexts.join("\n\n");

        let mut scores = Vec::with_capacity(Metric::ALL.len());
        for metric in Metric::ALL {
            let prompt = judge_prompt(metric, query, &context, response);
            let raw = self
                .gemini
                .generate_text(&prompt, 0.0, 256)
                .await
                .with_context(|| format!("Failed to score {}", metric.name()))?;
            debug!("Judge output for {}: {}", metric.name(), raw);

            let judgement = parse_judgement(&raw)
                .with_context(|| format!("Unreadable judgement for {}", metric.name()))?;
            scores.push((metric, judgement.score, judgement.reason));
        }

        Ok(EvaluationReport::from_scores(self.threshold, scores))
    }
}

#[derive(Debug, Deserialize)]
struct Judgement {
    score: f32,
    #[serde(default)]
    reason: String,
}

fn judge_prompt(metric: Metric, query: &str, context: &str, response: &str) -> String {
    format!(
        "You are grading a retrieval-augmented answer.\n\
Criterion ({name}): {criterion}\n\n\
Query:\n{query}\n\n\
Context:\n{context}\n\n\
Response:\n{response}\n\n\
Reply with JSON only: {{\"score\": <number between 0 and 1>, \"reason\": \"<one sentence>\"}}",
        name = metric.name(),
        criterion = metric.criterion(),
        query = query,
        context = context,
        response = response,
    )
}

/// Extract the JSON object from a judge reply, tolerating code fences and chatter
fn parse_judgement(raw: &str) -> Result<Judgement> {
    let start = raw.find('{').ok_or_else(|| anyhow!("no JSON object in reply"))?;
    let end = raw.rfind('}').ok_or_else(|| anyhow!("no JSON object in reply"))?;
    if end < start {
        return Err(anyhow!("malformed JSON object in reply"));
    }

    let mut judgement: Judgement = serde_json::from_str(&raw[start..=end])?;
    if !judgement.score.is_finite() {
        return Err(anyhow!("score is not a number"));
    }
    judgement.score = judgement.score.clamp(0.0, 1.0);
    if judgement.reason.is_empty() {
        judgement.reason = "No reason provided".to_string();
    }
    Ok(judgement)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_aggregates() {
        let report = EvaluationReport::from_scores(
            0.7,
            vec![
                (Metric::Faithfulness, 0.9, "grounded".to_string()),
                (Metric::AnswerRelevancy, 0.5, "drifts".to_string()),
            ],
        );
        assert!(report.metrics[&Metric::Faithfulness].passed);
        assert!(!report.metrics[&Metric::AnswerRelevancy].passed);
        assert!((report.overall.score - 0.7).abs() < 1e-6);
        assert!(!report.overall.passed);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["metrics"]["faithfulness"]["reason"], "grounded");
        assert_eq!(json["overall"]["passed"], false);
    }

    #[test]
    fn test_empty_report_does_not_pass() {
        let report = EvaluationReport::from_scores(0.7, Vec::new());
        assert!(!report.overall.passed);
        assert_eq!(report.overall.score, 0.0);
    }

    #[test]
    fn test_parse_judgement_with_fences() {
        let raw = "```json\n{\"score\": 0.85, \"reason\": \"Mostly supported.\"}\n```";
        let judgement = parse_judgement(raw).unwrap();
        assert!((judgement.score - 0.85).abs() < 1e-6);
        assert_eq!(judgement.reason, "Mostly supported.");
    }

    #[test]
    fn test_parse_judgement_clamps_and_defaults() {
        let judgement = parse_judgement("Sure! {\"score\": 3}").unwrap();
        assert_eq!(judgement.score, 1.0);
        assert_eq!(judgement.reason, "No reason provided");

        assert!(parse_judgement("no json here").is_err());
        assert!(parse_judgement("} backwards {").is_err());
    }

    #[test]
    fn test_judge_prompt_mentions_metric() {
        let prompt = judge_prompt(Metric::Faithfulness, "q", "ctx", "resp");
        assert!(prompt.contains("Criterion (faithfulness)"));
        assert!(prompt.contains("Context:\nctx"));
    }
}
