use crate::config::parse_var;
use crate::embeddings::EmbeddingProvider;
use crate::error::{RagError, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::env;

const DEFAULT_EMBEDDINGS_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/text-embedding-004:embedContent";
const DEFAULT_BATCH_EMBEDDINGS_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/text-embedding-004:batchEmbedContents";
const DEFAULT_GENERATE_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";
const DEFAULT_EMBEDDING_MODEL: &str = "models/text-embedding-004";
const DEFAULT_EMBEDDING_DIMENSION: usize = 768;

// batchEmbedContents accepts at most 100 requests per call
const MAX_BATCH_SIZE: usize = 100;

/// Configuration for Gemini API
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub embeddings_url: String,
    pub batch_embeddings_url: String,
    pub generate_url: String,
    pub embedding_model: String,
    pub embedding_dimension: usize,
}

impl GeminiConfig {
    /// Create a new configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("GEMINI_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| RagError::Configuration("GEMINI_API_KEY is not set".to_string()))?;

        Ok(GeminiConfig {
            api_key,
            embeddings_url: lookup("GEMINI_EMBEDDINGS_URL")
                .unwrap_or_else(|| DEFAULT_EMBEDDINGS_URL.to_string()),
            batch_embeddings_url: lookup("GEMINI_BATCH_EMBEDDINGS_URL")
                .unwrap_or_else(|| DEFAULT_BATCH_EMBEDDINGS_URL.to_string()),
            generate_url: lookup("GEMINI_GENERATE_URL")
                .unwrap_or_else(|| DEFAULT_GENERATE_URL.to_string()),
            embedding_model: lookup("GEMINI_EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_dimension: parse_var(
                &lookup,
                "GEMINI_EMBEDDING_DIMENSION",
                DEFAULT_EMBEDDING_DIMENSION,
            )?,
        })
    }
}

/// Client for interacting with Gemini API
#[derive(Clone)]
pub struct GeminiClient {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiClient {
    /// Create a new Gemini client
    pub fn new(config: GeminiConfig) -> Self {
        let client = reqwest::Client::new();
        GeminiClient { config, client }
    }

    /// Get the client configuration
    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    async fn request_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let request = BatchEmbeddingRequest {
            requests: texts
                .iter()
                .map(|&text| EmbeddingRequest {
                    model: &self.config.embedding_model,
                    content: EmbeddingContent {
                        parts: vec![Part { text }],
                    },
                })
                .collect(),
        };

        let url = format!(
            "{}?key={}",
            self.config.batch_embeddings_url, self.config.api_key
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::Embedding(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RagError::Embedding(format!(
                "API request failed: {} {}",
                status, error_text
            )));
        }

        let response_data: BatchEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| RagError::Embedding(format!("malformed response: {}", e)))?;

        if response_data.embeddings.len() != texts.len() {
            return Err(RagError::Embedding(format!(
                "expected {} embeddings, received {}",
                texts.len(),
                response_data.embeddings.len()
            )));
        }

        response_data
            .embeddings
            .into_iter()
            .map(|data| self.check_dimension(data.values))
            .collect()
    }

    fn check_dimension(&self, values: Vec<f32>) -> Result<Vec<f32>> {
        if values.len() != self.config.embedding_dimension {
            return Err(RagError::DimensionMismatch {
                collection: self.config.embedding_model.clone(),
                expected: self.config.embedding_dimension,
                actual: values.len(),
            });
        }
        Ok(values)
    }

    /// Generate text from a prompt
    pub async fn generate_text(
        &self,
        prompt: &str,
        temperature: f32,
        max_output_tokens: i32,
    ) -> anyhow::Result<String> {
        let request = GenerateRequest {
            contents: vec![Content::new_with_role(prompt, "user")],
            generation_config: GenerationConfig {
                temperature,
                top_p: 0.8,
                top_k: 40,
                max_output_tokens,
            },
        };

        let url = format!("{}?key={}", self.config.generate_url, self.config.api_key);

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!("API request failed: {}", error_text));
        }

        let response_data: GenerateResponse = response.json().await?;

        // Extract the generated text from the response
        response_data
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| anyhow::anyhow!("No response generated"))
    }
}

impl EmbeddingProvider for GeminiClient {
    fn model_id(&self) -> &str {
        &self.config.embedding_model
    }

    fn dimension(&self) -> usize {
        self.config.embedding_dimension
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        // The API rejects empty content
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.config.embedding_dimension]);
        }

        let request = EmbeddingRequest {
            model: &self.config.embedding_model,
            content: EmbeddingContent {
                parts: vec![Part { text }],
            },
        };

        let url = format!("{}?key={}", self.config.embeddings_url, self.config.api_key);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::Embedding(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RagError::Embedding(format!(
                "API request failed: {} {}",
                status, error_text
            )));
        }

        let response_data: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| RagError::Embedding(format!("malformed response: {}", e)))?;

        self.check_dimension(response_data.embedding.values)
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = vec![Vec::new(); texts.len()];

        // Empty texts are answered locally; the rest go out in batches
        let pending: Vec<(usize, &str)> = texts
            .iter()
            .enumerate()
            .filter_map(|(idx, text)| {
                if text.trim().is_empty() {
                    None
                } else {
                    Some((idx, text.as_str()))
                }
            })
            .collect();

        for (idx, text) in texts.iter().enumerate() {
            if text.trim().is_empty() {
                vectors[idx] = vec![0.0; self.config.embedding_dimension];
            }
        }

        for batch in pending.chunks(MAX_BATCH_SIZE) {
            let batch_texts: Vec<&str> = batch.iter().map(|(_, text)| *text).collect();
            debug!("Embedding batch of {} texts", batch_texts.len());
            let embedded = self.request_embeddings(&batch_texts).await?;
            for ((idx, _), vector) in batch.iter().zip(embedded) {
                vectors[*idx] = vector;
            }
        }

        Ok(vectors)
    }
}

// Request/response structures for the Gemini API

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    content: EmbeddingContent<'a>,
}

#[derive(Serialize)]
struct EmbeddingContent<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct BatchEmbeddingRequest<'a> {
    requests: Vec<EmbeddingRequest<'a>>,
}

#[derive(Deserialize, Debug)]
struct EmbeddingResponse {
    embedding: EmbeddingData,
}

#[derive(Deserialize, Debug)]
struct BatchEmbeddingResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingData>,
}

#[derive(Deserialize, Debug)]
struct EmbeddingData {
    values: Vec<f32>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
    role: &'static str,
}

impl<'a> Content<'a> {
    fn new_with_role(text: &'a str, role: &'static str) -> Self {
        Content {
            parts: vec![Part { text }],
            role,
        }
    }
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Deserialize, Debug)]
struct GenerateResponse {
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Deserialize, Debug)]
struct ResponseContent {
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    text: String,
}
