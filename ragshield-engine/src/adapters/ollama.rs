//! Ollama API client
//!
//! Implements both the [`Embedder`] and [`Generator`] collaborator
//! interfaces against a local Ollama instance.

use crate::adapters::{Embedder, Generator};
use crate::error::{Error, Result};
use async_trait::async_trait;
use ragshield_common::schemas::Document;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

/// Client for Ollama's generate and embeddings endpoints
pub struct OllamaClient {
    base_url: String,
    generation_model: String,
    embedding_model: String,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(base_url: &str, generation_model: &str, embedding_model: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            generation_model: generation_model.to_string(),
            embedding_model: embedding_model.to_string(),
            client,
        })
    }

    fn build_prompt(query: &str, docs: &[Document]) -> String {
        let context = docs
            .iter()
            .enumerate()
            .map(|(i, doc)| format!("Document {}:\n{}", i + 1, doc.content))
            .collect::<Vec<_>>()
            .join("\n\n");

        format!(
            "You are a security analyst assistant. Answer the following question \
             using ONLY the provided context documents. Be concise and accurate.\n\n\
             Context:\n{context}\n\nQuestion: {query}\n\nAnswer:"
        )
    }
}

#[async_trait]
impl Generator for OllamaClient {
    async fn generate(&self, query: &str, docs: &[Document]) -> Result<String> {
        let prompt = Self::build_prompt(query, docs);
        debug!(model = %self.generation_model, docs = docs.len(), "generating answer");

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&GenerateRequest {
                model: &self.generation_model,
                prompt: &prompt,
                stream: false,
            })
            .send()
            .await
            .map_err(|e| Error::Generation(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Generation(format!("API error {status}")));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::Generation(format!("malformed response: {e}")))?;

        Ok(body.response.trim().to_string())
    }

    async fn healthy(&self) -> bool {
        let request = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(HEALTH_TIMEOUT)
            .send();

        match request.await {
            Ok(response) if response.status().is_success() => {
                match response.json::<TagsResponse>().await {
                    Ok(tags) => tags
                        .models
                        .iter()
                        .any(|m| m.name.contains(&self.generation_model)),
                    Err(_) => false,
                }
            }
            _ => false,
        }
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&EmbeddingsRequest {
                model: &self.embedding_model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| Error::Retrieval(format!("embedding request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Retrieval(format!("embedding API error {status}")));
        }

        let body: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| Error::Retrieval(format!("malformed embedding response: {e}")))?;

        if body.embedding.is_empty() {
            return Err(Error::Retrieval("embedding response was empty".to_string()));
        }

        Ok(body.embedding)
    }
}
