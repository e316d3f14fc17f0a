//! Función de embeddings tras un trait, con implementación sobre Rig.
//! De momento se implementa OpenAI; Gemini/Ollama quedan preparados para
//! el futuro.

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::config::{AppConfig, LlmProvider};

/// Función de embeddings que consumen el vector store y la resolución
/// difusa de nombres de curso.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identificador del modelo (ej. `text-embedding-3-small`).
    fn model_name(&self) -> &str;

    /// Calcula un embedding por texto, en el mismo orden.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f64>>>;
}

/// Embedder respaldado por la API de OpenAI vía Rig.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    model: String,
}

impl OpenAiEmbedder {
    /// Construye el embedder a partir de la configuración. Solo OpenAI
    /// está implementado; otros proveedores devuelven error.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        match cfg.llm_provider {
            LlmProvider::OpenAI => Ok(Self {
                model: cfg.llm_embedding_model.clone(),
            }),
            ref other => Err(anyhow!(
                "Proveedor LLM {:?} aún no implementado para embeddings",
                other
            )),
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        use rig::providers::openai::{self, TEXT_EMBEDDING_3_SMALL};
        // Trait para client.embedding_model(...)
        use rig::client::EmbeddingsClient as _;
        use rig::embeddings::EmbeddingModel as _;

        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let client = openai::Client::from_env();

        // Modelo de embeddings: config o default
        let model_name = if self.model.is_empty() {
            TEXT_EMBEDDING_3_SMALL
        } else {
            self.model.as_str()
        };

        let embedding_model = client.embedding_model(model_name);
        let embeddings = embedding_model.embed_texts(texts.to_vec()).await?;

        if embeddings.len() != texts.len() {
            return Err(anyhow!(
                "Número de embeddings ({}) distinto al número de textos ({})",
                embeddings.len(),
                texts.len()
            ));
        }

        Ok(embeddings.into_iter().map(|e| e.vec).collect())
    }
}
