//! Fachada del sistema RAG: compone procesador de documentos, vector
//! store, herramientas, orquestador y sesiones.
//!
//! Flujo de consulta:
//!   1. Recupera el historial de la sesión (si la hay).
//!   2. El orquestador llama al modelo, que decide si buscar.
//!   3. Las fuentes recuperadas vuelven junto con la respuesta.
//!   4. El intercambio se persiste en la sesión.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::Serialize;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::config::AppConfig;
use crate::document::DocumentProcessor;
use crate::embedding::Embedder;
use crate::llm::{AiGenerator, CompletionBackend};
use crate::session::SessionManager;
use crate::store::ChunkStore;
use crate::tools::{OutlineTool, SearchTool, ToolManager};
use crate::vector_store::VectorStore;

/// Estadísticas de catálogo para la capa web.
#[derive(Debug, Clone, Serialize)]
pub struct CourseAnalytics {
    pub total_courses: usize,
    pub course_titles: Vec<String>,
}

/// Sistema RAG completo sobre materiales de curso.
pub struct RagSystem {
    processor: DocumentProcessor,
    vector_store: Arc<VectorStore>,
    tool_manager: ToolManager,
    generator: AiGenerator,
    session_manager: SessionManager,
}

impl RagSystem {
    /// Compone el sistema a partir de la configuración y los backends
    /// (store, embedder y modelo) ya construidos.
    pub fn new(
        cfg: &AppConfig,
        store: Arc<dyn ChunkStore>,
        embedder: Arc<dyn Embedder>,
        backend: Arc<dyn CompletionBackend>,
    ) -> Self {
        let vector_store = Arc::new(VectorStore::new(store, embedder, cfg.max_results));

        let mut tool_manager = ToolManager::new();
        tool_manager.register(Arc::new(SearchTool::new(vector_store.clone())));
        tool_manager.register(Arc::new(OutlineTool::new(vector_store.clone())));

        Self {
            processor: DocumentProcessor::new(cfg.chunk_size, cfg.chunk_overlap),
            vector_store,
            tool_manager,
            generator: AiGenerator::new(backend),
            session_manager: SessionManager::new(cfg.max_history),
        }
    }

    /// Responde una pregunta sobre los materiales, devolviendo la
    /// respuesta y las fuentes citadas. Si se indica una sesión, el
    /// historial acompaña a la petición y el intercambio se persiste.
    pub async fn query(&self, text: &str, session_id: Option<&str>) -> (String, Vec<String>) {
        let prompt = format!("Answer this question about course materials: {text}");
        let history = session_id.and_then(|id| self.session_manager.get_history(id));
        let tools = self.tool_manager.get_tool_definitions();

        let (answer, sources) = self
            .generator
            .generate(
                &prompt,
                history.as_deref(),
                &tools,
                Some(&self.tool_manager),
            )
            .await;

        if let Some(id) = session_id {
            self.session_manager.add_exchange(id, text, &answer);
        }

        (answer, sources)
    }

    /// Ingesta todos los documentos de curso de un directorio.
    ///
    /// Con `clear_existing` vacía antes ambas colecciones. Los cursos
    /// cuyo título ya está en el catálogo se saltan, de modo que
    /// re-ejecutar la ingesta no duplica datos. Un fichero que falla se
    /// registra y se salta; el lote continúa.
    pub async fn ingest_folder(
        &self,
        path: &Path,
        clear_existing: bool,
    ) -> Result<(usize, usize)> {
        if !path.is_dir() {
            return Err(anyhow!("La ruta no es un directorio: {}", path.display()));
        }

        if clear_existing {
            info!("Vaciando colecciones antes de la ingesta...");
            self.vector_store.clear_all_data().await?;
        }

        let mut existing: HashSet<String> = self
            .vector_store
            .get_course_titles()
            .await?
            .into_iter()
            .collect();

        let mut courses_added = 0usize;
        let mut chunks_added = 0usize;

        for entry in WalkDir::new(path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let file_path = entry.path();
            if !DocumentProcessor::is_course_document(file_path) {
                info!("Saltando fichero no soportado: {}", file_path.display());
                continue;
            }

            let Some((course, chunks)) = self.processor.process(file_path) else {
                // El procesador ya ha dejado el aviso en el log.
                continue;
            };

            if existing.contains(&course.title) {
                info!("Curso '{}' ya en el catálogo; se salta.", course.title);
                continue;
            }

            match self.add_course(&course, &chunks).await {
                Ok(()) => {
                    existing.insert(course.title.clone());
                    courses_added += 1;
                    chunks_added += chunks.len();
                    info!(
                        "Ingerido '{}' con {} lecciones y {} chunks.",
                        course.title,
                        course.lessons.len(),
                        chunks.len()
                    );
                }
                Err(err) => {
                    error!(
                        "Error ingiriendo {}: {err:#}. Se continúa con el resto.",
                        file_path.display()
                    );
                }
            }
        }

        if courses_added == 0 {
            warn!("La ingesta no añadió ningún curso nuevo desde {}.", path.display());
        }
        Ok((courses_added, chunks_added))
    }

    async fn add_course(
        &self,
        course: &crate::models::Course,
        chunks: &[crate::models::CourseChunk],
    ) -> Result<()> {
        self.vector_store.add_course_metadata(course).await?;
        self.vector_store.add_course_content(chunks).await?;
        Ok(())
    }

    /// Estadísticas del catálogo (número y títulos de cursos).
    pub async fn get_course_analytics(&self) -> Result<CourseAnalytics> {
        Ok(CourseAnalytics {
            total_courses: self.vector_store.get_course_count().await?,
            course_titles: self.vector_store.get_course_titles().await?,
        })
    }

    /// Número de cursos cargados (health check).
    pub async fn course_count(&self) -> Result<usize> {
        self.vector_store.get_course_count().await
    }

    /// Acceso al gestor de sesiones para la capa web.
    pub fn session_manager(&self) -> &SessionManager {
        &self.session_manager
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatRequest, ModelReply};
    use crate::memory_store::MemoryChunkStore;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::Mutex;

    /// Embedder constante: suficiente para tests de ingesta y recuento.
    struct FlatEmbedder;

    #[async_trait]
    impl Embedder for FlatEmbedder {
        fn model_name(&self) -> &str {
            "flat-test-embedder"
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    /// Backend que siempre responde el mismo texto y registra peticiones.
    struct ConstBackend {
        requests: Mutex<Vec<ChatRequest>>,
    }

    #[async_trait]
    impl CompletionBackend for ConstBackend {
        async fn complete(&self, request: ChatRequest) -> Result<ModelReply> {
            self.requests.lock().unwrap().push(request);
            Ok(ModelReply {
                text: "respuesta".to_string(),
                tool_calls: Vec::new(),
            })
        }
    }

    fn test_config() -> AppConfig {
        AppConfig {
            neo4j_uri: "bolt://localhost:7687".to_string(),
            neo4j_user: "neo4j".to_string(),
            neo4j_password: "secret".to_string(),
            server_addr: "127.0.0.1:0".to_string(),
            llm_provider: crate::config::LlmProvider::OpenAI,
            llm_embedding_model: String::new(),
            llm_chat_model: String::new(),
            docs_dir: "docs".to_string(),
            chunk_size: 800,
            chunk_overlap: 100,
            max_results: 5,
            max_history: 2,
        }
    }

    fn rag_with_const_backend() -> (RagSystem, Arc<ConstBackend>) {
        let backend = Arc::new(ConstBackend {
            requests: Mutex::new(Vec::new()),
        });
        let rag = RagSystem::new(
            &test_config(),
            Arc::new(MemoryChunkStore::new()),
            Arc::new(FlatEmbedder),
            backend.clone(),
        );
        (rag, backend)
    }

    fn write_course_doc(dir: &Path, name: &str, title: &str) {
        let content = format!(
            "Course: {title}\nInstructor: Ada\nLink: https://example.com/c\n\
             Lesson 1: Introduction\nLink: https://example.com/l1\n\
             First sentence of content. Second sentence of content.\n"
        );
        fs::write(dir.join(name), content).unwrap();
    }

    #[tokio::test]
    async fn la_ingesta_es_idempotente_sin_clear() {
        let dir = tempfile::tempdir().unwrap();
        write_course_doc(dir.path(), "a.txt", "Curso A");
        write_course_doc(dir.path(), "b.txt", "Curso B");

        let (rag, _) = rag_with_const_backend();

        let (courses, chunks) = rag.ingest_folder(dir.path(), false).await.unwrap();
        assert_eq!(courses, 2);
        assert!(chunks > 0);
        assert_eq!(rag.course_count().await.unwrap(), 2);

        // Segunda pasada: mismos títulos, nada nuevo.
        let (courses, chunks) = rag.ingest_folder(dir.path(), false).await.unwrap();
        assert_eq!((courses, chunks), (0, 0));
        assert_eq!(rag.course_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn un_fichero_malo_no_aborta_el_lote() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("roto.txt"), "sin cabecera valida\n").unwrap();
        write_course_doc(dir.path(), "bueno.txt", "Curso Bueno");

        let (rag, _) = rag_with_const_backend();
        let (courses, _) = rag.ingest_folder(dir.path(), false).await.unwrap();
        assert_eq!(courses, 1);
    }

    #[tokio::test]
    async fn clear_existing_recarga_desde_cero() {
        let dir = tempfile::tempdir().unwrap();
        write_course_doc(dir.path(), "a.txt", "Curso A");

        let (rag, _) = rag_with_const_backend();
        rag.ingest_folder(dir.path(), false).await.unwrap();
        let (courses, _) = rag.ingest_folder(dir.path(), true).await.unwrap();
        assert_eq!(courses, 1);
        assert_eq!(rag.course_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn una_ruta_no_directorio_es_error() {
        let (rag, _) = rag_with_const_backend();
        assert!(rag
            .ingest_folder(Path::new("/no/existe/en/absoluto"), false)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn query_envuelve_la_pregunta_y_persiste_la_sesion() {
        let (rag, backend) = rag_with_const_backend();
        let session = rag.session_manager().create();

        let (answer, sources) = rag.query("What is Python?", Some(&session)).await;
        assert_eq!(answer, "respuesta");
        assert!(sources.is_empty());

        {
            let requests = backend.requests.lock().unwrap();
            match &requests[0].messages[0] {
                crate::llm::ChatMessage::User(text) => {
                    assert_eq!(
                        text,
                        "Answer this question about course materials: What is Python?"
                    );
                }
                other => panic!("se esperaba turno de usuario, llegó {other:?}"),
            }
            // Ambas herramientas viajan siempre en la primera llamada.
            assert_eq!(requests[0].tools.len(), 2);
        }

        // La segunda consulta de la misma sesión lleva el historial.
        rag.query("And variables?", Some(&session)).await;
        let requests = backend.requests.lock().unwrap();
        let system = &requests[1].system;
        assert!(system.contains("Previous conversation:"));
        assert!(system.contains("User: What is Python?"));
        assert!(system.contains("Assistant: respuesta"));
    }

    #[tokio::test]
    async fn analytics_refleja_el_catalogo() {
        let dir = tempfile::tempdir().unwrap();
        write_course_doc(dir.path(), "a.txt", "Curso A");

        let (rag, _) = rag_with_const_backend();
        rag.ingest_folder(dir.path(), false).await.unwrap();

        let analytics = rag.get_course_analytics().await.unwrap();
        assert_eq!(analytics.total_courses, 1);
        assert_eq!(analytics.course_titles, vec!["Curso A".to_string()]);
    }
}
