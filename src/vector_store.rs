//! Capa de semántica de cursos sobre el [`ChunkStore`]: catálogo de
//! cursos, contenido troceado, resolución difusa de nombres y búsqueda
//! filtrada por similitud.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::embedding::Embedder;
use crate::models::{Course, CourseChunk, Lesson, SearchResults};
use crate::store::{ChunkStore, Collection, MetadataFilter, StoredRow};

/// Distancia coseno máxima para aceptar la resolución difusa de un
/// nombre de curso. Por encima de este valor el candidato más cercano
/// se descarta y la resolución devuelve `None`.
pub const COURSE_NAME_MAX_DISTANCE: f64 = 0.6;

/// Fila del catálogo deserializada, tal y como la consume el outline.
#[derive(Debug, Clone)]
pub struct CourseMetadata {
    pub title: String,
    pub instructor: String,
    pub course_link: String,
    pub lessons: Vec<Lesson>,
}

/// Vector store de dos colecciones (catálogo + contenido).
pub struct VectorStore {
    store: Arc<dyn ChunkStore>,
    embedder: Arc<dyn Embedder>,
    max_results: usize,
}

impl VectorStore {
    pub fn new(store: Arc<dyn ChunkStore>, embedder: Arc<dyn Embedder>, max_results: usize) -> Self {
        Self {
            store,
            embedder,
            max_results,
        }
    }

    /// Inserta (o reemplaza) la fila de catálogo de un curso. Idempotente
    /// sobre el título: re-ingerir el mismo curso no duplica filas.
    pub async fn add_course_metadata(&self, course: &Course) -> Result<()> {
        let embedding = self.embed_one(&course.title).await?;

        let mut metadata = serde_json::Map::new();
        metadata.insert("instructor".into(), json!(course.instructor));
        metadata.insert("course_link".into(), json!(course.course_link));
        metadata.insert(
            "lessons_json".into(),
            json!(serde_json::to_string(&course.lessons)?),
        );

        self.store
            .upsert(
                Collection::Catalog,
                StoredRow {
                    id: course.title.clone(),
                    text: course.title.clone(),
                    embedding,
                    metadata,
                },
            )
            .await
    }

    /// Inserta los chunks de contenido de un curso. No deduplica: el
    /// llamante es responsable de no re-ingerir un curso dos veces.
    pub async fn add_course_content(&self, chunks: &[CourseChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;

        let rows: Vec<StoredRow> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| {
                let mut metadata = serde_json::Map::new();
                metadata.insert("course_title".into(), json!(chunk.course_title));
                metadata.insert(
                    "lesson_number".into(),
                    match chunk.lesson_number {
                        Some(n) => json!(n),
                        None => serde_json::Value::Null,
                    },
                );
                metadata.insert("chunk_index".into(), json!(chunk.chunk_index));
                StoredRow {
                    id: Uuid::new_v4().to_string(),
                    text: chunk.content.clone(),
                    embedding,
                    metadata,
                }
            })
            .collect();

        self.store.add(Collection::Content, rows).await
    }

    /// Número de cursos en el catálogo. Funciona sobre un store vacío.
    pub async fn get_course_count(&self) -> Result<usize> {
        self.store.count(Collection::Catalog).await
    }

    /// Títulos de todos los cursos del catálogo.
    pub async fn get_course_titles(&self) -> Result<Vec<String>> {
        self.store.ids(Collection::Catalog).await
    }

    /// Fila de catálogo completa de un curso (por título exacto).
    pub async fn get_course_metadata(&self, title: &str) -> Result<Option<CourseMetadata>> {
        let Some(row) = self.store.get(Collection::Catalog, title).await? else {
            return Ok(None);
        };

        let instructor = row
            .metadata
            .get("instructor")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let course_link = row
            .metadata
            .get("course_link")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let lessons: Vec<Lesson> = row
            .metadata
            .get("lessons_json")
            .and_then(|v| v.as_str())
            .map(serde_json::from_str)
            .transpose()?
            .unwrap_or_default();

        Ok(Some(CourseMetadata {
            title: row.id,
            instructor,
            course_link,
            lessons,
        }))
    }

    /// Resuelve un nombre difuso de curso al título exacto más cercano
    /// del catálogo, o `None` si el catálogo está vacío o el mejor
    /// candidato queda por encima de [`COURSE_NAME_MAX_DISTANCE`].
    ///
    /// Esto es lo que permite que "the ML course" encuentre
    /// "Introduction to Machine Learning".
    pub async fn resolve_course_name(&self, fuzzy_name: &str) -> Result<Option<String>> {
        let embedding = self.embed_one(fuzzy_name).await?;
        let hits = self
            .store
            .query(Collection::Catalog, &embedding, 1, &Vec::new())
            .await?;

        let Some(best) = hits.into_iter().next() else {
            return Ok(None);
        };

        if best.distance > COURSE_NAME_MAX_DISTANCE {
            info!(
                "Resolución de curso descartada: '{fuzzy_name}' -> '{}' (distancia {:.3})",
                best.id, best.distance
            );
            return Ok(None);
        }

        Ok(Some(best.id))
    }

    /// Búsqueda de contenido por similitud, con filtros opcionales de
    /// curso (nombre difuso) y número de lección.
    ///
    /// Nunca devuelve `Err`: cualquier fallo del embedder o del store se
    /// convierte en un [`SearchResults`] con `error` relleno.
    pub async fn search(
        &self,
        query_text: &str,
        course_name: Option<&str>,
        lesson_number: Option<u32>,
    ) -> SearchResults {
        match self.try_search(query_text, course_name, lesson_number).await {
            Ok(results) => results,
            Err(err) => {
                warn!("Fallo en búsqueda de contenido: {err:#}");
                SearchResults::empty(err.to_string())
            }
        }
    }

    async fn try_search(
        &self,
        query_text: &str,
        course_name: Option<&str>,
        lesson_number: Option<u32>,
    ) -> Result<SearchResults> {
        let mut filter: MetadataFilter = Vec::new();

        if let Some(name) = course_name {
            match self.resolve_course_name(name).await? {
                Some(title) => filter.push(("course_title".into(), json!(title))),
                None => {
                    return Ok(SearchResults::empty(format!(
                        "No course found matching '{name}'"
                    )));
                }
            }
        }
        if let Some(n) = lesson_number {
            filter.push(("lesson_number".into(), json!(n)));
        }

        let embedding = self.embed_one(query_text).await?;
        let hits = self
            .store
            .query(Collection::Content, &embedding, self.max_results, &filter)
            .await?;

        let mut results = SearchResults::default();
        for hit in hits {
            results.documents.push(hit.text);
            results.metadata.push(hit.metadata);
            results.distances.push(hit.distance);
        }
        Ok(results)
    }

    /// Vacía ambas colecciones; usado para recargas completas.
    pub async fn clear_all_data(&self) -> Result<()> {
        self.store.clear_all().await
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f64>> {
        let mut embeddings = self.embedder.embed(&[text.to_string()]).await?;
        embeddings
            .pop()
            .ok_or_else(|| anyhow!("El embedder no devolvió ningún vector"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryChunkStore;
    use crate::store::ScoredRow;
    use async_trait::async_trait;

    /// Embedder determinista para tests: asigna un vector fijo al primer
    /// patrón contenido en el texto; el resto recibe el vector por defecto.
    struct KeywordEmbedder {
        patterns: Vec<(String, Vec<f64>)>,
        fallback: Vec<f64>,
    }

    impl KeywordEmbedder {
        fn new(patterns: Vec<(&str, Vec<f64>)>, fallback: Vec<f64>) -> Self {
            Self {
                patterns: patterns
                    .into_iter()
                    .map(|(p, v)| (p.to_lowercase(), v))
                    .collect(),
                fallback,
            }
        }
    }

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        fn model_name(&self) -> &str {
            "keyword-test-embedder"
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
            Ok(texts
                .iter()
                .map(|text| {
                    let lower = text.to_lowercase();
                    self.patterns
                        .iter()
                        .find(|(p, _)| lower.contains(p))
                        .map(|(_, v)| v.clone())
                        .unwrap_or_else(|| self.fallback.clone())
                })
                .collect())
        }
    }

    /// Store que falla en todas las operaciones, para comprobar que los
    /// errores de conexión no se propagan como excepciones.
    struct FailingStore;

    #[async_trait]
    impl ChunkStore for FailingStore {
        async fn upsert(&self, _: Collection, _: StoredRow) -> Result<()> {
            Err(anyhow!("Database connection failed"))
        }
        async fn add(&self, _: Collection, _: Vec<StoredRow>) -> Result<()> {
            Err(anyhow!("Database connection failed"))
        }
        async fn get(&self, _: Collection, _: &str) -> Result<Option<StoredRow>> {
            Err(anyhow!("Database connection failed"))
        }
        async fn ids(&self, _: Collection) -> Result<Vec<String>> {
            Err(anyhow!("Database connection failed"))
        }
        async fn count(&self, _: Collection) -> Result<usize> {
            Err(anyhow!("Database connection failed"))
        }
        async fn query(
            &self,
            _: Collection,
            _: &[f64],
            _: usize,
            _: &MetadataFilter,
        ) -> Result<Vec<ScoredRow>> {
            Err(anyhow!("Database connection failed"))
        }
        async fn clear_all(&self) -> Result<()> {
            Err(anyhow!("Database connection failed"))
        }
    }

    fn course(title: &str) -> Course {
        Course {
            title: title.to_string(),
            instructor: "Ada Developer".to_string(),
            course_link: "https://example.com/curso".to_string(),
            lessons: vec![
                Lesson {
                    number: 1,
                    title: "Introduction".to_string(),
                    link: Some("https://example.com/l1".to_string()),
                },
                Lesson {
                    number: 2,
                    title: "Variables".to_string(),
                    link: None,
                },
            ],
        }
    }

    fn ml_store() -> VectorStore {
        let embedder = KeywordEmbedder::new(
            vec![
                ("machine learning", vec![1.0, 0.0]),
                ("ml course", vec![0.9, 0.4359]),
            ],
            vec![0.0, 1.0],
        );
        VectorStore::new(
            Arc::new(MemoryChunkStore::new()),
            Arc::new(embedder),
            5,
        )
    }

    #[tokio::test]
    async fn resolucion_difusa_encuentra_el_titulo_exacto() {
        let store = ml_store();
        store
            .add_course_metadata(&course("Introduction to Machine Learning"))
            .await
            .unwrap();

        // "the ML course" queda a distancia 1 - 0.9 = 0.1 del título.
        let resolved = store.resolve_course_name("the ML course").await.unwrap();
        assert_eq!(resolved.as_deref(), Some("Introduction to Machine Learning"));
    }

    #[tokio::test]
    async fn resolucion_respeta_el_umbral_de_distancia() {
        // Dos embedders: uno deja al candidato justo por debajo del
        // umbral (distancia 0.59) y otro justo por encima (0.61).
        for (similarity, expected_some) in [(0.41, true), (0.39, false)] {
            let other = (1.0f64 - similarity * similarity).sqrt();
            let embedder = KeywordEmbedder::new(
                vec![
                    ("machine learning", vec![1.0, 0.0]),
                    ("borderline", vec![similarity, other]),
                ],
                vec![0.0, 1.0],
            );
            let store = VectorStore::new(
                Arc::new(MemoryChunkStore::new()),
                Arc::new(embedder),
                5,
            );
            store
                .add_course_metadata(&course("Introduction to Machine Learning"))
                .await
                .unwrap();

            let resolved = store.resolve_course_name("borderline").await.unwrap();
            assert_eq!(resolved.is_some(), expected_some, "similitud {similarity}");
        }
    }

    #[tokio::test]
    async fn resolucion_sobre_catalogo_vacio_devuelve_none() {
        let store = ml_store();
        let resolved = store.resolve_course_name("the ML course").await.unwrap();
        assert!(resolved.is_none());
    }

    #[tokio::test]
    async fn busqueda_con_curso_inexistente_no_toca_el_contenido() {
        let store = ml_store();
        store
            .add_course_metadata(&course("Introduction to Machine Learning"))
            .await
            .unwrap();

        let results = store.search("anything", Some("Nonexistent"), None).await;
        assert!(!results.is_empty());
        assert!(results.documents.is_empty());
        assert!(results
            .error
            .as_deref()
            .unwrap()
            .contains("No course found matching 'Nonexistent'"));
    }

    #[tokio::test]
    async fn busqueda_filtra_por_curso_y_leccion() {
        let embedder = KeywordEmbedder::new(
            vec![
                ("machine learning", vec![1.0, 0.0]),
                ("variables", vec![0.8, 0.6]),
            ],
            vec![0.0, 1.0],
        );
        let store = VectorStore::new(
            Arc::new(MemoryChunkStore::new()),
            Arc::new(embedder),
            5,
        );
        let title = "Introduction to Machine Learning";
        store.add_course_metadata(&course(title)).await.unwrap();
        store
            .add_course_content(&[
                CourseChunk {
                    content: "Variables hold values.".to_string(),
                    course_title: title.to_string(),
                    lesson_number: Some(2),
                    chunk_index: 0,
                },
                CourseChunk {
                    content: "Unrelated content.".to_string(),
                    course_title: title.to_string(),
                    lesson_number: Some(1),
                    chunk_index: 1,
                },
            ])
            .await
            .unwrap();

        let results = store
            .search("variables", Some("machine learning"), Some(2))
            .await;
        assert!(results.error.is_none());
        assert_eq!(results.documents.len(), 1);
        assert_eq!(results.documents[0], "Variables hold values.");
        assert_eq!(
            results.metadata[0].get("course_title").unwrap(),
            &json!(title)
        );

        // Con filtro de lección sin contenido, la búsqueda queda vacía.
        let none = store
            .search("variables", Some("machine learning"), Some(9))
            .await;
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn fallo_del_store_se_captura_en_search_results() {
        let embedder = KeywordEmbedder::new(vec![], vec![1.0, 0.0]);
        let store = VectorStore::new(Arc::new(FailingStore), Arc::new(embedder), 5);

        let results = store.search("anything", None, None).await;
        assert!(results.documents.is_empty());
        assert!(results
            .error
            .as_deref()
            .unwrap()
            .contains("Database connection failed"));
    }

    #[tokio::test]
    async fn contador_sobre_store_vacio_es_cero() {
        let store = ml_store();
        assert_eq!(store.get_course_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn metadata_de_curso_se_deserializa_completa() {
        let store = ml_store();
        store
            .add_course_metadata(&course("Introduction to Machine Learning"))
            .await
            .unwrap();

        let meta = store
            .get_course_metadata("Introduction to Machine Learning")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(meta.instructor, "Ada Developer");
        assert_eq!(meta.lessons.len(), 2);
        assert_eq!(meta.lessons[1].title, "Variables");
    }
}
