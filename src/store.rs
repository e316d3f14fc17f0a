//! Abstracción de almacenamiento vectorial con dos colecciones lógicas.
//!
//! El trait [`ChunkStore`] define las operaciones que necesita la capa de
//! búsqueda sin conocer la semántica de cursos: filas `{id, texto,
//! embedding, metadatos}` dentro de una [`Collection`], consultables por
//! vecino más cercano con un filtro de igualdad sobre metadatos.
//!
//! Implementaciones: Neo4j (`neo4j_store`) para producción y una versión
//! en memoria (`memory_store`) para tests y ejecuciones efímeras.

use anyhow::Result;
use async_trait::async_trait;

/// Las dos colecciones que posee el sistema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    /// Una fila por curso (metadatos + lista de lecciones serializada).
    Catalog,
    /// Una fila por chunk de contenido.
    Content,
}

/// Una fila persistida: texto con su embedding y metadatos planos.
#[derive(Debug, Clone)]
pub struct StoredRow {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f64>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Resultado de una consulta por similitud. `distance` es distancia
/// coseno (`1 - similitud`), menor = más relevante.
#[derive(Debug, Clone)]
pub struct ScoredRow {
    pub id: String,
    pub text: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub distance: f64,
}

/// Filtro de igualdad exacta sobre campos de metadatos.
pub type MetadataFilter = Vec<(String, serde_json::Value)>;

/// Backend de almacenamiento vectorial.
///
/// Todas las operaciones son async (vía `async-trait`); las
/// implementaciones en memoria devuelven futuros ya resueltos.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Inserta o reemplaza una fila por `id` (upsert).
    async fn upsert(&self, collection: Collection, row: StoredRow) -> Result<()>;

    /// Inserta un lote de filas sin deduplicar.
    async fn add(&self, collection: Collection, rows: Vec<StoredRow>) -> Result<()>;

    /// Recupera una fila por `id`.
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<StoredRow>>;

    /// Ids de todas las filas de la colección.
    async fn ids(&self, collection: Collection) -> Result<Vec<String>>;

    /// Número de filas. Debe funcionar sobre un store vacío (devuelve 0).
    async fn count(&self, collection: Collection) -> Result<usize>;

    /// Los `k` vecinos más cercanos al `embedding` que cumplen `filter`,
    /// en orden ascendente de distancia.
    async fn query(
        &self,
        collection: Collection,
        embedding: &[f64],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredRow>>;

    /// Vacía ambas colecciones (y las deja listas para reutilizar).
    async fn clear_all(&self) -> Result<()>;
}

/// Distancia coseno entre dos vectores: `1 - similitud`.
/// Devuelve la distancia máxima (1.0) para vectores vacíos, de longitudes
/// distintas o de norma nula.
pub fn cosine_distance(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 1.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f64::EPSILON {
        return 1.0;
    }
    1.0 - dot / denom
}

/// Comprueba si los metadatos de una fila satisfacen el filtro.
pub fn metadata_matches(
    metadata: &serde_json::Map<String, serde_json::Value>,
    filter: &MetadataFilter,
) -> bool {
    filter
        .iter()
        .all(|(key, expected)| metadata.get(key) == Some(expected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn distancia_coseno_de_vectores_identicos_es_cero() {
        let v = vec![0.5, 0.5, 0.7];
        assert!(cosine_distance(&v, &v).abs() < 1e-9);
    }

    #[test]
    fn distancia_coseno_de_ortogonales_es_uno() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!((cosine_distance(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn distancia_coseno_degenerada_es_maxima() {
        assert_eq!(cosine_distance(&[], &[]), 1.0);
        assert_eq!(cosine_distance(&[1.0], &[1.0, 2.0]), 1.0);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 2.0]), 1.0);
    }

    #[test]
    fn filtro_de_metadatos_exige_igualdad_en_todas_las_claves() {
        let mut meta = serde_json::Map::new();
        meta.insert("course_title".into(), json!("Python Basics"));
        meta.insert("lesson_number".into(), json!(2));

        assert!(metadata_matches(&meta, &vec![]));
        assert!(metadata_matches(
            &meta,
            &vec![("course_title".into(), json!("Python Basics"))]
        ));
        assert!(metadata_matches(
            &meta,
            &vec![
                ("course_title".into(), json!("Python Basics")),
                ("lesson_number".into(), json!(2)),
            ]
        ));
        assert!(!metadata_matches(
            &meta,
            &vec![("lesson_number".into(), json!(3))]
        ));
        assert!(!metadata_matches(
            &meta,
            &vec![("instructor".into(), json!("nadie"))]
        ));
    }
}
