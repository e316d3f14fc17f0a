//! Implementación en memoria de [`ChunkStore`], para tests y ejecuciones
//! efímeras. Usa `Vec` tras `RwLock` y búsqueda por fuerza bruta con
//! distancia coseno.

use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::store::{
    cosine_distance, metadata_matches, ChunkStore, Collection, MetadataFilter, ScoredRow,
    StoredRow,
};

/// Store en memoria con las dos colecciones del sistema.
#[derive(Default)]
pub struct MemoryChunkStore {
    catalog: RwLock<Vec<StoredRow>>,
    content: RwLock<Vec<StoredRow>>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn rows(&self, collection: Collection) -> &RwLock<Vec<StoredRow>> {
        match collection {
            Collection::Catalog => &self.catalog,
            Collection::Content => &self.content,
        }
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn upsert(&self, collection: Collection, row: StoredRow) -> Result<()> {
        let mut rows = self.rows(collection).write().unwrap();
        match rows.iter_mut().find(|r| r.id == row.id) {
            Some(existing) => *existing = row,
            None => rows.push(row),
        }
        Ok(())
    }

    async fn add(&self, collection: Collection, mut new_rows: Vec<StoredRow>) -> Result<()> {
        let mut rows = self.rows(collection).write().unwrap();
        rows.append(&mut new_rows);
        Ok(())
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<StoredRow>> {
        let rows = self.rows(collection).read().unwrap();
        Ok(rows.iter().find(|r| r.id == id).cloned())
    }

    async fn ids(&self, collection: Collection) -> Result<Vec<String>> {
        let rows = self.rows(collection).read().unwrap();
        Ok(rows.iter().map(|r| r.id.clone()).collect())
    }

    async fn count(&self, collection: Collection) -> Result<usize> {
        Ok(self.rows(collection).read().unwrap().len())
    }

    async fn query(
        &self,
        collection: Collection,
        embedding: &[f64],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredRow>> {
        let rows = self.rows(collection).read().unwrap();
        let mut scored: Vec<ScoredRow> = rows
            .iter()
            .filter(|r| metadata_matches(&r.metadata, filter))
            .map(|r| ScoredRow {
                id: r.id.clone(),
                text: r.text.clone(),
                metadata: r.metadata.clone(),
                distance: cosine_distance(&r.embedding, embedding),
            })
            .collect();

        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        scored.truncate(k);
        Ok(scored)
    }

    async fn clear_all(&self) -> Result<()> {
        self.catalog.write().unwrap().clear();
        self.content.write().unwrap().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(id: &str, embedding: Vec<f64>, lesson: Option<u32>) -> StoredRow {
        let mut metadata = serde_json::Map::new();
        metadata.insert("course_title".into(), json!("Curso"));
        match lesson {
            Some(n) => metadata.insert("lesson_number".into(), json!(n)),
            None => metadata.insert("lesson_number".into(), serde_json::Value::Null),
        };
        StoredRow {
            id: id.to_string(),
            text: format!("texto de {id}"),
            embedding,
            metadata,
        }
    }

    #[tokio::test]
    async fn upsert_reemplaza_por_id() {
        let store = MemoryChunkStore::new();
        store
            .upsert(Collection::Catalog, row("a", vec![1.0, 0.0], None))
            .await
            .unwrap();
        store
            .upsert(Collection::Catalog, row("a", vec![0.0, 1.0], None))
            .await
            .unwrap();

        assert_eq!(store.count(Collection::Catalog).await.unwrap(), 1);
        let stored = store.get(Collection::Catalog, "a").await.unwrap().unwrap();
        assert_eq!(stored.embedding, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn query_ordena_por_distancia_y_aplica_filtro() {
        let store = MemoryChunkStore::new();
        store
            .add(
                Collection::Content,
                vec![
                    row("lejos", vec![0.0, 1.0], Some(1)),
                    row("cerca", vec![1.0, 0.1], Some(1)),
                    row("otra-leccion", vec![1.0, 0.0], Some(2)),
                ],
            )
            .await
            .unwrap();

        let hits = store
            .query(
                Collection::Content,
                &[1.0, 0.0],
                10,
                &vec![("lesson_number".into(), json!(1))],
            )
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "cerca");
        assert_eq!(hits[1].id, "lejos");
        assert!(hits[0].distance < hits[1].distance);
    }

    #[tokio::test]
    async fn count_sobre_store_vacio_es_cero() {
        let store = MemoryChunkStore::new();
        assert_eq!(store.count(Collection::Catalog).await.unwrap(), 0);
        assert_eq!(store.count(Collection::Content).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn clear_all_vacia_ambas_colecciones() {
        let store = MemoryChunkStore::new();
        store
            .add(Collection::Catalog, vec![row("c", vec![1.0], None)])
            .await
            .unwrap();
        store
            .add(Collection::Content, vec![row("x", vec![1.0], Some(1))])
            .await
            .unwrap();

        store.clear_all().await.unwrap();
        assert_eq!(store.count(Collection::Catalog).await.unwrap(), 0);
        assert_eq!(store.count(Collection::Content).await.unwrap(), 0);
    }
}
