//! Implementación de [`ChunkStore`] sobre Neo4j.
//!
//! Las dos colecciones se modelan como etiquetas de nodo:
//!   - `:CatalogEntry`  — una fila por curso.
//!   - `:ContentChunk`  — una fila por chunk de contenido.
//!
//! Cada nodo guarda `id`, `text`, `embedding` (con índice vectorial
//! coseno) y `metadata` serializado como JSON. El filtro de metadatos se
//! aplica en Rust tras la consulta al índice, sobre-consultando para
//! compensar.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use neo4rs::{query, Graph};
use tracing::info;
use url::Url;

use crate::config::AppConfig;
use crate::store::{metadata_matches, ChunkStore, Collection, MetadataFilter, ScoredRow, StoredRow};

/// Dimensiones de los embeddings (text-embedding-3-small).
const VECTOR_DIMENSIONS: usize = 1536;

/// Factor de sobre-consulta al índice vectorial: el filtro de metadatos
/// se aplica después, así que pedimos más candidatos de los necesarios.
const OVERFETCH_FACTOR: usize = 10;

fn label(collection: Collection) -> &'static str {
    match collection {
        Collection::Catalog => "CatalogEntry",
        Collection::Content => "ContentChunk",
    }
}

fn index_name(collection: Collection) -> &'static str {
    match collection {
        Collection::Catalog => "catalogEmbeddingIndex",
        Collection::Content => "contentEmbeddingIndex",
    }
}

/// Store vectorial respaldado por Neo4j.
pub struct Neo4jChunkStore {
    graph: Graph,
}

impl Neo4jChunkStore {
    /// Conecta a Neo4j a partir de la configuración.
    pub async fn connect(cfg: &AppConfig) -> Result<Self> {
        let url = Url::parse(&cfg.neo4j_uri)?;
        let host = url.host_str().unwrap_or("localhost");
        let port = url.port().unwrap_or(7687);
        let addr = format!("{host}:{port}");

        info!("Conectando a Neo4j en {addr}...");
        let graph = Graph::new(&addr, &cfg.neo4j_user, &cfg.neo4j_password).await?;
        info!("Conexión a Neo4j OK");
        Ok(Self { graph })
    }

    /// Crea constraints de unicidad e índices vectoriales para ambas
    /// colecciones, si no existen ya.
    pub async fn ensure_schema(&self) -> Result<()> {
        let statements = [
            "CREATE CONSTRAINT catalog_id IF NOT EXISTS
             FOR (c:CatalogEntry)
             REQUIRE c.id IS UNIQUE",
            "CREATE CONSTRAINT content_id IF NOT EXISTS
             FOR (c:ContentChunk)
             REQUIRE c.id IS UNIQUE",
        ];

        for stmt in statements {
            self.graph.run(query(stmt)).await?;
        }

        for collection in [Collection::Catalog, Collection::Content] {
            self.ensure_vector_index(collection).await?;
        }

        info!("Esquema de Neo4j asegurado (constraints e índices vectoriales).");
        Ok(())
    }

    async fn ensure_vector_index(&self, collection: Collection) -> Result<()> {
        let name = index_name(collection);

        // ¿Ya existe el índice? Usamos la sintaxis moderna SHOW VECTOR INDEXES.
        let mut cursor = self
            .graph
            .execute(
                query("SHOW VECTOR INDEXES YIELD name WHERE name = $name RETURN name")
                    .param("name", name),
            )
            .await?;

        if cursor.next().await?.is_some() {
            info!("Índice vectorial '{name}' ya existe.");
            return Ok(());
        }

        let cypher = format!(
            "\
CREATE VECTOR INDEX {name}
FOR (c:{label})
ON (c.embedding)
OPTIONS {{
  indexConfig: {{
    `vector.dimensions`: {dims},
    `vector.similarity_function`: 'cosine'
  }}
}}",
            name = name,
            label = label(collection),
            dims = VECTOR_DIMENSIONS,
        );

        self.graph.run(query(&cypher)).await?;
        info!("Índice vectorial '{name}' creado.");
        Ok(())
    }

    async fn write_row(
        &self,
        collection: Collection,
        row: &StoredRow,
        merge: bool,
    ) -> Result<()> {
        let verb = if merge { "MERGE" } else { "CREATE" };
        let cypher = format!(
            "{verb} (c:{label} {{id: $id}})
             SET c.text = $text, c.embedding = $embedding, c.metadata = $metadata",
            verb = verb,
            label = label(collection),
        );

        let metadata_json = serde_json::to_string(&row.metadata)?;
        self.graph
            .run(
                query(&cypher)
                    .param("id", row.id.clone())
                    .param("text", row.text.clone())
                    .param("embedding", row.embedding.clone())
                    .param("metadata", metadata_json),
            )
            .await?;
        Ok(())
    }

    fn parse_metadata(raw: &str) -> serde_json::Map<String, serde_json::Value> {
        serde_json::from_str(raw).unwrap_or_default()
    }
}

#[async_trait]
impl ChunkStore for Neo4jChunkStore {
    async fn upsert(&self, collection: Collection, row: StoredRow) -> Result<()> {
        self.write_row(collection, &row, true).await
    }

    async fn add(&self, collection: Collection, rows: Vec<StoredRow>) -> Result<()> {
        for row in &rows {
            self.write_row(collection, row, false).await?;
        }
        Ok(())
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<StoredRow>> {
        let cypher = format!(
            "MATCH (c:{label} {{id: $id}})
             RETURN c.id AS id, c.text AS text, c.embedding AS embedding, c.metadata AS metadata",
            label = label(collection),
        );
        let mut cursor = self
            .graph
            .execute(query(&cypher).param("id", id))
            .await?;

        let Some(row) = cursor.next().await? else {
            return Ok(None);
        };

        let id: String = row
            .get("id")
            .ok_or_else(|| anyhow!("Falta campo 'id' en resultado de Neo4j"))?;
        let text: String = row
            .get("text")
            .ok_or_else(|| anyhow!("Falta campo 'text' en resultado de Neo4j"))?;
        let embedding: Vec<f64> = row
            .get("embedding")
            .ok_or_else(|| anyhow!("Falta campo 'embedding' en resultado de Neo4j"))?;
        let metadata_raw: String = row.get("metadata").unwrap_or_default();

        Ok(Some(StoredRow {
            id,
            text,
            embedding,
            metadata: Self::parse_metadata(&metadata_raw),
        }))
    }

    async fn ids(&self, collection: Collection) -> Result<Vec<String>> {
        let cypher = format!(
            "MATCH (c:{label}) RETURN c.id AS id ORDER BY id",
            label = label(collection),
        );
        let mut cursor = self.graph.execute(query(&cypher)).await?;

        let mut ids = Vec::new();
        while let Some(row) = cursor.next().await? {
            if let Some(id) = row.get::<String>("id") {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    async fn count(&self, collection: Collection) -> Result<usize> {
        let cypher = format!(
            "MATCH (c:{label}) RETURN count(c) AS total",
            label = label(collection),
        );
        let mut cursor = self.graph.execute(query(&cypher)).await?;

        let total = match cursor.next().await? {
            Some(row) => row.get::<i64>("total").unwrap_or(0),
            None => 0,
        };
        Ok(total.max(0) as usize)
    }

    async fn query(
        &self,
        collection: Collection,
        embedding: &[f64],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredRow>> {
        let fetch = (k.max(1) * OVERFETCH_FACTOR) as i64;
        let mut cursor = self
            .graph
            .execute(
                query(
                    "CALL db.index.vector.queryNodes($index_name, $k, $embedding)
                     YIELD node, score
                     RETURN node.id AS id, node.text AS text, node.metadata AS metadata, score
                     ORDER BY score DESC",
                )
                .param("index_name", index_name(collection))
                .param("k", fetch)
                .param("embedding", embedding.to_vec()),
            )
            .await?;

        let mut hits = Vec::new();
        while let Some(row) = cursor.next().await? {
            if hits.len() >= k {
                break;
            }
            let id: String = row
                .get("id")
                .ok_or_else(|| anyhow!("Falta campo 'id' en resultado de Neo4j"))?;
            let text: String = row
                .get("text")
                .ok_or_else(|| anyhow!("Falta campo 'text' en resultado de Neo4j"))?;
            let score: f64 = row
                .get("score")
                .ok_or_else(|| anyhow!("Falta campo 'score' en resultado de Neo4j"))?;
            let metadata_raw: String = row.get("metadata").unwrap_or_default();

            let metadata = Self::parse_metadata(&metadata_raw);
            if !metadata_matches(&metadata, filter) {
                continue;
            }

            hits.push(ScoredRow {
                id,
                text,
                metadata,
                distance: 1.0 - score,
            });
        }

        Ok(hits)
    }

    async fn clear_all(&self) -> Result<()> {
        for collection in [Collection::Catalog, Collection::Content] {
            let cypher = format!(
                "MATCH (c:{label}) DETACH DELETE c",
                label = label(collection),
            );
            self.graph.run(query(&cypher)).await?;
        }
        info!("Colecciones vaciadas en Neo4j.");
        Ok(())
    }
}
