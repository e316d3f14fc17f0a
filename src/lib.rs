//! Sistema RAG de materiales de curso: parseo de documentos
//! estructurados, vector store de dos colecciones sobre Neo4j,
//! herramientas invocables por el modelo y orquestación acotada a una
//! ronda de herramientas por consulta.

pub mod api;
pub mod app_state;
pub mod config;
pub mod document;
pub mod embedding;
pub mod llm;
pub mod memory_store;
pub mod models;
pub mod neo4j_store;
pub mod rag;
pub mod session;
pub mod store;
pub mod tools;
pub mod vector_store;
