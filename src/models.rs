//! Modelos de dominio (cursos, lecciones, chunks y resultados de búsqueda).

use serde::{Deserialize, Serialize};

/// Representa un curso completo tal y como se extrae de un documento.
/// El `title` actúa como clave natural única para la deduplicación.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub title: String,
    pub instructor: String,
    pub course_link: String,
    pub lessons: Vec<Lesson>,
}

/// Una lección dentro de un curso. El orden del vector `lessons`
/// es el orden de presentación (y del outline).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    pub number: u32,
    pub title: String,
    pub link: Option<String>,
}

/// Un trozo de texto de una lección, la unidad de recuperación y cita.
/// `lesson_number` es `None` para contenido a nivel de curso (texto
/// anterior al primer marcador de lección).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseChunk {
    pub content: String,
    pub course_title: String,
    pub lesson_number: Option<u32>,
    pub chunk_index: usize,
}

/// Resultado de una búsqueda vectorial sobre la colección de contenido.
///
/// Los tres vectores son paralelos (misma longitud, mismo orden) y
/// `distances` va en orden ascendente (menor distancia = más relevante).
/// Invariante: si `error` está presente, los tres vectores están vacíos.
#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    pub documents: Vec<String>,
    pub metadata: Vec<serde_json::Map<String, serde_json::Value>>,
    pub distances: Vec<f64>,
    pub error: Option<String>,
}

impl SearchResults {
    /// Construye un resultado de error: sin documentos, solo el mensaje.
    pub fn empty(error: impl Into<String>) -> Self {
        Self {
            documents: Vec::new(),
            metadata: Vec::new(),
            distances: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// `true` solo cuando no hay documentos y tampoco hay error.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_con_error_no_es_is_empty() {
        let res = SearchResults::empty("Database connection failed");
        assert!(res.documents.is_empty());
        assert!(res.metadata.is_empty());
        assert!(res.distances.is_empty());
        assert_eq!(res.error.as_deref(), Some("Database connection failed"));
        assert!(!res.is_empty());
    }

    #[test]
    fn default_sin_documentos_es_is_empty() {
        let res = SearchResults::default();
        assert!(res.is_empty());
    }

    #[test]
    fn con_documentos_no_es_is_empty() {
        let res = SearchResults {
            documents: vec!["algo".to_string()],
            metadata: vec![serde_json::Map::new()],
            distances: vec![0.1],
            error: None,
        };
        assert!(!res.is_empty());
    }
}
