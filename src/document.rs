//! Procesado de documentos de curso: parseo del formato estructurado y
//! troceado del cuerpo de cada lección en chunks alineados a frase.
//!
//! Formato esperado:
//!   línea 1: `Course: <título>`
//!   línea 2: `Instructor: <nombre>`
//!   línea 3: `Link: <url>`
//!   después, bloques de lección: `Lesson <n>: <título>`, una línea
//!   `Link: <url>` opcional, y el cuerpo libre hasta el siguiente marcador.

use std::fs;
use std::path::Path;

use mime_guess::MimeGuess;
use tracing::warn;

use crate::models::{Course, CourseChunk, Lesson};

/// Parser + chunker de documentos de curso.
///
/// `process` nunca falla hacia arriba: un documento ilegible o sin
/// cabecera válida produce `None` (con un aviso en el log), de modo que
/// la ingesta por lotes pueda saltar ficheros malos sin abortar.
#[derive(Debug, Clone)]
pub struct DocumentProcessor {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl DocumentProcessor {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    /// ¿Es este fichero un candidato a documento de curso? Solo texto
    /// plano: extensión `.txt` o un MIME adivinado de tipo `text/*`.
    pub fn is_course_document(path: &Path) -> bool {
        let extension = path
            .extension()
            .and_then(std::ffi::OsStr::to_str)
            .unwrap_or("")
            .to_lowercase();
        if extension == "txt" {
            return true;
        }
        let mime: MimeGuess = MimeGuess::from_path(path);
        mime.first()
            .map(|m| m.type_() == mime_guess::mime::TEXT)
            .unwrap_or(false)
    }

    /// Parsea un documento y trocea el cuerpo de cada lección.
    ///
    /// Devuelve `None` si el fichero no se puede leer o la cabecera de
    /// tres líneas no se puede parsear. Un curso sin lecciones es válido
    /// (degenerado): produce el `Course` con cero chunks.
    pub fn process(&self, path: &Path) -> Option<(Course, Vec<CourseChunk>)> {
        let text = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                warn!("No se pudo leer {}: {err}. Saltando fichero.", path.display());
                return None;
            }
        };

        let mut lines = text.lines();

        let title = match lines.next().and_then(|l| prefixed_value(l, "Course:")) {
            Some(t) => t,
            None => {
                warn!(
                    "Cabecera inválida en {} (se esperaba 'Course: ...'). Saltando fichero.",
                    path.display()
                );
                return None;
            }
        };
        let instructor = match lines.next().and_then(|l| prefixed_value(l, "Instructor:")) {
            Some(i) => i,
            None => {
                warn!(
                    "Cabecera inválida en {} (se esperaba 'Instructor: ...'). Saltando fichero.",
                    path.display()
                );
                return None;
            }
        };
        let course_link = match lines.next().and_then(|l| prefixed_value(l, "Link:")) {
            Some(l) => l,
            None => {
                warn!(
                    "Cabecera inválida en {} (se esperaba 'Link: ...'). Saltando fichero.",
                    path.display()
                );
                return None;
            }
        };

        let mut lessons: Vec<Lesson> = Vec::new();

        // Secciones de cuerpo en orden de documento. `None` como número
        // de lección significa contenido a nivel de curso (texto
        // anterior al primer marcador).
        let mut sections: Vec<(Option<u32>, Vec<&str>)> = vec![(None, Vec::new())];
        let mut expect_lesson_link = false;

        for line in lines {
            if let Some((number, lesson_title)) = parse_lesson_marker(line) {
                lessons.push(Lesson {
                    number,
                    title: lesson_title,
                    link: None,
                });
                sections.push((Some(number), Vec::new()));
                expect_lesson_link = true;
                continue;
            }

            // Línea de enlace opcional justo después del marcador.
            if expect_lesson_link {
                expect_lesson_link = false;
                if let Some(link) = prefixed_value(line, "Link:") {
                    if let Some(last) = lessons.last_mut() {
                        last.link = Some(link);
                    }
                    continue;
                }
            }

            if let Some((_, body)) = sections.last_mut() {
                body.push(line);
            }
        }

        let mut chunks: Vec<CourseChunk> = Vec::new();
        let mut chunk_index = 0usize;
        for (lesson_number, body) in &sections {
            let joined = body.join("\n");
            for content in self.chunk_text(&joined) {
                chunks.push(CourseChunk {
                    content,
                    course_title: title.clone(),
                    lesson_number: *lesson_number,
                    chunk_index,
                });
                chunk_index += 1;
            }
        }

        let course = Course {
            title,
            instructor,
            course_link,
            lessons,
        };
        Some((course, chunks))
    }

    /// Trocea un cuerpo de texto en chunks alineados a frase.
    ///
    /// Acumula frases hasta que la siguiente excedería `chunk_size`
    /// caracteres; el siguiente chunk retrocede sobre las frases finales
    /// del anterior hasta ~`chunk_overlap` caracteres para dar
    /// continuidad de contexto. Nunca parte una frase por la mitad; una
    /// frase que por sí sola excede `chunk_size` forma su propio chunk.
    pub fn chunk_text(&self, text: &str) -> Vec<String> {
        let sentences = split_into_sentences(text);
        if sentences.is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut start = 0usize;

        while start < sentences.len() {
            let mut end = start;
            let mut size = 0usize;
            while end < sentences.len() {
                let extra = if size == 0 {
                    sentences[end].len()
                } else {
                    sentences[end].len() + 1
                };
                if size > 0 && size + extra > self.chunk_size {
                    break;
                }
                size += extra;
                end += 1;
            }

            chunks.push(sentences[start..end].join(" "));
            if end >= sentences.len() {
                break;
            }

            // Retroceso: frases finales de la ventana cerrada que suman
            // como mucho `chunk_overlap` caracteres.
            let mut next_start = end;
            let mut overlap = 0usize;
            while next_start > start + 1 {
                let candidate = sentences[next_start - 1].len();
                if overlap + candidate > self.chunk_overlap {
                    break;
                }
                overlap += candidate + 1;
                next_start -= 1;
            }
            start = next_start;
        }

        chunks
    }
}

/// Extrae el valor de una línea `Prefijo: valor`, o `None` si la línea
/// no lleva ese prefijo.
fn prefixed_value(line: &str, prefix: &str) -> Option<String> {
    let value = line.trim().strip_prefix(prefix)?.trim();
    if value.is_empty() {
        return None;
    }
    Some(value.to_string())
}

/// Reconoce un marcador `Lesson <n>: <título>`.
fn parse_lesson_marker(line: &str) -> Option<(u32, String)> {
    let rest = line.trim().strip_prefix("Lesson ")?;
    let colon = rest.find(':')?;
    let number: u32 = rest[..colon].trim().parse().ok()?;
    let title = rest[colon + 1..].trim();
    if title.is_empty() {
        return None;
    }
    Some((number, title.to_string()))
}

/// Parte un texto en frases: un terminador (`.`, `!`, `?`) seguido de
/// espacio en blanco (o fin de texto) cierra la frase. El texto restante
/// sin terminador cuenta como frase final.
fn split_into_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek().map_or(true, |n| n.is_whitespace()) {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
            while chars.peek().map_or(false, |n| n.is_whitespace()) {
                chars.next();
            }
        }
    }

    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    sentences
}
