//! Herramientas de solo lectura que el modelo puede invocar, y el
//! registro que las despacha por nombre.
//!
//! Cada herramienta se autodescribe ([`ToolDefinition`], con el esquema
//! de argumentos generado vía `schemars`) y devuelve un
//! [`ToolResponse`] explícito con el texto para el modelo y las fuentes
//! citables, de modo que las citas viajan con la respuesta en lugar de
//! quedarse en estado mutable de la herramienta.

use std::sync::Arc;

use async_trait::async_trait;
use schemars::{schema_for, JsonSchema};
use serde::Deserialize;

use crate::vector_store::VectorStore;

/// Descripción de una herramienta en formato consumible por el modelo.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Resultado de ejecutar una herramienta: el texto que ve el modelo y
/// las etiquetas de fuente (`"<curso> - Lesson <n>"`) para el usuario.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolResponse {
    pub text: String,
    pub sources: Vec<String>,
}

impl ToolResponse {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sources: Vec::new(),
        }
    }
}

/// Capacidad común de todas las herramientas registrables.
#[async_trait]
pub trait CourseTool: Send + Sync {
    fn definition(&self) -> ToolDefinition;
    async fn execute(&self, args: serde_json::Value) -> ToolResponse;
}

fn schema_value<T: JsonSchema>() -> serde_json::Value {
    serde_json::to_value(schema_for!(T)).unwrap_or_else(|_| serde_json::json!({}))
}

// ---------------------------------------------------------------------
// Herramienta de búsqueda de contenido
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
struct SearchArgs {
    /// What to search for in the course content
    query: String,
    /// Course title (partial matches work, e.g. 'MCP', 'Introduction')
    course_name: Option<String>,
    /// Specific lesson number to search within (e.g. 1, 2, 3)
    lesson_number: Option<u32>,
}

/// Búsqueda semántica sobre el contenido de los cursos, con filtros
/// opcionales de curso y lección.
pub struct SearchTool {
    store: Arc<VectorStore>,
}

impl SearchTool {
    pub fn new(store: Arc<VectorStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CourseTool for SearchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "search_course_content".to_string(),
            description: "Search course materials with smart course name matching and lesson filtering"
                .to_string(),
            input_schema: schema_value::<SearchArgs>(),
        }
    }

    async fn execute(&self, args: serde_json::Value) -> ToolResponse {
        let args: SearchArgs = match serde_json::from_value(args) {
            Ok(args) => args,
            Err(err) => {
                return ToolResponse::text_only(format!(
                    "Invalid arguments for 'search_course_content': {err}"
                ));
            }
        };

        let results = self
            .store
            .search(&args.query, args.course_name.as_deref(), args.lesson_number)
            .await;

        // Un error del store es la salida final de la herramienta, no un
        // fallo a propagar.
        if let Some(error) = results.error {
            return ToolResponse::text_only(error);
        }

        if results.is_empty() {
            let mut message = String::from("No relevant content found");
            if let Some(name) = &args.course_name {
                message.push_str(&format!(" in course '{name}'"));
            }
            if let Some(n) = args.lesson_number {
                message.push_str(&format!(" in lesson {n}"));
            }
            return ToolResponse::text_only(message);
        }

        let mut blocks = Vec::new();
        let mut sources = Vec::new();
        for (document, metadata) in results.documents.iter().zip(results.metadata.iter()) {
            let course_title = metadata
                .get("course_title")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");
            let lesson_number = metadata.get("lesson_number").and_then(|v| v.as_u64());

            let label = match lesson_number {
                Some(n) => format!("{course_title} - Lesson {n}"),
                None => course_title.to_string(),
            };
            blocks.push(format!("[{label}]\n{document}"));
            sources.push(label);
        }

        ToolResponse {
            text: blocks.join("\n\n"),
            sources,
        }
    }
}

// ---------------------------------------------------------------------
// Herramienta de outline de curso
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
struct OutlineArgs {
    /// Course title to get the outline for (partial matches work)
    course_title: String,
}

/// Devuelve la estructura completa de un curso: título, instructor,
/// enlace y la lista ordenada de lecciones.
pub struct OutlineTool {
    store: Arc<VectorStore>,
}

impl OutlineTool {
    pub fn new(store: Arc<VectorStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CourseTool for OutlineTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_course_outline".to_string(),
            description: "Get the complete outline of a course: title, course link and full lesson list"
                .to_string(),
            input_schema: schema_value::<OutlineArgs>(),
        }
    }

    async fn execute(&self, args: serde_json::Value) -> ToolResponse {
        let args: OutlineArgs = match serde_json::from_value(args) {
            Ok(args) => args,
            Err(err) => {
                return ToolResponse::text_only(format!(
                    "Invalid arguments for 'get_course_outline': {err}"
                ));
            }
        };

        let resolved = match self.store.resolve_course_name(&args.course_title).await {
            Ok(resolved) => resolved,
            Err(err) => return ToolResponse::text_only(err.to_string()),
        };
        let Some(title) = resolved else {
            return ToolResponse::text_only(format!(
                "No course found matching '{}'",
                args.course_title
            ));
        };

        let metadata = match self.store.get_course_metadata(&title).await {
            Ok(Some(metadata)) => metadata,
            Ok(None) => {
                return ToolResponse::text_only(format!(
                    "No course found matching '{}'",
                    args.course_title
                ));
            }
            Err(err) => return ToolResponse::text_only(err.to_string()),
        };

        let mut lines = vec![
            format!("**{}**", metadata.title),
            format!("Instructor: {}", metadata.instructor),
            format!("Course Link: {}", metadata.course_link),
        ];
        for lesson in &metadata.lessons {
            match &lesson.link {
                Some(link) => lines.push(format!("{}. {} - {}", lesson.number, lesson.title, link)),
                None => lines.push(format!("{}. {}", lesson.number, lesson.title)),
            }
        }

        ToolResponse {
            text: lines.join("\n"),
            sources: vec![metadata.title],
        }
    }
}

// ---------------------------------------------------------------------
// Registro y despacho
// ---------------------------------------------------------------------

/// Registro de herramientas con despacho por nombre.
///
/// Un nombre desconocido produce el texto centinela
/// `Tool '<nombre>' not found`: la superficie que ve el modelo nunca
/// debe romperse por un nombre alucinado.
#[derive(Default)]
pub struct ToolManager {
    tools: Vec<Arc<dyn CourseTool>>,
}

impl ToolManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra una herramienta bajo el nombre de su propia definición.
    /// Si ya existía una con ese nombre, la reemplaza en su posición.
    pub fn register(&mut self, tool: Arc<dyn CourseTool>) {
        let name = tool.definition().name;
        match self
            .tools
            .iter()
            .position(|t| t.definition().name == name)
        {
            Some(idx) => self.tools[idx] = tool,
            None => self.tools.push(tool),
        }
    }

    /// Definiciones de todas las herramientas, en orden de registro.
    pub fn get_tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    /// Despacha una ejecución a la herramienta con ese nombre.
    pub async fn execute(&self, name: &str, args: serde_json::Value) -> ToolResponse {
        match self.tools.iter().find(|t| t.definition().name == name) {
            Some(tool) => tool.execute(args).await,
            None => ToolResponse::text_only(format!("Tool '{name}' not found")),
        }
    }
}
