//! Abstracción sobre Rig para trabajar con distintos proveedores de LLM,
//! y el orquestador de generación con protocolo de dos llamadas.
//! De momento se implementa OpenAI; Gemini/Ollama quedan preparados para
//! el futuro.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::{error, warn};

use crate::config::{AppConfig, LlmProvider};
use crate::tools::{ToolDefinition, ToolManager};

// ---------------------------------------------------------------------
// Modelo de conversación neutro respecto al proveedor
// ---------------------------------------------------------------------

/// Una llamada a herramienta solicitada por el modelo.
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub id: String,
    pub call_id: Option<String>,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// El resultado de una llamada, etiquetado con su id de origen.
#[derive(Debug, Clone)]
pub struct ToolResultPart {
    pub id: String,
    pub call_id: Option<String>,
    pub text: String,
}

/// Turnos de la conversación que enviamos al modelo.
#[derive(Debug, Clone)]
pub enum ChatMessage {
    User(String),
    /// Turno del asistente que solicita herramientas.
    AssistantToolCalls(Vec<ToolCallRequest>),
    /// Turno que devuelve al modelo los resultados de sus llamadas.
    ToolResults(Vec<ToolResultPart>),
}

/// Petición completa de una ronda de chat.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: String,
    pub messages: Vec<ChatMessage>,
    /// Definiciones de herramientas; vacío = sin herramientas adjuntas.
    pub tools: Vec<ToolDefinition>,
}

/// Respuesta de una ronda: texto y/o llamadas a herramientas.
#[derive(Debug, Clone, Default)]
pub struct ModelReply {
    pub text: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

/// Backend de completions. La implementación de producción habla con
/// OpenAI vía Rig; los tests inyectan respuestas guionizadas.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<ModelReply>;
}

// ---------------------------------------------------------------------
// Backend de producción sobre Rig
// ---------------------------------------------------------------------

/// Backend de completions respaldado por Rig.
#[derive(Debug, Clone)]
pub struct RigBackend {
    provider: LlmProvider,
    chat_model: String,
}

impl RigBackend {
    /// Construye el backend a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        Ok(Self {
            provider: cfg.llm_provider.clone(),
            chat_model: cfg.llm_chat_model.clone(),
        })
    }

    async fn complete_with_openai(&self, request: ChatRequest) -> Result<ModelReply> {
        use rig::client::CompletionClient as _;
        use rig::completion::{CompletionModel as _, ToolDefinition as RigToolDefinition};
        use rig::message::AssistantContent;
        use rig::providers::openai;

        let client = openai::Client::from_env();

        // Modelo de chat por defecto si no se ha configurado otro
        let model_name = if self.chat_model.is_empty() {
            "gpt-4o-mini"
        } else {
            self.chat_model.as_str()
        };
        let model = client.completion_model(model_name);

        let mut history: Vec<rig::message::Message> = request
            .messages
            .iter()
            .map(to_rig_message)
            .collect::<Result<_>>()?;
        let prompt = history
            .pop()
            .ok_or_else(|| anyhow!("Petición de chat sin mensajes"))?;

        let rig_tools: Vec<RigToolDefinition> = request
            .tools
            .iter()
            .map(|t| RigToolDefinition {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.input_schema.clone(),
            })
            .collect();

        let response = model
            .completion_request(prompt)
            .preamble(request.system.clone())
            .messages(history)
            .tools(rig_tools)
            .temperature(0.0)
            .max_tokens(800)
            .send()
            .await?;

        let mut reply = ModelReply::default();
        for content in response.choice.iter() {
            match content {
                AssistantContent::Text(text) => {
                    if !reply.text.is_empty() {
                        reply.text.push('\n');
                    }
                    reply.text.push_str(&text.text);
                }
                AssistantContent::ToolCall(call) => {
                    reply.tool_calls.push(ToolCallRequest {
                        id: call.id.clone(),
                        call_id: call.call_id.clone(),
                        name: call.function.name.clone(),
                        arguments: call.function.arguments.clone(),
                    });
                }
                _ => {}
            }
        }
        Ok(reply)
    }
}

#[async_trait]
impl CompletionBackend for RigBackend {
    async fn complete(&self, request: ChatRequest) -> Result<ModelReply> {
        match self.provider {
            LlmProvider::OpenAI => self.complete_with_openai(request).await,
            ref other => Err(anyhow!(
                "Proveedor LLM {:?} aún no implementado para chat",
                other
            )),
        }
    }
}

/// Traduce un turno neutro al modelo de mensajes de Rig.
fn to_rig_message(message: &ChatMessage) -> Result<rig::message::Message> {
    use rig::message::{
        AssistantContent, Message, Text, ToolCall, ToolFunction, ToolResult, ToolResultContent,
        UserContent,
    };
    use rig::OneOrMany;

    match message {
        ChatMessage::User(text) => Ok(Message::user(text.clone())),
        ChatMessage::AssistantToolCalls(calls) => {
            let contents: Vec<AssistantContent> = calls
                .iter()
                .map(|call| {
                    AssistantContent::ToolCall(ToolCall {
                        id: call.id.clone(),
                        call_id: call.call_id.clone(),
                        function: ToolFunction {
                            name: call.name.clone(),
                            arguments: call.arguments.clone(),
                        },
                    })
                })
                .collect();
            Ok(Message::Assistant {
                id: None,
                content: OneOrMany::many(contents)
                    .map_err(|_| anyhow!("Turno de asistente sin llamadas a herramientas"))?,
            })
        }
        ChatMessage::ToolResults(results) => {
            let contents: Vec<UserContent> = results
                .iter()
                .map(|result| {
                    UserContent::ToolResult(ToolResult {
                        id: result.id.clone(),
                        call_id: result.call_id.clone(),
                        content: OneOrMany::one(ToolResultContent::Text(Text {
                            text: result.text.clone(),
                        })),
                    })
                })
                .collect();
            Ok(Message::User {
                content: OneOrMany::many(contents)
                    .map_err(|_| anyhow!("Turno de resultados de herramienta vacío"))?,
            })
        }
    }
}

// ---------------------------------------------------------------------
// Orquestador de generación
// ---------------------------------------------------------------------

/// Política de uso de herramientas que gobierna al modelo.
const SYSTEM_PROMPT: &str = "\
You are an AI assistant specialized in course materials and educational content \
with access to tools for course information.

Tool Usage Guidelines:
- **get_course_outline**: for questions about course structure, lesson lists or \
what a course covers. It returns the course title, link and every lesson with \
its number and title.
- **search_course_content**: for questions about specific content or detailed \
educational materials within courses.
- One tool round per query maximum.
- Synthesize tool results into accurate, fact-based responses.
- If a tool yields no results, state this clearly without offering alternatives.

Response Protocol:
- **General knowledge questions**: answer using existing knowledge without tools.
- **Course-specific questions**: use the relevant tool first, then answer.
- **No meta-commentary**: provide direct answers only; never mention the tools \
or your reasoning process.

All responses must be brief, educational, clear and example-supported when it \
aids understanding. Provide only the direct answer to what was asked.";

/// Orquestador: compone el prompt, decide si ejecutar herramientas y
/// acota el protocolo a dos llamadas al modelo como máximo.
pub struct AiGenerator {
    backend: Arc<dyn CompletionBackend>,
}

impl AiGenerator {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    /// Genera una respuesta, ejecutando como mucho una ronda de
    /// herramientas. Devuelve `(respuesta, fuentes)`.
    ///
    /// Nunca propaga errores: un fallo de transporte en cualquiera de
    /// las dos llamadas se convierte en un texto de disculpa con el
    /// detalle del error.
    pub async fn generate(
        &self,
        query: &str,
        conversation_history: Option<&str>,
        tools: &[ToolDefinition],
        tool_manager: Option<&ToolManager>,
    ) -> (String, Vec<String>) {
        match self
            .try_generate(query, conversation_history, tools, tool_manager)
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                error!("Fallo generando respuesta: {err:#}");
                (
                    format!("I encountered an error while processing your request: {err}"),
                    Vec::new(),
                )
            }
        }
    }

    async fn try_generate(
        &self,
        query: &str,
        conversation_history: Option<&str>,
        tools: &[ToolDefinition],
        tool_manager: Option<&ToolManager>,
    ) -> Result<(String, Vec<String>)> {
        let system = match conversation_history {
            Some(history) => format!("{SYSTEM_PROMPT}\n\nPrevious conversation:\n{history}"),
            None => SYSTEM_PROMPT.to_string(),
        };

        let mut messages = vec![ChatMessage::User(query.to_string())];

        // Primera llamada: con definiciones de herramientas si las hay.
        let first = self
            .backend
            .complete(ChatRequest {
                system: system.clone(),
                messages: messages.clone(),
                tools: tools.to_vec(),
            })
            .await?;

        if first.tool_calls.is_empty() {
            return Ok((first.text, Vec::new()));
        }

        // El modelo pidió herramientas pero nadie puede ejecutarlas:
        // se cierra en fallo en lugar de ignorar la petición.
        let Some(manager) = tool_manager else {
            warn!("El modelo solicitó herramientas sin tool manager disponible");
            return Ok((
                "I cannot answer this question right now: tool execution is not available."
                    .to_string(),
                Vec::new(),
            ));
        };

        // Ejecución secuencial, en el orden en que el modelo las pidió.
        let mut sources = Vec::new();
        let mut results = Vec::new();
        for call in &first.tool_calls {
            let response = manager.execute(&call.name, call.arguments.clone()).await;
            sources.extend(response.sources);
            results.push(ToolResultPart {
                id: call.id.clone(),
                call_id: call.call_id.clone(),
                text: response.text,
            });
        }

        messages.push(ChatMessage::AssistantToolCalls(first.tool_calls.clone()));
        messages.push(ChatMessage::ToolResults(results));

        // Segunda y última llamada, sin herramientas adjuntas: fuerza
        // una respuesta final en lenguaje natural.
        let last = self
            .backend
            .complete(ChatRequest {
                system,
                messages,
                tools: Vec::new(),
            })
            .await?;

        Ok((last.text, sources))
    }
}
