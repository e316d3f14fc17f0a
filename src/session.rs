//! Historial de conversación por sesión, acotado por ventana deslizante.

use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

/// Un intercambio pregunta/respuesta ya completado.
#[derive(Debug, Clone)]
struct Exchange {
    query: String,
    answer: String,
}

/// Gestor de sesiones en memoria.
///
/// Cada sesión retiene como mucho `max_history` intercambios recientes;
/// al añadir uno nuevo se expulsa primero el más antiguo (FIFO). No hay
/// persistencia entre reinicios del proceso.
pub struct SessionManager {
    sessions: Mutex<HashMap<String, Vec<Exchange>>>,
    max_history: usize,
}

impl SessionManager {
    pub fn new(max_history: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_history,
        }
    }

    /// Acuña un identificador de sesión nuevo, sin historial.
    pub fn create(&self) -> String {
        let id = Uuid::new_v4().to_string();
        self.sessions.lock().unwrap().insert(id.clone(), Vec::new());
        id
    }

    /// Renderiza el historial retenido (el más antiguo primero) como
    /// líneas alternadas de pregunta y respuesta. Un id desconocido o
    /// sin intercambios devuelve `None`; no es un error.
    pub fn get_history(&self, session_id: &str) -> Option<String> {
        let sessions = self.sessions.lock().unwrap();
        let exchanges = sessions.get(session_id)?;
        if exchanges.is_empty() {
            return None;
        }

        let lines: Vec<String> = exchanges
            .iter()
            .map(|e| format!("User: {}\nAssistant: {}", e.query, e.answer))
            .collect();
        Some(lines.join("\n"))
    }

    /// Añade un intercambio y trunca a los `max_history` más recientes.
    /// Si el id no existía (p. ej. lo acuñó un cliente externo), la
    /// sesión se crea sobre la marcha.
    pub fn add_exchange(&self, session_id: &str, query: &str, answer: &str) {
        let mut sessions = self.sessions.lock().unwrap();
        let exchanges = sessions.entry(session_id.to_string()).or_default();

        exchanges.push(Exchange {
            query: query.to_string(),
            answer: answer.to_string(),
        });

        let len = exchanges.len();
        if len > self.max_history {
            exchanges.drain(0..len - self.max_history);
        }
    }

    /// Número de sesiones vivas (diagnóstico).
    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}
