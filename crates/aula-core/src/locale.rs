//! User-facing strings. The assistant speaks Spanish.

/// Greeting shown once uploaded documents have been processed, and after a clear.
pub const GREETING_UPLOADED: &str = "Tu documentación de Moodle ha sido procesada. Estoy listo para responder tus preguntas basándome en lo que has proporcionado.";

/// Greeting shown when the server provides the knowledge base.
pub const GREETING_PRELOADED: &str = "¡Hola! Soy tu asistente de Moodle. Pregúntame lo que necesites sobre la plataforma.";

/// Prefix of the bot message that replaces a failed answer.
pub const ANSWER_ERROR_PREFIX: &str = "Lo siento, encontré un error: ";

/// Context placeholder sent to the model when the caller provides none.
pub const NO_CONTEXT: &str = "No hay contexto proporcionado.";

/// Knowledge placeholder when the preloaded directory is missing or empty.
pub const NO_KNOWLEDGE: &str = "No hay base de conocimiento disponible.";

/// Upload attempted with no files.
pub const NO_FILES_SELECTED: &str = "No se seleccionaron archivos.";

/// Uploaded PDFs produced no selectable text.
pub const EMPTY_EXTRACTION: &str = "No se pudo extraer texto de los PDF proporcionados. Asegúrese de que contengan texto seleccionable.";

/// Server has no generative-AI credential.
pub const MISSING_API_KEY: &str = "La clave API de Google no está configurada en el servidor.";

/// Error body of a failed response could not be read as JSON.
pub const INVALID_ERROR_RESPONSE: &str = "Error de red o respuesta no válida.";

/// Wrap a failure message for display in place of the streaming answer.
pub fn answer_error(detail: &str) -> String {
    format!("{}{}", ANSWER_ERROR_PREFIX, detail)
}

/// Generic message for a non-success status without an error detail.
pub fn server_status_error(status: u16) -> String {
    format!("Error del servidor: {}", status)
}

/// Message for an unexpected failure inside the answer endpoint.
pub fn internal_server_error(detail: &str) -> String {
    format!("Error interno del servidor: {}", detail)
}

/// Lines of the blocking screen shown while the credential is missing.
pub const SETUP_NEEDED: &[&str] = &[
    "¡Bienvenido! Casi todo está listo.",
    "Esta aplicación necesita una clave API de Google para conectar con el modelo de lenguaje Gemini.",
    "1. Obtén tu clave API desde Google AI Studio: https://aistudio.google.com/app/apikey",
    "2. Define la variable de entorno API_KEY con tu clave en el servidor.",
    "3. Reinicia el servidor. Una vez configurada, tus alumnos verán directamente el asistente.",
];
