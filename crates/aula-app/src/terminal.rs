//! Terminal presentation of a conversation.
//!
//! The renderer receives full snapshots and prints only what changed since
//! the previous one: new messages, appended text, and the citations of an
//! answer once it finishes.

use std::collections::HashMap;
use std::io::{self, Write};

use aula_chat::ConversationSnapshot;
use aula_core::{locale, Message, Sender};

pub const HELP: &str = "Comandos: /clear borra el chat, /reset vuelve a cargar documentos, /upload <pdf...> procesa documentos, /quit sale.";
pub const UPLOAD_PROMPT: &str = "Sube tu documentación de Moodle: /upload <archivo.pdf> [otro.pdf ...]";
pub const PROCESSING: &str = "Procesando documentos...";
const CLEARED: &str = "--- conversación reiniciada ---";
const SOURCES_HEADER: &str = "Fuentes:";

#[derive(Debug, Clone, PartialEq)]
struct Printed {
    text: String,
    finished: bool,
}

/// Incremental renderer for conversation snapshots.
#[derive(Debug, Default)]
pub struct TerminalRenderer {
    printed: HashMap<String, Printed>,
    order: Vec<String>,
    last_revision: u64,
}

impl TerminalRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revision of the last snapshot rendered.
    pub fn last_revision(&self) -> u64 {
        self.last_revision
    }

    /// Print what changed since the previous snapshot. Stale snapshots are
    /// ignored.
    pub fn render(&mut self, snapshot: &ConversationSnapshot, out: &mut impl Write) -> io::Result<()> {
        if snapshot.revision < self.last_revision {
            return Ok(());
        }
        self.last_revision = snapshot.revision;

        let still_present = self
            .order
            .iter()
            .all(|id| snapshot.messages.iter().any(|m| &m.id == id));
        if !still_present {
            self.printed.clear();
            self.order.clear();
            writeln!(out)?;
            writeln!(out, "{}", CLEARED)?;
        }

        for message in &snapshot.messages {
            self.render_message(message, out)?;
        }
        out.flush()
    }

    fn render_message(&mut self, message: &Message, out: &mut impl Write) -> io::Result<()> {
        match self.printed.get_mut(&message.id) {
            None => {
                write!(out, "\n{}{}", speaker(message.sender), message.text)?;
                let finished = !message.is_streaming;
                if finished {
                    finish_message(message, out)?;
                }
                self.order.push(message.id.clone());
                self.printed.insert(
                    message.id.clone(),
                    Printed {
                        text: message.text.clone(),
                        finished,
                    },
                );
            }
            Some(printed) => {
                if printed.finished {
                    return Ok(());
                }
                match message.text.strip_prefix(printed.text.as_str()) {
                    Some(delta) => write!(out, "{}", delta)?,
                    // Replaced rather than extended, e.g. by an error message.
                    None => write!(out, "\n{}{}", speaker(message.sender), message.text)?,
                }
                printed.text = message.text.clone();
                if !message.is_streaming {
                    printed.finished = true;
                    finish_message(message, out)?;
                }
            }
        }
        Ok(())
    }
}

fn speaker(sender: Sender) -> &'static str {
    match sender {
        Sender::User => "Tú: ",
        Sender::Bot => "Aula: ",
    }
}

fn finish_message(message: &Message, out: &mut impl Write) -> io::Result<()> {
    writeln!(out)?;
    if let Some(sources) = message.sources.as_ref().filter(|s| !s.is_empty()) {
        writeln!(out, "{}", SOURCES_HEADER)?;
        for source in sources {
            writeln!(out, "  - {} ({})", source.title, source.uri)?;
        }
    }
    Ok(())
}

/// The blocking screen shown while the server lacks a model credential.
pub fn write_setup_needed(out: &mut impl Write) -> io::Result<()> {
    for line in locale::SETUP_NEEDED {
        writeln!(out, "{}", line)?;
    }
    out.flush()
}
