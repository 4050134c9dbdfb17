use tracing::debug;

use crate::command::WorkflowCommand;
use crate::event::{Event, EventKind};
use crate::gate::CommandGate;
use crate::mask::MaskSet;
use crate::options::ANNOTATION_RULES;

/// Turns the lines of one output stream into events.
///
/// The primary interpreter recognizes workflow commands and owns the command
/// gate; the secondary one only masks. Both share the same [`MaskSet`].
#[derive(Debug)]
pub struct StreamInterpreter {
    kind: EventKind,
    masks: MaskSet,
    gate: Option<CommandGate>,
}

impl StreamInterpreter {
    pub fn primary(masks: MaskSet) -> Self {
        Self {
            kind: EventKind::Stdout,
            masks,
            gate: Some(CommandGate::new()),
        }
    }

    pub fn secondary(masks: MaskSet) -> Self {
        Self {
            kind: EventKind::Stderr,
            masks,
            gate: None,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Interprets one line. `None` means the line produced no event.
    pub fn interpret(&mut self, line: &[u8]) -> Option<Event> {
        let Some(gate) = self.gate.as_mut() else {
            return Some(self.plain(line));
        };

        let command = match WorkflowCommand::parse(line) {
            Ok(command) => command,
            Err(_) => return Some(self.plain(line)),
        };

        if !gate.is_enabled() {
            if gate.try_resume(&command.name) {
                debug!(token = %command.name, "workflow commands resumed");
                return None;
            }
            return Some(self.plain(line));
        }

        let size = line.len();
        match command.name.as_str() {
            "debug" | "group" => Some(Event::command(
                &command.name,
                &self.masks.apply(&command.data),
                None,
                size,
            )),
            "notice" | "warning" | "error" => match command.extract(ANNOTATION_RULES) {
                Ok(properties) => Some(Event::command(
                    &command.name,
                    &self.masks.apply(&command.data),
                    Some(properties),
                    size,
                )),
                Err(err) => {
                    debug!(command = %command.name, error = %err, "dropping annotation");
                    None
                }
            },
            "endgroup" => Some(Event::command(&command.name, &[], None, size)),
            "add-mask" => {
                if self.masks.register(&command.data) {
                    debug!(registered = self.masks.len(), "mask registered");
                }
                None
            }
            "stop-commands" => {
                if gate.stop(&command.data) {
                    debug!("workflow commands stopped");
                }
                None
            }
            other => {
                debug!(command = %other, "dropping unrecognized workflow command");
                None
            }
        }
    }

    fn plain(&self, line: &[u8]) -> Event {
        Event::line(self.kind, &self.masks.apply(line), line.len())
    }
}
