/// Enable/disable switch for command recognition on the primary stream.
///
/// `stop-commands` with a token disables recognition until a line whose
/// command name equals that token is seen.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct CommandGate {
    resume_token: Option<String>,
}

impl CommandGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.resume_token.is_none()
    }

    pub fn resume_token(&self) -> Option<&str> {
        self.resume_token.as_deref()
    }

    /// Disables recognition, remembering `token` as the resume token.
    ///
    /// Ignored when `token` is empty or the gate is already disabled.
    pub fn stop(&mut self, token: &[u8]) -> bool {
        if token.is_empty() || !self.is_enabled() {
            return false;
        }
        self.resume_token = Some(String::from_utf8_lossy(token).into_owned());
        true
    }

    /// Re-enables recognition if `name` is the stored resume token.
    pub fn try_resume(&mut self, name: &str) -> bool {
        if self.resume_token.as_deref() == Some(name) {
            self.resume_token = None;
            return true;
        }
        false
    }
}
