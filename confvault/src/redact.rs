//! Line-oriented masking of sensitive command output.

use memchr::memmem::Finder;

/// Replacement for every line that contains a trigger.
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// Triggers used when the configuration does not name any.
pub const DEFAULT_TRIGGERS: &[&str] = &["password", "secret", "community", "key"];

/// Masks whole lines containing any configured trigger, ignoring case.
#[derive(Clone)]
pub struct Redactor {
    triggers: Vec<Finder<'static>>,
}

impl Redactor {
    pub fn new<S: AsRef<str>>(triggers: &[S]) -> Self {
        let triggers = triggers
            .iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .map(|t| Finder::new(t.as_bytes()).into_owned())
            .collect();
        Self { triggers }
    }

    /// Redact `text`. Line terminators, including `\r\n`, are kept as they were.
    pub fn redact(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for line in text.split_inclusive('\n') {
            let body = line.trim_end_matches(['\r', '\n']);
            if self.is_sensitive(body) {
                out.push_str(REDACTION_MARKER);
                out.push_str(&line[body.len()..]);
            } else {
                out.push_str(line);
            }
        }
        out
    }

    pub fn is_sensitive(&self, line: &str) -> bool {
        if self.triggers.is_empty() {
            return false;
        }
        let lowered = line.to_lowercase();
        self.triggers
            .iter()
            .any(|finder| finder.find(lowered.as_bytes()).is_some())
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new(DEFAULT_TRIGGERS)
    }
}

impl std::fmt::Debug for Redactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Redactor")
            .field("triggers", &self.triggers.len())
            .finish()
    }
}
