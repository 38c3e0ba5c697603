use tracing::warn;

/// Environment variables with this prefix hold credentials the agent may
/// echo back (browser logins, connection strings).
pub const DEFAULT_CRED_PREFIX: &str = "BROWSER_CRED_";

/// String-rewriting pass that masks known credential values before a line
/// reaches any sink (log file, stdout, hub, database rows).
///
/// Heuristic only: a child that base64-encodes a credential or splits it
/// across lines will get past the filter. Not a security boundary.
#[derive(Debug, Default)]
pub struct Redactor {
    entries: Vec<(String, String)>,
}

impl Redactor {
    /// Build from the process environment at supervisor startup.
    pub fn from_env(prefix: &str) -> Self {
        Self::from_vars(prefix, std::env::vars())
    }

    pub fn from_vars(prefix: &str, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut entries = Vec::new();

        for (name, value) in vars {
            if !name.starts_with(prefix) || value.is_empty() {
                continue;
            }

            if value.len() < 4 {
                warn!(
                    variable = %name,
                    "credential value shorter than 4 characters; redaction may mask unrelated text"
                );
            }

            entries.push((value.clone(), format!("[REDACTED:{}]", name)));

            let encoded = urlencoding::encode(&value).into_owned();
            if encoded != value {
                entries.push((encoded, format!("[REDACTED:{}:urlencoded]", name)));
            }
        }

        Self { entries }
    }

    /// True when no credential variables were present at construction.
    pub fn is_identity(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn redact(&self, s: &str) -> String {
        if self.entries.is_empty() {
            return s.to_string();
        }

        let mut out = s.to_string();
        for (needle, placeholder) in &self.entries {
            if out.contains(needle.as_str()) {
                out = out.replace(needle.as_str(), placeholder);
            }
        }
        out
    }
}
