use serde_json::{json, Value};

/// Stable machine keys for every defect the validators can record. Human
/// messages may change; these never do.
pub mod keys {
    pub const MAYBE_EMPTY: &str = "maybe_empty";
    pub const INVALID_MAILBOX_SYNTAX: &str = "invalid_mailbox_syntax";
    pub const EMAIL_NOT_IN_SITE_DOMAIN: &str = "email_not_in_site_domain";
    pub const INVALID_MAIL_HEADER: &str = "invalid_mail_header";
    pub const UNSAFE_EMAIL_WITHOUT_PROTECTION: &str = "unsafe_email_without_protection";
    pub const FILE_NOT_FOUND: &str = "file_not_found";
    pub const FILE_NOT_IN_CONTENT_DIR: &str = "file_not_in_content_dir";
    pub const ATTACHMENTS_OVERWEIGHT: &str = "attachments_overweight";
}

/// Documentation page for a known error key, linked from the editor UI.
pub fn help_link(key: &str) -> Option<String> {
    const DOCUMENTED: &[&str] = &[
        keys::MAYBE_EMPTY,
        keys::INVALID_MAILBOX_SYNTAX,
        keys::EMAIL_NOT_IN_SITE_DOMAIN,
        keys::INVALID_MAIL_HEADER,
        keys::UNSAFE_EMAIL_WITHOUT_PROTECTION,
        keys::FILE_NOT_FOUND,
        keys::FILE_NOT_IN_CONTENT_DIR,
        keys::ATTACHMENTS_OVERWEIGHT,
    ];

    if DOCUMENTED.contains(&key) {
        Some(format!(
            "https://formlint.dev/config-errors/{}/",
            key.replace('_', "-")
        ))
    } else {
        None
    }
}

/// One recorded defect. The message may contain `%name%`-style placeholders
/// that are interpolated from `params` when the record is rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub key: String,
    pub message: String,
    pub params: Vec<(String, String)>,
    pub link: Option<String>,
}

impl ErrorRecord {
    pub fn new(key: &str, message: &str) -> Self {
        ErrorRecord {
            key: key.to_string(),
            message: message.to_string(),
            params: Vec::new(),
            link: help_link(key),
        }
    }

    pub fn with_param(mut self, name: &str, value: &str) -> Self {
        self.params.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_link(mut self, link: &str) -> Self {
        self.link = Some(link.to_string());
        self
    }

    /// Renders the message with all `%name%` placeholders interpolated.
    pub fn text(&self) -> String {
        let mut message = self.message.clone();
        for (name, value) in &self.params {
            message = message.replace(&format!("%{name}%"), value);
        }
        message
    }
}

/// Keyed accumulator of validation defects: section name (for example
/// `mail.sender`) to ordered list of records. Single-use: one collector per
/// validation run.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    sections: Vec<(String, Vec<ErrorRecord>)>,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record under the given section. Always returns `true` so
    /// call sites can chain `if !detect(..) { further_checks() }`.
    pub fn add_error(&mut self, section: &str, record: ErrorRecord) -> bool {
        log::debug!("config error in {section}: {}", record.key);

        match self.sections.iter_mut().find(|(name, _)| name == section) {
            Some((_, records)) => records.push(record),
            None => self.sections.push((section.to_string(), vec![record])),
        }

        true
    }

    /// Number of records whose section starts with the given prefix. Used to
    /// badge an editor tab that aggregates several sections.
    pub fn count_errors(&self, prefix: &str) -> usize {
        self.sections
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(_, records)| records.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ErrorRecord])> {
        self.sections
            .iter()
            .map(|(name, records)| (name.as_str(), records.as_slice()))
    }

    /// Serializes as `{ section: [{message, link?}] }`. Params are already
    /// interpolated; machine keys stay internal.
    pub fn to_json(&self) -> Value {
        let mut sections = serde_json::Map::new();

        for (name, records) in &self.sections {
            let rendered: Vec<Value> = records
                .iter()
                .map(|record| match &record.link {
                    Some(link) => json!({ "message": record.text(), "link": link }),
                    None => json!({ "message": record.text() }),
                })
                .collect();

            sections.insert(name.clone(), Value::Array(rendered));
        }

        Value::Object(sections)
    }
}
