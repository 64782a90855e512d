use serde::{Deserialize, Serialize};

/// Base type of a declared field. A sealed set of capability-tagged kinds:
/// the simulation and validation logic dispatches on the tag, never on
/// renderer details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Email,
    Url,
    Tel,
    Textarea,
    Number,
    Date,
    Checkbox,
    Radio,
    Select,
    File,
    Acceptance,
}

impl FieldKind {
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Email => "email",
            FieldKind::Url => "url",
            FieldKind::Tel => "tel",
            FieldKind::Textarea => "textarea",
            FieldKind::Number => "number",
            FieldKind::Date => "date",
            FieldKind::Checkbox => "checkbox",
            FieldKind::Radio => "radio",
            FieldKind::Select => "select",
            FieldKind::File => "file",
            FieldKind::Acceptance => "acceptance",
        }
    }

    /// Whether the field submits one of an ordered list of candidate values.
    pub fn supports_selectable_values(&self) -> bool {
        matches!(
            self,
            FieldKind::Checkbox | FieldKind::Radio | FieldKind::Select
        )
    }
}

/// One value-transform pair: the label shown to the user and the value
/// actually submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipe {
    pub before: String,
    pub after: String,
}

/// Ordered value-transform pipeline for a selectable-values field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipes {
    pub pipes: Vec<Pipe>,
}

impl Pipes {
    pub fn collect_befores(&self) -> Vec<String> {
        self.pipes.iter().map(|p| p.before.clone()).collect()
    }

    pub fn collect_afters(&self) -> Vec<String> {
        self.pipes.iter().map(|p| p.after.clone()).collect()
    }
}

/// A declared form field. Owned by the form definition; the validators only
/// read it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDeclaration {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub pipes: Option<Pipes>,
    /// Raw per-type options, e.g. `limit:25mb` on a file field.
    #[serde(default)]
    pub options: Vec<String>,
}

impl FieldDeclaration {
    /// Value of the first `name:value` option, or `""` for a bare `name`.
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options.iter().find_map(|option| {
            if option == name {
                Some("")
            } else {
                option
                    .strip_prefix(name)
                    .and_then(|rest| rest.strip_prefix(':'))
            }
        })
    }

    /// Declared per-field upload size limit in bytes, if any.
    pub fn limit_option(&self) -> Option<u64> {
        self.option("limit").and_then(parse_bytes)
    }
}

/// Parses a byte amount with an optional k/m/g/t suffix and optional
/// trailing "b", case-insensitive: `10485760`, `25mb`, `300K`.
pub fn parse_bytes(text: &str) -> Option<u64> {
    let lower = text.trim().to_lowercase();
    let digits_end = lower.find(|c: char| !c.is_ascii_digit()).unwrap_or(lower.len());
    let (digits, suffix) = lower.split_at(digits_end);

    let amount: u64 = digits.parse().ok()?;

    let multiplier = match suffix.trim_end_matches('b') {
        "" => 1,
        "k" => 1024,
        "m" => 1024 * 1024,
        "g" => 1024 * 1024 * 1024,
        "t" => 1024u64.pow(4),
        _ => return None,
    };

    amount.checked_mul(multiplier)
}

/// Named bundle of the six textual mail fields. Non-primary templates are
/// skipped entirely unless marked active.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MailTemplate {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub recipient: String,
    /// Newline-separated `Name: value` pairs.
    #[serde(default)]
    pub additional_headers: String,
    #[serde(default)]
    pub body: String,
    /// Newline-separated mix of literal paths and bracketed field tags.
    #[serde(default)]
    pub attachments: String,
    #[serde(default)]
    pub active: bool,
}

/// A template plus the name it is addressed by in error sections
/// (`mail`, `mail_2`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedTemplate {
    pub name: String,
    #[serde(flatten)]
    pub template: MailTemplate,
}

/// The user-built form definition, as far as validation is concerned:
/// declared fields, mail templates in declared order, and the form-level
/// flags that gate validation behavior.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormDefinition {
    #[serde(default)]
    pub fields: Vec<FieldDeclaration>,
    #[serde(default)]
    pub templates: Vec<NamedTemplate>,
    #[serde(default)]
    pub demo_mode: bool,
    #[serde(default)]
    pub skip_mail: bool,
    #[serde(default)]
    pub subscribers_only: bool,
}

impl FormDefinition {
    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let form: FormDefinition = serde_yaml::from_str(content)?;
        Ok(form)
    }

    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Exact-name field lookup.
    pub fn field(&self, name: &str) -> Option<&FieldDeclaration> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn fields_of_kind(&self, kind: FieldKind) -> impl Iterator<Item = &FieldDeclaration> {
        self.fields.iter().filter(move |f| f.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selectable_values_capability() {
        assert!(FieldKind::Checkbox.supports_selectable_values());
        assert!(FieldKind::Radio.supports_selectable_values());
        assert!(FieldKind::Select.supports_selectable_values());
        assert!(!FieldKind::Text.supports_selectable_values());
        assert!(!FieldKind::File.supports_selectable_values());
    }

    #[test]
    fn test_parse_bytes() {
        assert_eq!(parse_bytes("10485760"), Some(10_485_760));
        assert_eq!(parse_bytes("25mb"), Some(25 * 1024 * 1024));
        assert_eq!(parse_bytes("300K"), Some(300 * 1024));
        assert_eq!(parse_bytes("1gb"), Some(1024 * 1024 * 1024));
        assert_eq!(parse_bytes("2b"), Some(2));
        assert_eq!(parse_bytes("junk"), None);
        assert_eq!(parse_bytes("10x"), None);
        assert_eq!(parse_bytes(""), None);
    }

    #[test]
    fn test_limit_option() {
        let field = FieldDeclaration {
            name: "upload".to_string(),
            kind: FieldKind::File,
            required: false,
            values: Vec::new(),
            pipes: None,
            options: vec!["filetypes:pdf".to_string(), "limit:10mb".to_string()],
        };

        assert_eq!(field.limit_option(), Some(10 * 1024 * 1024));
        assert_eq!(field.option("filetypes"), Some("pdf"));
        assert_eq!(field.option("missing"), None);
    }

    #[test]
    fn test_from_yaml() {
        let form = FormDefinition::from_yaml(
            r#"
fields:
  - name: your_email
    type: email
    required: true
  - name: menu
    type: select
    values: ["a", "b"]
templates:
  - name: mail
    subject: "Hello [your_email]"
    sender: "Site <admin@example.com>"
    recipient: "[your_email]"
  - name: mail_2
    active: true
    body: "copy"
subscribers_only: true
"#,
        )
        .unwrap();

        assert_eq!(form.fields.len(), 2);
        assert_eq!(form.field("your_email").unwrap().kind, FieldKind::Email);
        assert!(form.field("your_email").unwrap().required);
        assert_eq!(form.templates.len(), 2);
        assert_eq!(form.templates[0].name, "mail");
        assert!(form.templates[1].template.active);
        assert!(form.subscribers_only);
        assert!(!form.demo_mode);
    }
}
