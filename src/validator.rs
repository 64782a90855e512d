use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{keys, ErrorCollector, ErrorRecord};
use crate::form::{FieldKind, FormDefinition, MailTemplate};
use crate::mail_tags::{resolve_tags, MailTag, ResolveOpts};
use crate::simulate::{Simulator, EXAMPLE_EMAIL};
use crate::syntax::{is_email_in_site_domain, is_mailbox_list, strip_newline};

/// Hard ceiling for the combined size of mail attachments.
pub const MAX_ATTACHMENTS_BYTES: u64 = 25 * 1024 * 1024;

lazy_static! {
    static ref HEADER_LINE: Regex = Regex::new(r"^([0-9A-Za-z-]+):(.*)$").unwrap();
}

fn default_site_domain() -> String {
    "localhost".to_string()
}

fn default_admin_email() -> String {
    "webmaster@localhost".to_string()
}

fn default_content_root() -> PathBuf {
    PathBuf::from(".")
}

/// Site-level configuration the validator runs against. All fields are
/// defaulted so a partial config file still loads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteContext {
    #[serde(default = "default_site_domain")]
    pub site_domain: String,
    #[serde(default = "default_admin_email")]
    pub admin_email: String,
    /// The only directory attachment paths may live in.
    #[serde(default = "default_content_root")]
    pub content_root: PathBuf,
}

impl Default for SiteContext {
    fn default() -> Self {
        SiteContext {
            site_domain: default_site_domain(),
            admin_email: default_admin_email(),
            content_root: default_content_root(),
        }
    }
}

/// Narrow interface to the anti-automation collaborator. The validator only
/// needs to know whether the service is active.
pub trait ProtectionService {
    fn is_active(&self) -> bool;
}

/// Fixed-answer protection service, for the CLI and tests.
pub struct StaticProtection(pub bool);

impl ProtectionService for StaticProtection {
    fn is_active(&self) -> bool {
        self.0
    }
}

/// Validates the mail configuration of one form definition. One instance
/// per validation run: it owns the run's error collector and the memoized
/// protection probe, and nothing is shared across runs.
pub struct ConfigValidator<'a> {
    form: &'a FormDefinition,
    site: &'a SiteContext,
    protection: &'a dyn ProtectionService,
    errors: ErrorCollector,
    protection_active: Cell<Option<bool>>,
}

impl<'a> ConfigValidator<'a> {
    pub fn new(
        form: &'a FormDefinition,
        site: &'a SiteContext,
        protection: &'a dyn ProtectionService,
    ) -> Self {
        ConfigValidator {
            form,
            site,
            protection,
            errors: ErrorCollector::new(),
            protection_active: Cell::new(None),
        }
    }

    /// Runs every check on every template and returns the accumulated
    /// errors. Checks are additive: one section's failure never prevents
    /// evaluation of the others.
    pub fn validate(mut self) -> ErrorCollector {
        if self.form.demo_mode || self.form.skip_mail {
            log::info!("mail validation skipped: form is in demo or mail-skipping mode");
            return self.errors;
        }

        let form = self.form;

        for named in &form.templates {
            // Non-primary templates are opt-in.
            if named.name != "mail" && !named.template.active {
                log::debug!("skipping inactive mail template {}", named.name);
                continue;
            }

            self.validate_mail(&named.name, &named.template);
        }

        self.errors
    }

    /// Expands all mail-tags with the conservative simulation callback.
    fn replace_mail_tags(&self, content: &str) -> String {
        let simulator = Simulator::new(self.form, &self.site.admin_email);
        let callback = |tag: &MailTag| simulator.simulate(tag);
        resolve_tags(content, &ResolveOpts::new(&callback))
    }

    fn validate_mail(&mut self, name: &str, template: &MailTemplate) {
        log::debug!("validating mail template {name}");

        self.detect_maybe_empty(&format!("{name}.subject"), &template.subject);

        let sender_section = format!("{name}.sender");
        let invalid_sender =
            self.detect_invalid_mailbox_syntax(&sender_section, &template.sender, None);

        if !invalid_sender {
            let sender = strip_newline(&self.replace_mail_tags(&template.sender));

            if !is_email_in_site_domain(&sender, &self.site.site_domain) {
                self.errors.add_error(
                    &sender_section,
                    ErrorRecord::new(
                        keys::EMAIL_NOT_IN_SITE_DOMAIN,
                        "Sender email address does not belong to the site domain.",
                    ),
                );
            }
        }

        let recipient_section = format!("{name}.recipient");
        let invalid_recipient =
            self.detect_invalid_mailbox_syntax(&recipient_section, &template.recipient, None);

        if !invalid_recipient {
            self.detect_unsafe_email_without_protection(
                &recipient_section,
                &template.recipient,
            );
        }

        self.validate_headers(name, &template.additional_headers);

        self.detect_maybe_empty(&format!("{name}.body"), &template.body);

        if !template.attachments.is_empty() {
            self.validate_attachments(name, &template.attachments);
        }
    }

    fn validate_headers(&mut self, name: &str, headers: &str) {
        let section = format!("{name}.additional_headers");
        let mut invalid_header_exists = false;

        for line in headers.split('\n') {
            let line = line.trim();

            if line.is_empty() {
                continue;
            }

            let caps = match HEADER_LINE.captures(line) {
                Some(caps) => caps,
                None => {
                    invalid_header_exists = true;
                    continue;
                }
            };

            let header_name = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let header_value = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
            let lower = header_name.to_lowercase();

            if matches!(lower.as_str(), "reply-to" | "cc" | "bcc") && !header_value.is_empty() {
                let record = ErrorRecord::new(
                    keys::INVALID_MAILBOX_SYNTAX,
                    "Invalid mailbox syntax is used in the %name% field.",
                )
                .with_param("name", header_name);

                let invalid =
                    self.detect_invalid_mailbox_syntax(&section, header_value, Some(record));

                if !invalid && matches!(lower.as_str(), "cc" | "bcc") {
                    self.detect_unsafe_email_without_protection(&section, header_value);
                }
            }
        }

        // One aggregated error for the whole block, not one per bad line.
        if invalid_header_exists {
            self.errors.add_error(
                &section,
                ErrorRecord::new(
                    keys::INVALID_MAIL_HEADER,
                    "There are invalid mail header fields.",
                ),
            );
        }
    }

    fn validate_attachments(&mut self, name: &str, attachments: &str) {
        let section = format!("{name}.attachments");
        let form = self.form;

        // Bracketed file-field references contribute their declared upload
        // limit to the size budget. A name referenced by more than one
        // declaration counts once, with the largest limit seen.
        let mut attachables: Vec<(&str, u64)> = Vec::new();

        for field in form.fields_of_kind(FieldKind::File) {
            if !attachments.contains(&format!("[{}]", field.name)) {
                continue;
            }

            let limit = field.limit_option().unwrap_or(0);

            match attachables.iter_mut().find(|(n, _)| *n == field.name) {
                Some((_, existing)) => {
                    if *existing < limit {
                        *existing = limit;
                    }
                }
                None => attachables.push((&field.name, limit)),
            }
        }

        let mut total_size: u64 = attachables.iter().map(|(_, limit)| *limit).sum();

        for line in attachments.split('\n') {
            let line = line.trim();

            if line.is_empty() || line.starts_with('[') {
                continue;
            }

            let not_found = self.detect_file_not_found(&section, line);
            self.detect_file_not_in_content_dir(&section, line);

            if !not_found {
                let path = self.site.content_root.join(line);
                total_size += fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            }
        }

        if total_size > MAX_ATTACHMENTS_BYTES {
            self.errors.add_error(
                &section,
                ErrorRecord::new(
                    keys::ATTACHMENTS_OVERWEIGHT,
                    "The total size of attachment files is too large.",
                ),
            );
        }
    }

    /// Records an error when the content resolves to an empty string.
    fn detect_maybe_empty(&mut self, section: &str, content: &str) -> bool {
        let resolved = strip_newline(&self.replace_mail_tags(content));

        if resolved.is_empty() {
            return self.errors.add_error(
                section,
                ErrorRecord::new(keys::MAYBE_EMPTY, "There is a possible empty field."),
            );
        }

        false
    }

    /// Records an error when the resolved content is not a valid mailbox
    /// list. A custom record may carry context such as the header name.
    fn detect_invalid_mailbox_syntax(
        &mut self,
        section: &str,
        content: &str,
        record: Option<ErrorRecord>,
    ) -> bool {
        let resolved = strip_newline(&self.replace_mail_tags(content));

        if is_mailbox_list(&resolved).is_none() {
            let record = record.unwrap_or_else(|| {
                ErrorRecord::new(keys::INVALID_MAILBOX_SYNTAX, "Invalid mailbox syntax is used.")
            });
            return self.errors.add_error(section, record);
        }

        false
    }

    /// Records an error when the joined path is not a readable regular
    /// file. Filesystem failures count as "not found".
    fn detect_file_not_found(&mut self, section: &str, line: &str) -> bool {
        let path = self.site.content_root.join(line);
        let is_regular = fs::metadata(&path).map(|m| m.is_file()).unwrap_or(false);

        if !is_regular {
            return self.errors.add_error(
                section,
                ErrorRecord::new(
                    keys::FILE_NOT_FOUND,
                    "Attachment file does not exist at %path%.",
                )
                .with_param("path", line),
            );
        }

        false
    }

    /// Records an error when the joined path escapes the content root.
    fn detect_file_not_in_content_dir(&mut self, section: &str, line: &str) -> bool {
        let path = self.site.content_root.join(line);

        if !self.path_in_content_root(&path) {
            return self.errors.add_error(
                section,
                ErrorRecord::new(
                    keys::FILE_NOT_IN_CONTENT_DIR,
                    "It is not allowed to use files outside the content directory.",
                ),
            );
        }

        false
    }

    /// Canonicalized containment check. Missing files are judged by their
    /// nearest existing ancestor so a nonexistent path inside the root does
    /// not also count as escaping it.
    fn path_in_content_root(&self, path: &Path) -> bool {
        let root = match self.site.content_root.canonicalize() {
            Ok(root) => root,
            Err(_) => return false,
        };

        let mut probe = path.to_path_buf();

        loop {
            match probe.canonicalize() {
                Ok(resolved) => return resolved.starts_with(&root),
                Err(_) => {
                    if !probe.pop() {
                        return false;
                    }
                }
            }
        }
    }

    /// Records an error when the content can still leak a submitted email
    /// address and no anti-automation protection is active. Two resolver
    /// passes: the first substitutes only tags bound to email-typed fields,
    /// the second mops up the rest with the default callback.
    fn detect_unsafe_email_without_protection(&mut self, section: &str, content: &str) -> bool {
        if self.protection_is_active() {
            return false;
        }

        let form = self.form;
        let email_fields_only = |tag: &MailTag| -> String {
            match form.field(tag.field_name()) {
                Some(field) if field.kind == FieldKind::Email => EXAMPLE_EMAIL.to_string(),
                _ => tag.raw().to_string(),
            }
        };

        let first_pass = resolve_tags(content, &ResolveOpts::new(&email_fields_only));
        let resolved = strip_newline(&self.replace_mail_tags(&first_pass));

        if resolved.contains(EXAMPLE_EMAIL) {
            return self.errors.add_error(
                section,
                ErrorRecord::new(
                    keys::UNSAFE_EMAIL_WITHOUT_PROTECTION,
                    "Unsafe email config is used without sufficient protection.",
                ),
            );
        }

        false
    }

    /// The protection probe is evaluated lazily, once per run.
    fn protection_is_active(&self) -> bool {
        if let Some(active) = self.protection_active.get() {
            return active;
        }

        let active = self.protection.is_active();
        log::debug!("anti-automation service active: {active}");
        self.protection_active.set(Some(active));
        active
    }
}
