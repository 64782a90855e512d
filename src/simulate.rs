use crate::form::{FieldKind, FormDefinition};
use crate::mail_tags::MailTag;
use crate::syntax::is_mailbox_list;

/// Canned example values substituted for tags during a dry run.
pub const EXAMPLE_EMAIL: &str = "example@example.com";
pub const EXAMPLE_TEXT: &str = "example";

/// Default substitution callback for validation: replaces each tag with the
/// most conservative realistic input for the referenced field. Optional
/// fields simulate blank so they never fake a "non-empty" illusion; required
/// fields simulate the value most likely to trigger a real problem.
pub struct Simulator<'a> {
    form: &'a FormDefinition,
    admin_email: &'a str,
}

impl<'a> Simulator<'a> {
    pub fn new(form: &'a FormDefinition, admin_email: &'a str) -> Self {
        Simulator { form, admin_email }
    }

    pub fn simulate(&self, tag: &MailTag) -> String {
        let field_name = tag.field_name();

        match self.form.field(field_name) {
            Some(field) => {
                // Radio groups always submit a value even without the flag.
                let required = field.required || field.kind == FieldKind::Radio;

                if !required {
                    return String::new();
                }

                if field.kind.supports_selectable_values() {
                    let last_candidate = match &field.pipes {
                        Some(pipes) => {
                            if tag.do_not_transform() {
                                pipes.collect_befores().pop()
                            } else {
                                pipes.collect_afters().pop()
                            }
                        }
                        None => field.values.last().cloned(),
                    };

                    // An email-shaped last candidate means the field can
                    // feed an address into the template.
                    return match last_candidate {
                        Some(value)
                            if !value.is_empty() && is_mailbox_list(&value).is_some() =>
                        {
                            EXAMPLE_EMAIL.to_string()
                        }
                        _ => EXAMPLE_TEXT.to_string(),
                    };
                }

                if field.kind == FieldKind::Email {
                    EXAMPLE_EMAIL.to_string()
                } else {
                    EXAMPLE_TEXT.to_string()
                }
            }
            None => self.simulate_special(field_name, tag),
        }
    }

    /// Virtual names with no matching declared field.
    fn simulate_special(&self, field_name: &str, tag: &MailTag) -> String {
        if field_name == "_site_admin_email" {
            return self.admin_email.to_string();
        }

        if field_name == "_user_agent" {
            return EXAMPLE_TEXT.to_string();
        }

        // User-bound tags only carry a value when submission is restricted
        // to logged-in subscribers.
        if field_name == "_user_email" {
            return if self.form.subscribers_only {
                EXAMPLE_EMAIL.to_string()
            } else {
                String::new()
            };
        }

        if field_name.starts_with("_user_") {
            return if self.form.subscribers_only {
                EXAMPLE_TEXT.to_string()
            } else {
                String::new()
            };
        }

        if field_name.starts_with('_') {
            return if field_name.ends_with("_email") {
                EXAMPLE_EMAIL.to_string()
            } else {
                EXAMPLE_TEXT.to_string()
            };
        }

        // Unknown name: leave the token as literal text.
        log::debug!("no field declaration matches tag [{}]", tag.tagname());
        tag.raw().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::{FieldDeclaration, Pipe, Pipes};
    use crate::mail_tags::{resolve_tags, ResolveOpts};

    fn field(name: &str, kind: FieldKind, required: bool) -> FieldDeclaration {
        FieldDeclaration {
            name: name.to_string(),
            kind,
            required,
            values: Vec::new(),
            pipes: None,
            options: Vec::new(),
        }
    }

    fn simulate_in(form: &FormDefinition, template: &str) -> String {
        let simulator = Simulator::new(form, "admin@site.example.com");
        let callback = |tag: &MailTag| simulator.simulate(tag);
        resolve_tags(template, &ResolveOpts::new(&callback))
    }

    #[test]
    fn test_optional_field_simulates_blank() {
        let form = FormDefinition {
            fields: vec![field("note", FieldKind::Textarea, false)],
            ..Default::default()
        };
        assert_eq!(simulate_in(&form, "[note]"), "");
    }

    #[test]
    fn test_required_email_field() {
        let form = FormDefinition {
            fields: vec![field("your_email", FieldKind::Email, true)],
            ..Default::default()
        };
        assert_eq!(simulate_in(&form, "[your_email]"), EXAMPLE_EMAIL);
    }

    #[test]
    fn test_required_text_field() {
        let form = FormDefinition {
            fields: vec![field("your_name", FieldKind::Text, true)],
            ..Default::default()
        };
        assert_eq!(simulate_in(&form, "[your_name]"), EXAMPLE_TEXT);
    }

    #[test]
    fn test_radio_counts_as_required() {
        let mut radio = field("choice", FieldKind::Radio, false);
        radio.values = vec!["yes".to_string(), "no".to_string()];
        let form = FormDefinition {
            fields: vec![radio],
            ..Default::default()
        };
        assert_eq!(simulate_in(&form, "[choice]"), EXAMPLE_TEXT);
    }

    #[test]
    fn test_selectable_last_value_email_shaped() {
        let mut select = field("route", FieldKind::Select, true);
        select.values = vec!["info".to_string(), "sales@example.com".to_string()];
        let form = FormDefinition {
            fields: vec![select],
            ..Default::default()
        };
        assert_eq!(simulate_in(&form, "[route]"), EXAMPLE_EMAIL);
    }

    #[test]
    fn test_selectable_pipes_after_vs_before() {
        let mut select = field("route", FieldKind::Select, true);
        select.pipes = Some(Pipes {
            pipes: vec![Pipe {
                before: "Sales".to_string(),
                after: "sales@example.com".to_string(),
            }],
        });
        let form = FormDefinition {
            fields: vec![select],
            ..Default::default()
        };

        // Transformed value is email-shaped, untransformed label is not.
        assert_eq!(simulate_in(&form, "[route]"), EXAMPLE_EMAIL);
        assert_eq!(simulate_in(&form, "[_raw_route]"), EXAMPLE_TEXT);
    }

    #[test]
    fn test_site_admin_email_tag() {
        let form = FormDefinition::default();
        assert_eq!(
            simulate_in(&form, "[_site_admin_email]"),
            "admin@site.example.com"
        );
    }

    #[test]
    fn test_user_tags_follow_subscribers_only() {
        let open = FormDefinition::default();
        assert_eq!(simulate_in(&open, "[_user_email]"), "");
        assert_eq!(simulate_in(&open, "[_user_login]"), "");

        let restricted = FormDefinition {
            subscribers_only: true,
            ..Default::default()
        };
        assert_eq!(simulate_in(&restricted, "[_user_email]"), EXAMPLE_EMAIL);
        assert_eq!(simulate_in(&restricted, "[_user_login]"), EXAMPLE_TEXT);
    }

    #[test]
    fn test_other_underscore_tags() {
        let form = FormDefinition::default();
        assert_eq!(simulate_in(&form, "[_serial_number]"), EXAMPLE_TEXT);
        assert_eq!(simulate_in(&form, "[_reply_email]"), EXAMPLE_EMAIL);
        assert_eq!(simulate_in(&form, "[_user_agent]"), EXAMPLE_TEXT);
    }

    #[test]
    fn test_unknown_tag_passes_through() {
        let form = FormDefinition::default();
        assert_eq!(simulate_in(&form, "see [no_such_field]"), "see [no_such_field]");
    }
}
