use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Optional extra "[", tag name, whitespace-separated options (barewords
    // or quoted strings), optional extra "]". The extra brackets form the
    // [[name]] escape syntax.
    static ref TAG_PATTERN: Regex = Regex::new(
        r#"(\[?)\[([a-zA-Z_][0-9A-Za-z_]*)((?:[\r\n\t ]+(?:"[^"]*"|'[^']*'|[^\s\]"']+))*)[\r\n\t ]*\](\]?)"#
    )
    .unwrap();
    static ref QUOTED_VALUE: Regex = Regex::new(r#""[^"]*"|'[^']*'"#).unwrap();
}

/// One placeholder occurrence found in a template. Produced transiently
/// during a resolver pass and handed to the substitution callback.
#[derive(Debug, Clone)]
pub struct MailTag {
    raw: String,
    tagname: String,
    options_raw: String,
    field_name: String,
    do_not_transform: bool,
    values: Vec<String>,
}

impl MailTag {
    pub fn new(raw: &str, tagname: &str, options_raw: &str) -> Self {
        // A "_raw_" name prefix addresses the field's pre-transform values.
        let (field_name, do_not_transform) = match tagname.strip_prefix("_raw_") {
            Some(rest) if !rest.is_empty() => (rest.to_string(), true),
            _ => (tagname.to_string(), false),
        };

        let values = QUOTED_VALUE
            .find_iter(options_raw)
            .map(|m| {
                let quoted = m.as_str();
                quoted[1..quoted.len() - 1].to_string()
            })
            .collect();

        MailTag {
            raw: raw.to_string(),
            tagname: tagname.to_string(),
            options_raw: options_raw.to_string(),
            field_name,
            do_not_transform,
            values,
        }
    }

    /// The whole matched text, brackets included.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn tagname(&self) -> &str {
        &self.tagname
    }

    /// The declared-field name this tag refers to (`_raw_` prefix stripped).
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn do_not_transform(&self) -> bool {
        self.do_not_transform
    }

    /// Quoted values from the option list, quotes stripped.
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Whether a bareword option `name` or `name:value` is present.
    pub fn has_option(&self, name: &str) -> bool {
        self.options_raw.split_whitespace().any(|option| {
            option == name
                || option
                    .strip_prefix(name)
                    .is_some_and(|rest| rest.starts_with(':'))
        })
    }
}

/// Resolver configuration: the substitution callback is a first-class
/// function value so callers can swap it per pass.
pub struct ResolveOpts<'a> {
    pub html: bool,
    pub callback: &'a dyn Fn(&MailTag) -> String,
}

impl<'a> ResolveOpts<'a> {
    pub fn new(callback: &'a dyn Fn(&MailTag) -> String) -> Self {
        ResolveOpts {
            html: false,
            callback,
        }
    }
}

/// Expands every `[tagname option...]` token in the template through the
/// callback. `[[name]]` passes through literally with one bracket layer
/// stripped and never reaches the callback. Single pass: substituted output
/// is not re-scanned, so self-referential tokens cannot loop.
pub fn resolve_tags(template: &str, opts: &ResolveOpts) -> String {
    let mut output = String::with_capacity(template.len());
    let mut last_end = 0;

    for caps in TAG_PATTERN.captures_iter(template) {
        let whole = caps.get(0).unwrap();
        output.push_str(&template[last_end..whole.start()]);

        let extra_open = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let extra_close = caps.get(4).map(|m| m.as_str()).unwrap_or("");

        if extra_open == "[" && extra_close == "]" {
            // Escaped tag: strip exactly one layer of brackets.
            let matched = whole.as_str();
            output.push_str(&matched[1..matched.len() - 1]);
        } else {
            let tag = MailTag::new(
                whole.as_str(),
                caps.get(2).map(|m| m.as_str()).unwrap_or(""),
                caps.get(3).map(|m| m.as_str().trim()).unwrap_or(""),
            );

            let replaced = (opts.callback)(&tag);

            if opts.html {
                output.push_str(&escape_html(&replaced));
            } else {
                output.push_str(&replaced);
            }
        }

        last_end = whole.end();
    }

    output.push_str(&template[last_end..]);
    output
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());

    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            _ => escaped.push(c),
        }
    }

    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn resolve_with<F: Fn(&MailTag) -> String>(template: &str, callback: F) -> String {
        resolve_tags(template, &ResolveOpts::new(&callback))
    }

    #[test]
    fn test_identity_without_tokens() {
        let callback = |_: &MailTag| panic!("callback must not run");
        assert_eq!(
            resolve_with("plain text, no tokens here", callback),
            "plain text, no tokens here"
        );
    }

    #[test]
    fn test_simple_substitution() {
        let out = resolve_with("Hello [your_name]!", |tag| {
            assert_eq!(tag.tagname(), "your_name");
            "Bob".to_string()
        });
        assert_eq!(out, "Hello Bob!");
    }

    #[test]
    fn test_escaped_tag_skips_callback() {
        let invoked = Cell::new(false);
        let out = resolve_with("literal [[your_name]] stays", |_| {
            invoked.set(true);
            String::new()
        });
        assert_eq!(out, "literal [your_name] stays");
        assert!(!invoked.get());
    }

    #[test]
    fn test_mixed_escaped_and_live_tags() {
        let out = resolve_with("[[a]] and [b]", |tag| format!("<{}>", tag.tagname()));
        assert_eq!(out, "[a] and <b>");
    }

    #[test]
    fn test_options_and_quoted_values() {
        let out = resolve_with(r#"[when format:Y-m-d "first of May"]"#, |tag| {
            assert_eq!(tag.field_name(), "when");
            assert!(tag.has_option("format"));
            assert!(!tag.has_option("forma"));
            assert_eq!(tag.values(), ["first of May"]);
            "ok".to_string()
        });
        assert_eq!(out, "ok");
    }

    #[test]
    fn test_raw_prefix_sets_do_not_transform() {
        resolve_with("[_raw_menu_choice]", |tag| {
            assert_eq!(tag.field_name(), "menu_choice");
            assert!(tag.do_not_transform());
            String::new()
        });
    }

    #[test]
    fn test_name_must_not_start_with_digit() {
        let out = resolve_with("[1abc] [ok_1]", |tag| {
            assert_eq!(tag.tagname(), "ok_1");
            "yes".to_string()
        });
        assert_eq!(out, "[1abc] yes");
    }

    #[test]
    fn test_single_pass_no_reexpansion() {
        let out = resolve_with("[a]", |_| "[a]".to_string());
        assert_eq!(out, "[a]");
    }

    #[test]
    fn test_html_mode_escapes_output() {
        let callback = |_: &MailTag| "<b>&\"'".to_string();
        let opts = ResolveOpts {
            html: true,
            callback: &callback,
        };
        assert_eq!(resolve_tags("[x]", &opts), "&lt;b&gt;&amp;&quot;&#039;");
    }
}
