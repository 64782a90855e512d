use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{ErrorCollector, ErrorRecord};
use crate::syntax::is_email;

/// What a validation run knows about one submission: which aspects are being
/// validated this run, the submitted text values, and the uploaded file
/// sizes (one list per field, `None` for blank entries).
#[derive(Debug, Default, Clone)]
pub struct SubmissionContext {
    pub text: bool,
    pub file: bool,
    pub values: HashMap<String, Vec<String>>,
    pub uploads: HashMap<String, Vec<Option<u64>>>,
}

impl SubmissionContext {
    fn non_blank_values(&self, field: &str) -> Vec<&str> {
        self.values
            .get(field)
            .map(|values| {
                values
                    .iter()
                    .map(|v| v.as_str())
                    .filter(|v| !v.trim().is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn upload_sizes(&self, field: &str) -> Vec<u64> {
        self.uploads
            .get(field)
            .map(|sizes| sizes.iter().filter_map(|s| *s).collect())
            .unwrap_or_default()
    }
}

/// One declared constraint on one field. `matches` is a cheap applicability
/// pre-check; a rule that does not match is skipped without producing an
/// error. `validate` returns `true` on pass and records one error record
/// under the field's section on failure.
pub trait Rule {
    fn name(&self) -> &'static str;
    fn matches(&self, ctx: &SubmissionContext) -> bool;
    fn validate(&self, ctx: &SubmissionContext, errors: &mut ErrorCollector) -> bool;
}

/// Declarative rule description, deserializable from a form definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum RuleSpec {
    MinFileSize { field: String, threshold: u64 },
    MaxFileSize { field: String, threshold: u64 },
    Required { field: String },
    Email { field: String },
    MinLength { field: String, threshold: usize },
    MaxLength { field: String, threshold: usize },
    Pattern { field: String, pattern: String },
}

impl RuleSpec {
    pub fn into_rule(self) -> Box<dyn Rule> {
        match self {
            RuleSpec::MinFileSize { field, threshold } => {
                Box::new(MinFileSizeRule { field, threshold })
            }
            RuleSpec::MaxFileSize { field, threshold } => {
                Box::new(MaxFileSizeRule { field, threshold })
            }
            RuleSpec::Required { field } => Box::new(RequiredRule { field }),
            RuleSpec::Email { field } => Box::new(EmailRule { field }),
            RuleSpec::MinLength { field, threshold } => {
                Box::new(MinLengthRule { field, threshold })
            }
            RuleSpec::MaxLength { field, threshold } => {
                Box::new(MaxLengthRule { field, threshold })
            }
            RuleSpec::Pattern { field, pattern } => Box::new(PatternRule { field, pattern }),
        }
    }
}

/// Evaluates every matching rule against one submission. Errors are
/// additive: a failing rule never stops the others.
#[derive(Default)]
pub struct RuleEngine {
    rules: Vec<Box<dyn Rule>>,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_specs(specs: Vec<RuleSpec>) -> Self {
        RuleEngine {
            rules: specs.into_iter().map(RuleSpec::into_rule).collect(),
        }
    }

    pub fn push(&mut self, rule: Box<dyn Rule>) {
        self.rules.push(rule);
    }

    /// Returns `true` when every applicable rule passed.
    pub fn validate(&self, ctx: &SubmissionContext, errors: &mut ErrorCollector) -> bool {
        let mut all_passed = true;

        for rule in &self.rules {
            if !rule.matches(ctx) {
                log::debug!("rule {} does not apply, skipped", rule.name());
                continue;
            }

            if !rule.validate(ctx, errors) {
                all_passed = false;
            }
        }

        all_passed
    }
}

/// Minimum aggregate size of the files uploaded for one field. A field may
/// submit multiple files; their sizes are summed. Absence of any upload is
/// not a failure: presence is the required rule's responsibility.
pub struct MinFileSizeRule {
    pub field: String,
    pub threshold: u64,
}

impl Rule for MinFileSizeRule {
    fn name(&self) -> &'static str {
        "min_file_size"
    }

    fn matches(&self, ctx: &SubmissionContext) -> bool {
        ctx.file
    }

    fn validate(&self, ctx: &SubmissionContext, errors: &mut ErrorCollector) -> bool {
        let sizes = ctx.upload_sizes(&self.field);

        if sizes.is_empty() {
            return true;
        }

        if sizes.iter().sum::<u64>() < self.threshold {
            errors.add_error(
                &self.field,
                ErrorRecord::new(self.name(), "The uploaded file is too small."),
            );
            return false;
        }

        true
    }
}

/// Maximum aggregate size of the files uploaded for one field.
pub struct MaxFileSizeRule {
    pub field: String,
    pub threshold: u64,
}

impl Rule for MaxFileSizeRule {
    fn name(&self) -> &'static str {
        "max_file_size"
    }

    fn matches(&self, ctx: &SubmissionContext) -> bool {
        ctx.file
    }

    fn validate(&self, ctx: &SubmissionContext, errors: &mut ErrorCollector) -> bool {
        let sizes = ctx.upload_sizes(&self.field);

        if sizes.is_empty() {
            return true;
        }

        if sizes.iter().sum::<u64>() > self.threshold {
            errors.add_error(
                &self.field,
                ErrorRecord::new(self.name(), "The uploaded file is too large."),
            );
            return false;
        }

        true
    }
}

/// The field must carry at least one non-blank value or one uploaded file.
pub struct RequiredRule {
    pub field: String,
}

impl Rule for RequiredRule {
    fn name(&self) -> &'static str {
        "required"
    }

    fn matches(&self, ctx: &SubmissionContext) -> bool {
        ctx.text || ctx.file
    }

    fn validate(&self, ctx: &SubmissionContext, errors: &mut ErrorCollector) -> bool {
        if ctx.non_blank_values(&self.field).is_empty()
            && ctx.upload_sizes(&self.field).is_empty()
        {
            errors.add_error(
                &self.field,
                ErrorRecord::new(self.name(), "Please fill out this field."),
            );
            return false;
        }

        true
    }
}

/// Every non-blank submitted value must be a syntactically valid email
/// address.
pub struct EmailRule {
    pub field: String,
}

impl Rule for EmailRule {
    fn name(&self) -> &'static str {
        "email"
    }

    fn matches(&self, ctx: &SubmissionContext) -> bool {
        ctx.text
    }

    fn validate(&self, ctx: &SubmissionContext, errors: &mut ErrorCollector) -> bool {
        if ctx
            .non_blank_values(&self.field)
            .iter()
            .any(|value| !is_email(value.trim()))
        {
            errors.add_error(
                &self.field,
                ErrorRecord::new(self.name(), "Please enter a valid email address."),
            );
            return false;
        }

        true
    }
}

/// Minimum total character count across the field's non-blank values.
pub struct MinLengthRule {
    pub field: String,
    pub threshold: usize,
}

impl Rule for MinLengthRule {
    fn name(&self) -> &'static str {
        "min_length"
    }

    fn matches(&self, ctx: &SubmissionContext) -> bool {
        ctx.text
    }

    fn validate(&self, ctx: &SubmissionContext, errors: &mut ErrorCollector) -> bool {
        let values = ctx.non_blank_values(&self.field);

        if values.is_empty() {
            return true;
        }

        let total: usize = values.iter().map(|v| v.chars().count()).sum();

        if total < self.threshold {
            errors.add_error(
                &self.field,
                ErrorRecord::new(self.name(), "This field has a too short input."),
            );
            return false;
        }

        true
    }
}

/// Maximum total character count across the field's non-blank values.
pub struct MaxLengthRule {
    pub field: String,
    pub threshold: usize,
}

impl Rule for MaxLengthRule {
    fn name(&self) -> &'static str {
        "max_length"
    }

    fn matches(&self, ctx: &SubmissionContext) -> bool {
        ctx.text
    }

    fn validate(&self, ctx: &SubmissionContext, errors: &mut ErrorCollector) -> bool {
        let total: usize = ctx
            .non_blank_values(&self.field)
            .iter()
            .map(|v| v.chars().count())
            .sum();

        if total > self.threshold {
            errors.add_error(
                &self.field,
                ErrorRecord::new(self.name(), "This field has a too long input."),
            );
            return false;
        }

        true
    }
}

/// Every non-blank submitted value must match the anchored pattern. A
/// pattern that fails to compile disables the rule with a warning instead
/// of failing the submission.
pub struct PatternRule {
    pub field: String,
    pub pattern: String,
}

impl PatternRule {
    fn compiled(&self) -> Option<Regex> {
        match Regex::new(&format!("^(?:{})$", self.pattern)) {
            Ok(regex) => Some(regex),
            Err(e) => {
                log::warn!("invalid pattern for field {}: {e}", self.field);
                None
            }
        }
    }
}

impl Rule for PatternRule {
    fn name(&self) -> &'static str {
        "pattern"
    }

    fn matches(&self, ctx: &SubmissionContext) -> bool {
        ctx.text && self.compiled().is_some()
    }

    fn validate(&self, ctx: &SubmissionContext, errors: &mut ErrorCollector) -> bool {
        let regex = match self.compiled() {
            Some(regex) => regex,
            None => return true,
        };

        if ctx
            .non_blank_values(&self.field)
            .iter()
            .any(|value| !regex.is_match(value))
        {
            errors.add_error(
                &self.field,
                ErrorRecord::new(self.name(), "This field has an input in invalid format."),
            );
            return false;
        }

        true
    }
}
