pub mod errors;
pub mod form;
pub mod mail_tags;
pub mod rules;
pub mod simulate;
pub mod syntax;
pub mod validator;

pub use errors::{ErrorCollector, ErrorRecord};
pub use form::{FieldDeclaration, FieldKind, FormDefinition, MailTemplate, NamedTemplate};
pub use mail_tags::{resolve_tags, MailTag, ResolveOpts};
pub use rules::{Rule, RuleEngine, RuleSpec, SubmissionContext};
pub use simulate::Simulator;
pub use validator::{ConfigValidator, ProtectionService, SiteContext, StaticProtection};
