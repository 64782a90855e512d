use clap::{Arg, Command};
use formlint::validator::{ConfigValidator, SiteContext, StaticProtection};
use formlint::FormDefinition;
use log::LevelFilter;
use std::path::PathBuf;
use std::process;

fn main() {
    let matches = Command::new("formlint")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Dry-run validator for form definitions: expands mail-tags and reports configuration errors per section")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Form definition file (YAML)")
                .required(true),
        )
        .arg(
            Arg::new("site-domain")
                .long("site-domain")
                .value_name("DOMAIN")
                .help("Site domain the sender address must belong to")
                .default_value("localhost"),
        )
        .arg(
            Arg::new("admin-email")
                .long("admin-email")
                .value_name("ADDRESS")
                .help("Address substituted for the [_site_admin_email] tag")
                .default_value("webmaster@localhost"),
        )
        .arg(
            Arg::new("content-root")
                .long("content-root")
                .value_name("DIR")
                .help("Directory attachment paths must live in")
                .default_value("."),
        )
        .arg(
            Arg::new("protected")
                .long("protected")
                .help("Treat the anti-automation service as active")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("pretty")
                .long("pretty")
                .help("Pretty-print the JSON output")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    let config_path = matches.get_one::<String>("config").unwrap();

    let form = match FormDefinition::from_file(config_path) {
        Ok(form) => form,
        Err(e) => {
            eprintln!("Error loading form definition: {e}");
            process::exit(2);
        }
    };

    let site = SiteContext {
        site_domain: matches.get_one::<String>("site-domain").unwrap().clone(),
        admin_email: matches.get_one::<String>("admin-email").unwrap().clone(),
        content_root: PathBuf::from(matches.get_one::<String>("content-root").unwrap()),
    };

    let protection = StaticProtection(matches.get_flag("protected"));
    let errors = ConfigValidator::new(&form, &site, &protection).validate();
    let had_errors = !errors.is_empty();

    let output = serde_json::json!({ "config_errors": errors.to_json() });
    let rendered = if matches.get_flag("pretty") {
        serde_json::to_string_pretty(&output)
    } else {
        serde_json::to_string(&output)
    };

    match rendered {
        Ok(text) => println!("{text}"),
        Err(e) => {
            eprintln!("Error serializing results: {e}");
            process::exit(2);
        }
    }

    if had_errors {
        process::exit(1);
    }
}
