use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref ADDR_SPEC: Regex = Regex::new(
        r"^[0-9A-Za-z!#$%&'*+/=?^_`{|}~.-]+@[0-9A-Za-z](?:[0-9A-Za-z-]*[0-9A-Za-z])?(?:\.[0-9A-Za-z](?:[0-9A-Za-z-]*[0-9A-Za-z])?)+$"
    )
    .unwrap();
    static ref ESCAPED_QUOTE: Regex = Regex::new(r#"\\["']"#).unwrap();
    static ref QUOTED_STRING: Regex = Regex::new(r#""[^"]*"|'[^']*'"#).unwrap();
    static ref ANGLE_ADDR: Regex = Regex::new(r"<(.+)>$").unwrap();
}

/// Removes all line breaks and trims surrounding whitespace. Templates are
/// resolved before syntax checks, so a multi-line value collapses into one
/// candidate string.
pub fn strip_newline(text: &str) -> String {
    text.replace(['\r', '\n'], "").trim().to_string()
}

/// Checks whether the string is a single RFC-shaped addr-spec.
pub fn is_email(text: &str) -> bool {
    ADDR_SPEC.is_match(text)
}

/// Parses a comma-separated mailbox list. Each mailbox is either a bare
/// addr-spec or `Display Name <addr-spec>`; quoted display names may contain
/// commas. Returns the extracted addr-specs, or `None` when any entry fails
/// the grammar. The empty string is not a valid list.
pub fn is_mailbox_list(text: &str) -> Option<Vec<String>> {
    // Mask escaped quotes first, then whole quoted strings, so that commas
    // inside display names do not split the list.
    let masked = ESCAPED_QUOTE.replace_all(text, "esc-quote");
    let masked = QUOTED_STRING.replace_all(&masked, "quoted-string");

    let mut addresses = Vec::new();

    for mailbox in masked.split(',') {
        let mailbox = mailbox.trim();

        let addr_spec = match ANGLE_ADDR.captures(mailbox) {
            Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or(mailbox),
            None => mailbox,
        };

        if !is_email(addr_spec) {
            return None;
        }

        addresses.push(addr_spec.to_string());
    }

    Some(addresses)
}

/// Checks that every address in the mailbox list belongs to the given domain
/// or to one of its parent suffixes. A site at `www.example.com` accepts a
/// sender at `example.com`.
pub fn is_email_in_domain(email_list: &str, domain: &str) -> bool {
    let addresses = match is_mailbox_list(email_list) {
        Some(addresses) => addresses,
        None => return false,
    };

    let domain = domain.to_lowercase();

    'addresses: for address in &addresses {
        let email_domain = address
            .rsplit('@')
            .next()
            .unwrap_or_default()
            .to_lowercase();

        let mut labels: Vec<&str> = domain.split('.').collect();

        while !labels.is_empty() {
            if labels.join(".") == email_domain {
                continue 'addresses;
            }
            labels.remove(0);
        }

        return false;
    }

    true
}

/// Site-domain variant of [`is_email_in_domain`]. Local development hosts
/// (`localhost`, empty, IP literals) accept any sender.
pub fn is_email_in_site_domain(email_list: &str, site_domain: &str) -> bool {
    let site_domain = site_domain.trim().to_lowercase();

    if site_domain.is_empty() || site_domain == "localhost" {
        return true;
    }

    // An IP literal has no meaningful domain hierarchy to compare against.
    if !site_domain.chars().any(|c| c.is_ascii_alphabetic()) {
        return true;
    }

    is_email_in_domain(email_list, &site_domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_newline() {
        assert_eq!(strip_newline("a\r\nb\nc"), "abc");
        assert_eq!(strip_newline("  padded \n"), "padded");
        assert_eq!(strip_newline(""), "");
    }

    #[test]
    fn test_is_email() {
        assert!(is_email("bob@example.com"));
        assert!(is_email("first.last+tag@mail.example.co.uk"));
        assert!(!is_email("not-an-email"));
        assert!(!is_email(""));
        assert!(!is_email("bob@"));
        assert!(!is_email("@example.com"));
        assert!(!is_email("bob@example"));
    }

    #[test]
    fn test_mailbox_list_bare_addresses() {
        let list = is_mailbox_list("a@example.com, b@example.com").unwrap();
        assert_eq!(list, vec!["a@example.com", "b@example.com"]);
    }

    #[test]
    fn test_mailbox_list_display_names() {
        let list = is_mailbox_list("Bob <bob@example.com>").unwrap();
        assert_eq!(list, vec!["bob@example.com"]);

        // Quoted display name containing a comma must not split the list.
        let list = is_mailbox_list(r#""Doe, Jane" <jane@example.com>"#).unwrap();
        assert_eq!(list, vec!["jane@example.com"]);
    }

    #[test]
    fn test_mailbox_list_rejects_invalid() {
        assert!(is_mailbox_list("").is_none());
        assert!(is_mailbox_list("not-an-email").is_none());
        assert!(is_mailbox_list("a@example.com, broken").is_none());
    }

    #[test]
    fn test_email_in_domain_suffix_peeling() {
        assert!(is_email_in_domain("bob@example.com", "example.com"));
        assert!(is_email_in_domain("bob@example.com", "www.example.com"));
        assert!(!is_email_in_domain("bob@elsewhere.org", "example.com"));
        assert!(!is_email_in_domain(
            "ok@example.com, bad@elsewhere.org",
            "example.com"
        ));
    }

    #[test]
    fn test_site_domain_local_hosts() {
        assert!(is_email_in_site_domain("anyone@anywhere.org", "localhost"));
        assert!(is_email_in_site_domain("anyone@anywhere.org", ""));
        assert!(is_email_in_site_domain("anyone@anywhere.org", "127.0.0.1"));
        assert!(!is_email_in_site_domain("anyone@anywhere.org", "example.com"));
    }
}
