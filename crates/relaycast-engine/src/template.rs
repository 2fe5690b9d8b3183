//! Template renderer — pure placeholder substitution, no I/O.
//!
//! `{placeholder}` tokens are matched case-insensitively against the
//! variable map. Unresolved tokens are left verbatim so missing data
//! degrades gracefully instead of aborting a dispatch pass.

use std::collections::HashMap;

use relaycast_core::config::LinksConfig;
use relaycast_ledger::DispatchUnit;

/// Substitute `{name}` tokens in `template` with values from `variables`.
/// Total: never fails, never drops input text.
pub fn render(template: &str, variables: &HashMap<String, String>) -> String {
    // Lowercased lookup keys make the match case-insensitive.
    let lookup: HashMap<String, &str> = variables
        .iter()
        .map(|(k, v)| (k.to_lowercase(), v.as_str()))
        .collect();

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let token = &after[..close];
                match lookup.get(token.to_lowercase().as_str()) {
                    Some(value) => out.push_str(value),
                    // Unknown placeholder: keep it verbatim.
                    None => {
                        out.push('{');
                        out.push_str(token);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            // Unclosed brace: keep the tail as-is.
            None => {
                out.push('{');
                out.push_str(after);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Build the variable map for one dispatch unit: recipient name parts,
/// the resolved confirmation link, then per-recipient variables (which may
/// override the built-ins).
pub fn unit_variables(unit: &DispatchUnit, links: &LinksConfig) -> HashMap<String, String> {
    let mut vars = name_variables(&unit.name);
    vars.insert(
        "confirm_link".into(),
        resolve_link(links, unit.link_token.as_deref()),
    );
    for (key, value) in &unit.variables {
        vars.insert(key.clone(), value.clone());
    }
    vars
}

fn name_variables(full_name: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    let trimmed = full_name.trim();
    vars.insert("name".into(), trimmed.to_string());
    let mut parts = trimmed.split_whitespace();
    vars.insert("first_name".into(), parts.next().unwrap_or("").to_string());
    vars.insert("last_name".into(), parts.next_back().unwrap_or("").to_string());
    vars
}

/// Resolve the recipient's confirmation link. Without a secret token the
/// configured fallback URL is substituted — never a broken link.
pub fn resolve_link(links: &LinksConfig, token: Option<&str>) -> String {
    match token {
        Some(token) if !token.is_empty() => {
            format!("{}/c/{}", links.base_url.trim_end_matches('/'), token)
        }
        _ => links.fallback_url.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_render_is_total() {
        // Missing variable: token stays verbatim, nothing throws.
        let out = render("Hi {nome}, see {link_rsvp}", &vars(&[("nome", "Ana")]));
        assert_eq!(out, "Hi Ana, see {link_rsvp}");
    }

    #[test]
    fn test_render_case_insensitive() {
        let out = render("Hello {First_Name} {LAST_NAME}", &vars(&[
            ("first_name", "Ana"),
            ("last_name", "Souza"),
        ]));
        assert_eq!(out, "Hello Ana Souza");
    }

    #[test]
    fn test_render_unclosed_brace_kept() {
        let out = render("Hi {name", &vars(&[("name", "Ana")]));
        assert_eq!(out, "Hi {name");
    }

    #[test]
    fn test_render_repeated_tokens() {
        let out = render("{x} and {x} and {y}", &vars(&[("x", "1")]));
        assert_eq!(out, "1 and 1 and {y}");
    }

    #[test]
    fn test_name_parts() {
        let vars = name_variables("Ana Clara Souza");
        assert_eq!(vars["name"], "Ana Clara Souza");
        assert_eq!(vars["first_name"], "Ana");
        assert_eq!(vars["last_name"], "Souza");

        let single = name_variables("Ana");
        assert_eq!(single["first_name"], "Ana");
        assert_eq!(single["last_name"], "Ana");
    }

    #[test]
    fn test_resolve_link_token_and_fallback() {
        let links = LinksConfig {
            base_url: "https://ev.example.com/".into(),
            fallback_url: "https://ev.example.com/rsvp".into(),
        };
        assert_eq!(resolve_link(&links, Some("s3cret")), "https://ev.example.com/c/s3cret");
        assert_eq!(resolve_link(&links, None), "https://ev.example.com/rsvp");
        assert_eq!(resolve_link(&links, Some("")), "https://ev.example.com/rsvp");
    }

    #[test]
    fn test_recipient_variables_override_builtins() {
        let unit = DispatchUnit {
            recipient_id: "r1".into(),
            channel: relaycast_core::types::ChannelKind::Chat,
            address: "+55".into(),
            name: "Ana Souza".into(),
            variables: vars(&[("event_title", "Launch"), ("first_name", "Aninha")]),
            link_token: None,
        };
        let links = LinksConfig::default();
        let map = unit_variables(&unit, &links);
        assert_eq!(map["event_title"], "Launch");
        assert_eq!(map["first_name"], "Aninha");
        assert!(map.contains_key("confirm_link"));
    }
}
