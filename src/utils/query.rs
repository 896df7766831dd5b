use crate::model::{FilterKey, Negation, Query};

/// Parses a raw input line into a structured [`Query`].
///
/// The line is split on unquoted whitespace, double quotes group words and a backslash escapes the next character.
/// Each token is then classified:
/// - `!expr` is a negated filter
/// - `key:value` is a structured filter (`name`, `id`, `ip`, `dns`, `state`, `type`, `az`, `tag`, `has`, `missing`),
///   unknown keys are ignored
/// - anything else is a fuzzy term
///
/// The parser is total, every input produces a query.
///
/// # Examples
///
/// ```rust
/// # use fleet_select::utils::parse_query;
/// let query = parse_query("web server state:running tag:Env=prod");
/// assert_eq!(query.terms, vec!["web", "server"]);
/// assert_eq!(query.state.as_deref(), Some("running"));
/// assert_eq!(query.tags.get("Env").map(String::as_str), Some("prod"));
///
/// assert!(parse_query("   ").is_empty());
/// ```
pub fn parse_query(raw: &str) -> Query {
    let mut query = Query {
        raw: raw.to_owned(),
        ..Default::default()
    };

    for token in tokenize(raw) {
        if let Some(negated) = token.strip_prefix('!') {
            if let Some(negation) = parse_negation(negated) {
                query.negations.push(negation);
            }
        } else if let Some((key, value)) = token.split_once(':') {
            apply_filter(&mut query, &key.to_ascii_lowercase(), value);
        } else {
            query.terms.push(token);
        }
    }

    query
}

/// Splits the line on unquoted whitespace, honouring double quotes and backslash escapes
fn tokenize(raw: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

/// Applies a positive `key:value` filter to the query
fn apply_filter(query: &mut Query, key: &str, value: &str) {
    if value.is_empty() {
        return;
    }
    let value = value.to_owned();
    match key {
        "name" => {
            query.filters.insert(FilterKey::Name, value);
        }
        "id" => {
            query.filters.insert(FilterKey::Id, value);
        }
        "ip" | "private-ip" | "public-ip" => query.ip_patterns.push(value),
        "dns" | "private-dns" | "public-dns" => query.dns_patterns.push(value),
        "state" => query.state = Some(value),
        "type" => query.instance_type = Some(value),
        "az" | "zone" => query.zone = Some(value),
        "tag" => match split_tag(&value) {
            (key, Some(value)) => {
                query.tags.insert(key, value);
            }
            (key, None) => {
                query.has_tags.insert(key);
            }
        },
        "has" => {
            query.has_tags.insert(value);
        }
        "missing" => {
            query.missing_tags.insert(value);
        }
        other => tracing::trace!("Ignoring unknown filter key: {other}"),
    }
}

/// Parses the expression following a `!`
fn parse_negation(expr: &str) -> Option<Negation> {
    if expr.is_empty() {
        return None;
    }
    let Some((key, value)) = expr.split_once(':') else {
        // `!Key=Value` is a shorthand for a negated tag constraint
        return Some(match split_tag(expr) {
            (key, Some(value)) => Negation::Tag { key, value: Some(value) },
            (_, None) => Negation::Term(expr.to_owned()),
        });
    };
    if value.is_empty() {
        return None;
    }
    let value = value.to_owned();
    Some(match key.to_ascii_lowercase().as_str() {
        "name" => Negation::Name(value),
        "id" => Negation::Id(value),
        "ip" | "private-ip" | "public-ip" => Negation::Ip(value),
        "dns" | "private-dns" | "public-dns" => Negation::Dns(value),
        "state" => Negation::State(value),
        "type" => Negation::Type(value),
        "az" | "zone" => Negation::Zone(value),
        "has" => Negation::Has(value),
        "missing" => Negation::Missing(value),
        "tag" => {
            let (key, value) = split_tag(&value);
            Negation::Tag { key, value }
        }
        _ => return None,
    })
}

/// Splits a `Key=Value` tag expression on its first `=`
fn split_tag(expr: &str) -> (String, Option<String>) {
    match expr.split_once('=') {
        Some((key, value)) if !key.is_empty() => (key.to_owned(), Some(value.to_owned())),
        _ => (expr.to_owned(), None),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_empty_input_is_neutral() {
        let query = parse_query("");
        assert!(query.is_empty());
        assert_eq!(query, Query::default());
    }

    #[test]
    fn test_terms_split_on_whitespace() {
        let query = parse_query("web server");
        assert_eq!(query.terms, vec!["web", "server"]);
        assert!(query.filters.is_empty());
        assert_eq!(query.raw, "web server");
    }

    #[test]
    fn test_quotes_and_escapes() {
        let query = parse_query(r#""web server" name:"api gw" back\ slash"#);
        assert_eq!(query.terms, vec!["web server", "back slash"]);
        assert_eq!(query.filters.get(&FilterKey::Name).map(String::as_str), Some("api gw"));
    }

    #[test]
    fn test_structured_filters() {
        let query = parse_query(
            "name:web id:i-123 private-ip:10.0.* dns:*.internal state:running type:t3.* zone:eu-west-1a Foo:bar",
        );
        assert_eq!(query.filters.get(&FilterKey::Name).map(String::as_str), Some("web"));
        assert_eq!(query.filters.get(&FilterKey::Id).map(String::as_str), Some("i-123"));
        assert_eq!(query.ip_patterns, vec!["10.0.*"]);
        assert_eq!(query.dns_patterns, vec!["*.internal"]);
        assert_eq!(query.state.as_deref(), Some("running"));
        assert_eq!(query.instance_type.as_deref(), Some("t3.*"));
        assert_eq!(query.zone.as_deref(), Some("eu-west-1a"));
        // Unknown keys are dropped
        assert!(query.terms.is_empty());
    }

    #[test]
    fn test_tag_filters() {
        let query = parse_query("tag:Env=prod tag:Owner has:Team missing:Backup tag:Url=a=b");
        assert_eq!(query.tags.get("Env").map(String::as_str), Some("prod"));
        assert_eq!(query.tags.get("Url").map(String::as_str), Some("a=b"));
        assert_eq!(
            query.has_tags,
            BTreeSet::from([String::from("Owner"), String::from("Team")])
        );
        assert_eq!(query.missing_tags, BTreeSet::from([String::from("Backup")]));
    }

    #[test]
    fn test_negations() {
        let query = parse_query("!Env=dev !state:stopped !tag:Team !bastion !unknown:x ! !name:");
        assert_eq!(
            query.negations,
            vec![
                Negation::Tag {
                    key: String::from("Env"),
                    value: Some(String::from("dev"))
                },
                Negation::State(String::from("stopped")),
                Negation::Tag {
                    key: String::from("Team"),
                    value: None
                },
                Negation::Term(String::from("bastion")),
            ]
        );
    }

    #[test]
    fn test_render_round_trip() {
        let raws = [
            "web server",
            "name:web state:running tag:Env=prod",
            r#""two words" !Env=dev !tag:Team ip:10.* dns:*.local type:t3.* az:a has:Owner missing:Backup"#,
            r#"name:"api gw" !name:legacy !bastion id:i-1 tag:"Cost Center=R&D""#,
            r#"quote\"d back\\slash"#,
        ];
        for raw in raws {
            let query = parse_query(raw);
            let rendered = query.to_string();
            assert_eq!(parse_query(&rendered), query, "rendered: {rendered}");
        }
    }

    #[test]
    fn test_digest_ignores_raw_text() {
        let a = parse_query("web   state:running");
        let b = parse_query("web state:running");
        let c = parse_query("web state:stopped");
        assert_eq!(a.digest(), b.digest());
        assert!(a.digest() != c.digest());
        assert_eq!(a.digest().len(), 64);
    }
}
