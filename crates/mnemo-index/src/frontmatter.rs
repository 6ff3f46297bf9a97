//! Markdown front-matter handling.
//!
//! Front-matter is a YAML header between `---` delimiters at the top of a
//! file. Parsing is tolerant: a file without a header, or with a header
//! that fails to parse, is treated as all body.

use serde_json::Value;

/// A parsed Markdown document: front-matter as JSON plus the raw body.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDoc {
    /// Front-matter as a JSON object; empty object when absent.
    pub frontmatter: Value,

    /// Body text after the front-matter block.
    pub body: String,
}

/// Split content into front-matter and body.
///
/// Returns `(None, content)` when there is no valid `---` header.
pub fn split_frontmatter(content: &str) -> (Option<&str>, &str) {
    let trimmed = content.trim_start_matches('\u{feff}');
    if !trimmed.starts_with("---") {
        return (None, content);
    }

    let after_first = &trimmed[3..];
    let Some(close_pos) = after_first.find("\n---") else {
        return (None, content);
    };

    let header = &after_first[..close_pos];
    let rest = &after_first[close_pos + 4..];
    // The closing delimiter must end its line
    let body = match rest.find('\n') {
        Some(nl) if rest[..nl].trim().is_empty() => &rest[nl + 1..],
        None if rest.trim().is_empty() => "",
        _ => return (None, content),
    };

    (Some(header), body)
}

/// Parse a Markdown file into front-matter JSON and body.
pub fn parse(content: &str) -> ParsedDoc {
    let (header, body) = split_frontmatter(content);

    let frontmatter = header
        .and_then(|h| serde_yaml::from_str::<serde_yaml::Value>(h).ok())
        .map(yaml_to_json)
        .filter(Value::is_object)
        .unwrap_or_else(|| Value::Object(Default::default()));

    ParsedDoc {
        frontmatter,
        body: body.to_string(),
    }
}

/// Serialize front-matter and body back to file content.
pub fn serialize(frontmatter: &Value, body: &str) -> String {
    let yaml = serde_yaml::to_string(frontmatter).unwrap_or_else(|_| String::new());
    format!("---\n{}---\n{}", yaml, body)
}

/// Title for a document: front-matter `title`, or the file stem.
pub fn title_for(frontmatter: &Value, path: &std::path::Path) -> String {
    frontmatter
        .get("title")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default()
        })
}

/// Convert a YAML value to JSON, stringifying non-string mapping keys.
fn yaml_to_json(yaml: serde_yaml::Value) -> Value {
    match yaml {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(f) = n.as_f64() {
                serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            } else {
                Value::Null
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(seq) => {
            Value::Array(seq.into_iter().map(yaml_to_json).collect())
        }
        serde_yaml::Value::Mapping(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                let key = match k {
                    serde_yaml::Value::String(s) => s,
                    other => serde_yaml::to_string(&other)
                        .unwrap_or_default()
                        .trim()
                        .to_string(),
                };
                out.insert(key, yaml_to_json(v));
            }
            Value::Object(out)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::Path;

    #[test]
    fn test_parse_with_frontmatter() {
        let doc = parse("---\ntitle: Hello\ntags:\n  - a\n  - b\n---\nBody text.\n");
        assert_eq!(doc.frontmatter["title"], "Hello");
        assert_eq!(doc.frontmatter["tags"], json!(["a", "b"]));
        assert_eq!(doc.body, "Body text.\n");
    }

    #[test]
    fn test_parse_without_frontmatter() {
        let doc = parse("Just a plain file.\n");
        assert_eq!(doc.frontmatter, json!({}));
        assert_eq!(doc.body, "Just a plain file.\n");
    }

    #[test]
    fn test_parse_unclosed_header_is_body() {
        let content = "---\ntitle: Broken\nno closing delimiter";
        let doc = parse(content);
        assert_eq!(doc.frontmatter, json!({}));
        assert_eq!(doc.body, content);
    }

    #[test]
    fn test_parse_invalid_yaml_is_tolerated() {
        let doc = parse("---\n: : bad [yaml\n---\nStill a body.\n");
        assert_eq!(doc.frontmatter, json!({}));
        assert_eq!(doc.body, "Still a body.\n");
    }

    #[test]
    fn test_serialize_round_trip() {
        let fm = json!({"title": "Note", "half_life_days": 7});
        let content = serialize(&fm, "The body.\n");
        let doc = parse(&content);
        assert_eq!(doc.frontmatter["title"], "Note");
        assert_eq!(doc.frontmatter["half_life_days"], 7);
        assert_eq!(doc.body, "The body.\n");
    }

    #[test]
    fn test_title_for() {
        assert_eq!(
            title_for(&json!({"title": "Custom"}), Path::new("a/b.md")),
            "Custom"
        );
        assert_eq!(title_for(&json!({}), Path::new("a/project_a.md")), "project_a");
    }

    #[test]
    fn test_unknown_keys_pass_through() {
        let doc = parse("---\ntitle: T\ncustom_field: 42\nnested:\n  x: y\n---\n");
        assert_eq!(doc.frontmatter["custom_field"], 42);
        assert_eq!(doc.frontmatter["nested"]["x"], "y");
    }
}
