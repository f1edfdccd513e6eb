//! URI template matching for resource templates.
//!
//! Supports the two RFC 6570 forms that resource templates use in
//! practice: simple expansion `{var}`, which never spans a `/`, and
//! reserved expansion `{+var}`, which may. Matching is anchored at both
//! ends and returns the captured variables.

use std::collections::HashMap;

use mcpkit_core::error::McpError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Var { name: String, reserved: bool },
}

/// A parsed URI template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriTemplate {
    source: String,
    parts: Vec<Part>,
}

impl UriTemplate {
    /// Parse a template.
    ///
    /// Fails on unbalanced braces, empty or unsupported expressions, and on
    /// two variables with no literal between them.
    pub fn parse(source: &str) -> Result<Self, McpError> {
        let invalid = |reason: &str| {
            McpError::invalid_params(
                "resources/templates",
                format!("invalid URI template {source:?}: {reason}"),
            )
        };

        let mut parts = Vec::new();
        let mut rest = source;
        while !rest.is_empty() {
            match rest.find('{') {
                Some(0) => {
                    let end = rest.find('}').ok_or_else(|| invalid("unclosed '{'"))?;
                    let expr = &rest[1..end];
                    let (name, reserved) = match expr.strip_prefix('+') {
                        Some(name) => (name, true),
                        None => (expr, false),
                    };
                    if name.is_empty() {
                        return Err(invalid("empty expression"));
                    }
                    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.') {
                        return Err(invalid("unsupported expression"));
                    }
                    if matches!(parts.last(), Some(Part::Var { .. })) {
                        return Err(invalid("adjacent variables"));
                    }
                    parts.push(Part::Var {
                        name: name.to_string(),
                        reserved,
                    });
                    rest = &rest[end + 1..];
                }
                found => {
                    let end = found.unwrap_or(rest.len());
                    let literal = &rest[..end];
                    if literal.contains('}') {
                        return Err(invalid("unmatched '}'"));
                    }
                    parts.push(Part::Literal(literal.to_string()));
                    rest = &rest[end..];
                }
            }
        }

        Ok(Self {
            source: source.to_string(),
            parts,
        })
    }

    /// The template text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match `uri` against the template, returning the variable bindings.
    #[must_use]
    pub fn matches(&self, uri: &str) -> Option<HashMap<String, String>> {
        let mut vars = HashMap::new();
        match_parts(&self.parts, uri, &mut vars).then_some(vars)
    }
}

fn match_parts(parts: &[Part], input: &str, vars: &mut HashMap<String, String>) -> bool {
    let Some((first, rest)) = parts.split_first() else {
        return input.is_empty();
    };
    match first {
        Part::Literal(literal) => input
            .strip_prefix(literal.as_str())
            .is_some_and(|remaining| match_parts(rest, remaining, vars)),
        Part::Var { name, reserved } => {
            // Try the longest capture first; a variable never matches empty.
            let limit = if *reserved {
                input.len()
            } else {
                input.find('/').unwrap_or(input.len())
            };
            for end in (1..=limit).rev() {
                if !input.is_char_boundary(end) {
                    continue;
                }
                if match_parts(rest, &input[end..], vars) {
                    vars.insert(name.clone(), input[..end].to_string());
                    return true;
                }
            }
            false
        }
    }
}
