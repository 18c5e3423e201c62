// Variable Expander
// Recursive ${NAME}, ${NAME:-default} and ${NAME:?message} substitution

use crate::variables::resolver::VariableLookup;
use crate::variables::DEFAULT_MAX_DEPTH;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpansionError {
    #[error("circular variable reference: {}", .chain.join(" -> "))]
    CircularReference { chain: Vec<String> },

    #[error("expanding '{name}' reached depth {depth}, above the limit of {limit}")]
    RecursionLimit {
        name: String,
        depth: usize,
        limit: usize,
    },

    #[error("required variable '{name}' is not set: {message}")]
    RequiredVariableMissing { name: String, message: String },
}

/// Parsed body of a `${...}` reference
#[derive(Debug, PartialEq, Eq)]
enum Reference<'a> {
    Simple(&'a str),
    Default(&'a str, &'a str),
    Required(&'a str, &'a str),
}

impl<'a> Reference<'a> {
    /// None for anything that is not a well-formed reference body
    fn parse(body: &'a str) -> Option<Self> {
        let name_len = body
            .char_indices()
            .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
            .map(|(i, _)| i)
            .unwrap_or(body.len());
        let (name, rest) = body.split_at(name_len);

        if !name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
            return None;
        }

        if rest.is_empty() {
            Some(Reference::Simple(name))
        } else if let Some(default) = rest.strip_prefix(":-") {
            Some(Reference::Default(name, default))
        } else {
            rest.strip_prefix(":?")
                .map(|message| Reference::Required(name, message))
        }
    }

    fn name(&self) -> &'a str {
        match self {
            Reference::Simple(name) | Reference::Default(name, _) | Reference::Required(name, _) => {
                name
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableExpander {
    max_depth: usize,
}

impl Default for VariableExpander {
    fn default() -> Self {
        Self::new()
    }
}

impl VariableExpander {
    pub fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Whether `text` holds an unescaped `${`
    pub fn contains_references(text: &str) -> bool {
        let bytes = text.as_bytes();
        (0..bytes.len().saturating_sub(1))
            .any(|i| bytes[i] == b'$' && bytes[i + 1] == b'{' && (i == 0 || bytes[i - 1] != b'\\'))
    }

    /// Expand every reference in `text`
    ///
    /// Unset simple references and malformed references are left as written.
    /// `\${...}` is emitted as a literal `${...}`.
    pub fn expand(&self, text: &str, vars: &dyn VariableLookup) -> Result<String, ExpansionError> {
        let mut chain = Vec::new();
        self.expand_at(text, vars, &mut chain, 0)
    }

    /// Expand every value of a map, keeping its keys
    pub fn expand_map<'m, I>(
        &self,
        entries: I,
        vars: &dyn VariableLookup,
    ) -> Result<std::collections::BTreeMap<String, String>, ExpansionError>
    where
        I: IntoIterator<Item = (&'m String, &'m String)>,
    {
        entries
            .into_iter()
            .map(|(key, value)| Ok((key.clone(), self.expand(value, vars)?)))
            .collect()
    }

    fn expand_at(
        &self,
        text: &str,
        vars: &dyn VariableLookup,
        chain: &mut Vec<String>,
        depth: usize,
    ) -> Result<String, ExpansionError> {
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::with_capacity(text.len());
        let mut i = 0;

        while i < chars.len() {
            if chars[i] == '\\' && opens_reference(&chars, i + 1) {
                if let Some(end) = closing_brace(&chars, i + 3) {
                    out.extend(&chars[i + 1..=end]);
                    i = end + 1;
                    continue;
                }
            }

            if opens_reference(&chars, i) {
                if let Some(end) = closing_brace(&chars, i + 2) {
                    let body: String = chars[i + 2..end].iter().collect();
                    match Reference::parse(&body) {
                        Some(reference) => {
                            let raw: String = chars[i..=end].iter().collect();
                            let value = self.substitute(&reference, &raw, vars, chain, depth)?;
                            out.push_str(&value);
                        }
                        None => out.extend(&chars[i..=end]),
                    }
                    i = end + 1;
                    continue;
                }
            }

            out.push(chars[i]);
            i += 1;
        }

        Ok(out)
    }

    fn substitute(
        &self,
        reference: &Reference<'_>,
        raw: &str,
        vars: &dyn VariableLookup,
        chain: &mut Vec<String>,
        depth: usize,
    ) -> Result<String, ExpansionError> {
        let name = reference.name();

        if chain.iter().any(|seen| seen == name) {
            let mut cycle = chain.clone();
            cycle.push(name.to_string());
            return Err(ExpansionError::CircularReference { chain: cycle });
        }

        let value = vars.lookup(name);
        let resolved = match reference {
            Reference::Simple(_) => match value {
                Some(value) => value,
                None => return Ok(raw.to_string()),
            },
            Reference::Default(_, default) => match value.filter(|v| !v.is_empty()) {
                Some(value) => value,
                None => default.to_string(),
            },
            Reference::Required(_, message) => match value.filter(|v| !v.is_empty()) {
                Some(value) => value,
                None => {
                    let message = if message.is_empty() {
                        "parameter null or not set".to_string()
                    } else {
                        message.to_string()
                    };
                    return Err(ExpansionError::RequiredVariableMissing {
                        name: name.to_string(),
                        message,
                    });
                }
            },
        };

        // escaped references still need their backslash stripped
        if !resolved.contains("${") {
            return Ok(resolved);
        }

        let next = depth + 1;
        if next > self.max_depth && Self::contains_references(&resolved) {
            return Err(ExpansionError::RecursionLimit {
                name: name.to_string(),
                depth: next,
                limit: self.max_depth,
            });
        }

        chain.push(name.to_string());
        let expanded = self.expand_at(&resolved, vars, chain, next);
        chain.pop();
        expanded
    }
}

fn opens_reference(chars: &[char], at: usize) -> bool {
    chars.get(at) == Some(&'$') && chars.get(at + 1) == Some(&'{')
}

/// Index of the brace closing a reference whose body starts at `start`
fn closing_brace(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 1usize;
    for (offset, c) in chars.iter().enumerate().skip(start) {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(offset);
                }
            }
            _ => {}
        }
    }
    None
}
