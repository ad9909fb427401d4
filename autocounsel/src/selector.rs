use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Represents ways to locate a UI element
///
/// Inside a [`Selector::Chain`], `Has`, `Visible` and `Nth` narrow the current
/// matches; every other variant searches the descendants of the current matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Selector {
    /// Select by ARIA role and optional accessible name
    Role { role: String, name: Option<String> },
    /// Select by DOM id
    Id(String),
    /// Select by the `name` attribute
    Name(String),
    /// Select by text content, either a substring or the whole trimmed text
    Text { text: String, exact: bool },
    /// Raw CSS selector
    Css(String),
    /// Select by multiple attributes (key-value pairs)
    Attributes(BTreeMap<String, String>),
    /// Keep matches that have at least one descendant matching the inner selector
    Has(Box<Selector>),
    /// Filter by visibility on screen
    Visible(bool),
    /// Select the n-th element from the matches
    Nth(i32),
    /// Chain multiple selectors
    Chain(Vec<Selector>),
    /// Represents an invalid selector string, with a reason.
    Invalid(String),
}

impl Selector {
    pub fn css(css: impl Into<String>) -> Self {
        Selector::Css(css.into())
    }

    pub fn text(text: impl Into<String>) -> Self {
        Selector::Text {
            text: text.into(),
            exact: false,
        }
    }

    pub fn exact_text(text: impl Into<String>) -> Self {
        Selector::Text {
            text: text.into(),
            exact: true,
        }
    }

    pub fn role(role: impl Into<String>, name: Option<&str>) -> Self {
        Selector::Role {
            role: role.into(),
            name: name.map(str::to_string),
        }
    }

    /// Narrow this selector to matches containing `text` somewhere inside them.
    pub fn has_text(self, text: impl Into<String>) -> Self {
        self.then(Selector::Has(Box::new(Selector::text(text))))
    }

    /// Append a selector, flattening chains on both sides.
    pub fn then(self, next: Selector) -> Self {
        let mut chain = match self {
            Selector::Chain(parts) => parts,
            s => vec![s],
        };
        match next {
            Selector::Chain(mut parts) => chain.append(&mut parts),
            s => chain.push(s),
        }
        Selector::Chain(chain)
    }

    /// Returns the first invalid part of this selector, if any.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Selector::Invalid(reason) => Err(reason.clone()),
            Selector::Has(inner) => inner.validate(),
            Selector::Chain(parts) => {
                if parts.is_empty() {
                    return Err("empty selector chain".to_string());
                }
                parts.iter().try_for_each(Selector::validate)
            }
            Selector::Attributes(attrs) if attrs.is_empty() => {
                Err("attribute selector without attributes".to_string())
            }
            _ => Ok(()),
        }
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selector::Role { role, name: None } => write!(f, "role:{role}"),
            Selector::Role {
                role,
                name: Some(name),
            } => write!(f, "role:{role}|name:{name}"),
            Selector::Id(id) => write!(f, "#{id}"),
            Selector::Name(name) => write!(f, "name:{name}"),
            Selector::Text { text, exact: false } => write!(f, "text:{text}"),
            Selector::Text { text, exact: true } => write!(f, "text={text}"),
            Selector::Css(css) => write!(f, "css:{css}"),
            Selector::Attributes(attrs) => {
                let pairs: Vec<String> = attrs.iter().map(|(k, v)| format!("{k}={v}")).collect();
                write!(f, "attr:{}", pairs.join(","))
            }
            Selector::Has(inner) => write!(f, "has:{inner}"),
            Selector::Visible(v) => write!(f, "visible:{v}"),
            Selector::Nth(n) => write!(f, "nth:{n}"),
            Selector::Chain(parts) => {
                let parts: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
                write!(f, "{}", parts.join(" >> "))
            }
            Selector::Invalid(reason) => write!(f, "invalid({reason})"),
        }
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        let s = s.trim();

        // Handle chained selectors first
        let parts: Vec<&str> = s.split(">>").map(|p| p.trim()).collect();
        if parts.len() > 1 {
            return Selector::Chain(parts.into_iter().map(Selector::from).collect());
        }

        // role:abcd|name:abcd is the precise form for accessible controls
        if s.starts_with("role:") && s.contains('|') {
            let (role_part, name_part) = s.split_once('|').unwrap_or((s, ""));
            let role = role_part.trim()["role:".len()..].trim().to_string();
            let name = name_part.trim();
            let name = name.strip_prefix("name:").unwrap_or(name).to_string();
            return Selector::Role {
                role,
                name: Some(name),
            };
        }

        let lower = s.to_lowercase();
        match s {
            _ if lower.starts_with("role:") => Selector::Role {
                role: s[5..].trim().to_string(),
                name: None,
            },
            _ if lower.starts_with("name:") => Selector::Name(s[5..].to_string()),
            _ if lower.starts_with("id:") => Selector::Id(s[3..].to_string()),
            _ if lower.starts_with("text=") => Selector::exact_text(&s[5..]),
            _ if lower.starts_with("text:") => Selector::text(&s[5..]),
            _ if lower.starts_with("css:") => Selector::Css(s[4..].trim().to_string()),
            _ if lower.starts_with("attr:") => parse_attributes(&s[5..]),
            _ if lower.starts_with("visible:") => {
                let value = s[8..].trim().to_lowercase();
                Selector::Visible(value == "true")
            }
            _ if lower.starts_with("has:") => Selector::Has(Box::new(Selector::from(&s[4..]))),
            _ if lower.starts_with("nth=") || lower.starts_with("nth:") => {
                let index_str = s[4..].trim();
                match index_str.parse::<i32>() {
                    Ok(index) => Selector::Nth(index),
                    Err(_) => {
                        Selector::Invalid(format!("Invalid index for nth selector: '{index_str}'"))
                    }
                }
            }
            _ if s.starts_with('#') && s.len() > 1 => Selector::Id(s[1..].to_string()),
            _ => Selector::Invalid(format!(
                "Unknown selector format: \"{s}\". Use prefixes like 'role:', 'name:', 'id:', 'text:', 'text=', 'css:', 'attr:', 'has:' or 'nth:' to specify the selector type."
            )),
        }
    }
}

impl From<String> for Selector {
    fn from(s: String) -> Self {
        Selector::from(s.as_str())
    }
}

fn parse_attributes(spec: &str) -> Selector {
    let mut attrs = BTreeMap::new();
    for pair in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                attrs.insert(
                    key.trim().to_string(),
                    value.trim().trim_matches('\'').to_string(),
                );
            }
            _ => return Selector::Invalid(format!("Invalid attribute pair: '{pair}'")),
        }
    }
    if attrs.is_empty() {
        return Selector::Invalid("attr: selector needs at least one key=value pair".to_string());
    }
    Selector::Attributes(attrs)
}
