//! Attribute extraction from opening tags.
//!
//! Values are read with a plain `name="value"` pattern. Escaped quotes and
//! values containing `>` are not supported: the opening tag ends at the
//! first `>` and a value ends at the first `"`.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

static ATTRIBUTE: OnceLock<Regex> = OnceLock::new();

fn attribute_pattern() -> &'static Regex {
    ATTRIBUTE.get_or_init(|| {
        Regex::new(r#"(?:^|\s)([A-Za-z_:][A-Za-z0-9_:.\-]*)\s*=\s*"([^"]*)""#)
            .expect("attribute pattern is a valid regex")
    })
}

/// Attributes of one opening tag. Names are matched case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    values: HashMap<String, String>,
}

impl Attributes {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// First present attribute among `names`.
    pub fn get_any(&self, names: &[&str]) -> Option<&str> {
        names.iter().find_map(|name| self.get(name))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Read every `name="value"` pair in `tag`. The first occurrence of a name wins.
pub fn parse_attributes(tag: &str) -> Attributes {
    let mut values = HashMap::new();
    for caps in attribute_pattern().captures_iter(tag) {
        let name = caps[1].to_ascii_lowercase();
        values.entry(name).or_insert_with(|| caps[2].to_string());
    }
    Attributes { values }
}
