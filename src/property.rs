//! Dynamic property value and ordered property list (§3 Property/PropertyList).
//!
//! Grounded on `Utility/Property.cpp` and `Utility/PropertyList.cpp`: a
//! tagged union with total, documented coercions between variants, and a
//! small-vector-backed ordered list with case-insensitive, first-wins
//! lookup (mirrors the teacher's preference for small ad hoc containers over
//! a hash map at typical sizes — see `collection::core` usage of plain
//! `Vec`-backed structures for low cardinality data).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Property {
    Bool(bool),
    Int(i32),
    UInt(u32),
    Float(f64),
    String(String),
}

impl Default for Property {
    fn default() -> Self {
        Self::Bool(false)
    }
}

fn str_as_bool(s: &str) -> bool {
    matches!(s.trim(), "true" | "1" | "yes")
}

impl Property {
    #[must_use]
    pub fn as_bool(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::UInt(u) => *u != 0,
            Self::Float(f) => *f != 0.0,
            Self::String(s) => str_as_bool(s),
        }
    }

    #[must_use]
    pub fn as_int(&self) -> i32 {
        match self {
            Self::Bool(b) => i32::from(*b),
            #[allow(clippy::cast_possible_wrap)]
            Self::Int(i) => *i,
            #[allow(clippy::cast_possible_wrap)]
            Self::UInt(u) => *u as i32,
            #[allow(clippy::cast_possible_truncation)]
            Self::Float(f) => *f as i32,
            Self::String(s) => s.trim().parse().unwrap_or(0),
        }
    }

    #[must_use]
    pub fn as_uint(&self) -> u32 {
        match self {
            Self::Bool(b) => u32::from(*b),
            #[allow(clippy::cast_sign_loss)]
            Self::Int(i) => *i as u32,
            Self::UInt(u) => *u,
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            Self::Float(f) => *f as u32,
            Self::String(s) => s.trim().parse().unwrap_or(0),
        }
    }

    #[must_use]
    pub fn as_float(&self) -> f64 {
        match self {
            Self::Bool(b) => f64::from(*b),
            Self::Int(i) => f64::from(*i),
            Self::UInt(u) => f64::from(*u),
            Self::Float(f) => *f,
            Self::String(s) => s.trim().parse().unwrap_or(0.0),
        }
    }

    /// String rendering; `float_precision <= 0` uses the shortest round-trip
    /// representation, otherwise fixed decimal places.
    #[must_use]
    pub fn as_string(&self, float_precision: i32) -> String {
        match self {
            Self::Bool(b) => (if *b { "true" } else { "false" }).to_string(),
            Self::Int(i) => i.to_string(),
            Self::UInt(u) => u.to_string(),
            Self::Float(f) => {
                if float_precision <= 0 {
                    format!("{f}")
                } else {
                    format!("{:.*}", float_precision as usize, f)
                }
            }
            Self::String(s) => s.clone(),
        }
    }

    #[must_use]
    pub const fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }
}

impl From<bool> for Property {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}
impl From<i32> for Property {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}
impl From<u32> for Property {
    fn from(v: u32) -> Self {
        Self::UInt(v)
    }
}
impl From<f64> for Property {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}
impl From<&str> for Property {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}
impl From<String> for Property {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct NamedProperty {
    name: String,
    value: Property,
}

/// Ordered list of (name, Property) pairs, case-insensitive on name, with
/// first-wins lookup semantics (matches `PropertyList::operator[]` and
/// `PropertyList::getIf`, which scan front-to-back and return on first hit).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertyList {
    properties: Vec<NamedProperty>,
}

impl PropertyList {
    #[must_use]
    pub const fn new() -> Self {
        Self { properties: Vec::new() }
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.properties.iter().any(|p| p.name.eq_ignore_ascii_case(key))
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name.eq_ignore_ascii_case(key)).map(|p| &p.value)
    }

    /// Creates the property (as default) if absent, then returns a mutable
    /// reference — mirrors the original's `operator[]`.
    pub fn get_or_insert(&mut self, key: &str) -> &mut Property {
        if let Some(idx) = self.properties.iter().position(|p| p.name.eq_ignore_ascii_case(key)) {
            return &mut self.properties[idx].value;
        }
        self.properties.push(NamedProperty { name: key.to_string(), value: Property::default() });
        &mut self.properties.last_mut().expect("just pushed").value
    }

    pub fn set(&mut self, key: &str, value: impl Into<Property>) {
        *self.get_or_insert(key) = value.into();
    }

    /// Removes the first property named `key`. Returns true if one was removed.
    pub fn remove(&mut self, key: &str) -> bool {
        if let Some(idx) = self.properties.iter().position(|p| p.name.eq_ignore_ascii_case(key)) {
            self.properties.remove(idx);
            true
        } else {
            false
        }
    }

    pub fn clear(&mut self) {
        self.properties.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|p| p.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Property)> {
        self.properties.iter().map(|p| (p.name.as_str(), &p.value))
    }

    /// Renders as a JSON object, for tooling that wants to inspect an
    /// entry's ex-props or a map object's extra UDMF fields outside the
    /// text-based UDMF/`toString` representations above.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(self.properties.iter().map(|p| (p.name.clone(), serde_json::to_value(&p.value).unwrap_or(serde_json::Value::Null))).collect())
    }

    /// Serializes as `key = value;` lines; string values are quoted and
    /// backslash/quote-escaped (matches `PropertyList::toString`).
    #[must_use]
    pub fn to_string_repr(&self, condensed: bool, float_precision: i32) -> String {
        let mut out = String::new();
        for p in &self.properties {
            let mut val = p.value.as_string(float_precision);
            if p.value.is_string() {
                val = escape_string(&val);
                val = format!("\"{val}\"");
            }
            if condensed {
                out.push_str(&format!("{}={};\n", p.name, val));
            } else {
                out.push_str(&format!("{} = {};\n", p.name, val));
            }
        }
        out
    }
}

fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_wins_lookup_is_case_insensitive() {
        let mut list = PropertyList::new();
        list.set("Name", "a");
        list.set("name", "b");
        assert_eq!(list.len(), 1);
        assert_eq!(list.get("NAME").unwrap().as_string(0), "b");
    }

    #[test]
    fn coercions_are_total() {
        let p = Property::Float(3.7);
        assert_eq!(p.as_int(), 3);
        assert!(p.as_bool());
        assert_eq!(Property::String("false".into()).as_bool(), false);
        assert_eq!(Property::String("12".into()).as_int(), 12);
    }

    #[test]
    fn float_precision_controls_string_rendering() {
        let p = Property::Float(1.0 / 3.0);
        assert_eq!(p.as_string(3), "0.333");
    }

    #[test]
    fn serialize_quotes_and_escapes_strings() {
        let mut list = PropertyList::new();
        list.set("tex", "AST\"OFF");
        let rendered = list.to_string_repr(false, 3);
        assert_eq!(rendered, "tex = \"AST\\\"OFF\";\n");
    }

    #[test]
    fn to_json_renders_an_object_keyed_by_name() {
        let mut list = PropertyList::new();
        list.set("id", 7_i32);
        let json = list.to_json();
        assert_eq!(json["id"]["Int"], 7);
    }

    #[test]
    fn remove_and_contains() {
        let mut list = PropertyList::new();
        list.set("a", 1_i32);
        assert!(list.contains("A"));
        assert!(list.remove("a"));
        assert!(!list.contains("a"));
        assert!(!list.remove("a"));
    }
}
