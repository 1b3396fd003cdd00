//! Borrowed service seams the map core depends on but does not own:
//! game configuration, the Doom64 texture hash table, and the UDMF text
//! parser. Callers inject concrete implementations; tests use the
//! defaults below.

use std::collections::HashMap;

/// Flags/specials/defaults a particular IWAD+port combination defines.
/// The default implementation is deliberately minimal: enough to drive
/// map I/O and sector-building defaults without pulling in a full game
/// definition language.
pub trait GameConfig {
    fn default_floor_texture(&self) -> &str {
        "-"
    }
    fn default_ceiling_texture(&self) -> &str {
        "-"
    }
    fn default_wall_texture(&self) -> &str {
        "-"
    }
    fn default_thing_type(&self) -> i32 {
        0
    }
    /// Boom generalized specials carry their own tag semantics; a config
    /// can report whether `special` is one, so `findUnusedLineId` and the
    /// tag queries can treat "every line" as taggable the way Boom does.
    fn is_boom_generalized(&self, _special: i32) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultGameConfig;

impl GameConfig for DefaultGameConfig {}

/// Doom64's sidedef/sector textures are stored as 16-bit hashes rather
/// than 8-byte names; a `ResourceManager` resolves them against the
/// IWAD's texture/palette lumps.
pub trait ResourceManager {
    fn texture_name_for_hash(&self, hash: u16) -> Option<&str>;
    fn hash_for_texture_name(&self, name: &str) -> Option<u16>;
}

#[derive(Debug, Clone, Default)]
pub struct TableResourceManager {
    by_hash: HashMap<u16, String>,
    by_name: HashMap<String, u16>,
}

impl TableResourceManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, hash: u16, name: impl Into<String>) {
        let name = name.into();
        self.by_name.insert(name.to_ascii_uppercase(), hash);
        self.by_hash.insert(hash, name);
    }
}

impl ResourceManager for TableResourceManager {
    fn texture_name_for_hash(&self, hash: u16) -> Option<&str> {
        self.by_hash.get(&hash).map(String::as_str)
    }

    fn hash_for_texture_name(&self, name: &str) -> Option<u16> {
        self.by_name.get(&name.to_ascii_uppercase()).copied()
    }
}

/// A single `key = value;` pair or nested block parsed from UDMF text.
#[derive(Debug, Clone, PartialEq)]
pub enum UdmfLiteral {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

#[derive(Debug, Clone, Default)]
pub struct UdmfBlock {
    pub kind: String,
    pub fields: Vec<(String, UdmfLiteral)>,
}

impl UdmfBlock {
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&UdmfLiteral> {
        self.fields.iter().find(|(k, _)| k.eq_ignore_ascii_case(key)).map(|(_, v)| v)
    }
}

/// Top-level parse result: the optional root `namespace="…";` assignment
/// plus every `kind { ... }` block in source order.
#[derive(Debug, Clone, Default)]
pub struct UdmfDocument {
    pub namespace: Option<String>,
    pub blocks: Vec<UdmfBlock>,
}

/// Injected so the map core stays decoupled from a concrete tokenizer;
/// `TextParser` is the UDMF grammar described alongside [`parse_udmf`].
pub trait TextParser {
    fn parse(&self, text: &str) -> Result<UdmfDocument, String>;
}

/// A small hand-rolled recursive-descent parser for the UDMF grammar:
/// `namespace=<string>;` at top level, then `kind { key = literal; ... }`
/// blocks, order-independent, keys case-insensitive.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdmfTextParser;

impl TextParser for UdmfTextParser {
    fn parse(&self, text: &str) -> Result<UdmfDocument, String> {
        parse_udmf(text)
    }
}

pub fn parse_udmf(text: &str) -> Result<UdmfDocument, String> {
    let mut tokens = Tokenizer::new(text);
    let mut doc = UdmfDocument::default();

    while let Some(ident) = tokens.next_ident()? {
        tokens.expect_one_of(&['=', '{'])?;
        match tokens.last_delim() {
            '=' => {
                let literal = tokens.parse_literal()?;
                tokens.expect_char(';')?;
                if ident.eq_ignore_ascii_case("namespace") {
                    if let UdmfLiteral::String(s) = literal {
                        doc.namespace = Some(s);
                    }
                }
            }
            '{' => {
                let mut block = UdmfBlock { kind: ident.to_ascii_lowercase(), fields: Vec::new() };
                loop {
                    tokens.skip_ws();
                    if tokens.peek_char() == Some('}') {
                        tokens.bump();
                        break;
                    }
                    let key = tokens.next_ident()?.ok_or("expected key inside block")?;
                    tokens.expect_char('=')?;
                    let value = tokens.parse_literal()?;
                    tokens.expect_char(';')?;
                    block.fields.push((key, value));
                }
                doc.blocks.push(block);
            }
            _ => unreachable!(),
        }
    }
    Ok(doc)
}

struct Tokenizer<'a> {
    bytes: &'a [u8],
    pos: usize,
    last_delim: char,
}

impl<'a> Tokenizer<'a> {
    fn new(text: &'a str) -> Self {
        Self { bytes: text.as_bytes(), pos: 0, last_delim: '\0' }
    }

    fn last_delim(&self) -> char {
        self.last_delim
    }

    fn peek_char(&self) -> Option<char> {
        self.bytes.get(self.pos).map(|&b| b as char)
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn skip_ws(&mut self) {
        while let Some(b) = self.bytes.get(self.pos) {
            if b.is_ascii_whitespace() {
                self.pos += 1;
            } else if *b == b'/' && self.bytes.get(self.pos + 1) == Some(&b'/') {
                while self.bytes.get(self.pos).is_some_and(|&b| b != b'\n') {
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    fn next_ident(&mut self) -> Result<Option<String>, String> {
        self.skip_ws();
        let start = self.pos;
        while self.bytes.get(self.pos).is_some_and(|&b| b.is_ascii_alphanumeric() || b == b'_') {
            self.pos += 1;
        }
        if self.pos == start {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned()))
    }

    fn expect_one_of(&mut self, options: &[char]) -> Result<(), String> {
        self.skip_ws();
        let c = self.peek_char().ok_or("unexpected end of input")?;
        if !options.contains(&c) {
            return Err(format!("expected one of {options:?}, found '{c}'"));
        }
        self.last_delim = c;
        self.bump();
        Ok(())
    }

    fn expect_char(&mut self, expected: char) -> Result<(), String> {
        self.skip_ws();
        let c = self.peek_char().ok_or("unexpected end of input")?;
        if c != expected {
            return Err(format!("expected '{expected}', found '{c}'"));
        }
        self.bump();
        Ok(())
    }

    fn parse_literal(&mut self) -> Result<UdmfLiteral, String> {
        self.skip_ws();
        match self.peek_char() {
            Some('"') => {
                self.bump();
                let start = self.pos;
                while self.bytes.get(self.pos).is_some_and(|&b| b != b'"') {
                    self.pos += 1;
                }
                let s = String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned();
                self.bump();
                Ok(UdmfLiteral::String(s))
            }
            Some(_) => {
                let start = self.pos;
                while self.bytes.get(self.pos).is_some_and(|&b| !b.is_ascii_whitespace() && b != b';') {
                    self.pos += 1;
                }
                let raw = std::str::from_utf8(&self.bytes[start..self.pos]).map_err(|e| e.to_string())?;
                if raw.eq_ignore_ascii_case("true") {
                    Ok(UdmfLiteral::Bool(true))
                } else if raw.eq_ignore_ascii_case("false") {
                    Ok(UdmfLiteral::Bool(false))
                } else if let Ok(i) = raw.parse::<i64>() {
                    Ok(UdmfLiteral::Int(i))
                } else if let Ok(f) = raw.parse::<f64>() {
                    Ok(UdmfLiteral::Float(f))
                } else {
                    Err(format!("unrecognized literal '{raw}'"))
                }
            }
            None => Err("unexpected end of input".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_namespace_and_vertex_block() {
        let doc = parse_udmf(r#"namespace="doom"; vertex { x = 32.0; y = -16; }"#).unwrap();
        assert_eq!(doc.namespace.as_deref(), Some("doom"));
        assert_eq!(doc.blocks.len(), 1);
        assert_eq!(doc.blocks[0].kind, "vertex");
        assert_eq!(doc.blocks[0].field("x"), Some(&UdmfLiteral::Float(32.0)));
        assert_eq!(doc.blocks[0].field("y"), Some(&UdmfLiteral::Int(-16)));
    }

    #[test]
    fn keys_are_case_insensitive_on_lookup() {
        let doc = parse_udmf("thing { TYPE = 1; }").unwrap();
        assert_eq!(doc.blocks[0].field("type"), Some(&UdmfLiteral::Int(1)));
    }

    #[test]
    fn resource_manager_round_trips_hash_and_name() {
        let mut rm = TableResourceManager::new();
        rm.insert(0x1234, "STARTAN3");
        assert_eq!(rm.texture_name_for_hash(0x1234), Some("STARTAN3"));
        assert_eq!(rm.hash_for_texture_name("startan3"), Some(0x1234));
    }
}
