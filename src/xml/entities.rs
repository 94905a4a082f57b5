//! Entity references: character references, the predefined entities and
//! general entities declared in the internal DTD subset.

use memchr::memchr;
use quick_xml::escape::resolve_predefined_entity;

use crate::{Error, FastHashMap, Result};

/// Upper bound for expanded entity values.
const MAX_ENTITY_LEN: usize = 1 << 20;

/// Internal general entities: name → replacement text.
pub(super) type EntityMap = FastHashMap<String, String>;

/// Extracts `<!ENTITY name "value">` declarations from the content of a
/// DOCTYPE event. External and parameter entities are skipped.
///
/// Values are expanded at declaration time, so later entities may refer to
/// earlier ones.
pub(super) fn parse_internal_entities(doctype: &str, map: &mut EntityMap) -> Result<()> {
    let Some(open) = doctype.find('[') else {
        return Ok(());
    };
    let subset = &doctype[open + 1..];
    let subset = &subset[..subset.rfind(']').unwrap_or(subset.len())];

    let mut rest = subset;
    while let Some(offset) = rest.find("<!ENTITY") {
        let decl = rest[offset + "<!ENTITY".len()..].trim_start();
        let Some(end) = find_decl_end(decl) else {
            break;
        };
        rest = &decl[end..];
        let body = &decl[..end];
        if body.starts_with('%') {
            continue;
        }
        let name_end = body.find(char::is_whitespace).unwrap_or(body.len());
        let (name, def) = body.split_at(name_end);
        let def = def.trim_start();
        let Some(quote) = def.chars().next().filter(|c| matches!(c, '"' | '\'')) else {
            // SYSTEM/PUBLIC: externe Entity, nicht aufgelöst
            continue;
        };
        let Some(close) = def[1..].find(quote) else {
            continue;
        };
        let value = expand(&def[1..1 + close], map)?;
        // XML 1.0 4.2: die erste Deklaration gilt
        map.entry(name.to_string()).or_insert(value);
    }
    Ok(())
}

/// End of a declaration body: the `>` outside quotes.
fn find_decl_end(decl: &str) -> Option<usize> {
    let mut quote = None;
    for (i, c) in decl.char_indices() {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, '>') => return Some(i),
            _ => {}
        }
    }
    None
}

/// Replacement text of `&name;` (without `&` and `;`).
pub(super) fn resolve(name: &str, map: &EntityMap) -> Result<String> {
    if name.starts_with('#') {
        return resolve_char_reference(name)
            .map(String::from)
            .ok_or_else(|| Error::XmlParseError(format!("invalid character reference &{name};")));
    }
    if let Some(s) = resolve_predefined_entity(name) {
        return Ok(s.to_string());
    }
    map.get(name).cloned().ok_or_else(|| Error::XmlParseError(format!("undeclared entity &{name};")))
}

/// Expands every reference in `value`.
pub(super) fn expand(value: &str, map: &EntityMap) -> Result<String> {
    let bytes = value.as_bytes();
    let mut out = String::with_capacity(value.len());
    let mut pos = 0;
    while let Some(rel) = memchr(b'&', &bytes[pos..]) {
        let amp = pos + rel;
        out.push_str(&value[pos..amp]);
        let Some(semi) = memchr(b';', &bytes[amp..]) else {
            return Err(Error::XmlParseError(format!("unterminated entity reference in \"{value}\"")));
        };
        out.push_str(&resolve(&value[amp + 1..amp + semi], map)?);
        if out.len() > MAX_ENTITY_LEN {
            return Err(Error::XmlParseError("entity expansion too large".into()));
        }
        pos = amp + semi + 1;
    }
    out.push_str(&value[pos..]);
    Ok(out)
}

/// `#123` or `#x7B` to the referenced character.
fn resolve_char_reference(name: &str) -> Option<char> {
    let num = name.strip_prefix('#')?;
    let code = match num.strip_prefix('x') {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => num.parse().ok()?,
    };
    char::from_u32(code).filter(|&c| c != '\0')
}
