#![forbid(unsafe_code)]

use crate::strpool::StrHandle;
use std::ops::Range;

code_enum! {
    pub enum MacroKind {
        Text = 0,
        /// Hidden from the frontend, otherwise a plain text value.
        Secret = 1,
        /// Value is a `path:key` reference into the secret store.
        Vault = 2,
    }
}

/// Global (`hostid == 0`) or host-level user macro.
#[derive(Debug)]
pub struct UserMacro {
    pub macroid: u64,
    pub hostid: u64,
    /// Name without the `{$` `}` decoration, e.g. `DELAY`.
    pub name: StrHandle,
    pub context: StrHandle,
    pub value: StrHandle,
    pub kind: MacroKind,
    pub revision: u64,
}

impl UserMacro {
    pub(crate) fn new(macroid: u64) -> Self {
        Self {
            macroid,
            hostid: 0,
            name: StrHandle::unset(),
            context: StrHandle::unset(),
            value: StrHandle::unset(),
            kind: MacroKind::Text,
            revision: 0,
        }
    }

    pub fn is_global(&self) -> bool {
        self.hostid == 0
    }

    pub(crate) fn into_handles(self) -> [StrHandle; 3] {
        [self.name, self.context, self.value]
    }
}

/// Parsed `{$NAME}` or `{$NAME:context}` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroRef {
    pub name: String,
    pub context: Option<String>,
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' || c == '.'
}

/// Parse a macro reference at the start of `text`, returning it together
/// with the number of bytes it spans.
fn parse_at(text: &str) -> Option<(MacroRef, usize)> {
    let body = text.strip_prefix("{$")?;
    let name_len = body.find(|c: char| !is_name_char(c))?;
    if name_len == 0 {
        return None;
    }
    let name = body[..name_len].to_owned();
    let rest = &body[name_len..];

    if rest.starts_with('}') {
        return Some((MacroRef { name, context: None }, 2 + name_len + 1));
    }
    let rest = rest.strip_prefix(':')?;
    let context_start = 2 + name_len + 1;

    if let Some(quoted) = rest.strip_prefix('"') {
        let mut context = String::new();
        let mut chars = quoted.char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some((_, '"')) => context.push('"'),
                    Some((_, other)) => {
                        context.push('\\');
                        context.push(other);
                    }
                    None => return None,
                },
                '"' => {
                    let after = &quoted[i + 1..];
                    let trailing = after.len() - after.trim_start().len();
                    if !after.trim_start().starts_with('}') {
                        return None;
                    }
                    let len = context_start + 1 + i + 1 + trailing + 1;
                    return Some((
                        MacroRef {
                            name,
                            context: Some(context),
                        },
                        len,
                    ));
                }
                _ => context.push(c),
            }
        }
        return None;
    }

    let end = rest.find('}')?;
    let context = rest[..end].trim_start().to_owned();
    Some((
        MacroRef {
            name,
            context: Some(context),
        },
        context_start + end + 1,
    ))
}

/// Parse text that consists of exactly one macro reference.
pub fn parse_macro_name(text: &str) -> Option<MacroRef> {
    match parse_at(text) {
        Some((macro_ref, len)) if len == text.len() => Some(macro_ref),
        _ => None,
    }
}

/// All macro references in `text` with their byte ranges.
pub fn find_macros(text: &str) -> Vec<(Range<usize>, MacroRef)> {
    let mut found = Vec::new();
    let mut offset = 0;
    while let Some(pos) = text[offset..].find("{$") {
        let start = offset + pos;
        match parse_at(&text[start..]) {
            Some((macro_ref, len)) => {
                found.push((start..start + len, macro_ref));
                offset = start + len;
            }
            None => offset = start + 2,
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mref(name: &str, context: Option<&str>) -> MacroRef {
        MacroRef {
            name: name.to_owned(),
            context: context.map(str::to_owned),
        }
    }

    #[test]
    fn parses_plain_and_context_macros() {
        assert_eq!(parse_macro_name("{$DELAY}"), Some(mref("DELAY", None)));
        assert_eq!(
            parse_macro_name("{$DELAY:eth0}"),
            Some(mref("DELAY", Some("eth0")))
        );
        assert_eq!(
            parse_macro_name(r#"{$DELAY:"a \"b\" }"}"#),
            Some(mref("DELAY", Some(r#"a "b" }"#)))
        );
        assert_eq!(parse_macro_name("{$lower}"), None);
        assert_eq!(parse_macro_name("{$DELAY}s"), None);
        assert_eq!(parse_macro_name("{$}"), None);
    }

    #[test]
    fn finds_every_reference() {
        let text = "{$A};5s/1-5,09:00-18:00;{$B:\"x\"}{$";
        let found = find_macros(text);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0], (0..4, mref("A", None)));
        assert_eq!(&text[found[1].0.clone()], "{$B:\"x\"}");
        assert_eq!(found[1].1, mref("B", Some("x")));
    }
}
