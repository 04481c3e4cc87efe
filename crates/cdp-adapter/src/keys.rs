//! Parsing of key combinations such as `Enter`, `Control+a` or
//! `Shift+Tab Enter` into DevTools key events.

use crate::errors::{AdapterError, AdapterErrorKind};

pub const MOD_ALT: i64 = 1;
pub const MOD_CTRL: i64 = 2;
pub const MOD_META: i64 = 4;
pub const MOD_SHIFT: i64 = 8;

/// One key press with its held modifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyChord {
    pub key: String,
    pub code: String,
    pub virtual_key: i64,
    /// Text the press inserts, if any.
    pub text: Option<String>,
    pub modifiers: i64,
}

struct NamedKey {
    names: &'static [&'static str],
    key: &'static str,
    code: &'static str,
    virtual_key: i64,
    text: Option<&'static str>,
}

const NAMED_KEYS: &[NamedKey] = &[
    NamedKey { names: &["enter", "return"], key: "Enter", code: "Enter", virtual_key: 13, text: Some("\r") },
    NamedKey { names: &["tab"], key: "Tab", code: "Tab", virtual_key: 9, text: None },
    NamedKey { names: &["escape", "esc"], key: "Escape", code: "Escape", virtual_key: 27, text: None },
    NamedKey { names: &["backspace"], key: "Backspace", code: "Backspace", virtual_key: 8, text: None },
    NamedKey { names: &["delete", "del"], key: "Delete", code: "Delete", virtual_key: 46, text: None },
    NamedKey { names: &["space"], key: " ", code: "Space", virtual_key: 32, text: Some(" ") },
    NamedKey { names: &["arrowup", "up"], key: "ArrowUp", code: "ArrowUp", virtual_key: 38, text: None },
    NamedKey { names: &["arrowdown", "down"], key: "ArrowDown", code: "ArrowDown", virtual_key: 40, text: None },
    NamedKey { names: &["arrowleft", "left"], key: "ArrowLeft", code: "ArrowLeft", virtual_key: 37, text: None },
    NamedKey { names: &["arrowright", "right"], key: "ArrowRight", code: "ArrowRight", virtual_key: 39, text: None },
    NamedKey { names: &["home"], key: "Home", code: "Home", virtual_key: 36, text: None },
    NamedKey { names: &["end"], key: "End", code: "End", virtual_key: 35, text: None },
    NamedKey { names: &["pageup"], key: "PageUp", code: "PageUp", virtual_key: 33, text: None },
    NamedKey { names: &["pagedown"], key: "PageDown", code: "PageDown", virtual_key: 34, text: None },
];

fn modifier_bit(name: &str) -> Option<i64> {
    match name.to_ascii_lowercase().as_str() {
        "control" | "ctrl" => Some(MOD_CTRL),
        "shift" => Some(MOD_SHIFT),
        "alt" | "option" => Some(MOD_ALT),
        "meta" | "cmd" | "command" | "super" => Some(MOD_META),
        _ => None,
    }
}

fn char_chord(c: char, modifiers: i64) -> KeyChord {
    let upper = c.to_ascii_uppercase();
    let (code, virtual_key) = if c.is_ascii_alphabetic() {
        (format!("Key{}", upper), upper as i64)
    } else if c.is_ascii_digit() {
        (format!("Digit{}", c), c as i64)
    } else {
        (String::new(), 0)
    };
    // Chords with Control or Meta are shortcuts and insert nothing.
    let text = if modifiers & (MOD_CTRL | MOD_META) == 0 {
        let shifted = if modifiers & MOD_SHIFT != 0 { upper } else { c };
        Some(shifted.to_string())
    } else {
        None
    };
    KeyChord {
        key: c.to_string(),
        code,
        virtual_key,
        text,
        modifiers,
    }
}

fn parse_chord(raw: &str) -> Result<KeyChord, AdapterError> {
    let parts: Vec<&str> = raw.split('+').collect();
    let (key_name, modifier_names) = match parts.split_last() {
        Some((last, rest)) if !last.is_empty() => (*last, rest),
        // "Control++" names the plus key itself
        _ if raw.ends_with("++") || raw == "+" => ("+", &parts[..parts.len().saturating_sub(2)]),
        _ => return Err(unknown(raw)),
    };

    let mut modifiers = 0;
    for name in modifier_names {
        modifiers |= modifier_bit(name).ok_or_else(|| unknown(raw))?;
    }

    let lower = key_name.to_ascii_lowercase();
    if let Some(named) = NAMED_KEYS.iter().find(|k| k.names.contains(&lower.as_str())) {
        return Ok(KeyChord {
            key: named.key.to_string(),
            code: named.code.to_string(),
            virtual_key: named.virtual_key,
            text: named.text.filter(|_| modifiers & (MOD_CTRL | MOD_META) == 0).map(str::to_string),
            modifiers,
        });
    }

    let mut chars = key_name.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(char_chord(c, modifiers)),
        _ => Err(unknown(raw)),
    }
}

/// Parse a whitespace separated sequence of chords.
pub fn parse_keys(keys: &str) -> Result<Vec<KeyChord>, AdapterError> {
    if keys == " " {
        return parse_chord("Space").map(|chord| vec![chord]);
    }
    let chords = keys
        .split_whitespace()
        .map(parse_chord)
        .collect::<Result<Vec<_>, _>>()?;
    if chords.is_empty() {
        return Err(AdapterError::new(AdapterErrorKind::Internal).with_hint("no keys to send"));
    }
    Ok(chords)
}

fn unknown(raw: &str) -> AdapterError {
    AdapterError::new(AdapterErrorKind::Internal).with_hint(format!("unknown key `{}`", raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_keys_are_case_insensitive() {
        let chords = parse_keys("enter").unwrap();
        assert_eq!(chords[0].key, "Enter");
        assert_eq!(chords[0].virtual_key, 13);
        assert_eq!(chords[0].text.as_deref(), Some("\r"));
    }

    #[test]
    fn shortcuts_carry_modifiers_and_no_text() {
        let chord = &parse_keys("Control+a").unwrap()[0];
        assert_eq!(chord.modifiers, MOD_CTRL);
        assert_eq!(chord.code, "KeyA");
        assert_eq!(chord.text, None);

        let chord = &parse_keys("Ctrl+Shift+Tab").unwrap()[0];
        assert_eq!(chord.modifiers, MOD_CTRL | MOD_SHIFT);
        assert_eq!(chord.key, "Tab");
    }

    #[test]
    fn sequences_split_on_whitespace() {
        let keys: Vec<String> = parse_keys("Tab Tab Enter")
            .unwrap()
            .into_iter()
            .map(|c| c.key)
            .collect();
        assert_eq!(keys, vec!["Tab", "Tab", "Enter"]);
    }

    #[test]
    fn plus_key_and_unknown_names() {
        let chord = &parse_keys("Control++").unwrap()[0];
        assert_eq!(chord.key, "+");
        assert_eq!(chord.modifiers, MOD_CTRL);
        assert!(parse_keys("Hyper+x").is_err());
        assert!(parse_keys("Launchpad").is_err());
        assert!(parse_keys("   ").is_err());
    }
}
