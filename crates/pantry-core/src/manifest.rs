//! Loading of the JSON/JSONC workspace manifest.

use std::path::Path;

use pantry_types::{Manifest, PantryError, Result};

/// The conventional manifest file name.
pub const MANIFEST_FILE: &str = "pantry.json";

/// Strips `//` and `/* */` comments from JSONC text before handing it to a
/// JSON parser. Comment markers inside string literals (respecting `\"`
/// escapes) are left untouched.
pub fn strip_jsonc_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                chars.next();
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = ' ';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    if c == '\n' {
                        out.push('\n');
                    }
                    prev = c;
                }
            }
            _ => out.push(c),
        }
    }

    out
}

/// Reads and parses a manifest file at `path`, stripping JSONC comments
/// first.
pub fn load_manifest(path: &Path) -> Result<Manifest> {
    let raw = std::fs::read_to_string(path)?;
    let stripped = strip_jsonc_comments(&raw);
    serde_json::from_str(&stripped)
        .map_err(|e| PantryError::InvalidManifest(format!("{}: {e}", path.display())))
}
