//! # config.h Rendering and Parsing
//!
//! The firmware consumes its configuration as a C header:
//!
//! ```c
//! #ifndef CONFIG_H
//! #define CONFIG_H
//!
//! #define CFG_WIFI_SSID "YOUR_WIFI_SSID"
//! #define CFG_WIFI_PASSWORD "YOUR_WIFI_PASSWORD"
//! #define LATITUDE 36.97
//! #define LONGITUDE -122.01
//! #define TIMEZONE "America/Los_Angeles"
//! #define TIMEZONE_POSIX "PST8PDT,M3.2.0,M11.1.0"
//! #define TIDE_STATION "9413450"
//! #define BUOY_STATION "46236"
//!
//! #endif
//! ```
//!
//! [`render`] writes that contract from a [`Config`]; [`parse`] reads a
//! hand-edited header back, understanding just enough of the preprocessor to
//! check its structure:
//! - `//` and `/* */` comments, backslash line continuations
//! - an include guard (`#ifndef G` / `#define G` ... `#endif`) or `#pragma once`
//!   that wraps the whole file
//! - object-like `#define NAME value` with string or numeric values
//! - `#include` lines, recorded and otherwise ignored
//!
//! Anything else (conditionals, function-like macros, C code) is rejected so
//! the header stays a flat list of constants.

use crate::config::{Config, LocationConfig, StationsConfig, WifiConfig};
use crate::secrets::Secret;
use crate::timezone::{self, TimezoneError};
use crate::StationId;
use std::collections::HashMap;
use std::fmt::Write as _;
use thiserror::Error;

/// Include guard written by [`render`].
pub const GUARD: &str = "CONFIG_H";

pub const CFG_WIFI_SSID: &str = "CFG_WIFI_SSID";
pub const CFG_WIFI_PASSWORD: &str = "CFG_WIFI_PASSWORD";
pub const LATITUDE: &str = "LATITUDE";
pub const LONGITUDE: &str = "LONGITUDE";
pub const TIMEZONE: &str = "TIMEZONE";
pub const TIMEZONE_POSIX: &str = "TIMEZONE_POSIX";
pub const TIDE_STATION: &str = "TIDE_STATION";
pub const BUOY_STATION: &str = "BUOY_STATION";

/// Every macro the firmware expects, in rendering order.
pub const REQUIRED_MACROS: [&str; 8] = [
    CFG_WIFI_SSID,
    CFG_WIFI_PASSWORD,
    LATITUDE,
    LONGITUDE,
    TIMEZONE,
    TIMEZONE_POSIX,
    TIDE_STATION,
    BUOY_STATION,
];

const GENERATED_BANNER: &str = "// config.h - generated by tide-station\n\
                                // Contains Wi-Fi credentials: keep this file out of version control";

const TEMPLATE_BANNER: &str = "// config.example.h - Copy to config.h and fill in your values\n\
                               // config.h is gitignored to protect credentials";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HeaderError {
    #[error("line {line}: unterminated /* comment")]
    UnterminatedComment { line: usize },

    #[error("line {line}: unterminated string literal")]
    UnterminatedString { line: usize },

    #[error("line {line}: invalid escape sequence in string literal")]
    BadEscape { line: usize },

    #[error("no include guard: expected `#ifndef CONFIG_H` or `#pragma once` before any definition")]
    MissingGuard,

    #[error("line {line}: include guard mismatch, `#ifndef {ifndef}` followed by `{found}`")]
    GuardMismatch {
        ifndef: String,
        found: String,
        line: usize,
    },

    #[error("include guard `{0}` is never closed with #endif")]
    UnterminatedGuard(String),

    #[error("line {line}: content after the closing #endif")]
    OutsideGuard { line: usize },

    #[error("line {line}: unsupported directive or content `{content}`")]
    Unsupported { content: String, line: usize },

    #[error("line {line}: {name} already defined on line {first_line}")]
    Duplicate {
        name: String,
        first_line: usize,
        line: usize,
    },

    #[error("missing required macros: {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error("line {line}: {name} must be a {expected}")]
    WrongType {
        name: String,
        expected: &'static str,
        line: usize,
    },
}

/// Value of an object-like macro.
#[derive(Clone, Debug, PartialEq)]
pub enum MacroValue {
    /// `#define NAME` with no replacement text
    Empty,
    /// A C string literal, unescaped
    Str(String),
    /// A numeric literal
    Number(f64),
    /// Any other replacement text, verbatim
    Raw(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Define {
    pub name: String,
    pub value: MacroValue,
    /// 1-based line of the `#define`
    pub line: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Guard {
    IncludeGuard(String),
    PragmaOnce,
}

/// A structurally valid header.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedHeader {
    pub guard: Guard,
    /// Definitions in file order, excluding the guard macro itself
    pub defines: Vec<Define>,
    pub includes: Vec<String>,
}

impl ParsedHeader {
    pub fn get(&self, name: &str) -> Option<&Define> {
        self.defines.iter().find(|d| d.name == name)
    }

    /// Required macros that are not defined.
    pub fn missing(&self) -> Vec<&'static str> {
        REQUIRED_MACROS
            .iter()
            .copied()
            .filter(|name| self.get(name).is_none())
            .collect()
    }

    /// Definitions the firmware does not know about.
    pub fn extras(&self) -> impl Iterator<Item = &Define> {
        self.defines
            .iter()
            .filter(|d| !REQUIRED_MACROS.contains(&d.name.as_str()))
    }

    fn string(&self, name: &str) -> Result<String, HeaderError> {
        match self.get(name) {
            Some(Define {
                value: MacroValue::Str(s),
                ..
            }) => Ok(s.clone()),
            Some(d) => Err(HeaderError::WrongType {
                name: name.to_string(),
                expected: "string literal",
                line: d.line,
            }),
            None => Err(HeaderError::Missing(vec![name.to_string()])),
        }
    }

    fn number(&self, name: &str) -> Result<f64, HeaderError> {
        match self.get(name) {
            Some(Define {
                value: MacroValue::Number(n),
                ..
            }) => Ok(*n),
            Some(d) => Err(HeaderError::WrongType {
                name: name.to_string(),
                expected: "numeric literal",
                line: d.line,
            }),
            None => Err(HeaderError::Missing(vec![name.to_string()])),
        }
    }

    /// Convert to a [`Config`]; every required macro must be present with the
    /// right kind of value.
    pub fn to_config(&self) -> Result<Config, HeaderError> {
        let missing = self.missing();
        if !missing.is_empty() {
            return Err(HeaderError::Missing(
                missing.into_iter().map(String::from).collect(),
            ));
        }

        Ok(Config {
            wifi: WifiConfig {
                ssid: self.string(CFG_WIFI_SSID)?,
                password: Secret::new(self.string(CFG_WIFI_PASSWORD)?),
            },
            location: LocationConfig {
                latitude: self.number(LATITUDE)?,
                longitude: self.number(LONGITUDE)?,
                timezone: self.string(TIMEZONE)?,
                timezone_posix: Some(self.string(TIMEZONE_POSIX)?),
            },
            stations: StationsConfig {
                tide: StationId::from(self.string(TIDE_STATION)?),
                buoy: StationId::from(self.string(BUOY_STATION)?),
            },
        })
    }
}

/// Render `config.h` for a configuration. A missing POSIX string is derived
/// from the IANA name for `year`, the same reference year validation used.
pub fn render(config: &Config, year: i32) -> Result<String, TimezoneError> {
    let posix = match &config.location.timezone_posix {
        Some(posix) => posix.clone(),
        None => timezone::derive_posix(&config.location.timezone, year)?,
    };
    Ok(render_text(config, &posix, GENERATED_BANNER))
}

/// Render `config.example.h` from [`Config::example`].
pub fn render_template() -> String {
    let config = Config::example();
    let posix = config.location.timezone_posix.clone().unwrap_or_default();
    render_text(&config, &posix, TEMPLATE_BANNER)
}

fn render_text(config: &Config, posix: &str, banner: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", banner);
    out.push('\n');
    let _ = writeln!(out, "#ifndef {}", GUARD);
    let _ = writeln!(out, "#define {}", GUARD);
    out.push('\n');

    let strings = [
        (CFG_WIFI_SSID, config.wifi.ssid.as_str()),
        (CFG_WIFI_PASSWORD, config.wifi.password.expose()),
    ];
    for (name, value) in strings {
        let _ = writeln!(out, "#define {} {}", name, c_string_literal(value));
    }
    let _ = writeln!(out, "#define {} {}", LATITUDE, c_float_literal(config.location.latitude));
    let _ = writeln!(out, "#define {} {}", LONGITUDE, c_float_literal(config.location.longitude));

    let strings = [
        (TIMEZONE, config.location.timezone.as_str()),
        (TIMEZONE_POSIX, posix),
        (TIDE_STATION, config.stations.tide.as_str()),
        (BUOY_STATION, config.stations.buoy.as_str()),
    ];
    for (name, value) in strings {
        let _ = writeln!(out, "#define {} {}", name, c_string_literal(value));
    }

    out.push('\n');
    out.push_str("#endif\n");
    out
}

/// Quote and escape a string for C source. Control bytes use octal escapes,
/// which cannot swallow a following hex digit the way `\x` does.
pub fn c_string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_ascii_control() => {
                let _ = write!(out, "\\{:03o}", c as u32);
            }
            // Also breaks up `??x` trigraph sequences.
            '?' if out.ends_with('?') => out.push_str("\\?"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// A floating-point literal that always carries a decimal point, so the
/// firmware never sees an `int`.
pub fn c_float_literal(value: f64) -> String {
    let s = value.to_string();
    if s.contains('.') || !value.is_finite() {
        s
    } else {
        format!("{}.0", s)
    }
}

/// Parse the text of a configuration header.
pub fn parse(text: &str) -> Result<ParsedHeader, HeaderError> {
    let cleaned = strip_comments(text)?;

    enum State {
        Start,
        AwaitGuardDefine { name: String },
        Body { guard: Guard },
        Closed { guard: String },
    }

    let mut state = State::Start;
    let mut defines: Vec<Define> = Vec::new();
    let mut includes = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for (line_no, line) in logical_lines(&cleaned) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if matches!(state, State::Closed { .. }) {
            return Err(HeaderError::OutsideGuard { line: line_no });
        }

        let Some(directive) = line.strip_prefix('#') else {
            return Err(HeaderError::Unsupported {
                content: line.to_string(),
                line: line_no,
            });
        };
        let directive = directive.trim_start();
        let (keyword, rest) = split_word(directive);

        state = match (state, keyword) {
            (State::Start, "ifndef") => {
                let (name, trailing) = split_word(rest);
                if !is_identifier(name) || !trailing.trim().is_empty() {
                    return Err(HeaderError::Unsupported {
                        content: line.to_string(),
                        line: line_no,
                    });
                }
                State::AwaitGuardDefine {
                    name: name.to_string(),
                }
            }
            (State::Start, "pragma") if rest.trim() == "once" => State::Body {
                guard: Guard::PragmaOnce,
            },
            (State::Start, "include") => {
                includes.push(rest.trim().to_string());
                State::Start
            }
            (State::Start, _) => return Err(HeaderError::MissingGuard),
            (State::AwaitGuardDefine { name }, "define") => {
                let (defined, value) = split_word(rest);
                if defined != name || !value.trim().is_empty() {
                    return Err(HeaderError::GuardMismatch {
                        ifndef: name,
                        found: line.to_string(),
                        line: line_no,
                    });
                }
                seen.insert(name.clone(), line_no);
                State::Body {
                    guard: Guard::IncludeGuard(name),
                }
            }
            (State::AwaitGuardDefine { name }, _) => {
                return Err(HeaderError::GuardMismatch {
                    ifndef: name,
                    found: line.to_string(),
                    line: line_no,
                })
            }
            (State::Body { guard }, "define") => {
                let define = parse_define(rest, line_no, line)?;
                if let Some(&first_line) = seen.get(&define.name) {
                    return Err(HeaderError::Duplicate {
                        name: define.name,
                        first_line,
                        line: line_no,
                    });
                }
                seen.insert(define.name.clone(), line_no);
                defines.push(define);
                State::Body { guard }
            }
            (State::Body { guard }, "include") => {
                includes.push(rest.trim().to_string());
                State::Body { guard }
            }
            (
                State::Body {
                    guard: Guard::IncludeGuard(guard),
                },
                "endif",
            ) => State::Closed { guard },
            (State::Body { .. }, _) | (State::Closed { .. }, _) => {
                return Err(HeaderError::Unsupported {
                    content: line.to_string(),
                    line: line_no,
                })
            }
        };
    }

    match state {
        State::Start => Err(HeaderError::MissingGuard),
        State::AwaitGuardDefine { name } | State::Body { guard: Guard::IncludeGuard(name) } => {
            Err(HeaderError::UnterminatedGuard(name))
        }
        State::Body {
            guard: Guard::PragmaOnce,
        } => Ok(ParsedHeader {
            guard: Guard::PragmaOnce,
            defines,
            includes,
        }),
        State::Closed { guard } => Ok(ParsedHeader {
            guard: Guard::IncludeGuard(guard),
            defines,
            includes,
        }),
    }
}

fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    let end = s
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(s.len());
    (&s[..end], &s[end..])
}

/// A C identifier: non-empty, not starting with a digit.
fn is_identifier(name: &str) -> bool {
    !name.is_empty() && !name.starts_with(|c: char| c.is_ascii_digit())
}

fn parse_define(rest: &str, line_no: usize, line: &str) -> Result<Define, HeaderError> {
    let (name, value) = split_word(rest);
    if !is_identifier(name) || value.starts_with('(') {
        return Err(HeaderError::Unsupported {
            content: line.to_string(),
            line: line_no,
        });
    }

    let value = value.trim();
    let value = if value.is_empty() {
        MacroValue::Empty
    } else if value.starts_with('"') {
        MacroValue::Str(parse_string_literal(value, line_no)?)
    } else if let Some(n) = parse_number(value) {
        MacroValue::Number(n)
    } else {
        MacroValue::Raw(value.to_string())
    };

    Ok(Define {
        name: name.to_string(),
        value,
        line: line_no,
    })
}

/// `-122.01`, `(36.97)`, `1.5f`, `+2`. Hex and octal integers are left raw.
fn parse_number(value: &str) -> Option<f64> {
    let mut v = value.trim();
    while let Some(inner) = v.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        v = inner.trim();
    }
    let v = v.trim_end_matches(['f', 'F', 'l', 'L']);
    if v.is_empty() || v.starts_with("0x") || v.starts_with("0X") {
        return None;
    }
    if !v
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
    {
        return None;
    }
    v.parse::<f64>().ok()
}

/// Unescape a single C string literal; nothing may follow the closing quote.
fn parse_string_literal(value: &str, line: usize) -> Result<String, HeaderError> {
    let bytes = value.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 1;

    loop {
        let Some(&b) = bytes.get(i) else {
            return Err(HeaderError::UnterminatedString { line });
        };
        i += 1;
        match b {
            b'"' => break,
            b'\\' => {
                let Some(&esc) = bytes.get(i) else {
                    return Err(HeaderError::UnterminatedString { line });
                };
                i += 1;
                match esc {
                    b'"' | b'\\' | b'\'' | b'?' => out.push(esc),
                    b'n' => out.push(b'\n'),
                    b'r' => out.push(b'\r'),
                    b't' => out.push(b'\t'),
                    b'a' => out.push(0x07),
                    b'b' => out.push(0x08),
                    b'f' => out.push(0x0c),
                    b'v' => out.push(0x0b),
                    b'0'..=b'7' => {
                        let mut code = u32::from(esc - b'0');
                        for _ in 0..2 {
                            match bytes.get(i) {
                                Some(&d @ b'0'..=b'7') => {
                                    code = code * 8 + u32::from(d - b'0');
                                    i += 1;
                                }
                                _ => break,
                            }
                        }
                        out.push(u8::try_from(code).map_err(|_| HeaderError::BadEscape { line })?);
                    }
                    b'x' => {
                        let start = i;
                        while bytes.get(i).is_some_and(u8::is_ascii_hexdigit) {
                            i += 1;
                        }
                        let digits = std::str::from_utf8(&bytes[start..i])
                            .map_err(|_| HeaderError::BadEscape { line })?;
                        let code = u8::from_str_radix(digits, 16)
                            .map_err(|_| HeaderError::BadEscape { line })?;
                        out.push(code);
                    }
                    _ => return Err(HeaderError::BadEscape { line }),
                }
            }
            other => out.push(other),
        }
    }

    if !value[i..].trim().is_empty() {
        return Err(HeaderError::Unsupported {
            content: value.to_string(),
            line,
        });
    }
    String::from_utf8(out).map_err(|_| HeaderError::BadEscape { line })
}

/// Replace comments with spaces, keeping newlines so line numbers survive.
fn strip_comments(text: &str) -> Result<String, HeaderError> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut line = 1;

    while let Some(c) = chars.next() {
        match c {
            '"' | '\'' => {
                let quote = c;
                out.push(c);
                loop {
                    match chars.next() {
                        Some('\\') => {
                            out.push('\\');
                            if let Some(next) = chars.next() {
                                if next == '\n' {
                                    line += 1;
                                }
                                out.push(next);
                            }
                        }
                        Some('\n') | None => return Err(HeaderError::UnterminatedString { line }),
                        Some(ch) => {
                            out.push(ch);
                            if ch == quote {
                                break;
                            }
                        }
                    }
                }
            }
            '/' if chars.peek() == Some(&'/') => {
                for ch in chars.by_ref() {
                    if ch == '\n' {
                        out.push('\n');
                        line += 1;
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let start = line;
                let mut closed = false;
                while let Some(ch) = chars.next() {
                    if ch == '\n' {
                        out.push('\n');
                        line += 1;
                    } else if ch == '*' && chars.peek() == Some(&'/') {
                        chars.next();
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    return Err(HeaderError::UnterminatedComment { line: start });
                }
                out.push(' ');
            }
            '\n' => {
                line += 1;
                out.push('\n');
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

/// Join backslash-continued lines; each logical line keeps its first line number.
fn logical_lines(text: &str) -> Vec<(usize, String)> {
    let mut lines = Vec::new();
    let mut pending: Option<(usize, String)> = None;

    for (idx, raw) in text.lines().enumerate() {
        let (start, mut acc) = pending.take().unwrap_or((idx + 1, String::new()));
        match raw.strip_suffix('\\') {
            Some(head) => {
                acc.push_str(head);
                pending = Some((start, acc));
            }
            None => {
                acc.push_str(raw);
                lines.push((start, acc));
            }
        }
    }
    if let Some(last) = pending {
        lines.push(last);
    }
    lines
}
