//! Log-prefix template language
//!
//! A template is a string with `%` tokens expanded per record:
//!
//! | Token | Expansion |
//! |-------|-----------|
//! | `%t` | tick counter, 11 digits, zero padded |
//! | `%i` | instruction pointer of the reference unit, 8 hex digits |
//! | `%e` | one-character severity code (`d`, `i`, `e`, `p`) |
//! | `%d` | device tag of the logger, e.g. `[FDD  ]` |
//! | `%%` | a literal `%` |
//!
//! Any other `%<c>` passes through unchanged. A lone `%` at the very end is dropped.

use std::fmt;

use crate::severity::SeverityLevel;

/// Template used when none is configured
pub const DEFAULT_PREFIX: &str = "%t%e%d";

/// Render a device name as a bracketed, five-column tag
pub fn device_tag(name: &str) -> String {
    format!("[{:<5.5}]", name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Ticks,
    InstructionPointer,
    Level,
    Device,
}

/// Values a template is expanded against
#[derive(Debug, Clone, Copy)]
pub struct PrefixFields<'a> {
    pub ticks: u64,
    pub instruction_pointer: u32,
    pub level: SeverityLevel,
    pub device: &'a str,
}

/// Parsed prefix template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPrefix {
    template: String,
    tokens: Vec<Token>,
}

impl LogPrefix {
    /// Parse a template; parsing never fails
    pub fn parse(template: &str) -> Self {
        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars();

        while let Some(c) = chars.next() {
            if c != '%' {
                literal.push(c);
                continue;
            }
            let Some(spec) = chars.next() else {
                break;
            };
            let token = match spec {
                't' => Token::Ticks,
                'i' => Token::InstructionPointer,
                'e' => Token::Level,
                'd' => Token::Device,
                '%' => {
                    literal.push('%');
                    continue;
                }
                other => {
                    literal.push('%');
                    literal.push(other);
                    continue;
                }
            };
            if !literal.is_empty() {
                tokens.push(Token::Literal(std::mem::take(&mut literal)));
            }
            tokens.push(token);
        }
        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }

        Self {
            template: template.to_string(),
            tokens,
        }
    }

    /// The source template
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Expand the template
    pub fn render(&self, fields: &PrefixFields<'_>) -> String {
        let mut out = String::with_capacity(self.template.len() + 24);
        for token in &self.tokens {
            match token {
                Token::Literal(text) => out.push_str(text),
                Token::Ticks => out.push_str(&format!("{:011}", fields.ticks)),
                Token::InstructionPointer => {
                    out.push_str(&format!("{:08x}", fields.instruction_pointer))
                }
                Token::Level => out.push(fields.level.code()),
                Token::Device => out.push_str(fields.device),
            }
        }
        out
    }
}

impl Default for LogPrefix {
    fn default() -> Self {
        Self::parse(DEFAULT_PREFIX)
    }
}

impl fmt::Display for LogPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}
