use std::fmt;

use serde::{Deserialize, Serialize};

use crate::rule::Rule;
use crate::utils::{MayhapError, Result};

/// One element of a rule: raw text or a parsed token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Element {
    /// Text copied to the output as-is
    Text(String),
    /// A bracketed token (or an escaped character)
    Token(Token),
}

impl From<&str> for Element {
    fn from(text: &str) -> Self {
        Element::Text(text.to_string())
    }
}

impl From<String> for Element {
    fn from(text: String) -> Self {
        Element::Text(text)
    }
}

impl From<Token> for Element {
    fn from(token: Token) -> Self {
        Element::Token(token)
    }
}

/// A parsed token. Containers own their children, so a rule is a plain tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Token {
    /// `['text']`
    Literal {
        value: String,
        modifiers: Vec<String>,
    },
    /// `["text [symbol] text"]`, evaluated in place rather than drawn
    Pattern {
        elements: Vec<Element>,
        modifiers: Vec<String>,
    },
    /// `[1-6]` or `[a-z]`; bounds are normalized so that `start <= end`
    Range {
        start: i64,
        end: i64,
        alpha: bool,
        modifiers: Vec<String>,
    },
    /// `[symbol]`
    Symbol {
        name: Vec<Element>,
        modifiers: Vec<String>,
    },
    /// `[$variable]`
    Variable {
        name: String,
        modifiers: Vec<String>,
    },
    /// `[variable=value]` echoes the value, `[variable~value]` is silent
    Assignment {
        variable: String,
        value: Vec<Element>,
        echo: bool,
    },
    /// `[first|second|third]`
    Choice { rules: Vec<Rule> },
}

impl Token {
    /// A literal producing `value` verbatim
    pub fn literal(value: impl Into<String>) -> Self {
        Token::Literal {
            value: value.into(),
            modifiers: Vec::new(),
        }
    }

    /// A pattern evaluating `elements` as an inline rule
    pub fn pattern(elements: Vec<Element>) -> Self {
        Token::Pattern {
            elements,
            modifiers: Vec::new(),
        }
    }

    /// A numeric range over both bounds, in either order
    pub fn range(bound1: i64, bound2: i64) -> Self {
        Token::Range {
            start: bound1.min(bound2),
            end: bound1.max(bound2),
            alpha: false,
            modifiers: Vec::new(),
        }
    }

    /// An alphabetic range; both bounds must be ASCII letters of the same case
    pub fn alpha_range(bound1: char, bound2: char) -> Result<Self> {
        if !bound1.is_ascii_alphabetic() || !bound2.is_ascii_alphabetic() {
            return Err(MayhapError::Parse(format!(
                "Range bounds ({bound1} and {bound2}) must be letters"
            )));
        }
        if bound1.is_ascii_uppercase() != bound2.is_ascii_uppercase() {
            return Err(MayhapError::Parse(format!(
                "Range bounds ({bound1} and {bound2}) must have the same case"
            )));
        }
        let (bound1, bound2) = (bound1 as i64, bound2 as i64);
        Ok(Token::Range {
            start: bound1.min(bound2),
            end: bound1.max(bound2),
            alpha: true,
            modifiers: Vec::new(),
        })
    }

    /// A reference to the symbol `name`
    pub fn symbol(name: impl Into<String>) -> Self {
        Token::Symbol {
            name: vec![Element::Text(name.into())],
            modifiers: Vec::new(),
        }
    }

    /// A reference to the variable `name`
    pub fn variable(name: impl Into<String>) -> Self {
        Token::Variable {
            name: name.into(),
            modifiers: Vec::new(),
        }
    }

    /// Assign `value` to `variable`, echoing it into the output when `echo` is set
    pub fn assignment(variable: impl Into<String>, value: Vec<Element>, echo: bool) -> Self {
        Token::Assignment {
            variable: variable.into(),
            value,
            echo,
        }
    }

    /// An inline weighted choice between `rules`
    pub fn choice(rules: Vec<Rule>) -> Self {
        Token::Choice { rules }
    }

    /// Replace the modifier list. Choices and assignments carry no modifiers,
    /// so they are returned unchanged.
    pub fn with_modifiers<I, S>(mut self, new: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match &mut self {
            Token::Literal { modifiers, .. }
            | Token::Pattern { modifiers, .. }
            | Token::Range { modifiers, .. }
            | Token::Symbol { modifiers, .. }
            | Token::Variable { modifiers, .. } => {
                *modifiers = new.into_iter().map(Into::into).collect();
            }
            Token::Assignment { .. } | Token::Choice { .. } => {}
        }
        self
    }

    /// Modifier names, in the order they are applied
    pub fn modifiers(&self) -> &[String] {
        match self {
            Token::Literal { modifiers, .. }
            | Token::Pattern { modifiers, .. }
            | Token::Range { modifiers, .. }
            | Token::Symbol { modifiers, .. }
            | Token::Variable { modifiers, .. } => modifiers,
            Token::Assignment { .. } | Token::Choice { .. } => &[],
        }
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, text: &str, special: &[char]) -> fmt::Result {
    for c in text.chars() {
        match c {
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            '\\' => f.write_str("\\\\")?,
            c if special.contains(&c) => write!(f, "\\{c}")?,
            c => write!(f, "{c}")?,
        }
    }
    Ok(())
}

fn write_modifiers(f: &mut fmt::Formatter<'_>, modifiers: &[String]) -> fmt::Result {
    for modifier in modifiers {
        write!(f, ".{modifier}")?;
    }
    Ok(())
}

fn write_elements(f: &mut fmt::Formatter<'_>, elements: &[Element], special: &[char]) -> fmt::Result {
    for element in elements {
        match element {
            Element::Text(text) => write_escaped(f, text, special)?,
            Element::Token(token) => write!(f, "{token}")?,
        }
    }
    Ok(())
}

pub(crate) const RULE_SPECIAL: &[char] = &['[', ']', '|', '^'];
const PATTERN_SPECIAL: &[char] = &['[', ']', '"'];

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_elements(f, std::slice::from_ref(self), RULE_SPECIAL)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Literal { value, modifiers } => {
                f.write_str("['")?;
                write_escaped(f, value, &['\''])?;
                f.write_str("'")?;
                write_modifiers(f, modifiers)?;
                f.write_str("]")
            }
            Token::Pattern {
                elements,
                modifiers,
            } => {
                f.write_str("[\"")?;
                write_elements(f, elements, PATTERN_SPECIAL)?;
                f.write_str("\"")?;
                write_modifiers(f, modifiers)?;
                f.write_str("]")
            }
            Token::Range {
                start,
                end,
                alpha,
                modifiers,
            } => {
                let as_char = |n: i64| {
                    u32::try_from(n)
                        .ok()
                        .and_then(char::from_u32)
                        .unwrap_or(char::REPLACEMENT_CHARACTER)
                };
                if *alpha {
                    write!(f, "[{}-{}", as_char(*start), as_char(*end))?;
                } else {
                    write!(f, "[{start}-{end}")?;
                }
                write_modifiers(f, modifiers)?;
                f.write_str("]")
            }
            Token::Symbol { name, modifiers } => {
                f.write_str("[")?;
                write_elements(f, name, RULE_SPECIAL)?;
                write_modifiers(f, modifiers)?;
                f.write_str("]")
            }
            Token::Variable { name, modifiers } => {
                write!(f, "[${name}")?;
                write_modifiers(f, modifiers)?;
                f.write_str("]")
            }
            Token::Assignment {
                variable,
                value,
                echo,
            } => {
                let operator = if *echo { '=' } else { '~' };
                write!(f, "[{variable}{operator}")?;
                // The value is always a single block; drop its brackets
                match value.as_slice() {
                    [Element::Token(token)] => {
                        let inner = token.to_string();
                        f.write_str(&inner[1..inner.len() - 1])?;
                    }
                    _ => write_elements(f, value, RULE_SPECIAL)?,
                }
                f.write_str("]")
            }
            Token::Choice { rules } => {
                f.write_str("[")?;
                for (i, rule) in rules.iter().enumerate() {
                    if i > 0 {
                        f.write_str("|")?;
                    }
                    write!(f, "{rule}")?;
                }
                f.write_str("]")
            }
        }
    }
}
