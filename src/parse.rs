use std::collections::HashMap;

use tracing::trace;

use crate::rule::{DEFAULT_WEIGHT, Rule};
use crate::token::{Element, Token};
use crate::utils::{MayhapError, Result, is_identifier_char, is_identifier_start};

/// Characters that end a text run in a rule or a choice alternative
const RULE_STOP: &[char] = &['[', ']', '|', '^', '\\'];

/// Characters that end a text run inside a `"pattern"`
const PATTERN_STOP: &[char] = &['[', ']', '"', '\\'];

#[derive(Debug, Clone)]
struct Failure {
    message: String,
    pos: usize,
    /// Fatal failures are reported as-is instead of trying another form
    fatal: bool,
}

type Parsed<T> = std::result::Result<T, Failure>;

/// Parse one production rule, e.g. `[adjective] [noun.s] ^2`.
///
/// A rule is a run of text and bracketed blocks, optionally ending in a
/// `^weight`. Blocks are tried as an assignment, then a quoted literal or
/// pattern filling the whole block, then a list of choices, then a single
/// primary token with modifiers; a failed attempt rewinds and the next form
/// is tried. Only semantic errors (a negative or overflowing weight, a
/// mixed-case range) stop the search early.
pub fn parse_rule(text: &str) -> Result<Rule> {
    let mut parser = RuleParser::new(text);
    let rule = parser.rule().and_then(|rule| {
        parser.finish()?;
        Ok(rule)
    });
    rule.map_err(|failure| {
        // Report whichever attempt got furthest into the input
        let failure = match parser.furthest.take() {
            Some(furthest) if !failure.fatal && furthest.pos > failure.pos => furthest,
            _ => failure,
        };
        MayhapError::Parse(format!(
            "{} (column {}) in \"{}\"",
            failure.message,
            failure.pos + 1,
            text
        ))
    })
}

/// Resolve the character following a backslash
pub(crate) fn unescape(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        '0' => '\0',
        other => other,
    }
}

struct RuleParser {
    chars: Vec<char>,
    pos: usize,
    furthest: Option<Failure>,
    /// Outcome of every block parsed so far, by start position, with the
    /// position after its closing `]`
    blocks: HashMap<usize, Parsed<(Token, usize)>>,
}

impl RuleParser {
    fn new(text: &str) -> Self {
        RuleParser {
            chars: text.chars().collect(),
            pos: 0,
            furthest: None,
            blocks: HashMap::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn fail<T>(&self, message: impl Into<String>) -> Parsed<T> {
        Err(Failure {
            message: message.into(),
            pos: self.pos,
            fatal: false,
        })
    }

    fn fatal<T>(&self, message: impl Into<String>) -> Parsed<T> {
        Err(Failure {
            message: message.into(),
            pos: self.pos,
            fatal: true,
        })
    }

    /// Rewind after a failed attempt, keeping the failure if it is fatal
    fn backtrack(&mut self, start: usize, failure: Failure) -> Parsed<()> {
        if failure.fatal {
            return Err(failure);
        }
        if self.furthest.as_ref().is_none_or(|furthest| failure.pos > furthest.pos) {
            self.furthest = Some(failure);
        }
        self.pos = start;
        Ok(())
    }

    fn finish(&mut self) -> Parsed<()> {
        self.skip_whitespace();
        match self.peek() {
            None => Ok(()),
            Some(']') => self.fail("Unmatched ']'"),
            Some('|') => self.fail("Choices must be enclosed in a block"),
            Some(c) => self.fail(format!("Unexpected '{c}' after weight")),
        }
    }

    /// `token* weight?`, stopping before `|`, `]` or the end of input
    fn rule(&mut self) -> Parsed<Rule> {
        let mut elements = Vec::new();
        let mut weight = DEFAULT_WEIGHT;

        loop {
            match self.peek() {
                None | Some(']') | Some('|') => break,
                Some('[') => elements.push(Element::Token(self.block()?)),
                Some('\\') => elements.push(self.escaped()),
                Some('^') => {
                    weight = self.weight()?;
                    if let Some(Element::Text(text)) = elements.last_mut() {
                        text.truncate(text.trim_end().len());
                        if text.is_empty() {
                            elements.pop();
                        }
                    }
                    break;
                }
                Some(_) => elements.push(Element::Text(self.text_run(RULE_STOP))),
            }
        }

        Ok(Rule::new(elements, weight))
    }

    fn text_run(&mut self, stop: &[char]) -> String {
        let start = self.pos;
        while self.peek().is_some_and(|c| !stop.contains(&c)) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    /// A backslash escape outside a literal becomes a one-character literal
    fn escaped(&mut self) -> Element {
        self.bump();
        match self.bump() {
            Some(c) => Element::Token(Token::literal(unescape(c))),
            None => Element::Text("\\".to_string()),
        }
    }

    fn weight(&mut self) -> Parsed<f64> {
        self.bump();
        self.skip_whitespace();
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '.' | '+' | '-' | 'e' | 'E'))
        {
            self.pos += 1;
        }
        let number: String = self.chars[start..self.pos].iter().collect();
        let weight: f64 = match number.parse() {
            Ok(weight) => weight,
            Err(_) => return self.fail(format!("Invalid weight \"{number}\"")),
        };
        if weight < 0.0 {
            return self.fatal(format!("Weight must be non-negative; was {weight}"));
        }
        if !weight.is_finite() {
            return self.fatal(format!("Weight \"{number}\" is too large"));
        }
        self.skip_whitespace();
        Ok(weight)
    }

    /// `'[' (assignment | choices | modded) ']'`
    ///
    /// A block parses the same way wherever it starts, so each start position
    /// is parsed once and later attempts reuse the outcome.
    fn block(&mut self) -> Parsed<Token> {
        let start = self.pos;
        match self.blocks.get(&start).cloned() {
            Some(Ok((token, end))) => {
                self.pos = end;
                return Ok(token);
            }
            Some(Err(failure)) => return Err(failure),
            None => {}
        }

        let parsed = self.block_contents();
        let outcome = match &parsed {
            Ok(token) => Ok((token.clone(), self.pos)),
            Err(failure) => Err(failure.clone()),
        };
        self.blocks.insert(start, outcome);
        parsed
    }

    fn block_contents(&mut self) -> Parsed<Token> {
        self.bump();
        let token = self.inner()?;
        self.skip_whitespace();
        match self.peek() {
            Some(']') => {
                self.pos += 1;
                trace!(%token, "parsed block");
                Ok(token)
            }
            Some(c) => self.fail(format!("Expected ']' but found '{c}'")),
            None => self.fail("Unclosed '['"),
        }
    }

    fn identifier(&mut self) -> Option<String> {
        if !self.peek().is_some_and(is_identifier_start) {
            return None;
        }
        let start = self.pos;
        while self.peek().is_some_and(is_identifier_char) {
            self.pos += 1;
        }
        Some(self.chars[start..self.pos].iter().collect())
    }

    /// The contents of a block, without the brackets
    fn inner(&mut self) -> Parsed<Token> {
        if let Some(token) = self.assignment()? {
            return Ok(token);
        }
        if let Some(token) = self.quoted()? {
            return Ok(token);
        }
        if let Some(token) = self.choices()? {
            return Ok(token);
        }
        self.modded()
    }

    /// `NAME ('=' | '~') inner`
    fn assignment(&mut self) -> Parsed<Option<Token>> {
        let start = self.pos;
        self.skip_whitespace();
        let Some(variable) = self.identifier() else {
            self.pos = start;
            return Ok(None);
        };
        self.skip_whitespace();
        let echo = match self.peek() {
            Some('=') => true,
            Some('~') => false,
            _ => {
                self.pos = start;
                return Ok(None);
            }
        };
        self.pos += 1;

        match self.inner() {
            Ok(value) => Ok(Some(Token::assignment(variable, vec![Element::Token(value)], echo))),
            Err(failure) => {
                self.backtrack(start, failure)?;
                Ok(None)
            }
        }
    }

    /// A literal or pattern filling the whole block. Trying this before
    /// choices keeps a `|` inside quotes from splitting the block.
    fn quoted(&mut self) -> Parsed<Option<Token>> {
        let start = self.pos;
        self.skip_whitespace();
        if !matches!(self.peek(), Some('\'' | '"')) {
            self.pos = start;
            return Ok(None);
        }
        match self.modded() {
            Ok(token) => {
                self.skip_whitespace();
                if self.peek() == Some(']') {
                    return Ok(Some(token));
                }
                self.pos = start;
                Ok(None)
            }
            Err(failure) => {
                self.backtrack(start, failure)?;
                Ok(None)
            }
        }
    }

    /// `rule? ('|' rule?)+`
    fn choices(&mut self) -> Parsed<Option<Token>> {
        let start = self.pos;
        match self.choice_list() {
            Ok(Some(token)) => Ok(Some(token)),
            Ok(None) => {
                self.pos = start;
                Ok(None)
            }
            Err(failure) => {
                self.backtrack(start, failure)?;
                Ok(None)
            }
        }
    }

    fn choice_list(&mut self) -> Parsed<Option<Token>> {
        let first = self.rule()?;
        if self.peek() != Some('|') {
            return Ok(None);
        }
        let mut rules = vec![first];
        while self.eat('|') {
            rules.push(self.rule()?);
        }
        Ok(Some(Token::choice(rules)))
    }

    /// A primary token followed by `.modifier`s
    fn modded(&mut self) -> Parsed<Token> {
        self.skip_whitespace();
        let token = match self.peek() {
            None => return self.fail("Unclosed '['"),
            Some(']') => return self.fail("Empty block"),
            Some('[') => return self.fail("Dynamic symbol dereference is not supported"),
            Some('\'') => self.literal()?,
            Some('"') => self.pattern()?,
            Some('$') => self.variable()?,
            Some(_) => match self.range()? {
                Some(token) => token,
                None => match self.identifier() {
                    Some(name) => Token::symbol(name),
                    None => {
                        let c = self.peek().unwrap_or(' ');
                        return self.fail(format!("Invalid symbol name starting with '{c}'"));
                    }
                },
            },
        };

        let mut modifiers = Vec::new();
        loop {
            let before = self.pos;
            self.skip_whitespace();
            if !self.eat('.') {
                self.pos = before;
                break;
            }
            self.skip_whitespace();
            match self.identifier() {
                Some(modifier) => modifiers.push(modifier),
                None => return self.fail("Invalid modifier name"),
            }
        }

        Ok(if modifiers.is_empty() {
            token
        } else {
            token.with_modifiers(modifiers)
        })
    }

    fn literal(&mut self) -> Parsed<Token> {
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                None => return self.fail("Unterminated literal"),
                Some('\'') => break,
                Some('\\') => match self.bump() {
                    Some(c) => value.push(unescape(c)),
                    None => return self.fail("Unterminated literal"),
                },
                Some(c) => value.push(c),
            }
        }
        Ok(Token::literal(value))
    }

    fn pattern(&mut self) -> Parsed<Token> {
        self.bump();
        let mut elements = Vec::new();
        loop {
            match self.peek() {
                None => return self.fail("Unterminated pattern"),
                Some('"') => {
                    self.pos += 1;
                    break;
                }
                Some('[') => elements.push(Element::Token(self.block()?)),
                Some(']') => return self.fail("Unmatched ']' in pattern"),
                Some('\\') => elements.push(self.escaped()),
                Some(_) => elements.push(Element::Text(self.text_run(PATTERN_STOP))),
            }
        }
        if elements.is_empty() {
            return self.fail("Empty pattern");
        }
        Ok(Token::pattern(elements))
    }

    fn variable(&mut self) -> Parsed<Token> {
        self.bump();
        self.skip_whitespace();
        if self.peek() == Some('[') {
            return self.fail("Dynamic variable dereference is not supported");
        }
        match self.identifier() {
            Some(name) => Ok(Token::variable(name)),
            None => self.fail("Invalid variable name"),
        }
    }

    fn signed_integer(&mut self) -> Option<String> {
        let start = self.pos;
        let mut number = String::new();
        if let Some(sign @ ('-' | '+')) = self.peek() {
            number.push(sign);
            self.pos += 1;
        }
        while let Some(c) = self.peek().filter(char::is_ascii_digit) {
            number.push(c);
            self.pos += 1;
        }
        if number.trim_start_matches(['-', '+']).is_empty() {
            self.pos = start;
            return None;
        }
        Some(number)
    }

    /// `INT '-' INT` or `LETTER '-' LETTER`
    fn range(&mut self) -> Parsed<Option<Token>> {
        let start = self.pos;

        if let Some(first) = self.signed_integer() {
            self.skip_whitespace();
            if self.eat('-') {
                self.skip_whitespace();
                if let Some(second) = self.signed_integer() {
                    let (Ok(bound1), Ok(bound2)) = (first.parse::<i64>(), second.parse::<i64>())
                    else {
                        return self.fatal(format!("Range bounds ({first} and {second}) are too large"));
                    };
                    return Ok(Some(Token::range(bound1, bound2)));
                }
            }
            self.pos = start;
            return Ok(None);
        }

        if let Some(first) = self.peek().filter(char::is_ascii_alphabetic) {
            self.pos += 1;
            self.skip_whitespace();
            if self.eat('-') {
                self.skip_whitespace();
                if let Some(second) = self.peek().filter(char::is_ascii_alphabetic) {
                    if !self.peek_at(1).is_some_and(is_identifier_char) {
                        self.pos += 1;
                        return match Token::alpha_range(first, second) {
                            Ok(token) => Ok(Some(token)),
                            Err(MayhapError::Parse(message)) => self.fatal(message),
                            Err(err) => self.fatal(err.to_string()),
                        };
                    }
                }
            }
        }

        self.pos = start;
        Ok(None)
    }
}
