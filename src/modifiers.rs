use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::utils::{MayhapError, Result};

/// Matches dynamic indefinite articles, e.g. `a(n)`
static RE_ARTICLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(a)\((n)\)").expect("article pattern is valid"));

/// Matches dynamic pluralization, e.g. `(s)`
static RE_PLURAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\((s)\)").expect("plural pattern is valid"));

/// Word-level inflection used by the modifiers and agreement markers.
///
/// The provided methods are simple English heuristics, so [`BasicInflector`]
/// works without any language data; a full inflection engine can override
/// them.
pub trait Inflector: fmt::Debug {
    /// Name of this inflector, for diagnostics
    fn name(&self) -> &str {
        "basic"
    }

    /// The indefinite article ("a" or "an") to put before `word`
    fn article(&self, word: &str) -> String {
        match word.chars().next() {
            Some(first) if "aeiou".contains(first.to_ascii_lowercase()) => "an".to_string(),
            _ => "a".to_string(),
        }
    }

    /// The form of `word` for `count` items, or the plural when no count is known
    fn plural(&self, word: &str, count: Option<f64>) -> String {
        match count {
            Some(count) if count == 1.0 => word.to_string(),
            _ => format!("{word}s"),
        }
    }

    /// `number` as an ordinal, e.g. "2" becomes "2nd"
    fn ordinal(&self, number: &str) -> String {
        if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
            return format!("{number}th");
        }
        let last_two = number
            .get(number.len().saturating_sub(2)..)
            .and_then(|tail| tail.parse::<u32>().ok())
            .unwrap_or(0);
        let suffix = match (last_two % 100, last_two % 10) {
            (11..=13, _) => "th",
            (_, 1) => "st",
            (_, 2) => "nd",
            (_, 3) => "rd",
            _ => "th",
        };
        format!("{number}{suffix}")
    }
}

/// The built-in heuristic inflector
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicInflector;

impl Inflector for BasicInflector {}

/// `word` preceded by its indefinite article
pub fn add_article(word: &str, inflector: &dyn Inflector) -> String {
    format!("{} {}", inflector.article(word), word)
}

/// A named transform applied to a token's evaluated text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    /// Draw from a symbol without requiring an unused rule
    Mundane,
    /// Prefix a context-sensitive indefinite article
    Article,
    /// Pluralize
    Plural,
    /// Render a number as an ordinal (e.g. 1st, 10th)
    Ordinal,
    /// Capitalize the first letter, lowercase the rest
    Capitalize,
    Lower,
    Upper,
    /// Capitalize the first letter of each word
    Title,
}

impl Modifier {
    /// Every modifier, for lookup by name
    pub const ALL: [Modifier; 8] = [
        Modifier::Mundane,
        Modifier::Article,
        Modifier::Plural,
        Modifier::Ordinal,
        Modifier::Capitalize,
        Modifier::Lower,
        Modifier::Upper,
        Modifier::Title,
    ];

    /// The name used after a `.` in rule source
    pub fn name(self) -> &'static str {
        match self {
            Modifier::Mundane => "mundane",
            Modifier::Article => "a",
            Modifier::Plural => "s",
            Modifier::Ordinal => "th",
            Modifier::Capitalize => "capitalize",
            Modifier::Lower => "lower",
            Modifier::Upper => "upper",
            Modifier::Title => "title",
        }
    }

    /// Transform `text`
    pub fn apply(self, text: &str, inflector: &dyn Inflector) -> String {
        match self {
            Modifier::Mundane => text.to_string(),
            Modifier::Article => add_article(text, inflector),
            Modifier::Plural => inflector.plural(text, None),
            Modifier::Ordinal => inflector.ordinal(text),
            Modifier::Capitalize => capitalize(text),
            Modifier::Lower => text.to_lowercase(),
            Modifier::Upper => text.to_uppercase(),
            Modifier::Title => title_case(text),
        }
    }
}

impl FromStr for Modifier {
    type Err = MayhapError;

    fn from_str(name: &str) -> Result<Self> {
        Modifier::ALL
            .into_iter()
            .find(|modifier| modifier.name() == name)
            .ok_or_else(|| MayhapError::UnknownModifier(name.to_string()))
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Apply the modifier called `name` to `text`
pub fn apply_modifier(text: &str, name: &str, inflector: &dyn Inflector) -> Result<String> {
    Ok(name.parse::<Modifier>()?.apply(text, inflector))
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
    }
}

fn title_case(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut in_word = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if in_word {
                result.extend(c.to_lowercase());
            } else {
                result.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            result.push(c);
            in_word = false;
        }
    }
    result
}

/// Replace every `a(n)` marker with the article for the word after it.
///
/// The case of each marker letter carries over: `A(n)` gives "A"/"An" and
/// `A(N)` gives "A"/"AN".
pub fn resolve_indefinite_articles(text: &str, inflector: &dyn Inflector) -> String {
    RE_ARTICLE
        .replace_all(text, |caps: &Captures<'_>| {
            let Some(marker) = caps.get(0) else {
                return String::new();
            };
            let next_word: String = text[marker.end()..]
                .trim_start()
                .chars()
                .take_while(|c| c.is_alphanumeric())
                .collect();
            let article = if next_word.is_empty() {
                "a".to_string()
            } else {
                inflector.article(&next_word)
            };

            let upper_a = caps.get(1).is_some_and(|m| m.as_str() == "A");
            let upper_n = caps.get(2).is_some_and(|m| m.as_str() == "N");
            let mut chars = article.chars();
            let mut resolved = String::with_capacity(article.len());
            if let Some(first) = chars.next() {
                if upper_a {
                    resolved.extend(first.to_uppercase());
                } else {
                    resolved.push(first);
                }
            }
            if upper_n {
                resolved.push_str(&chars.as_str().to_uppercase());
            } else {
                resolved.push_str(chars.as_str());
            }
            resolved
        })
        .into_owned()
}

/// Replace every `(s)` marker by inflecting the word directly before it.
///
/// A number right before that word selects singular (1) or plural; with no
/// number the plural is used. A marker with no word before it becomes "s".
pub fn resolve_plurals(text: &str, inflector: &dyn Inflector) -> String {
    let mut output = String::with_capacity(text.len());
    let mut last_match = 0;

    for caps in RE_PLURAL.captures_iter(text) {
        let (Some(marker), Some(letter)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let before = &text[last_match..marker.start()];
        let word_start = before
            .char_indices()
            .rev()
            .take_while(|(_, c)| c.is_alphabetic())
            .last()
            .map_or(before.len(), |(i, _)| i);
        let word = &before[word_start..];

        if word.is_empty() {
            output.push_str(before);
            output.push_str(letter.as_str());
        } else {
            let count = preceding_number(&text[..last_match + word_start]);
            output.push_str(&before[..word_start]);
            output.push_str(&inflector.plural(word, count));
        }
        last_match = marker.end();
    }

    output.push_str(&text[last_match..]);
    output
}

/// The number ending `text`, ignoring trailing whitespace
fn preceding_number(text: &str) -> Option<f64> {
    let text = text.trim_end();
    let start = text
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit() || *c == '.')
        .last()
        .map(|(i, _)| i)?;
    let start = match text[..start].strip_suffix('-') {
        Some(rest) => rest.len(),
        None => start,
    };
    text[start..].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Loud;

    impl Inflector for Loud {
        fn name(&self) -> &str {
            "loud"
        }

        fn plural(&self, word: &str, _count: Option<f64>) -> String {
            format!("{}ES", word.to_uppercase())
        }
    }

    fn apply(text: &str, name: &str) -> String {
        apply_modifier(text, name, &BasicInflector).unwrap()
    }

    #[test]
    fn test_modifier_names() {
        for modifier in Modifier::ALL {
            assert_eq!(modifier.name().parse::<Modifier>().unwrap(), modifier);
        }
        let err = "shout".parse::<Modifier>().unwrap_err();
        assert!(matches!(err, MayhapError::UnknownModifier(ref name) if name == "shout"));
    }

    #[test]
    fn test_basic_modifiers() {
        assert_eq!(apply("cat", "s"), "cats");
        assert_eq!(apply("article", "a"), "an article");
        assert_eq!(apply("Owl", "a"), "an Owl");
        assert_eq!(apply("cat", "a"), "a cat");
        assert_eq!(apply("MiXeD", "lower"), "mixed");
        assert_eq!(apply("x", "upper"), "X");
        assert_eq!(apply("a b", "title"), "A B");
        assert_eq!(apply("the OLD man's-boat", "title"), "The Old Man'S-Boat");
        assert_eq!(apply("hELLO world", "capitalize"), "Hello world");
        assert_eq!(apply("", "capitalize"), "");
        assert_eq!(apply("same", "mundane"), "same");
    }

    #[test]
    fn test_ordinals() {
        assert_eq!(apply("1", "th"), "1st");
        assert_eq!(apply("2", "th"), "2nd");
        assert_eq!(apply("3", "th"), "3rd");
        assert_eq!(apply("5", "th"), "5th");
        assert_eq!(apply("11", "th"), "11th");
        assert_eq!(apply("112", "th"), "112th");
        assert_eq!(apply("21", "th"), "21st");
        assert_eq!(apply("many", "th"), "manyth");
    }

    #[test]
    fn test_resolve_articles() {
        let basic = BasicInflector;
        assert_eq!(resolve_indefinite_articles("a(n) apple", &basic), "an apple");
        assert_eq!(resolve_indefinite_articles("a(n) pear", &basic), "a pear");
        assert_eq!(resolve_indefinite_articles("A(n) egg and a(n) ham", &basic), "An egg and a ham");
        assert_eq!(resolve_indefinite_articles("A(N) ORB", &basic), "AN ORB");
        assert_eq!(resolve_indefinite_articles("a(N) orb", &basic), "aN orb");
        assert_eq!(resolve_indefinite_articles("just a(n)", &basic), "just a");
        assert_eq!(resolve_indefinite_articles("no markers", &basic), "no markers");
    }

    #[test]
    fn test_resolve_plurals() {
        let basic = BasicInflector;
        assert_eq!(resolve_plurals("cat(s)", &basic), "cats");
        assert_eq!(resolve_plurals("1 cat(s)", &basic), "1 cat");
        assert_eq!(resolve_plurals("3 cat(s)", &basic), "3 cats");
        assert_eq!(resolve_plurals("1.5 cup(s)", &basic), "1.5 cups");
        assert_eq!(resolve_plurals("-1 point(s)", &basic), "-1 points");
        assert_eq!(resolve_plurals("1 dog and cat(s)", &basic), "1 dog and cats");
        assert_eq!(resolve_plurals("1 dog, 2 cat(s)", &basic), "1 dog, 2 cats");
        assert_eq!(resolve_plurals("(s) alone", &basic), "s alone");
        assert_eq!(resolve_plurals("cat(s)(S)", &basic), "catsS");
    }

    #[test]
    fn test_custom_inflector() {
        let loud = Loud;
        assert_eq!(loud.name(), "loud");
        assert_eq!(apply_modifier("box", "s", &loud).unwrap(), "BOXES");
        assert_eq!(resolve_plurals("2 box(s)", &loud), "2 BOXES");
        // Methods not overridden keep the heuristics
        assert_eq!(add_article("owl", &loud), "an owl");
    }
}
