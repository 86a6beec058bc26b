use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::loader::{FileLoader, SourceLoader};
use crate::parse::parse_rule;
use crate::rule::Rule;
use crate::utils::{MayhapError, Result, is_identifier};

// A `#` not preceded by a backslash starts a comment
static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|[^\\])(#.*)").expect("comment pattern is valid"));

/// The complete grammar: every symbol mapped to its set of rules
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Grammar {
    symbols: BTreeMap<String, Vec<Rule>>,
}

impl Grammar {
    /// Create a new empty grammar
    pub fn new() -> Self {
        Grammar::default()
    }

    /// Parse a grammar from source text, resolving imports from the current directory
    pub fn parse(source: &str) -> Result<Self> {
        parse_grammar(source)
    }

    /// Parse a grammar from a file, resolving imports relative to it
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        load_grammar(path)
    }

    /// Build a grammar from a JSON object mapping symbols to arrays of rule strings
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: BTreeMap<String, Vec<String>> = serde_json::from_str(json)?;
        let mut grammar = Grammar::new();
        for (symbol, rules) in raw {
            if rules.is_empty() {
                return Err(MayhapError::Structure(format!(
                    "Symbol \"{symbol}\" closed with no production rules"
                )));
            }
            grammar.add_symbol(&symbol)?;
            for text in &rules {
                grammar.add_rule(&symbol, parse_rule(text)?)?;
            }
        }
        Ok(grammar)
    }

    /// The rules of `symbol`, if it is defined
    pub fn get(&self, symbol: &str) -> Option<&[Rule]> {
        self.symbols.get(symbol).map(Vec::as_slice)
    }

    /// Whether `symbol` is declared
    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains_key(symbol)
    }

    /// Every defined symbol, in sorted order
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.symbols.keys().map(String::as_str)
    }

    /// Symbols with their rules, in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Rule])> {
        self.symbols
            .iter()
            .map(|(symbol, rules)| (symbol.as_str(), rules.as_slice()))
    }

    /// Number of declared symbols
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Whether no symbol is declared
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Declare `symbol` with no rules. Returns false if it already exists.
    pub fn add_symbol(&mut self, symbol: &str) -> Result<bool> {
        check_symbol_name(symbol)?;
        match self.symbols.entry(symbol.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(entry) => {
                entry.insert(Vec::new());
                Ok(true)
            }
        }
    }

    /// Add a rule to `symbol`, declaring the symbol if needed.
    /// Returns false if an identical rule was already present.
    pub fn add_rule(&mut self, symbol: &str, rule: Rule) -> Result<bool> {
        check_symbol_name(symbol)?;
        let rules = self.symbols.entry(symbol.to_string()).or_default();
        if rules.contains(&rule) {
            return Ok(false);
        }
        rules.push(rule);
        Ok(true)
    }

    /// Replace the rule set of `symbol`
    pub fn set_rules(&mut self, symbol: &str, rules: Vec<Rule>) -> Result<()> {
        check_symbol_name(symbol)?;
        let mut unique = Vec::with_capacity(rules.len());
        for rule in rules {
            if !unique.contains(&rule) {
                unique.push(rule);
            }
        }
        self.symbols.insert(symbol.to_string(), unique);
        Ok(())
    }

    /// Remove `symbol`, returning its rules
    pub fn remove_symbol(&mut self, symbol: &str) -> Option<Vec<Rule>> {
        self.symbols.remove(symbol)
    }

    /// Remove one rule from `symbol`. Returns false if it was not there.
    pub fn remove_rule(&mut self, symbol: &str, rule: &Rule) -> bool {
        let Some(rules) = self.symbols.get_mut(symbol) else {
            return false;
        };
        match rules.iter().position(|candidate| candidate == rule) {
            Some(index) => {
                rules.remove(index);
                true
            }
            None => false,
        }
    }

    /// Merge `other` into this grammar; its definitions win on collision
    pub fn merge(&mut self, other: Grammar) {
        debug!(symbols = other.len(), "merging grammar");
        self.symbols.extend(other.symbols);
    }

    /// Serialize the parsed grammar as pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// The union of two grammars; `imported` wins on collision
pub fn merge(mut base: Grammar, imported: Grammar) -> Grammar {
    base.merge(imported);
    base
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (symbol, rules) in &self.symbols {
            writeln!(f, "{symbol}")?;
            for rule in rules {
                writeln!(f, "\t{rule}")?;
            }
        }
        Ok(())
    }
}

fn check_symbol_name(symbol: &str) -> Result<()> {
    if is_identifier(symbol) {
        Ok(())
    } else {
        Err(MayhapError::Structure(format!("Invalid symbol name: {symbol}")))
    }
}

/// Builder for constructing Grammar instances from rule text
#[derive(Debug, Default)]
pub struct GrammarBuilder {
    grammar: Grammar,
    error: Option<MayhapError>,
}

impl GrammarBuilder {
    /// An empty builder
    pub fn new() -> Self {
        GrammarBuilder::default()
    }

    /// Add a rule to the grammar. The first error is kept and reported by `build`.
    pub fn rule(mut self, symbol: &str, text: &str) -> Self {
        if self.error.is_none() {
            let added = parse_rule(text).and_then(|rule| self.grammar.add_rule(symbol, rule));
            if let Err(err) = added {
                self.error = Some(err);
            }
        }
        self
    }

    /// Add several rules to one symbol
    pub fn rules(self, symbol: &str, texts: &[&str]) -> Self {
        texts.iter().fold(self, |builder, text| builder.rule(symbol, text))
    }

    /// Merge an already built grammar
    pub fn import(mut self, grammar: Grammar) -> Self {
        self.grammar.merge(grammar);
        self
    }

    /// Build the grammar
    pub fn build(self) -> Result<Grammar> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.grammar),
        }
    }
}

/// Parse a grammar, resolving imports relative to the current directory
pub fn parse_grammar(source: &str) -> Result<Grammar> {
    parse_grammar_with(source, &FileLoader::default())
}

/// Parse a grammar, resolving imports through `loader`
pub fn parse_grammar_with(source: &str, loader: &dyn SourceLoader) -> Result<Grammar> {
    GrammarReader::new(loader).read(source)
}

/// Read and parse a grammar file; imports resolve relative to its directory
pub fn load_grammar<P: AsRef<Path>>(path: P) -> Result<Grammar> {
    let path = path.as_ref();
    debug!(path = %path.display(), "loading grammar");
    let source = fs::read_to_string(path)?;
    let loader = FileLoader::for_grammar(path);
    let mut reader = GrammarReader::new(&loader);
    reader.importing.push(path.to_path_buf());
    reader.read(&source)
}

/// Parse one import through `loader`
pub fn import_grammar(path: &str, loader: &dyn SourceLoader) -> Result<Grammar> {
    GrammarReader::new(loader).import(path)
}

/// The symbol whose rules are currently being read
struct OpenSymbol {
    name: String,
    line: usize,
    text: String,
    rules: usize,
}

impl OpenSymbol {
    fn close(self) -> Result<()> {
        if self.rules == 0 {
            return Err(MayhapError::Structure(format!(
                "Symbol \"{}\" closed with no production rules",
                self.name
            ))
            .at_line(self.line, &self.text));
        }
        Ok(())
    }
}

struct GrammarReader<'a> {
    loader: &'a dyn SourceLoader,
    // Sources currently being read, outermost first
    importing: Vec<PathBuf>,
}

impl<'a> GrammarReader<'a> {
    fn new(loader: &'a dyn SourceLoader) -> Self {
        GrammarReader {
            loader,
            importing: Vec::new(),
        }
    }

    fn read(&mut self, source: &str) -> Result<Grammar> {
        let mut grammar = Grammar::new();
        let mut current: Option<OpenSymbol> = None;

        for (index, line) in source.lines().enumerate() {
            let number = index + 1;
            let stripped = strip_comment(line).trim();
            if stripped.is_empty() {
                continue;
            }

            if let Some(path) = stripped.strip_prefix('@').filter(|_| line.starts_with('@')) {
                let imported = self
                    .import(path.trim())
                    .map_err(|err| err.at_line(number, line))?;
                grammar.merge(imported);
                continue;
            }

            if line.starts_with(char::is_whitespace) {
                let Some(open) = current.as_mut() else {
                    return Err(MayhapError::Structure(
                        "Production rule given before symbol".to_string(),
                    )
                    .at_line(number, line));
                };
                let rule = parse_rule(stripped).map_err(|err| err.at_line(number, line))?;
                grammar
                    .add_rule(&open.name, rule)
                    .map_err(|err| err.at_line(number, line))?;
                open.rules += 1;
            } else {
                if let Some(open) = current.take() {
                    open.close()?;
                }
                grammar
                    .set_rules(stripped, Vec::new())
                    .map_err(|err| err.at_line(number, line))?;
                current = Some(OpenSymbol {
                    name: stripped.to_string(),
                    line: number,
                    text: line.to_string(),
                    rules: 0,
                });
            }
        }

        if let Some(open) = current {
            open.close()?;
        }
        debug!(symbols = grammar.len(), "parsed grammar");
        Ok(grammar)
    }

    fn import(&mut self, path: &str) -> Result<Grammar> {
        let source = self.loader.load(path)?;
        if self.importing.contains(&source.name) {
            return Err(MayhapError::Import {
                path: source.name,
                source: Box::new(MayhapError::Structure("Cyclic import".to_string())),
            });
        }
        debug!(path = %source.name.display(), "importing grammar");

        self.importing.push(source.name.clone());
        let parsed = self.read(&source.text);
        self.importing.pop();

        parsed.map_err(|err| MayhapError::Import {
            path: source.name,
            source: Box::new(err),
        })
    }
}

fn strip_comment(line: &str) -> &str {
    match COMMENT.captures(line).and_then(|captures| captures.get(2)) {
        Some(comment) => &line[..comment.start()],
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::MemoryLoader;
    use crate::token::{Element, Token};
    use crate::utils::ErrorKind;

    fn rules(grammar: &Grammar, symbol: &str) -> Vec<String> {
        grammar
            .get(symbol)
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn test_parse_grammar() {
        let source = "\
# a greeting
greeting
\thello^2
\thi  # informal

name
\t[greeting], friend
";
        let grammar = parse_grammar(source).unwrap();
        assert_eq!(grammar.symbols().collect::<Vec<_>>(), vec!["greeting", "name"]);

        let greeting = grammar.get("greeting").unwrap();
        assert_eq!(greeting.len(), 2);
        assert_eq!(greeting[0], Rule::new(vec![Element::from("hello")], 2.0));
        assert_eq!(greeting[1], Rule::text("hi"));

        assert_eq!(
            grammar.get("name").unwrap()[0].elements[0],
            Element::Token(Token::symbol("greeting"))
        );
    }

    #[test]
    fn test_escaped_comment() {
        let grammar = parse_grammar("tag\n\tnumber \\#1 # comment\n").unwrap();
        assert_eq!(rules(&grammar, "tag"), vec![r"number ['#']1"]);
    }

    #[test]
    fn test_duplicate_rules_collapse() {
        let grammar = parse_grammar("x\n\ta\n\ta\n\tb\n").unwrap();
        assert_eq!(rules(&grammar, "x"), vec!["a", "b"]);
    }

    #[test]
    fn test_redeclared_symbol_replaces_rules() {
        let grammar = parse_grammar("x\n\ta\ny\n\tb\nx\n\tc\n").unwrap();
        assert_eq!(rules(&grammar, "x"), vec!["c"]);
    }

    #[test]
    fn test_structure_errors() {
        let cases = [
            ("\trule\n", 1),
            ("empty\nfull\n\trule\n", 1),
            ("full\n\trule\nempty\n", 3),
            ("bad name\n\trule\n", 1),
            ("x\n\t[unclosed\n", 2),
        ];
        for (source, expected_line) in cases {
            match parse_grammar(source) {
                Err(MayhapError::Grammar { line, .. }) => {
                    assert_eq!(line, expected_line, "source: {source:?}")
                }
                other => panic!("Expected grammar error for {source:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_error_keeps_line_text() {
        let err = parse_grammar("x\n  [a-B]\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Grammar);
        match err {
            MayhapError::Grammar { text, cause, .. } => {
                assert_eq!(text, "  [a-B]");
                assert_eq!(cause.kind(), ErrorKind::Parse);
            }
            other => panic!("Expected grammar error, got {other:?}"),
        }
    }

    #[test]
    fn test_imports_merge() {
        let loader = MemoryLoader::new()
            .with_source("colors.mh", "color\n\tred\nshade\n\tdark\n")
            .with_source("more.mh", "@colors\nshape\n\tsquare\n");
        let grammar = parse_grammar_with("color\n\tblue\n@more\n", &loader).unwrap();

        assert_eq!(rules(&grammar, "color"), vec!["red"]);
        assert_eq!(rules(&grammar, "shade"), vec!["dark"]);
        assert_eq!(rules(&grammar, "shape"), vec!["square"]);
    }

    #[test]
    fn test_import_with_trailing_comment() {
        let loader = MemoryLoader::new().with_source("colors.mh", "color\n\tteal\n");
        let grammar = parse_grammar_with("@colors # shared palette\n", &loader).unwrap();
        assert_eq!(rules(&grammar, "color"), vec!["teal"]);

        let grammar = parse_grammar_with("note\n\t@colors\n", &loader).unwrap();
        assert_eq!(rules(&grammar, "note"), vec!["@colors"]);
    }

    #[test]
    fn test_import_errors() {
        let loader = MemoryLoader::new()
            .with_source("broken.mh", "oops\n")
            .with_source("loop.mh", "@loop\n");

        let err = parse_grammar_with("@missing\n", &loader).unwrap_err();
        assert!(err.to_string().contains("missing"), "{err}");

        let err = parse_grammar_with("x\n\ty\n@broken\n", &loader).unwrap_err();
        match &err {
            MayhapError::Grammar { line, cause, .. } => {
                assert_eq!(*line, 3);
                assert!(matches!(**cause, MayhapError::Import { .. }));
            }
            other => panic!("Expected grammar error, got {other:?}"),
        }
        assert!(err.to_string().contains("broken.mh"), "{err}");

        let err = parse_grammar_with("@loop\n", &loader).unwrap_err();
        assert!(err.to_string().contains("Cyclic import"), "{err}");
    }

    #[test]
    fn test_store_operations() {
        let mut grammar = Grammar::new();
        assert!(grammar.is_empty());
        assert!(grammar.add_symbol("animal").unwrap());
        assert!(!grammar.add_symbol("animal").unwrap());
        assert!(grammar.add_symbol("two words").is_err());

        assert!(grammar.add_rule("animal", Rule::text("cat")).unwrap());
        assert!(!grammar.add_rule("animal", Rule::text("cat")).unwrap());
        assert!(grammar.add_rule("animal", Rule::text("dog")).unwrap());
        assert_eq!(grammar.get("animal").unwrap().len(), 2);

        assert!(grammar.remove_rule("animal", &Rule::text("cat")));
        assert!(!grammar.remove_rule("animal", &Rule::text("cat")));
        assert!(!grammar.remove_rule("plant", &Rule::text("cat")));
        assert_eq!(grammar.remove_symbol("animal").map(|r| r.len()), Some(1));
        assert!(!grammar.contains("animal"));
    }

    #[test]
    fn test_merge_prefers_imported() {
        let base = GrammarBuilder::new()
            .rule("a", "base")
            .rule("b", "kept")
            .build()
            .unwrap();
        let imported = GrammarBuilder::new().rule("a", "imported").build().unwrap();
        let merged = merge(base, imported);
        assert_eq!(rules(&merged, "a"), vec!["imported"]);
        assert_eq!(rules(&merged, "b"), vec!["kept"]);
    }

    #[test]
    fn test_builder_reports_first_error() {
        let err = GrammarBuilder::new()
            .rule("ok", "fine")
            .rule("bad", "[oops")
            .rule("bad name", "fine")
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_display_round_trip() {
        let source = "animal\n\tcat\n\tdog^3\nphrase\n\ta(n) [animal.upper] [1-3]\n";
        let grammar = parse_grammar(source).unwrap();
        assert_eq!(grammar.to_string(), source);
        assert_eq!(parse_grammar(&grammar.to_string()).unwrap(), grammar);
    }

    #[test]
    fn test_from_json() {
        let grammar = Grammar::from_json(r#"{"color": ["red", "blue^2"], "thing": ["[color] ball"]}"#)
            .unwrap();
        assert_eq!(rules(&grammar, "color"), vec!["red", "blue^2"]);
        assert_eq!(grammar.len(), 2);

        assert!(Grammar::from_json(r#"{"color": []}"#).is_err());
        assert!(matches!(
            Grammar::from_json("not json"),
            Err(MayhapError::Json(_))
        ));
    }

    #[test]
    fn test_json_dump() {
        let grammar = GrammarBuilder::new().rule("x", "[y.s]").build().unwrap();
        let json = grammar.to_json().unwrap();
        let back: Grammar = serde_json::from_str(&json).unwrap();
        assert_eq!(back, grammar);
    }
}
