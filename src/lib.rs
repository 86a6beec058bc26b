//! Mayhap is a grammar-based random text generator.
//!
//! A grammar maps symbols to weighted production rules. Rules mix plain text
//! with bracketed tokens: symbol references, literals, patterns, numeric and
//! alphabetic ranges, inline choices and variables. Evaluating a symbol draws
//! one of its rules and expands it recursively, then resolves `a(n)` and
//! `(s)` agreement markers in the result.
//!
//! # Example
//!
//! ```rust
//! use mayhap::{Generator, parse_grammar};
//!
//! let grammar = parse_grammar(
//!     "greeting\n\thello\n\thi^2\n\nsubject\n\t[greeting], [world|friend]\n",
//! )
//! .unwrap();
//!
//! let mut generator = Generator::seeded(grammar, 7);
//! let text = generator.evaluate_input("subject").unwrap();
//! assert!(text.starts_with("hello, ") || text.starts_with("hi, "));
//!
//! assert_eq!(generator.evaluate_input("a(n) ['owl'.upper]").unwrap(), "an OWL");
//! ```

pub mod generator;
pub mod grammar;
pub mod loader;
pub mod modifiers;
pub mod parse;
pub mod rule;
pub mod shell;
pub mod token;
pub mod utils;

pub use generator::{CheckFailure, Generator};
pub use grammar::{Grammar, GrammarBuilder, load_grammar, merge, parse_grammar, parse_grammar_with};
pub use loader::{FileLoader, LoaderConfig, MemoryLoader, SourceLoader};
pub use modifiers::{BasicInflector, Inflector, Modifier};
pub use parse::parse_rule;
pub use rule::Rule;
pub use shell::Shell;
pub use token::{Element, Token};
pub use utils::{ErrorKind, MayhapError, Result};
