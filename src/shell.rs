use std::io::{self, Write};

use rand::Rng;
use rand::rngs::StdRng;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Context, Editor, Helper, Highlighter, Hinter, Validator};
use tracing::debug;

use crate::generator::Generator;
use crate::grammar::import_grammar;
use crate::loader::{FileLoader, SourceLoader};
use crate::utils::Result;

const PROMPT: &str = "> ";

/// Shell commands with their usage and help text
const COMMANDS: &[(&str, &str, &str)] = &[
    ("evaluate", "/evaluate <pattern>", "Evaluate a pattern, or expand a symbol"),
    ("grammar", "/grammar", "Show the loaded grammar"),
    ("list", "/list [symbol]", "List the symbols, or the rules of one symbol"),
    ("add", "/add <symbol> [rule]", "Add a symbol and/or a rule"),
    ("remove", "/remove <symbol> [rule]", "Remove a symbol or one of its rules"),
    ("import", "/import <path>", "Import another grammar file"),
    ("reset", "/reset", "Forget variables and used rules"),
    ("help", "/help", "Show this help"),
    ("exit", "/exit", "Leave the shell"),
];

/// Whether the shell should keep reading input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Read the next line
    Continue,
    /// `/exit` was given
    Exit,
}

/// Tab completion over commands and symbol names
#[derive(Helper, Highlighter, Hinter, Validator)]
struct ShellHelper {
    symbols: Vec<String>,
}

impl Completer for ShellHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let start = line[..pos]
            .rfind(|c: char| c.is_whitespace() || c == '[' || c == '|')
            .map_or(0, |i| i + char_len_at(line, i));
        let word = &line[start..pos];

        let commands = COMMANDS.iter().map(|(name, _, _)| format!("/{name}"));
        let candidates = if start == 0 {
            commands.chain(self.symbols.iter().cloned()).collect::<Vec<_>>()
        } else {
            self.symbols.clone()
        };

        let pairs = candidates
            .into_iter()
            .filter(|candidate| candidate.starts_with(word))
            .map(|candidate| Pair {
                display: candidate.clone(),
                replacement: candidate,
            })
            .collect();
        Ok((start, pairs))
    }
}

fn char_len_at(line: &str, index: usize) -> usize {
    line[index..].chars().next().map_or(1, char::len_utf8)
}

/// An interactive session around a [`Generator`].
///
/// Input not starting with `/` is evaluated as a symbol name or a pattern.
/// Lines starting with `/` are commands that inspect or edit the grammar.
pub struct Shell<R: Rng = StdRng> {
    generator: Generator<R>,
    loader: FileLoader,
}

impl<R: Rng> Shell<R> {
    /// `loader` resolves the paths given to `/import`
    pub fn new(generator: Generator<R>, loader: FileLoader) -> Self {
        Shell { generator, loader }
    }

    /// The generator, with any edits made during the session
    pub fn generator(&self) -> &Generator<R> {
        &self.generator
    }

    /// Run the read-evaluate loop on the terminal until `/exit` or end of input
    pub fn run(&mut self) -> Result<()> {
        let mut editor: Editor<ShellHelper, DefaultHistory> = Editor::new()?;
        editor.set_helper(Some(ShellHelper {
            symbols: self.symbols(),
        }));

        loop {
            match editor.readline(PROMPT) {
                Ok(line) => {
                    editor.add_history_entry(line.as_str())?;
                    let outcome = self.execute(&line, &mut io::stdout().lock())?;
                    if outcome == Outcome::Exit {
                        break;
                    }
                    if let Some(helper) = editor.helper_mut() {
                        helper.symbols = self.symbols();
                    }
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    /// Handle one line of input, writing any output to `out`.
    ///
    /// Generation and grammar errors are reported to `out` and do not end the
    /// session; only write failures are returned.
    pub fn execute<W: Write>(&mut self, line: &str, out: &mut W) -> Result<Outcome> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Ok(Outcome::Continue);
        }
        let Some(command) = line.strip_prefix('/') else {
            self.evaluate(line, out)?;
            return Ok(Outcome::Continue);
        };

        let (name, arg) = command.split_once(' ').unwrap_or((command, ""));
        let arg = arg.trim();
        debug!(command = name, arg, "shell command");
        match name {
            "evaluate" => self.evaluate(arg, out)?,
            "grammar" => write!(out, "{}", self.generator.grammar())?,
            "list" => self.list(arg, out)?,
            "add" => self.add(arg, out)?,
            "remove" => self.remove(arg, out)?,
            "import" => self.import(arg, out)?,
            "reset" => self.generator.reset(),
            "help" => {
                for (_, usage, help) in COMMANDS {
                    writeln!(out, "{usage:<26}{help}")?;
                }
            }
            "exit" => return Ok(Outcome::Exit),
            _ => writeln!(out, "Unknown command: /{name} (try /help)")?,
        }
        Ok(Outcome::Continue)
    }

    fn symbols(&self) -> Vec<String> {
        self.generator.grammar().symbols().map(str::to_string).collect()
    }

    fn evaluate<W: Write>(&mut self, pattern: &str, out: &mut W) -> Result<()> {
        match self.generator.evaluate_input(pattern) {
            Ok(output) => writeln!(out, "{output}")?,
            Err(err) => writeln!(out, "Error: {err}")?,
        }
        Ok(())
    }

    fn list<W: Write>(&self, symbol: &str, out: &mut W) -> Result<()> {
        let grammar = self.generator.grammar();
        if symbol.is_empty() {
            for symbol in grammar.symbols() {
                writeln!(out, "{symbol}")?;
            }
            return Ok(());
        }
        match grammar.get(symbol) {
            Some(rules) => {
                for rule in rules {
                    writeln!(out, "{rule}")?;
                }
            }
            None => writeln!(out, "Symbol \"{symbol}\" does not exist")?,
        }
        Ok(())
    }

    fn add<W: Write>(&mut self, arg: &str, out: &mut W) -> Result<()> {
        if arg.is_empty() {
            writeln!(out, "Usage: /add <symbol> [rule]")?;
            return Ok(());
        }
        let (symbol, rule) = arg.split_once(' ').unwrap_or((arg, ""));
        let rule = rule.trim();

        if rule.is_empty() {
            match self.generator.add_symbol(symbol) {
                Ok(true) => {}
                Ok(false) => writeln!(out, "Symbol \"{symbol}\" already exists")?,
                Err(err) => writeln!(out, "Error: {err}")?,
            }
            return Ok(());
        }
        if let Err(err) = self.generator.add_rule(symbol, rule) {
            writeln!(out, "Error: {err}")?;
        }
        Ok(())
    }

    fn remove<W: Write>(&mut self, arg: &str, out: &mut W) -> Result<()> {
        if arg.is_empty() {
            writeln!(out, "Usage: /remove <symbol> [rule]")?;
            return Ok(());
        }
        let (symbol, rule) = arg.split_once(' ').unwrap_or((arg, ""));
        let rule = rule.trim();

        if !self.generator.grammar().contains(symbol) {
            writeln!(out, "Symbol \"{symbol}\" does not exist")?;
            return Ok(());
        }
        if rule.is_empty() {
            self.generator.remove_symbol(symbol);
            return Ok(());
        }
        match self.generator.remove_rule(symbol, rule) {
            Ok(true) => {}
            Ok(false) => writeln!(out, "Symbol \"{symbol}\" has no rule \"{rule}\"")?,
            Err(err) => writeln!(out, "Error: {err}")?,
        }
        Ok(())
    }

    fn import<W: Write>(&mut self, path: &str, out: &mut W) -> Result<()> {
        if path.is_empty() {
            writeln!(out, "Usage: /import <path>")?;
            return Ok(());
        }
        match import_grammar(path, &self.loader as &dyn SourceLoader) {
            Ok(grammar) => self.generator.import(grammar),
            Err(err) => writeln!(out, "Error: {err}")?,
        }
        Ok(())
    }
}
