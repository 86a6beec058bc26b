use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use crate::grammar::Grammar;
use crate::modifiers::{
    BasicInflector, Inflector, Modifier, apply_modifier, resolve_indefinite_articles,
    resolve_plurals,
};
use crate::parse::parse_rule;
use crate::rule::{Rule, choose_index, choose_rule};
use crate::token::{Element, Token};
use crate::utils::{MayhapError, Result};

/// A rule that failed to evaluate during [`Generator::check`]
#[derive(Debug)]
pub struct CheckFailure {
    /// The symbol the rule belongs to
    pub symbol: String,
    /// The failing rule
    pub rule: Rule,
    /// Why evaluation failed
    pub error: MayhapError,
}

/// Expands patterns against a grammar.
///
/// Symbols are drawn without replacement by default: every symbol keeps a
/// pool of unused rules that is refilled from the full rule set once it runs
/// dry, so a symbol with N rules yields each of them once in any N
/// consecutive unique draws. The `mundane` modifier draws from the full set
/// instead, while still marking the drawn rule as used.
#[derive(Debug)]
pub struct Generator<R: Rng = StdRng> {
    grammar: Grammar,
    /// Rules not yet drawn in unique mode, per symbol
    unused: HashMap<String, Vec<Rule>>,
    variables: HashMap<String, String>,
    inflector: Box<dyn Inflector>,
    rng: R,
}

impl Generator<StdRng> {
    /// A generator seeded from system entropy
    pub fn new(grammar: Grammar) -> Self {
        Generator::with_rng(grammar, StdRng::from_entropy())
    }

    /// A generator whose output is reproducible for a given seed
    pub fn seeded(grammar: Grammar, seed: u64) -> Self {
        Generator::with_rng(grammar, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> Generator<R> {
    /// A generator drawing from `rng`
    pub fn with_rng(grammar: Grammar, rng: R) -> Self {
        let mut generator = Generator {
            grammar,
            unused: HashMap::new(),
            variables: HashMap::new(),
            inflector: Box::new(BasicInflector),
            rng,
        };
        generator.reset();
        generator
    }

    /// Use `inflector` for articles, plurals and ordinals
    pub fn with_inflector(mut self, inflector: impl Inflector + 'static) -> Self {
        self.inflector = Box::new(inflector);
        self
    }

    /// The grammar being expanded, including any edits made since creation
    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    /// The inflector used for agreement and inflecting modifiers
    pub fn inflector(&self) -> &dyn Inflector {
        self.inflector.as_ref()
    }

    /// Forget all variables and make every rule unused again
    pub fn reset(&mut self) {
        debug!(symbols = self.grammar.len(), "resetting generator state");
        self.variables.clear();
        self.unused = self
            .grammar
            .iter()
            .map(|(symbol, rules)| (symbol.to_string(), rules.to_vec()))
            .collect();
    }

    /// The current value of a variable, if it has been assigned
    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    /// Assign a variable as if by `[name~'value']`
    pub fn set_variable(&mut self, name: &str, value: impl Into<String>) {
        self.variables.insert(name.to_string(), value.into());
    }

    /// Draw a rule for `symbol`.
    ///
    /// A unique draw takes from the unused pool, refilling it first when it
    /// is empty or only zero-weight rules are left in it. Otherwise the draw is from the full rule set, and the drawn
    /// rule is still removed from the pool if it was unused.
    pub fn draw(&mut self, symbol: &str, unique: bool) -> Result<Rule> {
        let rules = self
            .grammar
            .get(symbol)
            .ok_or_else(|| MayhapError::UnknownSymbol(symbol.to_string()))?;
        if rules.is_empty() {
            return Err(MayhapError::EmptySymbol(symbol.to_string()));
        }

        let pool = self.unused.entry(symbol.to_string()).or_default();
        if unique {
            if pool.is_empty() || (total_weight(pool) == 0.0 && total_weight(rules) > 0.0) {
                trace!(symbol, "refilling exhausted symbol");
                *pool = rules.to_vec();
            }
            let index = choose_index(pool, &mut self.rng)
                .ok_or_else(|| MayhapError::EmptySymbol(symbol.to_string()))?;
            return Ok(pool.remove(index));
        }

        let rule = choose_rule(rules, &mut self.rng)
            .cloned()
            .ok_or_else(|| MayhapError::EmptySymbol(symbol.to_string()))?;
        if let Some(index) = pool.iter().position(|unused| *unused == rule) {
            pool.remove(index);
        }
        Ok(rule)
    }

    /// Draw a rule for `symbol` and evaluate it
    pub fn produce(&mut self, symbol: &str, unique: bool) -> Result<String> {
        let rule = self.draw(symbol, unique)?;
        self.evaluate_elements(&rule.elements, 0)
    }

    /// Expand a symbol name, or evaluate `pattern` as an ad hoc rule
    pub fn evaluate_input(&mut self, pattern: &str) -> Result<String> {
        if self.grammar.contains(pattern) {
            return self.produce(pattern, true);
        }
        let rule = parse_rule(pattern)?;
        self.evaluate_elements(&rule.elements, 0)
    }

    /// Evaluate a sequence of elements and resolve agreement markers in the result
    pub fn evaluate_elements(&mut self, elements: &[Element], depth: usize) -> Result<String> {
        let mut output = String::new();
        for element in elements {
            match element {
                Element::Text(text) => output.push_str(text),
                Element::Token(token) => output.push_str(&self.evaluate_token(token, depth + 1)?),
            }
        }

        let resolved = resolve_indefinite_articles(&output, self.inflector.as_ref());
        let resolved = resolve_plurals(&resolved, self.inflector.as_ref());
        if resolved != output {
            trace!(depth, output = %resolved, "resolved agreement");
        }
        Ok(resolved)
    }

    /// Evaluate one token, then apply its modifiers left to right
    pub fn evaluate_token(&mut self, token: &Token, depth: usize) -> Result<String> {
        trace!(depth, %token, "evaluating");

        let value = match token {
            Token::Literal { value, .. } => value.clone(),
            Token::Pattern { elements, .. } => self.evaluate_elements(elements, depth)?,
            Token::Range {
                start, end, alpha, ..
            } => {
                let drawn = self.rng.gen_range(*start..=*end);
                if *alpha {
                    u32::try_from(drawn)
                        .ok()
                        .and_then(char::from_u32)
                        .map(String::from)
                        .unwrap_or_default()
                } else {
                    drawn.to_string()
                }
            }
            Token::Symbol { name, modifiers } => {
                let symbol = self.evaluate_elements(name, depth)?;
                let unique = !modifiers.iter().any(|m| m == Modifier::Mundane.name());
                let rule = self.draw(&symbol, unique)?;
                self.evaluate_elements(&rule.elements, depth)?
            }
            Token::Variable { name, .. } => self
                .variables
                .get(name)
                .cloned()
                .ok_or_else(|| MayhapError::UnboundVariable(name.clone()))?,
            Token::Assignment {
                variable,
                value,
                echo,
            } => {
                let value = self.evaluate_elements(value, depth)?;
                trace!(depth, %variable, %value, "assigned");
                self.variables.insert(variable.clone(), value.clone());
                return Ok(if *echo { value } else { String::new() });
            }
            Token::Choice { rules } => {
                let Some(rule) = choose_rule(rules, &mut self.rng).cloned() else {
                    return Ok(String::new());
                };
                return self.evaluate_elements(&rule.elements, depth);
            }
        };

        let mut value = value;
        for modifier in token.modifiers() {
            value = apply_modifier(&value, modifier, self.inflector.as_ref())?;
        }
        trace!(depth, output = %value, "evaluated");
        Ok(value)
    }

    /// Add a rule, given as source text, to `symbol`
    pub fn add_rule(&mut self, symbol: &str, rule_text: &str) -> Result<bool> {
        let rule = parse_rule(rule_text)?;
        let added = self.grammar.add_rule(symbol, rule)?;
        self.refresh(symbol);
        Ok(added)
    }

    /// Declare `symbol` with no rules
    pub fn add_symbol(&mut self, symbol: &str) -> Result<bool> {
        let added = self.grammar.add_symbol(symbol)?;
        self.refresh(symbol);
        Ok(added)
    }

    /// Remove `symbol` and all its rules; returns whether it existed
    pub fn remove_symbol(&mut self, symbol: &str) -> bool {
        self.unused.remove(symbol);
        self.grammar.remove_symbol(symbol).is_some()
    }

    /// Remove a rule, given as source text, from `symbol`
    pub fn remove_rule(&mut self, symbol: &str, rule_text: &str) -> Result<bool> {
        let rule = parse_rule(rule_text)?;
        if let Some(pool) = self.unused.get_mut(symbol) {
            pool.retain(|unused| *unused != rule);
        }
        Ok(self.grammar.remove_rule(symbol, &rule))
    }

    /// Merge `grammar` into this one; its symbols start with fresh pools
    pub fn import(&mut self, grammar: Grammar) {
        let symbols: Vec<String> = grammar.symbols().map(str::to_string).collect();
        self.grammar.merge(grammar);
        for symbol in &symbols {
            self.refresh(symbol);
        }
    }

    /// Evaluate every rule of every symbol once and report the failures.
    /// Generator state is reset afterwards.
    pub fn check(&mut self) -> Vec<CheckFailure> {
        let rules: Vec<(String, Rule)> = self
            .grammar
            .iter()
            .flat_map(|(symbol, rules)| {
                rules
                    .iter()
                    .map(move |rule| (symbol.to_string(), rule.clone()))
            })
            .collect();

        let mut failures = Vec::new();
        for (symbol, rule) in rules {
            if let Err(error) = self.evaluate_elements(&rule.elements, 0) {
                debug!(%symbol, %rule, %error, "rule failed");
                failures.push(CheckFailure {
                    symbol,
                    rule,
                    error,
                });
            }
        }
        self.reset();
        failures
    }

    fn refresh(&mut self, symbol: &str) {
        match self.grammar.get(symbol) {
            Some(rules) => {
                self.unused.insert(symbol.to_string(), rules.to_vec());
            }
            None => {
                self.unused.remove(symbol);
            }
        }
    }
}

fn total_weight(rules: &[Rule]) -> f64 {
    rules.iter().map(|rule| rule.weight).sum()
}
