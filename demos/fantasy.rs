use mayhap::{Generator, GrammarBuilder, load_grammar};
use std::error::Error;
use std::path::Path;

/// Generate flavor text from the bundled grammar, then from one built in code
fn main() -> Result<(), Box<dyn Error>> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos").join("fantasy.mh");
    let mut generator = Generator::new(load_grammar(&path)?);

    println!("Quests from {}:", path.display());
    for i in 1..=5 {
        println!("{}. {}", i, generator.evaluate_input("quest")?);
    }

    // A grammar built programmatically, with variables tying the parts together
    let grammar = GrammarBuilder::new()
        .rules("innkeeper", &["Marta", "Old Tobin", "Sela"])
        .rules("drink", &["ale", "mead^2", "elderberry wine"])
        .rule(
            "greeting",
            "[keeper~innkeeper]\"Welcome,\" says [$keeper]. \"Try a(n) [drink].\"",
        )
        .build()?;
    let mut generator = Generator::seeded(grammar, 7);

    println!("\nAt the inn:");
    for _ in 0..3 {
        println!("{}", generator.evaluate_input("greeting")?);
    }
    Ok(())
}
