use mayhap::{
    ErrorKind, Generator, Grammar, GrammarBuilder, MayhapError, MemoryLoader, Shell, FileLoader,
    load_grammar, parse_grammar_with,
};
use pretty_assertions::assert_eq;
use rand::rngs::mock::StepRng;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;

const TAVERN: &str = r#"
# Test comment
tavern
	The [adjective] [animal]
	The [animal] and [number]^0.5

adjective
	Golden
	Drunken
	Wandering

animal
	Dragon
	Goose

number
	[2-5] [animal.lower](s)  # counted
"#;

#[test]
fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tavern.mh");
    {
        let mut file = File::create(&path).unwrap();
        file.write_all(TAVERN.as_bytes()).unwrap();
    }

    let grammar = load_grammar(&path).unwrap();
    assert_eq!(
        grammar.symbols().collect::<Vec<_>>(),
        vec!["adjective", "animal", "number", "tavern"]
    );
    assert_eq!(
        grammar
            .get("tavern")
            .unwrap()
            .iter()
            .map(|rule| rule.weight)
            .collect::<Vec<_>>(),
        vec![1.0, 0.5]
    );

    let mut generator = Generator::seeded(grammar, 2024);
    for _ in 0..20 {
        let name = generator.evaluate_input("tavern").unwrap();
        assert!(name.starts_with("The "), "{name}");
        assert!(!name.contains('['), "{name}");
    }
}

#[test]
fn test_counted_plurals() {
    let grammar = GrammarBuilder::new()
        .rules("animal", &["Dragon", "Goose"])
        .rule("number", "[2-5] [animal.lower](s)")
        .build()
        .unwrap();
    let mut generator = Generator::seeded(grammar, 8);
    for _ in 0..20 {
        let output = generator.evaluate_input("number").unwrap();
        let (count, noun) = output.split_once(' ').unwrap();
        assert!((2..=5).contains(&count.parse::<i32>().unwrap()));
        assert!(noun == "dragons" || noun == "gooses", "{output}");
    }
}

#[test]
fn test_imports_relative_to_grammar() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("lib")).unwrap();
    fs::write(
        dir.path().join("lib").join("colors.mh"),
        "color\n\tcrimson\n",
    )
    .unwrap();
    fs::write(dir.path().join("shapes.mh"), "@lib/colors\nshape\n\t[color] cube\n").unwrap();
    fs::write(dir.path().join("main.mh"), "@shapes.mh\nthing\n\tA(n) [shape]\n").unwrap();

    let grammar = load_grammar(dir.path().join("main.mh")).unwrap();
    let mut generator = Generator::seeded(grammar, 1);
    assert_eq!(generator.evaluate_input("thing").unwrap(), "A crimson cube");
}

#[test]
fn test_import_errors_name_the_source() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("bad.mh"), "x\n\t[unclosed\n").unwrap();
    fs::write(dir.path().join("main.mh"), "top\n\tok\n@bad\n").unwrap();

    let err = load_grammar(dir.path().join("main.mh")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Grammar);
    let message = err.to_string();
    assert!(message.starts_with("line 3: "), "{message}");
    assert!(message.contains("bad.mh"), "{message}");

    fs::write(dir.path().join("a.mh"), "@b\n").unwrap();
    fs::write(dir.path().join("b.mh"), "@a\n").unwrap();
    let err = load_grammar(dir.path().join("a.mh")).unwrap_err();
    assert!(err.to_string().contains("Cyclic import"), "{err}");
}

#[test]
fn test_missing_grammar_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_grammar(dir.path().join("nothing.mh")).unwrap_err();
    assert!(matches!(err, MayhapError::Io(_)));
}

#[test]
fn test_memory_loader_grammar() {
    let loader = MemoryLoader::new().with_source("names", "name\n\tAda\n");
    let grammar = parse_grammar_with("@names\ngreet\n\tHello, [name]!\n", &loader).unwrap();
    let mut generator = Generator::seeded(grammar, 0);
    assert_eq!(generator.evaluate_input("greet").unwrap(), "Hello, Ada!");
}

#[test]
fn test_unique_cycle_over_generator() {
    let grammar = GrammarBuilder::new()
        .rules("suit", &["hearts", "spades", "clubs", "diamonds"])
        .build()
        .unwrap();
    let mut generator = Generator::seeded(grammar, 77);
    let drawn: HashSet<String> = (0..4)
        .map(|_| generator.evaluate_input("[suit]").unwrap())
        .collect();
    assert_eq!(drawn.len(), 4);
}

#[test]
fn test_scripted_rng_takes_first_rule() {
    let grammar = GrammarBuilder::new()
        .rules("x", &["first", "second"])
        .build()
        .unwrap();
    let mut generator = Generator::with_rng(grammar, StepRng::new(0, 0));
    assert_eq!(generator.evaluate_input("[x.mundane] [x.mundane]").unwrap(), "first first");
    assert_eq!(generator.evaluate_input("[1-9]").unwrap(), "1");
}

#[test]
fn test_json_grammar() {
    let grammar = Grammar::from_json(
        r#"{
            "hero": ["[name], the [title]"],
            "name": ["Ilsa"],
            "title": ["bold", "wise^3"]
        }"#,
    )
    .unwrap();
    let mut generator = Generator::seeded(grammar, 5);
    let hero = generator.evaluate_input("hero").unwrap();
    assert!(hero == "Ilsa, the bold" || hero == "Ilsa, the wise", "{hero}");

    let err = Grammar::from_json(r#"{"bad": ["[a-B]"]}"#).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
}

#[test]
fn test_check_reports_each_failure() {
    let grammar = GrammarBuilder::new()
        .rule("fine", "text")
        .rule("broken", "[ghost]")
        .rule("broken", "['x'.shout]")
        .build()
        .unwrap();
    let mut generator = Generator::seeded(grammar, 3);
    let failures = generator.check();
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0].rule.to_string(), "[ghost]");
    assert_eq!(failures[0].error.kind(), ErrorKind::Generation);
    assert_eq!(failures[1].error.to_string(), "Unknown modifier \"shout\"");
}

#[test]
fn test_shell_session() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("pets.mh"), "pet\n\tcat\n").unwrap();
    let grammar = GrammarBuilder::new().rule("greeting", "hi").build().unwrap();
    let mut shell = Shell::new(
        Generator::seeded(grammar, 4),
        FileLoader::for_grammar(dir.path().join("main.mh")),
    );

    let mut out = Vec::new();
    for line in [
        "/import pets",
        "/add owner [greeting], [pet] owner",
        "owner",
        "/list",
    ] {
        shell.execute(line, &mut out).unwrap();
    }
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "hi, cat owner\ngreeting\nowner\npet\n"
    );
}
