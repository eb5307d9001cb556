//! Command resolution integration tests
//! Run with: cargo test --test resolver_test

use ole_bot::application::errors::ResolverError;
use ole_bot::domain::entities::Command;
use ole_bot::domain::resolver::{levenshtein, CommandResolver, MAX_DISTANCE};

fn resolver(names: &[&str]) -> CommandResolver {
    CommandResolver::new(names.iter().copied().map(Command::new)).unwrap()
}

fn names(commands: &[Command]) -> Vec<&str> {
    commands.iter().map(Command::as_str).collect()
}

#[test]
fn test_every_known_command_resolves_to_itself() {
    let resolver = CommandResolver::builtin().unwrap();

    for command in Command::builtin() {
        let resolution = resolver.resolve(command.as_str());
        assert!(resolution.exact, "{} should resolve exactly", command);
        assert_eq!(resolution.command(), Some(&command));
    }
}

#[test]
fn test_fuzzy_candidates_are_close_or_extend_the_token() {
    let resolver = resolver(&["start", "stop", "status", "settings", "help"]);

    for token in ["sta", "stp", "setings", "hlp", "x", "statuses"] {
        let resolution = resolver.resolve(token);
        assert!(!resolution.exact);
        for candidate in &resolution.candidates {
            let name = candidate.as_str();
            assert!(
                levenshtein(token, name) < MAX_DISTANCE || name.starts_with(token),
                "{} is not a valid candidate for {}",
                name,
                token
            );
        }
    }
}

#[test]
fn test_no_qualifying_command_is_left_out() {
    let all = ["start", "stop", "status", "settings", "help"];
    let resolver = resolver(&all);

    let resolution = resolver.resolve("sto");
    let mut expected: Vec<&str> = all
        .iter()
        .copied()
        .filter(|name| levenshtein("sto", name) < MAX_DISTANCE || name.starts_with("sto"))
        .collect();
    let mut got = names(&resolution.candidates);
    expected.sort();
    got.sort();

    assert_eq!(got, expected);
}

#[test]
fn test_closest_candidates_come_first() {
    let resolver = CommandResolver::builtin().unwrap();
    assert_eq!(
        resolver.resolve("hlp").candidates.first().map(Command::as_str),
        Some("help")
    );

    let resolution = resolver.resolve("hepl");
    assert!(names(&resolution.candidates).contains(&"help"));
    let distances: Vec<usize> = resolution
        .candidates
        .iter()
        .map(|c| levenshtein("hepl", c.as_str()))
        .collect();
    assert!(distances.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_long_prefix_still_suggests() {
    let resolver = CommandResolver::builtin().unwrap();
    let resolution = resolver.resolve("gpt");

    assert!(!resolution.exact);
    assert_eq!(names(&resolution.candidates), vec!["gpt_message"]);
}

#[test]
fn test_empty_token_lists_everything() {
    let resolver = CommandResolver::builtin().unwrap();
    let resolution = resolver.resolve("");

    assert!(!resolution.exact);
    assert_eq!(resolution.candidates.len(), Command::builtin().len());
}

#[test]
fn test_unrelated_token_has_no_candidates() {
    let resolver = CommandResolver::builtin().unwrap();
    assert!(resolver.resolve("xyzzy").is_empty());
}

#[test]
fn test_matching_is_case_sensitive() {
    let resolver = CommandResolver::builtin().unwrap();
    let resolution = resolver.resolve("HELP");

    assert!(!resolution.exact);
    assert!(resolution.is_empty());
}

#[test]
fn test_invalid_command_sets_are_rejected() {
    assert_eq!(
        CommandResolver::new(Vec::<Command>::new()).err(),
        Some(ResolverError::EmptyCommandSet)
    );
    assert_eq!(
        CommandResolver::new(vec![Command::new("")]).err(),
        Some(ResolverError::EmptyName)
    );
    assert_eq!(
        CommandResolver::new(vec![Command::new("a"), Command::new("a")]).err(),
        Some(ResolverError::Duplicate("a".to_string()))
    );
}

#[test]
fn test_rebuild_swaps_the_whole_index() {
    let resolver = CommandResolver::builtin().unwrap();
    resolver.rebuild(vec![Command::new("ping")]).unwrap();

    assert!(resolver.resolve("ping").exact);
    assert!(!resolver.resolve("help").exact);

    assert!(resolver.rebuild(Vec::<Command>::new()).is_err());
    assert!(resolver.resolve("ping").exact);
}
