use std::path::{Path, MAIN_SEPARATOR};

/// The one structured value passed through untouched
pub const EMPTY_OBJECT: &str = "{}";

/// Characters that corrupt JSON-ish values parsed by the game
fn is_forbidden(c: char) -> bool {
    matches!(c, '\r' | '\n' | '\t' | '{' | '}')
}

/// Strip control characters and braces from a resolved text value.
pub fn sanitize_text(value: &str) -> String {
    value.chars().filter(|c| !is_forbidden(*c)).collect()
}

/// Strip only control characters. For values made of paths, where braces are
/// legitimate file name characters.
pub fn strip_controls(value: &str) -> String {
    value.chars().filter(|c| !matches!(c, '\r' | '\n' | '\t')).collect()
}

/// Sanitize a path value and normalize its separators to the host's.
pub fn sanitize_path(path: &Path) -> String {
    sanitize_text(&path.to_string_lossy())
        .chars()
        .map(|c| if c == '/' || c == '\\' { MAIN_SEPARATOR } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_braces_and_control_characters() {
        assert_eq!(sanitize_text("Test{User}\n"), "TestUser");
        assert_eq!(sanitize_text("a\tb\r\nc"), "abc");
        assert_eq!(sanitize_text("plain"), "plain");
    }

    #[test]
    fn forbidden_characters_never_survive() {
        let inputs = [
            "{}",
            "{\"a\":1}",
            "\r\n\t",
            "}{",
            "name{with}\ttabs\nand{{nested}}",
            "ünï{cödé}\r",
        ];
        for input in inputs {
            let out = sanitize_text(input);
            assert!(
                !out.contains(['{', '}', '\r', '\n', '\t']),
                "{:?} -> {:?}",
                input,
                out
            );
        }
    }

    #[test]
    fn strip_controls_keeps_braces() {
        assert_eq!(strip_controls("libs/{shaded}/a.jar\n"), "libs/{shaded}/a.jar");
        assert_eq!(strip_controls("a.jar:\tb.jar\r"), "a.jar:b.jar");
    }

    #[test]
    fn normalizes_separators() {
        let expected = format!("games{0}instance{0}mods", MAIN_SEPARATOR);
        assert_eq!(sanitize_path(Path::new("games/instance\\mods")), expected);
        assert_eq!(
            sanitize_path(Path::new("dir{x}/file\n")),
            format!("dirx{}file", MAIN_SEPARATOR)
        );
    }
}
