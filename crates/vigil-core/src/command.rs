//! Command-line tokenization for stored daemon commands.
//!
//! Stored commands are split into argv with POSIX shell quoting rules:
//! whitespace separates tokens, single quotes preserve literally, double
//! quotes allow backslash escapes. Nothing is expanded; quoting only
//! controls token boundaries.

/// Errors from tokenizing a stored command line.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The command contains an unmatched quote.
    #[error("invalid command quoting: {0}")]
    Parse(#[from] shell_words::ParseError),

    /// The command produced no tokens.
    #[error("empty command")]
    Empty,
}

/// Splits `cmd` into argv.
///
/// # Errors
///
/// Returns [`CommandError::Parse`] for unmatched quotes and
/// [`CommandError::Empty`] when nothing remains after splitting.
pub fn split_command(cmd: &str) -> Result<Vec<String>, CommandError> {
    let argv = shell_words::split(cmd)?;
    if argv.is_empty() {
        return Err(CommandError::Empty);
    }
    Ok(argv)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_on_whitespace() {
        assert_eq!(
            split_command("python3 -m http.server 8000").unwrap(),
            vec!["python3", "-m", "http.server", "8000"]
        );
    }

    #[test]
    fn test_single_quotes_preserve_literally() {
        assert_eq!(
            split_command("sh -c 'echo $HOME > out'").unwrap(),
            vec!["sh", "-c", "echo $HOME > out"]
        );
    }

    #[test]
    fn test_double_quotes_allow_escapes() {
        assert_eq!(
            split_command(r#"echo "a \"quoted\" word""#).unwrap(),
            vec!["echo", r#"a "quoted" word"#]
        );
    }

    #[test]
    fn test_unmatched_quote_is_error() {
        assert!(matches!(
            split_command("sh -c 'oops"),
            Err(CommandError::Parse(_))
        ));
    }

    #[test]
    fn test_empty_command_is_error() {
        assert!(matches!(split_command(""), Err(CommandError::Empty)));
        assert!(matches!(split_command("   "), Err(CommandError::Empty)));
    }
}
