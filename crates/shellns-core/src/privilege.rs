//! Privilege elevation and shell quoting.
//!
//! The elevation tool only accepts a command *string* (`su -c "<line>"`), so
//! elevated invocations are the one place where an argv is flattened. All
//! flattening goes through [`quote_command`]; nothing else in the workspace
//! concatenates shell strings by hand.

use shellns_common::error::{Result, ShellnsError};

/// Quotes a single word for a POSIX shell.
///
/// # Errors
///
/// Returns [`ShellnsError::Invocation`] if the word contains a NUL byte.
pub fn quote(word: &str) -> Result<String> {
    shlex::try_quote(word)
        .map(std::borrow::Cow::into_owned)
        .map_err(|e| ShellnsError::Invocation {
            message: format!("cannot quote {word:?}: {e}"),
        })
}

/// Joins an argv into one shell command line, quoting every word.
///
/// # Errors
///
/// Returns [`ShellnsError::Invocation`] if any word contains a NUL byte.
pub fn quote_command<S: AsRef<str>>(argv: &[S]) -> Result<String> {
    shlex::try_join(argv.iter().map(AsRef::<str>::as_ref)).map_err(|e| ShellnsError::Invocation {
        message: format!("cannot quote command line: {e}"),
    })
}

/// Wraps an argv as `<su> -c "<quoted argv>"`.
///
/// # Errors
///
/// Returns [`ShellnsError::Invocation`] if the argv is empty or cannot be quoted.
pub fn elevate(su: &str, argv: &[String]) -> Result<Vec<String>> {
    if argv.is_empty() {
        return Err(ShellnsError::Invocation {
            message: "nothing to elevate".into(),
        });
    }
    let line = quote_command(argv)?;
    tracing::debug!(tool = su, %line, "elevating command");
    Ok(vec![su.to_owned(), "-c".to_owned(), line])
}
