//! Quoting of arguments composed into a single interpreter command string.

use crate::runner::Flavor;

/// Quote one argument for the given interpreter.
///
/// Plain words (letters, digits and a per-interpreter set of punctuation)
/// pass through unchanged.
pub fn quote(flavor: Flavor, arg: &str) -> String {
    if !arg.is_empty() && arg.chars().all(|c| is_plain(flavor, c)) {
        return arg.to_string();
    }
    match flavor {
        // '...' is literal in sh; close, emit \', reopen for embedded quotes.
        Flavor::Sh => format!("'{}'", arg.replace('\'', r"'\''")),
        // PowerShell single-quoted strings escape ' by doubling it.
        Flavor::PowerShell => format!("'{}'", arg.replace('\'', "''")),
    }
}

/// Join arguments into one command line, quoting each as needed.
pub fn join<S: AsRef<str>>(flavor: Flavor, args: &[S]) -> String {
    args.iter()
        .map(|a| quote(flavor, a.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_plain(flavor: Flavor, c: char) -> bool {
    let punct = match flavor {
        Flavor::Sh => "-_./:=@,+%",
        // `,` builds arrays and `@` splats in PowerShell.
        Flavor::PowerShell => "-_./:=+%",
    };
    c.is_ascii_alphanumeric() || punct.contains(c)
}
