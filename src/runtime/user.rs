//! User interaction operations (confirmation prompts).

use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};

use super::RealRuntime;

/// Ask `prompt` on `output` and read a yes/no answer from `input`.
///
/// Anything other than `y`/`yes` (case-insensitive) declines, including end of input.
pub(crate) fn ask_confirmation<I: BufRead, O: Write>(
    prompt: &str,
    input: &mut I,
    output: &mut O,
) -> Result<bool> {
    write!(output, "{} [y/N] ", prompt)?;
    output.flush()?;

    let mut answer = String::new();
    let read = input
        .read_line(&mut answer)
        .context("Failed to read confirmation answer")?;
    if read == 0 {
        return Ok(false);
    }

    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

impl RealRuntime {
    pub(crate) fn confirm_impl(&self, prompt: &str) -> Result<bool> {
        let stdin = io::stdin();
        let mut input = stdin.lock();
        ask_confirmation(prompt, &mut input, &mut io::stdout())
    }
}

#[cfg(test)]
mod tests {
    use super::ask_confirmation;
    use std::io::Cursor;

    fn answer(input: &str) -> (bool, String) {
        let mut reader = Cursor::new(input.as_bytes());
        let mut output = Vec::new();
        let accepted =
            ask_confirmation("Continue with these actions?", &mut reader, &mut output).unwrap();
        (accepted, String::from_utf8(output).unwrap())
    }

    #[test]
    fn accepts_yes_answers() {
        for case in ["y\n", "Y\n", "yes\n", "  YES  \n"] {
            let (accepted, prompt) = answer(case);
            assert!(accepted, "expected {:?} to be accepted", case);
            assert_eq!(prompt, "Continue with these actions? [y/N] ");
        }
    }

    #[test]
    fn declines_everything_else() {
        for case in ["n\n", "no\n", "\n", "yep\n"] {
            let (accepted, _) = answer(case);
            assert!(!accepted, "expected {:?} to be declined", case);
        }
    }

    #[test]
    fn declines_on_end_of_input() {
        let (accepted, _) = answer("");
        assert!(!accepted);
    }
}
