//! Interactive input. Commands ask a [`ValueSource`] for anything missing from
//! the command line; the store engine only ever sees resolved values.

use anyhow::{anyhow, bail, Result};
use std::io::{self, BufRead, Write};
use zeroize::Zeroizing;

const MAX_ATTEMPTS: usize = 3;

pub trait ValueSource {
    /// One line of visible input, without the trailing newline.
    fn read_line(&mut self, prompt: &str) -> Result<String>;

    /// One line of input read without echo.
    fn read_hidden(&mut self, prompt: &str) -> Result<Zeroizing<String>>;
}

pub struct TerminalSource;

impl ValueSource for TerminalSource {
    fn read_line(&mut self, prompt: &str) -> Result<String> {
        let mut stderr = io::stderr();
        write!(stderr, "{prompt}")?;
        stderr.flush()?;
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            bail!("no input available for '{}'", prompt.trim_end_matches([':', ' ']));
        }
        let trimmed = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(trimmed);
        Ok(line)
    }

    fn read_hidden(&mut self, prompt: &str) -> Result<Zeroizing<String>> {
        rpassword::prompt_password(prompt)
            .map(Zeroizing::new)
            .map_err(|e| anyhow!("password prompt: {e}"))
    }
}

/// How a single value is asked for.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ask {
    pub hidden: bool,
    pub required: bool,
}

impl Ask {
    pub fn visible() -> Self {
        Self::default()
    }

    pub fn secret() -> Self {
        Self {
            hidden: true,
            required: true,
        }
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }
}

/// Ask for `label`. Hidden values are typed twice and must agree; required
/// values are asked again while empty.
pub fn ask(source: &mut dyn ValueSource, label: &str, how: Ask) -> Result<Zeroizing<String>> {
    for _ in 0..MAX_ATTEMPTS {
        let value = if how.hidden {
            let first = source.read_hidden(&format!("{label}: "))?;
            let again = source.read_hidden(&format!("{label} again: "))?;
            if *first != *again {
                eprintln!("Values do not match, please insert the field again");
                continue;
            }
            first
        } else {
            Zeroizing::new(source.read_line(&format!("{label}: "))?)
        };
        if how.required && value.is_empty() {
            eprintln!("{label} cannot be empty");
            continue;
        }
        return Ok(value);
    }
    bail!("no valid value given for '{label}'")
}

/// Passphrase for opening an existing store: asked once, never echoed.
pub fn ask_key(source: &mut dyn ValueSource, label: &str) -> Result<Zeroizing<String>> {
    let key = source.read_hidden(&format!("{label}: "))?;
    if key.is_empty() {
        bail!("{label} cannot be empty");
    }
    Ok(key)
}

#[cfg(test)]
pub mod scripted {
    use super::*;
    use std::collections::VecDeque;

    /// Replays canned answers and records the prompts it was shown.
    #[derive(Default)]
    pub struct ScriptedSource {
        answers: VecDeque<String>,
        pub prompts: Vec<String>,
    }

    impl ScriptedSource {
        pub fn new<I, S>(answers: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                answers: answers.into_iter().map(Into::into).collect(),
                prompts: Vec::new(),
            }
        }

        fn next(&mut self, prompt: &str) -> Result<String> {
            self.prompts.push(prompt.to_string());
            self.answers
                .pop_front()
                .ok_or_else(|| anyhow!("unexpected prompt '{prompt}'"))
        }
    }

    impl ValueSource for ScriptedSource {
        fn read_line(&mut self, prompt: &str) -> Result<String> {
            self.next(prompt)
        }

        fn read_hidden(&mut self, prompt: &str) -> Result<Zeroizing<String>> {
            self.next(prompt).map(Zeroizing::new)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::scripted::ScriptedSource;
    use super::*;

    #[test]
    fn hidden_values_must_be_confirmed() {
        let mut source = ScriptedSource::new(["one", "two", "pw", "pw"]);
        let value = ask(&mut source, "Password", Ask::secret()).unwrap();
        assert_eq!(value.as_str(), "pw");
        assert_eq!(
            source.prompts,
            ["Password: ", "Password again: ", "Password: ", "Password again: "]
        );
    }

    #[test]
    fn required_values_are_asked_until_given() {
        let mut source = ScriptedSource::new(["", "Megavideo"]);
        let value = ask(&mut source, "Site", Ask::visible().required(true)).unwrap();
        assert_eq!(value.as_str(), "Megavideo");

        let mut source = ScriptedSource::new([""]);
        let value = ask(&mut source, "Other", Ask::visible()).unwrap();
        assert!(value.is_empty());
    }

    #[test]
    fn gives_up_after_repeated_bad_input() {
        let mut source = ScriptedSource::new(["", "", ""]);
        assert!(ask(&mut source, "Site", Ask::visible().required(true)).is_err());
    }
}
