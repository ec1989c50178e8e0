// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! User interaction seam.
//!
//! Mync never talks to the terminal directly from its core logic. Instead,
//! every yes/no question and every status message flows through a
//! [`Console`]. The binary provides an interactive implementation, while tests
//! provide scripted ones.

use indicatif::ProgressBar;
use inquire::{Confirm, InquireError, Text};
use tracing::{error, info, warn};

/// Answer to a confirmation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// User agreed to continue.
    Proceed,

    /// User refused, or gave no answer.
    Decline,
}

impl Confirmation {
    /// User agreed to continue.
    pub fn is_proceed(self) -> bool {
        matches!(self, Self::Proceed)
    }
}

impl From<bool> for Confirmation {
    fn from(answer: bool) -> Self {
        if answer {
            Self::Proceed
        } else {
            Self::Decline
        }
    }
}

/// Severity of status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Log,
    Warning,
    Error,
    Success,
}

/// Terminal interaction capability.
pub trait Console {
    /// Ask user a yes/no question.
    ///
    /// # Errors
    ///
    /// - Return [`Canceled`] if user aborted the prompt itself.
    fn confirm(&self, message: &str) -> Result<Confirmation, Canceled>;

    /// Ask user for free form text, offering a default answer.
    ///
    /// # Errors
    ///
    /// - Return [`Canceled`] if user aborted the prompt itself.
    fn ask(&self, message: &str, default: &str) -> Result<String, Canceled>;

    /// Fire-and-forget status message.
    fn report(&self, level: Level, message: &str);

    /// Hint about the unit of work currently being processed.
    fn step(&self, _message: &str) {}
}

impl<C> Console for &C
where
    C: Console + ?Sized,
{
    fn confirm(&self, message: &str) -> Result<Confirmation, Canceled> {
        (**self).confirm(message)
    }

    fn ask(&self, message: &str, default: &str) -> Result<String, Canceled> {
        (**self).ask(message, default)
    }

    fn report(&self, level: Level, message: &str) {
        (**self).report(level, message)
    }

    fn step(&self, message: &str) {
        (**self).step(message)
    }
}

/// Parse answer to yes/no prompt.
///
/// Accepts "y", "yes", "n", and "no" in any letter case. Returns `None` for
/// anything else.
pub fn parse_answer(answer: &str) -> Option<bool> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

/// Interactive console on a terminal.
///
/// Status messages and prompts are printed while the progress spinner is
/// suspended, so they never get drawn over.
#[derive(Debug, Clone)]
pub struct IndicatifConsole {
    bar: ProgressBar,
}

impl IndicatifConsole {
    /// Construct new console over progress spinner.
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }

    /// Progress spinner of this console.
    pub fn bar(&self) -> &ProgressBar {
        &self.bar
    }
}

impl Console for IndicatifConsole {
    fn confirm(&self, message: &str) -> Result<Confirmation, Canceled> {
        let parser = |answer: &str| parse_answer(answer).ok_or(());
        self.bar.suspend(|| {
            let answer = Confirm::new(message)
                .with_default(false)
                .with_parser(&parser)
                .with_error_message("Type yes or no")
                .prompt();
            match answer {
                Ok(answer) => Ok(answer.into()),
                Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => {
                    Err(Canceled)
                }
                Err(err) => {
                    warn!("cannot prompt, assuming no: {err}");
                    Ok(Confirmation::Decline)
                }
            }
        })
    }

    // No terminal to ask on counts as canceled, there is no safe guess.
    fn ask(&self, message: &str, default: &str) -> Result<String, Canceled> {
        self.bar.suspend(|| {
            let mut prompt = Text::new(message);
            if !default.is_empty() {
                prompt = prompt.with_default(default);
            }
            match prompt.prompt() {
                Ok(answer) => Ok(answer),
                Err(err) => {
                    warn!("cannot prompt for {message:?}: {err}");
                    Err(Canceled)
                }
            }
        })
    }

    fn report(&self, level: Level, message: &str) {
        self.bar.suspend(|| match level {
            Level::Log | Level::Success => info!("{message}"),
            Level::Warning => warn!("{message}"),
            Level::Error => error!("{message}"),
        });
    }

    fn step(&self, message: &str) {
        self.bar.set_message(message.to_string());
        self.bar.tick();
    }
}

/// User aborted an interactive prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("operation canceled by user")]
pub struct Canceled;
