//! Confirmation of destructive actions.

use std::io::{self, BufRead, Write};

use async_trait::async_trait;

use crate::error::{DeployError, Result};

/// The only answer that confirms.
pub const CONFIRMATION_WORD: &str = "yes";

/// Asks an operator to confirm a destructive action.
#[async_trait]
pub trait ConfirmationProvider: Send + Sync {
    /// Returns `true` only on an explicit confirmation.
    async fn confirm(&self, prompt: &str) -> Result<bool>;
}

/// Reads the answer from standard input.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinConfirmation;

#[async_trait]
impl ConfirmationProvider for StdinConfirmation {
    async fn confirm(&self, prompt: &str) -> Result<bool> {
        let prompt = prompt.to_string();
        let answer = tokio::task::spawn_blocking(move || -> io::Result<String> {
            let mut stderr = io::stderr().lock();
            write!(stderr, "{prompt}\nType '{CONFIRMATION_WORD}' to continue: ")?;
            stderr.flush()?;

            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            Ok(line)
        })
        .await
        .map_err(|e| DeployError::internal(format!("Confirmation prompt failed: {e}")))??;

        Ok(is_confirmation(&answer))
    }
}

/// Always answers the same way.
#[derive(Debug, Clone, Copy)]
pub struct FixedConfirmation(pub bool);

#[async_trait]
impl ConfirmationProvider for FixedConfirmation {
    async fn confirm(&self, _prompt: &str) -> Result<bool> {
        Ok(self.0)
    }
}

/// Whether an answer is the literal confirmation word.
#[must_use]
pub fn is_confirmation(answer: &str) -> bool {
    answer.trim() == CONFIRMATION_WORD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_literal_yes_confirms() {
        assert!(is_confirmation("yes"));
        assert!(is_confirmation("  yes\n"));
        assert!(!is_confirmation("y"));
        assert!(!is_confirmation("YES"));
        assert!(!is_confirmation("yes please"));
        assert!(!is_confirmation(""));
    }

    #[tokio::test]
    async fn test_fixed_confirmation() {
        assert!(FixedConfirmation(true).confirm("?").await.unwrap());
        assert!(!FixedConfirmation(false).confirm("?").await.unwrap());
    }
}
