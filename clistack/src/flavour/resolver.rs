//! Prompt resolution strategies.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, trace};
use regex::Regex;

use super::PromptResolver;
use crate::error::{ChannelError, PlatformError, Result};
use crate::session::Session;

const INITIAL_READ_TIMEOUT: Duration = Duration::from_millis(100);
const MAX_ATTEMPTS: u32 = 8;

/// Non-empty, whitespace-trimmed lines of a probe read.
fn probe_lines(output: &str) -> Vec<&str> {
    output
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

/// Sends two blank lines and waits until the shell answers with the same
/// prompt twice.
///
/// A settled shell prints its prompt once per blank line. While output is
/// still trickling in (banners, MOTD) the read does not come back as two
/// equal lines, so the read window is doubled and the probe repeated.
#[derive(Debug, Clone)]
pub struct DefaultPromptResolver {
    initial_timeout: Duration,
    max_attempts: u32,
}

impl DefaultPromptResolver {
    pub fn new(initial_timeout: Duration, max_attempts: u32) -> Self {
        Self {
            initial_timeout,
            max_attempts,
        }
    }
}

impl Default for DefaultPromptResolver {
    fn default() -> Self {
        Self::new(INITIAL_READ_TIMEOUT, MAX_ATTEMPTS)
    }
}

#[async_trait]
impl PromptResolver for DefaultPromptResolver {
    async fn resolve_prompt(&self, session: &dyn Session) -> Result<String> {
        session.clear_buffer().await?;

        let mut timeout = self.initial_timeout;
        for attempt in 1..=self.max_attempts {
            session.write("\n\n").await?;
            let output = session.read(timeout).await?;
            let lines = probe_lines(&output);
            trace!("prompt probe {}: {:?}", attempt, lines);

            if let [first, second] = lines.as_slice() {
                if first == second {
                    debug!("resolved prompt {:?} after {} attempt(s)", first, attempt);
                    return Ok((*first).to_string());
                }
            }
            timeout *= 2;
        }

        Err(ChannelError::PromptNotResolved {
            attempts: self.max_attempts,
        }
        .into())
    }
}

/// Sends one blank line and takes the last line matching a prompt pattern.
///
/// For shells that print more than one line per prompt (e.g. a routing
/// engine banner above the prompt), where the two-equal-lines probe never
/// converges.
#[derive(Debug, Clone)]
pub struct PatternPromptResolver {
    pattern: Regex,
    initial_timeout: Duration,
    max_attempts: u32,
}

impl PatternPromptResolver {
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| PlatformError::InvalidDefinition {
            message: format!("invalid prompt pattern: {e}"),
        })?;
        Ok(Self {
            pattern,
            initial_timeout: INITIAL_READ_TIMEOUT,
            max_attempts: MAX_ATTEMPTS,
        })
    }

    pub fn with_timeouts(mut self, initial_timeout: Duration, max_attempts: u32) -> Self {
        self.initial_timeout = initial_timeout;
        self.max_attempts = max_attempts;
        self
    }

    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }
}

#[async_trait]
impl PromptResolver for PatternPromptResolver {
    async fn resolve_prompt(&self, session: &dyn Session) -> Result<String> {
        session.clear_buffer().await?;

        let mut timeout = self.initial_timeout;
        for attempt in 1..=self.max_attempts {
            session.write("\n").await?;
            let output = session.read(timeout).await?;
            let prompt = probe_lines(&output)
                .into_iter()
                .rev()
                .find(|line| self.pattern.is_match(line));

            if let Some(prompt) = prompt {
                debug!("matched prompt {:?} after {} attempt(s)", prompt, attempt);
                return Ok(prompt.to_string());
            }
            timeout *= 2;
        }

        Err(ChannelError::PromptNotResolved {
            attempts: self.max_attempts,
        }
        .into())
    }
}
