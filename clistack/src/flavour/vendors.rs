//! Built-in flavours.
//!
//! Paging/width commands and prompt patterns are adapted from
//! [scrapli](https://github.com/carlmontanari/scrapli).

use std::sync::Arc;

use super::{CommandsInitializer, Flavour, PatternPromptResolver, UbiquitiInitializer};
use crate::error::Result;

pub const DEFAULT: &str = "default";
pub const UBIQUITI: &str = "ubiquiti";
pub const ARISTA_EOS: &str = "arista_eos";
pub const JUNIPER_JUNOS: &str = "juniper_junos";

/// JUNOS prints `{master:0}` above the prompt, so a per-line pattern is used
/// instead of the two-equal-lines probe.
pub const JUNOS_PROMPT_PATTERN: &str = r"^[\w\-@()/:.]{1,63}[>#%]$";

/// No handshake, default prompt resolution.
pub fn default() -> Flavour {
    Flavour::new(DEFAULT)
}

/// Ubiquiti EdgeSwitch.
pub fn ubiquiti() -> Flavour {
    Flavour::new(UBIQUITI).with_initializer(Arc::new(UbiquitiInitializer::new()))
}

/// Arista EOS.
pub fn arista_eos() -> Flavour {
    Flavour::new(ARISTA_EOS).with_initializer(Arc::new(CommandsInitializer::new([
        "terminal length 0",
        "terminal width 32767",
    ])))
}

/// Juniper JUNOS.
pub fn juniper_junos() -> Result<Flavour> {
    Ok(Flavour::new(JUNIPER_JUNOS)
        .with_initializer(Arc::new(CommandsInitializer::new([
            "set cli screen-length 0",
            "set cli screen-width 511",
        ])))
        .with_resolver(Arc::new(PatternPromptResolver::new(JUNOS_PROMPT_PATTERN)?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn test_names() {
        assert_eq!(default().name, "default");
        assert_eq!(ubiquiti().name, "ubiquiti");
        assert_eq!(arista_eos().name, "arista_eos");
        assert_eq!(juniper_junos().unwrap().name, "juniper_junos");
    }

    #[test]
    fn test_junos_prompt_pattern() {
        let pattern = Regex::new(JUNOS_PROMPT_PATTERN).unwrap();
        assert!(pattern.is_match("user@router>"));
        assert!(pattern.is_match("user@router#"));
        assert!(pattern.is_match("root@router:RE:0%"));
        assert!(!pattern.is_match("{master:0}"));
        assert!(!pattern.is_match("[edit]"));
    }
}
