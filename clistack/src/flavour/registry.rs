//! Registry for looking up flavours by name.

use indexmap::IndexMap;

use super::{Flavour, vendors};
use crate::error::{PlatformError, Result};

/// Name → [`Flavour`] table.
///
/// Owned and passed around explicitly; there is no process-wide instance.
#[derive(Debug, Clone, Default)]
pub struct FlavourRegistry {
    flavours: IndexMap<String, Flavour>,
}

impl FlavourRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in flavours.
    pub fn with_builtins() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(vendors::default())?;
        registry.register(vendors::ubiquiti())?;
        registry.register(vendors::arista_eos())?;
        registry.register(vendors::juniper_junos()?)?;
        Ok(registry)
    }

    /// Register a flavour. Names must be unique.
    pub fn register(&mut self, flavour: Flavour) -> Result<()> {
        if self.flavours.contains_key(&flavour.name) {
            return Err(PlatformError::AlreadyRegistered {
                name: flavour.name.clone(),
            }
            .into());
        }
        self.flavours.insert(flavour.name.clone(), flavour);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Flavour> {
        self.flavours.get(name)
    }

    /// Look up a flavour; `None` selects "default".
    pub fn resolve(&self, name: Option<&str>) -> Result<Flavour> {
        let name = name.unwrap_or(vendors::DEFAULT);
        self.get(name)
            .cloned()
            .ok_or_else(|| PlatformError::UnknownFlavour {
                name: name.to_string(),
            })
            .map_err(Into::into)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.flavours.contains_key(name)
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.flavours.keys().map(String::as_str)
    }
}
