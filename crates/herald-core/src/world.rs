//! World resolution adapters.
//!
//! Different simulation hosts describe worlds differently. A single
//! [`WorldResolver`] is chosen when the correlator is built; it is never
//! probed per call.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ContextError;

/// A world the herald knows how to announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Overworld,
    Nether,
    End,
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dimension::Overworld => "Overworld",
            Dimension::Nether => "Nether",
            Dimension::End => "End",
        };
        f.write_str(name)
    }
}

/// Maps a raw world descriptor to a [`Dimension`].
pub trait WorldResolver: Send + Sync {
    fn resolve_world(&self, descriptor: &str) -> Result<Dimension, ContextError>;
}

/// Resolver for namespaced dimension keys such as `minecraft:the_nether`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DimensionKeyResolver;

impl WorldResolver for DimensionKeyResolver {
    fn resolve_world(&self, descriptor: &str) -> Result<Dimension, ContextError> {
        let key = descriptor.to_ascii_lowercase();
        if key.contains("overworld") {
            Ok(Dimension::Overworld)
        } else if key.contains("the_nether") {
            Ok(Dimension::Nether)
        } else if key.contains("the_end") {
            Ok(Dimension::End)
        } else {
            Err(ContextError::UnknownWorld(descriptor.to_string()))
        }
    }
}

/// Resolver for hosts that already report plain names ("Nether", "end").
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainNameResolver;

impl WorldResolver for PlainNameResolver {
    fn resolve_world(&self, descriptor: &str) -> Result<Dimension, ContextError> {
        match descriptor.trim().to_ascii_lowercase().as_str() {
            "overworld" => Ok(Dimension::Overworld),
            "nether" => Ok(Dimension::Nether),
            "end" => Ok(Dimension::End),
            _ => Err(ContextError::UnknownWorld(descriptor.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_keys_resolve() {
        let r = DimensionKeyResolver;
        assert_eq!(
            r.resolve_world("ResourceKey[minecraft:dimension / minecraft:overworld]")
                .unwrap(),
            Dimension::Overworld
        );
        assert_eq!(r.resolve_world("minecraft:the_nether").unwrap(), Dimension::Nether);
        assert_eq!(r.resolve_world("minecraft:the_end").unwrap(), Dimension::End);
    }

    #[test]
    fn custom_dimension_is_rejected() {
        let err = DimensionKeyResolver
            .resolve_world("mymod:sky_islands")
            .unwrap_err();
        assert!(matches!(err, ContextError::UnknownWorld(_)));
    }

    #[test]
    fn plain_names_resolve() {
        assert_eq!(PlainNameResolver.resolve_world(" End ").unwrap(), Dimension::End);
        assert!(PlainNameResolver.resolve_world("minecraft:the_end").is_err());
    }
}
