//! ISO-10303-21 (STEP) product-structure reader.
//!
//! Only the assembly structure is read: products, their usages, the shape
//! type of each product's representation items and their styled colours.
//! B-rep geometry is not evaluated, so STEP nodes carry no [`Geometry`].
//!
//! [`Geometry`]: crate::model::Geometry

mod graph;
pub mod lexer;

use std::path::Path;

use rustc_hash::FxHashMap;

use super::document::Assembly;
use crate::util::{Error, Result};
use lexer::{parse_entity, Entity, EntityScanner};

/// Parse a STEP file into an assembly tree.
pub fn parse(path: impl AsRef<Path>) -> Result<Assembly> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| Error::parse(path, e.to_string()))?;
    // Non-ASCII outside escapes is not conforming; keep going with replacement characters.
    let text = String::from_utf8_lossy(&bytes);
    Ok(parse_str(&text, path)?.with_source(path))
}

/// Parse STEP text; `origin` only labels errors.
pub fn parse_str(text: &str, origin: impl AsRef<Path>) -> Result<Assembly> {
    let origin = origin.as_ref();
    if !text.trim_start().starts_with("ISO-10303-21") {
        return Err(Error::parse(origin, "missing ISO-10303-21 header"));
    }
    if !text.contains("DATA;") {
        return Err(Error::parse(origin, "missing DATA section"));
    }

    let entities = read_entities(text, origin)?;
    tracing::debug!(entities = entities.len(), origin = %origin.display(), "scanned STEP data");
    graph::build(&entities, origin)
}

fn read_entities(text: &str, origin: &Path) -> Result<FxHashMap<u32, Entity>> {
    let mut entities = FxHashMap::default();
    for instance in EntityScanner::new(text) {
        let entity = parse_entity(instance).map_err(|msg| Error::parse(origin, msg))?;
        let id = entity.id;
        if entities.insert(id, entity).is_some() {
            return Err(Error::parse(origin, format!("duplicate instance #{id}")));
        }
    }
    Ok(entities)
}
