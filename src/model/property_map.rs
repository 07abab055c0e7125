//! PropertyMap — the key-value store on nodes and relationships.

use std::collections::HashMap;

use super::Value;

/// A map of property names to primitive values.
pub type PropertyMap = HashMap<String, Value>;
