//! PropertyMap: the key-value store on nodes and table rows.

use std::collections::HashMap;
use super::Value;

/// A map of attribute (or column) names to values.
pub type PropertyMap = HashMap<String, Value>;
