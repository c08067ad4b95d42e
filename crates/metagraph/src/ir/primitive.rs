use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::value::Value;

pub const MAKE_TUPLE: &str = "MakeTuple";
pub const MAKE_LIST: &str = "make_list";
pub const TUPLE_GETITEM: &str = "TupleGetItem";
pub const LIST_GETITEM: &str = "list_getitem";
pub const SWITCH_LAYER: &str = "switch_layer";
pub const PARTIAL: &str = "Partial";
pub const ENVIRON_CREATE: &str = "EnvironCreate";
pub const ENV_GET: &str = "env_get";
pub const ONES_LIKE: &str = "ones_like";
pub const J: &str = "J";
pub const VMAP: &str = "vmap";
pub const TAYLOR: &str = "Taylor";
pub const SHARD: &str = "Shard";

/// Attribute marking primitives whose backward rule produces a sparse result.
pub const ATTR_BPROP_RETURN_SPARSE: &str = "bprop_return_sparse";
/// Attribute marking primitives that propagate side effects of their operands.
pub const ATTR_SIDE_EFFECT_PROPAGATE: &str = "side_effect_propagate";

/// Named reference to an operator. The engine never evaluates primitives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Primitive {
    name: String,
    #[serde(default)]
    attrs: BTreeMap<String, Value>,
}

impl Primitive {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attrs.insert(key.into(), value.into());
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attrs.get(key)
    }

    pub fn attrs(&self) -> &BTreeMap<String, Value> {
        &self.attrs
    }

    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    /// Whether the backward rule of this primitive returns a sparse result.
    pub fn bprop_return_sparse(&self) -> bool {
        matches!(self.attr(ATTR_BPROP_RETURN_SPARSE), Some(Value::Bool(true)))
    }

    pub fn make_tuple() -> Self {
        Self::new(MAKE_TUPLE)
    }

    pub fn make_list() -> Self {
        Self::new(MAKE_LIST)
    }

    pub fn tuple_getitem() -> Self {
        Self::new(TUPLE_GETITEM)
    }

    pub fn list_getitem() -> Self {
        Self::new(LIST_GETITEM)
    }

    pub fn switch_layer() -> Self {
        Self::new(SWITCH_LAYER)
    }

    pub fn partial() -> Self {
        Self::new(PARTIAL)
    }

    pub fn environ_create() -> Self {
        Self::new(ENVIRON_CREATE)
    }

    pub fn env_get() -> Self {
        Self::new(ENV_GET)
    }

    pub fn ones_like() -> Self {
        Self::new(ONES_LIKE)
    }

    pub fn j() -> Self {
        Self::new(J)
    }

    pub fn taylor() -> Self {
        Self::new(TAYLOR)
    }

    pub fn shard() -> Self {
        Self::new(SHARD)
    }

    /// A fresh `vmap` marker; axis attributes are attached by the vmap generator.
    pub fn vmap() -> Self {
        Self::new(VMAP).with_attr(ATTR_SIDE_EFFECT_PROPAGATE, true)
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "prim::{}", self.name)?;
        if !self.attrs.is_empty() {
            let attrs = self
                .attrs
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, "{{{attrs}}}")?;
        }
        Ok(())
    }
}
