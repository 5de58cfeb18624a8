use crate::block::{BlockKind, RootBlock};
use crate::context::block_value;
use crate::module::Module;
use crate::transform::{DecodeError, Fields};
use hcl::value::Map;
use hcl::Value;

/// `data "resource"` and `data "data"`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BlockQuery {
    /// Only blocks of this type, all if `None`
    pub block_type: Option<String>,
    /// Only blocks with `count`
    pub use_count: bool,
    /// Only blocks with `for_each`
    pub use_for_each: bool,
}

impl BlockQuery {
    pub(super) fn decode(fields: &Fields, type_field: &str) -> Result<Self, DecodeError> {
        Ok(BlockQuery {
            block_type: fields.optional_string(type_field)?,
            use_count: fields.bool_or("use_count", false)?,
            use_for_each: fields.bool_or("use_for_each", false)?,
        })
    }

    fn matches(&self, block: &RootBlock) -> bool {
        if let Some(block_type) = &self.block_type {
            if block.block_type() != Some(block_type.as_str()) {
                return false;
            }
        }
        (!self.use_count || block.count.is_some()) && (!self.use_for_each || block.for_each.is_some())
    }

    /// `{ <type> = { <name> = <block> } }`
    pub fn execute(&self, module: &Module, kind: BlockKind) -> Value {
        let mut result: Map<String, Value> = Map::new();
        for block in module.blocks_of_kind(kind) {
            if !self.matches(&block) {
                continue;
            }
            let (Some(block_type), Some(name)) = (block.block_type(), block.name()) else {
                continue;
            };
            let by_name = result
                .entry(block_type.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(by_name) = by_name {
                by_name.insert(name.to_string(), block_value(&block));
            }
        }
        Value::Object(result)
    }
}

/// `data "variable"`, `data "output"` and `data "local"`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NamedQuery {
    pub name: Option<String>,
}

impl NamedQuery {
    pub(super) fn decode(fields: &Fields) -> Result<Self, DecodeError> {
        Ok(NamedQuery {
            name: fields.optional_string("name")?,
        })
    }

    /// `{ <name> = <block> }`
    pub fn execute(&self, module: &Module, kind: BlockKind) -> Value {
        let result = module
            .blocks_of_kind(kind)
            .iter()
            .filter_map(|block| Some((block.name()?.to_string(), block)))
            .filter(|(name, _)| self.name.as_ref().map_or(true, |wanted| wanted == name))
            .map(|(name, block)| (name, block_value(block)))
            .collect();
        Value::Object(result)
    }
}

/// `{ <name> = <module call> }`, optionally only calls of `source`
pub(super) fn modules(module: &Module, source: Option<&str>) -> Value {
    let result = module
        .blocks_of_kind(BlockKind::Module)
        .iter()
        .filter(|block| source.map_or(true, |source| module_source(block).as_deref() == Some(source)))
        .filter_map(|block| Some((block.name()?.to_string(), block_value(block))))
        .collect();
    Value::Object(result)
}

/// `source` of a module call, unquoted if it is a plain string
fn module_source(block: &RootBlock) -> Option<String> {
    let attribute = block.attributes.get("source")?;
    match attribute.expression() {
        hcl::Expression::String(source) => Some(source.clone()),
        _ => Some(attribute.source()),
    }
}

/// The first `terraform` block, `null` if there is none
pub(super) fn terraform(module: &Module) -> Value {
    module
        .blocks_of_kind(BlockKind::Terraform)
        .first()
        .map_or(Value::Null, block_value)
}
