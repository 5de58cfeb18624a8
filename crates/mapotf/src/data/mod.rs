//! Read-only queries over a [Module]
//!
//! A `data "<type>" "<name>"` block evaluates to an object with the block's own (evaluated) attributes and a
//! `result` attribute holding what the query found.
mod blocks;
mod provider_schema;

pub use blocks::{BlockQuery, NamedQuery};
pub use provider_schema::{convert_schemas, ProviderSchemaError, ProviderSchemaQuery, ProviderSchemas};

use crate::block::BlockKind;
use crate::eval;
use crate::module::Module;
use crate::transform::{DecodeError, Fields};
use hcl::eval::Context;
use hcl::value::Map;
use hcl::Value;
use hcl_edit::structure::Body;

/// Attributes of a data block that are not exposed as inputs
const RESERVED: &[&str] = &["for_each", "depends_on"];

#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Resource(BlockQuery),
    Data(BlockQuery),
    Module { module_source: Option<String> },
    Terraform,
    Variable(NamedQuery),
    Output(NamedQuery),
    Local(NamedQuery),
    ProviderSchema(ProviderSchemaQuery),
}

#[derive(thiserror::Error, Debug)]
pub enum QueryError {
    #[error("unknown data type `{0}`")]
    UnknownType(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("failed to read schema of provider {source_address} {version}")]
    ProviderSchema {
        source_address: String,
        version: String,
        #[source]
        source: ProviderSchemaError,
    },
}

impl Query {
    pub fn decode(query_type: &str, body: &Body, context: &Context) -> Result<Self, QueryError> {
        let fields = Fields::new(query_type, body, context);
        Ok(match query_type {
            "resource" => Query::Resource(BlockQuery::decode(&fields, "resource_type")?),
            "data" => Query::Data(BlockQuery::decode(&fields, "data_source_type")?),
            "module" => Query::Module {
                module_source: fields.optional_string("module_source")?,
            },
            "terraform" => Query::Terraform,
            "variable" => Query::Variable(NamedQuery::decode(&fields)?),
            "output" => Query::Output(NamedQuery::decode(&fields)?),
            "local" => Query::Local(NamedQuery::decode(&fields)?),
            "provider_schema" => Query::ProviderSchema(ProviderSchemaQuery::decode(&fields)?),
            other => return Err(QueryError::UnknownType(other.to_string())),
        })
    }

    /// Value of `result`
    pub fn execute(&self, module: &Module) -> Result<Value, QueryError> {
        Ok(match self {
            Query::Resource(query) => query.execute(module, BlockKind::Resource),
            Query::Data(query) => query.execute(module, BlockKind::Data),
            Query::Module { module_source } => blocks::modules(module, module_source.as_deref()),
            Query::Terraform => blocks::terraform(module),
            Query::Variable(query) => query.execute(module, BlockKind::Variable),
            Query::Output(query) => query.execute(module, BlockKind::Output),
            Query::Local(query) => query.execute(module, BlockKind::Local),
            Query::ProviderSchema(query) => query.execute()?,
        })
    }
}

/// Evaluates a data block: its attributes plus `result`
#[tracing::instrument(skip(body, context, module))]
pub fn evaluate(query_type: &str, body: &Body, context: &Context, module: &Module) -> Result<Value, QueryError> {
    let query = Query::decode(query_type, body, context)?;

    let mut object = Map::new();
    for attribute in body.attributes() {
        let name = attribute.key.as_str();
        if RESERVED.contains(&name) {
            continue;
        }
        let expression: hcl::Expression = attribute.value.clone().into();
        let value = eval::evaluate(&expression, context).map_err(DecodeError::from)?;
        object.insert(name.to_string(), value);
    }

    let result = query.execute(module)?;
    tracing::debug!(query_type, "query executed");
    object.insert("result".to_string(), result);
    Ok(Value::Object(object))
}
