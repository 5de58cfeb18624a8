//! Provider schemas through `terraform providers schema -json`
use super::QueryError;
use crate::transform::{DecodeError, Fields};
use crate::value::{Field, Type};
use hcl::value::Map;
use hcl::Value;
use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSchemaQuery {
    /// e.g. `hashicorp/azurerm`
    pub provider_source: String,
    pub provider_version: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ProviderSchemaError {
    #[error("failed to prepare the terraform workspace")]
    Workspace(#[from] std::io::Error),
    #[error("`terraform {command}` failed: {stderr}")]
    Terraform { command: String, stderr: String },
    #[error("unexpected schema output")]
    Json(#[from] serde_json::Error),
    #[error("schema output has no provider matching `{0}`")]
    ProviderMissing(String),
}

impl ProviderSchemaQuery {
    pub(super) fn decode(fields: &Fields) -> Result<Self, DecodeError> {
        Ok(ProviderSchemaQuery {
            provider_source: fields.string("provider_source")?,
            provider_version: fields.string("provider_version")?,
        })
    }

    pub(super) fn execute(&self) -> Result<Value, QueryError> {
        self.schemas()
            .and_then(|schemas| convert_schemas(&schemas, &self.provider_source))
            .map_err(|source| QueryError::ProviderSchema {
                source_address: self.provider_source.clone(),
                version: self.provider_version.clone(),
                source,
            })
    }

    fn schemas(&self) -> Result<ProviderSchemas, ProviderSchemaError> {
        let workspace = tempfile::tempdir()?;
        std::fs::write(workspace.path().join("main.tf"), self.configuration())?;

        tracing::info!(provider = self.provider_source, version = self.provider_version, "reading provider schema");
        terraform(workspace.path(), &["init", "-input=false", "-no-color"])?;
        let output = terraform(workspace.path(), &["providers", "schema", "-json"])?;
        Ok(serde_json::from_slice(&output)?)
    }

    /// A configuration that requires only this provider
    fn configuration(&self) -> String {
        let local_name = self.provider_source.rsplit('/').next().unwrap_or(&self.provider_source);
        format!(
            "terraform {{\n  required_providers {{\n    {local_name} = {{\n      source  = {}\n      version = {}\n    }}\n  }}\n}}\n",
            crate::edit::quote(&self.provider_source),
            crate::edit::quote(&self.provider_version),
        )
    }
}

fn terraform(dir: &Path, args: &[&str]) -> Result<Vec<u8>, ProviderSchemaError> {
    tracing::debug!(?args, dir = %dir.display(), "running terraform");
    let output = Command::new("terraform").args(args).current_dir(dir).output()?;
    if !output.status.success() {
        return Err(ProviderSchemaError::Terraform {
            command: args.join(" "),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output.stdout)
}

#[derive(Debug, Deserialize)]
pub struct ProviderSchemas {
    #[serde(default)]
    pub provider_schemas: BTreeMap<String, ProviderSchema>,
}

#[derive(Debug, Deserialize)]
pub struct ProviderSchema {
    pub provider: Option<Schema>,
    #[serde(default)]
    pub resource_schemas: BTreeMap<String, Schema>,
    #[serde(default)]
    pub data_source_schemas: BTreeMap<String, Schema>,
}

#[derive(Debug, Deserialize)]
pub struct Schema {
    pub block: SchemaBlock,
}

#[derive(Debug, Default, Deserialize)]
pub struct SchemaBlock {
    #[serde(default)]
    pub attributes: IndexMap<String, SchemaAttribute>,
    #[serde(default)]
    pub block_types: IndexMap<String, SchemaBlockType>,
}

#[derive(Debug, Deserialize)]
pub struct SchemaAttribute {
    #[serde(rename = "type")]
    pub ty: Option<serde_json::Value>,
    pub nested_type: Option<NestedType>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub computed: bool,
}

#[derive(Debug, Deserialize)]
pub struct NestedType {
    #[serde(default)]
    pub attributes: IndexMap<String, SchemaAttribute>,
    #[serde(default = "single")]
    pub nesting_mode: String,
}

#[derive(Debug, Deserialize)]
pub struct SchemaBlockType {
    #[serde(default = "single")]
    pub nesting_mode: String,
    #[serde(default)]
    pub block: SchemaBlock,
}

fn single() -> String {
    "single".to_string()
}

/// `{ provider, resources, data_sources }`, every schema as `{ <field> = "<type>" }`
///
/// `source` matches the full registry address or its trailing `namespace/name`.
pub fn convert_schemas(schemas: &ProviderSchemas, source: &str) -> Result<Value, ProviderSchemaError> {
    let source = source.to_lowercase();
    let (_, schema) = schemas
        .provider_schemas
        .iter()
        .find(|(address, _)| {
            let address = address.to_lowercase();
            address == source || address.ends_with(&format!("/{source}"))
        })
        .ok_or_else(|| ProviderSchemaError::ProviderMissing(source.clone()))?;

    let provider = schema.provider.as_ref().map_or(Value::Null, |provider| schema_value(&provider.block));
    let convert_all = |schemas: &BTreeMap<String, Schema>| -> Value {
        Value::Object(
            schemas
                .iter()
                .map(|(name, schema)| (name.clone(), schema_value(&schema.block)))
                .collect(),
        )
    };

    let mut result = Map::new();
    result.insert("provider".to_string(), provider);
    result.insert("resources".to_string(), convert_all(&schema.resource_schemas));
    result.insert("data_sources".to_string(), convert_all(&schema.data_source_schemas));
    Ok(Value::Object(result))
}

fn schema_value(block: &SchemaBlock) -> Value {
    let Type::Object(fields) = block_type(block) else {
        return Value::Null;
    };
    Value::Object(
        fields
            .into_iter()
            .map(|(name, field)| (name, Value::String(field.ty.to_string())))
            .collect(),
    )
}

fn block_type(block: &SchemaBlock) -> Type {
    let mut fields = IndexMap::new();
    for (name, attribute) in &block.attributes {
        fields.insert(name.clone(), Field::new(attribute_type(attribute), attribute.optional || attribute.computed));
    }
    for (name, nested) in &block.block_types {
        let ty = nested_mode(&nested.nesting_mode, block_type(&nested.block));
        fields.insert(name.clone(), Field::new(ty, true));
    }
    Type::Object(fields)
}

fn attribute_type(attribute: &SchemaAttribute) -> Type {
    if let Some(nested) = &attribute.nested_type {
        let mut fields = IndexMap::new();
        for (name, attribute) in &nested.attributes {
            fields.insert(name.clone(), Field::new(attribute_type(attribute), attribute.optional || attribute.computed));
        }
        return nested_mode(&nested.nesting_mode, Type::Object(fields));
    }

    attribute
        .ty
        .as_ref()
        .and_then(Type::from_cty_json)
        .unwrap_or(Type::Dynamic)
}

fn nested_mode(nesting_mode: &str, element: Type) -> Type {
    match nesting_mode {
        "list" => Type::List(Box::new(element)),
        "set" => Type::Set(Box::new(element)),
        "map" => Type::Map(Box::new(element)),
        _ => element,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::value::At;
    use pretty_assertions::assert_eq;

    const SCHEMA: &str = r#"{
  "format_version": "1.0",
  "provider_schemas": {
    "registry.terraform.io/hashicorp/fake": {
      "provider": {
        "version": 0,
        "block": {
          "attributes": {
            "features": { "type": ["map", "string"], "optional": true }
          }
        }
      },
      "resource_schemas": {
        "fake_resource": {
          "version": 0,
          "block": {
            "attributes": {
              "id": { "type": "string", "computed": true },
              "name": { "type": "string", "required": true },
              "settings": {
                "nested_type": {
                  "attributes": {
                    "enabled": { "type": "bool", "required": true }
                  },
                  "nesting_mode": "list"
                },
                "optional": true
              }
            },
            "block_types": {
              "identity": {
                "nesting_mode": "list",
                "block": {
                  "attributes": {
                    "type": { "type": "string", "required": true },
                    "identity_ids": { "type": ["set", "string"], "optional": true }
                  }
                },
                "max_items": 1
              }
            }
          }
        }
      },
      "data_source_schemas": {
        "fake_data": {
          "version": 0,
          "block": {
            "attributes": {
              "tags": { "type": ["object", { "a": "string", "b": "number" }, ["b"]], "optional": true }
            }
          }
        }
      }
    }
  }
}"#;

    fn schemas() -> ProviderSchemas {
        serde_json::from_str(SCHEMA).unwrap()
    }

    #[test]
    fn converts_types_recursively() {
        let value = convert_schemas(&schemas(), "hashicorp/fake").unwrap();

        assert_eq!(value.at("provider").at("features"), Value::from("map(string)"));

        let resource = value.at("resources").at("fake_resource");
        assert_eq!(resource.at("id"), Value::from("string"));
        assert_eq!(resource.at("settings"), Value::from("list(object({enabled = bool}))"));
        assert_eq!(
            resource.at("identity"),
            Value::from("list(object({type = string, identity_ids = optional(set(string))}))")
        );

        assert_eq!(
            value.at("data_sources").at("fake_data").at("tags"),
            Value::from("object({a = string, b = optional(number)})")
        );
    }

    #[test]
    fn full_address_matches() {
        assert!(convert_schemas(&schemas(), "registry.terraform.io/hashicorp/fake").is_ok());
        assert!(matches!(
            convert_schemas(&schemas(), "hashicorp/other"),
            Err(ProviderSchemaError::ProviderMissing(_))
        ));
    }

    #[test]
    fn configuration_requires_the_provider() {
        let query = ProviderSchemaQuery {
            provider_source: "hashicorp/fake".to_string(),
            provider_version: "~> 1.0".to_string(),
        };
        insta::assert_snapshot!(query.configuration(), @r#"
        terraform {
          required_providers {
            fake = {
              source  = "hashicorp/fake"
              version = "~> 1.0"
            }
          }
        }
        "#);
    }
}
