//! Values of Terraform blocks as seen by the DSL
//!
//! Terraform attributes are not evaluated, every attribute is exposed as the string of its source text. Nested
//! blocks become lists of objects and every root block carries an `mptf` object with its provenance.
use crate::block::{Attribute, NestedBlock, NestedBlocks, RootBlock};
use crate::value::list_of_object;
use hcl::value::Map;
use hcl::Value;
use indexmap::IndexMap;

/// Object value of a root block
pub fn block_value(block: &RootBlock) -> Value {
    let mut object = match block.local_value() {
        Some(value) => Map::from_iter([("value".to_string(), attribute_value(value))]),
        None => body_value(&block.attributes, &block.nested_blocks),
    };
    object.insert("mptf".to_string(), metadata(block));
    Value::Object(object)
}

fn attribute_value(attribute: &Attribute) -> Value {
    Value::String(attribute.source())
}

fn body_value(attributes: &IndexMap<String, Attribute>, nested_blocks: &NestedBlocks) -> Map<String, Value> {
    let mut object: Map<String, Value> = attributes
        .iter()
        .map(|(name, attribute)| (name.clone(), attribute_value(attribute)))
        .collect();

    for (block_type, siblings) in nested_blocks {
        let values = siblings.iter().map(nested_block_value).collect();
        object.insert(block_type.clone(), list_of_object(values));
    }

    object
}

fn nested_block_value(block: &NestedBlock) -> Value {
    Value::Object(body_value(&block.attributes, &block.nested_blocks))
}

/// The `mptf` object of a root block
pub fn metadata(block: &RootBlock) -> Value {
    let module = &block.module;
    let range = &block.range;

    let labels = block.labels.iter().cloned().map(Value::String).collect();

    let mut object = Map::new();
    object.insert("block_address".into(), block.address.clone().into());
    object.insert("terraform_address".into(), block.terraform_address().into());
    object.insert("block_type".into(), block.kind.as_str().into());
    object.insert("block_labels".into(), Value::Array(labels));
    object.insert(
        "range".into(),
        Value::Object(Map::from_iter([
            ("file_name".to_string(), range.file_name.clone().into()),
            ("start_line".to_string(), range.start_line.into()),
            ("start_column".to_string(), range.start_column.into()),
            ("end_line".to_string(), range.end_line.into()),
            ("end_column".to_string(), range.end_column.into()),
        ])),
    );
    object.insert(
        "module".into(),
        Value::Object(Map::from_iter([
            ("key".to_string(), module.key.clone().into()),
            ("source".to_string(), module.source.clone().into()),
            ("version".to_string(), module.version.clone().into()),
            ("dir".to_string(), module.dir.clone().into()),
            ("abs_dir".to_string(), module.abs_dir.display().to_string().into()),
        ])),
    );
    Value::Object(object)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::block::test::root_block;
    use crate::value::At;
    use pretty_assertions::assert_eq;

    #[test]
    fn attributes_are_source_strings() {
        let block = root_block(
            r#"resource "fake_resource" "this" {
  count = 2
  tags  = merge(var.tags, { a = 1 })
}
"#,
        );

        let value = block_value(&block);

        assert_eq!(value.at("count"), Value::from("2"));
        assert_eq!(value.at("tags"), Value::from("merge(var.tags, { a = 1 })"));
    }

    #[test]
    fn nested_blocks_are_unified_lists() {
        let block = root_block(
            r#"resource "fake_resource" "this" {
  identity {
    type = "SystemAssigned"
  }
  identity {
    type         = "UserAssigned"
    identity_ids = [var.id]
  }
}
"#,
        );

        let value = block_value(&block);

        let identity = |type_: &str, identity_ids: Value| {
            Value::Object(Map::from_iter([
                ("type".to_string(), Value::from(type_)),
                ("identity_ids".to_string(), identity_ids),
            ]))
        };
        assert_eq!(
            value.at("identity"),
            Value::Array(vec![
                identity("\"SystemAssigned\"", Value::Null),
                identity("\"UserAssigned\"", Value::from("[var.id]")),
            ])
        );
    }

    #[test]
    fn metadata_describes_the_block() {
        let block = root_block("resource \"fake_resource\" \"this\" {\n}\n");

        let mptf = metadata(&block);

        assert_eq!(mptf.at("block_address"), Value::from("resource.fake_resource.this"));
        assert_eq!(mptf.at("terraform_address"), Value::from("fake_resource.this"));
        assert_eq!(mptf.at("block_type"), Value::from("resource"));
        assert_eq!(mptf.at("block_labels"), Value::Array(vec!["fake_resource".into(), "this".into()]));
        assert_eq!(mptf.at("range").at("file_name"), Value::from("main.tf"));
        assert_eq!(mptf.at("range").at("start_line"), Value::from(1));
        assert_eq!(mptf.at("range").at("end_line"), Value::from(2));
        assert_eq!(mptf.at("module").at("key"), Value::from(""));
    }
}
