use super::DecodeError;
use crate::block::is_dynamic;
use crate::edit;
use crate::eval;
use crate::value::coerce_to_string;
use hcl::eval::Context;
use hcl::Value;
use hcl_edit::structure::{Attribute, Block, Body, Structure};

/// Field names with a meaning for the DSL itself, only at the top level of a transform
const RESERVED: &[&str] = &["target_block_address", "for_each", "depends_on", "asraw", "asstring"];

/// Typed access to the fields of a transform body
pub struct Fields<'a, 'c> {
    transform: &'a str,
    body: &'a Body,
    context: &'a Context<'c>,
}

impl<'a, 'c> Fields<'a, 'c> {
    pub fn new(transform: &'a str, body: &'a Body, context: &'a Context<'c>) -> Self {
        Fields {
            transform,
            body,
            context,
        }
    }

    pub fn transform(&self) -> &str {
        self.transform
    }

    pub fn body(&self) -> &Body {
        self.body
    }

    pub fn context(&self) -> &Context<'c> {
        self.context
    }

    pub fn has(&self, name: &str) -> bool {
        self.body.has_attribute(name)
    }

    /// Evaluated value of a field, `None` if absent
    pub fn value(&self, name: &str) -> Result<Option<Value>, DecodeError> {
        let Some(attribute) = self.body.get_attribute(name) else {
            return Ok(None);
        };
        let expression: hcl::Expression = attribute.value.clone().into();
        Ok(Some(eval::evaluate(&expression, self.context)?))
    }

    fn missing(&self, name: &str) -> DecodeError {
        DecodeError::MissingField {
            transform: self.transform.to_string(),
            field: name.to_string(),
        }
    }

    fn wrong_type(&self, name: &str, expected: &'static str, found: &Value) -> DecodeError {
        DecodeError::WrongType {
            transform: self.transform.to_string(),
            field: name.to_string(),
            expected,
            found: coerce_to_string(found),
        }
    }

    pub fn string(&self, name: &str) -> Result<String, DecodeError> {
        self.optional_string(name)?.ok_or_else(|| self.missing(name))
    }

    /// Absent and `null` fields are `None`
    pub fn optional_string(&self, name: &str) -> Result<Option<String>, DecodeError> {
        match self.value(name)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(string)) => Ok(Some(string)),
            Some(other) => Err(self.wrong_type(name, "a string", &other)),
        }
    }

    pub fn bool_or(&self, name: &str, default: bool) -> Result<bool, DecodeError> {
        match self.value(name)? {
            None | Some(Value::Null) => Ok(default),
            Some(Value::Bool(bool)) => Ok(bool),
            Some(other) => Err(self.wrong_type(name, "a bool", &other)),
        }
    }

    pub fn string_list(&self, name: &str) -> Result<Vec<String>, DecodeError> {
        match self.value(name)? {
            None | Some(Value::Null) => Err(self.missing(name)),
            Some(Value::Array(values)) => values
                .iter()
                .map(|value| match value {
                    Value::String(string) => Ok(string.clone()),
                    other => Err(self.wrong_type(name, "a list of strings", other)),
                })
                .collect(),
            Some(other) => Err(self.wrong_type(name, "a list of strings", &other)),
        }
    }

    pub fn blocks(&self, ident: &'a str) -> impl Iterator<Item = &'a Block> {
        self.body.blocks().filter(move |block| block.ident.as_str() == ident)
    }

    pub fn block(&self, ident: &'a str) -> Option<&'a Block> {
        self.blocks(ident).next()
    }

    pub fn conflict(&self, message: impl Into<String>) -> DecodeError {
        DecodeError::ConflictingFields {
            transform: self.transform.to_string(),
            message: message.into(),
        }
    }
}

/// Builds a detached patch body from a DSL body
///
/// - `asraw { ... }` content is copied token for token
/// - `asstring { ... }` content and all other attributes are evaluated, turned into a string and parsed as HCL
///   expression
/// - other nested blocks become nested blocks of the patch
///
/// Reserved field names are skipped at the top level.
pub fn build_patch(body: &Body, context: &Context) -> Result<Body, DecodeError> {
    let mut patch = Body::new();
    build(body, context, 0, &mut patch)?;
    Ok(patch)
}

fn build(body: &Body, context: &Context, depth: usize, patch: &mut Body) -> Result<(), DecodeError> {
    for structure in body.iter() {
        match structure {
            Structure::Attribute(attribute) => {
                if depth == 0 && RESERVED.contains(&attribute.key.as_str()) {
                    continue;
                }
                edit::set_attribute(patch, evaluated_attribute(attribute, context)?);
            }
            Structure::Block(block) => match block.ident.as_str() {
                "asraw" => merge_body(patch, &block.body),
                "asstring" => build(&block.body, context, depth + 1, patch)?,
                _ if depth == 0 && RESERVED.contains(&block.ident.as_str()) => {}
                _ => {
                    let mut nested = Block::new(block.ident.clone());
                    nested.labels = block.labels.clone();
                    build(&block.body, context, depth + 1, &mut nested.body)?;
                    edit::push_block(patch, nested);
                }
            },
        }
    }
    Ok(())
}

fn evaluated_attribute(attribute: &Attribute, context: &Context) -> Result<Attribute, DecodeError> {
    let expression: hcl::Expression = attribute.value.clone().into();
    let value = eval::evaluate(&expression, context)?;
    Ok(edit::parse_attribute(attribute.key.as_str(), &coerce_to_string(&value))?)
}

/// Merges `patch` into `destination`
///
/// Attributes overwrite, nested blocks merge into the first block with the same type and labels or are appended. A
/// `dynamic` block counts as a block of its label's type, patches merge into its `content`.
pub fn merge_body(destination: &mut Body, patch: &Body) {
    for structure in patch.iter() {
        match structure {
            Structure::Attribute(attribute) => edit::set_attribute(destination, attribute.clone()),
            Structure::Block(block) => {
                let existing = destination.iter().position(|candidate| {
                    candidate.as_block().is_some_and(|candidate| same_block(candidate, block))
                });

                let merged = existing.and_then(|index| {
                    edit::with_block_at(destination, index, |existing| {
                        edit::with_content_body(existing, |content| merge_body(content, &block.body))
                    })
                    .flatten()
                });

                if merged.is_none() {
                    edit::push_block(destination, block.clone());
                }
            }
        }
    }
}

/// `existing` is a `dynamic` block generating `patch`'s type, or has the same type and labels
fn same_block(existing: &Block, patch: &Block) -> bool {
    if is_dynamic(existing) && !is_dynamic(patch) {
        return patch.labels.is_empty() && edit::logical_type(existing) == patch.ident.as_str();
    }

    existing.ident.as_str() == patch.ident.as_str()
        && existing.labels.len() == patch.labels.len()
        && existing
            .labels
            .iter()
            .zip(&patch.labels)
            .all(|(a, b)| a.as_str() == b.as_str())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::transform::test::assert_same_hcl;

    fn object(entries: &[(&str, Value)]) -> Value {
        Value::Object(
            entries
                .iter()
                .map(|(key, value)| (key.to_string(), value.clone()))
                .collect(),
        )
    }

    fn patch(source: &str, variables: &[(&str, Value)]) -> Body {
        let body = hcl_edit::parser::parse_body(source).unwrap();
        let context = eval::context(variables.iter().cloned());
        build_patch(&body, &context).unwrap()
    }

    #[test]
    fn reserved_fields_only_at_top_level() {
        let patch = patch(
            r#"
target_block_address = "resource.fake_resource.this"
for_each = []
nested {
  for_each = "[1]"
}
"#,
            &[],
        );

        assert_same_hcl(&patch.to_string(), "nested {\n  for_each = [1]\n}\n");
    }

    #[test]
    fn asraw_is_copied_verbatim() {
        let patch = patch(
            r#"
asraw {
  tags = merge(var.tags, { a = 1 })
  identity {
    type = "SystemAssigned"
  }
}
"#,
            &[],
        );

        assert_same_hcl(
            &patch.to_string(),
            "tags = merge(var.tags, { a = 1 })\nidentity {\n  type = \"SystemAssigned\"\n}\n",
        );
    }

    #[test]
    fn asstring_and_fields_are_relexed() {
        let patch = patch(
            r#"
name = "var.name"
asstring {
  tags = "merge(${each.value.tags}, {})"
}
"#,
            &[("each", object(&[("value", object(&[("tags", Value::from("{}"))]))]))],
        );

        assert_same_hcl(&patch.to_string(), "name = var.name\ntags = merge({}, {})\n");
    }

    #[test]
    fn merge_body_overwrites_and_appends() {
        let mut destination = hcl_edit::parser::parse_body(
            "a = 1\nnested {\n  x = 1\n}\nlabeled \"one\" {}\n",
        )
        .unwrap();
        let patch = hcl_edit::parser::parse_body(
            "a = 2\nb = 3\nnested {\n  y = 2\n}\nlabeled \"two\" {}\n",
        )
        .unwrap();

        merge_body(&mut destination, &patch);

        assert_same_hcl(
            &destination.to_string(),
            "a = 2\nnested {\n  x = 1\n  y = 2\n}\nlabeled \"one\" {}\nb = 3\nlabeled \"two\" {}\n",
        );
    }

    #[test]
    fn merge_body_merges_into_dynamic_content() {
        let mut destination = hcl_edit::parser::parse_body(
            "dynamic \"identity\" {\n  for_each = var.identities\n  content {\n    type = identity.value.type\n  }\n}\n",
        )
        .unwrap();
        let patch = hcl_edit::parser::parse_body("identity {\n  identity_ids = [var.id]\n}\n").unwrap();

        merge_body(&mut destination, &patch);

        assert_same_hcl(
            &destination.to_string(),
            "dynamic \"identity\" {\n  for_each = var.identities\n  content {\n    type         = identity.value.type\n    identity_ids = [var.id]\n  }\n}\n",
        );
    }
}
