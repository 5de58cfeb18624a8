use super::{identifier, split_path, DecodeError, Fields, TransformError};
use crate::block::{is_dynamic, BlockKind};
use crate::edit;
use crate::module::Module;
use hcl::Value;
use hcl_edit::structure::{Block, BlockLabel, Body, Structure};
use hcl_edit::{Decor, Decorate, Decorated, Ident};

/// One `rename { ... }` rule
#[derive(Debug, Clone, PartialEq)]
pub struct RenameRule {
    pub kind: BlockKind,
    pub block_type: String,
    /// Nested block types to walk, the last segment is the renamed element
    pub path: Vec<String>,
    pub new_name: String,
    pub skip_if_exists: bool,
}

/// Renames attributes and nested blocks in all blocks of a type
#[derive(Debug, Clone)]
pub struct RenameBlockElement {
    pub rules: Vec<RenameRule>,
}

impl RenameBlockElement {
    pub fn decode(fields: &Fields) -> Result<Self, DecodeError> {
        let rules = fields
            .blocks("rename")
            .map(|block| RenameRule::decode(&Fields::new(fields.transform(), &block.body, fields.context())))
            .collect::<Result<Vec<_>, _>>()?;

        if rules.is_empty() {
            return Err(DecodeError::MissingField {
                transform: fields.transform().to_string(),
                field: "rename".to_string(),
            });
        }
        Ok(RenameBlockElement { rules })
    }

    #[tracing::instrument(skip_all)]
    pub fn apply(&self, module: &Module) -> Result<(), TransformError> {
        for rule in &self.rules {
            rule.apply(module)?;
        }
        Ok(())
    }
}

impl RenameRule {
    fn decode(fields: &Fields) -> Result<Self, DecodeError> {
        let resource_type = fields.string("resource_type")?;
        let (kind, block_type) = match resource_type.strip_prefix("data.") {
            Some(data_source_type) => (BlockKind::Data, data_source_type.to_string()),
            None => (BlockKind::Resource, resource_type),
        };

        // `attribute_path` is either a list of segments or a dotted string
        let path = match fields.value("attribute_path")? {
            Some(Value::String(path)) => split_path(&path),
            _ => fields.string_list("attribute_path")?,
        };
        if path.is_empty() {
            return Err(fields.conflict("`attribute_path` must not be empty"));
        }

        let new_name = identifier(&fields.string("new_name")?)?.to_string();
        Ok(RenameRule {
            kind,
            block_type,
            path,
            new_name,
            skip_if_exists: fields.bool_or("skip_if_exists", false)?,
        })
    }

    fn apply(&self, module: &Module) -> Result<(), TransformError> {
        for block in module.blocks_of_kind(self.kind) {
            if block.block_type() != Some(self.block_type.as_str()) {
                continue;
            }
            tracing::debug!(address = block.address, path = ?self.path, new_name = self.new_name, "renaming");
            module.update_block(&block.address, |root| rename_in(&mut root.body, &self.path, self))?;
        }
        Ok(())
    }
}

fn rename_in(body: &mut Body, path: &[String], rule: &RenameRule) {
    match path {
        [] => {}
        [element] => rename_element(body, element, rule),
        [segment, rest @ ..] => {
            for index in edit::nested_block_indices(body, segment) {
                edit::with_block_at(body, index, |block| {
                    edit::with_content_body(block, |content| rename_in(content, rest, rule))
                });
            }
        }
    }
}

fn rename_element(body: &mut Body, old_name: &str, rule: &RenameRule) {
    let new_name = rule.new_name.as_str();
    if old_name == new_name {
        return;
    }

    if edit::attribute_index(body, old_name).is_some() {
        rename_attribute(body, old_name, rule);
    }

    let blocks = edit::nested_block_indices(body, old_name);
    if blocks.is_empty() {
        return;
    }
    if rule.skip_if_exists && !edit::nested_block_indices(body, new_name).is_empty() {
        tracing::debug!(old_name, new_name, "nested block exists, skipping");
        return;
    }
    for index in blocks {
        edit::with_block_at(body, index, |block| rename_block(block, old_name, new_name));
    }
}

fn rename_attribute(body: &mut Body, old_name: &str, rule: &RenameRule) {
    let new_name = rule.new_name.as_str();
    if let Some(existing) = edit::attribute_index(body, new_name) {
        if rule.skip_if_exists {
            tracing::debug!(old_name, new_name, "attribute exists, skipping");
            return;
        }
        body.remove(existing);
    }

    let Some(index) = edit::attribute_index(body, old_name) else {
        return;
    };
    if let Structure::Attribute(mut attribute) = body.remove(index) {
        attribute.key = renamed(attribute.key.decor(), Ident::new(new_name));
        body.insert(index, attribute);
    }
}

fn rename_block(block: &mut Block, old_name: &str, new_name: &str) {
    if !is_dynamic(block) {
        block.ident = renamed(block.ident.decor(), Ident::new(new_name));
        return;
    }

    let decor = match &block.labels[0] {
        BlockLabel::String(label) => label.decor().clone(),
        BlockLabel::Ident(label) => label.decor().clone(),
    };
    block.labels[0] = BlockLabel::String(renamed(&decor, new_name.to_string()));

    // an existing iterator already binds the references in `content`
    if block.body.has_attribute("iterator") {
        return;
    }
    if let Ok(iterator) = edit::parse_attribute("iterator", old_name) {
        let position = edit::attribute_index(&block.body, "for_each").map_or(0, |index| index + 1);
        block.body.set_prefer_oneline(false);
        block.body.insert(position, iterator);
    }
}

fn renamed<T>(decor: &Decor, value: T) -> Decorated<T> {
    let mut decorated = Decorated::new(value);
    *decorated.decor_mut() = decor.clone();
    decorated
}

#[cfg(test)]
mod test {
    use crate::module;
    use crate::transform::test::{assert_same_hcl, decode};
    use crate::transform::DecodeError;
    use pretty_assertions::assert_eq;

    fn rename(module: &crate::module::Module, rules: &str) {
        let source = format!("transform \"rename_block_element\" \"this\" {{\n{rules}\n}}\n");
        decode(&source, module).unwrap().apply(module).unwrap();
    }

    #[test]
    fn renames_attributes_in_nested_blocks() {
        let module = module! {
            "main.tf" => r#"resource "fake_resource" "a" {
  attr = 1
  nested {
    attr = 2 # keep me
    other = 3
  }
}

resource "other_resource" "b" {
  nested {
    attr = 4
  }
}
"#,
        };

        rename(
            &module,
            r#"rename {
  resource_type  = "fake_resource"
  attribute_path = ["nested", "attr"]
  new_name       = "renamed"
}"#,
        );

        assert_same_hcl(
            &module.render("main.tf").unwrap(),
            r#"resource "fake_resource" "a" {
  attr = 1
  nested {
    renamed = 2
    other = 3
  }
}

resource "other_resource" "b" {
  nested {
    attr = 4
  }
}
"#,
        );
        assert!(module.render("main.tf").unwrap().contains("renamed = 2 # keep me"));
    }

    #[test]
    fn renames_static_nested_blocks() {
        let module = module! {
            "main.tf" => "resource \"fake_resource\" \"a\" {\n  old {\n    x = 1\n  }\n  old {\n    x = 2\n  }\n}\n",
        };

        rename(
            &module,
            r#"rename {
  resource_type  = "fake_resource"
  attribute_path = "old"
  new_name       = "new"
}"#,
        );

        assert_same_hcl(
            &module.render("main.tf").unwrap(),
            "resource \"fake_resource\" \"a\" {\n  new {\n    x = 1\n  }\n  new {\n    x = 2\n  }\n}\n",
        );
    }

    #[test]
    fn renaming_dynamic_block_binds_old_iterator() {
        let module = module! {
            "main.tf" => r#"resource "fake_resource" "a" {
  dynamic "old" {
    for_each = var.items
    content {
      x = old.value
    }
  }
}
"#,
        };

        rename(
            &module,
            r#"rename {
  resource_type  = "fake_resource"
  attribute_path = ["old"]
  new_name       = "new"
}"#,
        );

        assert_same_hcl(
            &module.render("main.tf").unwrap(),
            r#"resource "fake_resource" "a" {
  dynamic "new" {
    for_each = var.items
    iterator = old
    content {
      x = old.value
    }
  }
}
"#,
        );
    }

    #[test]
    fn existing_iterator_is_kept() {
        let module = module! {
            "main.tf" => "resource \"fake_resource\" \"a\" {\n  dynamic \"old\" {\n    for_each = []\n    iterator = item\n    content {}\n  }\n}\n",
        };

        rename(
            &module,
            "rename {\n  resource_type = \"fake_resource\"\n  attribute_path = [\"old\"]\n  new_name = \"new\"\n}",
        );

        let block = module.block("resource.fake_resource.a").unwrap();
        let dynamic = &block.nested_blocks["new"][0];
        assert_eq!(dynamic.iterator.as_ref().map(|it| it.source()), Some("item".to_string()));
    }

    #[test]
    fn skip_if_exists_leaves_element() {
        let module = module! {
            "main.tf" => "resource \"fake_resource\" \"a\" {\n  old = 1\n  new = 2\n}\n\nresource \"fake_resource\" \"b\" {\n  old = 3\n}\n",
        };

        rename(
            &module,
            r#"rename {
  resource_type  = "fake_resource"
  attribute_path = ["old"]
  new_name       = "new"
  skip_if_exists = true
}"#,
        );

        assert_same_hcl(
            &module.render("main.tf").unwrap(),
            "resource \"fake_resource\" \"a\" {\n  old = 1\n  new = 2\n}\n\nresource \"fake_resource\" \"b\" {\n  new = 3\n}\n",
        );
    }

    #[test]
    fn data_prefix_selects_data_sources() {
        let module = module! {
            "main.tf" => "data \"fake_data\" \"a\" {\n  old = 1\n}\n\nresource \"fake_data\" \"a\" {\n  old = 1\n}\n",
        };

        rename(
            &module,
            "rename {\n  resource_type = \"data.fake_data\"\n  attribute_path = [\"old\"]\n  new_name = \"new\"\n}",
        );

        assert_same_hcl(
            &module.render("main.tf").unwrap(),
            "data \"fake_data\" \"a\" {\n  new = 1\n}\n\nresource \"fake_data\" \"a\" {\n  old = 1\n}\n",
        );
    }

    #[test]
    fn rejects_invalid_new_name() {
        let module = module! { "main.tf" => "" };
        let result = decode(
            "transform \"rename_block_element\" \"this\" {\n  rename {\n    resource_type = \"x\"\n    attribute_path = [\"a\"]\n    new_name = \"not valid\"\n  }\n}\n",
            &module,
        );
        assert!(matches!(result, Err(DecodeError::InvalidIdentifier(_))));
    }
}
