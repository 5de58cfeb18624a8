use super::{DecodeError, Fields, TransformError};
use crate::module::Module;

/// Moves a root block to another file of the same module
#[derive(Debug, Clone)]
pub struct MoveBlock {
    pub target_block_address: String,
    pub file_name: String,
}

impl MoveBlock {
    pub fn decode(fields: &Fields, module: &Module) -> Result<Self, DecodeError> {
        let target_block_address = fields.string("target_block_address")?;
        if !module.contains(&target_block_address) {
            return Err(DecodeError::BlockNotFound(target_block_address));
        }

        let file_name = fields.string("file_name")?;
        if file_name.contains(['/', '\\']) || !file_name.ends_with(".tf") {
            return Err(fields.conflict(format!("`{file_name}` must be a .tf file name in the module directory")));
        }

        Ok(MoveBlock {
            target_block_address,
            file_name,
        })
    }

    #[tracing::instrument(skip_all, fields(target = %self.target_block_address, file_name = %self.file_name))]
    pub fn apply(&self, module: &Module) -> Result<(), TransformError> {
        module.move_block(&self.target_block_address, &self.file_name)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::module;
    use crate::transform::test::decode;
    use crate::transform::DecodeError;
    use pretty_assertions::assert_eq;

    fn move_to(module: &crate::module::Module, address: &str, file_name: &str) {
        let source = format!(
            "transform \"move_block\" \"this\" {{\n  target_block_address = \"{address}\"\n  file_name = \"{file_name}\"\n}}\n"
        );
        decode(&source, module).unwrap().apply(module).unwrap();
    }

    #[test]
    fn moves_to_new_file() {
        let module = module! {
            "main.tf" => "resource \"fake_resource\" \"a\" {\n  x = 1\n}\n\nresource \"fake_resource\" \"b\" {}\n",
        };

        move_to(&module, "resource.fake_resource.a", "moved.tf");

        insta::assert_snapshot!(module.render("main.tf").unwrap(), @r#"
        resource "fake_resource" "b" {}
        "#);
        insta::assert_snapshot!(module.render("moved.tf").unwrap(), @r#"
        resource "fake_resource" "a" {
          x = 1
        }
        "#);
        assert_eq!(module.block("resource.fake_resource.a").unwrap().file_name, "moved.tf");
    }

    #[test]
    fn moves_behind_existing_content() {
        let module = module! {
            "main.tf" => "resource \"fake_resource\" \"a\" {}\n",
            "other.tf" => "variable \"x\" {}\n",
        };

        move_to(&module, "resource.fake_resource.a", "other.tf");

        assert_eq!(
            module.render("other.tf").unwrap(),
            "variable \"x\" {}\n\nresource \"fake_resource\" \"a\" {}\n"
        );
    }

    #[test]
    fn same_file_is_a_no_op() {
        let source = "resource \"fake_resource\" \"a\" {\n    weird    = \"format\"\n}\n";
        let module = module! { "main.tf" => source };

        move_to(&module, "resource.fake_resource.a", "main.tf");

        assert!(module.changed_files().is_empty());
        assert_eq!(module.render("main.tf").unwrap(), source);
    }

    #[test]
    fn rejects_paths() {
        let module = module! { "main.tf" => "resource \"fake_resource\" \"a\" {}\n" };
        let result = decode(
            "transform \"move_block\" \"this\" {\n  target_block_address = \"resource.fake_resource.a\"\n  file_name = \"../main.tf\"\n}\n",
            &module,
        );
        assert!(matches!(result, Err(DecodeError::ConflictingFields { .. })));
    }
}
