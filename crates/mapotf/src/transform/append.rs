use super::{DecodeError, Fields, TransformError};
use crate::edit;
use crate::module::Module;
use hcl_edit::structure::{Body, Structure};

/// Appends the content of `block_body` to a root block
///
/// Attributes overwrite existing ones, nested blocks are always appended.
#[derive(Debug, Clone)]
pub struct AppendBlockBody {
    pub target_block_address: String,
    pub block_body: Body,
}

impl AppendBlockBody {
    pub fn decode(fields: &Fields, module: &Module) -> Result<Self, DecodeError> {
        let target_block_address = fields.string("target_block_address")?;
        if !module.contains(&target_block_address) {
            return Err(DecodeError::BlockNotFound(target_block_address));
        }

        Ok(AppendBlockBody {
            target_block_address,
            block_body: edit::parse_body(&fields.string("block_body")?)?,
        })
    }

    #[tracing::instrument(skip_all, fields(target = %self.target_block_address))]
    pub fn apply(&self, module: &Module) -> Result<(), TransformError> {
        let single_line = module
            .block(&self.target_block_address)
            .is_some_and(|block| block.single_line);

        module.update_block(&self.target_block_address, |block| {
            if single_line {
                block.body.set_prefer_oneline(false);
            }
            for structure in self.block_body.iter() {
                match structure {
                    Structure::Attribute(attribute) => edit::set_attribute(&mut block.body, attribute.clone()),
                    Structure::Block(nested) => edit::push_block(&mut block.body, nested.clone()),
                }
            }
        })?;
        Ok(())
    }
}
