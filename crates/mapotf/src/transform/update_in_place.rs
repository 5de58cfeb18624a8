use super::{build_patch, merge_body, DecodeError, Fields, TransformError};
use crate::module::Module;
use hcl_edit::structure::Body;

/// Deep-merges a patch into a root block
#[derive(Debug, Clone)]
pub struct UpdateInPlace {
    pub target_block_address: String,
    pub patch: Body,
}

impl UpdateInPlace {
    pub fn decode(fields: &Fields, module: &Module) -> Result<Self, DecodeError> {
        let target_block_address = fields.string("target_block_address")?;
        if !module.contains(&target_block_address) {
            return Err(DecodeError::BlockNotFound(target_block_address));
        }

        Ok(UpdateInPlace {
            target_block_address,
            patch: build_patch(fields.body(), fields.context())?,
        })
    }

    #[tracing::instrument(skip_all, fields(target = %self.target_block_address))]
    pub fn apply(&self, module: &Module) -> Result<(), TransformError> {
        module.update_block(&self.target_block_address, |block| {
            merge_body(&mut block.body, &self.patch)
        })?;
        Ok(())
    }
}
