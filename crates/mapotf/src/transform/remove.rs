use super::{split_path, DecodeError, Fields, TransformError};
use crate::edit;
use crate::module::Module;
use hcl_edit::structure::Body;

fn target(fields: &Fields, module: &Module) -> Result<String, DecodeError> {
    let address = fields.string("target_block_address")?;
    if !module.contains(&address) {
        return Err(DecodeError::BlockNotFound(address));
    }
    Ok(address)
}

fn paths(fields: &Fields) -> Result<Vec<Vec<String>>, DecodeError> {
    Ok(fields
        .string_list("paths")?
        .iter()
        .map(|path| split_path(path))
        .filter(|path| !path.is_empty())
        .collect())
}

/// Removes a whole root block
#[derive(Debug, Clone)]
pub struct RemoveBlock {
    pub target_block_address: String,
}

impl RemoveBlock {
    pub fn decode(fields: &Fields, module: &Module) -> Result<Self, DecodeError> {
        Ok(RemoveBlock {
            target_block_address: target(fields, module)?,
        })
    }

    #[tracing::instrument(skip_all, fields(target = %self.target_block_address))]
    pub fn apply(&self, module: &Module) -> Result<(), TransformError> {
        module.remove_block(&self.target_block_address)?;
        Ok(())
    }
}

/// Removes the attribute or first nested block at the end of each path
#[derive(Debug, Clone)]
pub struct RemoveBlockElement {
    pub target_block_address: String,
    pub paths: Vec<Vec<String>>,
}

impl RemoveBlockElement {
    pub fn decode(fields: &Fields, module: &Module) -> Result<Self, DecodeError> {
        Ok(RemoveBlockElement {
            target_block_address: target(fields, module)?,
            paths: paths(fields)?,
        })
    }

    #[tracing::instrument(skip_all, fields(target = %self.target_block_address))]
    pub fn apply(&self, module: &Module) -> Result<(), TransformError> {
        module.update_block(&self.target_block_address, |block| {
            for path in &self.paths {
                let removed = with_parent(&mut block.body, path, remove_element).unwrap_or(false);
                tracing::trace!(?path, removed);
            }
        })?;
        Ok(())
    }
}

/// Removes every nested block at the end of each path
#[derive(Debug, Clone)]
pub struct RemoveNestedBlock {
    pub target_block_address: String,
    pub paths: Vec<Vec<String>>,
}

impl RemoveNestedBlock {
    pub fn decode(fields: &Fields, module: &Module) -> Result<Self, DecodeError> {
        Ok(RemoveNestedBlock {
            target_block_address: target(fields, module)?,
            paths: paths(fields)?,
        })
    }

    #[tracing::instrument(skip_all, fields(target = %self.target_block_address))]
    pub fn apply(&self, module: &Module) -> Result<(), TransformError> {
        module.update_block(&self.target_block_address, |block| {
            for path in &self.paths {
                let removed = with_parent(&mut block.body, path, remove_nested_blocks).unwrap_or(0);
                tracing::trace!(?path, removed);
            }
        })?;
        Ok(())
    }
}

/// Walks the first nested block matching each segment but the last and runs `f` on the body reached
fn with_parent<T>(body: &mut Body, path: &[String], f: impl FnOnce(&mut Body, &str) -> T) -> Option<T> {
    match path {
        [] => None,
        [element] => Some(f(body, element)),
        [segment, rest @ ..] => {
            let index = *edit::nested_block_indices(body, segment).first()?;
            edit::with_block_at(body, index, |block| {
                edit::with_content_body(block, |content| with_parent(content, rest, f))
            })
            .flatten()
            .flatten()
        }
    }
}

fn remove_element(body: &mut Body, name: &str) -> bool {
    if let Some(index) = edit::attribute_index(body, name) {
        body.remove(index);
        return true;
    }
    match edit::nested_block_indices(body, name).first() {
        Some(&index) => {
            body.remove(index);
            true
        }
        None => false,
    }
}

fn remove_nested_blocks(body: &mut Body, block_type: &str) -> usize {
    let indices = edit::nested_block_indices(body, block_type);
    for &index in indices.iter().rev() {
        body.remove(index);
    }
    indices.len()
}
