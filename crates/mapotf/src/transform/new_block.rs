use super::{build_patch, DecodeError, Fields, TransformError};
use crate::block::BlockKind;
use crate::module::Module;
use hcl_edit::structure::{Block, BlockLabel, Body, Structure};
use hcl_edit::{Decorated, Ident};

/// Adds a root block, or the locals of a `locals` block, to a file
#[derive(Debug, Clone)]
pub struct NewBlock {
    /// `None` for `locals`
    pub kind: Option<BlockKind>,
    pub labels: Vec<String>,
    pub file_name: String,
    pub body: Body,
}

impl NewBlock {
    pub fn decode(fields: &Fields) -> Result<Self, DecodeError> {
        let new_block_type = fields.string("new_block_type")?;
        let kind = match new_block_type.as_str() {
            "locals" => None,
            other => match BlockKind::from_ident(other) {
                Some(kind) => Some(kind),
                None => return Err(fields.conflict(format!("`{other}` is not a supported block type"))),
            },
        };

        let labels = if fields.has("labels") {
            fields.string_list("labels")?
        } else {
            vec![]
        };
        let expected = kind.map_or(0, BlockKind::label_count);
        if labels.len() != expected {
            return Err(fields.conflict(format!(
                "`{new_block_type}` blocks take {expected} labels, found {}",
                labels.len()
            )));
        }

        let mut source = fields.body().clone();
        strip_fields(&mut source);
        let body = build_patch(&source, fields.context())?;

        Ok(NewBlock {
            kind,
            labels,
            file_name: fields.string("filename")?,
            body,
        })
    }

    #[tracing::instrument(skip_all, fields(file_name = %self.file_name))]
    pub fn apply(&self, module: &Module) -> Result<(), TransformError> {
        let Some(kind) = self.kind else {
            for structure in self.body.iter() {
                if let Structure::Attribute(attribute) = structure {
                    module.add_local(attribute.clone(), &self.file_name)?;
                }
            }
            return Ok(());
        };

        let mut block = Block::new(Ident::new(kind.as_str()));
        for label in &self.labels {
            block.labels.push(BlockLabel::String(Decorated::new(label.clone())));
        }
        block.body = self.body.clone();
        block.body.set_prefer_oneline(false);

        let address = module.add_block(kind, block, &self.file_name)?;
        tracing::debug!(address, "block created");
        Ok(())
    }
}

fn strip_fields(body: &mut Body) {
    for name in ["new_block_type", "labels", "filename"] {
        if let Some(index) = crate::edit::attribute_index(body, name) {
            body.remove(index);
        }
    }
}
