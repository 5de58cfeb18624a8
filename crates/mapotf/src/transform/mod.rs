//! Structural edits of Terraform source
//!
//! Every transform is decoded once from its DSL block (after the values it references are known) and applied once.
//! Decoding evaluates the DSL expressions, applying only touches the [Module]'s write trees.
mod append;
mod decode;
mod ensure_local;
mod move_block;
mod new_block;
mod regex_replace;
mod remove;
mod rename;
mod update_in_place;

pub use append::AppendBlockBody;
pub use decode::{build_patch, merge_body, Fields};
pub use ensure_local::{EnsureLocal, LocalValue};
pub use move_block::MoveBlock;
pub use new_block::NewBlock;
pub use regex_replace::RegexReplaceExpression;
pub use remove::{RemoveBlock, RemoveBlockElement, RemoveNestedBlock};
pub use rename::{RenameBlockElement, RenameRule};
pub use update_in_place::UpdateInPlace;

use crate::edit::{InvalidBody, InvalidExpression};
use crate::eval::EvalError;
use crate::module::{Module, ModuleError};
use hcl::eval::Context;
use hcl_edit::structure::Body;

#[derive(Debug, Clone)]
pub enum Transform {
    UpdateInPlace(UpdateInPlace),
    RenameBlockElement(RenameBlockElement),
    RemoveBlock(RemoveBlock),
    RemoveBlockElement(RemoveBlockElement),
    RemoveNestedBlock(RemoveNestedBlock),
    MoveBlock(MoveBlock),
    /// `append_block_body` and `concat_block_body`
    AppendBlockBody(AppendBlockBody),
    RegexReplaceExpression(RegexReplaceExpression),
    EnsureLocal(EnsureLocal),
    NewBlock(NewBlock),
}

impl Transform {
    /// Decodes the body of a `transform "<transform_type>" "<name>"` block
    pub fn decode(
        transform_type: &str,
        body: &Body,
        context: &Context,
        module: &Module,
    ) -> Result<Self, DecodeError> {
        let fields = Fields::new(transform_type, body, context);
        let transform = match transform_type {
            "update_in_place" => Transform::UpdateInPlace(UpdateInPlace::decode(&fields, module)?),
            "rename_block_element" => Transform::RenameBlockElement(RenameBlockElement::decode(&fields)?),
            "remove_block" => Transform::RemoveBlock(RemoveBlock::decode(&fields, module)?),
            "remove_block_element" => Transform::RemoveBlockElement(RemoveBlockElement::decode(&fields, module)?),
            "remove_nested_block" => Transform::RemoveNestedBlock(RemoveNestedBlock::decode(&fields, module)?),
            "move_block" => Transform::MoveBlock(MoveBlock::decode(&fields, module)?),
            "append_block_body" | "concat_block_body" => {
                Transform::AppendBlockBody(AppendBlockBody::decode(&fields, module)?)
            }
            "regex_replace_expression" => Transform::RegexReplaceExpression(RegexReplaceExpression::decode(&fields)?),
            "ensure_local" => Transform::EnsureLocal(EnsureLocal::decode(&fields)?),
            "new_block" => Transform::NewBlock(NewBlock::decode(&fields)?),
            other => return Err(DecodeError::UnknownType(other.to_string())),
        };

        tracing::debug!(transform = transform.name(), "decoded");
        Ok(transform)
    }

    pub fn apply(&self, module: &Module) -> Result<(), TransformError> {
        match self {
            Transform::UpdateInPlace(transform) => transform.apply(module),
            Transform::RenameBlockElement(transform) => transform.apply(module),
            Transform::RemoveBlock(transform) => transform.apply(module),
            Transform::RemoveBlockElement(transform) => transform.apply(module),
            Transform::RemoveNestedBlock(transform) => transform.apply(module),
            Transform::MoveBlock(transform) => transform.apply(module),
            Transform::AppendBlockBody(transform) => transform.apply(module),
            Transform::RegexReplaceExpression(transform) => transform.apply(module),
            Transform::EnsureLocal(transform) => transform.apply(module),
            Transform::NewBlock(transform) => transform.apply(module),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Transform::UpdateInPlace(_) => "update_in_place",
            Transform::RenameBlockElement(_) => "rename_block_element",
            Transform::RemoveBlock(_) => "remove_block",
            Transform::RemoveBlockElement(_) => "remove_block_element",
            Transform::RemoveNestedBlock(_) => "remove_nested_block",
            Transform::MoveBlock(_) => "move_block",
            Transform::AppendBlockBody(_) => "append_block_body",
            Transform::RegexReplaceExpression(_) => "regex_replace_expression",
            Transform::EnsureLocal(_) => "ensure_local",
            Transform::NewBlock(_) => "new_block",
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("unknown transform type `{0}`")]
    UnknownType(String),
    #[error("{transform}: missing field `{field}`")]
    MissingField { transform: String, field: String },
    #[error("{transform}: field `{field}` must be {expected}, found {found}")]
    WrongType {
        transform: String,
        field: String,
        expected: &'static str,
        found: String,
    },
    #[error("{transform}: {message}")]
    ConflictingFields { transform: String, message: String },
    #[error("`{0}` is not a valid identifier")]
    InvalidIdentifier(String),
    #[error("target block `{0}` not found")]
    BlockNotFound(String),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error(transparent)]
    InvalidExpression(#[from] InvalidExpression),
    #[error(transparent)]
    InvalidBody(#[from] InvalidBody),
    #[error("invalid regex")]
    InvalidRegex(#[from] regex::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum TransformError {
    #[error(transparent)]
    Module(#[from] ModuleError),
    #[error(transparent)]
    InvalidExpression(#[from] InvalidExpression),
    #[error("{}", display_multiple(.0))]
    Multiple(Vec<TransformError>),
}

fn display_multiple(errors: &[TransformError]) -> String {
    let mut message = format!("{} errors", errors.len());
    for error in errors {
        message.push_str("\n  ");
        message.push_str(&error.to_string());
    }
    message
}

/// Splits `a.b.c` into its segments
pub(crate) fn split_path(path: &str) -> Vec<String> {
    path.split('.')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Checks that `name` can be used as an HCL identifier
pub(crate) fn identifier(name: &str) -> Result<hcl_edit::Ident, DecodeError> {
    hcl::Identifier::new(name).map_err(|_| DecodeError::InvalidIdentifier(name.to_string()))?;
    Ok(hcl_edit::Ident::new(name))
}
