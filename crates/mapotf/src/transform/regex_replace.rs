use super::{DecodeError, Fields, TransformError};
use crate::edit::{self, InvalidExpression};
use crate::module::Module;
use hcl_edit::expr::Expression;
use regex::Regex;

/// Rewrites the source text of every attribute expression in the module
#[derive(Debug, Clone)]
pub struct RegexReplaceExpression {
    pub regex: Regex,
    pub replacement: String,
}

impl RegexReplaceExpression {
    pub fn decode(fields: &Fields) -> Result<Self, DecodeError> {
        Ok(RegexReplaceExpression {
            regex: Regex::new(&fields.string("regex")?)?,
            replacement: fields.string("replacement")?,
        })
    }

    fn replace(&self, expression: &Expression) -> Result<Option<Expression>, InvalidExpression> {
        let source = expression.to_string();
        let source = source.trim();
        let replaced = self.regex.replace_all(source, self.replacement.as_str());
        if replaced == source {
            return Ok(None);
        }

        tracing::trace!(from = source, to = %replaced, "replacing expression");
        let mut expression = edit::parse_expression(&replaced)?;
        hcl_edit::Decorate::decor_mut(&mut expression).set_prefix(" ");
        Ok(Some(expression))
    }

    /// Replacements that relex are kept even if others fail
    ///
    /// Every block of every file is visited, `provider`, `moved` and other blocks without an address included.
    #[tracing::instrument(skip_all, fields(regex = %self.regex))]
    pub fn apply(&self, module: &Module) -> Result<(), TransformError> {
        let mut errors: Vec<InvalidExpression> = vec![];

        module.update_files(|body| {
            for index in 0..body.len() {
                edit::with_block_at(body, index, |block| {
                    edit::replace_attribute_values(
                        &mut block.body,
                        &mut |attribute| self.replace(&attribute.value),
                        &mut errors,
                    )
                });
            }
        });

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0).into()),
            _ => Err(TransformError::Multiple(errors.into_iter().map(Into::into).collect())),
        }
    }
}
