use super::{identifier, DecodeError, Fields, TransformError};
use crate::block::BlockKind;
use crate::edit;
use crate::module::Module;
use hcl_edit::structure::Attribute;
use hcl_edit::{Decorate, Decorated, Ident};

/// Where the value of an ensured local comes from
#[derive(Debug, Clone, PartialEq)]
pub enum LocalValue {
    /// `value_as_string`, relexed as an expression
    Text(String),
    /// `asraw { value = ... }`, copied token for token
    Raw(hcl_edit::expr::Expression),
}

/// Makes sure a local exists with the given value
#[derive(Debug, Clone)]
pub struct EnsureLocal {
    pub local_name: String,
    pub fallback_file_name: String,
    pub value: LocalValue,
}

impl EnsureLocal {
    pub fn decode(fields: &Fields) -> Result<Self, DecodeError> {
        let local_name = identifier(&fields.string("local_name")?)?.to_string();
        let fallback_file_name = fields.string("fallback_file_name")?;

        let text = fields.optional_string("value_as_string")?;
        let raw = fields
            .block("asraw")
            .and_then(|block| block.body.get_attribute("value"))
            .map(|attribute| attribute.value.clone());

        let value = match (text, raw) {
            (Some(text), None) => {
                // fail while decoding, not while applying
                edit::parse_expression(&text)?;
                LocalValue::Text(text)
            }
            (None, Some(raw)) => LocalValue::Raw(raw),
            (Some(_), Some(_)) => {
                return Err(fields.conflict("only one of `value_as_string` and `asraw { value = ... }` can be set"))
            }
            (None, None) => {
                return Err(fields.conflict("one of `value_as_string` and `asraw { value = ... }` must be set"))
            }
        };

        Ok(EnsureLocal {
            local_name,
            fallback_file_name,
            value,
        })
    }

    fn attribute(&self) -> Result<Attribute, TransformError> {
        Ok(match &self.value {
            LocalValue::Text(text) => edit::parse_attribute(&self.local_name, text)?,
            LocalValue::Raw(expression) => {
                let mut value = expression.clone();
                value.decor_mut().set_prefix(" ");
                Attribute::new(Decorated::new(Ident::new(self.local_name.as_str())), value)
            }
        })
    }

    #[tracing::instrument(skip_all, fields(local = %self.local_name))]
    pub fn apply(&self, module: &Module) -> Result<(), TransformError> {
        let attribute = self.attribute()?;
        let address = BlockKind::Local.address(std::slice::from_ref(&self.local_name));

        if module.contains(&address) {
            tracing::debug!(address, "updating existing local");
            module.update_local(&address, |existing| existing.value = attribute.value)?;
        } else {
            tracing::debug!(address, file_name = self.fallback_file_name, "adding local");
            module.add_local(attribute, &self.fallback_file_name)?;
        }
        Ok(())
    }
}
