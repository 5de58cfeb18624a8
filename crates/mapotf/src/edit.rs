//! write tree helpers
//!
//! Small building blocks to walk and change [hcl_edit] bodies. Nested blocks are matched by their logical type, so a
//! `dynamic "identity"` block is found when looking for `identity` and is walked through its `content` block.
use crate::block::is_dynamic;
use hcl_edit::expr::Expression;
use hcl_edit::structure::{Attribute, Block, Body, Structure};
use hcl_edit::Decorate;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("`{text}` is not a valid HCL expression: {reason}")]
pub struct InvalidExpression {
    pub text: String,
    pub reason: String,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("`{text}` is not a valid HCL body: {reason}")]
pub struct InvalidBody {
    pub text: String,
    pub reason: String,
}

/// Parses `key = <expression>` into a detached attribute
///
/// This is how text produced by the DSL turns into tokens.
pub fn parse_attribute(key: &str, expression: &str) -> Result<Attribute, InvalidExpression> {
    let invalid = |reason: String| InvalidExpression {
        text: expression.to_string(),
        reason,
    };

    let source = format!("{key} = {}\n", expression.trim());
    let body = hcl_edit::parser::parse_body(&source).map_err(|err| invalid(err.to_string()))?;
    if body.len() != 1 {
        return Err(invalid("must be a single expression".to_string()));
    }

    match body.into_iter().next() {
        Some(Structure::Attribute(attribute)) if attribute.key.as_str() == key => Ok(attribute),
        _ => Err(invalid("must be a single expression".to_string())),
    }
}

/// Parses `text` as a detached expression
pub fn parse_expression(text: &str) -> Result<Expression, InvalidExpression> {
    parse_attribute("value", text).map(|attribute| attribute.value)
}

pub fn parse_body(text: &str) -> Result<Body, InvalidBody> {
    hcl_edit::parser::parse_body(text).map_err(|err| InvalidBody {
        text: text.to_string(),
        reason: err.to_string(),
    })
}

/// Quotes a string as an HCL string literal
pub fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            '$' | '%' if chars.peek() == Some(&'{') => {
                quoted.push(c);
                quoted.push(c);
            }
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

pub fn attribute_index(body: &Body, key: &str) -> Option<usize> {
    body.iter().position(|structure| match structure {
        Structure::Attribute(attribute) => attribute.key.as_str() == key,
        Structure::Block(_) => false,
    })
}

/// Indices of the nested blocks of (logical) type `block_type`
pub fn nested_block_indices(body: &Body, block_type: &str) -> Vec<usize> {
    body.iter()
        .enumerate()
        .filter_map(|(index, structure)| match structure {
            Structure::Block(block) if logical_type(block) == block_type => Some(index),
            _ => None,
        })
        .collect()
}

/// Block type as seen through dynamic blocks
pub fn logical_type(block: &Block) -> &str {
    if is_dynamic(block) {
        block.labels[0].as_str()
    } else {
        block.ident.as_str()
    }
}

/// Source text of a block, decor included
pub fn block_text(block: &Block) -> String {
    Body::builder().block(block.clone()).build().to_string()
}

/// Runs `f` on the block at `index`, `None` if there is no block at that index
pub fn with_block_at<T>(body: &mut Body, index: usize, f: impl FnOnce(&mut Block) -> T) -> Option<T> {
    let mut structure = body.iter_mut().nth(index)?;
    let block = structure.as_block_mut()?;
    Some(f(block))
}

/// Runs `f` on the attribute at `index`, `None` if there is no attribute at that index
///
/// `f` must not change the key of the attribute.
pub fn with_attribute_at<T>(
    body: &mut Body,
    index: usize,
    f: impl FnOnce(&mut Attribute) -> T,
) -> Option<T> {
    if !body.get(index).is_some_and(Structure::is_attribute) {
        return None;
    }

    match body.remove(index) {
        Structure::Attribute(mut attribute) => {
            let result = f(&mut attribute);
            body.insert(index, attribute);
            Some(result)
        }
        Structure::Block(block) => {
            body.insert(index, block);
            None
        }
    }
}

/// Runs `f` on the body holding the logical content of `block`
///
/// That is the body of the `content` block for dynamic blocks and the block's own body otherwise.
pub fn with_content_body<T>(block: &mut Block, f: impl FnOnce(&mut Body) -> T) -> Option<T> {
    if !is_dynamic(block) {
        return Some(f(&mut block.body));
    }

    let content = block.body.iter().position(|structure| {
        structure
            .as_block()
            .is_some_and(|child| child.ident.as_str() == "content")
    })?;
    with_block_at(&mut block.body, content, |content| f(&mut content.body))
}

/// Overwrites the value of an existing attribute or appends the attribute
///
/// An existing attribute keeps its position and its surrounding comments.
pub fn set_attribute(body: &mut Body, attribute: Attribute) {
    match attribute_index(body, attribute.key.as_str()) {
        Some(index) => {
            with_attribute_at(body, index, |existing| existing.value = attribute.value);
        }
        None => {
            let mut attribute = attribute;
            strip_blank_prefix(&mut attribute);
            body.set_prefer_oneline(false);
            body.push(attribute);
        }
    }
}

/// Appends a nested block
pub fn push_block(body: &mut Body, block: Block) {
    let mut block = block;
    strip_blank_prefix(&mut block);
    body.set_prefer_oneline(false);
    body.push(block);
}

/// Appends a root level structure, separated from existing content by a blank line
pub fn push_root_structure(body: &mut Body, structure: Structure) {
    let mut structure = structure;
    let prefix = structure
        .decor()
        .prefix()
        .map(|prefix| prefix.to_string())
        .unwrap_or_default();
    let prefix = prefix.trim_start_matches(['\n', '\r', ' ', '\t']).to_string();

    if body.is_empty() {
        structure.decor_mut().set_prefix(prefix);
    } else {
        structure.decor_mut().set_prefix(format!("\n{prefix}"));
    }
    body.push(structure);
}

/// Drops whitespace-only prefixes (indentation from a foreign source)
fn strip_blank_prefix(decorated: &mut impl Decorate) {
    let blank = decorated
        .decor()
        .prefix()
        .map(|prefix| prefix.to_string())
        .is_some_and(|prefix| prefix.trim().is_empty());
    if blank {
        decorated.decor_mut().set_prefix("");
    }
}

/// Walks all attributes of `body` and its nested blocks
///
/// `f` returns the replacement value for an attribute or `None` to keep it. Errors are collected, the walk
/// continues with the next attribute.
pub fn replace_attribute_values<E>(
    body: &mut Body,
    f: &mut dyn FnMut(&Attribute) -> Result<Option<Expression>, E>,
    errors: &mut Vec<E>,
) -> bool {
    let mut changed = false;
    for index in 0..body.len() {
        let is_attribute = body.get(index).is_some_and(Structure::is_attribute);
        if is_attribute {
            let replaced = with_attribute_at(body, index, |attribute| match f(attribute) {
                Ok(Some(value)) => {
                    attribute.value = value;
                    Ok(true)
                }
                Ok(None) => Ok(false),
                Err(err) => Err(err),
            });
            match replaced {
                Some(Ok(true)) => changed = true,
                Some(Err(err)) => errors.push(err),
                _ => {}
            }
        } else {
            changed |= with_block_at(body, index, |block| {
                replace_attribute_values(&mut block.body, f, errors)
            })
            .unwrap_or(false);
        }
    }
    changed
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn body(source: &str) -> Body {
        hcl_edit::parser::parse_body(source).unwrap()
    }

    #[test]
    fn parse_attribute_relexes_text() {
        let attribute = parse_attribute("tags", "merge({}, { a = 1 })").unwrap();
        assert_eq!(attribute.key.as_str(), "tags");
        assert_eq!(attribute.value.to_string().trim(), "merge({}, { a = 1 })");
    }

    #[test]
    fn parse_attribute_rejects_garbage() {
        assert!(parse_attribute("tags", "merge({").is_err());
        assert!(parse_attribute("tags", "1\nother = 2").is_err());
    }

    #[test]
    fn quote_escapes() {
        assert_eq!(quote("a\"b"), r#""a\"b""#);
        assert_eq!(quote("${x}"), r#""$${x}""#);
        assert_eq!(quote("main.tf"), r#""main.tf""#);
    }

    #[test]
    fn dynamic_blocks_match_their_label() {
        let body = body(
            r#"
identity {}
dynamic "identity" {
  for_each = []
  content {}
}
dynamic "other" {
  content {}
}
"#,
        );

        assert_eq!(nested_block_indices(&body, "identity"), vec![0, 1]);
        assert_eq!(nested_block_indices(&body, "other"), vec![2]);
        assert_eq!(nested_block_indices(&body, "dynamic"), Vec::<usize>::new());
    }

    #[test]
    fn content_body_of_dynamic_block() {
        let mut body = body("dynamic \"identity\" {\n  for_each = []\n  content {\n    type = 1\n  }\n}\n");

        let has_type = with_block_at(&mut body, 0, |block| {
            with_content_body(block, |content| content.has_attribute("type"))
        });

        assert_eq!(has_type, Some(Some(true)));
    }

    #[test]
    fn block_text_follows_changes() {
        let mut body = body("resource \"a\" \"b\" {\n  x = 1\n}\n");
        let texts = with_block_at(&mut body, 0, |block| {
            let before = block_text(block);
            set_attribute(&mut block.body, parse_attribute("x", "2").unwrap());
            (before, block_text(block))
        })
        .unwrap();

        assert!(texts.0.starts_with("resource \"a\" \"b\" {") && texts.0.contains("x = 1"), "{}", texts.0);
        assert!(texts.1.contains("x = 2"), "{}", texts.1);
    }

    #[test]
    fn set_attribute_overwrites_in_place() {
        let mut body = body("a = 1\nb = 2\n");
        set_attribute(&mut body, parse_attribute("a", "3").unwrap());
        set_attribute(&mut body, parse_attribute("c", "4").unwrap());

        let keys: Vec<_> = body.attributes().map(|a| a.key.as_str().to_string()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(body.get_attribute("a").unwrap().value.to_string().trim(), "3");
    }

    #[test]
    fn replace_attribute_values_walks_nested_blocks() {
        let mut body = body("a = 1\nnested {\n  b = 1\n  deeper {\n    c = 2\n  }\n}\n");
        let mut errors: Vec<InvalidExpression> = vec![];

        let changed = replace_attribute_values(
            &mut body,
            &mut |attribute| {
                if attribute.value.to_string().trim() == "1" {
                    parse_expression("10").map(Some)
                } else {
                    Ok(None)
                }
            },
            &mut errors,
        );

        assert!(changed);
        assert!(errors.is_empty());
        let rendered = hcl::from_str::<hcl::Body>(&body.to_string()).unwrap();
        let expected = hcl::from_str::<hcl::Body>("a = 10\nnested {\n  b = 10\n  deeper {\n    c = 2\n  }\n}\n").unwrap();
        assert_eq!(rendered, expected);
    }
}
