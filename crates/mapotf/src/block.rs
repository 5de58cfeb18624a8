//! Terraform blocks as seen by transforms and queries
//!
//! Every element keeps two views of the same source:
//! - the write form ([hcl_edit]) which keeps formatting and comments and is what gets printed
//! - the read form ([hcl]) which can be evaluated
//!
//! [RootBlock]s are snapshots. The authoritative write tree lives in the [crate::module::Module] and a snapshot is
//! rebuilt from it after every mutation.
use crate::module::ModuleRef;
use hcl_edit::structure::{Block, Body, Structure};
use hcl_edit::Span;
use indexmap::IndexMap;
use std::sync::Arc;

/// An attribute in both of its forms
#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: String,
    read: hcl::Expression,
    write: hcl_edit::expr::Expression,
}

impl Attribute {
    pub fn new(name: impl Into<String>, write: hcl_edit::expr::Expression) -> Self {
        Self {
            name: name.into(),
            read: write.clone().into(),
            write,
        }
    }

    /// Read form, suitable for evaluation
    pub fn expression(&self) -> &hcl::Expression {
        &self.read
    }

    /// Source text of the expression without surrounding whitespace
    pub fn source(&self) -> String {
        self.write.to_string().trim().to_string()
    }
}

impl std::fmt::Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source())
    }
}

impl From<&hcl_edit::structure::Attribute> for Attribute {
    fn from(attribute: &hcl_edit::structure::Attribute) -> Self {
        Attribute::new(attribute.key.as_str(), attribute.value.clone())
    }
}

/// Nested blocks of one body, keyed by (logical) block type, siblings in source order
pub type NestedBlocks = IndexMap<String, Vec<NestedBlock>>;

#[derive(Debug, Clone)]
pub struct NestedBlock {
    /// Block type, for `dynamic` blocks the label of the wrapper
    pub block_type: String,
    pub labels: Vec<String>,
    pub dynamic: bool,
    /// `for_each` of a `dynamic` wrapper
    pub for_each: Option<Attribute>,
    /// `iterator` of a `dynamic` wrapper
    pub iterator: Option<Attribute>,
    pub attributes: IndexMap<String, Attribute>,
    pub nested_blocks: NestedBlocks,
    /// 1-based start line, only known for snapshots taken at load
    pub line: Option<usize>,
}

impl NestedBlock {
    fn from_block(block: &Block, lines: Option<&LineIndex>) -> Self {
        let line = lines.and_then(|lines| block.span().map(|span| lines.position(span.start).0));

        if is_dynamic(block) {
            let content = block
                .body
                .blocks()
                .find(|child| child.ident.as_str() == "content");

            let (attributes, nested_blocks) = match content {
                Some(content) => (
                    collect_attributes(&content.body),
                    collect_nested_blocks(&content.body, lines),
                ),
                None => Default::default(),
            };

            return Self {
                block_type: block.labels[0].as_str().to_string(),
                labels: vec![],
                dynamic: true,
                for_each: block.body.get_attribute("for_each").map(Attribute::from),
                iterator: block.body.get_attribute("iterator").map(Attribute::from),
                attributes,
                nested_blocks,
                line,
            };
        }

        Self {
            block_type: block.ident.as_str().to_string(),
            labels: block.labels.iter().map(|l| l.as_str().to_string()).collect(),
            dynamic: false,
            for_each: None,
            iterator: None,
            attributes: collect_attributes(&block.body),
            nested_blocks: collect_nested_blocks(&block.body, lines),
            line,
        }
    }
}

/// `true` for `dynamic "<type>" { ... }`
pub(crate) fn is_dynamic(block: &Block) -> bool {
    block.ident.as_str() == "dynamic" && block.labels.len() == 1
}

fn collect_attributes(body: &Body) -> IndexMap<String, Attribute> {
    body.attributes()
        .map(|attribute| (attribute.key.as_str().to_string(), attribute.into()))
        .collect()
}

/// With `lines` siblings are ordered by their start line, without they keep body order
fn collect_nested_blocks(body: &Body, lines: Option<&LineIndex>) -> NestedBlocks {
    let mut nested: NestedBlocks = IndexMap::new();
    for block in body.blocks() {
        let nested_block = NestedBlock::from_block(block, lines);
        nested
            .entry(nested_block.block_type.clone())
            .or_default()
            .push(nested_block);
    }

    if lines.is_some() {
        for siblings in nested.values_mut() {
            siblings.sort_by_key(|block| block.line.unwrap_or(usize::MAX));
        }
    }

    nested
}

/// Kinds of root blocks that are addressable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Resource,
    Data,
    Module,
    Variable,
    Output,
    Terraform,
    Local,
}

impl BlockKind {
    /// Kind for a top-level block identifier, `locals` is handled separately
    pub fn from_ident(ident: &str) -> Option<Self> {
        match ident {
            "resource" => Some(BlockKind::Resource),
            "data" => Some(BlockKind::Data),
            "module" => Some(BlockKind::Module),
            "variable" => Some(BlockKind::Variable),
            "output" => Some(BlockKind::Output),
            "terraform" => Some(BlockKind::Terraform),
            _ => None,
        }
    }

    /// Number of labels a block of this kind has
    pub fn label_count(self) -> usize {
        match self {
            BlockKind::Resource | BlockKind::Data => 2,
            BlockKind::Module | BlockKind::Variable | BlockKind::Output | BlockKind::Local => 1,
            BlockKind::Terraform => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BlockKind::Resource => "resource",
            BlockKind::Data => "data",
            BlockKind::Module => "module",
            BlockKind::Variable => "variable",
            BlockKind::Output => "output",
            BlockKind::Terraform => "terraform",
            BlockKind::Local => "local",
        }
    }

    /// `resource.azurerm_resource_group.example`, `local.name`, `terraform`
    pub fn address(self, labels: &[String]) -> String {
        let mut address = self.as_str().to_string();
        for label in labels {
            address.push('.');
            address.push_str(label);
        }
        address
    }

    /// The address Terraform itself uses, `azurerm_resource_group.example`, `var.name`, ...
    pub fn terraform_address(self, labels: &[String]) -> String {
        let prefix = match self {
            BlockKind::Resource => None,
            BlockKind::Variable => Some("var"),
            other => Some(other.as_str()),
        };

        prefix
            .into_iter()
            .map(str::to_string)
            .chain(labels.iter().cloned())
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How to find a root block in its file's write tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Block { ident: String, labels: Vec<String> },
    Local(String),
}

impl Locator {
    /// Index of the block in `body`
    pub(crate) fn find_block(&self, body: &Body) -> Option<usize> {
        let Locator::Block { ident, labels } = self else {
            return None;
        };

        body.iter().position(|structure| match structure {
            Structure::Block(block) => {
                block.ident.as_str() == ident.as_str()
                    && block.labels.len() == labels.len()
                    && block
                        .labels
                        .iter()
                        .zip(labels)
                        .all(|(label, expected)| label.as_str() == expected.as_str())
            }
            Structure::Attribute(_) => false,
        })
    }

    /// Index of the `locals` block in `body` that declares the local
    pub(crate) fn find_locals_block(&self, body: &Body) -> Option<usize> {
        let Locator::Local(name) = self else {
            return None;
        };

        body.iter().position(|structure| match structure {
            Structure::Block(block) => {
                block.ident.as_str() == "locals" && block.body.has_attribute(name)
            }
            Structure::Attribute(_) => false,
        })
    }
}

/// Byte offset to line/column lookup for one source text
#[derive(Debug)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl Default for LineIndex {
    fn default() -> Self {
        Self::new("")
    }
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            text.char_indices()
                .filter(|(_, c)| *c == '\n')
                .map(|(offset, _)| offset + 1),
        );
        Self { line_starts }
    }

    /// 1-based line and column of a byte offset
    pub fn position(&self, offset: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        (line + 1, offset - self.line_starts[line] + 1)
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct SourceRange {
    pub file_name: String,
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

/// A top-level Terraform block (or a single local)
#[derive(Debug, Clone)]
pub struct RootBlock {
    pub kind: BlockKind,
    pub labels: Vec<String>,
    pub address: String,
    pub file_name: String,
    pub module: Arc<ModuleRef>,
    pub range: SourceRange,
    pub count: Option<Attribute>,
    pub for_each: Option<Attribute>,
    pub attributes: IndexMap<String, Attribute>,
    pub nested_blocks: NestedBlocks,
    /// The original source span was a single line, `resource "a" "b" {}`
    pub single_line: bool,
    pub(crate) locator: Locator,
}

impl RootBlock {
    /// Builds a snapshot of a top-level block
    pub(crate) fn from_block(
        kind: BlockKind,
        block: &Block,
        file_name: &str,
        module: Arc<ModuleRef>,
        lines: &LineIndex,
    ) -> Self {
        let labels: Vec<String> = block.labels.iter().map(|l| l.as_str().to_string()).collect();
        let range = source_range(block.span(), file_name, lines);
        let single_line = block.span().is_some() && range.start_line == range.end_line;

        let attributes = collect_attributes(&block.body);
        let count = attributes.get("count").cloned();
        let for_each = attributes.get("for_each").cloned();

        Self {
            kind,
            address: kind.address(&labels),
            locator: Locator::Block {
                ident: block.ident.as_str().to_string(),
                labels: labels.clone(),
            },
            labels,
            file_name: file_name.to_string(),
            module,
            range,
            count,
            for_each,
            attributes,
            nested_blocks: collect_nested_blocks(&block.body, Some(lines)),
            single_line,
        }
    }

    /// Builds a snapshot of a single local declared in a `locals` block
    pub(crate) fn from_local(
        attribute: &hcl_edit::structure::Attribute,
        file_name: &str,
        module: Arc<ModuleRef>,
        lines: &LineIndex,
    ) -> Self {
        let name = attribute.key.as_str().to_string();
        let range = source_range(attribute.span(), file_name, lines);
        let mut attributes = IndexMap::new();
        attributes.insert(name.clone(), Attribute::from(attribute));

        Self {
            kind: BlockKind::Local,
            address: BlockKind::Local.address(std::slice::from_ref(&name)),
            locator: Locator::Local(name.clone()),
            labels: vec![name],
            file_name: file_name.to_string(),
            module,
            single_line: range.start_line == range.end_line,
            range,
            count: None,
            for_each: None,
            attributes,
            nested_blocks: Default::default(),
        }
    }

    /// Snapshot of a block that was not loaded from a file, e.g. created by a transform
    pub(crate) fn detached(kind: BlockKind, block: &Block, file_name: &str, module: Arc<ModuleRef>) -> Self {
        Self {
            range: SourceRange {
                file_name: file_name.to_string(),
                ..Default::default()
            },
            single_line: false,
            nested_blocks: collect_nested_blocks(&block.body, None),
            ..Self::from_block(kind, block, file_name, module, &LineIndex::default())
        }
    }

    /// Same block, now living in `file_name`
    pub(crate) fn moved_to(&self, file_name: &str) -> Self {
        let mut moved = self.clone();
        moved.file_name = file_name.to_string();
        moved.range = SourceRange {
            file_name: file_name.to_string(),
            ..Default::default()
        };
        moved
    }

    /// Rebuilds this snapshot from the (mutated) write tree, keeping identity and provenance
    pub(crate) fn refreshed_from_block(&self, block: &Block) -> Self {
        let attributes = collect_attributes(&block.body);
        Self {
            count: attributes.get("count").cloned(),
            for_each: attributes.get("for_each").cloned(),
            attributes,
            nested_blocks: collect_nested_blocks(&block.body, None),
            ..self.clone()
        }
    }

    pub(crate) fn refreshed_from_local(&self, attribute: &hcl_edit::structure::Attribute) -> Self {
        let mut attributes = IndexMap::new();
        attributes.insert(self.labels[0].clone(), Attribute::from(attribute));
        Self {
            attributes,
            ..self.clone()
        }
    }

    /// `resource` blocks share the first label as type, e.g. `azurerm_resource_group`
    pub fn block_type(&self) -> Option<&str> {
        match self.kind {
            BlockKind::Resource | BlockKind::Data => self.labels.first().map(String::as_str),
            _ => None,
        }
    }

    /// Name of the block, the last label
    pub fn name(&self) -> Option<&str> {
        self.labels.last().map(String::as_str)
    }

    /// Value of a local
    pub fn local_value(&self) -> Option<&Attribute> {
        match self.kind {
            BlockKind::Local => self.attributes.get(&self.labels[0]),
            _ => None,
        }
    }

    pub fn terraform_address(&self) -> String {
        self.kind.terraform_address(&self.labels)
    }
}

fn source_range(span: Option<std::ops::Range<usize>>, file_name: &str, lines: &LineIndex) -> SourceRange {
    let Some(span) = span else {
        return SourceRange {
            file_name: file_name.to_string(),
            ..Default::default()
        };
    };

    let (start_line, start_column) = lines.position(span.start);
    let (end_line, end_column) = lines.position(span.end.saturating_sub(1).max(span.start));
    SourceRange {
        file_name: file_name.to_string(),
        start_line,
        start_column,
        end_line,
        end_column,
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    pub(crate) fn root_block(source: &str) -> RootBlock {
        let body = hcl_edit::parser::parse_body(source).expect("body must parse");
        let block = body.blocks().next().expect("must contain a block");
        let kind = BlockKind::from_ident(block.ident.as_str()).expect("known block kind");
        RootBlock::from_block(
            kind,
            block,
            "main.tf",
            Arc::new(ModuleRef::root(".")),
            &LineIndex::new(source),
        )
    }

    #[test]
    fn address_and_terraform_address() {
        let labels = vec!["azurerm_resource_group".to_string(), "example".to_string()];
        assert_eq!(
            BlockKind::Resource.address(&labels),
            "resource.azurerm_resource_group.example"
        );
        assert_eq!(
            BlockKind::Resource.terraform_address(&labels),
            "azurerm_resource_group.example"
        );
        assert_eq!(
            BlockKind::Data.terraform_address(&labels),
            "data.azurerm_resource_group.example"
        );
        assert_eq!(BlockKind::Variable.terraform_address(&["name".into()]), "var.name");
        assert_eq!(BlockKind::Terraform.address(&[]), "terraform");
    }

    #[test]
    fn attribute_source_is_trimmed() {
        let block = root_block("resource \"fake_resource\" \"this\" {\n  tags =   { a = 1 }   \n}\n");
        assert_eq!(block.attributes["tags"].source(), "{ a = 1 }");
        assert_eq!(block.attributes["tags"].to_string(), "{ a = 1 }");
    }

    #[test]
    fn dynamic_blocks_are_desugared() {
        let block = root_block(
            r#"resource "fake_resource" "this" {
  identity {
    type = "SystemAssigned"
  }
  dynamic "identity" {
    for_each = var.identities
    content {
      type = identity.value.type
    }
  }
}
"#,
        );

        let identities = &block.nested_blocks["identity"];
        assert_eq!(identities.len(), 2);
        assert!(!identities[0].dynamic);
        assert_eq!(identities[0].attributes["type"].source(), "\"SystemAssigned\"");
        assert!(identities[1].dynamic);
        assert_eq!(
            identities[1].for_each.as_ref().map(Attribute::source).as_deref(),
            Some("var.identities")
        );
        assert_eq!(identities[1].attributes["type"].source(), "identity.value.type");
        assert!(identities[0].line < identities[1].line);
    }

    #[test]
    fn count_and_for_each_are_picked_up() {
        let block = root_block("resource \"fake_resource\" \"this\" {\n  count = 2\n}\n");
        assert_eq!(block.count.as_ref().map(Attribute::source).as_deref(), Some("2"));
        assert!(block.for_each.is_none());
    }

    #[test]
    fn single_line_blocks_are_detected() {
        assert!(root_block("resource \"fake_resource\" \"that\" {}\n").single_line);
        assert!(!root_block("resource \"fake_resource\" \"that\" {\n}\n").single_line);
    }

    #[test]
    fn range_is_one_based() {
        let block = root_block("resource \"fake_resource\" \"this\" {\n  tags = {}\n}\n");
        assert_eq!(block.range.start_line, 1);
        assert_eq!(block.range.start_column, 1);
        assert_eq!(block.range.end_line, 3);
    }

    #[test]
    fn line_index_positions() {
        let lines = LineIndex::new("ab\ncd\n");
        assert_eq!(lines.position(0), (1, 1));
        assert_eq!(lines.position(1), (1, 2));
        assert_eq!(lines.position(3), (2, 1));
        assert_eq!(lines.position(4), (2, 2));
    }
}
