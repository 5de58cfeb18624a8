//! The transform DSL, `*.mptf.hcl` files
//!
//! [MptfDocuments] collects the parsed files, [Config] validates them into [Declaration]s. Validation does not stop
//! at the first problem, all [Issue]s of all files are reported together.
use hcl_edit::structure::{Attribute, Block, Body, Structure};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

pub const MPTF_SUFFIX: &str = ".mptf.hcl";

/// Query types a `data` block may declare
pub const DATA_TYPES: &[&str] = &[
    "resource",
    "data",
    "module",
    "terraform",
    "variable",
    "output",
    "local",
    "provider_schema",
];

/// Transform types a `transform` block may declare
pub const TRANSFORM_TYPES: &[&str] = &[
    "update_in_place",
    "rename_block_element",
    "remove_block",
    "remove_block_element",
    "remove_nested_block",
    "move_block",
    "append_block_body",
    "concat_block_body",
    "regex_replace_expression",
    "ensure_local",
    "new_block",
];

pub type Source = Option<PathBuf>;

/// Parsed DSL files
///
/// Root attributes and blocks are indexed in load order, issues refer to these indices. Files that fail to parse are
/// recorded and reported as issues alongside the validation of the others.
#[derive(Default, Debug)]
pub struct MptfDocuments {
    sources: Vec<Source>,
    root_attributes: Vec<(usize, Attribute)>,
    root_blocks: Vec<(usize, Block)>,
    parse_failures: Vec<(PathBuf, String)>,
}

impl MptfDocuments {
    pub fn insert(&mut self, document: Body, path: impl Into<Source>) {
        let source_index = self.sources.len();
        self.sources.push(path.into());

        for structure in document.into_iter() {
            match structure {
                Structure::Block(block) => self.root_blocks.push((source_index, block)),
                Structure::Attribute(attribute) => self.root_attributes.push((source_index, attribute)),
            }
        }
    }

    pub fn blocks(&self) -> impl Iterator<Item = (usize, &Source, &Block)> {
        self.root_blocks
            .iter()
            .enumerate()
            .map(|(index, (source_index, block))| (index, &self.sources[*source_index], block))
    }

    pub fn attributes(&self) -> impl Iterator<Item = (usize, &Source, &Attribute)> {
        self.root_attributes
            .iter()
            .enumerate()
            .map(|(index, (source_index, attribute))| (index, &self.sources[*source_index], attribute))
    }

    /// Files that failed to parse, with the parser's message
    pub fn parse_failures(&self) -> &[(PathBuf, String)] {
        &self.parse_failures
    }

    pub fn load_file(&mut self, file_path: &Path) -> Result<(), LoadError> {
        tracing::info!(path = %file_path.display(), "loading file");

        let file_contents = std::fs::read_to_string(file_path)?;
        let body = hcl_edit::parser::parse_body(&file_contents).map_err(|source| LoadError::HclParseFailed {
            path: file_path.to_path_buf(),
            source,
        })?;

        self.insert(body, Some(file_path.to_path_buf()));
        Ok(())
    }

    /// Loads all `*.mptf.hcl` files in `dir_path`, in name order
    pub fn load_directory(&mut self, dir_path: &Path) -> Result<(), LoadError> {
        let mut file_paths = vec![];
        for dir_entry in std::fs::read_dir(dir_path)? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_file() {
                continue;
            }

            let is_mptf_file = dir_entry.file_name().to_string_lossy().ends_with(MPTF_SUFFIX);
            if is_mptf_file {
                file_paths.push(dir_entry.path());
            }
        }

        if file_paths.is_empty() {
            return Err(LoadError::NoFilesFound(dir_path.to_path_buf()));
        }

        file_paths.sort();
        for file_path in file_paths {
            match self.load_file(&file_path) {
                Err(LoadError::HclParseFailed { path, source }) => {
                    tracing::debug!(path = %path.display(), "file failed to parse");
                    self.parse_failures.push((path, source.to_string()));
                }
                other => other?,
            }
        }

        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("no {MPTF_SUFFIX} files found in {0}")]
    NoFilesFound(PathBuf),
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    #[error("unable to parse {path}")]
    HclParseFailed {
        path: PathBuf,
        #[source]
        source: hcl_edit::parser::Error,
    },
}

impl From<Body> for MptfDocuments {
    fn from(value: Body) -> Self {
        let mut documents = MptfDocuments::default();
        documents.insert(value, None);
        documents
    }
}

/// Utility macro to create [MptfDocuments]
///
/// ```
/// # use mapotf::mptf_documents;
/// let documents = mptf_documents!(r#"data "resource" "all" {}"#);
/// assert_eq!(documents.blocks().count(), 1);
/// ```
///
/// # Panic
/// Panics on invalid input
#[macro_export]
macro_rules! mptf_documents {
    { $expr:expr } => {
        $crate::config::MptfDocuments::from(hcl_edit::parser::parse_body($expr).expect("body must parse"))
    };
    { $($source:expr => $expr:expr),+ } => {{
        let mut docs = $crate::config::MptfDocuments::default();
        $(
            docs.insert(hcl_edit::parser::parse_body($expr).expect("body must parse"), Some(std::path::PathBuf::from($source)));
        )+
        docs
    }};
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclarationKind {
    Data,
    Transform,
}

impl DeclarationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DeclarationKind::Data => "data",
            DeclarationKind::Transform => "transform",
        }
    }
}

/// A validated `data` or `transform` block
#[derive(Debug, Clone)]
pub struct Declaration {
    pub kind: DeclarationKind,
    pub declaration_type: String,
    pub name: String,
    pub body: Body,
    pub source: Source,
}

impl Declaration {
    /// `data.resource.all`, `transform.update_in_place.tags`
    pub fn address(&self) -> String {
        format!("{}.{}.{}", self.kind.as_str(), self.declaration_type, self.name)
    }
}

/// All declarations of a DSL configuration, in load order
#[derive(Debug, Default)]
pub struct Config {
    declarations: IndexMap<String, Declaration>,
}

impl Config {
    pub fn new(documents: &MptfDocuments) -> Result<Self, ConfigIssues> {
        let mut issues = ConfigIssues::new();
        let mut declarations: IndexMap<String, (usize, Declaration)> = IndexMap::new();

        for (path, message) in documents.parse_failures() {
            issues.log(Issue::ParseFailed {
                path: path.clone(),
                message: message.clone(),
            });
        }

        for (index, _source, _attribute) in documents.attributes() {
            issues.log(Issue::RootAttribute(index));
        }

        for (index, source, block) in documents.blocks() {
            let (kind, known_types) = match block.ident.as_str() {
                "data" => (DeclarationKind::Data, DATA_TYPES),
                "transform" => (DeclarationKind::Transform, TRANSFORM_TYPES),
                _ => {
                    issues.log(Issue::UnknownBlockType(index));
                    continue;
                }
            };

            if block.labels.len() != 2 {
                issues.log(Issue::LabelCount {
                    index,
                    found: block.labels.len(),
                });
                continue;
            }

            let declaration_type = block.labels[0].as_str();
            if !known_types.contains(&declaration_type) {
                issues.log(Issue::UnknownDeclarationType {
                    index,
                    declaration_type: format!("{}.{declaration_type}", kind.as_str()),
                });
                continue;
            }

            let name = block.labels[1].as_str();
            if hcl::Identifier::new(name).is_err() {
                issues.log(Issue::InvalidName {
                    index,
                    name: name.to_string(),
                });
                continue;
            }

            let declaration = Declaration {
                kind,
                declaration_type: declaration_type.to_string(),
                name: name.to_string(),
                body: block.body.clone(),
                source: source.clone(),
            };

            let address = declaration.address();
            if let Some((existing, _)) = declarations.get(&address) {
                issues.log(Issue::DuplicateAddress {
                    existing: *existing,
                    new: index,
                });
                continue;
            }
            declarations.insert(address, (index, declaration));
        }

        if !issues.issues.is_empty() {
            return Err(issues);
        }

        Ok(Config {
            declarations: declarations
                .into_iter()
                .map(|(address, (_, declaration))| (address, declaration))
                .collect(),
        })
    }

    pub fn declarations(&self) -> impl Iterator<Item = &Declaration> {
        self.declarations.values()
    }

    pub fn get(&self, address: &str) -> Option<&Declaration> {
        self.declarations.get(address)
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Loads and validates all DSL files in `dir`
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        let mut documents = MptfDocuments::default();
        documents.load_directory(dir)?;
        Ok(Config::new(&documents)?)
    }
}

#[derive(Debug, derive_new::new)]
pub struct ConfigIssues {
    #[new(default)]
    issues: Vec<Issue>,
}

impl ConfigIssues {
    pub fn log(&mut self, issue: Issue) {
        tracing::trace!(?issue, "issue found");
        self.issues.push(issue);
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }
}

impl std::error::Error for ConfigIssues {}

impl std::fmt::Display for ConfigIssues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} issue(s) in configuration", self.issues.len())?;
        for issue in &self.issues {
            write!(f, "\n  {issue}")?;
        }
        Ok(())
    }
}

/// Indices refer to [MptfDocuments::attributes] and [MptfDocuments::blocks]
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum Issue {
    #[error("unable to parse {}: {message}", path.display())]
    ParseFailed { path: PathBuf, message: String },
    #[error("root attribute #{0} is not allowed, only data and transform blocks are")]
    RootAttribute(usize),
    #[error("block #{0} is neither a data nor a transform block")]
    UnknownBlockType(usize),
    #[error("block #{index} must have exactly two labels, found {found}")]
    LabelCount { index: usize, found: usize },
    #[error("block #{index} has unknown type {declaration_type}")]
    UnknownDeclarationType {
        index: usize,
        declaration_type: String,
    },
    #[error("block #{index} has invalid name `{name}`")]
    InvalidName { index: usize, name: String },
    #[error("block #{new} has the same address as block #{existing}")]
    DuplicateAddress { existing: usize, new: usize },
}
