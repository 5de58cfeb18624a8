//! A Terraform module on disk
//!
//! The [Module] owns the write tree of every loaded `.tf` file and the registry of [RootBlock] snapshots. All
//! mutations go through the module so that the registry follows the write trees:
//! 1. the per address block lock is taken
//! 2. the file's write tree is locked and changed
//! 3. the snapshot is rebuilt from the changed block
//!
//! Adding structures to a file (move, new blocks, new locals) additionally takes the per file lock.
use crate::backup;
use crate::block::{BlockKind, LineIndex, Locator, RootBlock};
use crate::edit;
use crate::format::format;
use crate::locks::KeyedLocks;
use hcl_edit::structure::{Attribute, Block, Body, Structure};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where a module comes from, as recorded by `terraform init` in `.terraform/modules/modules.json`
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModuleRef {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Source", default)]
    pub source: String,
    #[serde(rename = "Version", default)]
    pub version: String,
    #[serde(rename = "Dir")]
    pub dir: String,
    #[serde(skip)]
    pub abs_dir: PathBuf,
}

impl ModuleRef {
    /// The root module in `dir`
    pub fn root(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        ModuleRef {
            key: String::new(),
            source: String::new(),
            version: String::new(),
            dir: dir.display().to_string(),
            abs_dir: absolute(dir),
        }
    }

    pub fn is_root(&self) -> bool {
        self.key.is_empty()
    }

    /// Modules downloaded by `terraform init` live below `.terraform`
    pub fn is_local(&self) -> bool {
        !Path::new(&self.dir)
            .components()
            .any(|component| component.as_os_str() == ".terraform")
    }
}

fn absolute(dir: &Path) -> PathBuf {
    dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf())
}

#[derive(serde::Deserialize)]
struct Manifest {
    #[serde(rename = "Modules", default)]
    modules: Vec<ModuleRef>,
}

pub const MANIFEST_PATH: &str = ".terraform/modules/modules.json";

/// Reads the modules manifest below `root`
///
/// Without a manifest only the root module is known.
pub fn load_manifest(root: &Path) -> Result<Vec<ModuleRef>, LoadError> {
    let path = root.join(MANIFEST_PATH);
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no modules manifest");
        return Ok(vec![ModuleRef::root(root)]);
    }

    let content = std::fs::read_to_string(&path).map_err(|source| LoadError::Io {
        path: path.clone(),
        source,
    })?;
    let manifest: Manifest = serde_json::from_str(&content).map_err(|source| LoadError::Manifest {
        path: path.clone(),
        source,
    })?;

    let mut modules: Vec<ModuleRef> = manifest
        .modules
        .into_iter()
        .map(|mut module| {
            module.abs_dir = absolute(&root.join(&module.dir));
            module
        })
        .collect();

    if !modules.iter().any(ModuleRef::is_root) {
        modules.insert(0, ModuleRef::root(root));
    }

    Ok(modules)
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {file_name}")]
    HclParseFailed {
        file_name: String,
        #[source]
        source: hcl_edit::parser::Error,
    },
    #[error("`{address}` is declared in {first} and {second}")]
    DuplicateAddress {
        address: String,
        first: String,
        second: String,
    },
    #[error("failed to parse modules manifest {path}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ModuleError {
    #[error("block `{0}` not found")]
    BlockNotFound(String),
    #[error("block `{0}` exists already")]
    BlockExists(String),
    #[error("`{address}` does not support {operation}")]
    Unsupported {
        address: String,
        operation: &'static str,
    },
    #[error("block `{address}` is no longer part of {file_name}")]
    Detached { address: String, file_name: String },
}

#[derive(thiserror::Error, Debug)]
pub enum SaveError {
    #[error(transparent)]
    Backup(#[from] backup::BackupError),
    #[error("failed to write {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One `.tf` file
#[derive(Debug)]
struct SourceFile {
    /// Content on disk before the run, `None` for files created by the run
    original: Option<String>,
    body: Body,
    dirty: bool,
}

#[derive(Debug)]
pub struct Module {
    module_ref: Arc<ModuleRef>,
    files: RwLock<IndexMap<String, Arc<Mutex<SourceFile>>>>,
    registry: RwLock<IndexMap<String, RootBlock>>,
    block_locks: KeyedLocks,
    file_locks: KeyedLocks,
}

fn is_terraform_file(name: &str) -> bool {
    name.ends_with(".tf") && name != "override.tf" && !name.ends_with("_override.tf")
}

impl Module {
    fn empty(module_ref: ModuleRef) -> Self {
        Module {
            module_ref: Arc::new(module_ref),
            files: Default::default(),
            registry: Default::default(),
            block_locks: Default::default(),
            file_locks: Default::default(),
        }
    }

    /// Loads the root module in `dir`
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, LoadError> {
        Self::load_module(ModuleRef::root(dir))
    }

    /// Loads all `.tf` files of a module, override files are skipped
    pub fn load_module(module_ref: ModuleRef) -> Result<Self, LoadError> {
        let dir = module_ref.abs_dir.clone();
        let io_error = |source| LoadError::Io {
            path: dir.clone(),
            source,
        };

        let mut names = vec![];
        for entry in std::fs::read_dir(&dir).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if path.is_file() && is_terraform_file(name) {
                names.push(name.to_string());
            }
        }
        names.sort();

        if names.is_empty() {
            tracing::warn!(dir = %dir.display(), "no terraform files found");
        }

        let mut module = Module::empty(module_ref);
        for name in names {
            let path = dir.join(&name);
            tracing::info!(path = %path.display(), "loading file");
            let content = std::fs::read_to_string(&path).map_err(|source| LoadError::Io { path, source })?;
            module.add_file(&name, Some(content))?;
        }

        Ok(module)
    }

    /// Builds a module from in-memory sources, `dir` is only used when saving
    pub fn from_sources<N: AsRef<str>, C: AsRef<str>>(
        dir: impl AsRef<Path>,
        sources: impl IntoIterator<Item = (N, C)>,
    ) -> Result<Self, LoadError> {
        let mut module = Module::empty(ModuleRef::root(dir));
        for (name, content) in sources {
            module.add_file(name.as_ref(), Some(content.as_ref().to_string()))?;
        }
        Ok(module)
    }

    fn add_file(&mut self, name: &str, content: Option<String>) -> Result<(), LoadError> {
        let text = content.clone().unwrap_or_default();
        let body = hcl_edit::parser::parse_body(&text).map_err(|source| LoadError::HclParseFailed {
            file_name: name.to_string(),
            source,
        })?;

        let blocks = self.index_body(name, &body, &LineIndex::new(&text));
        let registry = self.registry.get_mut();
        for block in blocks {
            if let Some(existing) = registry.get(&block.address) {
                if block.kind == BlockKind::Terraform {
                    tracing::warn!(
                        file_name = name,
                        first = existing.file_name,
                        "ignoring additional terraform block"
                    );
                    continue;
                }
                return Err(LoadError::DuplicateAddress {
                    address: block.address.clone(),
                    first: existing.file_name.clone(),
                    second: name.to_string(),
                });
            }
            registry.insert(block.address.clone(), block);
        }

        self.files.get_mut().insert(
            name.to_string(),
            Arc::new(Mutex::new(SourceFile {
                original: content,
                body,
                dirty: false,
            })),
        );
        Ok(())
    }

    /// Classifies the top-level blocks of a file
    fn index_body(&self, file_name: &str, body: &Body, lines: &LineIndex) -> Vec<RootBlock> {
        let mut blocks = vec![];
        for block in body.blocks() {
            let ident = block.ident.as_str();

            if ident == "locals" {
                for attribute in block.body.attributes() {
                    blocks.push(RootBlock::from_local(
                        attribute,
                        file_name,
                        self.module_ref.clone(),
                        lines,
                    ));
                }
                continue;
            }

            let Some(kind) = BlockKind::from_ident(ident) else {
                tracing::trace!(file_name, ident, "skipping untracked block");
                continue;
            };

            if block.labels.len() != kind.label_count() {
                tracing::warn!(
                    file_name,
                    ident,
                    labels = block.labels.len(),
                    "skipping block with unexpected number of labels"
                );
                continue;
            }

            blocks.push(RootBlock::from_block(
                kind,
                block,
                file_name,
                self.module_ref.clone(),
                lines,
            ));
        }
        blocks
    }

    pub fn module_ref(&self) -> &Arc<ModuleRef> {
        &self.module_ref
    }

    pub fn dir(&self) -> &Path {
        &self.module_ref.abs_dir
    }

    /// Snapshot of the block at `address`
    pub fn block(&self, address: &str) -> Option<RootBlock> {
        self.registry.read().get(address).cloned()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.registry.read().contains_key(address)
    }

    /// Snapshots of all blocks, in load order
    pub fn blocks(&self) -> Vec<RootBlock> {
        self.registry.read().values().cloned().collect()
    }

    pub fn blocks_of_kind(&self, kind: BlockKind) -> Vec<RootBlock> {
        self.registry
            .read()
            .values()
            .filter(|block| block.kind == kind)
            .cloned()
            .collect()
    }

    pub fn file_names(&self) -> Vec<String> {
        self.files.read().keys().cloned().collect()
    }

    /// Current content of a file, exactly as it would be written
    pub fn render(&self, file_name: &str) -> Option<String> {
        let file = self.file(file_name)?;
        let file = file.lock();
        Some(render(&file))
    }

    fn file(&self, file_name: &str) -> Option<Arc<Mutex<SourceFile>>> {
        self.files.read().get(file_name).cloned()
    }

    fn lookup(&self, address: &str) -> Result<(RootBlock, Arc<Mutex<SourceFile>>), ModuleError> {
        let block = self
            .block(address)
            .ok_or_else(|| ModuleError::BlockNotFound(address.to_string()))?;
        let file = self.file(&block.file_name).ok_or_else(|| detached(&block))?;
        Ok((block, file))
    }

    /// Runs `f` on the write tree of a (non local) root block
    ///
    /// The snapshot is rebuilt afterwards and the file is only marked changed if the block's text changed.
    pub fn update_block<T>(&self, address: &str, f: impl FnOnce(&mut Block) -> T) -> Result<T, ModuleError> {
        self.block_locks.with_lock(address, || {
            let (root, file) = self.lookup(address)?;
            if root.kind == BlockKind::Local {
                return Err(ModuleError::Unsupported {
                    address: address.to_string(),
                    operation: "block updates",
                });
            }

            let mut file = file.lock();
            let index = root.locator.find_block(&file.body).ok_or_else(|| detached(&root))?;
            let (result, changed, refreshed) = edit::with_block_at(&mut file.body, index, |block| {
                let before = edit::block_text(block);
                let result = f(block);
                let changed = edit::block_text(block) != before;
                (result, changed, root.refreshed_from_block(block))
            })
            .ok_or_else(|| detached(&root))?;

            if changed {
                tracing::debug!(address, "block changed");
                file.dirty = true;
                self.registry.write().insert(address.to_string(), refreshed);
            }
            Ok(result)
        })
    }

    /// Runs `f` on the attribute declaring a local
    ///
    /// `f` must not change the key of the attribute.
    pub fn update_local<T>(&self, address: &str, f: impl FnOnce(&mut Attribute) -> T) -> Result<T, ModuleError> {
        self.block_locks.with_lock(address, || {
            let (root, file) = self.lookup(address)?;
            let Locator::Local(name) = &root.locator else {
                return Err(ModuleError::Unsupported {
                    address: address.to_string(),
                    operation: "local updates",
                });
            };

            let mut file = file.lock();
            let locals = root.locator.find_locals_block(&file.body).ok_or_else(|| detached(&root))?;
            let (result, changed, refreshed) = edit::with_block_at(&mut file.body, locals, |block| {
                let index = edit::attribute_index(&block.body, name)?;
                edit::with_attribute_at(&mut block.body, index, |attribute| {
                    let before = attribute.value.to_string();
                    let result = f(attribute);
                    let changed = attribute.value.to_string() != before;
                    (result, changed, root.refreshed_from_local(attribute))
                })
            })
            .flatten()
            .ok_or_else(|| detached(&root))?;

            if changed {
                tracing::debug!(address, "local changed");
                file.dirty = true;
                self.registry.write().insert(address.to_string(), refreshed);
            }
            Ok(result)
        })
    }

    /// Runs `f` on the write tree of every file, including blocks without an address
    ///
    /// Files whose text changed are marked changed and the snapshots of their blocks are rebuilt.
    pub fn update_files(&self, mut f: impl FnMut(&mut Body)) {
        for file_name in self.file_names() {
            let Some(file) = self.file(&file_name) else {
                continue;
            };
            let mut file = file.lock();

            let before = file.body.to_string();
            f(&mut file.body);
            if file.body.to_string() == before {
                continue;
            }

            tracing::debug!(file_name, "file changed");
            file.dirty = true;
            let mut registry = self.registry.write();
            for snapshot in registry.values_mut().filter(|snapshot| snapshot.file_name == file_name) {
                if let Some(refreshed) = refreshed_from_body(snapshot, &file.body) {
                    *snapshot = refreshed;
                }
            }
        }
    }

    /// Detaches a block from its file and drops it from the registry
    ///
    /// Removing the last local of a `locals` block removes the `locals` block.
    pub fn remove_block(&self, address: &str) -> Result<RootBlock, ModuleError> {
        self.block_locks.with_lock(address, || {
            let (root, file) = self.lookup(address)?;
            let mut file = file.lock();

            match &root.locator {
                Locator::Block { .. } => {
                    let index = root.locator.find_block(&file.body).ok_or_else(|| detached(&root))?;
                    file.body.remove(index);
                }
                Locator::Local(name) => {
                    let locals = root.locator.find_locals_block(&file.body).ok_or_else(|| detached(&root))?;
                    let now_empty = edit::with_block_at(&mut file.body, locals, |block| {
                        if let Some(index) = edit::attribute_index(&block.body, name) {
                            block.body.remove(index);
                        }
                        block.body.is_empty()
                    });
                    if now_empty == Some(true) {
                        file.body.remove(locals);
                    }
                }
            }

            file.dirty = true;
            drop(file);
            tracing::debug!(address, "block removed");
            self.registry.write().shift_remove(address);
            Ok(root)
        })
    }

    /// Moves a block to the end of `file_name`, creating the file if needed
    ///
    /// Returns `false` if the block lives in `file_name` already.
    pub fn move_block(&self, address: &str, file_name: &str) -> Result<bool, ModuleError> {
        self.block_locks.with_lock(address, || {
            let (root, source) = self.lookup(address)?;
            if root.kind == BlockKind::Local {
                return Err(ModuleError::Unsupported {
                    address: address.to_string(),
                    operation: "moving",
                });
            }
            if root.file_name == file_name {
                tracing::debug!(address, file_name, "block is in target file already");
                return Ok(false);
            }

            let structure = {
                let mut source = source.lock();
                let index = root.locator.find_block(&source.body).ok_or_else(|| detached(&root))?;
                source.dirty = true;
                source.body.remove(index)
            };

            self.append_structure(file_name, structure);
            tracing::debug!(address, from = root.file_name, to = file_name, "block moved");
            self.registry.write().insert(address.to_string(), root.moved_to(file_name));
            Ok(true)
        })
    }

    /// Appends a new root block to `file_name` and registers it
    pub fn add_block(&self, kind: BlockKind, block: Block, file_name: &str) -> Result<String, ModuleError> {
        let labels: Vec<String> = block.labels.iter().map(|label| label.as_str().to_string()).collect();
        let address = kind.address(&labels);

        self.block_locks.with_lock(&address, || {
            if self.contains(&address) {
                return Err(ModuleError::BlockExists(address.clone()));
            }

            let snapshot = RootBlock::detached(kind, &block, file_name, self.module_ref.clone());
            self.append_structure(file_name, Structure::Block(block));
            tracing::debug!(address, file_name, "block added");
            self.registry.write().insert(address.clone(), snapshot);
            Ok(address.clone())
        })
    }

    /// Appends a `locals` block declaring `attribute` to `file_name` and registers the local
    pub fn add_local(&self, attribute: Attribute, file_name: &str) -> Result<String, ModuleError> {
        let name = attribute.key.as_str().to_string();
        let address = BlockKind::Local.address(std::slice::from_ref(&name));

        self.block_locks.with_lock(&address, || {
            if self.contains(&address) {
                return Err(ModuleError::BlockExists(address.clone()));
            }

            let mut snapshot = RootBlock::from_local(
                &attribute,
                file_name,
                self.module_ref.clone(),
                &LineIndex::default(),
            );
            snapshot.range = Default::default();
            snapshot.range.file_name = file_name.to_string();

            let mut locals = Block::new(hcl_edit::Ident::new("locals"));
            edit::set_attribute(&mut locals.body, attribute);
            self.append_structure(file_name, Structure::Block(locals));
            tracing::debug!(address, file_name, "local added");
            self.registry.write().insert(address.clone(), snapshot);
            Ok(address.clone())
        })
    }

    fn append_structure(&self, file_name: &str, structure: Structure) {
        self.file_locks.with_lock(file_name, || {
            let file = self.file_or_create(file_name);
            let mut file = file.lock();
            edit::push_root_structure(&mut file.body, structure);
            file.dirty = true;
        })
    }

    fn file_or_create(&self, file_name: &str) -> Arc<Mutex<SourceFile>> {
        if let Some(file) = self.file(file_name) {
            return file;
        }

        // a file on disk that was not loaded (e.g. an override file) must not be clobbered
        let path = self.dir().join(file_name);
        let original = std::fs::read_to_string(&path).ok();
        let body = original
            .as_deref()
            .and_then(|content| hcl_edit::parser::parse_body(content).ok())
            .unwrap_or_default();

        tracing::debug!(file_name, existing = original.is_some(), "adding file");
        self.files
            .write()
            .entry(file_name.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(SourceFile {
                    original,
                    body,
                    dirty: false,
                }))
            })
            .clone()
    }

    /// Names of files changed since load
    pub fn changed_files(&self) -> Vec<String> {
        self.files
            .read()
            .iter()
            .filter(|(_, file)| file.lock().dirty)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Writes all changed files, backing up their original content first
    ///
    /// Returns the written paths.
    pub fn save(&self) -> Result<Vec<PathBuf>, SaveError> {
        let files: Vec<_> = self
            .files
            .read()
            .iter()
            .map(|(name, file)| (name.clone(), file.clone()))
            .collect();

        let mut written = vec![];
        for (name, file) in files {
            let mut file = file.lock();
            if !file.dirty {
                continue;
            }

            let path = self.dir().join(&name);
            backup::write_backup(&path, file.original.as_deref())?;

            tracing::info!(path = %path.display(), "writing file");
            std::fs::write(&path, render(&file)).map_err(|source| SaveError::Write {
                path: path.clone(),
                source,
            })?;
            file.dirty = false;
            written.push(path);
        }

        Ok(written)
    }
}

fn render(file: &SourceFile) -> String {
    if file.dirty {
        format(&file.body.to_string())
    } else {
        file.original.clone().unwrap_or_default()
    }
}

/// Snapshot rebuilt from the current write tree of its file
fn refreshed_from_body(snapshot: &RootBlock, body: &Body) -> Option<RootBlock> {
    match &snapshot.locator {
        Locator::Block { .. } => {
            let index = snapshot.locator.find_block(body)?;
            Some(snapshot.refreshed_from_block(body.get(index)?.as_block()?))
        }
        Locator::Local(name) => {
            let index = snapshot.locator.find_locals_block(body)?;
            let attribute = body.get(index)?.as_block()?.body.get_attribute(name)?;
            Some(snapshot.refreshed_from_local(attribute))
        }
    }
}

fn detached(block: &RootBlock) -> ModuleError {
    ModuleError::Detached {
        address: block.address.clone(),
        file_name: block.file_name.clone(),
    }
}

/// Builds a [Module] from in-memory files
///
/// ```
/// let module = mapotf::module! {
///     "main.tf" => r#"resource "fake_resource" "this" {}"#,
/// };
/// assert!(module.contains("resource.fake_resource.this"));
/// ```
#[macro_export]
macro_rules! module {
    ($($name:expr => $content:expr),* $(,)?) => {
        $crate::module::Module::from_sources(".", [$(($name, $content)),*]).expect("sources must load")
    };
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn blocks_are_indexed_by_address() {
        let module = module! {
            "main.tf" => r#"
resource "fake_resource" "this" {}
data "fake_data" "this" {}
module "mod" {
  source = "./mod"
}
variable "name" {}
output "id" {
  value = 1
}
locals {
  a = 1
  b = 2
}
terraform {}
provider "fake" {}
"#,
        };

        let addresses: Vec<_> = module.blocks().into_iter().map(|block| block.address).collect();
        assert_eq!(
            addresses,
            vec![
                "resource.fake_resource.this",
                "data.fake_data.this",
                "module.mod",
                "variable.name",
                "output.id",
                "local.a",
                "local.b",
                "terraform",
            ]
        );
    }

    #[test]
    fn duplicate_addresses_fail() {
        let result = Module::from_sources(
            ".",
            [
                ("a.tf", "resource \"fake_resource\" \"this\" {}\n"),
                ("b.tf", "resource \"fake_resource\" \"this\" {}\n"),
            ],
        );

        let Err(LoadError::DuplicateAddress { address, first, second }) = result else {
            panic!("expected duplicate address error");
        };
        assert_eq!(address, "resource.fake_resource.this");
        assert_eq!(first, "a.tf");
        assert_eq!(second, "b.tf");
    }

    #[test]
    fn additional_terraform_blocks_are_ignored() {
        let module = module! {
            "a.tf" => "terraform {\n  required_version = \">= 1.0\"\n}\n",
            "b.tf" => "terraform {}\n",
        };
        assert_eq!(module.block("terraform").unwrap().file_name, "a.tf");
    }

    #[test]
    fn parse_errors_name_the_file() {
        let result = Module::from_sources(".", [("broken.tf", "resource {")]);
        let Err(LoadError::HclParseFailed { file_name, .. }) = result else {
            panic!("expected parse error");
        };
        assert_eq!(file_name, "broken.tf");
    }

    #[test]
    fn untouched_files_render_unchanged() {
        let source = "resource   \"fake_resource\" \"this\" {\n    # comment\n  tags = {}\n}\n";
        let module = module! { "main.tf" => source };
        assert_eq!(module.render("main.tf").as_deref(), Some(source));
        assert!(module.changed_files().is_empty());
    }

    #[test]
    fn update_refreshes_snapshot() {
        let module = module! { "main.tf" => "resource \"fake_resource\" \"this\" {\n}\n" };

        module
            .update_block("resource.fake_resource.this", |block| {
                edit::set_attribute(&mut block.body, edit::parse_attribute("tags", "{}").unwrap())
            })
            .unwrap();

        let block = module.block("resource.fake_resource.this").unwrap();
        assert_eq!(block.attributes["tags"].source(), "{}");
        assert_eq!(module.changed_files(), vec!["main.tf"]);
    }

    #[test]
    fn noop_update_keeps_file_clean() {
        let module = module! { "main.tf" => "resource \"fake_resource\" \"this\" {\n}\n" };
        module.update_block("resource.fake_resource.this", |_| ()).unwrap();
        assert!(module.changed_files().is_empty());
    }

    #[test]
    fn update_files_reaches_untracked_blocks() {
        let module = module! {
            "main.tf" => "provider \"fake\" {\n  region = \"a\"\n}\n\nlocals {\n  region = \"a\"\n}\n",
            "other.tf" => "variable \"x\" {}\n",
        };

        module.update_files(|body| {
            for index in 0..body.len() {
                edit::with_block_at(body, index, |block| {
                    edit::set_attribute(&mut block.body, edit::parse_attribute("region", "\"b\"").unwrap())
                });
            }
        });

        assert!(module.render("main.tf").unwrap().contains("provider \"fake\" {\n  region = \"b\""));
        assert_eq!(module.block("local.region").unwrap().local_value().unwrap().source(), "\"b\"");
        assert_eq!(module.changed_files(), vec!["main.tf", "other.tf"]);
    }

    #[test]
    fn removing_last_local_removes_locals_block() {
        let module = module! { "main.tf" => "locals {\n  a = 1\n}\n\nlocals {\n  b = 2\n  c = 3\n}\n" };

        module.remove_block("local.a").unwrap();
        module.remove_block("local.b").unwrap();

        assert!(!module.contains("local.a"));
        assert!(module.contains("local.c"));
        let rendered = hcl::from_str::<hcl::Body>(&module.render("main.tf").unwrap()).unwrap();
        assert_eq!(rendered, hcl::from_str::<hcl::Body>("locals {\n  c = 3\n}\n").unwrap());
    }

    #[test]
    fn unknown_addresses_fail() {
        let module = module! { "main.tf" => "" };
        assert_eq!(
            module.remove_block("resource.fake_resource.this").unwrap_err(),
            ModuleError::BlockNotFound("resource.fake_resource.this".to_string())
        );
    }

    #[test]
    fn move_block_to_new_file() {
        let module = module! {
            "main.tf" => "resource \"fake_resource\" \"this\" {}\n\nresource \"fake_resource\" \"that\" {}\n",
        };

        assert!(module.move_block("resource.fake_resource.this", "moved.tf").unwrap());
        assert!(!module.move_block("resource.fake_resource.this", "moved.tf").unwrap());

        assert_eq!(module.block("resource.fake_resource.this").unwrap().file_name, "moved.tf");
        assert_eq!(
            module.render("moved.tf").as_deref(),
            Some("resource \"fake_resource\" \"this\" {}\n")
        );
        assert_eq!(
            module.render("main.tf").as_deref(),
            Some("resource \"fake_resource\" \"that\" {}\n")
        );
    }

    #[test]
    fn locals_cannot_be_moved() {
        let module = module! { "main.tf" => "locals {\n  a = 1\n}\n" };
        assert!(matches!(
            module.move_block("local.a", "other.tf"),
            Err(ModuleError::Unsupported { .. })
        ));
    }

    #[test]
    fn add_block_rejects_existing_address() {
        let module = module! { "main.tf" => "resource \"fake_resource\" \"this\" {}\n" };
        let body = hcl_edit::parser::parse_body("resource \"fake_resource\" \"this\" {}\n").unwrap();
        let block = body.into_iter().next().and_then(|s| s.as_block().cloned()).unwrap();

        assert_eq!(
            module.add_block(BlockKind::Resource, block, "main.tf").unwrap_err(),
            ModuleError::BlockExists("resource.fake_resource.this".to_string())
        );
    }

    #[test]
    fn manifest_is_read() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".terraform/modules")).unwrap();
        std::fs::write(
            dir.path().join(MANIFEST_PATH),
            r#"{"Modules":[{"Key":"","Source":"","Dir":"."},{"Key":"net","Source":"./modules/net","Dir":"modules/net"},{"Key":"remote","Source":"registry.terraform.io/a/b/c","Version":"1.0.0","Dir":".terraform/modules/remote"}]}"#,
        )
        .unwrap();

        let modules = load_manifest(dir.path()).unwrap();

        let keys: Vec<_> = modules.iter().map(|module| module.key.as_str()).collect();
        assert_eq!(keys, vec!["", "net", "remote"]);
        assert!(modules[1].is_local());
        assert!(!modules[2].is_local());
        assert_eq!(modules[2].version, "1.0.0");
    }
}
