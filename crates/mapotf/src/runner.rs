//! Drives a DSL configuration against a module
//!
//! Declarations run in dependency order. A declaration depends on every `data.<type>.<name>` and
//! `transform.<type>.<name>` it references, including the ones listed in `depends_on`. Independent declarations keep
//! the order they were loaded in.
use crate::config::{Config, Declaration, DeclarationKind};
use crate::module::{load_manifest, Module};
use crate::transform::Transform;
use crate::visit::{traversal_paths, TraversalPath};
use crate::{data, eval};
use anyhow::Context as _;
use hcl::value::Map;
use hcl::Value;
use hcl_edit::structure::{Body, Structure};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// What a run did
#[derive(Debug, Default, PartialEq)]
pub struct Summary {
    pub queries: usize,
    pub transforms: usize,
}

/// Declarations in execution order
pub fn order(config: &Config) -> anyhow::Result<Vec<&Declaration>> {
    let mut pending: Vec<(&Declaration, HashSet<String>)> = vec![];
    for declaration in config.declarations() {
        pending.push((declaration, dependencies(declaration, config)?));
    }

    let mut done: HashSet<String> = HashSet::new();
    let mut ordered = vec![];
    while !pending.is_empty() {
        let Some(next) = pending
            .iter()
            .position(|(_, dependencies)| dependencies.iter().all(|dependency| done.contains(dependency)))
        else {
            let stuck: Vec<String> = pending.iter().map(|(declaration, _)| declaration.address()).collect();
            anyhow::bail!("dependency cycle between {}", stuck.join(", "));
        };

        let (declaration, _) = pending.remove(next);
        done.insert(declaration.address());
        ordered.push(declaration);
    }

    Ok(ordered)
}

/// Addresses of the declarations `declaration` references
fn dependencies(declaration: &Declaration, config: &Config) -> anyhow::Result<HashSet<String>> {
    let own_address = declaration.address();
    let address_of = |path: &[String]| match path {
        [kind, declaration_type, name, ..] if kind == "data" || kind == "transform" => {
            Some(format!("{kind}.{declaration_type}.{name}"))
        }
        _ => None,
    };

    let mut dependencies = HashSet::new();
    let body: hcl::Body = without_raw_content(&declaration.body).into();
    for path in traversal_paths(&body) {
        if let Some(address) = address_of(&path) {
            if address != own_address && config.get(&address).is_some() {
                dependencies.insert(address);
            }
        }
    }

    if let Some(depends_on) = declaration.body.get_attribute("depends_on") {
        let expression: hcl::Expression = depends_on.value.clone().into();
        let hcl::Expression::Array(entries) = expression else {
            anyhow::bail!("{own_address}: `depends_on` must be a list");
        };
        for entry in entries {
            let path = match &entry {
                hcl::Expression::Traversal(traversal) => traversal.path(),
                hcl::Expression::String(address) => address.split('.').map(str::to_string).collect(),
                other => anyhow::bail!("{own_address}: `{other}` in `depends_on` is not an address"),
            };
            let address = address_of(&path)
                .filter(|address| config.get(address).is_some())
                .with_context(|| format!("{own_address}: unknown `depends_on` target `{}`", path.join(".")))?;
            dependencies.insert(address);
        }
    }

    Ok(dependencies)
}

/// `asraw` blocks hold Terraform code, their references are not DSL dependencies
fn without_raw_content(body: &Body) -> Body {
    let mut stripped = Body::new();
    for structure in body.iter() {
        match structure {
            Structure::Block(block) if block.ident.as_str() == "asraw" => {}
            Structure::Block(block) => {
                let mut block = block.clone();
                block.body = without_raw_content(&block.body);
                stripped.push(block);
            }
            Structure::Attribute(attribute) => stripped.push(attribute.clone()),
        }
    }
    stripped
}

/// `(each.key, each.value)` for every instance, `None` without `for_each`
///
/// Objects iterate in key order, lists bind key and value to the element.
fn instances(declaration: &Declaration, context: &hcl::eval::Context) -> anyhow::Result<Option<Vec<(Value, Value)>>> {
    let Some(for_each) = declaration.body.get_attribute("for_each") else {
        return Ok(None);
    };

    let expression: hcl::Expression = for_each.value.clone().into();
    let value = eval::evaluate(&expression, context)?;
    let instances = match value {
        Value::Object(object) => {
            let mut entries: Vec<_> = object.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            entries
                .into_iter()
                .map(|(key, value)| (Value::String(key), value))
                .collect()
        }
        Value::Array(elements) => elements
            .into_iter()
            .map(|element| (element.clone(), element))
            .collect(),
        other => anyhow::bail!("`for_each` must be a map or a list, found `{}`", crate::value::coerce_to_string(&other)),
    };
    Ok(Some(instances))
}

fn instance_key(key: &Value) -> String {
    crate::value::coerce_to_string(key)
}

/// Evaluated values of the declarations run so far, `data.<type>.<name>` and `transform.<type>.<name>`
#[derive(Debug, Default)]
struct Scope {
    data: Map<String, Value>,
    transform: Map<String, Value>,
}

impl Scope {
    fn context(&self, each: Option<&(Value, Value)>) -> hcl::eval::Context<'static> {
        let mut variables = vec![
            ("data", Value::Object(self.data.clone())),
            ("transform", Value::Object(self.transform.clone())),
        ];
        if let Some((key, value)) = each {
            let each: Map<String, Value> = [("key".to_string(), key.clone()), ("value".to_string(), value.clone())]
                .into_iter()
                .collect();
            variables.push(("each", Value::Object(each)));
        }
        eval::context(variables)
    }

    fn insert(&mut self, declaration: &Declaration, value: Value) {
        let scope = match declaration.kind {
            DeclarationKind::Data => &mut self.data,
            DeclarationKind::Transform => &mut self.transform,
        };
        let by_name = scope
            .entry(declaration.declaration_type.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(by_name) = by_name {
            by_name.insert(declaration.name.clone(), value);
        }
    }
}

/// Runs all declarations of `config` against `module`
///
/// Nothing is written, see [Module::save].
pub fn run(config: &Config, module: &Module) -> anyhow::Result<Summary> {
    let mut scope = Scope::default();
    let mut summary = Summary::default();

    for declaration in order(config)? {
        let address = declaration.address();
        tracing::debug!(address, "running");

        let instances = instances(declaration, &scope.context(None))
            .with_context(|| format!("{address}: failed to evaluate `for_each`"))?;

        let value = match declaration.kind {
            DeclarationKind::Data => {
                let query = |each: Option<&(Value, Value)>| {
                    data::evaluate(
                        &declaration.declaration_type,
                        &declaration.body,
                        &scope.context(each),
                        module,
                    )
                    .with_context(|| format!("{address}: query failed"))
                };
                let value = match &instances {
                    None => query(None)?,
                    Some(instances) => {
                        let mut values = Map::new();
                        for instance in instances {
                            values.insert(instance_key(&instance.0), query(Some(instance))?);
                        }
                        Value::Object(values)
                    }
                };
                summary.queries += 1;
                value
            }
            DeclarationKind::Transform => {
                let decode = |each: Option<&(Value, Value)>| {
                    Transform::decode(
                        &declaration.declaration_type,
                        &declaration.body,
                        &scope.context(each),
                        module,
                    )
                    .with_context(|| format!("{address}: failed to decode"))
                };

                let transforms = match &instances {
                    None => vec![(None, decode(None)?)],
                    Some(instances) => instances
                        .iter()
                        .map(|instance| Ok((Some(instance_key(&instance.0)), decode(Some(instance))?)))
                        .collect::<anyhow::Result<Vec<_>>>()?,
                };

                for (key, transform) in &transforms {
                    transform.apply(module).with_context(|| match key {
                        Some(key) => format!("{address}[{key}]: failed to apply"),
                        None => format!("{address}: failed to apply"),
                    })?;
                    summary.transforms += 1;
                }

                transform_value(&address, &instances)
            }
        };

        scope.insert(declaration, value);
    }

    tracing::info!(
        module = %module.dir().display(),
        queries = summary.queries,
        transforms = summary.transforms,
        "configuration applied"
    );
    Ok(summary)
}

fn transform_value(address: &str, instances: &Option<Vec<(Value, Value)>>) -> Value {
    let id = |id: String| Value::Object([("id".to_string(), Value::String(id))].into_iter().collect());
    match instances {
        None => id(address.to_string()),
        Some(instances) => Value::Object(
            instances
                .iter()
                .map(|(key, _)| {
                    let key = instance_key(key);
                    let value = id(format!("{address}[{key}]"));
                    (key, value)
                })
                .collect(),
        ),
    }
}

/// Loads the DSL in `mptf_dir`, applies it to the module(s) in `tf_dir` and saves the result
///
/// With `recursive` every local module listed in the modules manifest is transformed too. All modules are transformed
/// before anything is written.
pub fn transform(tf_dir: &Path, mptf_dir: &Path, recursive: bool) -> anyhow::Result<Vec<PathBuf>> {
    let config = Config::load(mptf_dir)
        .with_context(|| format!("failed to load configuration from {}", mptf_dir.display()))?;
    tracing::info!(declarations = config.len(), "configuration loaded");

    let module_refs = if recursive {
        load_manifest(tf_dir)?
            .into_iter()
            .filter(|module| module.is_root() || module.is_local())
            .collect()
    } else {
        vec![crate::module::ModuleRef::root(tf_dir)]
    };

    let mut modules = vec![];
    for module_ref in module_refs {
        let dir = module_ref.abs_dir.clone();
        let module = Module::load_module(module_ref)
            .with_context(|| format!("failed to load terraform module {}", dir.display()))?;
        run(&config, &module).with_context(|| format!("failed to transform {}", dir.display()))?;
        modules.push(module);
    }

    let mut written = vec![];
    for module in &modules {
        written.extend(module.save()?);
    }
    Ok(written)
}
