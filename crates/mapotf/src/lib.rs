//! # mapotf - meta programming for terraform
//!
//! For a user guide and material related to CLI usage see the README.
//!
//! ## Introduction for developers
//!
//! Read this to understand how `mapotf` works internally.
//!
//! ### Two kinds of HCL
//!
//! `mapotf` reads two kinds of files:
//! - Terraform files (`*.tf`), the files that get rewritten
//! - DSL files (`*.mptf.hcl`), which declare what to look up (`data` blocks) and what to change (`transform` blocks)
//!
//! ```hcl
//! data "resource" "all" {
//!   resource_type = "fake_resource"
//! }
//!
//! transform "update_in_place" "tags" {
//!   for_each             = data.resource.all.result.fake_resource
//!   target_block_address = each.value.mptf.block_address
//!   asstring {
//!     tags = "merge(${try(each.value.tags, "{}")}, { file_name = \"${each.value.mptf.range.file_name}\" })"
//!   }
//! }
//! ```
//!
//! ### Loading Terraform
//!
//! see [module::Module::load]
//!
//! Every `.tf` file is parsed with [hcl_edit], which keeps whitespace and comments. The parsed
//! [hcl_edit::structure::Body] of a file is its *write tree*: all changes happen there and it is what gets written back.
//!
//! Top-level blocks are indexed by address:
//!
//! | **block**                              | **address**                    |
//! |----------------------------------------|--------------------------------|
//! | `resource "fake_resource" "this" {}`   | `resource.fake_resource.this`  |
//! | `data "fake_data" "this" {}`           | `data.fake_data.this`          |
//! | `module "network" {}`                  | `module.network`               |
//! | `variable "name" {}`                   | `variable.name`                |
//! | `output "id" {}`                       | `output.id`                    |
//! | `locals { prefix = "x" }`              | `local.prefix`                 |
//! | `terraform {}`                         | `terraform`                    |
//!
//! For each address the [module::Module] keeps a [block::RootBlock] snapshot. A snapshot holds both views of every
//! attribute: the write form and the read form ([hcl::Expression]) used for evaluation. Nested blocks are grouped by
//! type; `dynamic "x" { content { ... } }` shows up as a nested block of type `x`.
//!
//! ### Exposing Terraform to the DSL
//!
//! see [context::block_value]
//!
//! Terraform attributes are never evaluated. The DSL sees every attribute as the string of its source text, nested
//! blocks as lists of objects ([value::list_of_object]) and an `mptf` object with the block's address and location.
//!
//! ### Running the DSL
//!
//! see [runner::run]
//!
//! 1. [config::Config] validates the DSL files and collects all [config::Declaration]s
//! 2. declarations are ordered by the `data.*` and `transform.*` they reference and by `depends_on`
//! 3. `data` blocks run a [data::Query] and store their result in the `data` variable
//! 4. `transform` blocks are decoded into a [transform::Transform] (this is where DSL expressions are evaluated) and
//!    applied to the write trees
//!
//! Values computed by the DSL end up in Terraform as text: a string field `tags = "merge(...)"` is parsed as the HCL
//! expression `merge(...)`. Use `asraw { ... }` to copy Terraform code without evaluating it.
//!
//! ### Output
//!
//! see [module::Module::save]
//!
//! Only changed files are written, after their original content was saved as `<file>.mptfbackup`
//! ([backup]). [format::format] normalizes indentation of changed files.
//!
pub mod backup;
pub mod block;
pub mod config;
pub mod context;
pub mod data;
pub mod edit;
pub mod eval;
pub mod format;
mod functions;
mod locks;
pub mod module;
pub mod runner;
pub mod transform;
pub mod value;
mod visit;
