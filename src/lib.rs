#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

mod builder;
mod changes;
pub mod compare;
pub mod diff_walker;
pub mod document;
pub mod hash;
pub mod refs;
mod resolver;
pub mod risky;
pub mod rules;
pub mod search_scope;
pub mod slug;
pub mod strategy;
mod types;
pub mod validation;

pub use builder::PackageVersionBuilder;
pub use changes::*;
pub use diff_walker::{DiffEngine, StructuralDiffEngine};
pub use resolver::{load_operations, Resolvers, VersionInfo, VersionReference};
pub use search_scope::SearchScopes;
pub use types::*;
