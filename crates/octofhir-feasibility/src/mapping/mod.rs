//! Term code mappings and concept expansion.

mod context;
mod loader;
mod model;
mod tree;

pub use context::{Clock, MappingContext};
pub use loader::{load_mappings, load_tree};
pub use model::{
    AttributeMapping, AttributeType, FixedCriterion, FixedCriterionType, Mapping, ValueType,
};
pub use tree::{MappingTree, ModuleRoot, TreeEntry};
