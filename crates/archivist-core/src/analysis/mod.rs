pub mod duplicates;
pub mod resolve;

pub use duplicates::DuplicateQueryEngine;
pub use resolve::{apply_merge, plan_merge, MergeOutcome, MergePlan, ResolverInput};
