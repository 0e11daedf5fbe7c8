//! Query layer: method tables, derivation, descriptors, binding and
//! execution.

pub mod binding;
pub mod cache;
pub mod derivation;
pub mod descriptor;
pub mod executor;
pub mod filter;
pub mod method;
pub mod resolver;

pub use binding::{Args, Binder};
pub use cache::{CacheStats, DescriptorCache};
pub use derivation::{derive, DerivedQuery, Subject};
pub use descriptor::{
    Arg, Clause, Column, CountPlan, NativePlan, Output, ParamSlot, Plan, Predicate,
    QueryDescriptor, ResultShape, SelectPlan, UpdateExpr, UpdatePlan,
};
pub use executor::QueryExecutor;
pub use filter::FilterEvaluator;
pub use method::{ProjectionSource, QueryMethod, QuerySource, QueryTable, Returns};
pub use resolver::{method_signature, query_signature, DescriptorResolver};
