//! ormrepo core - query derivation, projections and paging over a store.
//!
//! Repositories declare their query methods in a [`QueryTable`]. Each method
//! resolves once into an immutable [`QueryDescriptor`], cached by signature
//! in a shared [`DescriptorCache`]; a [`Session`] binds arguments, runs the
//! descriptor against the [`Store`] and shapes the rows into entities,
//! projections, pages or slices.
//!
//! ```rust
//! use ormrepo_core::model::{self, Member, MemberRepository};
//! use ormrepo_core::{PageRequest, RepositoryConfig, SessionFactory, Sort, StorageConfig};
//!
//! let factory = SessionFactory::open(
//!     StorageConfig::temporary(),
//!     RepositoryConfig::default(),
//!     model::catalog(),
//! )
//! .unwrap();
//! let mut session = factory.open_session();
//! let mut members = MemberRepository::new(&mut session);
//! members.save(&Member::new("memberA", 10)).unwrap();
//!
//! let request = PageRequest::of_sorted(0, 3, Sort::by_desc("username")).unwrap();
//! let page = members.find_by_age(10, &request).unwrap();
//! assert_eq!(page.total_elements(), 1);
//! ```

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod bulk;
pub mod catalog;
pub mod config;
pub mod context;
pub mod entity;
pub mod error;
pub mod example;
pub mod model;
pub mod paging;
pub mod projection;
pub mod query;
pub mod repository;
pub mod session;
pub mod storage;

pub use bulk::BulkMutationExecutor;
pub use catalog::{Catalog, EntityDef, FieldDef, IdGeneration, RelationDef, ScalarType};
pub use config::RepositoryConfig;
pub use context::PersistenceContext;
pub use entity::{Audit, AuditorProvider, Entity, FixedAuditor, Reference, SharedAuditor};
pub use error::{Error, Result, StoreError};
pub use example::{Example, ExampleMatcher, StringMatcher};
pub use paging::{Page, PageRequest, Slice, Sort};
pub use projection::{Projection, ProjectionDef, ProjectionMaterializer, View};
pub use query::{
    Args, DescriptorCache, QueryDescriptor, QueryExecutor, QueryMethod, QueryTable, ResultShape,
};
pub use repository::Repository;
pub use session::{Session, SessionFactory};
pub use storage::{SledStore, StorageConfig, Store, TransactionId};

/// Re-export the shared value types.
pub use ormrepo_proto as proto;
