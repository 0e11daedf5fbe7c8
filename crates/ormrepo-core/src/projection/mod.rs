//! Projection materializer.
//!
//! Projections are read-only reshapings of fetched rows: value objects
//! ([`ProjectionKind::Dto`]), narrow views ([`ProjectionKind::Interface`]),
//! open views with computed fields, and views nesting other projections.
//! They never write anything back.

mod definition;
mod template;
mod view;

pub use definition::{Projection, ProjectionDef, ProjectionField, ProjectionKind, ProjectionRegistry};
pub use template::{Segment, Template};
pub use view::{ProjectionMaterializer, View, ViewValue};
