//! Reporting projections over the chart of accounts.

pub mod projector;

pub use projector::{HierarchyIter, HierarchyNode, project};
