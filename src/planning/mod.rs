//! Address planning engine: prefix arithmetic, node trees, layout lifecycle
//! and usage reports. Storage is reached only through [`PlanStore`].

mod error;
mod layout;
mod plan;
mod prefix;
mod report;
mod store;
mod tree;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{PlanError, Result};
pub use report::get_net_nodes_list;
pub use store::PlanStore;
pub use tree::NodeTree;
