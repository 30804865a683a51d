//! Query builders for clinical dataset generation
//!
//! Two backends share one contract and one set of value-lowering rules:
//!
//! - [`CriteriaQuery`]: typed filters over entity property paths, resolved
//!   through a [`ModelRegistry`]
//! - [`SqlQuery`]: hand-written SQL fragments with positional placeholders
//!
//! Both stage large membership filters through the shared
//! [`IdSetStore`](chartset_core::IdSetStore) and release exactly the staged
//! copies they acquired, so concurrent evaluations can share one staged set.

pub mod criteria;
mod exec;
pub mod lower;
pub mod model;
pub mod session;
pub mod sql;

pub use criteria::CriteriaQuery;
pub use lower::{Direction, JoinKind, Lowered, Operand, lower_equal, upper_bound};
pub use model::{AssociationModel, EntityModel, ModelRegistry, PropertyModel};
pub use session::{QueryBuilder, Session};
pub use sql::SqlQuery;
