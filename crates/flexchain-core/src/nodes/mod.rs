//! Built-in node implementations.

pub mod end;
pub mod expr;
pub mod fn_node;
pub mod router;
pub mod set;
pub mod start;

pub use end::EndNode;
pub use expr::ExprNode;
pub use fn_node::{AsyncFnNode, FnNode};
pub use router::RouterNode;
pub use set::SetNode;
pub use start::StartNode;
