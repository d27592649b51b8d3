//! The literature pipeline's nodes.
//!
//! Each node owns its collaborators and absorbs their failures: a failed
//! call is logged and the node returns whatever partial update still makes
//! sense, so a job keeps moving.

pub mod classify;
pub mod extract;
pub mod refine;
pub mod retrieve;
pub mod validate;

pub use classify::ClassifyNode;
pub use extract::ExtractNode;
pub use refine::RefineNode;
pub use retrieve::RetrieveNode;
pub use validate::ValidateNode;
