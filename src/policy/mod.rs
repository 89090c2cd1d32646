pub mod acl;
pub mod constraint;
pub mod errors;
pub mod expression;
pub mod tree;
