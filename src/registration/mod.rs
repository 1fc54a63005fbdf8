pub mod drift;
pub mod engine;
pub mod geometry;
pub mod mapping;
pub mod origin_voting;
pub mod relative_anchors;
pub mod single_anchor;
pub mod transform;
pub mod validator;

#[cfg(test)]
pub(crate) mod testutil;
