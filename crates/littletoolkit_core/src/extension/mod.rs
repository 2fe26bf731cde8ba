//! Extension engine.
//!
//! Install pipeline for `.ltc` descriptors: parse, validate, gate runtime
//! capabilities, reject duplicate names, evaluate the Starlark code body in
//! an isolated module, bind `main` to a host action and place a control on
//! the host action surface. Triggered actions run on a worker pool.

pub mod binder;
pub mod capability;
pub mod catalog;
pub mod descriptor;
pub mod dispatch;
pub mod loader;
pub mod manager;
pub mod registry;
pub mod surface;
