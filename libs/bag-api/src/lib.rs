// Derived impls name `bag_api::...`; make that path resolve inside this crate too.
extern crate self as bag_api;

pub mod config;

pub use bag_api_derive::{BagMessage, ConfigParams};
pub mod error;
pub mod ffi;
pub mod format;
pub mod message;
pub mod record;
pub mod schema;
pub mod std_msgs;
pub mod storage;
pub mod topic;
pub mod value;
