pub mod cache;
#[allow(clippy::module_inception)]
pub mod db;
pub mod resultdb;
