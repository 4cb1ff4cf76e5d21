pub mod campaign;
pub mod candidates;
pub mod config;
pub mod daily;
pub mod stratify;
