pub mod actor;
pub mod chain;
pub mod entity;
pub mod status;
