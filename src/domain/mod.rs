pub mod policy;
pub mod status;
