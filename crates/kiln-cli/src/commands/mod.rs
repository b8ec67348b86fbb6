pub mod build;
pub mod dump;
