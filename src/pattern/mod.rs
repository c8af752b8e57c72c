pub mod loader;
pub mod rhythm;
pub mod token;
