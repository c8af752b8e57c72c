pub mod decode;
pub mod export;
pub mod level;
pub mod source;
