pub mod directory;
pub mod r2;
