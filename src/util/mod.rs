pub mod retention;
pub mod trash;
