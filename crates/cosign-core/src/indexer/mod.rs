pub mod cells;
pub mod counts;
pub mod filesystem;
pub mod members;
pub mod parser;
pub mod pipeline;
pub mod pool;
pub mod topics;
