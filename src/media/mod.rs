pub mod feed;
pub mod proc;
pub mod relay;
pub mod sink;
