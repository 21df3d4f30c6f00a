//! Ports - Trait seams between the pipeline and the outside world.

pub mod processor;
pub mod repository;
pub mod storage;
