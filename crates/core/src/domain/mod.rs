pub mod plan;
pub mod subscriber;
pub mod subscription;
pub mod usage;
