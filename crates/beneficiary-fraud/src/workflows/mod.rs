pub mod fraud;
pub mod identification;
pub mod subscription;
