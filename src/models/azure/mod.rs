//! Schemas loaded by `intel::azure`.

pub mod network;
pub mod subscription;
