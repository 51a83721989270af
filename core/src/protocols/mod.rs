//! Application-layer protocol reconstruction.

pub mod stream;
