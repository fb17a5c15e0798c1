//! Storage service: encrypted message rows, view counters and the reminder log

pub mod cleanup;
pub mod config;
pub mod db;
pub mod error;
pub mod grpc;
pub mod models;
pub mod service;

pub mod pb {
    tonic::include_proto!("passwordexchange.storage.v1");

    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("storage_descriptor");
}

pub use error::StorageError;
pub use service::StorageService;
