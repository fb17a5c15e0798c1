//! Encryption service: AES-256-GCM, key generation and message identifiers

pub mod config;
pub mod crypto;
pub mod error;
pub mod grpc;

pub mod pb {
    tonic::include_proto!("passwordexchange.encryption.v1");

    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("encryption_descriptor");
}

pub use error::EncryptionError;
