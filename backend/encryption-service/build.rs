// Compiles encryption_service.proto; the client is generated for the
// in-process integration tests and for the frontend test suite
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=../proto/services/encryption_service.proto");

    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    let out_dir = PathBuf::from(std::env::var("OUT_DIR")?);

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .file_descriptor_set_path(out_dir.join("encryption_descriptor.bin"))
        .compile_protos(
            &["../proto/services/encryption_service.proto"],
            &["../proto/services"],
        )?;

    Ok(())
}
