// Client stubs for the two back-end services the Frontend orchestrates
fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=../proto/services/storage_service.proto");
    println!("cargo:rerun-if-changed=../proto/services/encryption_service.proto");

    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    tonic_build::configure()
        .build_server(false)
        .build_client(true)
        .compile_protos(
            &[
                "../proto/services/storage_service.proto",
                "../proto/services/encryption_service.proto",
            ],
            &["../proto/services"],
        )?;

    Ok(())
}
