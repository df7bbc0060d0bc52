fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Client only; the image processor is a separate service.
    tonic_build::configure()
        .build_server(false)
        .build_client(true)
        .compile_protos(&["proto/image_processor.proto"], &["proto"])?;
    Ok(())
}
