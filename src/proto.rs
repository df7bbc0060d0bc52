//! Generated wire types and client for `imageprocessor.ImageProcessorService`.

tonic::include_proto!("imageprocessor");
