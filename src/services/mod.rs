pub mod ad_service;
pub mod ad_store;
pub mod disk_uploader;
pub mod image_processor;
pub mod object_uploader;
pub mod photo_store;
pub mod s3_uploader;
