pub mod encoder_factory;
pub mod ffmpeg_encoder;
pub mod ffmpeg_muxer;
pub mod jpeg_thumbnail_extractor;
