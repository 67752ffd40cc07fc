pub mod shared {
    pub mod constants;
    pub mod raw_frame;
    pub mod video_metadata;
    pub mod window_config;
}

pub mod storage {
    pub mod domain {
        pub mod frame_record;
        pub mod frame_store;
    }
    pub mod infrastructure;
}

pub mod video {
    pub mod domain {
        pub mod container_muxer;
        pub mod thumbnail_extractor;
        pub mod video_encoder;
    }
    pub mod infrastructure;
}

pub mod pipeline {
    pub mod encode_mux_pipeline;
    pub mod multi_frame_writer;
    pub mod pipeline_logger;
    pub mod window_selector;
}

pub mod publish {
    pub mod domain {
        pub mod clip_publisher;
    }
    pub mod infrastructure;
}
