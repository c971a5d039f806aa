//! FaceBoxes face detection: anchor generation, box decoding and
//! suppression over network output, plus the capture, inference, drawing
//! and saving adapters that make up the live camera pipeline.

pub mod shared {
    pub mod constants;
    pub mod frame;
    pub mod stream_metadata;
}

pub mod detection {
    pub mod domain {
        pub mod anchor;
        pub mod box_decoder;
        pub mod detection;
        pub mod detection_config;
        pub mod inference_provider;
        pub mod post_processor;
        pub mod suppression;
    }
    pub mod infrastructure;
}

pub mod video {
    pub mod domain {
        pub mod frame_source;
        pub mod image_writer;
    }
    pub mod infrastructure {
        pub mod ffmpeg_camera_reader;
        pub mod image_file_writer;
    }
}

pub mod rendering {
    pub mod domain {
        pub mod frame_annotator;
    }
    pub mod infrastructure {
        pub mod box_annotator;
    }
}

pub mod pipeline {
    pub mod camera_detection_use_case;
    pub mod pipeline_logger;
}

pub mod dataset {
    pub mod image_list;
}
