pub const MODEL_NAME: &str = "FaceBoxes.onnx";

/// Default camera device on Linux (V4L2).
pub const DEFAULT_CAMERA: &str = "/dev/video0";

pub const DEFAULT_SAVE_FOLDER: &str = "eval/";

pub const DEFAULT_DATA_ROOT: &str = "data";

/// File name of the generated list inside a dataset directory.
pub const IMAGE_LIST_FILENAME: &str = "img_list.txt";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
