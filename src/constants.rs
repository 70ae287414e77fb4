//! Application constants

/// Frames sampled per second of video
pub const FRAMES_PER_SECOND: u32 = 1;

/// Maximum encoded size of a frame submitted to the detector (5 MB)
pub const MAX_FRAME_BYTES: usize = 5 * 1024 * 1024;

/// Default maximum upload size for videos (200 MB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

/// Multipart field carrying the uploaded video
pub const VIDEO_FIELD: &str = "video";

/// Prefix of per-request scratch directories
pub const SCRATCH_DIR_PREFIX: &str = "ppe_upload_";

/// Equipment types the detector is asked to summarize
pub const REQUIRED_EQUIPMENT_TYPES: [&str; 3] = ["FACE_COVER", "HAND_COVER", "HEAD_COVER"];
