use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown keyframe track: {index}")]
    UnknownTrack { index: usize },

    #[error("invalid value: {message}")]
    InvalidValue { message: String },

    #[error(
        "invalid clip window [{start}, {end}] for track '{track}' with duration {duration}"
    )]
    InvalidClipWindow {
        track: String,
        start: f32,
        end: f32,
        duration: f32,
    },

    #[error("channel {channel} of track '{track}': {message}")]
    InvalidChannel {
        track: String,
        channel: usize,
        message: String,
    },

    #[error("invalid curve point {point}: expected {expected} components, got {actual}")]
    CurveArity {
        point: usize,
        expected: usize,
        actual: usize,
    },

    #[error("track {track} references unknown track {target} ({context})")]
    DanglingTrackReference {
        track: usize,
        target: usize,
        context: &'static str,
    },

    #[error("track {track} has no keyframes covering frames {first}..={last}")]
    MissingKeyframes { track: usize, first: u32, last: u32 },

    #[error("invalid bone flags {flags:#x} for bone {bone}")]
    InvalidBoneFlags { bone: usize, flags: u32 },

    #[error("bone tree has {bones} entries but the model has {meshes} meshes")]
    BoneTreeMismatch { bones: usize, meshes: usize },

    #[cfg(feature = "json")]
    #[error("failed to parse animation JSON: {message}")]
    JsonParse { message: String },

    #[cfg(feature = "binary")]
    #[error("failed to decode keyframe data: {message}")]
    BinaryParse { message: String },
}
