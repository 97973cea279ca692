use crate::Error;
use glam::Vec3;
use std::sync::Arc;

/// Axis-aligned box reported by keyframes for collision and camera queries.
#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Linear blend of two boxes, `bias == 0` yields `self`.
    pub fn lerp(&self, other: &BoundingBox, bias: f32) -> BoundingBox {
        BoundingBox {
            min: self.min.lerp(other.min, bias),
            max: self.max.lerp(other.max, bias),
        }
    }
}

/// One stored pose sample.
///
/// `rotations` holds one packed angle triple per bone. It may be shorter than the bone count;
/// bones past its end only receive their offset and patch.
#[derive(Clone, Debug, PartialEq)]
pub struct Keyframe {
    pub bbox: BoundingBox,
    pub root_translation: Vec3,
    pub rotations: Vec<u32>,
}

impl Keyframe {
    pub fn num_values(&self) -> usize {
        self.rotations.len()
    }
}

pub const BONE_POP: u32 = 0x01;
pub const BONE_PUSH: u32 = 0x02;
pub(crate) const BONE_FLAG_MASK: u32 = BONE_POP | BONE_PUSH;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BoneNode {
    pub offset: Vec3,
    pub flags: u32,
}

impl BoneNode {
    pub fn new(offset: Vec3, flags: u32) -> Self {
        Self { offset, flags }
    }

    pub fn pops(&self) -> bool {
        self.flags & BONE_POP != 0
    }

    pub fn pushes(&self) -> bool {
        self.flags & BONE_PUSH != 0
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct MeshInfo {
    /// Collision sphere center in bone space.
    pub center: Vec3,
    pub collision_size: f32,
}

/// Per-model bone hierarchy, encoded as a push/pop program over a flat array.
///
/// `bone_tree[i - 1]` describes bone `i`; bone 0 is the root and has no entry.
#[derive(Clone, Debug)]
pub struct SkeletalModel {
    pub bone_tree: Vec<BoneNode>,
    pub meshes: Vec<MeshInfo>,
}

impl SkeletalModel {
    pub fn new(bone_tree: Vec<BoneNode>, meshes: Vec<MeshInfo>) -> Result<Arc<Self>, Error> {
        if meshes.is_empty() || bone_tree.len() != meshes.len() - 1 {
            return Err(Error::BoneTreeMismatch {
                bones: bone_tree.len(),
                meshes: meshes.len(),
            });
        }
        for (i, node) in bone_tree.iter().enumerate() {
            if node.flags & !BONE_FLAG_MASK != 0 {
                return Err(Error::InvalidBoneFlags {
                    bone: i + 1,
                    flags: node.flags,
                });
            }
        }
        Ok(Arc::new(Self { bone_tree, meshes }))
    }

    pub fn bone_count(&self) -> usize {
        self.meshes.len()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TransitionCase {
    pub first_frame: u32,
    pub last_frame: u32,
    pub target_track: usize,
    pub target_frame: u32,
}

impl TransitionCase {
    pub fn contains(&self, frame: u32) -> bool {
        frame >= self.first_frame && frame <= self.last_frame
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Transition {
    pub state_id: u16,
    pub cases: Vec<TransitionCase>,
}

/// An authored keyframe track together with its outgoing transitions.
///
/// Frame numbers are absolute: a track covers `first_frame..=last_frame`, and one keyframe is
/// stored every `segment_length` frames.
#[derive(Clone, Debug)]
pub struct KeyframeTrack {
    pub state_id: u16,
    pub first_frame: u32,
    pub last_frame: u32,
    pub segment_length: u32,
    pub keyframes: Arc<[Keyframe]>,
    pub next_track: usize,
    pub next_frame: u32,
    pub transitions: Vec<Transition>,
    /// 16.16 fixed point.
    pub speed: i32,
    /// 16.16 fixed point, applied per frame.
    pub acceleration: i32,
}

impl KeyframeTrack {
    pub fn frame_count(&self) -> u32 {
        self.last_frame - self.first_frame + 1
    }

    pub fn contains_frame(&self, frame: u32) -> bool {
        frame >= self.first_frame && frame <= self.last_frame
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub enum Interpolation {
    #[default]
    Linear,
    Stepped,
    /// Ease curve with normalized control points, `(0, 0)` and `(1, 1)` are implied.
    Bezier {
        cx1: f32,
        cy1: f32,
        cx2: f32,
        cy2: f32,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct CurvePoint {
    /// Normalized track time in `0..=1`.
    pub time: f32,
    pub value: Vec<f32>,
    pub interpolation: Interpolation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Curve {
    components: usize,
    points: Vec<CurvePoint>,
}

impl Curve {
    pub fn new(components: usize, mut points: Vec<CurvePoint>) -> Result<Self, Error> {
        if components == 0 {
            return Err(Error::InvalidValue {
                message: "curve must have at least one component".to_string(),
            });
        }
        if points.is_empty() {
            return Err(Error::InvalidValue {
                message: "curve must have at least one point".to_string(),
            });
        }
        for (i, point) in points.iter().enumerate() {
            if point.value.len() != components {
                return Err(Error::CurveArity {
                    point: i,
                    expected: components,
                    actual: point.value.len(),
                });
            }
            if !point.time.is_finite() {
                return Err(Error::InvalidValue {
                    message: format!("curve point {i} has a non-finite time"),
                });
            }
        }
        points.sort_by(|a, b| a.time.total_cmp(&b.time));
        Ok(Self { components, points })
    }

    pub fn components(&self) -> usize {
        self.components
    }

    pub fn points(&self) -> &[CurvePoint] {
        &self.points
    }
}

/// Binds one animatable property of a target object to a curve.
#[derive(Clone, Debug, PartialEq)]
pub struct Channel {
    pub target: usize,
    pub property_id: u32,
    pub curve: Curve,
}

/// Immutable source animation shared by many clips.
#[derive(Clone, Debug)]
pub struct Track {
    pub name: String,
    pub duration: f32,
    pub channels: Vec<Channel>,
}

impl Track {
    pub fn new(
        name: impl Into<String>,
        duration: f32,
        channels: Vec<Channel>,
    ) -> Result<Arc<Self>, Error> {
        let name = name.into();
        if !duration.is_finite() || duration < 0.0 {
            return Err(Error::InvalidValue {
                message: format!("track '{name}' duration must be finite and >= 0"),
            });
        }
        for (i, channel) in channels.iter().enumerate() {
            let out_of_range = channel
                .curve
                .points()
                .iter()
                .any(|p| p.time < 0.0 || p.time > 1.0);
            if out_of_range {
                return Err(Error::InvalidChannel {
                    track: name,
                    channel: i,
                    message: "curve point times must lie in 0..=1".to_string(),
                });
            }
        }
        Ok(Arc::new(Self {
            name,
            duration,
            channels,
        }))
    }
}
