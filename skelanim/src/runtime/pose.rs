use crate::model::BONE_FLAG_MASK;
use crate::{BoundingBox, Keyframe, KeyframeTrack, SkeletalModel};
use glam::{EulerRot, Mat4, Quat, Vec3};
use std::f32::consts::TAU;
use std::sync::Arc;

/// Radians per step of a packed 10-bit angle.
pub const PACKED_ANGLE_UNIT: f32 = TAU / 1024.0;

/// Decodes a packed rotation: x in bits 20..29, y in bits 10..19, z in bits 0..9, applied
/// as `Ry * Rx * Rz`.
pub fn rotation_from_packed(packed: u32) -> Mat4 {
    let x = ((packed >> 20) & 0x3ff) as f32 * PACKED_ANGLE_UNIT;
    let y = ((packed >> 10) & 0x3ff) as f32 * PACKED_ANGLE_UNIT;
    let z = (packed & 0x3ff) as f32 * PACKED_ANGLE_UNIT;
    Mat4::from_euler(EulerRot::YXZ, y, x, z)
}

/// Resolved keyframe position within a track.
#[derive(Copy, Clone, Debug)]
pub enum InterpolationInfo<'a> {
    Keyframe(&'a Keyframe),
    /// `bias` lies in `(0, 1)`.
    Interpolated {
        first: &'a Keyframe,
        second: &'a Keyframe,
        bias: f32,
    },
}

impl<'a> InterpolationInfo<'a> {
    /// Locates `frame` between the keyframes of `track`.
    ///
    /// The final segment is shortened when the frame count is not a multiple of the segment
    /// length.
    ///
    /// # Panics
    ///
    /// If `frame` lies outside the track or the track stores too few keyframes to cover it.
    pub fn from_track(track: &'a KeyframeTrack, frame: u32) -> Self {
        assert!(
            track.contains_frame(frame),
            "frame {frame} outside track frames {}..={}",
            track.first_frame,
            track.last_frame
        );
        assert!(track.segment_length > 0, "segment length must be > 0");

        let local = frame - track.first_frame;
        let index = (local / track.segment_length) as usize;
        let first = &track.keyframes[index];
        if frame >= track.last_frame {
            return Self::Keyframe(first);
        }
        let Some(second) = track.keyframes.get(index + 1) else {
            return Self::Keyframe(first);
        };

        let frame_count = track.frame_count();
        let mut segment_duration = track.segment_length;
        if (index as u32 + 1) * track.segment_length >= frame_count {
            let remainder = frame_count % track.segment_length;
            if remainder != 0 {
                segment_duration = remainder + 1;
            }
        }

        let segment_frame = local % segment_duration;
        if segment_frame == 0 {
            return Self::Keyframe(first);
        }
        Self::Interpolated {
            first,
            second,
            bias: segment_frame as f32 / segment_duration as f32,
        }
    }

    pub fn first(&self) -> &'a Keyframe {
        match *self {
            Self::Keyframe(keyframe) => keyframe,
            Self::Interpolated { first, .. } => first,
        }
    }

    pub fn bias(&self) -> f32 {
        match *self {
            Self::Keyframe(_) => 0.0,
            Self::Interpolated { bias, .. } => bias,
        }
    }

    pub fn bounding_box(&self) -> BoundingBox {
        match *self {
            Self::Keyframe(keyframe) => keyframe.bbox,
            Self::Interpolated {
                first,
                second,
                bias,
            } => first.bbox.lerp(&second.bbox, bias),
        }
    }
}

/// World placement of a posed object.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct WorldPlacement {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for WorldPlacement {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Sphere {
    /// World transform of the bone, translated to the mesh's collision center.
    pub transform: Mat4,
    pub radius: f32,
}

impl Sphere {
    pub fn center(&self) -> Vec3 {
        self.transform.w_axis.truncate()
    }
}

/// Turns keyframes into per-bone local transforms for one skeletal model.
#[derive(Clone, Debug)]
pub struct PoseEvaluator {
    model: Arc<SkeletalModel>,
    bone_patches: Vec<Mat4>,
    local_transforms: Vec<Mat4>,
    scratch: Vec<Mat4>,
    stack: Vec<Mat4>,
}

impl PoseEvaluator {
    pub fn new(model: Arc<SkeletalModel>) -> Self {
        Self {
            model,
            bone_patches: Vec::new(),
            local_transforms: Vec::new(),
            scratch: Vec::new(),
            stack: Vec::new(),
        }
    }

    pub fn model(&self) -> &Arc<SkeletalModel> {
        &self.model
    }

    /// Resets every bone patch to identity.
    pub fn reset_pose(&mut self) {
        self.bone_patches.clear();
        self.bone_patches
            .resize(self.model.bone_count(), Mat4::IDENTITY);
    }

    pub fn bone_patches(&self) -> &[Mat4] {
        &self.bone_patches
    }

    /// Sets a static correction applied after the bone's animated rotation.
    pub fn set_bone_patch(&mut self, bone: usize, patch: Mat4) {
        self.ensure_patches();
        assert!(
            bone < self.bone_patches.len(),
            "bone {bone} out of range for a model with {} bones",
            self.bone_patches.len()
        );
        self.bone_patches[bone] = patch;
    }

    /// Transforms written by the last [`update_pose`](Self::update_pose).
    pub fn local_transforms(&self) -> &[Mat4] {
        &self.local_transforms
    }

    /// Poses the model, returning one transform per bone.
    ///
    /// Interpolated positions pose both keyframes and blend the matrices entrywise.
    pub fn update_pose(&mut self, info: &InterpolationInfo<'_>) -> &[Mat4] {
        self.ensure_patches();
        let mut local = std::mem::take(&mut self.local_transforms);
        match *info {
            InterpolationInfo::Keyframe(keyframe) => {
                self.walk(keyframe, Mat4::IDENTITY, &mut local);
            }
            InterpolationInfo::Interpolated {
                first,
                second,
                bias,
            } => {
                let mut scratch = std::mem::take(&mut self.scratch);
                self.walk(first, Mat4::IDENTITY, &mut local);
                self.walk(second, Mat4::IDENTITY, &mut scratch);
                for (a, b) in local.iter_mut().zip(&scratch) {
                    *a = *a * (1.0 - bias) + *b * bias;
                }
                self.scratch = scratch;
            }
        }
        self.local_transforms = local;
        &self.local_transforms
    }

    /// World-space collision spheres for `frame`.
    ///
    /// Without a `base` transform the walk starts from the placement's rotation and the
    /// placement's position is added to every center; with one, `base` is expected to carry
    /// the translation.
    pub fn bone_collision_spheres(
        &mut self,
        placement: &WorldPlacement,
        frame: &Keyframe,
        base: Option<Mat4>,
    ) -> Vec<Sphere> {
        self.ensure_patches();
        let (seed, offset) = match base {
            Some(base) => (base * Mat4::from_quat(placement.rotation), Vec3::ZERO),
            None => (Mat4::from_quat(placement.rotation), placement.position),
        };

        let mut world = std::mem::take(&mut self.scratch);
        self.walk(frame, seed, &mut world);
        let spheres = world
            .iter()
            .zip(&self.model.meshes)
            .map(|(bone, mesh)| {
                let mut transform = *bone * Mat4::from_translation(mesh.center);
                transform.w_axis += offset.extend(0.0);
                Sphere {
                    transform,
                    radius: mesh.collision_size,
                }
            })
            .collect();
        self.scratch = world;
        spheres
    }

    fn ensure_patches(&mut self) {
        if self.bone_patches.is_empty() {
            self.reset_pose();
        }
    }

    fn walk(&mut self, keyframe: &Keyframe, seed: Mat4, out: &mut Vec<Mat4>) {
        let model = &self.model;
        let bone_count = model.meshes.len();
        assert!(bone_count > 0, "skeletal model has no meshes");
        assert_eq!(
            model.bone_tree.len(),
            bone_count - 1,
            "bone tree does not match the mesh count"
        );
        assert_eq!(self.bone_patches.len(), bone_count);

        let angle = |bone: usize| {
            keyframe
                .rotations
                .get(bone)
                .map_or(Mat4::IDENTITY, |packed| rotation_from_packed(*packed))
        };

        out.clear();
        self.stack.clear();
        self.stack.push(
            seed * Mat4::from_translation(keyframe.root_translation)
                * angle(0)
                * self.bone_patches[0],
        );
        out.push(self.stack[0]);

        for (i, node) in model.bone_tree.iter().enumerate() {
            let bone = i + 1;
            assert!(
                node.flags & !BONE_FLAG_MASK == 0,
                "bone {bone}: invalid flags {:#x}",
                node.flags
            );
            if node.pops() {
                assert!(self.stack.len() > 1, "bone {bone} pops the root transform");
                self.stack.pop();
            }
            let mut top = *self.stack.last().unwrap_or(&Mat4::IDENTITY);
            if node.pushes() {
                self.stack.push(top);
            }
            top = top * Mat4::from_translation(node.offset) * angle(bone) * self.bone_patches[bone];
            if let Some(last) = self.stack.last_mut() {
                *last = top;
            }
            out.push(top);
        }
    }
}
