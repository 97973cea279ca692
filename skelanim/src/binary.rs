//! Decoder for packed keyframe streams.
//!
//! The stream is a sequence of little-endian 16-bit words. Each keyframe is laid out as:
//!
//! - bounding box: min x, min y, min z, max x, max y, max z (`i16` each)
//! - root translation: x, y, z (`i16` each)
//! - one packed rotation per bone, stored as two `u16` words, high word first
//!
//! The decoder is IO-free: it operates on an in-memory byte slice.

use crate::{BoundingBox, Error, Keyframe};
use byteorder::{ByteOrder, LittleEndian};
use glam::Vec3;

const HEADER_WORDS: usize = 9;

struct WordInput<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> WordInput<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, cursor: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.cursor)
    }

    fn read_u16(&mut self) -> Result<u16, Error> {
        if self.remaining() < 2 {
            return Err(Error::BinaryParse {
                message: format!("unexpected EOF at byte {}", self.cursor),
            });
        }
        let v = LittleEndian::read_u16(&self.bytes[self.cursor..self.cursor + 2]);
        self.cursor += 2;
        Ok(v)
    }

    fn read_i16(&mut self) -> Result<i16, Error> {
        Ok(self.read_u16()? as i16)
    }

    fn read_vec3(&mut self) -> Result<Vec3, Error> {
        let x = self.read_i16()?;
        let y = self.read_i16()?;
        let z = self.read_i16()?;
        Ok(Vec3::new(x as f32, y as f32, z as f32))
    }

    fn read_packed_rotation(&mut self) -> Result<u32, Error> {
        let high = self.read_u16()? as u32;
        let low = self.read_u16()? as u32;
        Ok((high << 16) | low)
    }
}

/// Size in bytes of one keyframe for a model with `bone_count` bones.
pub fn keyframe_stride(bone_count: usize) -> usize {
    (HEADER_WORDS + bone_count * 2) * 2
}

/// Decodes every keyframe in `bytes`; the length must be a whole number of keyframes.
pub fn decode_keyframes(bytes: &[u8], bone_count: usize) -> Result<Vec<Keyframe>, Error> {
    let stride = keyframe_stride(bone_count);
    if bytes.len() % stride != 0 {
        return Err(Error::BinaryParse {
            message: format!(
                "{} bytes is not a multiple of the {stride}-byte keyframe size",
                bytes.len()
            ),
        });
    }

    let mut input = WordInput::new(bytes);
    let mut keyframes = Vec::with_capacity(bytes.len() / stride);
    while input.remaining() > 0 {
        let min = input.read_vec3()?;
        let max = input.read_vec3()?;
        let root_translation = input.read_vec3()?;
        let rotations = (0..bone_count)
            .map(|_| input.read_packed_rotation())
            .collect::<Result<Vec<_>, Error>>()?;
        keyframes.push(Keyframe {
            bbox: BoundingBox::new(min, max),
            root_translation,
            rotations,
        });
    }
    Ok(keyframes)
}
