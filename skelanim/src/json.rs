//! JSON loaders for authored animation data.
//!
//! Tracks, transition graphs and skeletal models are parsed into private `*Def` structs first
//! and then validated through the regular constructors, so loaded data obeys the same rules as
//! data built in code.

use crate::{
    BoneNode, BoundingBox, Channel, Curve, CurvePoint, Error, Interpolation, Keyframe,
    KeyframeTrack, MeshInfo, SkeletalModel, Track, Transition, TransitionCase, TransitionGraph,
};
use glam::Vec3;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct TrackDef {
    name: String,
    duration: f32,
    #[serde(default)]
    channels: Vec<ChannelDef>,
}

#[derive(Debug, Deserialize)]
struct ChannelDef {
    target: usize,
    property: u32,
    #[serde(default)]
    components: Option<usize>,
    points: Vec<PointDef>,
}

#[derive(Debug, Deserialize)]
struct PointDef {
    time: f32,
    value: Vec<f32>,
    #[serde(default)]
    curve: Option<CurveDef>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CurveDef {
    Named(String),
    Bezier([f32; 4]),
}

#[derive(Debug, Deserialize)]
struct GraphDef {
    tracks: Vec<KeyframeTrackDef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyframeTrackDef {
    state: u16,
    first_frame: u32,
    last_frame: u32,
    segment_length: u32,
    #[serde(default)]
    next_track: Option<usize>,
    #[serde(default)]
    next_frame: Option<u32>,
    #[serde(default)]
    speed: i32,
    #[serde(default)]
    acceleration: i32,
    keyframes: Vec<KeyframeDef>,
    #[serde(default)]
    transitions: Vec<TransitionDef>,
}

#[derive(Debug, Deserialize)]
struct KeyframeDef {
    /// `[min x, min y, min z, max x, max y, max z]`.
    bbox: [f32; 6],
    #[serde(default)]
    root: [f32; 3],
    #[serde(default)]
    rotations: Vec<u32>,
}

#[derive(Debug, Deserialize)]
struct TransitionDef {
    state: u16,
    cases: Vec<CaseDef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaseDef {
    first_frame: u32,
    last_frame: u32,
    track: usize,
    frame: u32,
}

#[derive(Debug, Deserialize)]
struct ModelDef {
    #[serde(default)]
    bones: Vec<BoneDef>,
    meshes: Vec<MeshDef>,
}

#[derive(Debug, Deserialize)]
struct BoneDef {
    offset: [f32; 3],
    #[serde(default)]
    flags: u32,
}

#[derive(Debug, Deserialize)]
struct MeshDef {
    #[serde(default)]
    center: [f32; 3],
    #[serde(default)]
    radius: f32,
}

fn parse<'a, T: Deserialize<'a>>(input: &'a str) -> Result<T, Error> {
    serde_json::from_str(input).map_err(|e| Error::JsonParse {
        message: e.to_string(),
    })
}

fn parse_interpolation(curve: Option<CurveDef>) -> Result<Interpolation, Error> {
    match curve {
        None => Ok(Interpolation::Linear),
        Some(CurveDef::Named(name)) => match name.as_str() {
            "linear" => Ok(Interpolation::Linear),
            "stepped" => Ok(Interpolation::Stepped),
            other => Err(Error::JsonParse {
                message: format!("unknown curve type '{other}'"),
            }),
        },
        Some(CurveDef::Bezier([cx1, cy1, cx2, cy2])) => {
            Ok(Interpolation::Bezier { cx1, cy1, cx2, cy2 })
        }
    }
}

impl Track {
    pub fn from_json_str(input: &str) -> Result<Arc<Self>, Error> {
        let def: TrackDef = parse(input)?;

        let mut channels = Vec::with_capacity(def.channels.len());
        for (index, channel) in def.channels.into_iter().enumerate() {
            let components = channel
                .components
                .or_else(|| channel.points.first().map(|p| p.value.len()))
                .unwrap_or(0);
            let points = channel
                .points
                .into_iter()
                .map(|p| {
                    Ok(CurvePoint {
                        time: p.time,
                        value: p.value,
                        interpolation: parse_interpolation(p.curve)?,
                    })
                })
                .collect::<Result<Vec<_>, Error>>()?;
            let curve = Curve::new(components, points).map_err(|e| Error::InvalidChannel {
                track: def.name.clone(),
                channel: index,
                message: e.to_string(),
            })?;
            channels.push(Channel {
                target: channel.target,
                property_id: channel.property,
                curve,
            });
        }

        Track::new(def.name, def.duration, channels)
    }
}

impl TransitionGraph {
    /// Parses a graph; tracks without an explicit successor loop back to their own first frame.
    pub fn from_json_str(input: &str) -> Result<Self, Error> {
        let def: GraphDef = parse(input)?;

        let tracks = def
            .tracks
            .into_iter()
            .enumerate()
            .map(|(index, track)| KeyframeTrack {
                state_id: track.state,
                first_frame: track.first_frame,
                last_frame: track.last_frame,
                segment_length: track.segment_length,
                keyframes: track
                    .keyframes
                    .into_iter()
                    .map(|k| Keyframe {
                        bbox: BoundingBox::new(
                            Vec3::new(k.bbox[0], k.bbox[1], k.bbox[2]),
                            Vec3::new(k.bbox[3], k.bbox[4], k.bbox[5]),
                        ),
                        root_translation: Vec3::from_array(k.root),
                        rotations: k.rotations,
                    })
                    .collect::<Arc<[Keyframe]>>(),
                next_track: track.next_track.unwrap_or(index),
                next_frame: track.next_frame.unwrap_or(track.first_frame),
                transitions: track
                    .transitions
                    .into_iter()
                    .map(|t| Transition {
                        state_id: t.state,
                        cases: t
                            .cases
                            .into_iter()
                            .map(|c| TransitionCase {
                                first_frame: c.first_frame,
                                last_frame: c.last_frame,
                                target_track: c.track,
                                target_frame: c.frame,
                            })
                            .collect(),
                    })
                    .collect(),
                speed: track.speed,
                acceleration: track.acceleration,
            })
            .collect();

        TransitionGraph::new(tracks)
    }
}

impl SkeletalModel {
    pub fn from_json_str(input: &str) -> Result<Arc<Self>, Error> {
        let def: ModelDef = parse(input)?;
        let bones = def
            .bones
            .into_iter()
            .map(|b| BoneNode::new(Vec3::from_array(b.offset), b.flags))
            .collect();
        let meshes = def
            .meshes
            .into_iter()
            .map(|m| MeshInfo {
                center: Vec3::from_array(m.center),
                collision_size: m.radius,
            })
            .collect();
        SkeletalModel::new(bones, meshes)
    }
}
