use crate::{Error, KeyframeTrack};
use log::debug;

/// A `(track, frame)` pair to jump to.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct TransitionTarget {
    pub track: usize,
    pub frame: u32,
}

/// Validated set of keyframe tracks and their outgoing transitions.
#[derive(Clone, Debug)]
pub struct TransitionGraph {
    tracks: Vec<KeyframeTrack>,
}

impl TransitionGraph {
    /// Checks that every referenced track exists and that each track has keyframes for its
    /// whole frame range.
    pub fn new(tracks: Vec<KeyframeTrack>) -> Result<Self, Error> {
        for (index, track) in tracks.iter().enumerate() {
            if track.segment_length == 0 {
                return Err(Error::InvalidValue {
                    message: format!("track {index} has a zero segment length"),
                });
            }
            if track.last_frame < track.first_frame {
                return Err(Error::InvalidValue {
                    message: format!(
                        "track {index} ends at frame {} before its first frame {}",
                        track.last_frame, track.first_frame
                    ),
                });
            }
            let needed = ((track.last_frame - track.first_frame) / track.segment_length) as usize;
            if track.keyframes.len() <= needed {
                return Err(Error::MissingKeyframes {
                    track: index,
                    first: track.first_frame,
                    last: track.last_frame,
                });
            }
            if track.next_track >= tracks.len() {
                return Err(Error::DanglingTrackReference {
                    track: index,
                    target: track.next_track,
                    context: "next track",
                });
            }
            for transition in &track.transitions {
                for case in &transition.cases {
                    if case.target_track >= tracks.len() {
                        return Err(Error::DanglingTrackReference {
                            track: index,
                            target: case.target_track,
                            context: "transition case",
                        });
                    }
                }
            }
        }
        Ok(Self { tracks })
    }

    pub fn tracks(&self) -> &[KeyframeTrack] {
        &self.tracks
    }

    pub fn track(&self, index: usize) -> Option<&KeyframeTrack> {
        self.tracks.get(index)
    }

    pub fn track_or_err(&self, index: usize) -> Result<&KeyframeTrack, Error> {
        self.tracks.get(index).ok_or(Error::UnknownTrack { index })
    }

    /// Finds the jump that moves `track` toward `goal_state` at `frame`.
    ///
    /// `None` means either the track is already in the goal state or no case covers the frame
    /// yet; callers retry on a later frame.
    ///
    /// # Panics
    ///
    /// If `track` is out of range.
    pub fn resolve(&self, track: usize, frame: u32, goal_state: u16) -> Option<TransitionTarget> {
        let current = &self.tracks[track];
        if current.state_id == goal_state {
            return None;
        }

        let hit = current
            .transitions
            .iter()
            .filter(|transition| transition.state_id == goal_state)
            .find_map(|transition| transition.cases.iter().find(|case| case.contains(frame)))?;

        debug!(
            "transition to state {goal_state}: track {track} frame {frame} -> track {} frame {}",
            hit.target_track, hit.target_frame
        );
        Some(TransitionTarget {
            track: hit.target_track,
            frame: hit.target_frame,
        })
    }

    /// Where playback continues once `track` runs past its last frame.
    pub fn rollover(&self, track: usize) -> TransitionTarget {
        let current = &self.tracks[track];
        TransitionTarget {
            track: current.next_track,
            frame: current.next_frame,
        }
    }
}
