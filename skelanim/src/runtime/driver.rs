use super::pose::InterpolationInfo;
use super::transition::{TransitionGraph, TransitionTarget};
use crate::{BoundingBox, Error};
use log::debug;

/// Per-object playback cursor over a [`TransitionGraph`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AnimState {
    track: usize,
    frame: u32,
    current_state: u16,
    goal_state: u16,
    required_state: Option<u16>,
}

impl AnimState {
    /// Starts at the first frame of `track`, already in that track's state.
    pub fn new(graph: &TransitionGraph, track: usize) -> Result<Self, Error> {
        let data = graph.track_or_err(track)?;
        Ok(Self {
            track,
            frame: data.first_frame,
            current_state: data.state_id,
            goal_state: data.state_id,
            required_state: None,
        })
    }

    pub fn track(&self) -> usize {
        self.track
    }

    pub fn current_frame(&self) -> u32 {
        self.frame
    }

    pub fn current_state(&self) -> u16 {
        self.current_state
    }

    pub fn goal_state(&self) -> u16 {
        self.goal_state
    }

    pub fn required_state(&self) -> Option<u16> {
        self.required_state
    }

    pub fn set_goal_state(&mut self, goal_state: u16) {
        self.goal_state = goal_state;
    }

    /// A state that must be passed through; cleared once reached.
    pub fn set_required_state(&mut self, required_state: Option<u16>) {
        self.required_state = required_state;
    }

    /// Jumps to `frame` of `track`. Frames outside the track restart it from its first frame.
    pub fn set_animation(
        &mut self,
        graph: &TransitionGraph,
        track: usize,
        frame: u32,
    ) -> Result<(), Error> {
        let data = graph.track_or_err(track)?;
        self.track = track;
        self.frame = if data.contains_frame(frame) {
            frame
        } else {
            data.first_frame
        };
        self.current_state = data.state_id;
        Ok(())
    }

    /// Applies a pending transition toward the goal state, if one covers the current frame.
    pub fn resolve(&mut self, graph: &TransitionGraph) -> bool {
        let Some(target) = graph.resolve(self.track, self.frame, self.goal_state) else {
            return false;
        };
        self.jump(graph, target);
        if self.required_state == Some(self.current_state) {
            self.required_state = None;
        }
        true
    }

    /// Steps one frame. Returns `true` when the track ran out and playback rolled over to the
    /// track's successor; the goal state is then re-evaluated on the next step.
    pub fn advance_frame(&mut self, graph: &TransitionGraph) -> bool {
        self.frame += 1;
        if self.frame > graph.tracks()[self.track].last_frame {
            let target = graph.rollover(self.track);
            debug!(
                "track {} rolled over to track {} frame {}",
                self.track, target.track, target.frame
            );
            self.jump(graph, target);
            return true;
        }
        self.resolve(graph);
        false
    }

    pub fn interpolation_info<'g>(&self, graph: &'g TransitionGraph) -> InterpolationInfo<'g> {
        InterpolationInfo::from_track(&graph.tracks()[self.track], self.frame)
    }

    pub fn bounding_box(&self, graph: &TransitionGraph) -> BoundingBox {
        self.interpolation_info(graph).bounding_box()
    }

    /// Forward speed of the current track `frame_offset` frames from now, in world units per
    /// frame.
    pub fn floor_speed(&self, graph: &TransitionGraph, frame_offset: i32) -> i32 {
        let data = &graph.tracks()[self.track];
        let frames = i64::from(self.frame - data.first_frame) + i64::from(frame_offset);
        let fixed = i64::from(data.speed) + i64::from(data.acceleration) * frames;
        (fixed / (1 << 16)) as i32
    }

    fn jump(&mut self, graph: &TransitionGraph, target: TransitionTarget) {
        let data = &graph.tracks()[target.track];
        self.track = target.track;
        self.frame = if data.contains_frame(target.frame) {
            target.frame
        } else {
            data.first_frame
        };
        self.current_state = data.state_id;
    }
}
