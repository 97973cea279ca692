use super::clip::{AnimationTarget, Clip, ClipEvent, ClipListener, ListenerId};
use crate::{Error, Track};
use log::{debug, trace, warn};
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct ClipId {
    index: usize,
    generation: u32,
}

#[derive(Debug)]
struct ClipSlot {
    generation: u32,
    clip: Option<Clip>,
}

/// Stable reference to a clip owned by a [`ClipScheduler`].
///
/// Handles outlive their clip safely: once the clip is destroyed every lookup through the
/// handle returns `None`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClipHandle {
    id: ClipId,
}

impl ClipHandle {
    pub(crate) fn from_id(id: ClipId) -> Self {
        Self { id }
    }
}

/// Observes every listener event raised by any clip of a scheduler.
pub trait SchedulerListener {
    fn on_event(&mut self, scheduler: &mut ClipScheduler, clip: ClipHandle, event: ClipEvent);
}

#[derive(Clone, Copy, Debug)]
struct QueuedEvent {
    clip: ClipId,
    event: ClipEvent,
    /// `None` addresses the scheduler-wide listener.
    listener: Option<ListenerId>,
}

/// Owns clips, the game clock and the running list; advances every running clip once per
/// update.
pub struct ClipScheduler {
    clips: Vec<ClipSlot>,
    free_list: Vec<usize>,
    running: Vec<ClipId>,
    time: f32,
    event_queue: VecDeque<QueuedEvent>,
    listener: Option<Box<dyn SchedulerListener>>,
    draining_events: bool,
    fired: Vec<ListenerId>,
}

impl Default for ClipScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ClipScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipScheduler")
            .field("clips", &self.clips)
            .field("running", &self.running)
            .field("time", &self.time)
            .field("queued_events", &self.event_queue.len())
            .finish()
    }
}

impl ClipScheduler {
    pub fn new() -> Self {
        Self {
            clips: Vec::new(),
            free_list: Vec::new(),
            running: Vec::new(),
            time: 0.0,
            event_queue: VecDeque::new(),
            listener: None,
            draining_events: false,
            fired: Vec::new(),
        }
    }

    /// Game clock, the sum of every accepted update delta.
    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn set_listener<L: SchedulerListener + 'static>(&mut self, listener: L) {
        self.listener = Some(Box::new(listener));
    }

    pub fn clear_listener(&mut self) {
        self.listener = None;
    }

    /// Creates an inert clip over `start_time..=end_time` of `track`.
    pub fn create_clip(
        &mut self,
        id: impl Into<String>,
        track: Arc<Track>,
        start_time: f32,
        end_time: f32,
    ) -> Result<ClipHandle, Error> {
        let clip = Clip::new(id.into(), track, start_time, end_time)?;
        Ok(ClipHandle::from_id(self.alloc_clip(clip)))
    }

    /// Clip covering the whole track.
    pub fn create_full_clip(
        &mut self,
        id: impl Into<String>,
        track: Arc<Track>,
    ) -> Result<ClipHandle, Error> {
        let end = track.duration;
        self.create_clip(id, track, 0.0, end)
    }

    /// Frees the clip without firing its end listeners.
    ///
    /// Clips fading toward it lose their crossfade target and keep their current weight.
    pub fn destroy_clip(&mut self, clip: ClipHandle) {
        if self.clip(clip).is_none() {
            return;
        }
        self.running.retain(|id| *id != clip.id);
        for slot in &mut self.clips {
            let Some(other) = slot.clip.as_mut() else {
                continue;
            };
            if other.cross_fade_to == Some(clip.id) {
                other.cross_fade_to = None;
                other.flags.fading_out = false;
                other.flags.fading_out_started = false;
            }
        }
        self.free_clip(clip.id);
    }

    pub fn clip(&self, clip: ClipHandle) -> Option<&Clip> {
        self.entry(clip.id)
    }

    pub fn clip_mut(&mut self, clip: ClipHandle) -> Option<&mut Clip> {
        self.entry_mut(clip.id)
    }

    /// Clips currently scheduled for update, in scheduling order.
    pub fn running_clips(&self) -> impl Iterator<Item = ClipHandle> + '_ {
        self.running.iter().copied().map(ClipHandle::from_id)
    }

    /// Plays the clip from `offset` into its active duration.
    ///
    /// A paused clip resumes from where it stopped and ignores `offset`. A clip that is already
    /// playing is re-anchored and begins again on its next update, firing its begin listeners.
    pub fn play(&mut self, clip: ClipHandle, offset: f32) {
        let now = self.time;
        let Some(entry) = self.entry_mut(clip.id) else {
            return;
        };

        if entry.flags.playing {
            if entry.flags.paused {
                entry.flags.paused = false;
                return;
            }
            entry.flags.marked_for_removal = false;
            entry.flags.restarted = true;
        } else {
            entry.flags.playing = true;
            if entry.restore_weight_on_play {
                entry.restore_weight_on_play = false;
                if !entry.flags.fading_in {
                    entry.blend_weight = 1.0;
                }
            }
            if !self.running.contains(&clip.id) {
                self.running.push(clip.id);
            }
        }

        if let Some(entry) = self.entry_mut(clip.id) {
            entry.time_started = now - offset;
            debug!("play clip '{}' at {now} (offset {offset})", entry.id());
        }
    }

    pub fn stop(&mut self, clip: ClipHandle) {
        if let Some(entry) = self.entry_mut(clip.id) {
            entry.stop();
        }
    }

    pub fn pause(&mut self, clip: ClipHandle) {
        if let Some(entry) = self.entry_mut(clip.id) {
            entry.pause();
        }
    }

    /// Marks every running clip for removal; end listeners fire on the next update.
    pub fn stop_all(&mut self) {
        let running = self.running.clone();
        for id in running {
            if let Some(entry) = self.entry_mut(id) {
                entry.stop();
            }
        }
    }

    /// Fades `from` out and `to` in over `duration`, playing both.
    ///
    /// Reverses a fade still running in the other direction.
    pub fn cross_fade(&mut self, from: ClipHandle, to: ClipHandle, duration: f32) {
        assert!(
            duration > 0.0,
            "crossfade duration must be > 0, got {duration}"
        );
        assert_ne!(from, to, "cannot crossfade a clip into itself");
        if self.entry(from.id).is_none() || self.entry(to.id).is_none() {
            return;
        }

        let reverses = self.entry(to.id).is_some_and(|target| {
            target.flags.fading_out && target.cross_fade_to == Some(from.id)
        });
        if reverses {
            if let Some(target) = self.entry_mut(to.id) {
                target.flags.fading_out = false;
                target.flags.fading_out_started = false;
                target.cross_fade_to = None;
            }
            if let Some(source) = self.entry_mut(from.id) {
                source.flags.fading_in = false;
            }
        }

        if let Some(target) = self.entry_mut(to.id) {
            target.flags.fading_in = true;
            target.blend_weight = 0.0;
        }

        let from_playing = match self.entry_mut(from.id) {
            Some(source) => {
                source.cross_fade_to = Some(to.id);
                source.flags.fading_out_started = true;
                source.flags.fading_out = true;
                source.cross_fade_out_elapsed = 0.0;
                source.cross_fade_out_duration = duration;
                trace!("crossfade '{}' over {duration}", source.id());
                source.flags.playing
            }
            None => return,
        };

        if !from_playing {
            self.play(from, 0.0);
        }
        self.play(to, 0.0);
    }

    /// Advances the clock by `delta` and updates every running clip against `target`.
    ///
    /// Clips that finish or were stopped are retired from the running list after their end
    /// listeners fire.
    pub fn update(&mut self, delta: f32, target: &mut dyn AnimationTarget) {
        if !delta.is_finite() || delta < 0.0 {
            warn!("ignoring invalid clip scheduler delta {delta}");
            return;
        }
        self.time += delta;

        // A clip replayed by its own end listener waits for the next update.
        let mut stepped: Vec<ClipId> = Vec::with_capacity(self.running.len());
        let mut index = 0;
        while index < self.running.len() {
            let id = self.running[index];
            if stepped.contains(&id) {
                index += 1;
                continue;
            }
            stepped.push(id);

            let retired = self.step_clip(id, delta, target);
            if retired {
                // Unscheduled before its end listeners run, so they can play it again.
                self.running.remove(index);
            } else {
                index += 1;
            }
            self.drain_event_queue();
        }
    }

    /// Updates one clip against the current clock without advancing it.
    ///
    /// Returns `true` when the clip ended during this call and was retired.
    pub fn update_clip(
        &mut self,
        clip: ClipHandle,
        delta: f32,
        target: &mut dyn AnimationTarget,
    ) -> bool {
        if self.entry(clip.id).is_none() {
            return false;
        }
        let retired = self.step_clip(clip.id, delta, target);
        if retired {
            self.running.retain(|id| *id != clip.id);
        }
        self.drain_event_queue();
        retired
    }

    fn step_clip(&mut self, id: ClipId, delta: f32, target: &mut dyn AnimationTarget) -> bool {
        let now = self.time;
        let Some(clip) = self.entry_mut(id) else {
            return true;
        };
        clip.check_invariants();

        if clip.flags.paused {
            return false;
        }
        if clip.flags.marked_for_removal {
            self.end_clip(id);
            return true;
        }

        if !clip.flags.started || clip.flags.restarted {
            clip.flags.restarted = false;
            clip.begin(now);
            trace!("clip '{}' begins at elapsed {}", clip.id(), clip.elapsed_time());
            let ids: Vec<ListenerId> = clip.begin_listeners.iter().map(|l| l.id).collect();
            self.push_events(id, ClipEvent::Begin, ids);
        } else {
            clip.advance(delta);
        }

        let mut fired = std::mem::take(&mut self.fired);
        let Some(clip) = self.entry_mut(id) else {
            self.fired = fired;
            return true;
        };
        let current_time = clip.current_time();
        clip.crossed_listeners(&mut fired);
        let percent = clip.percent_complete(current_time);
        let fading_out = clip.flags.fading_out;

        for listener in fired.drain(..) {
            self.push_events(id, ClipEvent::Time, [listener]);
        }
        self.fired = fired;

        // Both weights are settled before this clip's channels are evaluated.
        if fading_out {
            self.update_cross_fade(id, delta, now);
        }

        let Some(clip) = self.entry_mut(id) else {
            return true;
        };
        clip.evaluate_channels(percent, target);

        let finished = clip.flags.marked_for_removal || !clip.flags.started;
        if finished {
            self.end_clip(id);
        }
        finished
    }

    fn update_cross_fade(&mut self, id: ClipId, delta: f32, now: f32) {
        let Some(partner_id) = self.entry(id).and_then(|clip| clip.cross_fade_to) else {
            return;
        };
        let Some(partner_started) = self.entry(partner_id).map(|p| p.time_started) else {
            if let Some(clip) = self.entry_mut(id) {
                clip.flags.fading_out = false;
                clip.cross_fade_to = None;
            }
            return;
        };

        let Some(clip) = self.entry_mut(id) else {
            return;
        };
        let speed = clip.speed().abs();
        if clip.flags.fading_out_started {
            // Catches up on time that passed between the crossfade call and this update.
            clip.cross_fade_out_elapsed = (now - partner_started) * speed;
            clip.flags.fading_out_started = false;
        } else {
            clip.cross_fade_out_elapsed += delta * speed;
        }

        let partner_weight;
        if clip.cross_fade_out_elapsed < clip.cross_fade_out_duration {
            let remaining = (clip.cross_fade_out_duration - clip.cross_fade_out_elapsed)
                / clip.cross_fade_out_duration;
            if clip.flags.fading_in {
                // Chained fade: hand over part of whatever weight this clip has so far.
                partner_weight = (1.0 - remaining) * clip.blend_weight;
                clip.blend_weight -= partner_weight;
            } else {
                partner_weight = 1.0 - remaining;
                clip.blend_weight = remaining;
            }
        } else {
            partner_weight = 1.0;
            clip.blend_weight = 0.0;
            clip.restore_weight_on_play = true;
            clip.flags.started = false;
            clip.flags.fading_out = false;
            clip.cross_fade_to = None;
            trace!("clip '{}' finished fading out", clip.id());
            if let Some(partner) = self.entry_mut(partner_id) {
                partner.flags.fading_in = false;
            }
        }

        if let Some(partner) = self.entry_mut(partner_id) {
            partner.blend_weight = partner_weight;
        }
    }

    fn end_clip(&mut self, id: ClipId) {
        let Some(clip) = self.entry_mut(id) else {
            return;
        };
        if !clip.restore_weight_on_play {
            clip.blend_weight = 1.0;
        }
        let was_fading_out = clip.flags.fading_out;
        let partner = clip.cross_fade_to.take();
        clip.flags = Default::default();
        debug!("clip '{}' ended at elapsed {}", clip.id(), clip.elapsed_time());

        let ids: Vec<ListenerId> = clip.end_listeners.iter().map(|l| l.id).collect();
        if was_fading_out {
            if let Some(partner) = partner.and_then(|p| self.entry_mut(p)) {
                partner.flags.fading_in = false;
            }
        }
        self.push_events(id, ClipEvent::End, ids);
    }

    fn alloc_clip(&mut self, clip: Clip) -> ClipId {
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.clips[index];
            slot.clip = Some(clip);
            ClipId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.clips.len();
            self.clips.push(ClipSlot {
                generation: 0,
                clip: Some(clip),
            });
            ClipId {
                index,
                generation: 0,
            }
        }
    }

    fn entry(&self, id: ClipId) -> Option<&Clip> {
        let slot = self.clips.get(id.index)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.clip.as_ref()
    }

    fn entry_mut(&mut self, id: ClipId) -> Option<&mut Clip> {
        let slot = self.clips.get_mut(id.index)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.clip.as_mut()
    }

    fn free_clip(&mut self, id: ClipId) {
        let Some(slot) = self.clips.get_mut(id.index) else {
            return;
        };
        if slot.generation != id.generation {
            return;
        }
        slot.clip = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(id.index);
    }

    /// Queues one event per clip listener, followed by one for the scheduler listener.
    fn push_events(
        &mut self,
        clip: ClipId,
        event: ClipEvent,
        listeners: impl IntoIterator<Item = ListenerId>,
    ) {
        for listener in listeners {
            self.event_queue.push_back(QueuedEvent {
                clip,
                event,
                listener: Some(listener),
            });
        }
        self.event_queue.push_back(QueuedEvent {
            clip,
            event,
            listener: None,
        });
    }

    fn listener_slot(
        &mut self,
        clip: ClipId,
        event: ClipEvent,
        id: ListenerId,
    ) -> Option<&mut Option<Box<dyn ClipListener>>> {
        let clip = self.entry_mut(clip)?;
        match event {
            ClipEvent::Begin => clip
                .begin_listeners
                .iter_mut()
                .find(|l| l.id == id)
                .map(|l| &mut l.listener),
            ClipEvent::End => clip
                .end_listeners
                .iter_mut()
                .find(|l| l.id == id)
                .map(|l| &mut l.listener),
            ClipEvent::Time => clip
                .listeners
                .iter_mut()
                .find(|l| l.id == id)
                .map(|l| &mut l.listener),
        }
    }

    fn restore_listener(
        &mut self,
        clip: ClipId,
        event: ClipEvent,
        id: ListenerId,
        listener: Box<dyn ClipListener>,
    ) {
        let slot = self.listener_slot(clip, event, id);
        // A listener removed during its own callback stays removed.
        if let Some(slot) = slot {
            if slot.is_none() {
                *slot = Some(listener);
            }
        }
    }

    fn drain_event_queue(&mut self) {
        if self.draining_events {
            return;
        }
        self.draining_events = true;

        while let Some(queued) = self.event_queue.pop_front() {
            let handle = ClipHandle::from_id(queued.clip);

            let Some(id) = queued.listener else {
                let mut scheduler_listener = self.listener.take();
                if let Some(listener) = scheduler_listener.as_mut() {
                    listener.on_event(self, handle, queued.event);
                }
                if self.listener.is_none() {
                    self.listener = scheduler_listener;
                }
                continue;
            };

            let taken = self
                .listener_slot(queued.clip, queued.event, id)
                .and_then(|slot| slot.take());
            if let Some(mut listener) = taken {
                trace!("dispatch {:?} to listener {id:?}", queued.event);
                listener.animation_event(self, handle, queued.event);
                self.restore_listener(queued.clip, queued.event, id, listener);
            }
        }

        self.draining_events = false;
    }
}
