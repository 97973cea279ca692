use super::scheduler::{ClipHandle, ClipId, ClipScheduler};
use crate::{Error, Track};
use std::sync::Arc;

/// Number of plays of a clip's window.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Repeat {
    /// Must be `> 0`; fractional counts stop part way through the last loop.
    Count(f32),
    Indefinite,
}

/// Independent lifecycle flags of a clip.
///
/// `fading_out` is only ever set while the clip holds a crossfade target.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ClipFlags {
    pub playing: bool,
    pub paused: bool,
    pub marked_for_removal: bool,
    pub restarted: bool,
    pub fading_in: bool,
    pub fading_out: bool,
    pub fading_out_started: bool,
    pub started: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ClipEvent {
    Begin,
    End,
    /// A time-gated listener's event time was crossed.
    Time,
}

pub trait ClipListener {
    fn animation_event(
        &mut self,
        scheduler: &mut ClipScheduler,
        clip: ClipHandle,
        event: ClipEvent,
    );
}

/// Receives evaluated channel values.
///
/// The target does its own weighted accumulation when several clips write the same property.
pub trait AnimationTarget {
    fn set_animation_property_value(
        &mut self,
        target: usize,
        property_id: u32,
        value: &[f32],
        blend_weight: f32,
    );
}

pub(crate) struct RegisteredListener {
    pub(crate) id: ListenerId,
    pub(crate) listener: Option<Box<dyn ClipListener>>,
}

pub(crate) struct TimedListener {
    pub(crate) time: f32,
    pub(crate) id: ListenerId,
    pub(crate) listener: Option<Box<dyn ClipListener>>,
}

/// A playable time window over a [`Track`].
pub struct Clip {
    id: String,
    track: Arc<Track>,
    start_time: f32,
    end_time: f32,
    duration: f32,
    pub(crate) flags: ClipFlags,
    repeat: Repeat,
    loop_blend_time: f32,
    active_duration: f32,
    speed: f32,
    pub(crate) time_started: f32,
    pub(crate) elapsed_time: f32,
    pub(crate) cross_fade_to: Option<ClipId>,
    pub(crate) cross_fade_out_elapsed: f32,
    pub(crate) cross_fade_out_duration: f32,
    pub(crate) blend_weight: f32,
    pub(crate) restore_weight_on_play: bool,
    pub(crate) begin_listeners: Vec<RegisteredListener>,
    pub(crate) end_listeners: Vec<RegisteredListener>,
    pub(crate) listeners: Vec<TimedListener>,
    listener_cursor: usize,
    next_listener_id: u64,
    values: Vec<Vec<f32>>,
}

impl std::fmt::Debug for Clip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clip")
            .field("id", &self.id)
            .field("track", &self.track.name)
            .field("start_time", &self.start_time)
            .field("end_time", &self.end_time)
            .field("flags", &self.flags)
            .field("repeat", &self.repeat)
            .field("loop_blend_time", &self.loop_blend_time)
            .field("active_duration", &self.active_duration)
            .field("speed", &self.speed)
            .field("elapsed_time", &self.elapsed_time)
            .field("cross_fade_to", &self.cross_fade_to)
            .field("blend_weight", &self.blend_weight)
            .field("listeners", &self.listeners.len())
            .field("listener_cursor", &self.listener_cursor)
            .finish()
    }
}

impl Clip {
    pub(crate) fn new(
        id: String,
        track: Arc<Track>,
        start_time: f32,
        end_time: f32,
    ) -> Result<Self, Error> {
        let valid = start_time.is_finite()
            && end_time.is_finite()
            && 0.0 <= start_time
            && start_time <= end_time
            && end_time <= track.duration;
        if !valid {
            return Err(Error::InvalidClipWindow {
                track: track.name.clone(),
                start: start_time,
                end: end_time,
                duration: track.duration,
            });
        }

        let values = track
            .channels
            .iter()
            .map(|channel| vec![0.0; channel.curve.components()])
            .collect();
        let duration = end_time - start_time;
        Ok(Self {
            id,
            track,
            start_time,
            end_time,
            duration,
            flags: ClipFlags::default(),
            repeat: Repeat::Count(1.0),
            loop_blend_time: 0.0,
            active_duration: duration,
            speed: 1.0,
            time_started: 0.0,
            elapsed_time: 0.0,
            cross_fade_to: None,
            cross_fade_out_elapsed: 0.0,
            cross_fade_out_duration: 0.0,
            blend_weight: 1.0,
            restore_weight_on_play: false,
            begin_listeners: Vec::new(),
            end_listeners: Vec::new(),
            listeners: Vec::new(),
            listener_cursor: 0,
            next_listener_id: 0,
            values,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn track(&self) -> &Arc<Track> {
        &self.track
    }

    pub fn start_time(&self) -> f32 {
        self.start_time
    }

    pub fn end_time(&self) -> f32 {
        self.end_time
    }

    /// Length of one loop of the window.
    pub fn duration(&self) -> f32 {
        self.duration
    }

    pub fn flags(&self) -> ClipFlags {
        self.flags
    }

    pub fn elapsed_time(&self) -> f32 {
        self.elapsed_time
    }

    /// Moves the playhead directly, for drivers that step clips frame by frame.
    pub fn set_elapsed_time(&mut self, elapsed_time: f32) {
        self.elapsed_time = elapsed_time;
    }

    pub fn repeat_count(&self) -> Repeat {
        self.repeat
    }

    pub fn set_repeat_count(&mut self, repeat: Repeat) {
        match repeat {
            Repeat::Indefinite => {
                self.active_duration = self.duration + self.loop_blend_time;
            }
            Repeat::Count(count) => {
                assert!(
                    count > 0.0,
                    "clip '{}': repeat count must be > 0, got {count}",
                    self.id
                );
                self.active_duration = self.duration * count;
                if count > 1.0 && self.loop_blend_time > 0.0 {
                    self.active_duration += (count - 1.0).ceil() * self.loop_blend_time;
                }
            }
        }
        self.repeat = repeat;
    }

    /// Total playing time including repeats, `f32::INFINITY` when repeating indefinitely.
    pub fn active_duration(&self) -> f32 {
        if self.repeat == Repeat::Indefinite {
            return f32::INFINITY;
        }
        self.active_duration
    }

    /// Sets the total playing time; `f32::INFINITY` keeps the current repeat mode and
    /// resets the listener window to one loop plus the loop blend.
    ///
    /// Any finite duration leaves indefinite mode. A zero-length window counts as one repeat.
    pub fn set_active_duration(&mut self, duration: f32) {
        assert!(
            duration >= 0.0,
            "clip '{}': active duration must be >= 0, got {duration}",
            self.id
        );
        if duration == f32::INFINITY {
            self.active_duration = self.duration + self.loop_blend_time;
            return;
        }
        self.active_duration = duration;
        self.repeat = if self.duration > 0.0 {
            Repeat::Count(duration / self.duration)
        } else {
            Repeat::Count(1.0)
        };
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.speed = speed;
    }

    pub fn blend_weight(&self) -> f32 {
        self.blend_weight
    }

    pub fn set_blend_weight(&mut self, blend_weight: f32) {
        self.blend_weight = blend_weight;
    }

    pub fn loop_blend_time(&self) -> f32 {
        self.loop_blend_time
    }

    pub fn set_loop_blend_time(&mut self, loop_blend_time: f32) {
        self.loop_blend_time = loop_blend_time.max(0.0);
    }

    pub fn is_playing(&self) -> bool {
        self.flags.playing && !self.flags.paused
    }

    pub fn cross_fade_target(&self) -> Option<ClipHandle> {
        self.cross_fade_to.map(ClipHandle::from_id)
    }

    /// Marks the clip for removal; end listeners fire on the next update.
    pub fn stop(&mut self) {
        if self.flags.playing {
            self.flags.restarted = false;
            self.flags.paused = false;
            self.flags.marked_for_removal = true;
        }
    }

    pub fn pause(&mut self) {
        if self.flags.playing && !self.flags.marked_for_removal {
            self.flags.paused = true;
        }
    }

    /// Registers `listener` to fire when the playhead crosses `event_time`.
    ///
    /// # Panics
    ///
    /// If `event_time` is not below the active duration.
    pub fn add_listener<L: ClipListener + 'static>(
        &mut self,
        listener: L,
        event_time: f32,
    ) -> ListenerId {
        assert!(
            event_time < self.active_duration,
            "clip '{}': listener time {event_time} is outside the active duration {}",
            self.id,
            self.active_duration
        );

        // Next pending event in each direction, looked up before the insert shifts indices.
        let next_forward = self.listeners.get(self.listener_cursor).map(|l| l.time);
        let next_reverse = self
            .listener_cursor
            .checked_sub(1)
            .map(|i| self.listeners[i].time);

        let id = self.next_listener_id();
        let index = self.listeners.partition_point(|l| l.time <= event_time);
        self.listeners.insert(
            index,
            TimedListener {
                time: event_time,
                id,
                listener: Some(Box::new(listener)),
            },
        );

        if !self.flags.playing {
            return id;
        }

        let current_time = self.loop_position();
        if self.speed >= 0.0 {
            let is_next =
                current_time < event_time && next_forward.is_none_or(|next| event_time < next);
            if is_next {
                self.listener_cursor = index;
            } else if index <= self.listener_cursor {
                self.listener_cursor += 1;
            }
        } else {
            // Playing backwards, `listener_cursor - 1` is the next event to fire.
            let is_next =
                current_time > event_time && next_reverse.is_none_or(|next| event_time > next);
            if is_next {
                self.listener_cursor = index + 1;
            } else if index < self.listener_cursor {
                self.listener_cursor += 1;
            }
        }
        id
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let Some(index) = self.listeners.iter().position(|l| l.id == id) else {
            return false;
        };
        self.listeners.remove(index);
        if index < self.listener_cursor {
            self.listener_cursor -= 1;
        }
        true
    }

    pub fn add_begin_listener<L: ClipListener + 'static>(&mut self, listener: L) -> ListenerId {
        let id = self.next_listener_id();
        self.begin_listeners.push(RegisteredListener {
            id,
            listener: Some(Box::new(listener)),
        });
        id
    }

    pub fn remove_begin_listener(&mut self, id: ListenerId) -> bool {
        remove_registered(&mut self.begin_listeners, id)
    }

    pub fn add_end_listener<L: ClipListener + 'static>(&mut self, listener: L) -> ListenerId {
        let id = self.next_listener_id();
        self.end_listeners.push(RegisteredListener {
            id,
            listener: Some(Box::new(listener)),
        });
        id
    }

    pub fn remove_end_listener(&mut self, id: ListenerId) -> bool {
        remove_registered(&mut self.end_listeners, id)
    }

    fn next_listener_id(&mut self) -> ListenerId {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        id
    }

    fn loop_position(&self) -> f32 {
        if self.duration > 0.0 {
            self.elapsed_time.rem_euclid(self.duration)
        } else {
            0.0
        }
    }

    pub(crate) fn check_invariants(&self) {
        debug_assert!(
            !self.flags.fading_out || self.cross_fade_to.is_some(),
            "clip '{}' is fading out without a target",
            self.id
        );
        debug_assert!(self.listener_cursor <= self.listeners.len());
    }

    /// Starts a pass: derives the elapsed time from the play anchor and primes the listener
    /// cursor for the direction of travel.
    pub(crate) fn begin(&mut self, now: f32) {
        self.flags.started = true;
        if self.speed >= 0.0 {
            self.elapsed_time = (now - self.time_started) * self.speed;
            self.listener_cursor = 0;
        } else {
            self.elapsed_time = self.active_duration + (now - self.time_started) * self.speed;
            self.listener_cursor = self.listeners.len();
        }
    }

    pub(crate) fn advance(&mut self, delta: f32) {
        self.elapsed_time += delta * self.speed;

        if self.repeat == Repeat::Indefinite && self.elapsed_time <= 0.0 {
            // Reverse wrap around the end. The loop blend window is not accounted for here.
            self.elapsed_time += self.active_duration;
        }
    }

    /// Position inside the current loop; clears `started` once the active duration is used up.
    pub(crate) fn current_time(&mut self) -> f32 {
        let finished = self.repeat != Repeat::Indefinite
            && ((self.speed >= 0.0 && self.elapsed_time >= self.active_duration)
                || (self.speed <= 0.0 && self.elapsed_time <= 0.0));
        if finished {
            self.flags.started = false;
            return if self.speed < 0.0 { 0.0 } else { self.duration };
        }
        if self.duration == 0.0 {
            return 0.0;
        }
        self.elapsed_time.rem_euclid(self.duration + self.loop_blend_time)
    }

    /// Advances the listener cursor past every event crossed by the playhead.
    pub(crate) fn crossed_listeners(&mut self, out: &mut Vec<ListenerId>) {
        if self.speed >= 0.0 {
            while let Some(next) = self.listeners.get(self.listener_cursor) {
                if self.elapsed_time < next.time {
                    break;
                }
                out.push(next.id);
                self.listener_cursor += 1;
            }
        } else {
            while self.listener_cursor > 0 {
                let next = &self.listeners[self.listener_cursor - 1];
                if self.elapsed_time > next.time {
                    break;
                }
                out.push(next.id);
                self.listener_cursor -= 1;
            }
        }
    }

    /// Completion of the current loop; outside `0..=1` only while loop blending is enabled.
    pub(crate) fn percent_complete(&self, current_time: f32) -> f32 {
        let percent = if self.duration == 0.0 {
            1.0
        } else {
            current_time / self.duration
        };
        if self.loop_blend_time == 0.0 {
            percent.clamp(0.0, 1.0)
        } else {
            percent
        }
    }

    pub(crate) fn evaluate_channels(&mut self, percent: f32, target: &mut dyn AnimationTarget) {
        let track_duration = self.track.duration;
        let (start, end, blend) = if track_duration > 0.0 {
            (
                self.start_time / track_duration,
                self.end_time / track_duration,
                self.loop_blend_time / track_duration,
            )
        } else {
            (0.0, 0.0, 0.0)
        };
        assert_eq!(
            self.values.len(),
            self.track.channels.len(),
            "clip '{}': channel count changed after construction",
            self.id
        );

        let weight = self.blend_weight;
        for (channel, value) in self.track.channels.iter().zip(self.values.iter_mut()) {
            channel.curve.evaluate(percent, start, end, blend, value);
            target.set_animation_property_value(
                channel.target,
                channel.property_id,
                value,
                weight,
            );
        }
    }
}

fn remove_registered(list: &mut Vec<RegisteredListener>, id: ListenerId) -> bool {
    let Some(index) = list.iter().position(|l| l.id == id) else {
        return false;
    };
    list.remove(index);
    true
}
