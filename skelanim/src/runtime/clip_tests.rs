use crate::runtime::{
    AnimationTarget, ClipEvent, ClipFlags, ClipHandle, ClipListener, ClipScheduler, Repeat,
};
use crate::{Channel, Curve, CurvePoint, Error, Interpolation, Track};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

fn assert_approx(actual: f32, expected: f32) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= 1.0e-4,
        "expected {expected}, got {actual} (diff {diff})"
    );
}

#[derive(Default)]
struct Recorder {
    writes: Vec<(usize, u32, Vec<f32>, f32)>,
}

impl AnimationTarget for Recorder {
    fn set_animation_property_value(
        &mut self,
        target: usize,
        property_id: u32,
        value: &[f32],
        blend_weight: f32,
    ) {
        self.writes
            .push((target, property_id, value.to_vec(), blend_weight));
    }
}

impl Recorder {
    fn last_value(&self) -> f32 {
        self.writes.last().map(|w| w.2[0]).unwrap_or(f32::NAN)
    }
}

#[derive(Clone, Default)]
struct EventLog(Rc<RefCell<Vec<String>>>);

impl EventLog {
    fn tagged(&self, tag: &str) -> Tagged {
        Tagged {
            log: self.clone(),
            tag: tag.to_string(),
        }
    }

    fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }
}

struct Tagged {
    log: EventLog,
    tag: String,
}

impl ClipListener for Tagged {
    fn animation_event(&mut self, _: &mut ClipScheduler, _: ClipHandle, _: ClipEvent) {
        self.log.0.borrow_mut().push(self.tag.clone());
    }
}

/// One channel ramping linearly from 0 to 100 over the whole track.
fn ramp_track(duration: f32) -> Arc<Track> {
    let curve = Curve::new(
        1,
        vec![
            CurvePoint {
                time: 0.0,
                value: vec![0.0],
                interpolation: Interpolation::Linear,
            },
            CurvePoint {
                time: 1.0,
                value: vec![100.0],
                interpolation: Interpolation::Linear,
            },
        ],
    )
    .unwrap();
    Track::new(
        "ramp",
        duration,
        vec![Channel {
            target: 0,
            property_id: 1,
            curve,
        }],
    )
    .unwrap()
}

fn full_clip(scheduler: &mut ClipScheduler, duration: f32) -> ClipHandle {
    scheduler
        .create_full_clip("clip", ramp_track(duration))
        .unwrap()
}

#[test]
fn clip_window_must_lie_inside_track() {
    let mut scheduler = ClipScheduler::new();
    let track = ramp_track(100.0);

    let err = scheduler
        .create_clip("reversed", track.clone(), 60.0, 20.0)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidClipWindow { .. }));
    let err = scheduler
        .create_clip("long", track.clone(), 0.0, 100.5)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidClipWindow { .. }));
    assert!(scheduler.create_clip("negative", track.clone(), -1.0, 10.0).is_err());

    let clip = scheduler.create_clip("window", track, 20.0, 60.0).unwrap();
    let clip = scheduler.clip(clip).unwrap();
    assert_eq!(clip.id(), "window");
    assert_approx(clip.duration(), 40.0);
    assert_approx(clip.active_duration(), 40.0);
    assert_eq!(clip.repeat_count(), Repeat::Count(1.0));
}

#[test]
fn is_playing_tracks_play_pause_and_stop() {
    let mut scheduler = ClipScheduler::new();
    let mut target = Recorder::default();
    let clip = full_clip(&mut scheduler, 100.0);

    assert!(!scheduler.clip(clip).unwrap().is_playing());
    scheduler.play(clip, 0.0);
    assert!(scheduler.clip(clip).unwrap().is_playing());

    scheduler.pause(clip);
    assert!(!scheduler.clip(clip).unwrap().is_playing());
    scheduler.play(clip, 0.0);
    assert!(scheduler.clip(clip).unwrap().is_playing());

    scheduler.stop(clip);
    let flags = scheduler.clip(clip).unwrap().flags();
    assert!(flags.marked_for_removal);
    scheduler.update(10.0, &mut target);
    assert!(!scheduler.clip(clip).unwrap().is_playing());
    assert_eq!(scheduler.clip(clip).unwrap().flags(), ClipFlags::default());
}

#[test]
fn pause_is_idempotent_and_ignored_when_idle() {
    let mut scheduler = ClipScheduler::new();
    let clip = full_clip(&mut scheduler, 100.0);

    scheduler.pause(clip);
    assert_eq!(scheduler.clip(clip).unwrap().flags(), ClipFlags::default());

    scheduler.play(clip, 0.0);
    scheduler.pause(clip);
    let once = scheduler.clip(clip).unwrap().flags();
    scheduler.pause(clip);
    assert_eq!(scheduler.clip(clip).unwrap().flags(), once);
    assert!(once.paused);
}

#[test]
fn paused_clip_does_not_advance_and_resumes_in_place() {
    let mut scheduler = ClipScheduler::new();
    let mut target = Recorder::default();
    let clip = full_clip(&mut scheduler, 100.0);

    scheduler.play(clip, 0.0);
    scheduler.update(10.0, &mut target);
    scheduler.pause(clip);
    let writes = target.writes.len();
    scheduler.update(50.0, &mut target);
    assert_eq!(target.writes.len(), writes);
    assert_approx(scheduler.clip(clip).unwrap().elapsed_time(), 10.0);

    scheduler.play(clip, 0.0);
    scheduler.update(10.0, &mut target);
    assert_approx(scheduler.clip(clip).unwrap().elapsed_time(), 20.0);
}

#[test]
fn active_duration_round_trips() {
    let mut scheduler = ClipScheduler::new();
    let handle = full_clip(&mut scheduler, 100.0);
    let clip = scheduler.clip_mut(handle).unwrap();

    clip.set_active_duration(250.0);
    assert_approx(clip.active_duration(), 250.0);
    assert_eq!(clip.repeat_count(), Repeat::Count(2.5));

    clip.set_repeat_count(Repeat::Indefinite);
    assert_eq!(clip.active_duration(), f32::INFINITY);

    clip.set_repeat_count(Repeat::Count(1.0));
    clip.set_loop_blend_time(15.0);
    clip.set_active_duration(f32::INFINITY);
    assert_approx(clip.active_duration(), 115.0);
}

#[test]
fn finite_active_duration_leaves_indefinite_mode() {
    let mut scheduler = ClipScheduler::new();
    let handle = full_clip(&mut scheduler, 100.0);
    let clip = scheduler.clip_mut(handle).unwrap();

    clip.set_repeat_count(Repeat::Indefinite);
    clip.set_active_duration(0.0);
    assert_eq!(clip.active_duration(), 0.0);
    assert_eq!(clip.repeat_count(), Repeat::Count(0.0));

    clip.set_repeat_count(Repeat::Indefinite);
    clip.set_active_duration(40.0);
    assert_approx(clip.active_duration(), 40.0);
    assert_eq!(clip.repeat_count(), Repeat::Count(0.4));
}

#[test]
fn zero_length_window_round_trips_active_duration() {
    let mut scheduler = ClipScheduler::new();
    let handle = scheduler
        .create_clip("pose", ramp_track(100.0), 50.0, 50.0)
        .unwrap();
    let clip = scheduler.clip_mut(handle).unwrap();

    clip.set_repeat_count(Repeat::Indefinite);
    clip.set_active_duration(30.0);
    assert_approx(clip.active_duration(), 30.0);
    assert_eq!(clip.repeat_count(), Repeat::Count(1.0));

    clip.set_active_duration(0.0);
    assert_eq!(clip.active_duration(), 0.0);
}

#[test]
fn repeat_count_adds_loop_blend_between_repeats() {
    let mut scheduler = ClipScheduler::new();
    let handle = full_clip(&mut scheduler, 100.0);
    let clip = scheduler.clip_mut(handle).unwrap();
    clip.set_loop_blend_time(10.0);

    clip.set_repeat_count(Repeat::Count(3.0));
    assert_approx(clip.active_duration(), 320.0);

    clip.set_repeat_count(Repeat::Count(2.5));
    assert_approx(clip.active_duration(), 270.0);

    clip.set_repeat_count(Repeat::Count(0.5));
    assert_approx(clip.active_duration(), 50.0);
}

#[test]
fn negative_loop_blend_is_clamped() {
    let mut scheduler = ClipScheduler::new();
    let handle = full_clip(&mut scheduler, 100.0);
    let clip = scheduler.clip_mut(handle).unwrap();
    clip.set_loop_blend_time(-5.0);
    assert_eq!(clip.loop_blend_time(), 0.0);
}

#[test]
#[should_panic(expected = "repeat count must be > 0")]
fn zero_repeat_count_panics() {
    let mut scheduler = ClipScheduler::new();
    let handle = full_clip(&mut scheduler, 100.0);
    scheduler
        .clip_mut(handle)
        .unwrap()
        .set_repeat_count(Repeat::Count(0.0));
}

#[test]
#[should_panic(expected = "outside the active duration")]
fn listener_at_active_duration_panics() {
    let mut scheduler = ClipScheduler::new();
    let handle = full_clip(&mut scheduler, 100.0);
    let log = EventLog::default();
    scheduler
        .clip_mut(handle)
        .unwrap()
        .add_listener(log.tagged("late"), 100.0);
}

#[test]
fn forward_listeners_fire_once_in_time_order() {
    let mut scheduler = ClipScheduler::new();
    let mut target = Recorder::default();
    let handle = full_clip(&mut scheduler, 100.0);
    let log = EventLog::default();
    {
        let clip = scheduler.clip_mut(handle).unwrap();
        clip.add_listener(log.tagged("30"), 30.0);
        clip.add_listener(log.tagged("10"), 10.0);
        clip.add_listener(log.tagged("20"), 20.0);
    }

    scheduler.play(handle, 0.0);
    scheduler.update(35.0, &mut target);
    assert_eq!(log.entries(), vec!["10", "20", "30"]);

    scheduler.update(10.0, &mut target);
    assert_eq!(log.entries().len(), 3);
}

#[test]
fn reverse_listeners_fire_in_reverse_order() {
    let mut scheduler = ClipScheduler::new();
    let mut target = Recorder::default();
    let handle = full_clip(&mut scheduler, 100.0);
    let log = EventLog::default();
    {
        let clip = scheduler.clip_mut(handle).unwrap();
        clip.add_listener(log.tagged("10"), 10.0);
        clip.add_listener(log.tagged("20"), 20.0);
        clip.add_listener(log.tagged("30"), 30.0);
        clip.add_end_listener(log.tagged("end"));
        clip.set_speed(-1.0);
    }

    scheduler.play(handle, 0.0);
    scheduler.update(65.0, &mut target);
    assert_approx(scheduler.clip(handle).unwrap().elapsed_time(), 35.0);
    assert!(log.entries().is_empty());

    scheduler.update(35.0, &mut target);
    assert_eq!(log.entries(), vec!["30", "20", "10", "end"]);
}

#[test]
fn listener_added_mid_play_slots_into_the_cursor() {
    let mut scheduler = ClipScheduler::new();
    let mut target = Recorder::default();
    let handle = full_clip(&mut scheduler, 100.0);
    let log = EventLog::default();
    {
        let clip = scheduler.clip_mut(handle).unwrap();
        clip.add_listener(log.tagged("10"), 10.0);
        clip.add_listener(log.tagged("20"), 20.0);
        clip.add_listener(log.tagged("30"), 30.0);
    }

    scheduler.play(handle, 0.0);
    scheduler.update(15.0, &mut target);
    assert_eq!(log.entries(), vec!["10"]);

    {
        let clip = scheduler.clip_mut(handle).unwrap();
        // Already behind the playhead.
        clip.add_listener(log.tagged("12"), 12.0);
        clip.add_listener(log.tagged("18"), 18.0);
    }
    scheduler.update(10.0, &mut target);
    assert_eq!(log.entries(), vec!["10", "18", "20"]);
}

#[test]
fn removed_listener_does_not_fire() {
    let mut scheduler = ClipScheduler::new();
    let mut target = Recorder::default();
    let handle = full_clip(&mut scheduler, 100.0);
    let log = EventLog::default();
    let removed = {
        let clip = scheduler.clip_mut(handle).unwrap();
        let id = clip.add_listener(log.tagged("10"), 10.0);
        clip.add_listener(log.tagged("20"), 20.0);
        id
    };
    assert!(scheduler.clip_mut(handle).unwrap().remove_listener(removed));
    assert!(!scheduler.clip_mut(handle).unwrap().remove_listener(removed));

    scheduler.play(handle, 0.0);
    scheduler.update(25.0, &mut target);
    assert_eq!(log.entries(), vec!["20"]);
}

#[test]
fn clip_retires_after_its_active_duration() {
    let mut scheduler = ClipScheduler::new();
    let mut target = Recorder::default();
    let handle = full_clip(&mut scheduler, 100.0);
    let log = EventLog::default();
    scheduler
        .clip_mut(handle)
        .unwrap()
        .add_end_listener(log.tagged("end"));

    scheduler.play(handle, 0.0);
    scheduler.update(50.0, &mut target);
    assert!(log.entries().is_empty());
    assert_approx(target.last_value(), 50.0);

    scheduler.update(50.0, &mut target);
    assert_eq!(log.entries(), vec!["end"]);
    assert_approx(target.last_value(), 100.0);
    assert_eq!(scheduler.running_clips().count(), 0);

    let clip = scheduler.clip(handle).unwrap();
    assert_eq!(clip.flags(), ClipFlags::default());
    assert_eq!(clip.blend_weight(), 1.0);
}

#[test]
fn static_pose_clip_samples_its_single_point() {
    let mut scheduler = ClipScheduler::new();
    let mut target = Recorder::default();
    let handle = scheduler
        .create_clip("pose", ramp_track(100.0), 50.0, 50.0)
        .unwrap();

    scheduler.play(handle, 0.0);
    scheduler.update(10.0, &mut target);
    assert_eq!(target.writes.len(), 1);
    assert_eq!(target.writes[0].0, 0);
    assert_eq!(target.writes[0].1, 1);
    assert_approx(target.last_value(), 50.0);
    assert!(!scheduler.clip(handle).unwrap().flags().playing);
}

#[test]
fn window_percent_maps_into_track_time() {
    let mut scheduler = ClipScheduler::new();
    let mut target = Recorder::default();
    let handle = scheduler
        .create_clip("window", ramp_track(100.0), 20.0, 60.0)
        .unwrap();

    scheduler.play(handle, 0.0);
    scheduler.update(20.0, &mut target);
    assert_approx(target.last_value(), 40.0);
}

#[test]
fn loop_blend_eases_back_to_window_start() {
    let mut scheduler = ClipScheduler::new();
    let mut target = Recorder::default();
    let handle = full_clip(&mut scheduler, 100.0);
    {
        let clip = scheduler.clip_mut(handle).unwrap();
        clip.set_loop_blend_time(20.0);
        clip.set_repeat_count(Repeat::Indefinite);
    }

    scheduler.play(handle, 0.0);
    scheduler.update(110.0, &mut target);
    assert_approx(target.last_value(), 50.0);

    scheduler.update(20.0, &mut target);
    assert_approx(target.last_value(), 10.0);
    assert!(scheduler.clip(handle).unwrap().is_playing());
}

#[test]
fn indefinite_reverse_wrap_skips_loop_blend_correction() {
    let mut scheduler = ClipScheduler::new();
    let mut target = Recorder::default();
    let handle = full_clip(&mut scheduler, 100.0);
    {
        let clip = scheduler.clip_mut(handle).unwrap();
        clip.set_loop_blend_time(20.0);
        clip.set_repeat_count(Repeat::Indefinite);
        clip.set_speed(-1.0);
    }

    scheduler.play(handle, 0.0);
    scheduler.update(10.0, &mut target);
    assert_approx(scheduler.clip(handle).unwrap().elapsed_time(), 110.0);

    scheduler.update(115.0, &mut target);
    // Wraps by one loop plus the blend window, landing inside the blend window.
    assert_approx(scheduler.clip(handle).unwrap().elapsed_time(), 115.0);
}

#[test]
fn stopped_clip_ends_without_evaluating() {
    let mut scheduler = ClipScheduler::new();
    let mut target = Recorder::default();
    let handle = full_clip(&mut scheduler, 100.0);
    let log = EventLog::default();
    scheduler
        .clip_mut(handle)
        .unwrap()
        .add_end_listener(log.tagged("end"));

    scheduler.play(handle, 0.0);
    scheduler.update(10.0, &mut target);
    scheduler.stop(handle);
    assert!(log.entries().is_empty());

    let writes = target.writes.len();
    scheduler.update(10.0, &mut target);
    assert_eq!(target.writes.len(), writes);
    assert_eq!(log.entries(), vec!["end"]);
    assert_eq!(scheduler.running_clips().count(), 0);
}

#[test]
fn play_offset_and_restart() {
    let mut scheduler = ClipScheduler::new();
    let mut target = Recorder::default();
    let handle = full_clip(&mut scheduler, 100.0);
    let log = EventLog::default();
    scheduler
        .clip_mut(handle)
        .unwrap()
        .add_begin_listener(log.tagged("begin"));

    scheduler.play(handle, 25.0);
    scheduler.update(5.0, &mut target);
    assert_approx(scheduler.clip(handle).unwrap().elapsed_time(), 30.0);

    scheduler.play(handle, 0.0);
    assert!(scheduler.clip(handle).unwrap().flags().restarted);
    scheduler.update(10.0, &mut target);
    let clip = scheduler.clip(handle).unwrap();
    assert_approx(clip.elapsed_time(), 10.0);
    assert!(!clip.flags().restarted);
    assert_eq!(log.entries(), vec!["begin", "begin"]);
    assert_eq!(scheduler.running_clips().count(), 1);
}

#[test]
fn restart_rewinds_to_the_new_anchor() {
    let mut scheduler = ClipScheduler::new();
    let mut target = Recorder::default();
    let handle = full_clip(&mut scheduler, 100.0);

    scheduler.play(handle, 0.0);
    scheduler.update(10.0, &mut target);
    scheduler.update(40.0, &mut target);
    assert_approx(scheduler.clip(handle).unwrap().elapsed_time(), 50.0);

    scheduler.play(handle, 0.0);
    scheduler.update(10.0, &mut target);
    assert_approx(scheduler.clip(handle).unwrap().elapsed_time(), 10.0);
    assert_approx(target.last_value(), 10.0);

    scheduler.update(10.0, &mut target);
    assert_approx(scheduler.clip(handle).unwrap().elapsed_time(), 20.0);
}

#[test]
fn restart_rewinds_the_listener_cursor() {
    let mut scheduler = ClipScheduler::new();
    let mut target = Recorder::default();
    let handle = full_clip(&mut scheduler, 100.0);
    let log = EventLog::default();
    scheduler
        .clip_mut(handle)
        .unwrap()
        .add_listener(log.tagged("20"), 20.0);

    scheduler.play(handle, 0.0);
    scheduler.update(30.0, &mut target);
    assert_eq!(log.entries(), vec!["20"]);

    scheduler.play(handle, 0.0);
    scheduler.update(25.0, &mut target);
    assert_eq!(log.entries(), vec!["20", "20"]);
}

#[test]
fn replay_after_stop_clears_the_removal_mark() {
    let mut scheduler = ClipScheduler::new();
    let mut target = Recorder::default();
    let handle = full_clip(&mut scheduler, 100.0);

    scheduler.play(handle, 0.0);
    scheduler.update(10.0, &mut target);
    scheduler.stop(handle);
    scheduler.play(handle, 0.0);
    let flags = scheduler.clip(handle).unwrap().flags();
    assert!(!flags.marked_for_removal);
    assert!(flags.restarted);

    scheduler.update(10.0, &mut target);
    assert!(scheduler.clip(handle).unwrap().is_playing());
}
