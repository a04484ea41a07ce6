//! Timing reconstruction from a synthetic playback trace.

use std::sync::Arc;
use std::time::{Duration, Instant};

use drm_capture::browser::PlaybackData;
use drm_capture::phase::RecordHandler;
use drm_capture::sync::Gate;

fn data(time: f64, frame: i64) -> PlaybackData {
    PlaybackData {
        time,
        frame,
        buffered: time + 5.0,
        now: (time * 1000.0) as u64,
    }
}

fn handler_at(t0: Instant) -> (RecordHandler, Arc<Gate>) {
    let done = Arc::new(Gate::new());
    let handler = RecordHandler::new(Arc::clone(&done));
    handler.set_recording(true);
    // Capture process confirmed at record time 0.
    handler.record_progress_at(0.0, t0);
    (handler, done)
}

fn at(t0: Instant, seconds: f64) -> Instant {
    t0 + Duration::from_secs_f64(seconds)
}

#[test]
fn test_synthetic_trace_reconstructs_cuts() {
    let t0 = Instant::now();
    let (handler, done) = handler_at(t0);

    handler.updated_at(&data(0.0, 0), at(t0, 0.0));

    // First stall window [2.0, 2.5].
    handler.waiting_at(&data(2.0, 48), at(t0, 2.0));
    handler.resumed_at(&data(2.0, 48), at(t0, 2.5));

    // Second stall window [6.0, 6.4].
    handler.waiting_at(&data(5.5, 132), at(t0, 6.0));
    handler.resumed_at(&data(5.5, 132), at(t0, 6.4));

    handler.ended_at(&data(9.1, 218), at(t0, 10.0));
    assert!(done.is_open());

    let info = handler.record_info("movie.mkv".into(), 24.0, 44_100, 0.0);

    assert_eq!(info.video_cuts.len(), 2);
    assert!((info.video_cuts[0].start - 2.0).abs() < 1e-6);
    assert!((info.video_cuts[0].end - 2.5).abs() < 1e-6);
    assert!((info.video_cuts[1].start - 6.0).abs() < 1e-6);
    assert!((info.video_cuts[1].end - 6.4).abs() < 1e-6);

    // Audio mirrors the video dead time.
    assert_eq!(info.audio_cuts.len(), 2);
    assert!((info.audio_cuts[0].start - 2.0).abs() < 1e-6);
    assert!((info.audio_cuts[1].end - 6.4).abs() < 1e-6);

    assert!((info.cut_off.start - 0.0).abs() < 1e-6);
    assert!((info.cut_off.end - 10.0).abs() < 1e-6);
}

#[test]
fn test_zero_time_confirmation_anchors_the_clock() {
    // The capture process confirms at record time 0; interpolation must
    // run from that confirmation, not from handler construction.
    let t0 = Instant::now() + Duration::from_secs(5);
    let (handler, _done) = handler_at(t0);

    assert!((handler.record_time_at(at(t0, 2.0)) - 2.0).abs() < 1e-6);
}

#[test]
fn test_record_time_interpolates_between_progress_reports() {
    let t0 = Instant::now();
    let (handler, _done) = handler_at(t0);

    handler.record_progress_at(3.0, at(t0, 3.2));
    assert!((handler.record_time_at(at(t0, 3.7)) - 3.5).abs() < 1e-6);
}

#[test]
fn test_events_before_capture_confirmation_are_ignored() {
    let done = Arc::new(Gate::new());
    let handler = RecordHandler::new(Arc::clone(&done));

    let t0 = Instant::now();
    handler.waiting_at(&data(1.0, 24), t0);
    handler.resumed_at(&data(1.0, 24), at(t0, 0.5));
    handler.ended_at(&data(1.5, 36), at(t0, 1.0));

    // Nothing recorded yet, so nothing was cut and the gate stays closed.
    assert!(!done.is_open());
    let info = handler.record_info("movie.mkv".into(), 24.0, 44_100, 0.0);
    assert!(info.video_cuts.is_empty());
    assert!(info.audio_cuts.is_empty());
}

#[test]
fn test_ended_while_stalled_uses_pause_point_as_cut_off() {
    let t0 = Instant::now();
    let (handler, done) = handler_at(t0);

    handler.updated_at(&data(0.0, 0), at(t0, 0.0));
    handler.waiting_at(&data(8.0, 192), at(t0, 8.5));
    // Stream ends without ever resuming; the open window start is the true
    // end of usable content.
    handler.ended_at(&data(8.0, 192), at(t0, 9.5));

    assert!(done.is_open());
    let info = handler.record_info("movie.mkv".into(), 24.0, 44_100, 0.0);
    assert!(info.video_cuts.is_empty());
    assert!((info.cut_off.end - 8.5).abs() < 1e-6);
}

#[test]
fn test_duplicate_waiting_keeps_first_pause_point() {
    let t0 = Instant::now();
    let (handler, _done) = handler_at(t0);

    handler.updated_at(&data(0.0, 0), at(t0, 0.0));
    handler.waiting_at(&data(2.0, 48), at(t0, 2.0));
    handler.waiting_at(&data(2.0, 48), at(t0, 2.2));
    handler.resumed_at(&data(2.0, 48), at(t0, 2.5));

    let info = handler.record_info("movie.mkv".into(), 24.0, 44_100, 0.0);
    assert_eq!(info.video_cuts.len(), 1);
    assert!((info.video_cuts[0].start - 2.0).abs() < 1e-6);
}

#[test]
fn test_ended_is_idempotent() {
    let t0 = Instant::now();
    let (handler, _done) = handler_at(t0);

    handler.updated_at(&data(0.0, 0), at(t0, 0.0));
    handler.ended_at(&data(9.0, 216), at(t0, 10.0));
    handler.ended_at(&data(9.0, 216), at(t0, 11.0));

    let info = handler.record_info("movie.mkv".into(), 24.0, 44_100, 0.0);
    assert!((info.cut_off.end - 10.0).abs() < 1e-6);
}
