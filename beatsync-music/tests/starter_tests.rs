//! Music starter tests
//!
//! Drive the mailbox and the starter directly, without the music start
//! thread, so each step is deterministic.

mod helpers;

use std::sync::Arc;

use approx::assert_relative_eq;
use beatsync_common::events::{EventBus, SyncEvent};
use beatsync_common::timing::TimingModel;
use beatsync_music::playback::{
    MusicStarter, PlayMusicOptions, SlotPhase, StartOutcome, StartRequest, SyncShared,
};
use beatsync_music::SongClock;
use helpers::{MapTimingLoader, ScriptedDriver};

const NUDGE: f64 = 0.040;

struct Fixture {
    shared: Arc<SyncShared>,
    clock: SongClock,
    events: EventBus,
    driver: Arc<ScriptedDriver>,
    starter: MusicStarter,
}

fn fixture(loader: MapTimingLoader, latency: f64) -> Fixture {
    let shared = Arc::new(SyncShared::new());
    let clock = SongClock::new();
    let events = EventBus::new(16);
    let driver = ScriptedDriver::new(latency);
    let starter = MusicStarter::new(
        Arc::clone(&shared),
        clock.clone(),
        driver.clone(),
        Arc::new(loader),
        events.clone(),
        NUDGE,
    );
    Fixture {
        shared,
        clock,
        events,
        driver,
        starter,
    }
}

impl Fixture {
    /// Submit and take, as the music start thread would
    fn queue(&self, file: &str, options: PlayMusicOptions) -> StartRequest {
        let mut state = self.shared.lock();
        state.queue.submit(StartRequest::new(file, options));
        state.queue.take_if_present().unwrap()
    }
}

#[test]
fn test_second_submit_replaces_first() {
    let f = fixture(MapTimingLoader::new(), 0.0);

    let b = {
        let mut state = f.shared.lock();
        state.queue.submit(StartRequest::new("fileA.ogg", PlayMusicOptions::default()));
        state.queue.submit(StartRequest::new("fileB.ogg", PlayMusicOptions::default()));
        let taken = state.queue.take_if_present().unwrap();
        assert!(state.queue.take_if_present().is_none());
        taken
    };
    assert_eq!(b.file.to_str(), Some("fileB.ogg"));

    f.starter.start_queued(b).unwrap();

    let loads = f.driver.loads();
    assert_eq!(loads.len(), 1);
    assert_eq!(loads[0].path.to_str(), Some("fileB.ogg"));
    assert!(loads[0].is_started());
}

#[test]
fn test_untimed_song_starts_immediately_and_keeps_phase() {
    let f = fixture(MapTimingLoader::new(), 0.0);
    f.clock.update_song_position(18.875, &TimingModel::default()); // beat 37.75
    f.shared.lock().updating_timer = true;

    let request = f.queue("untimed.ogg", PlayMusicOptions::default());
    let outcome = f.starter.start_queued(request).unwrap();

    assert_eq!(
        outcome,
        StartOutcome::Started {
            has_timing: false,
            aligned: false,
            start_at: None
        }
    );

    let state = f.shared.lock();
    assert_eq!(state.playing.phase(), SlotPhase::Starting);
    assert!(!state.playing.has_timing());
    // Pending timing continues the current beat fraction from elapsed 0
    assert_relative_eq!(
        state.playing.pending_timing().beat_from_elapsed(0.0),
        0.75,
        epsilon = 1e-9
    );
    // Confirmed timing is still the previous song's
    assert_eq!(**state.playing.timing(), TimingModel::default());
}

#[test]
fn test_timed_song_starts_immediately_when_nothing_governs_clock() {
    let loader = MapTimingLoader::new().with("song.sm", TimingModel::constant(150.0));
    let f = fixture(loader, 0.010);

    let request = f.queue("song.ogg", PlayMusicOptions::default());
    let outcome = f.starter.start_queued(request).unwrap();

    assert_eq!(
        outcome,
        StartOutcome::Started {
            has_timing: true,
            aligned: false,
            start_at: None
        }
    );
    assert_eq!(f.driver.last_load().unwrap().start_at(), None);
}

#[test]
fn test_aligned_start_instant() {
    let loader = MapTimingLoader::new().with("song.sm", TimingModel::constant(60.0));
    let f = fixture(loader, 0.010);
    f.shared.lock().updating_timer = true;
    f.clock.update_song_position(10.1, &TimingModel::default());
    let last_update = f.clock.snapshot().last_update;

    let options = PlayMusicOptions {
        start_seconds: 0.25,
        ..PlayMusicOptions::default()
    };
    let request = f.queue("song.ogg", options);
    let outcome = f.starter.start_queued(request).unwrap();

    let StartOutcome::Started {
        has_timing,
        aligned,
        start_at,
    } = outcome
    else {
        panic!("expected a start, got {:?}", outcome);
    };
    assert!(has_timing);
    assert!(aligned);

    // presumed latency 0.05 + distance 0.475 (beat 20.3 -> beat 21.25)
    let start_at = start_at.unwrap();
    let delay = start_at.duration_since(last_update).as_secs_f64();
    assert_relative_eq!(delay, 0.525, epsilon = 1e-6);
    assert_eq!(f.driver.last_load().unwrap().start_at(), Some(start_at));
}

#[test]
fn test_loop_length_corrected_before_load() {
    let loader = MapTimingLoader::new().with("loop.sm", TimingModel::constant(60.0));
    let f = fixture(loader, 0.0);

    let options = PlayMusicOptions {
        force_loop: true,
        start_seconds: 0.25,
        length_seconds: Some(4.65),
        fade_seconds: 1.5,
        ..PlayMusicOptions::default()
    };
    let request = f.queue("loop.ogg", options);
    f.starter.start_queued(request).unwrap();

    let params = f.driver.last_load().unwrap().params.clone();
    assert!(params.looping);
    assert_eq!(params.start_seconds, 0.25);
    assert_relative_eq!(params.length_seconds.unwrap(), 5.0, epsilon = 1e-9);
    assert_eq!(params.fade_seconds, 1.5);
}

#[test]
fn test_loop_length_untouched_without_timing() {
    let f = fixture(MapTimingLoader::new(), 0.0);

    let options = PlayMusicOptions {
        force_loop: true,
        length_seconds: Some(4.65),
        ..PlayMusicOptions::default()
    };
    let request = f.queue("loop.ogg", options);
    f.starter.start_queued(request).unwrap();

    assert_eq!(f.driver.last_load().unwrap().params.length_seconds, Some(4.65));
}

#[test]
fn test_broken_timing_file_plays_untimed() {
    let loader = MapTimingLoader::new().with_broken("broken.sm");
    let f = fixture(loader, 0.0);

    let request = f.queue("broken.ogg", PlayMusicOptions::default());
    let outcome = f.starter.start_queued(request).unwrap();

    assert!(matches!(
        outcome,
        StartOutcome::Started {
            has_timing: false,
            ..
        }
    ));
    assert!(f.driver.last_load().unwrap().is_started());
}

#[test]
fn test_explicit_timing_file() {
    let loader = MapTimingLoader::new().with("shared/timing.sm", TimingModel::constant(90.0));
    let f = fixture(loader, 0.0);

    let options = PlayMusicOptions {
        timing_file: Some("shared/timing.sm".into()),
        ..PlayMusicOptions::default()
    };
    let request = f.queue("music.ogg", options);
    f.starter.start_queued(request).unwrap();

    let state = f.shared.lock();
    assert!(state.playing.has_timing());
    assert_eq!(state.playing.pending_timing().bpm_at_beat(0.0), 90.0);
}

#[test]
fn test_load_failure_keeps_current_slot() {
    let f = fixture(MapTimingLoader::new(), 0.0);
    let mut rx = f.events.subscribe();

    let first = f.queue("good.ogg", PlayMusicOptions::default());
    f.starter.start_queued(first).unwrap();
    let _ = rx.try_recv();

    f.driver.fail_on("bad.ogg");
    let request = f.queue("bad.ogg", PlayMusicOptions::default());
    let request_id = request.id;
    assert!(f.starter.start_queued(request).is_err());

    let state = f.shared.lock();
    assert_eq!(state.playing.music_path().and_then(|p| p.to_str()), Some("good.ogg"));
    assert!(state.playing.is_playing());
    drop(state);

    match rx.try_recv().unwrap() {
        SyncEvent::MusicFailed {
            request_id: id,
            path,
            ..
        } => {
            assert_eq!(id, request_id);
            assert_eq!(path.to_str(), Some("bad.ogg"));
        }
        other => panic!("expected MusicFailed, got {:?}", other),
    }
}

#[test]
fn test_superseded_while_loading_never_starts() {
    let f = fixture(MapTimingLoader::new(), 0.0);

    let a = f.queue("fileA.ogg", PlayMusicOptions::default());
    // B arrives while A is loading
    f.shared
        .lock()
        .queue
        .submit(StartRequest::new("fileB.ogg", PlayMusicOptions::default()));

    assert_eq!(f.starter.start_queued(a).unwrap(), StartOutcome::Superseded);

    let a_load = f.driver.load_of("fileA.ogg").unwrap();
    assert!(!a_load.is_started());
    assert_eq!(f.shared.lock().playing.phase(), SlotPhase::Idle);
}

#[test]
fn test_publishing_stops_previous_sound() {
    let f = fixture(MapTimingLoader::new(), 0.0);

    let first = f.queue("first.ogg", PlayMusicOptions::default());
    f.starter.start_queued(first).unwrap();
    let second = f.queue("second.ogg", PlayMusicOptions::default());
    f.starter.start_queued(second).unwrap();

    assert!(f.driver.load_of("first.ogg").unwrap().is_stopped());
    assert!(!f.driver.load_of("second.ogg").unwrap().is_stopped());
}

#[test]
fn test_started_event() {
    let loader = MapTimingLoader::new().with("song.sm", TimingModel::constant(140.0));
    let f = fixture(loader, 0.0);
    let mut rx = f.events.subscribe();

    let request = f.queue("song.ogg", PlayMusicOptions::default());
    let request_id = request.id;
    f.starter.start_queued(request).unwrap();

    match rx.try_recv().unwrap() {
        SyncEvent::MusicStarted {
            request_id: id,
            has_timing,
            aligned,
            ..
        } => {
            assert_eq!(id, request_id);
            assert!(has_timing);
            assert!(!aligned);
        }
        other => panic!("expected MusicStarted, got {:?}", other),
    }
}

#[test]
fn test_presumed_latency() {
    let f = fixture(MapTimingLoader::new(), 0.025);
    assert_relative_eq!(f.starter.presumed_latency(), 0.065, epsilon = 1e-12);
}
