use std::time::Duration;

use photo_slideshow::engine::{DEFAULT_TRANSITION, PlaybackInterval, SlideshowEngine};
use photo_slideshow::error::ControlError;
use photo_slideshow::events::SlideshowCommand;
use photo_slideshow::source::ImageRecord;
use photo_slideshow::tasks::slideshow::{self, SlideshowHandle};
use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;

fn records(n: usize) -> Vec<ImageRecord> {
    (0..n)
        .map(|i| ImageRecord {
            id: format!("id-{i}"),
            url: format!("https://img.test/{i}.webp"),
            width: 1200,
            height: 800,
            caption: format!("caption {i}"),
            alt: String::new(),
            format: "jpg".into(),
        })
        .collect()
}

/// Sample the published state every 100ms until `until` and collect the 100ms
/// slot in which each transition started.
///
/// Samples sit 50ms into each slot so they never race a tick on the same instant.
async fn count_transitions(
    handle: &SlideshowHandle,
    start: Instant,
    until: Duration,
) -> Vec<Duration> {
    let mut starts = Vec::new();
    let mut was_transitioning = handle.snapshot().is_transitioning;
    let mut t = Duration::ZERO;
    while t < until {
        sleep_until(start + t + Duration::from_millis(50)).await;
        let now = handle.snapshot().is_transitioning;
        if now && !was_transitioning {
            starts.push(t);
        }
        was_transitioning = now;
        t += Duration::from_millis(100);
    }
    starts
}

#[tokio::test(start_paused = true)]
async fn manual_next_settles_after_transition_duration() {
    let cancel = CancellationToken::new();
    let engine = SlideshowEngine::new(records(5), 0, Some(3));
    let (handle, task) = slideshow::spawn(engine, DEFAULT_TRANSITION, cancel.clone());
    let start = Instant::now();

    handle.send(SlideshowCommand::Next).await.unwrap();
    sleep_until(start + Duration::from_millis(10)).await;
    let snap = handle.snapshot();
    assert!(snap.is_transitioning);
    let target = snap.next_index.expect("next index set during transition");
    assert_ne!(target, 0);
    assert_eq!(snap.current_index, 0);

    sleep_until(start + Duration::from_millis(1150)).await;
    assert!(handle.snapshot().is_transitioning);

    sleep_until(start + Duration::from_millis(1250)).await;
    let snap = handle.snapshot();
    assert_eq!(snap.current_index, target);
    assert_eq!(snap.next_index, None);
    assert!(!snap.is_transitioning);

    cancel.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn rapid_requests_start_only_one_transition() {
    let cancel = CancellationToken::new();
    let engine = SlideshowEngine::new(records(6), 0, Some(8));
    let (handle, task) = slideshow::spawn(engine, DEFAULT_TRANSITION, cancel.clone());
    let start = Instant::now();

    handle.send(SlideshowCommand::Next).await.unwrap();
    handle.send(SlideshowCommand::Previous).await.unwrap();
    handle.send(SlideshowCommand::Next).await.unwrap();
    sleep_until(start + Duration::from_millis(10)).await;
    let target = handle.snapshot().next_index.unwrap();

    sleep_until(start + Duration::from_millis(1300)).await;
    let snap = handle.snapshot();
    assert_eq!(snap.current_index, target);
    assert!(!snap.is_transitioning, "queued requests must not chain transitions");

    cancel.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn autoplay_advances_once_per_interval() {
    let cancel = CancellationToken::new();
    let engine = SlideshowEngine::new(records(8), 0, Some(5));
    let (handle, task) = slideshow::spawn(engine, DEFAULT_TRANSITION, cancel.clone());
    let start = Instant::now();

    let starts = count_transitions(&handle, start, Duration::from_millis(15_500)).await;
    assert_eq!(
        starts,
        vec![
            Duration::from_millis(5_000),
            Duration::from_millis(10_000),
            Duration::from_millis(15_000)
        ]
    );

    cancel.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn paused_playback_never_moves() {
    let cancel = CancellationToken::new();
    let engine = SlideshowEngine::new(records(4), 2, Some(1));
    let (handle, task) = slideshow::spawn(engine, DEFAULT_TRANSITION, cancel.clone());
    let start = Instant::now();

    handle.send(SlideshowCommand::TogglePlayback).await.unwrap();
    let starts = count_transitions(&handle, start, Duration::from_secs(60)).await;
    assert!(starts.is_empty());
    let snap = handle.snapshot();
    assert!(!snap.is_playing);
    assert_eq!(snap.current_index, 2);

    cancel.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn interval_change_and_resume_restart_cadence() {
    let cancel = CancellationToken::new();
    let engine = SlideshowEngine::new(records(8), 0, Some(13));
    let (handle, task) = slideshow::spawn(engine, DEFAULT_TRANSITION, cancel.clone());
    let start = Instant::now();

    handle
        .send(SlideshowCommand::SetInterval(PlaybackInterval::Three))
        .await
        .unwrap();
    handle.send(SlideshowCommand::TogglePlayback).await.unwrap();
    handle.send(SlideshowCommand::TogglePlayback).await.unwrap();

    let starts = count_transitions(&handle, start, Duration::from_millis(9_500)).await;
    assert_eq!(
        starts,
        vec![
            Duration::from_millis(3_000),
            Duration::from_millis(6_000),
            Duration::from_millis(9_000)
        ]
    );
    let snap = handle.snapshot();
    assert!(snap.is_playing);
    assert_eq!(snap.interval_ms, 3_000);

    cancel.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn resume_rearms_a_full_period_later() {
    let cancel = CancellationToken::new();
    let engine = SlideshowEngine::new(records(8), 0, Some(2));
    let (handle, task) = slideshow::spawn(engine, DEFAULT_TRANSITION, cancel.clone());
    let start = Instant::now();

    handle.send(SlideshowCommand::TogglePlayback).await.unwrap();
    sleep_until(start + Duration::from_millis(4_000)).await;
    handle.send(SlideshowCommand::TogglePlayback).await.unwrap();

    // Paused at 0, resumed at 4s: the next tick lands at 9s, not 5s.
    let starts = count_transitions(&handle, start, Duration::from_millis(9_500)).await;
    assert_eq!(starts, vec![Duration::from_millis(9_000)]);

    cancel.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn single_image_never_autoplays_but_manual_next_is_harmless() {
    let cancel = CancellationToken::new();
    let engine = SlideshowEngine::new(records(1), 0, Some(4));
    let (handle, task) = slideshow::spawn(engine, DEFAULT_TRANSITION, cancel.clone());
    let start = Instant::now();

    let starts = count_transitions(&handle, start, Duration::from_secs(20)).await;
    assert!(starts.is_empty());

    handle.send(SlideshowCommand::Next).await.unwrap();
    sleep(Duration::from_millis(1_300)).await;
    let snap = handle.snapshot();
    assert_eq!(snap.current_index, 0);
    assert!(!snap.is_transitioning);

    cancel.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn five_images_four_advances_never_repeat_immediately() {
    let cancel = CancellationToken::new();
    let engine = SlideshowEngine::new(records(5), 0, Some(21));
    let (handle, task) = slideshow::spawn(engine, DEFAULT_TRANSITION, cancel.clone());

    let mut previous = 0;
    for _ in 0..4 {
        handle.send(SlideshowCommand::Next).await.unwrap();
        sleep(Duration::from_millis(1_300)).await;
        let snap = handle.snapshot();
        assert!(!snap.is_transitioning);
        assert!(snap.current_index < 5);
        assert_ne!(snap.current_index, previous);
        previous = snap.current_index;
    }

    cancel.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn cancel_discards_pending_transition() {
    let cancel = CancellationToken::new();
    let engine = SlideshowEngine::new(records(5), 0, Some(9));
    let (handle, task) = slideshow::spawn(engine, DEFAULT_TRANSITION, cancel.clone());

    handle.send(SlideshowCommand::Next).await.unwrap();
    sleep(Duration::from_millis(10)).await;
    assert!(handle.snapshot().is_transitioning);

    cancel.cancel();
    task.await.unwrap().unwrap();
    let frozen = handle.snapshot();

    sleep(Duration::from_secs(30)).await;
    assert_eq!(handle.snapshot(), frozen);
    assert_eq!(frozen.current_index, 0);
    assert_eq!(
        handle.send(SlideshowCommand::Next).await,
        Err(ControlError::NotRunning)
    );
}
