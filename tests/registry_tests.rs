// Integration tests for the session registry
//
// These tests drive the registry through the simulated gateway: join, frame
// delivery, explicit leave, platform-initiated removal and notifier failures.

mod common;

use anyhow::Result;
use common::{harness, harness_with, pcm, read_wav, wait_until, wav_files};
use loqa_callbot::audio::{AudioWriterPool, WriterPoolConfig};
use loqa_callbot::gateway::{AudioMediaFrame, CallStateEvent, MediaDirection, UnmixedBuffer};
use loqa_callbot::notify::{EventKind, EventSink, HttpNotifier, NotifierConfig, WebhookEvent};
use loqa_callbot::{IdentityMode, JoinError, SessionRegistry, SessionState, SimulatedGateway};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, Mutex, OnceLock};
use std::time::Duration;
use tempfile::TempDir;

/// Records the session's state and the listed session count whenever a
/// capture event fires, which happens in the middle of finalization
#[derive(Default)]
struct FinalizeObserver {
    registry: OnceLock<SessionRegistry>,
    seen: Mutex<Vec<(Option<SessionState>, usize)>>,
}

impl FinalizeObserver {
    fn seen(&self) -> Vec<(Option<SessionState>, usize)> {
        self.seen.lock().unwrap().clone()
    }
}

impl EventSink for FinalizeObserver {
    fn notify(&self, event: WebhookEvent) {
        if !matches!(event.kind, EventKind::AudioCaptured { .. }) {
            return;
        }
        if let Some(registry) = self.registry.get() {
            let state = registry.session(&event.call_id).map(|s| s.state());
            let listed = registry.list_active().len();
            self.seen.lock().unwrap().push((state, listed));
        }
    }
}

#[tokio::test]
async fn test_join_lists_session_and_becomes_active() -> Result<()> {
    let h = harness()?;

    let handle = h.registry.join("m1", IdentityMode::Application).await?;
    assert!(handle.warning.is_none());

    let active = h.registry.list_active();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].call_id, handle.call_id);
    assert_eq!(active[0].meeting_reference, "m1");
    assert_eq!(active[0].scenario_id, handle.scenario_id);

    let registry = h.registry.clone();
    assert!(
        wait_until(1000, || registry.list_active()[0].status == SessionState::Active).await,
        "Session should become active after the platform confirms"
    );

    assert_eq!(
        h.events.count(|e| matches!(e.kind, EventKind::Joined)),
        1,
        "One joined event"
    );

    Ok(())
}

#[tokio::test]
async fn test_session_stays_joining_until_established() -> Result<()> {
    let h = harness_with(SimulatedGateway::new().manual_establish())?;

    let handle = h.registry.join("m1", IdentityMode::Application).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.registry.list_active()[0].status, SessionState::Joining);

    h.gateway.push_state(&handle.call_id, CallStateEvent::Established);
    let registry = h.registry.clone();
    assert!(wait_until(1000, || registry.list_active()[0].status == SessionState::Active).await);

    Ok(())
}

#[tokio::test]
async fn test_join_requests_receive_only_unmixed_audio() -> Result<()> {
    let h = harness()?;

    let handle = h.registry.join("m1", IdentityMode::guest("Recorder")).await?;
    assert!(
        handle.warning.as_deref().unwrap_or_default().contains("mixed audio"),
        "Guest joins should carry the mixed-audio warning"
    );

    let requests = h.gateway.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].media.direction, MediaDirection::ReceiveOnly);
    assert!(requests[0].media.unmixed_audio);
    assert_eq!(requests[0].identity, IdentityMode::guest("Recorder"));
    assert_eq!(requests[0].scenario_id, handle.scenario_id);

    Ok(())
}

#[tokio::test]
async fn test_join_fails_before_initialization() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let pool = Arc::new(AudioWriterPool::new(WriterPoolConfig::new(temp_dir.path()))?);
    let registry = SessionRegistry::new(pool, Arc::new(common::RecordingSink::default()));

    let result = registry.join("m1", IdentityMode::Application).await;
    assert!(matches!(result, Err(JoinError::NotInitialized)));
    assert!(!registry.is_initialized());

    Ok(())
}

#[tokio::test]
async fn test_join_rejects_invalid_meeting_reference() -> Result<()> {
    let h = harness()?;

    for reference in ["", "   ", "two words", "ftp://example.com/meet", "https://"] {
        let result = h.registry.join(reference, IdentityMode::Application).await;
        assert!(
            matches!(result, Err(JoinError::InvalidMeetingReference(_))),
            "{:?} should be rejected",
            reference
        );
    }

    assert!(h.gateway.requests().is_empty(), "Gateway should not be asked");
    assert!(h.registry.list_active().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_join_accepts_meeting_urls() -> Result<()> {
    let h = harness()?;

    h.registry
        .join(
            "https://teams.example.com/l/meetup-join/19%3ameeting_abc%40thread.v2/0",
            IdentityMode::Application,
        )
        .await?;
    assert_eq!(h.registry.list_active().len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_gateway_rejection_surfaces_as_join_error() -> Result<()> {
    let h = harness()?;
    h.gateway.reject_next_join("meeting locked");

    let result = h.registry.join("m1", IdentityMode::Application).await;
    assert!(matches!(result, Err(JoinError::Gateway(_))));
    assert!(h.registry.list_active().is_empty());

    // The next join goes through
    h.registry.join("m1", IdentityMode::Application).await?;
    assert_eq!(h.registry.list_active().len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_join_capture_leave_scenario() -> Result<()> {
    let h = harness()?;
    let handle = h.registry.join("m1", IdentityMode::Application).await?;

    let p1 = pcm(&[100, -100, 200, -200]);
    let p2 = pcm(&[300, -300]);
    for (ts, payload) in [(0, p1.clone()), (20, p2.clone())] {
        let delivered = h.gateway.deliver(
            &handle.call_id,
            AudioMediaFrame::unmixed(ts, vec![UnmixedBuffer::new("spk-A", payload)]),
        );
        assert!(delivered);
    }

    assert!(h.registry.leave(&handle.call_id).await?);
    assert!(h.registry.list_active().is_empty());
    assert!(h.registry.session(&handle.call_id).is_none());

    let files = wav_files(h.dir.path())?;
    assert_eq!(files.len(), 1);

    let (spec, samples) = read_wav(&files[0])?;
    assert_eq!(spec.sample_rate, 16000);
    assert_eq!(samples, vec![100, -100, 200, -200, 300, -300]);
    assert_eq!(samples.len() * 2, p1.len() + p2.len());

    let left = h.events.left_events();
    assert_eq!(left.len(), 1);
    match &left[0].kind {
        EventKind::Left { audio_files } => assert_eq!(audio_files, &files),
        other => panic!("unexpected event {:?}", other),
    }

    assert_eq!(h.gateway.outstanding_frames(), 0, "All frames released");
    assert!(h.gateway.active_calls().is_empty(), "Platform call terminated");

    Ok(())
}

#[tokio::test]
async fn test_leave_unknown_call_returns_false() -> Result<()> {
    let h = harness()?;

    assert!(!h.registry.leave("no-such-call").await?);

    let handle = h.registry.join("m1", IdentityMode::Application).await?;
    assert!(h.registry.leave(&handle.call_id).await?);
    assert!(!h.registry.leave(&handle.call_id).await?, "Second leave is a no-op");
    assert_eq!(h.events.left_events().len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_platform_removal_finalizes_once() -> Result<()> {
    let h = harness()?;
    let handle = h.registry.join("m1", IdentityMode::Application).await?;

    h.gateway.deliver(
        &handle.call_id,
        AudioMediaFrame::unmixed(0, vec![UnmixedBuffer::new("spk-A", pcm(&[1, 2, 3]))]),
    );
    assert!(h.gateway.remove_call(&handle.call_id, "meeting ended"));

    let registry = h.registry.clone();
    assert!(
        wait_until(2000, || registry.session(&handle.call_id).is_none()).await,
        "Session should be removed after platform removal"
    );
    assert!(h.registry.list_active().is_empty());
    assert!(!h.registry.leave(&handle.call_id).await?);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let left = h.events.left_events();
    assert_eq!(left.len(), 1, "Exactly one left event");
    assert!(left[0].message.contains("meeting ended"));

    let files = wav_files(h.dir.path())?;
    assert_eq!(files.len(), 1);
    assert_eq!(read_wav(&files[0])?.1, vec![1, 2, 3]);

    Ok(())
}

#[tokio::test]
async fn test_platform_state_changes_are_reported() -> Result<()> {
    let h = harness()?;
    let handle = h.registry.join("m1", IdentityMode::Application).await?;

    h.gateway
        .push_state(&handle.call_id, CallStateEvent::StateChanged("hold".to_string()));

    let events = h.events.clone();
    assert!(
        wait_until(1000, || events.count(|e| e.status() == "hold") == 1).await,
        "State change should be forwarded as a status event"
    );
    assert!(events.count(|e| e.status() == "established") == 1);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_first_frames_one_file_per_source() -> Result<()> {
    let h = harness()?;
    let handle = h.registry.join("m1", IdentityMode::Application).await?;

    let barrier = Arc::new(Barrier::new(2));
    std::thread::scope(|scope| {
        for value in [1i16, 2] {
            let gateway = Arc::clone(&h.gateway);
            let barrier = Arc::clone(&barrier);
            let call_id = handle.call_id.clone();
            scope.spawn(move || {
                barrier.wait();
                gateway.deliver(
                    &call_id,
                    AudioMediaFrame::unmixed(0, vec![UnmixedBuffer::new("spk-B", pcm(&[value]))]),
                );
            });
        }
    });

    assert_eq!(h.pool.writer_count(&handle.call_id), 1);
    h.registry.leave(&handle.call_id).await?;

    let files = wav_files(h.dir.path())?;
    assert_eq!(files.len(), 1, "Exactly one file for spk-B");

    let mut samples = read_wav(&files[0])?.1;
    samples.sort();
    assert_eq!(samples, vec![1, 2]);

    Ok(())
}

#[tokio::test]
async fn test_sessions_are_isolated() -> Result<()> {
    let h = harness()?;
    let a = h.registry.join("meeting-a", IdentityMode::Application).await?;
    let b = h.registry.join("meeting-b", IdentityMode::Application).await?;

    h.gateway.deliver(
        &a.call_id,
        AudioMediaFrame::unmixed(0, vec![UnmixedBuffer::new("spk-A", pcm(&[1]))]),
    );
    h.gateway.deliver(
        &b.call_id,
        AudioMediaFrame::unmixed(0, vec![UnmixedBuffer::new("spk-A", pcm(&[2]))]),
    );

    h.registry.leave(&a.call_id).await?;

    let active = h.registry.list_active();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].call_id, b.call_id);
    assert_eq!(h.pool.writer_count(&b.call_id), 1, "Other call keeps its writer");

    assert_eq!(h.registry.leave_all().await, 1);
    assert_eq!(wav_files(h.dir.path())?.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_unreachable_consumer_never_blocks_lifecycle() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let pool = Arc::new(AudioWriterPool::new(WriterPoolConfig::new(temp_dir.path()))?);
    let notifier = Arc::new(HttpNotifier::new(NotifierConfig {
        // Nothing listens on the discard port
        base_url: Some("http://127.0.0.1:9".to_string()),
        timeout: Duration::from_millis(500),
        ..NotifierConfig::default()
    })?);
    let gateway = Arc::new(SimulatedGateway::new());
    let registry = SessionRegistry::new(pool, notifier);
    registry.initialize(gateway.clone());

    let lifecycle = async {
        let handle = registry.join("m1", IdentityMode::Application).await?;
        gateway.deliver(
            &handle.call_id,
            AudioMediaFrame::unmixed(0, vec![UnmixedBuffer::new("spk-A", pcm(&[1, 2]))]),
        );
        let left = registry.leave(&handle.call_id).await?;
        anyhow::Ok(left)
    };

    let left = tokio::time::timeout(Duration::from_secs(2), lifecycle).await??;
    assert!(left);
    assert_eq!(wav_files(temp_dir.path())?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_frames_beyond_backlog_threshold_are_kept() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let pool = Arc::new(AudioWriterPool::new(WriterPoolConfig {
        backlog_warning: 2,
        ..WriterPoolConfig::new(temp_dir.path())
    })?);
    let gateway = Arc::new(SimulatedGateway::new());
    let registry = SessionRegistry::new(pool, Arc::new(common::RecordingSink::default()));
    registry.initialize(gateway.clone());

    let handle = registry.join("m1", IdentityMode::Application).await?;

    // Delivered back to back on the runtime thread, so the writer falls behind
    for n in 0..10i16 {
        assert!(gateway.deliver(
            &handle.call_id,
            AudioMediaFrame::unmixed(n as u64 * 20, vec![UnmixedBuffer::new("spk-A", pcm(&[n]))]),
        ));
    }

    let artifacts = registry
        .leave_and_collect(&handle.call_id)
        .await?
        .expect("session was registered");
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].bytes_written, 20);
    assert_eq!(
        read_wav(&artifacts[0].file_path)?.1,
        (0..10).collect::<Vec<i16>>(),
        "Every delivered frame reaches the file in order"
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_leave_during_frame_delivery() -> Result<()> {
    let h = harness()?;
    let mut total_files = 0;

    for _ in 0..30 {
        let handle = h.registry.join("m1", IdentityMode::Application).await?;
        let stop = Arc::new(AtomicBool::new(false));

        let senders: Vec<_> = (0..3)
            .map(|i| {
                let gateway = Arc::clone(&h.gateway);
                let stop = Arc::clone(&stop);
                let call_id = handle.call_id.clone();
                std::thread::spawn(move || {
                    let speaker = format!("spk-{}", i);
                    let mut n = 0u64;
                    while !stop.load(Ordering::SeqCst) {
                        let frame = AudioMediaFrame::unmixed(
                            n * 20,
                            vec![UnmixedBuffer::new(speaker.clone(), pcm(&[n as i16; 160]))],
                        );
                        if !gateway.deliver(&call_id, frame) {
                            break;
                        }
                        n += 1;
                    }
                })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(5)).await;
        let artifacts = h
            .registry
            .leave_and_collect(&handle.call_id)
            .await?
            .expect("session was registered");

        stop.store(true, Ordering::SeqCst);
        for sender in senders {
            sender
                .join()
                .map_err(|_| anyhow::anyhow!("frame delivery thread panicked"))?;
        }

        for artifact in &artifacts {
            let (_, samples) = read_wav(&artifact.file_path)?;
            assert_eq!(
                samples.len() as u64 * 2,
                artifact.bytes_written,
                "Header length matches the bytes written"
            );
        }

        total_files += artifacts.len();
        assert_eq!(
            wav_files(h.dir.path())?.len(),
            total_files,
            "No file is created after finalize"
        );
        assert!(!h.pool.is_open(&handle.call_id));
    }

    assert_eq!(h.gateway.outstanding_frames(), 0, "Every frame was released");
    assert!(h.registry.list_active().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_finalizing_session_is_leaving_on_both_paths() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let pool = Arc::new(AudioWriterPool::new(WriterPoolConfig::new(temp_dir.path()))?);
    let observer = Arc::new(FinalizeObserver::default());
    let gateway = Arc::new(SimulatedGateway::new());
    let registry = SessionRegistry::new(pool, observer.clone());
    let _ = observer.registry.set(registry.clone());
    registry.initialize(gateway.clone());

    let a = registry.join("meeting-a", IdentityMode::Application).await?;
    let b = registry.join("meeting-b", IdentityMode::Application).await?;
    let listing = registry.clone();
    assert!(
        wait_until(1000, || listing
            .list_active()
            .iter()
            .all(|s| s.status == SessionState::Active))
        .await
    );

    for call_id in [&a.call_id, &b.call_id] {
        gateway.deliver(
            call_id,
            AudioMediaFrame::unmixed(0, vec![UnmixedBuffer::new("spk-A", pcm(&[1]))]),
        );
    }

    // Explicit leave
    registry.leave(&a.call_id).await?;
    assert_eq!(observer.seen(), vec![(Some(SessionState::Leaving), 1)]);

    // Platform removal
    gateway.remove_call(&b.call_id, "meeting ended");
    let seen = observer.clone();
    assert!(wait_until(2000, || seen.seen().len() == 2).await);
    assert_eq!(observer.seen()[1], (Some(SessionState::Leaving), 0));

    Ok(())
}
