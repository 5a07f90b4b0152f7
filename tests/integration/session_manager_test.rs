use assert_matches::assert_matches;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::common::{
    fast_pipeline, unavailable_backend, BlockingBackend, PerSessionBackend, PoseFixtures,
    ScriptedBackend, SlowOpenBackend,
};
use posture_coach::config::PipelineConfig;
use posture_coach::errors::SessionError;
use posture_coach::models::{SessionAck, SessionId, StatusTag};
use posture_coach::services::{CaptureBackend, InMemoryEventLog, SessionManager};

fn manager(backend: impl CaptureBackend + 'static, config: PipelineConfig) -> SessionManager {
    SessionManager::new(
        Arc::new(backend),
        Arc::new(InMemoryEventLog::default()),
        config,
    )
}

/// Poll until the session reports `status` or the deadline passes
async fn wait_for_status(manager: &SessionManager, session_id: &SessionId, status: StatusTag) -> bool {
    for _ in 0..200 {
        if let Some(record) = manager.status(session_id).await {
            if record.status == status {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[cfg(test)]
mod session_manager_tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_never_started_session() {
        let manager = manager(ScriptedBackend::new(None), fast_pipeline(0));
        let ack = manager.stop(&SessionId::new("idle")).await;
        assert_eq!(ack, SessionAck::NotRunning);
        assert!(manager.status(&SessionId::new("idle")).await.is_none());
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let backend = ScriptedBackend::new(Some(PoseFixtures::upright()));
        let opened = Arc::clone(&backend.opened);
        let manager = manager(backend, fast_pipeline(0));
        let session = SessionId::new("desk");

        assert_eq!(manager.start(&session).await.unwrap(), SessionAck::Started);
        assert_eq!(manager.start(&session).await.unwrap(), SessionAck::AlreadyRunning);
        assert_eq!(opened.load(Ordering::SeqCst), 1);

        assert_eq!(manager.stop(&session).await, SessionAck::Stopped);
        assert_eq!(manager.stop(&session).await, SessionAck::NotRunning);
    }

    #[tokio::test]
    async fn test_unavailable_camera_fails_start() {
        let manager = manager(unavailable_backend(), fast_pipeline(0));
        let session = SessionId::new("no-camera");

        let result = manager.start(&session).await;
        assert_matches!(result, Err(SessionError::DeviceUnavailable { .. }));
        assert!(manager.running_sessions().await.is_empty());
    }

    #[tokio::test]
    async fn test_session_calibrates_then_reports_good() {
        let manager = manager(
            ScriptedBackend::new(Some(PoseFixtures::upright())),
            fast_pipeline(3),
        );
        let session = SessionId::new("desk");
        manager.start(&session).await.unwrap();

        assert!(wait_for_status(&manager, &session, StatusTag::Good).await);

        let record = manager.status(&session).await.unwrap();
        assert!(record.frame > 3);
        assert_eq!(record.reason.as_deref(), Some("Excellent Posture"));

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_countdown_before_calibration() {
        let manager = manager(
            ScriptedBackend::new(Some(PoseFixtures::upright())),
            fast_pipeline(100_000),
        );
        let session = SessionId::new("warmup");
        manager.start(&session).await.unwrap();

        let record = manager.status(&session).await.unwrap();
        assert_eq!(record.status, StatusTag::Calibrating);
        assert!(record.reason.unwrap().starts_with("Calibrating in"));

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let manager = manager(
            ScriptedBackend::new(Some(PoseFixtures::upright())),
            fast_pipeline(0),
        );
        let first = SessionId::new("first");
        let second = SessionId::new("second");

        manager.start(&first).await.unwrap();
        manager.start(&second).await.unwrap();
        assert_eq!(manager.running_sessions().await, vec![first.clone(), second.clone()]);

        assert_eq!(manager.stop(&first).await, SessionAck::Stopped);
        assert!(manager.status(&first).await.is_none());
        assert!(wait_for_status(&manager, &second, StatusTag::Good).await);

        manager.shutdown().await;
        assert!(manager.running_sessions().await.is_empty());
    }

    #[tokio::test]
    async fn test_sessions_keep_their_own_baseline() {
        // judged against the upright baseline, the leaning pose would be a slouch
        let manager = manager(
            PerSessionBackend::new([
                ("upright", PoseFixtures::upright()),
                ("leaning", PoseFixtures::pose(0.34, 0.47, 9.0)),
            ]),
            fast_pipeline(2),
        );
        let upright = SessionId::new("upright");
        let leaning = SessionId::new("leaning");

        manager.start(&upright).await.unwrap();
        manager.start(&leaning).await.unwrap();

        assert!(wait_for_status(&manager, &upright, StatusTag::Good).await);
        assert!(wait_for_status(&manager, &leaning, StatusTag::Good).await);

        let upright_record = manager.status(&upright).await.unwrap();
        let leaning_record = manager.status(&leaning).await.unwrap();
        assert_eq!(upright_record.reason.as_deref(), Some("Excellent Posture"));
        assert_eq!(leaning_record.reason.as_deref(), Some("Excellent Posture"));
        assert!(upright_record.angle.unwrap().abs() < 1.0);
        assert!((leaning_record.angle.unwrap().abs() - 9.0).abs() < 1.0);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_is_bounded_while_a_read_blocks() {
        let backend = BlockingBackend::new(Duration::from_millis(1500));
        let live = Arc::clone(&backend.live);
        let peak = Arc::clone(&backend.peak);
        let opened = Arc::clone(&backend.opened);
        let config = PipelineConfig {
            stop_timeout: Duration::from_millis(100),
            ..fast_pipeline(0)
        };
        let manager = manager(backend, config);
        let session = SessionId::new("blocked");

        assert_eq!(manager.start(&session).await.unwrap(), SessionAck::Started);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let begun = Instant::now();
        assert_eq!(manager.stop(&session).await, SessionAck::Stopped);
        assert!(begun.elapsed() < Duration::from_secs(1));
        assert!(manager.status(&session).await.is_none());
        assert!(manager.running_sessions().await.is_empty());

        // the old loop still owns the device until its read returns
        assert_matches!(
            manager.start(&session).await,
            Err(SessionError::StillStopping { .. })
        );
        assert_eq!(manager.stop(&session).await, SessionAck::NotRunning);
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert_eq!(live.load(Ordering::SeqCst), 1);

        for _ in 0..100 {
            if live.load(Ordering::SeqCst) == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(live.load(Ordering::SeqCst), 0);

        assert_eq!(manager.start(&session).await.unwrap(), SessionAck::Started);
        assert_eq!(opened.load(Ordering::SeqCst), 2);
        assert_eq!(peak.load(Ordering::SeqCst), 1);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_slow_open_does_not_block_other_sessions() {
        let manager = Arc::new(manager(
            SlowOpenBackend {
                slow_session: "slow",
                open_delay: Duration::from_millis(800),
                inner: ScriptedBackend::new(Some(PoseFixtures::upright())),
            },
            fast_pipeline(0),
        ));
        let fast = SessionId::new("fast");
        let slow = SessionId::new("slow");
        manager.start(&fast).await.unwrap();

        let slow_start = {
            let manager = Arc::clone(&manager);
            let slow = slow.clone();
            tokio::spawn(async move { manager.start(&slow).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let begun = Instant::now();
        assert!(manager.status(&fast).await.is_some());
        assert_eq!(manager.recalibrate(&fast).await, SessionAck::Recalibrating);
        assert_eq!(manager.start(&slow).await.unwrap(), SessionAck::AlreadyRunning);
        assert!(manager.status(&slow).await.is_none());
        assert!(begun.elapsed() < Duration::from_millis(400));

        assert_eq!(slow_start.await.unwrap().unwrap(), SessionAck::Started);
        assert_eq!(manager.running_sessions().await, vec![fast, slow]);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_during_open_releases_device() {
        let backend = SlowOpenBackend {
            slow_session: "slow",
            open_delay: Duration::from_millis(300),
            inner: ScriptedBackend::new(Some(PoseFixtures::upright())),
        };
        let opened = Arc::clone(&backend.inner.opened);
        let manager = Arc::new(manager(backend, fast_pipeline(0)));
        let slow = SessionId::new("slow");

        let slow_start = {
            let manager = Arc::clone(&manager);
            let slow = slow.clone();
            tokio::spawn(async move { manager.start(&slow).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(manager.stop(&slow).await, SessionAck::Stopped);
        assert_eq!(slow_start.await.unwrap().unwrap(), SessionAck::Stopped);
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert!(manager.running_sessions().await.is_empty());

        assert_eq!(manager.start(&slow).await.unwrap(), SessionAck::Started);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_transient_read_failures_are_retried() {
        let backend = ScriptedBackend::new(Some(PoseFixtures::upright())).with_read_failures(5);
        let reads = Arc::clone(&backend.reads);
        let manager = manager(backend, fast_pipeline(0));
        let session = SessionId::new("flaky");

        manager.start(&session).await.unwrap();
        assert!(wait_for_status(&manager, &session, StatusTag::Good).await);
        assert!(reads.load(Ordering::SeqCst) > 5);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_no_landmarks_reports_calibrating_then_recovers_on_recalibrate() {
        let manager = manager(ScriptedBackend::new(None), fast_pipeline(0));
        let session = SessionId::new("empty");
        manager.start(&session).await.unwrap();

        assert!(wait_for_status(&manager, &session, StatusTag::Calibrating).await);
        assert_eq!(manager.recalibrate(&session).await, SessionAck::Recalibrating);
        assert_eq!(
            manager.recalibrate(&SessionId::new("other")).await,
            SessionAck::NotRunning
        );

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_status_polls_are_recorded() {
        let events = Arc::new(InMemoryEventLog::default());
        let manager = SessionManager::new(
            Arc::new(ScriptedBackend::new(Some(PoseFixtures::upright()))),
            events.clone(),
            fast_pipeline(0),
        );
        let session = SessionId::new("recorded");
        manager.start(&session).await.unwrap();

        assert!(wait_for_status(&manager, &session, StatusTag::Good).await);
        let summary = events.summary(&session);
        assert!(summary.good_events >= 1);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_restart_begins_with_empty_history() {
        let events = Arc::new(InMemoryEventLog::default());
        let manager = SessionManager::new(
            Arc::new(ScriptedBackend::new(Some(PoseFixtures::upright()))),
            events.clone(),
            fast_pipeline(0),
        );
        let session = SessionId::new("desk");

        manager.start(&session).await.unwrap();
        assert!(wait_for_status(&manager, &session, StatusTag::Good).await);
        assert!(!events.events(&session).is_empty());

        manager.stop(&session).await;
        assert!(!events.events(&session).is_empty());

        manager.start(&session).await.unwrap();
        assert!(events.events(&session).is_empty());
        assert_eq!(events.summary(&session).assessed_events, 0);

        manager.shutdown().await;
    }
}
