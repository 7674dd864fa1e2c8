// src/runtime.rs - tokio task that owns a DetectionSession and drives its timers
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::detector::LandmarkSource;
use crate::error::StartError;
use crate::landmarks::HandObservation;
use crate::session::{DetectionSession, SessionEvent};
use crate::signs::{ReferenceSign, SignLibrary};

/// Frames arriving while this many are still queued are dropped.
pub const FRAME_QUEUE: usize = 8;
pub const EVENT_QUEUE: usize = 64;

/// The library is shared with whatever edits it; a session only ever sees the
/// snapshot taken when it starts.
pub type SharedLibrary = Arc<Mutex<SignLibrary>>;

#[derive(Debug)]
pub enum SessionCommand {
    Start {
        detector_loaded: bool,
        reply: oneshot::Sender<Result<(), StartError>>,
    },
    Frame(Vec<HandObservation>),
    Dismiss,
    Stop,
}

/// Cheap to clone. Dropping every handle shuts the driver down.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Starts a session; a refusal comes back as a [`StartError`] inside the error.
    pub async fn start(&self, detector_loaded: bool) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.cmd_tx
            .send(SessionCommand::Start { detector_loaded, reply })
            .await
            .map_err(|_| anyhow!("session driver has shut down"))?;
        response
            .await
            .context("session driver dropped the start request")??;
        Ok(())
    }

    /// Queues a detector frame without waiting. Returns false if it was dropped.
    pub fn push_frame(&self, hands: Vec<HandObservation>) -> bool {
        match self.cmd_tx.try_send(SessionCommand::Frame(hands)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("Session busy, dropping frame");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub async fn dismiss(&self) {
        let _ = self.cmd_tx.send(SessionCommand::Dismiss).await;
    }

    pub async fn stop(&self) {
        let _ = self.cmd_tx.send(SessionCommand::Stop).await;
    }
}

pub struct SessionDriver;

impl SessionDriver {
    /// Moves the session onto a tokio task.
    ///
    /// Events come out of the returned receiver in the order the session
    /// produced them. The task ends when every [`SessionHandle`] is dropped,
    /// taking any pending countdown or timeout with it.
    pub fn spawn(
        session: DetectionSession,
        library: SharedLibrary,
    ) -> (SessionHandle, mpsc::Receiver<SessionEvent>, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(FRAME_QUEUE);
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);

        let task = tokio::spawn(drive(session, library, cmd_rx, event_tx));
        (SessionHandle { cmd_tx }, event_rx, task)
    }
}

/// Pushes every frame of `source` to the session at its recorded offset from now.
pub async fn feed_frames<S: LandmarkSource>(mut source: S, handle: SessionHandle) {
    let base = tokio::time::Instant::now();
    let mut dropped = 0usize;
    while let Some(frame) = source.next_frame() {
        tokio::time::sleep_until(base + Duration::from_millis(frame.at_ms)).await;
        if !handle.push_frame(frame.hands) {
            dropped += 1;
        }
    }
    debug!("Frame source exhausted ({dropped} dropped)");
}

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

async fn drive(
    mut session: DetectionSession,
    library: SharedLibrary,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
    event_tx: mpsc::Sender<SessionEvent>,
) {
    loop {
        let deadline = session.next_deadline();
        let events = tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(cmd) => handle_command(&mut session, &library, cmd),
                None => {
                    debug!("All session handles dropped, driver exiting");
                    break;
                }
            },
            _ = sleep_until(deadline) => session.tick(now()),
        };

        for event in events {
            if event_tx.send(event).await.is_err() {
                debug!("Event receiver dropped");
            }
        }
    }
}

fn handle_command(
    session: &mut DetectionSession,
    library: &SharedLibrary,
    cmd: SessionCommand,
) -> Vec<SessionEvent> {
    match cmd {
        SessionCommand::Start { detector_loaded, reply } => {
            let result = session.start(now(), detector_loaded, snapshot(library));
            let (response, events) = match result {
                Ok(events) => (Ok(()), events),
                Err(err) => (Err(err), Vec::new()),
            };
            let _ = reply.send(response);
            events
        }
        SessionCommand::Frame(hands) => session.on_frame(now(), &hands),
        SessionCommand::Dismiss => {
            session.dismiss();
            Vec::new()
        }
        SessionCommand::Stop => session.stop().into_iter().collect(),
    }
}

fn snapshot(library: &SharedLibrary) -> Arc<[ReferenceSign]> {
    match library.lock() {
        Ok(library) => library.snapshot(),
        Err(poisoned) => {
            warn!("Sign library lock poisoned, using last written state");
            poisoned.into_inner().snapshot()
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::fixtures::{hand, open_hand};
    use crate::landmarks::Handedness;
    use crate::signs::fixtures::sign;
    use crate::signs::HandType;

    fn library_with_hello() -> SharedLibrary {
        let hello = sign("Hello", HandType::Left, vec![open_hand(0.5, 0.8, 0.3)]);
        Arc::new(Mutex::new(SignLibrary::new(vec![hello])))
    }

    fn left_hello() -> Vec<HandObservation> {
        vec![hand(Handedness::Left, open_hand(0.3, 0.7, 0.2), 0.95)]
    }

    async fn run_countdown(rx: &mut mpsc::Receiver<SessionEvent>) {
        for expected in [
            SessionEvent::Countdown(3),
            SessionEvent::Countdown(2),
            SessionEvent::Countdown(1),
            SessionEvent::Activated,
        ] {
            assert_eq!(rx.recv().await, Some(expected));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn start_refusal_reaches_caller() {
        let library: SharedLibrary = Arc::new(Mutex::new(SignLibrary::default()));
        let (handle, _rx, _task) = SessionDriver::spawn(DetectionSession::default(), library);

        let err = handle.start(true).await.unwrap_err();
        assert_eq!(err.downcast_ref::<StartError>(), Some(&StartError::EmptyLibrary));

        let library = library_with_hello();
        let (handle, _rx, _task) = SessionDriver::spawn(DetectionSession::default(), library);
        let err = handle.start(false).await.unwrap_err();
        assert_eq!(err.downcast_ref::<StartError>(), Some(&StartError::DetectorNotLoaded));
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_and_timeout_follow_the_clock() {
        let (handle, mut rx, _task) =
            SessionDriver::spawn(DetectionSession::default(), library_with_hello());
        let started = tokio::time::Instant::now();

        handle.start(true).await.unwrap();
        run_countdown(&mut rx).await;
        assert!(started.elapsed() >= Duration::from_secs(3));

        assert_eq!(rx.recv().await, Some(SessionEvent::TimedOut));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(13));
        assert!(elapsed < Duration::from_millis(13_100));
    }

    #[tokio::test(start_paused = true)]
    async fn frames_confirm_a_sign() {
        let (handle, mut rx, _task) =
            SessionDriver::spawn(DetectionSession::default(), library_with_hello());
        handle.start(true).await.unwrap();
        run_countdown(&mut rx).await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(handle.push_frame(left_hello()));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(handle.push_frame(left_hello()));

        match rx.recv().await {
            Some(SessionEvent::Detected(result)) => {
                assert_eq!(result.sign.name, "Hello");
                assert!(result.confidence > 0.99);
            }
            other => panic!("expected detection, got {other:?}"),
        }
        handle.dismiss().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_pending_timers() {
        let (handle, mut rx, _task) =
            SessionDriver::spawn(DetectionSession::default(), library_with_hello());
        handle.start(true).await.unwrap();
        assert_eq!(rx.recv().await, Some(SessionEvent::Countdown(3)));

        handle.stop().await;
        assert_eq!(rx.recv().await, Some(SessionEvent::Stopped));

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn library_edits_after_start_are_not_seen() {
        let library = library_with_hello();
        let (handle, mut rx, _task) =
            SessionDriver::spawn(DetectionSession::default(), Arc::clone(&library));
        handle.start(true).await.unwrap();

        library.lock().unwrap().clear();
        run_countdown(&mut rx).await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.push_frame(left_hello());
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.push_frame(left_hello());
        assert!(matches!(rx.recv().await, Some(SessionEvent::Detected(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handles_ends_the_driver() {
        let (handle, _rx, task) =
            SessionDriver::spawn(DetectionSession::default(), library_with_hello());
        handle.start(true).await.unwrap();
        drop(handle);
        task.await.unwrap();
    }
}
