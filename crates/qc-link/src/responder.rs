//! Flight side of the link.
//!
//! One connection at a time walks Idle -> Arming -> Active -> Landing ->
//! Disarming -> Idle. Whatever ends Active (peer gone, silence, corrupt payload,
//! actuator failure), the throttle is ramped down one percent per landing step
//! and the controller is disarmed before the next client is accepted.

use bytes::BytesMut;
use qc_fc::arming;
use qc_fc::ActuatorSink;
use qc_proto::command::THROTTLE_MAX;
use qc_proto::{ControlCommand, ProtoError, CONTROL_TAG};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::{StopFlag, TimingConfig};

/// Pause after a failed accept (e.g. out of file descriptors) before listening again.
pub const ACCEPT_RETRY: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Arming,
    Active,
    Landing,
    Disarming,
}

impl LinkState {
    /// The only state reachable from `self`.
    pub fn next(self) -> LinkState {
        match self {
            LinkState::Idle => LinkState::Arming,
            LinkState::Arming => LinkState::Active,
            LinkState::Active => LinkState::Landing,
            LinkState::Landing => LinkState::Disarming,
            LinkState::Disarming => LinkState::Idle,
        }
    }
}

/// Why a session left Active. Every variant leads to landing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    PeerClosed,
    LinkTimeout,
    Corrupt(String),
    SinkFailure(String),
    Io(String),
}

impl SessionEnd {
    pub fn describe(&self) -> String {
        match self {
            SessionEnd::PeerClosed => "client disconnected".into(),
            SessionEnd::LinkTimeout => "no frame within the receive timeout".into(),
            SessionEnd::Corrupt(why) => format!("corrupt payload ({})", why),
            SessionEnd::SinkFailure(why) => format!("actuator failure ({})", why),
            SessionEnd::Io(why) => format!("link error ({})", why),
        }
    }
}

#[derive(Debug, Default)]
struct Session {
    last_throttle: i32,
    applied: u64,
    dropped: u64,
}

enum Outcome {
    Applied,
    Dropped,
}

pub struct Responder<S> {
    sink: S,
    timing: TimingConfig,
    buffer_size: usize,
    stop: StopFlag,
    state: watch::Sender<LinkState>,
}

impl<S: ActuatorSink + Send> Responder<S> {
    pub fn new(sink: S, timing: TimingConfig, buffer_size: usize, stop: StopFlag) -> Self {
        let (state, _) = watch::channel(LinkState::Idle);
        Self { sink, timing, buffer_size, stop, state }
    }

    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Put the actuator in a known neutral state before serving anyone.
    pub async fn idle(&mut self) -> anyhow::Result<()> {
        arming::idle(&mut self.sink).await
    }

    /// Accept and serve clients one after another until the stop flag is raised.
    ///
    /// The flag is only honoured while waiting for a client, so a landing in
    /// progress always runs to the end.
    pub async fn run(&mut self, listener: TcpListener) -> anyhow::Result<()> {
        let local = listener.local_addr()?;
        loop {
            info!("responder: listening on {}", local);
            let (stream, peer) = tokio::select! {
                r = listener.accept() => match r {
                    Ok(v) => v,
                    Err(e) => {
                        self.accept_failed(e).await;
                        continue;
                    }
                },
                _ = self.stop.raised() => {
                    info!("responder: stop requested");
                    return Ok(());
                }
            };
            info!("responder: client connected from {}", peer);
            let end = self.serve_connection(stream).await;
            info!("responder: session with {} over ({:?})", peer, end);
        }
    }

    async fn accept_failed(&self, e: std::io::Error) {
        warn!("responder: accept failed, retrying in {:?}: {}", ACCEPT_RETRY, e);
        tokio::time::sleep(ACCEPT_RETRY).await;
    }

    /// Run one full session on an accepted connection and return to Idle.
    pub async fn serve_connection<T: AsyncRead + AsyncWrite + Unpin + Send>(&mut self, mut stream: T) -> SessionEnd {
        let mut session = Session::default();

        self.transition(LinkState::Arming);
        if let Err(e) = arming::arm(&mut self.sink, self.timing.arm_hold()).await {
            error!("responder: arming failed: {:#}", e);
        }

        self.transition(LinkState::Active);
        let end = self.active(&mut stream, &mut session).await;

        self.transition(LinkState::Landing);
        let _ = stream.shutdown().await;
        drop(stream);
        self.land(&mut session, &end).await;

        self.transition(LinkState::Disarming);
        if let Err(e) = arming::disarm(&mut self.sink, self.timing.arm_hold()).await {
            error!("responder: disarming failed: {:#}", e);
        }
        info!(
            "responder: disarmed (applied {} frames, dropped {})",
            session.applied, session.dropped
        );

        self.transition(LinkState::Idle);
        end
    }

    async fn active<T: AsyncRead + AsyncWrite + Unpin>(&mut self, stream: &mut T, session: &mut Session) -> SessionEnd {
        let mut buf = BytesMut::with_capacity(self.buffer_size);
        loop {
            buf.clear();
            let read = tokio::time::timeout(self.timing.recv_timeout(), stream.read_buf(&mut buf)).await;
            match read {
                Err(_) => {
                    warn!("responder: no frame for {:?}, connection lost", self.timing.recv_timeout());
                    return SessionEnd::LinkTimeout;
                }
                Ok(Err(e)) => {
                    warn!("responder: receive failed: {}", e);
                    return SessionEnd::Io(e.to_string());
                }
                Ok(Ok(0)) => {
                    warn!("responder: connection lost");
                    return SessionEnd::PeerClosed;
                }
                Ok(Ok(_)) => {}
            }

            match self.handle_frame(&buf, session).await {
                Ok(Outcome::Applied) => {
                    // Echo the exact bytes back as delivery confirmation.
                    if let Err(e) = stream.write_all(&buf).await {
                        warn!("responder: echo failed: {}", e);
                        return SessionEnd::Io(e.to_string());
                    }
                }
                Ok(Outcome::Dropped) => session.dropped += 1,
                Err(end) => return end,
            }
        }
    }

    async fn handle_frame(&mut self, raw: &[u8], session: &mut Session) -> Result<Outcome, SessionEnd> {
        let Ok(text) = std::str::from_utf8(raw) else {
            warn!("responder: frame is not text, dropped");
            return Ok(Outcome::Dropped);
        };

        let mut cmd = match ControlCommand::parse(text) {
            Ok(cmd) => cmd,
            Err(ProtoError::ChecksumMismatch { expected, found }) => {
                warn!("responder: checksum mismatch, expected {} found {:?}: {}", expected, found, text);
                return Ok(Outcome::Dropped);
            }
            Err(ProtoError::UnknownTag(tag)) => {
                warn!("responder: message was not ${} (tag {:?}), dropped", CONTROL_TAG, tag);
                return Ok(Outcome::Dropped);
            }
            Err(e) if e.is_corrupt() => {
                error!("responder: corrupt payload ({}), dropping connection: {}", e, text);
                return Err(SessionEnd::Corrupt(e.to_string()));
            }
            Err(e) => {
                warn!("responder: {}, dropped: {:?}", e, text);
                return Ok(Outcome::Dropped);
            }
        };

        if !(0..=THROTTLE_MAX).contains(&cmd.throttle) {
            warn!("responder: throttle {} out of range, clamped", cmd.throttle);
            cmd.throttle = cmd.throttle.clamp(0, THROTTLE_MAX);
        }

        info!("{}", cmd);
        if let Err(e) = self.sink.apply(&cmd).await {
            error!("responder: actuator write failed, dropping connection: {:#}", e);
            return Err(SessionEnd::SinkFailure(format!("{:#}", e)));
        }
        session.last_throttle = cmd.throttle;
        session.applied += 1;
        Ok(Outcome::Applied)
    }

    /// Linear throttle ramp to zero, autolevel on and all axes centred.
    async fn land(&mut self, session: &mut Session, end: &SessionEnd) {
        info!("responder: {}, landing from throttle {}", end.describe(), session.last_throttle);
        while session.last_throttle > 0 {
            session.last_throttle -= 1;
            let cmd = ControlCommand::with_throttle(session.last_throttle);
            info!("responder: landing, throttle {}", cmd.throttle);
            if let Err(e) = self.sink.apply(&cmd).await {
                error!("responder: actuator write failed during landing: {:#}", e);
            }
            tokio::time::sleep(self.timing.landing_step()).await;
        }
    }

    fn transition(&self, next: LinkState) {
        let current = *self.state.borrow();
        if current.next() != next {
            error!("responder: refusing transition {:?} -> {:?}", current, next);
            return;
        }
        info!("responder: {:?} -> {:?}", current, next);
        self.state.send_replace(next);
    }
}
