//! Operator side of the link: send the latest control state once per period and
//! check that the responder echoes it back byte for byte.
//!
//! Reconnects are unbounded and, with the default `reconnect_delay_ms = 0`,
//! immediate: the station keeps trying for as long as it runs. The echo wait is
//! unbounded too unless `echo_timeout_ms` is set, so a responder that accepts
//! but never answers stalls the sender.

use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::{ControlState, LinkConfig, StopFlag, TimingConfig};

#[derive(Debug, Clone, Default)]
pub struct LinkHealth {
    pub rtt_ms: Option<u32>,
    pub echoes_ok: u64,
    pub mismatches: u64,
    pub reconnects: u64,
    pub connect_failures: u64,
}

enum CycleEnd {
    Stopped,
    Lost,
}

pub struct Initiator {
    addr: String,
    buffer_size: usize,
    timing: TimingConfig,
    control: ControlState,
    stop: StopFlag,
    health: LinkHealth,
}

impl Initiator {
    pub fn new(link: &LinkConfig, timing: TimingConfig, control: ControlState, stop: StopFlag) -> Self {
        Self {
            addr: link.connect_addr(),
            buffer_size: link.buffer_size,
            timing,
            control,
            stop,
            health: LinkHealth::default(),
        }
    }

    pub fn link_health(&self) -> &LinkHealth {
        &self.health
    }

    /// Connect, stream control frames, and reconnect on any failure until the stop flag is raised.
    pub async fn run(&mut self) {
        while !self.stop.is_raised() {
            let stream = match TcpStream::connect(&self.addr).await {
                Ok(s) => s,
                Err(e) => {
                    self.health.connect_failures += 1;
                    warn!("initiator: connect {} failed (attempt {}): {}", self.addr, self.health.connect_failures, e);
                    tokio::time::sleep(self.timing.reconnect_delay()).await;
                    continue;
                }
            };
            info!("initiator: connected to {}", self.addr);

            match self.stream_frames(stream).await {
                CycleEnd::Stopped => break,
                CycleEnd::Lost => {
                    self.health.reconnects += 1;
                    warn!("initiator: link lost, reconnecting (reconnects: {})", self.health.reconnects);
                    tokio::time::sleep(self.timing.reconnect_delay()).await;
                }
            }
        }
        info!(
            "initiator: stopped (ok: {}, mismatches: {}, reconnects: {})",
            self.health.echoes_ok, self.health.mismatches, self.health.reconnects
        );
    }

    async fn stream_frames<S: AsyncRead + AsyncWrite + Unpin>(&mut self, mut stream: S) -> CycleEnd {
        let mut buf = vec![0u8; self.buffer_size];
        loop {
            if self.stop.is_raised() {
                return CycleEnd::Stopped;
            }

            let demand = self.control.snapshot().to_frame();
            let start = Instant::now();
            if let Err(e) = stream.write_all(demand.as_bytes()).await {
                warn!("initiator: send failed: {}", e);
                return CycleEnd::Lost;
            }

            let n = match self.read_echo(&mut stream, &mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    warn!("initiator: receive failed: {}", e);
                    return CycleEnd::Lost;
                }
            };
            let response = &buf[..n];

            if response == demand.as_bytes() {
                self.health.echoes_ok += 1;
                self.health.rtt_ms = Some(start.elapsed().as_millis() as u32);
                info!("initiator: echo ok: {}", demand);
            } else {
                self.health.mismatches += 1;
                warn!(
                    demand = %demand,
                    response = %String::from_utf8_lossy(response),
                    "initiator: echo mismatch"
                );
            }

            if n == 0 {
                warn!("initiator: responder closed the connection");
                return CycleEnd::Lost;
            }

            tokio::time::sleep(self.timing.send_period()).await;
        }
    }

    /// A timed-out echo reads as empty, i.e. like a closed peer.
    async fn read_echo<S: AsyncRead + Unpin>(&self, stream: &mut S, buf: &mut [u8]) -> std::io::Result<usize> {
        match self.timing.echo_timeout() {
            Some(t) => match tokio::time::timeout(t, stream.read(buf)).await {
                Ok(r) => r,
                Err(_) => {
                    warn!("initiator: no echo within {:?}", t);
                    Ok(0)
                }
            },
            None => stream.read(buf).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qc_proto::ControlCommand;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    fn timing() -> TimingConfig {
        TimingConfig { send_period_ms: 10, reconnect_delay_ms: 5, ..TimingConfig::default() }
    }

    fn link(port: u16) -> LinkConfig {
        LinkConfig { host: "127.0.0.1".into(), port, ..LinkConfig::default() }
    }

    async fn listener() -> (TcpListener, u16) {
        let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = l.local_addr().unwrap().port();
        (l, port)
    }

    async fn finish(stop: &StopFlag, handle: tokio::task::JoinHandle<Initiator>) -> Initiator {
        stop.raise();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("initiator did not stop")
            .unwrap()
    }

    #[tokio::test]
    async fn mismatched_echo_keeps_the_connection() {
        let (l, port) = listener().await;
        let (seen_tx, seen_rx) = oneshot::channel();

        let server = tokio::spawn(async move {
            let (mut s, _) = l.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let mut frames = 0;
            let mut seen_tx = Some(seen_tx);
            loop {
                let n = s.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                frames += 1;
                if frames == 1 {
                    s.write_all(b"$QCCON,0,0,0,0,0*00").await.unwrap();
                } else {
                    s.write_all(&buf[..n]).await.unwrap();
                }
                if frames == 2 {
                    seen_tx.take().unwrap().send(()).unwrap();
                }
            }
            frames
        });

        let stop = StopFlag::new();
        let mut init = Initiator::new(&link(port), timing(), ControlState::default(), stop.clone());
        let handle = tokio::spawn(async move {
            init.run().await;
            init
        });

        seen_rx.await.unwrap();
        let init = finish(&stop, handle).await;
        let health = init.link_health();
        assert_eq!(health.mismatches, 1);
        assert!(health.echoes_ok >= 1);
        assert_eq!(health.reconnects, 0);
        assert!(health.rtt_ms.is_some());
        assert!(server.await.unwrap() >= 2);
    }

    #[tokio::test]
    async fn closed_peer_triggers_reconnect() {
        let (l, port) = listener().await;
        let (seen_tx, seen_rx) = oneshot::channel();

        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            {
                let (mut s, _) = l.accept().await.unwrap();
                s.read(&mut buf).await.unwrap();
            }
            let (mut s, _) = l.accept().await.unwrap();
            let n = s.read(&mut buf).await.unwrap();
            s.write_all(&buf[..n]).await.unwrap();
            seen_tx.send(()).unwrap();
            loop {
                let m = s.read(&mut buf).await.unwrap_or(0);
                if m == 0 || s.write_all(&buf[..m]).await.is_err() {
                    break;
                }
            }
        });

        let stop = StopFlag::new();
        let mut init = Initiator::new(&link(port), timing(), ControlState::default(), stop.clone());
        let handle = tokio::spawn(async move {
            init.run().await;
            init
        });

        seen_rx.await.unwrap();
        let init = finish(&stop, handle).await;
        let health = init.link_health();
        assert_eq!(health.reconnects, 1);
        assert_eq!(health.mismatches, 1);
        assert!(health.echoes_ok >= 1);
    }

    #[tokio::test]
    async fn frames_carry_the_latest_control_state() {
        let (l, port) = listener().await;
        let (frame_tx, frame_rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut s, _) = l.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let n = s.read(&mut buf).await.unwrap();
            frame_tx.send(String::from_utf8(buf[..n].to_vec()).unwrap()).unwrap();
            s.write_all(&buf[..n]).await.unwrap();
            loop {
                let m = s.read(&mut buf).await.unwrap_or(0);
                if m == 0 || s.write_all(&buf[..m]).await.is_err() {
                    break;
                }
            }
        });

        let control = ControlState::default();
        let cmd = ControlCommand { throttle: 42, pitch: -10, roll: 0, yaw: 10, autolevel: true };
        control.set(cmd);

        let stop = StopFlag::new();
        let mut init = Initiator::new(&link(port), timing(), control, stop.clone());
        let handle = tokio::spawn(async move {
            init.run().await;
            init
        });

        let frame = frame_rx.await.unwrap();
        finish(&stop, handle).await;
        assert_eq!(frame, cmd.to_frame());
        assert_eq!(ControlCommand::parse(&frame), Ok(cmd));
    }

    #[tokio::test]
    async fn unreachable_responder_is_retried() {
        let (l, port) = listener().await;
        drop(l);

        let stop = StopFlag::new();
        let mut init = Initiator::new(&link(port), timing(), ControlState::default(), stop.clone());
        let handle = tokio::spawn(async move {
            init.run().await;
            init
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        let init = finish(&stop, handle).await;
        assert!(init.link_health().connect_failures >= 2);
        assert_eq!(init.link_health().echoes_ok, 0);
    }

    #[tokio::test]
    async fn echo_timeout_is_treated_as_lost_link() {
        let (l, port) = listener().await;
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let mut held = Vec::new();
            for _ in 0..2 {
                let (s, _) = l.accept().await.unwrap();
                held.push(s);
            }
            tx.send(()).unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let stop = StopFlag::new();
        let timing = TimingConfig { echo_timeout_ms: 20, ..timing() };
        let mut init = Initiator::new(&link(port), timing, ControlState::default(), stop.clone());
        let handle = tokio::spawn(async move {
            init.run().await;
            init
        });

        rx.await.unwrap();
        let init = finish(&stop, handle).await;
        assert!(init.link_health().reconnects >= 1);
        assert!(init.link_health().mismatches >= 1);
    }
}
