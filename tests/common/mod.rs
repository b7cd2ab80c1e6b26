//! Loopback controller simulator shared by the integration tests.
//!
//! Listens on `127.0.0.1:0`, parses setpoint frames by their tag and answers
//! each one with a measurement whose `duration` counts replies across all
//! connections and whose control fields echo the first two payload values.

#![allow(dead_code)]

use anyhow::Result;
use robot_link::protocol::{encode_measurement, CommandKind, MeasurementRecord};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// One frame as seen by the simulator.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedFrame {
    pub connection: usize,
    pub kind: CommandKind,
    pub payload: Vec<f32>,
}

#[derive(Default)]
struct State {
    frames: Mutex<Vec<ReceivedFrame>>,
    connections: AtomicUsize,
    replies: AtomicUsize,
    /// Connections to drop right after reading their first frame.
    drop_first: AtomicUsize,
}

pub struct DeviceSimulator {
    port: u16,
    state: Arc<State>,
    task: JoinHandle<()>,
}

impl DeviceSimulator {
    pub async fn start() -> Result<Self> {
        Self::start_flaky(0).await
    }

    /// The first `drop_first` connections are closed after their first
    /// frame without a reply.
    pub async fn start_flaky(drop_first: usize) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let state = Arc::new(State {
            drop_first: AtomicUsize::new(drop_first),
            ..Default::default()
        });

        let accept_state = state.clone();
        let task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let connection = accept_state.connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(stream, connection, accept_state.clone()));
            }
        });

        Ok(Self { port, state, task })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn frames(&self) -> Vec<ReceivedFrame> {
        self.state.frames.lock().unwrap().clone()
    }

    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` frames have arrived.
    pub async fn wait_for_frames(&self, count: usize) -> Result<()> {
        for _ in 0..200 {
            if self.state.frames.lock().unwrap().len() >= count {
                return Ok(());
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        anyhow::bail!("simulator saw {} frames, expected {count}", self.frames().len())
    }
}

impl Drop for DeviceSimulator {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(mut stream: TcpStream, connection: usize, state: Arc<State>) {
    let drop_after_first = state
        .drop_first
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();

    loop {
        let mut tag = [0u8; 1];
        if stream.read_exact(&mut tag).await.is_err() {
            return;
        }
        let Some(kind) = CommandKind::from_tag(tag[0]) else {
            return;
        };

        let mut raw = vec![0u8; kind.arity() * 4];
        if stream.read_exact(&mut raw).await.is_err() {
            return;
        }
        let payload: Vec<f32> = raw
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        state.frames.lock().unwrap().push(ReceivedFrame {
            connection,
            kind,
            payload: payload.clone(),
        });

        if kind == CommandKind::ConnectionEnd || drop_after_first {
            return;
        }

        let count = state.replies.fetch_add(1, Ordering::SeqCst) + 1;
        let record = MeasurementRecord {
            duration: count as f32,
            control_left: payload.first().copied().unwrap_or_default(),
            control_right: payload.get(1).copied().unwrap_or_default(),
            ..Default::default()
        };
        if stream.write_all(&encode_measurement(&record)).await.is_err() {
            return;
        }
    }
}
