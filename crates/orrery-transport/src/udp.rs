//! UDP stand-in for the sensor radio
//!
//! One socket per node, point-to-point to the peer's port. Sending is
//! synchronous; receiving runs on a dedicated thread that stamps each frame
//! with the local raw timestamp at arrival and pushes it onto a channel the
//! runtime drains.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use orrery_core::{OrreryError, OrreryResult, Time};
use orrery_stack::{LinkConfiguration, LinkStatistics, LinkTransport};
use tokio::sync::mpsc;
use tracing::{trace, warn};

/// Signal strength reported for every frame; UDP has no RSSI, so all
/// neighbors appear equally strong
pub const NOMINAL_RSSI: i8 = -40;

const READ_TIMEOUT: Duration = Duration::from_millis(200);

/// A received frame and the raw timestamp captured at arrival
pub type ReceivedFrame = (Vec<u8>, Time);

pub struct UdpNic {
    socket: UdpSocket,
    epoch: Instant,
    running: AtomicBool,
}

impl UdpNic {
    /// Bind `local` and connect to the peer at `remote`; frames arriving on
    /// the socket appear on the returned channel
    pub fn bind(
        local: SocketAddr,
        remote: SocketAddr,
    ) -> OrreryResult<(Arc<UdpNic>, mpsc::UnboundedReceiver<ReceivedFrame>)> {
        let socket = UdpSocket::bind(local).map_err(|e| OrreryError::Transport(e.to_string()))?;
        UdpNic::from_std(socket, remote)
    }

    /// Wrap an already bound socket
    pub fn from_std(
        socket: UdpSocket,
        remote: SocketAddr,
    ) -> OrreryResult<(Arc<UdpNic>, mpsc::UnboundedReceiver<ReceivedFrame>)> {
        socket
            .connect(remote)
            .map_err(|e| OrreryError::Transport(e.to_string()))?;
        socket
            .set_read_timeout(Some(READ_TIMEOUT))
            .map_err(|e| OrreryError::Transport(e.to_string()))?;
        let receiver = socket
            .try_clone()
            .map_err(|e| OrreryError::Transport(e.to_string()))?;

        let nic = Arc::new(UdpNic {
            socket,
            epoch: Instant::now(),
            running: AtomicBool::new(true),
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let worker = nic.clone();
        std::thread::spawn(move || worker.receive_loop(receiver, tx));

        Ok((nic, rx))
    }

    /// Raw local timestamp, microseconds since the NIC came up
    fn timestamp(&self) -> Time {
        Time::from_micros(self.epoch.elapsed().as_micros() as i64)
    }

    /// Stop the receive thread; in flight frames are dropped
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn receive_loop(&self, socket: UdpSocket, tx: mpsc::UnboundedSender<ReceivedFrame>) {
        let mut frame = [0u8; orrery_wire::MTU];
        while self.running.load(Ordering::SeqCst) {
            match socket.recv(&mut frame) {
                Ok(n) => {
                    let stamped = self.timestamp();
                    trace!(len = n, ts = stamped.as_micros(), "frame received");
                    if tx.send((frame[..n].to_vec(), stamped)).is_err() {
                        break;
                    }
                }
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "receive failed, link down");
                    break;
                }
            }
        }
    }
}

impl LinkTransport for UdpNic {
    fn send(&self, frame: &[u8]) -> OrreryResult<()> {
        self.socket
            .send(frame)
            .map_err(|e| OrreryError::Transport(e.to_string()))?;
        Ok(())
    }

    fn configuration(&self) -> LinkConfiguration {
        LinkConfiguration {
            timer_accuracy_ppm: 1_000,
            timer_frequency_hz: 1_000_000,
        }
    }

    fn statistics(&self) -> LinkStatistics {
        LinkStatistics {
            time_stamp: self.timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (
        (Arc<UdpNic>, mpsc::UnboundedReceiver<ReceivedFrame>),
        (Arc<UdpNic>, mpsc::UnboundedReceiver<ReceivedFrame>),
    ) {
        let a = UdpSocket::bind("127.0.0.1:0").unwrap();
        let b = UdpSocket::bind("127.0.0.1:0").unwrap();
        let a_addr = a.local_addr().unwrap();
        let b_addr = b.local_addr().unwrap();
        (
            UdpNic::from_std(a, b_addr).unwrap(),
            UdpNic::from_std(b, a_addr).unwrap(),
        )
    }

    #[tokio::test]
    async fn frames_arrive_with_a_monotonic_timestamp() {
        let ((a, _a_rx), (b, mut b_rx)) = pair();

        a.send(&[1, 2, 3]).unwrap();
        let (frame, t1) = b_rx.recv().await.unwrap();
        assert_eq!(frame, vec![1, 2, 3]);

        a.send(&[4, 5]).unwrap();
        let (frame, t2) = b_rx.recv().await.unwrap();
        assert_eq!(frame, vec![4, 5]);
        assert!(t2 >= t1);

        a.shutdown();
        b.shutdown();
    }

    #[test]
    fn statistics_report_the_raw_clock() {
        let ((a, _rx), (b, _rx2)) = pair();
        let t1 = a.statistics().time_stamp;
        std::thread::sleep(Duration::from_millis(2));
        let t2 = a.statistics().time_stamp;
        assert!(t2 > t1);
        a.shutdown();
        b.shutdown();
    }
}
