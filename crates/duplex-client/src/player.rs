use std::thread::JoinHandle;

use duplex_sync::BoundedQueue;
use tracing::debug;

/// Pulls decoded/encoded-frame payloads off the frame FIFO and hands them
/// to whatever decoder/display backend is plugged in. Implementations live
/// outside this crate; the original's equivalent seam is the decoder's
/// "read packet" port (`read_packet(buf, cap) -> n`).
pub trait FramePlayer: Send {
    fn play_packet(&mut self, payload: &[u8]);
}

/// Runs `player` on its own thread, pulling frame payloads off `fifo` until
/// an empty payload (the shutdown sentinel, same convention as the
/// server's `FrameRing`) is popped.
///
/// Grounded on the player thread in `desktop_streaming_request.hpp`: it
/// blocks on the frame FIFO, hands each payload to the decoder, and keeps
/// going until told to stop.
pub fn spawn_player(fifo: BoundedQueue<Vec<u8>>, mut player: Box<dyn FramePlayer>) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("player".into())
        .spawn(move || {
            duplex_utils::thread_boot(None, duplex_utils::ThreadPriority::High);
            loop {
                let payload = fifo.pop();
                if payload.is_empty() {
                    debug!("player thread saw shutdown sentinel");
                    break;
                }
                player.play_packet(&payload);
            }
        })
        .expect("failed to spawn player thread")
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use super::*;

    struct RecordingPlayer {
        tx: mpsc::Sender<Vec<u8>>,
    }

    impl FramePlayer for RecordingPlayer {
        fn play_packet(&mut self, payload: &[u8]) {
            let _ = self.tx.send(payload.to_vec());
        }
    }

    #[test]
    fn plays_packets_until_the_shutdown_sentinel() {
        let fifo = BoundedQueue::new(4);
        let (tx, rx) = mpsc::channel();
        let handle = spawn_player(fifo.clone(), Box::new(RecordingPlayer { tx }));

        fifo.push(vec![1, 2, 3]);
        fifo.push(vec![4, 5]);
        fifo.push(Vec::new());

        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), vec![1, 2, 3]);
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), vec![4, 5]);
        handle.join().unwrap();
    }
}
