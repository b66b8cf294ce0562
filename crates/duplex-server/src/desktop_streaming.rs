use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use duplex_proto::{gen_timestamp_ms, FrameHeader, YuvHeader};
use duplex_sync::FrameRing;
use tracing::{debug, info, warn};

use crate::outbound::ClientHandle;
use crate::service::{JobControl, JobItem, ServiceWorker};

/// Pulls one captured frame at a time from whatever desktop-capture backend
/// is plugged in. Implementations live outside this crate; the original's
/// equivalent seam is `CaptureOneFrame`.
pub trait FrameCapture: Send {
    /// Returns `None` once the capture source is exhausted or stopped.
    fn capture_frame(&mut self) -> Option<Vec<u8>>;
}

/// Encodes one captured YUV frame into zero or more wire-ready payloads.
/// Implementations live outside this crate; the original's equivalent seam
/// is the x265 encoder callback driven by `DoStartEncoder`.
pub trait FrameEncoder: Send {
    fn encode(&mut self, seq_no: u32, yuv: Vec<u8>) -> Vec<Vec<u8>>;
}

type CaptureFactory = Arc<dyn Fn() -> Box<dyn FrameCapture> + Send + Sync>;
/// Builds an encoder configured from the `x265 ...` command line the client
/// sent (resolution, colorspace, fps, preset, and so on).
type EncoderFactory = Arc<dyn Fn(&str) -> Box<dyn FrameEncoder> + Send + Sync>;

/// Drives desktop capture, encoding, and streaming of encoded frames back to
/// the connected client over the data channel.
///
/// Grounded on `desktop_streaming_service.hpp`: `StartStreaming` spins up the
/// encode thread, `StartCapture`/`StopCapture` gate the capture thread and
/// the FPS counter, `EndStreaming` tears both down, and `handle_msg`
/// reproduces the original's command dispatch table one-to-one.
pub struct DesktopStreamingService {
    worker: ServiceWorker,
    handle: ClientHandle,
    yuv_buf: FrameRing,
    make_capture: CaptureFactory,
    make_encoder: EncoderFactory,

    capture_running: Arc<AtomicBool>,
    capture_thread: Option<JoinHandle<()>>,
    encode_thread: Option<JoinHandle<()>>,

    fps_running: Arc<AtomicBool>,
    fps_count: Arc<AtomicU32>,
    fps_thread: Option<JoinHandle<()>>,

    /// Seeds the capture-side (`yuvSeqNo`) counter handed to `start_capture`
    /// and the fixed-count digit job; continues across pause/resume within
    /// one streaming session.
    next_seq_no: u32,
    /// The outgoing wire frame counter `SendEncodedFrame` numbers each
    /// encoded payload with. Independent of `next_seq_no`: one capture
    /// frame can yield multiple encoded payloads, each needing its own
    /// wire sequence number. Reset to 0 whenever streaming (re)starts.
    next_wire_seq: u32,
}

impl DesktopStreamingService {
    pub const HANDLER_ID: i32 = 2;

    pub fn new(
        handle: ClientHandle,
        yuv_ring_capacity: usize,
        make_capture: CaptureFactory,
        make_encoder: EncoderFactory,
    ) -> Self {
        Self {
            worker: ServiceWorker::start("desktop-streaming"),
            handle,
            yuv_buf: FrameRing::new(yuv_ring_capacity),
            make_capture,
            make_encoder,
            capture_running: Arc::new(AtomicBool::new(false)),
            capture_thread: None,
            encode_thread: None,
            fps_running: Arc::new(AtomicBool::new(false)),
            fps_count: Arc::new(AtomicU32::new(0)),
            fps_thread: None,
            next_seq_no: 0,
            next_wire_seq: 0,
        }
    }

    fn is_capturing(&self) -> bool {
        self.capture_thread.is_some()
    }

    /// Spins up the encode thread: pop YUV frames off the ring, encode them,
    /// wrap each resulting payload in a wire header, and hand it to the
    /// client handle. Stops when it sees the ring's shutdown sentinel.
    ///
    /// If an encode thread is already running, it is torn down first via
    /// `end_streaming` (which also stops capture), and both the
    /// capture-side and wire-side sequence counters are reset to 0 before
    /// the new encoder is spawned with `cmd`, matching a fresh `x265 ...`
    /// command starting a brand new streaming session.
    fn start_streaming(&mut self, cmd: &str) {
        if self.encode_thread.is_some() {
            self.end_streaming();
        }

        self.next_seq_no = 0;
        self.next_wire_seq = 0;

        let yuv_buf = self.yuv_buf.clone();
        let handle = self.handle.clone();
        let mut encoder = (self.make_encoder)(cmd);
        let fps_count = Arc::clone(&self.fps_count);
        let mut wire_seq = self.next_wire_seq;

        self.encode_thread = Some(
            std::thread::Builder::new()
                .name("desktop-encode".into())
                .spawn(move || {
                    duplex_utils::thread_boot(None, duplex_utils::ThreadPriority::High);
                    loop {
                    let raw = yuv_buf.pop();
                    if FrameRing::is_sentinel(&raw) {
                        break;
                    }
                    let header = match YuvHeader::decode(&raw) {
                        Ok(header) => header,
                        Err(err) => {
                            warn!(?err, "dropping malformed captured frame");
                            continue;
                        }
                    };
                    let payload = &raw[duplex_proto::YUV_HEADER_LEN..];

                    for encoded in encoder.encode(header.seq_no, payload.to_vec()) {
                        let mut framed = Vec::new();
                        FrameHeader::encode_into(wire_seq, gen_timestamp_ms(), &encoded, &mut framed);
                        framed.extend_from_slice(&encoded);
                        handle.send_data(framed);
                        fps_count.fetch_add(1, Ordering::Relaxed);
                        wire_seq = wire_seq.wrapping_add(1);
                    }
                    }
                })
                .expect("failed to spawn encode thread"),
        );
    }

    /// Stops any capture already running, then starts a fresh capture thread
    /// and the 1-second FPS counter alongside it.
    fn start_capture(&mut self) {
        self.stop_capture();

        self.capture_running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.capture_running);
        let yuv_buf = self.yuv_buf.clone();
        let mut capture = (self.make_capture)();
        let mut seq_no = self.next_seq_no;

        self.capture_thread = Some(
            std::thread::Builder::new()
                .name("desktop-capture".into())
                .spawn(move || {
                    duplex_utils::thread_boot(None, duplex_utils::ThreadPriority::High);
                    while running.load(Ordering::SeqCst) {
                        let Some(frame) = capture.capture_frame() else { break };
                        let header = YuvHeader { seq_no, timestamp: gen_timestamp_ms() };
                        let mut buf = Vec::with_capacity(duplex_proto::YUV_HEADER_LEN + frame.len());
                        header.encode_into(&mut buf);
                        buf.extend_from_slice(&frame);
                        yuv_buf.push(buf);
                        seq_no = seq_no.wrapping_add(1);
                    }
                })
                .expect("failed to spawn capture thread"),
        );

        self.start_fps_counter();
    }

    fn start_fps_counter(&mut self) {
        self.fps_count.store(0, Ordering::SeqCst);
        self.fps_running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.fps_running);
        let count = Arc::clone(&self.fps_count);

        self.fps_thread = Some(
            std::thread::Builder::new()
                .name("desktop-fps".into())
                .spawn(move || {
                    while running.load(Ordering::SeqCst) {
                        std::thread::sleep(Duration::from_secs(1));
                        if !running.load(Ordering::SeqCst) {
                            break;
                        }
                        let fps = count.swap(0, Ordering::SeqCst);
                        debug!(fps, "desktop streaming frame rate");
                    }
                })
                .expect("failed to spawn fps counter thread"),
        );
    }

    fn stop_capture(&mut self) {
        self.capture_running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.capture_thread.take() {
            let _ = thread.join();
        }
        self.fps_running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.fps_thread.take() {
            let _ = thread.join();
        }
    }

    fn end_streaming(&mut self) {
        self.stop_capture();
        if self.encode_thread.is_some() {
            self.yuv_buf.push_shutdown();
            if let Some(thread) = self.encode_thread.take() {
                let _ = thread.join();
            }
        }
    }

    pub fn terminate(&mut self) {
        self.end_streaming();
        self.worker.terminate();
    }

    /// Returns `true` if this service claimed the message.
    pub fn handle_msg(&mut self, msg: &str) -> bool {
        let msg = msg.trim();

        if msg.starts_with("x265") {
            self.start_streaming(msg);
            self.handle.send_msg("Streaming started.\n");
            return true;
        }

        match msg {
            "pause" => {
                self.stop_capture();
                self.handle.send_msg("Capture paused.\n");
                true
            }
            "quit" => {
                self.terminate();
                self.handle.send_msg("Streaming terminated.\n");
                true
            }
            "start" => {
                if self.is_capturing() {
                    self.handle.send_msg("Capture already running.\n");
                } else {
                    self.start_capture();
                    self.handle.send_msg("Capture going on.\n");
                }
                true
            }
            _ if msg.chars().all(|c| c.is_ascii_digit()) && !msg.is_empty() => {
                if self.is_capturing() {
                    self.handle.send_msg("Capture running! you have to pause first.\n");
                    return true;
                }
                let count: u32 = msg.parse().unwrap_or(0);
                let make_capture = Arc::clone(&self.make_capture);
                let yuv_buf = self.yuv_buf.clone();
                let mut seq_no = self.next_seq_no;
                self.next_seq_no = self.next_seq_no.wrapping_add(count);
                self.worker.submit(JobItem::new(msg, move |_, control: &JobControl| {
                    let mut capture = (make_capture)();
                    for _ in 0..count {
                        if control.is_cancelled() {
                            break;
                        }
                        let Some(frame) = capture.capture_frame() else { break };
                        let header = YuvHeader { seq_no, timestamp: gen_timestamp_ms() };
                        let mut buf = Vec::with_capacity(duplex_proto::YUV_HEADER_LEN + frame.len());
                        header.encode_into(&mut buf);
                        buf.extend_from_slice(&frame);
                        yuv_buf.push(buf);
                        seq_no = seq_no.wrapping_add(1);
                    }
                    info!(count, "finished fixed-count capture job");
                }));
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use super::*;

    struct CountingCapture {
        remaining: u32,
    }

    impl FrameCapture for CountingCapture {
        fn capture_frame(&mut self) -> Option<Vec<u8>> {
            if self.remaining == 0 {
                return None;
            }
            self.remaining -= 1;
            Some(vec![0xAB; 4])
        }
    }

    struct PassthroughEncoder;

    impl FrameEncoder for PassthroughEncoder {
        fn encode(&mut self, _seq_no: u32, yuv: Vec<u8>) -> Vec<Vec<u8>> {
            vec![yuv]
        }
    }

    fn test_handle() -> (ClientHandle, mpsc::Receiver<crate::outbound::Outbound>) {
        let (tx, rx) = mpsc::channel();
        let waker = Arc::new(mio::Waker::new(&mio::Poll::new().unwrap().registry(), mio::Token(0)).unwrap());
        (ClientHandle::new(tx, waker), rx)
    }

    #[test]
    fn start_then_pause_produces_encoded_frames_on_the_handle() {
        let (handle, rx) = test_handle();
        let mut service = DesktopStreamingService::new(
            handle,
            2,
            Arc::new(|| Box::new(CountingCapture { remaining: 1_000_000 }) as Box<dyn FrameCapture>),
            Arc::new(|_cmd: &str| Box::new(PassthroughEncoder) as Box<dyn FrameEncoder>),
        );

        assert!(service.handle_msg("x265 start"));
        assert!(service.handle_msg("start"));

        std::thread::sleep(Duration::from_millis(50));
        assert!(service.handle_msg("pause"));

        let mut saw_data = false;
        while let Ok(out) = rx.try_recv() {
            if matches!(out, crate::outbound::Outbound::Data(_)) {
                saw_data = true;
            }
        }
        assert!(saw_data);

        service.terminate();
    }

    #[test]
    fn digit_command_submits_a_fixed_count_capture_job() {
        let (handle, rx) = test_handle();
        let mut service = DesktopStreamingService::new(
            handle,
            2,
            Arc::new(|| Box::new(CountingCapture { remaining: 1_000_000 }) as Box<dyn FrameCapture>),
            Arc::new(|_cmd: &str| Box::new(PassthroughEncoder) as Box<dyn FrameEncoder>),
        );

        assert!(service.handle_msg("x265"));
        assert!(service.handle_msg("3"));

        std::thread::sleep(Duration::from_millis(50));
        service.terminate();

        let mut data_count = 0;
        while let Ok(out) = rx.try_recv() {
            if matches!(out, crate::outbound::Outbound::Data(_)) {
                data_count += 1;
            }
        }
        assert!(data_count > 0);
    }

    #[test]
    fn unrecognized_message_is_not_claimed() {
        let (handle, _rx) = test_handle();
        let mut service = DesktopStreamingService::new(
            handle,
            2,
            Arc::new(|| Box::new(CountingCapture { remaining: 0 }) as Box<dyn FrameCapture>),
            Arc::new(|_cmd: &str| Box::new(PassthroughEncoder) as Box<dyn FrameEncoder>),
        );
        assert!(!service.handle_msg("get something"));
        service.terminate();
    }
}
