use std::sync::{Arc, Mutex};

use duplex_proto::HandlerChain;
use duplex_sync::BufferPool;
use tracing::info;

use crate::desktop_streaming::{DesktopStreamingService, FrameCapture, FrameEncoder};
use crate::file_transfer::FileTransferService;
use crate::outbound::ClientHandle;

/// Names a client may request via a `service <name>` message. Grounded on
/// `server.cpp`'s `ServiceFactory::createService`.
enum ServiceKind {
    FileTransfer,
    DesktopStreaming,
}

impl ServiceKind {
    /// Matched case-insensitively: the wire protocol's examples spell
    /// these `FileTransfer`/`DesktopStreaming`, the original source's
    /// factory keys on the lowercase, underscored form. Both are accepted
    /// rather than picking one and silently rejecting the other.
    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "file_transfer" | "filetransfer" => Some(Self::FileTransfer),
            "desktop_streaming" | "desktopstreaming" => Some(Self::DesktopStreaming),
            _ => None,
        }
    }
}

/// Shared construction parameters every service needs, handed to
/// [`ServiceRegistry::activate`] rather than threaded through individual
/// fields.
pub struct ServiceDeps {
    pub handle: ClientHandle,
    pub pool: BufferPool,
    pub chunk_size: usize,
    pub yuv_ring_capacity: usize,
    pub make_capture: Arc<dyn Fn() -> Box<dyn FrameCapture> + Send + Sync>,
    pub make_encoder: Arc<dyn Fn(&str) -> Box<dyn FrameEncoder> + Send + Sync>,
}

/// The services activated on one client's session, and the top-level
/// `service <name>` dispatch that instantiates them.
///
/// Message dispatch to an activated service is a small fixed ascending-id
/// try-in-order, not [`HandlerChain`]: a service's `handle_msg` borrows a
/// freshly read `&str` each call, and `HandlerChain<A>` requires `A: Copy`
/// with a single lifetime fixed at construction, which a line read fresh
/// off the wire each iteration can't satisfy. `HandlerChain` is used
/// instead for [`Self::err_chain`], where the dispatched value is the
/// `Copy`, lifetime-free [`duplex_net::ConnState`] — that chain reproduces
/// the original's `errHandlers` cleanup-on-disconnect behaviour exactly.
#[derive(Default)]
pub struct ServiceRegistry {
    file_transfer: Option<Arc<Mutex<FileTransferService>>>,
    desktop_streaming: Option<Arc<Mutex<DesktopStreamingService>>>,
    err_chain: HandlerChain<duplex_net::ConnState>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles a top-level `service <name>` request, instantiating the
    /// named service the first time it's requested and registering its
    /// disconnect cleanup. Returns the acknowledgement line to send back.
    pub fn activate(&mut self, name: &str, deps: &ServiceDeps) -> String {
        match ServiceKind::parse(name) {
            Some(ServiceKind::FileTransfer) => {
                if self.file_transfer.is_none() {
                    info!("activating file_transfer service");
                    let service = Arc::new(Mutex::new(FileTransferService::new(
                        deps.handle.clone(),
                        deps.pool.clone(),
                        deps.chunk_size,
                    )));
                    let cleanup = Arc::clone(&service);
                    self.err_chain.register(FileTransferService::HANDLER_ID, move |state| {
                        if state == duplex_net::ConnState::Disconnected {
                            cleanup.lock().unwrap().handle_msg("stop");
                        }
                        false
                    });
                    self.file_transfer = Some(service);
                }
                format!("Request service {name} success.\n")
            }
            Some(ServiceKind::DesktopStreaming) => {
                if self.desktop_streaming.is_none() {
                    info!("activating desktop_streaming service");
                    let service = Arc::new(Mutex::new(DesktopStreamingService::new(
                        deps.handle.clone(),
                        deps.yuv_ring_capacity,
                        Arc::clone(&deps.make_capture),
                        Arc::clone(&deps.make_encoder),
                    )));
                    let cleanup = Arc::clone(&service);
                    self.err_chain.register(DesktopStreamingService::HANDLER_ID, move |state| {
                        if state == duplex_net::ConnState::Disconnected {
                            cleanup.lock().unwrap().terminate();
                        }
                        false
                    });
                    self.desktop_streaming = Some(service);
                }
                format!("Request service {name} success.\n")
            }
            None => "Invalid service request!\n".to_string(),
        }
    }

    /// Tries every active service in ascending handler-id order,
    /// short-circuiting on the first one that claims `msg`.
    pub fn dispatch(&self, msg: &str) -> bool {
        if let Some(service) = &self.file_transfer {
            if service.lock().unwrap().handle_msg(msg) {
                return true;
            }
        }
        if let Some(service) = &self.desktop_streaming {
            if service.lock().unwrap().handle_msg(msg) {
                return true;
            }
        }
        false
    }

    /// Runs every registered disconnect handler, stopping each active
    /// service's worker and background threads.
    pub fn on_disconnect(&mut self) {
        self.err_chain.dispatch(duplex_net::ConnState::Disconnected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopCapture;
    impl FrameCapture for NoopCapture {
        fn capture_frame(&mut self) -> Option<Vec<u8>> {
            None
        }
    }

    struct NoopEncoder;
    impl FrameEncoder for NoopEncoder {
        fn encode(&mut self, _seq_no: u32, _yuv: Vec<u8>) -> Vec<Vec<u8>> {
            Vec::new()
        }
    }

    fn test_deps() -> (ServiceDeps, std::sync::mpsc::Receiver<crate::outbound::Outbound>) {
        let (tx, rx) = std::sync::mpsc::channel();
        let waker = Arc::new(mio::Waker::new(&mio::Poll::new().unwrap().registry(), mio::Token(0)).unwrap());
        let deps = ServiceDeps {
            handle: ClientHandle::new(tx, waker),
            pool: BufferPool::new(1024, 4),
            chunk_size: 1024,
            yuv_ring_capacity: 2,
            make_capture: Arc::new(|| Box::new(NoopCapture) as Box<dyn FrameCapture>),
            make_encoder: Arc::new(|_cmd: &str| Box::new(NoopEncoder) as Box<dyn FrameEncoder>),
        };
        (deps, rx)
    }

    #[test]
    fn unknown_service_name_is_rejected() {
        let mut registry = ServiceRegistry::new();
        let (deps, _rx) = test_deps();
        assert_eq!(registry.activate("not_a_service", &deps), "Invalid service request!\n");
    }

    #[test]
    fn activating_file_transfer_lets_it_claim_messages() {
        let mut registry = ServiceRegistry::new();
        let (deps, _rx) = test_deps();
        assert_eq!(registry.activate("file_transfer", &deps), "Request service file_transfer success.\n");
        assert!(registry.dispatch("get /etc/hostname"));
        assert!(!registry.dispatch("not a recognized command"));
    }

    #[test]
    fn disconnect_runs_cleanup_for_every_activated_service() {
        let mut registry = ServiceRegistry::new();
        let (deps, _rx) = test_deps();
        registry.activate("file_transfer", &deps);
        registry.activate("desktop_streaming", &deps);
        registry.on_disconnect();
    }
}
