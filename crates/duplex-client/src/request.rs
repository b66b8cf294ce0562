/// Client-side counterpart of `duplex_server::service::ServiceWorker`: a
/// long-lived handler attached to the session, driven entirely by network
/// callbacks rather than a worker thread of its own.
///
/// Grounded on `Request` (`client_request.hpp`): construction is
/// registration (the concrete type starts listening for the messages and
/// data it cares about), drop is deregistration. Since this client only
/// ever runs one request at a time, `ClientSession` holds it as a single
/// `Option<Box<dyn Request>>` rather than a registry keyed by handler id —
/// there is no second request to out-prioritize it.
pub trait Request: Send {
    /// Returns `true` if this request claimed the message.
    fn handle_msg(&mut self, msg: &str) -> bool;

    /// Called once when the owning session's connection is torn down.
    fn handle_disconnect(&mut self) {}
}
