mod pool;
mod queue;
mod ring;

pub use pool::BufferPool;
pub use queue::BoundedQueue;
pub use ring::FrameRing;
