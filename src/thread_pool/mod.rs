//! Thread pools that carry out the requests of the sessions.
//!
//! Every framed request is handed to a [`ThreadPool`] as a job that ends with its response,
//! so a pool of `n` threads runs at most `n` store operations at once and queues the others.
//! Reading a connection happens on its session thread, outside the pool, so an idle client
//! never holds a pool thread. [`NaiveThreadPool`] starts a thread per job and never queues.
use crate::Result;

/// The interface every thread pool implements
pub trait ThreadPool {
    /// creates a new thread pool, immediately spawning the specified number of `threads`
    ///
    /// # Errors
    /// returns an error if any thread fails to spawn. All previously-spawned threads are
    /// terminated.
    fn new(threads: u32) -> Result<Self>
    where
        Self: Sized;

    /// spawns a function into the thread pool.
    ///
    /// Spawning always succeeds, but if the function panics the thread pool continues to
    /// operate with the same number of threads; the thread count is not reduced nor is the
    /// thread pool destroyed, corrupted or invalidated.
    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static;
}

mod naive;
mod rayon_pool;
mod shared_queue;

pub use self::naive::NaiveThreadPool;
pub use self::rayon_pool::RayonThreadPool;
pub use self::shared_queue::SharedQueueThreadPool;
