//! Shared buffers and teardown synchronization.
//!
//! A [`SharedBuffer`] is a reference-counted holder of a [`Buffer`]: host
//! code keeps one, and every task that uses the buffer keeps another. The
//! buffer is torn down, running its write-back, when the last holder drops.
//!
//! A holder that wants to be sure the write-back has happened before it
//! moves on (typically the host code that created the buffer) releases its
//! handle through [`SharedBuffer::release`], which:
//!
//! 1. asks for a [`CompletionSignal`] with
//!    [`SharedBuffer::request_completion_signal`];
//! 2. drops its own handle;
//! 3. waits on the signal, if it got one.
//!
//! # Holder-count rule
//!
//! A signal is only handed out when at least one *other* holder exists.
//! When the caller is the last holder, dropping its handle is what tears the
//! buffer down, so the release completes synchronously; waiting first would
//! mean waiting for itself.
//!
//! The rule is advisory. It relies on the scheduler finishing every task
//! that uses the buffer before that task drops its holder; the count only
//! tells how many holders exist, not what they are doing.

use crate::buffer::{Buffer, BufferId};
use crate::config::BufferConfig;
use crate::memory::Element;
use crate::memory::defaults::MIN_HOLDERS_FOR_SIGNAL;
use crate::observability;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Completion state shared between a notifier and its signals.
#[derive(Default)]
struct Completion {
    done: Mutex<bool>,
    cond: Condvar,
}

impl Completion {
    fn complete(&self) {
        let mut done = self.done.lock().unwrap_or_else(PoisonError::into_inner);
        *done = true;
        self.cond.notify_all();
    }
}

/// Resolves its signals when dropped.
struct CompletionNotifier {
    completion: Arc<Completion>,
}

impl CompletionNotifier {
    fn new() -> Self {
        Self {
            completion: Arc::new(Completion::default()),
        }
    }

    fn signal(&self) -> CompletionSignal {
        CompletionSignal {
            completion: Arc::clone(&self.completion),
        }
    }
}

impl Drop for CompletionNotifier {
    fn drop(&mut self) {
        self.completion.complete();
    }
}

/// Resolves once a buffer has been torn down and its write-back has run.
#[derive(Clone)]
pub struct CompletionSignal {
    completion: Arc<Completion>,
}

impl CompletionSignal {
    /// Block until the buffer has been torn down.
    pub fn wait(&self) {
        let done = self
            .completion
            .done
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let _done = self
            .completion
            .cond
            .wait_while(done, |done| !*done)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Block until the buffer has been torn down or `timeout` elapses.
    ///
    /// Returns `true` if the teardown completed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let done = self
            .completion
            .done
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (done, _) = self
            .completion
            .cond
            .wait_timeout_while(done, timeout, |done| !*done)
            .unwrap_or_else(PoisonError::into_inner);
        *done
    }

    /// Has the buffer been torn down?
    pub fn is_complete(&self) -> bool {
        *self
            .completion
            .done
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for CompletionSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionSignal")
            .field("complete", &self.is_complete())
            .finish()
    }
}

pub(crate) struct BufferCell<T: Element, const D: usize> {
    pub(crate) id: BufferId,
    pub(crate) byte_size: usize,
    // Mirrors `Buffer::has_pending_write_back`, refreshed whenever a
    // `SharedBufferGuard` drops.
    pending: AtomicBool,
    // Fields drop in declaration order: the buffer (and its write-back)
    // goes first, then the notifier wakes the waiters.
    buffer: Mutex<Buffer<'static, T, D>>,
    completion: Mutex<Option<CompletionNotifier>>,
}

/// A reference-counted holder of a buffer.
///
/// Cloning adds a holder. The buffer is torn down when the last holder
/// drops.
///
/// Access to the buffer goes through [`SharedBuffer::lock`]. The lock gives
/// one holder at a time exclusive use of the buffer's state; it does not
/// order the holders. Making sure a task that reads the buffer runs after
/// the task that writes it is the scheduler's obligation.
///
/// [`SharedBuffer::release`] only waits when the buffer already has a
/// pending write-back at the time of the call: it must have been modified
/// (by a write-capable access, a task registration with a write-capable
/// mode, or [`Buffer::mark_written`]) and the guard that modified it must
/// have been dropped. A write a task makes later is still written back when
/// the task drops its holder, but the release does not wait for it.
///
/// # Example
///
/// ```rust
/// use hetbuf::{Buffer, FinalData, Shape, SharedBuffer, WriteMode, memory::HostBlock};
/// use std::sync::Arc;
///
/// let dest = Arc::new(HostBlock::from_vec(vec![0u32; 4]));
/// let mut buffer = Buffer::from_shape(Shape::new([4]).unwrap()).unwrap();
/// buffer.set_final_data(FinalData::Strong(Arc::clone(&dest))).unwrap();
/// // The task below will write, so the release has something to wait for.
/// buffer.mark_written();
///
/// let shared = SharedBuffer::new(buffer);
/// let task_holder = shared.clone();
/// std::thread::spawn(move || {
///     let mut buffer = task_holder.lock();
///     buffer.host_write(WriteMode::Write).unwrap().fill(3);
/// });
///
/// // Blocks until the task's holder is gone and the write-back ran.
/// shared.release();
/// assert_eq!(Arc::try_unwrap(dest).ok().unwrap().into_vec(), vec![3; 4]);
/// ```
pub struct SharedBuffer<T: Element, const D: usize = 1> {
    cell: Arc<BufferCell<T, D>>,
}

impl<T: Element, const D: usize> SharedBuffer<T, D> {
    /// Wrap `buffer` in a new holder.
    pub fn new(buffer: Buffer<'static, T, D>) -> Self {
        Self {
            cell: Arc::new(BufferCell {
                id: buffer.id(),
                byte_size: buffer.byte_size(),
                pending: AtomicBool::new(buffer.has_pending_write_back()),
                buffer: Mutex::new(buffer),
                completion: Mutex::new(None),
            }),
        }
    }

    /// The buffer's identifier.
    pub fn id(&self) -> BufferId {
        self.cell.id
    }

    /// Number of live holders, this one included.
    pub fn holder_count(&self) -> usize {
        Arc::strong_count(&self.cell)
    }

    /// Lock the buffer for exclusive use.
    ///
    /// Blocks while another holder has it locked. A holder that panicked
    /// while holding the lock does not poison the buffer for the others.
    pub fn lock(&self) -> SharedBufferGuard<'_, T, D> {
        let guard = self
            .cell
            .buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        SharedBufferGuard {
            guard,
            pending: &self.cell.pending,
        }
    }

    /// Ask for a signal that resolves when the buffer's teardown is done.
    ///
    /// Returns `None`, meaning there is nothing to wait for, when:
    ///
    /// - this is the only holder, whatever the buffer's state: dropping it
    ///   runs the teardown synchronously;
    /// - the buffer was never modified;
    /// - the buffer has no write-back sink and owns its storage, so its
    ///   teardown publishes nothing.
    ///
    /// Never takes the buffer lock, so it does not block behind a holder
    /// that has the buffer locked, and it may be called while this thread
    /// holds a [`SharedBufferGuard`]. The buffer state it sees is the one
    /// left by the most recently dropped guard.
    pub fn request_completion_signal(&self) -> Option<CompletionSignal> {
        let holders = self.holder_count();
        if holders < MIN_HOLDERS_FOR_SIGNAL {
            tracing::trace!(buffer = %self.id(), holders, "sole holder, nothing to wait for");
            return None;
        }
        if !self.cell.pending.load(Ordering::Acquire) {
            return None;
        }

        let mut completion = self
            .cell
            .completion
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let signal = completion.get_or_insert_with(CompletionNotifier::new).signal();
        tracing::debug!(buffer = %self.id(), holders, "completion signal issued");
        Some(signal)
    }

    /// Drop this holder and wait for the buffer's pending write-back, if
    /// another holder will run it.
    pub fn release(self) {
        self.release_inner(None);
    }

    /// Like [`SharedBuffer::release`], giving up after `timeout`.
    ///
    /// Returns `true` if the buffer's teardown is known to have completed
    /// or nothing needed waiting for.
    pub fn release_timeout(self, timeout: Duration) -> bool {
        self.release_inner(Some(timeout))
    }

    fn release_inner(self, timeout: Option<Duration>) -> bool {
        let id = self.id();
        let signal = self.request_completion_signal();
        drop(self);

        let Some(signal) = signal else {
            return true;
        };

        let start = Instant::now();
        let completed = match timeout {
            Some(timeout) => signal.wait_timeout(timeout),
            None => {
                signal.wait();
                true
            }
        };
        observability::record_completion_wait(start.elapsed());

        if completed {
            tracing::debug!(buffer = %id, waited = ?start.elapsed(), "buffer teardown completed");
        } else {
            tracing::warn!(buffer = %id, ?timeout, "gave up waiting for buffer teardown");
        }
        completed
    }

    pub(crate) fn cell(&self) -> &Arc<BufferCell<T, D>> {
        &self.cell
    }
}

impl<T: Element, const D: usize> Clone for SharedBuffer<T, D> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T: Element, const D: usize> std::fmt::Debug for SharedBuffer<T, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("id", &self.cell.id)
            .field("holders", &self.holder_count())
            .finish()
    }
}

/// Exclusive use of a shared buffer, from [`SharedBuffer::lock`].
///
/// Dereferences to the [`Buffer`]. Dropping the guard publishes the
/// buffer's pending write-back state to
/// [`SharedBuffer::request_completion_signal`].
pub struct SharedBufferGuard<'g, T: Element, const D: usize> {
    guard: MutexGuard<'g, Buffer<'static, T, D>>,
    pending: &'g AtomicBool,
}

impl<T: Element, const D: usize> Deref for SharedBufferGuard<'_, T, D> {
    type Target = Buffer<'static, T, D>;

    fn deref(&self) -> &Buffer<'static, T, D> {
        &self.guard
    }
}

impl<T: Element, const D: usize> DerefMut for SharedBufferGuard<'_, T, D> {
    fn deref_mut(&mut self) -> &mut Buffer<'static, T, D> {
        &mut self.guard
    }
}

impl<T: Element, const D: usize> Drop for SharedBufferGuard<'_, T, D> {
    fn drop(&mut self) {
        // Runs before `guard` unlocks.
        self.pending
            .store(self.guard.has_pending_write_back(), Ordering::Release);
    }
}

impl<T: Element, const D: usize> std::fmt::Debug for SharedBufferGuard<'_, T, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&*self.guard, f)
    }
}

/// The host's owning handle on a shared buffer.
///
/// Dropping a `BufferWaiter` releases its holder with
/// [`SharedBuffer::release`], so host code resumes only after the buffer's
/// write-back has reached its destination.
///
/// # Example
///
/// ```rust
/// use hetbuf::{Buffer, BufferWaiter, Shape};
///
/// let waiter = BufferWaiter::new(Buffer::<u8>::from_shape(Shape::new([8]).unwrap()).unwrap());
/// let task_holder = waiter.clone();
/// drop(task_holder);
/// drop(waiter); // nothing pending, returns at once
/// ```
pub struct BufferWaiter<T: Element, const D: usize = 1> {
    shared: ManuallyDrop<SharedBuffer<T, D>>,
    release_timeout: Option<Duration>,
}

impl<T: Element, const D: usize> BufferWaiter<T, D> {
    /// Share `buffer`, waiting indefinitely on drop.
    pub fn new(buffer: Buffer<'static, T, D>) -> Self {
        Self::with_config(buffer, &BufferConfig::default())
    }

    /// Share `buffer`, waiting at most `config.release_timeout` on drop.
    pub fn with_config(buffer: Buffer<'static, T, D>, config: &BufferConfig) -> Self {
        Self {
            shared: ManuallyDrop::new(SharedBuffer::new(buffer)),
            release_timeout: config.release_timeout,
        }
    }
}

impl<T: Element, const D: usize> Deref for BufferWaiter<T, D> {
    type Target = SharedBuffer<T, D>;

    fn deref(&self) -> &SharedBuffer<T, D> {
        &self.shared
    }
}

impl<T: Element, const D: usize> Drop for BufferWaiter<T, D> {
    fn drop(&mut self) {
        // SAFETY: `shared` is never used again after this.
        let shared = unsafe { ManuallyDrop::take(&mut self.shared) };
        match self.release_timeout {
            Some(timeout) => {
                shared.release_timeout(timeout);
            }
            None => shared.release(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::WriteMode;
    use crate::memory::HostBlock;
    use crate::shape::Shape;
    use crate::sink::FinalData;
    use std::thread;

    fn modified_with_sink() -> (SharedBuffer<u32>, Arc<HostBlock<u32>>) {
        let dest = Arc::new(HostBlock::from_vec(vec![0u32; 2]));
        let mut buffer = Buffer::from_shape(Shape::new([2]).unwrap()).unwrap();
        buffer.set_final_data(FinalData::Strong(Arc::clone(&dest))).unwrap();
        buffer.mark_written();
        (SharedBuffer::new(buffer), dest)
    }

    #[test]
    fn test_sole_holder_gets_no_signal() {
        let (shared, _dest) = modified_with_sink();
        assert_eq!(shared.holder_count(), 1);
        assert!(shared.request_completion_signal().is_none());
    }

    #[test]
    fn test_second_holder_yields_signal() {
        let (shared, _dest) = modified_with_sink();
        let other = shared.clone();

        let signal = shared.request_completion_signal().unwrap();
        assert!(!signal.is_complete());

        drop(shared);
        assert!(!signal.is_complete());
        drop(other);
        assert!(signal.is_complete());
    }

    #[test]
    fn test_unmodified_buffer_gets_no_signal() {
        let buffer = Buffer::<u8>::from_shape(Shape::new([2]).unwrap()).unwrap();
        let shared = SharedBuffer::new(buffer);
        let _other = shared.clone();
        assert!(shared.request_completion_signal().is_none());
    }

    #[test]
    fn test_owned_without_sink_gets_no_signal() {
        let mut buffer = Buffer::<u8>::from_shape(Shape::new([2]).unwrap()).unwrap();
        buffer.mark_written();
        let shared = SharedBuffer::new(buffer);
        let _other = shared.clone();
        assert!(shared.request_completion_signal().is_none());
    }

    #[test]
    fn test_host_provided_storage_yields_signal() {
        let block = Arc::new(HostBlock::from_vec(vec![0u8; 2]));
        // SAFETY: nothing else reads or writes the block.
        let mut buffer =
            unsafe { Buffer::from_shared(Arc::clone(&block), Shape::new([2]).unwrap()) }.unwrap();
        buffer.mark_written();
        let shared = SharedBuffer::new(buffer);
        let _other = shared.clone();
        assert!(shared.request_completion_signal().is_some());
    }

    #[test]
    fn test_signals_share_one_completion() {
        let (shared, _dest) = modified_with_sink();
        let other = shared.clone();
        let first = shared.request_completion_signal().unwrap();
        let second = shared.request_completion_signal().unwrap();
        drop(shared);
        drop(other);
        assert!(first.is_complete());
        assert!(second.is_complete());
    }

    #[test]
    fn test_release_waits_for_task_write_back() {
        let (shared, dest) = modified_with_sink();
        let task = shared.clone();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            let mut buffer = task.lock();
            buffer.host_write(WriteMode::Write).unwrap().copy_from_slice(&[5, 6]);
        });

        shared.release();
        // The write-back happened before release returned.
        assert_eq!(unsafe { dest.as_slice() }, &[5, 6]);
        handle.join().unwrap();
    }

    #[test]
    fn test_guard_drop_publishes_pending_state() {
        let dest = Arc::new(HostBlock::from_vec(vec![0u32; 2]));
        let mut buffer = Buffer::from_shape(Shape::new([2]).unwrap()).unwrap();
        buffer.set_final_data(FinalData::Strong(Arc::clone(&dest))).unwrap();
        let shared = SharedBuffer::new(buffer);
        let _other = shared.clone();
        assert!(shared.request_completion_signal().is_none());

        {
            let mut guard = shared.lock();
            guard.host_write(WriteMode::ReadWrite).unwrap()[0] = 1;
            // Not visible until the guard drops.
            assert!(shared.request_completion_signal().is_none());
        }
        assert!(shared.request_completion_signal().is_some());
    }

    #[test]
    fn test_signal_request_does_not_wait_for_lock() {
        let (shared, _dest) = modified_with_sink();
        let other = shared.clone();

        let guard = other.lock();
        // Same thread, buffer locked: must return rather than deadlock.
        assert!(shared.request_completion_signal().is_some());

        let from_thread = shared.clone();
        let handle = thread::spawn(move || from_thread.request_completion_signal().is_some());
        assert!(handle.join().unwrap());
        drop(guard);
    }

    #[test]
    fn test_release_timeout_gives_up() {
        let (shared, _dest) = modified_with_sink();
        let other = shared.clone();
        assert!(!shared.release_timeout(Duration::from_millis(5)));
        drop(other);
    }

    #[test]
    fn test_waiter_sole_holder_does_not_block() {
        let mut buffer = Buffer::<u8>::from_shape(Shape::new([1]).unwrap()).unwrap();
        buffer.mark_written();
        let waiter = BufferWaiter::new(buffer);
        drop(waiter);
    }

    #[test]
    fn test_waiter_respects_timeout() {
        let data: Box<[u8]> = vec![0; 2].into_boxed_slice();
        let mut buffer = Buffer::from_unique(data, Shape::new([2]).unwrap()).unwrap();
        buffer.mark_written();

        let config = BufferConfig::default().with_release_timeout(Some(Duration::from_millis(5)));
        let waiter = BufferWaiter::with_config(buffer, &config);
        let task_holder = waiter.clone();

        let start = Instant::now();
        drop(waiter);
        assert!(start.elapsed() < Duration::from_secs(5));
        drop(task_holder);
    }
}
