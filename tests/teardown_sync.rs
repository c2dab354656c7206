//! Integration tests for shared buffers released from host code while tasks
//! still hold them.

use hetbuf::memory::HostBlock;
use hetbuf::{
    AccessMode, AccessTarget, Buffer, BufferConfig, BufferDependency, BufferWaiter, FinalData,
    Shape, SharedBuffer, TaskBuilder, WriteMode,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// A scheduler stand-in that holds the buffers given to one task.
#[derive(Default)]
struct ThreadTask {
    deps: Vec<(BufferDependency, bool)>,
}

impl TaskBuilder for ThreadTask {
    type Task = ();

    fn add_buffer(&mut self, buffer: BufferDependency, is_write: bool) -> Self::Task {
        self.deps.push((buffer, is_write));
    }
}

fn buffer_with_sink(len: usize) -> (Buffer<'static, u64>, Arc<HostBlock<u64>>) {
    let dest = Arc::new(HostBlock::from_vec(vec![0u64; len]));
    let mut buffer = Buffer::from_shape(Shape::new([len]).unwrap()).unwrap();
    buffer
        .set_final_data(FinalData::Strong(Arc::clone(&dest)))
        .unwrap();
    (buffer, dest)
}

// ============================================================================
// Holder-Count Rule
// ============================================================================

/// The last holder gets no signal, whatever the buffer's state.
#[test]
fn test_single_holder_never_waits() {
    let (mut buffer, _dest) = buffer_with_sink(4);
    buffer.mark_written();
    let shared = SharedBuffer::new(buffer);
    assert!(shared.request_completion_signal().is_none());

    // Release completes synchronously and runs the write-back.
    shared.release();
}

/// A task's dependency counts as a holder.
#[test]
fn test_task_dependency_counts_as_holder() {
    let (buffer, _dest) = buffer_with_sink(4);
    let shared = SharedBuffer::new(buffer);
    let mut task = ThreadTask::default();
    shared
        .register_access(&mut task, AccessMode::Write, AccessTarget::GlobalBuffer)
        .unwrap();

    assert_eq!(shared.holder_count(), 2);
    let signal = shared.request_completion_signal().unwrap();
    drop(shared);
    assert!(!signal.is_complete());
    drop(task);
    assert!(signal.is_complete());
}

// ============================================================================
// Release Waits For Write-back
// ============================================================================

/// Host release returns only after the task's write has been published.
#[test]
fn test_release_observes_task_write_back() {
    for _ in 0..20 {
        let (buffer, dest) = buffer_with_sink(64);
        let shared = SharedBuffer::new(buffer);
        let task_holder = shared.clone();
        let started = Arc::new(AtomicBool::new(false));
        let started_task = Arc::clone(&started);

        let handle = thread::spawn(move || {
            {
                let mut buffer = task_holder.lock();
                let mut acc = buffer.host_write(WriteMode::DiscardWrite).unwrap();
                for (i, v) in acc.iter_mut().enumerate() {
                    *v = i as u64 * 2;
                }
            }
            // The guard is gone, so the pending write-back is visible to
            // a signal request from here on.
            started_task.store(true, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(2));
            drop(task_holder);
        });

        while !started.load(Ordering::SeqCst) {
            thread::yield_now();
        }
        shared.release();

        let expected: Vec<u64> = (0..64).map(|i| i * 2).collect();
        // SAFETY: the buffer is gone; nothing else writes the block.
        assert_eq!(unsafe { dest.as_slice() }, expected.as_slice());
        handle.join().unwrap();
    }
}

/// Several tasks share the buffer; the write-back runs once, after the
/// last one finishes.
#[test]
fn test_release_waits_for_all_tasks() {
    let (buffer, dest) = buffer_with_sink(8);
    let waiter = BufferWaiter::new(buffer);

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let holder = waiter.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(5 * t as u64));
                let mut buffer = holder.lock();
                let mut acc = buffer.host_write(WriteMode::ReadWrite).unwrap();
                acc[t * 2] += 1;
                acc[t * 2 + 1] += 1;
            })
        })
        .collect();

    waiter.lock().mark_written();
    drop(waiter);

    assert_eq!(Arc::strong_count(&dest), 1);
    assert_eq!(unsafe { dest.as_slice() }, &[1u64; 8]);
    for h in handles {
        h.join().unwrap();
    }
}

/// A bounded waiter gives up on a holder that never lets go.
#[test]
fn test_bounded_waiter_times_out() {
    let (mut buffer, _dest) = buffer_with_sink(2);
    buffer.mark_written();

    let config = BufferConfig::default().with_release_timeout(Some(Duration::from_millis(10)));
    let waiter = BufferWaiter::with_config(buffer, &config);
    let stuck = waiter.clone();

    drop(waiter);
    assert_eq!(stuck.holder_count(), 1);
}
