//! Task release example.
//!
//! Host code shares a buffer with a few worker threads standing in for
//! scheduled tasks, then releases its handle. The release blocks until the
//! last task drops the buffer and the write-back has run.
//!
//! Run with: cargo run --example task_release

use hetbuf::memory::HostBlock;
use hetbuf::prelude::*;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Collects the buffers one task uses.
#[derive(Default)]
struct WorkerTask {
    buffers: Vec<BufferDependency>,
}

impl TaskBuilder for WorkerTask {
    type Task = usize;

    fn add_buffer(&mut self, buffer: BufferDependency, is_write: bool) -> usize {
        tracing::info!(buffer = %buffer.id(), is_write, "task registered buffer");
        self.buffers.push(buffer);
        self.buffers.len()
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    hetbuf::observability::init_metrics();

    println!("=== Task Release Example ===\n");

    let dest = Arc::new(HostBlock::from_vec(vec![0u32; 4]));
    let mut buffer = Buffer::<u32>::from_shape(Shape::new([4])?)?;
    buffer.set_final_data(FinalData::Strong(Arc::clone(&dest)))?;

    let waiter = BufferWaiter::with_config(buffer, &BufferConfig::bounded());

    let handles: Vec<_> = (0..4usize)
        .map(|i| -> Result<thread::JoinHandle<()>> {
            let shared = waiter.clone();
            let mut task = WorkerTask::default();
            shared.register_access(&mut task, AccessMode::ReadWrite, AccessTarget::GlobalBuffer)?;
            Ok(thread::spawn(move || {
                thread::sleep(Duration::from_millis(10 * (i as u64 + 1)));
                if let Ok(mut acc) = shared.lock().host_write(WriteMode::ReadWrite) {
                    acc[i] = i as u32 + 1;
                }
                // Finishing the task drops its holders.
                drop(task);
            }))
        })
        .collect::<Result<Vec<_>>>()?;

    let start = Instant::now();
    drop(waiter);
    println!("release waited {:?}", start.elapsed());
    // SAFETY: the buffer is gone.
    println!("destination:    {:?}", unsafe { dest.as_slice() });

    for handle in handles {
        let _ = handle.join();
    }
    Ok(())
}
