//! Write-back example.
//!
//! Builds buffers over each kind of backing, writes through host
//! accessors, and shows where the data ends up after teardown.
//!
//! Run with: cargo run --example write_back

use hetbuf::memory::HostBlock;
use hetbuf::prelude::*;
use std::sync::Arc;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("hetbuf=debug")
        .init();

    println!("=== Write-back Example ===\n");

    // Borrowed: writes land in the caller's array directly.
    let mut arr = [1, 2, 3];
    {
        let mut buffer = Buffer::from_host_slice(&mut arr, Shape::new([3])?)?;
        buffer.host_write(WriteMode::Write)?[0] = 9;
    }
    println!("borrowed:       {:?}", arr);

    // Read-only: the first write copies, the source is untouched.
    let carr = [1, 2, 3];
    let mut out = [0; 3];
    {
        let mut buffer = Buffer::from_const_host_slice(&carr, Shape::new([3])?)?;
        buffer.set_final_data(OutputCursor::new(&mut out))?;
        buffer.host_write(WriteMode::ReadWrite)?[0] = 9;
        println!("promoted to:    {}", buffer.storage_kind());
    }
    println!("const source:   {:?}", carr);
    println!("cursor output:  {:?}", out);

    // Owned, with a strong destination.
    let dest = Arc::new(HostBlock::from_vec(vec![0u32; 3]));
    {
        let mut buffer = Buffer::<u32>::from_shape(Shape::new([3])?)?;
        buffer.set_final_data(Arc::clone(&dest))?;
        buffer.host_write(WriteMode::DiscardWrite)?.fill(7);
    }
    // SAFETY: the buffer that wrote the block is gone.
    println!("strong target:  {:?}", unsafe { dest.as_slice() });

    // Weak target released before teardown: nothing is written.
    let weak_dest = Arc::new(HostBlock::from_vec(vec![0u32; 3]));
    {
        let mut buffer = Buffer::from_elements([4u32, 5, 6])?;
        buffer.set_final_data(Arc::downgrade(&weak_dest))?;
        buffer.mark_written();
        drop(weak_dest);
    }
    println!("weak target released before teardown: skipped");

    Ok(())
}
