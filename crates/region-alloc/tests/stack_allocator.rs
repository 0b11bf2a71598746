//! Integration tests for the stack allocator

use region_alloc::allocator::{StackAllocator, StackConfig, StackFrame};
use region_alloc::AllocError;

fn stack(capacity: usize) -> StackAllocator {
    StackAllocator::with_config(capacity, StackConfig::production())
        .expect("failed to create stack allocator")
}

#[test]
fn test_stack_lifo_pairing_returns_to_empty() {
    let s = stack(256);

    let a = s.alloc_aligned(16, 16).expect("allocation A failed");
    let b = s.alloc_aligned(32, 32).expect("allocation B failed");

    assert!(unsafe { s.free(b.cast()) });
    assert!(unsafe { s.free(a.cast()) });
    assert!(s.is_empty());
    assert_eq!(s.used(), 0);
}

#[test]
fn test_stack_out_of_order_free_fails_without_side_effects() {
    let s = stack(256);

    let a = s.alloc_aligned(8, 8).expect("allocation A failed");
    let _b = s.alloc_aligned(8, 8).expect("allocation B failed");
    let used = s.used();

    assert!(!unsafe { s.free(a.cast()) }, "freeing a non-top block must fail");
    assert_eq!(s.used(), used, "failed free must not move the cursor");
}

#[test]
fn test_stack_rejects_foreign_and_unallocated_pointers() {
    let s = stack(256);
    let a = s.alloc_aligned(8, 8).expect("allocation failed");

    let mut outside = 0u64;
    let foreign = std::ptr::NonNull::from(&mut outside).cast::<u8>();
    assert!(!unsafe { s.free(foreign) });

    // one past the cursor: nothing there has been allocated yet
    let past = unsafe {
        std::ptr::NonNull::new_unchecked(a.cast::<u8>().as_ptr().add(64))
    };
    assert!(!unsafe { s.free(past) });
}

#[test]
fn test_stack_returns_zeroed_aligned_memory() {
    let s = stack(512);

    for align in [1usize, 2, 8, 32, 128] {
        let ptr = s.alloc_aligned(24, align).expect("allocation failed");
        assert_eq!(ptr.cast::<u8>().as_ptr() as usize % align, 0);
        unsafe {
            for i in 0..24 {
                assert_eq!(*ptr.cast::<u8>().as_ptr().add(i), 0, "byte {i} must be zeroed");
            }
            std::ptr::write_bytes(ptr.cast::<u8>().as_ptr(), 0x77, 24);
        }
    }
}

#[test]
fn test_stack_middle_resize_retires_old_block() {
    let s = stack(256);

    let a = s.alloc_aligned(8, 8).expect("allocation A failed");
    let used_before_b = s.used();
    let b = s.alloc_aligned(8, 8).expect("allocation B failed");
    let c = s.alloc_aligned(8, 8).expect("allocation C failed");

    unsafe {
        std::ptr::write_bytes(b.cast::<u8>().as_ptr(), 0xB5, 8);

        // resizing the middle block moves it to a fresh top allocation
        let d = s
            .resize_aligned(Some(b.cast()), 8, 16, 8)
            .expect("resize failed")
            .expect("non-zero resize returns a block");
        assert_ne!(d.cast::<u8>(), b.cast::<u8>());
        for i in 0..8 {
            assert_eq!(*d.cast::<u8>().as_ptr().add(i), 0xB5, "copied byte {i}");
        }

        // the old address is retired: resize and free both reject it
        let again = s.resize_aligned(Some(b.cast()), 8, 32, 8);
        assert!(matches!(again, Err(AllocError::RetiredBlock)));

        assert!(s.free(d.cast()), "free D failed");
        assert!(s.free(c.cast()), "free C failed");
        // freeing C walks the cursor past the retired block's space
        assert_eq!(s.used(), used_before_b);

        assert!(!s.free(b.cast()), "the retired block must not be freeable");
        assert!(s.free(a.cast()), "free A failed");
    }
    assert!(s.is_empty());
}

#[test]
fn test_stack_top_resize_keeps_address() {
    let s = stack(256);

    let a = s.alloc_aligned(16, 8).expect("allocation failed");
    unsafe {
        std::ptr::write_bytes(a.cast::<u8>().as_ptr(), 0x42, 16);

        let grown = s
            .resize_aligned(Some(a.cast()), 16, 48, 8)
            .expect("grow failed")
            .expect("non-zero resize returns a block");
        assert_eq!(grown.cast::<u8>(), a.cast::<u8>());
        let bytes = grown.cast::<u8>().as_ptr();
        assert_eq!(*bytes.add(15), 0x42);
        for i in 16..48 {
            assert_eq!(*bytes.add(i), 0, "revealed tail byte {i} must be zero");
        }

        let shrunk = s
            .resize_aligned(Some(a.cast()), 48, 8, 8)
            .expect("shrink failed")
            .expect("non-zero resize returns a block");
        assert_eq!(shrunk.cast::<u8>(), a.cast::<u8>());

        assert!(s.free(a.cast()));
    }
    assert_eq!(s.used(), 0);
}

#[test]
fn test_stack_resize_none_allocates_and_zero_frees() {
    let s = stack(256);

    let ptr = unsafe { s.resize_aligned(None, 0, 32, 8) }
        .expect("fresh allocation failed")
        .expect("non-zero resize returns a block");
    assert_eq!(ptr.cast::<u8>().as_ptr() as usize % 8, 0);

    let freed = unsafe { s.resize_aligned(Some(ptr.cast()), 32, 0, 8) }.expect("free-resize failed");
    assert!(freed.is_none());
    assert_eq!(s.used(), 0);
}

#[test]
fn test_stack_exhaustion_leaves_state() {
    let s = stack(64);

    s.alloc_aligned(8, 8).expect("allocation failed");
    let used = s.used();
    assert!(s.alloc_aligned(64, 8).is_err());
    assert_eq!(s.used(), used);
}

#[test]
fn test_stack_marker_restore() {
    let s = stack(512);

    let a = s.alloc_aligned(16, 8).expect("allocation failed");
    let marker = s.mark();
    let used_at_mark = s.used();

    s.alloc_aligned(64, 8).expect("allocation failed");
    s.alloc_aligned(32, 16).expect("allocation failed");

    unsafe { s.restore_to_marker(marker) }.expect("restore failed");
    assert_eq!(s.used(), used_at_mark);

    // the pre-marker block is the top again and can be freed
    assert!(unsafe { s.free(a.cast()) });
    assert_eq!(s.used(), 0);
}

#[test]
fn test_stack_frame_restores_on_drop() {
    let s = stack(512);
    s.alloc_aligned(16, 8).expect("allocation failed");
    let used_before = s.used();

    {
        let frame = StackFrame::new(&s);
        frame.allocator().alloc_aligned(64, 8).expect("allocation failed");
        assert!(s.used() > used_before);
    }

    assert_eq!(s.used(), used_before);
}

#[test]
fn test_stack_reset() {
    let s = stack(256);
    s.alloc_aligned(32, 8).expect("allocation failed");
    s.alloc_aligned(32, 8).expect("allocation failed");

    unsafe { s.reset() };
    assert!(s.is_empty());
    assert_eq!(s.used(), 0);

    let ptr = s.alloc_aligned(64, 8).expect("allocation after reset failed");
    assert!(unsafe { s.free(ptr.cast()) });
}

#[test]
fn test_stack_alloc_free_stress() {
    let s = stack(64 * 1024);

    for round in 0..100 {
        let used_at_start = s.used();
        let mut blocks = Vec::new();
        for i in 0..10 {
            let ptr = s
                .alloc_aligned(128, 1 << (i % 5))
                .expect("stress allocation failed");
            unsafe { std::ptr::write_bytes(ptr.cast::<u8>().as_ptr(), round as u8, 128) };
            blocks.push(ptr);
        }
        for ptr in blocks.into_iter().rev() {
            assert!(unsafe { s.free(ptr.cast()) });
        }
        assert_eq!(s.used(), used_at_start, "round {round}");
    }
}
