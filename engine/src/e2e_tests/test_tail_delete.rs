use crate::e2e_tests::helpers::{assert_clean, fixture};
use crate::storage::{DeallocList, OBJECT_HDR_SIZE, SLOT_SIZE, aligned_length};

#[test]
fn tail_delete_collapses_the_slot_and_returns_bytes() {
    let mut fx = fixture();

    let a = fx
        .om
        .create_object(fx.file, None, 0, &[1u8; 10])
        .expect("create");
    let _b = fx
        .om
        .create_object(fx.file, None, 0, &[2u8; 20])
        .expect("create");
    let c = fx
        .om
        .create_object(fx.file, None, 0, &[3u8; 30])
        .expect("create");

    let before = fx.om.page_stats(a.page_id()).expect("stats");

    let mut dealloc = DeallocList::new();
    fx.om
        .destroy_object(fx.file, c, &mut dealloc)
        .expect("destroy");

    let after = fx.om.page_stats(a.page_id()).expect("stats");
    assert_eq!(after.n_slots, 2);
    assert_eq!(
        after.free,
        before.free - (OBJECT_HDR_SIZE + aligned_length(30))
    );
    assert_eq!(after.unused, before.unused);
    // Record bytes and the popped slot entry both rejoin the window.
    assert_eq!(
        after.free_window,
        before.free_window + OBJECT_HDR_SIZE + aligned_length(30) + SLOT_SIZE
    );

    assert_clean(&mut fx.om, fx.file);
}
