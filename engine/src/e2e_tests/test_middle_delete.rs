use crate::e2e_tests::helpers::{assert_clean, fixture, forward};
use crate::storage::{DeallocList, OBJECT_HDR_SIZE, aligned_length};

#[test]
fn middle_delete_leaves_a_hole_and_scans_skip_it() {
    let mut fx = fixture();

    let a = fx
        .om
        .create_object(fx.file, None, 0, &[1u8; 10])
        .expect("create");
    let b = fx
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
        .destroy_object(fx.file, b, &mut dealloc)
        .expect("destroy");

    let after = fx.om.page_stats(a.page_id()).expect("stats");
    assert_eq!(after.n_slots, 3);
    assert_eq!(after.free, before.free);
    assert_eq!(
        after.unused,
        before.unused + OBJECT_HDR_SIZE + aligned_length(20)
    );
    assert!(dealloc.is_empty());

    let oids: Vec<_> = forward(&mut fx.om, fx.file)
        .iter()
        .map(|(oid, _)| *oid)
        .collect();
    assert_eq!(oids, vec![a, c]);

    assert_clean(&mut fx.om, fx.file);
}
