use crate::e2e_tests::helpers::{assert_clean, fill_page_from, fixture};
use crate::storage::{DeallocList, OBJECT_HDR_SIZE, SLOT_SIZE, aligned_length};

#[test]
fn insert_that_fits_only_after_compaction_compacts_in_place() {
    let mut fx = fixture();

    let seed = fx
        .om
        .create_object(fx.file, None, 0, &[0xB7u8; 100])
        .expect("create seed");
    let (on_page, _spill) = fill_page_from(&mut fx.om, fx.file, seed, 100);

    // Punch a hole in the middle of the full page.
    let victim = on_page[on_page.len() / 2];
    let mut dealloc = DeallocList::new();
    fx.om
        .destroy_object(fx.file, victim, &mut dealloc)
        .expect("destroy");

    // The request fits the page's total free space but not its window.
    let needed = OBJECT_HDR_SIZE + aligned_length(100) + SLOT_SIZE;
    let stats = fx.om.page_stats(seed.page_id()).expect("stats");
    assert!(stats.free_window < needed);
    assert!(needed <= stats.total_free);

    let created = fx
        .om
        .create_object(fx.file, Some(seed), 9, &[0xC4u8; 100])
        .expect("create into hole");

    assert_eq!(created.page_no, seed.page_no);
    let stats = fx.om.page_stats(seed.page_id()).expect("stats");
    assert_eq!(stats.unused, 0);

    // Every survivor still resolves to its original bytes.
    for oid in on_page.iter().filter(|&&oid| oid != victim) {
        let (_, bytes) = fx.om.fetch_object(*oid).expect("fetch");
        let expected = if *oid == seed { 0xB7u8 } else { 0xA5u8 };
        assert_eq!(bytes, vec![expected; 100]);
    }
    let (hdr, bytes) = fx.om.fetch_object(created).expect("fetch new");
    assert_eq!(hdr.tag, 9);
    assert_eq!(bytes, vec![0xC4u8; 100]);

    assert_clean(&mut fx.om, fx.file);
}
