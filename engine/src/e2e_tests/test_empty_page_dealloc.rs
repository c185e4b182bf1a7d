use crate::e2e_tests::helpers::{assert_clean, fill_page_from, fixture, forward};
use crate::storage::{DeallocEntry, DeallocList};

#[test]
fn emptied_non_first_page_is_unlinked_and_deallocated() {
    let mut fx = fixture();

    let seed = fx
        .om
        .create_object(fx.file, None, 0, &[0xB7u8; 100])
        .expect("create seed");
    let (_, spill) = fill_page_from(&mut fx.om, fx.file, seed, 100);
    assert_ne!(spill.page_no, seed.page_no);

    let mut dealloc = DeallocList::new();
    fx.om
        .destroy_object(fx.file, spill, &mut dealloc)
        .expect("destroy");

    // The emptied page left the chain and waits on the dealloc list.
    let entries: Vec<_> = dealloc.iter().copied().collect();
    assert_eq!(entries, vec![DeallocEntry::Page(spill.page_id())]);
    let stats = fx.om.verify_file(fx.file).expect("verify");
    assert_eq!(stats.pages, 1);

    // Scans no longer visit it.
    assert!(
        forward(&mut fx.om, fx.file)
            .iter()
            .all(|(oid, _)| oid.page_no == seed.page_no)
    );

    assert_clean(&mut fx.om, fx.file);
}

#[test]
fn drained_dealloc_list_returns_pages_to_the_volume() {
    let mut fx = fixture();

    let seed = fx
        .om
        .create_object(fx.file, None, 0, &[0xB7u8; 100])
        .expect("create seed");
    let (_, spill) = fill_page_from(&mut fx.om, fx.file, seed, 100);

    let mut dealloc = DeallocList::new();
    fx.om
        .destroy_object(fx.file, spill, &mut dealloc)
        .expect("destroy");

    assert!(fx.om.volume().is_allocated(spill.page_no));
    fx.om.drain_dealloc(&mut dealloc);
    assert!(!fx.om.volume().is_allocated(spill.page_no));

    assert_clean(&mut fx.om, fx.file);
}
