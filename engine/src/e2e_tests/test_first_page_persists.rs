use crate::e2e_tests::helpers::{assert_clean, fixture, forward};
use crate::storage::DeallocList;

#[test]
fn destroying_every_object_keeps_the_first_page() {
    let mut fx = fixture();

    let oids: Vec<_> = (0..5)
        .map(|i| {
            fx.om
                .create_object(fx.file, None, i, &[i as u8; 50])
                .expect("create")
        })
        .collect();
    let first_page = oids[0].page_id();

    let mut dealloc = DeallocList::new();
    for oid in &oids {
        fx.om
            .destroy_object(fx.file, *oid, &mut dealloc)
            .expect("destroy");
    }

    // The file is empty but keeps its identity: the first page stays
    // allocated, slotless, and on the chain.
    assert!(dealloc.is_empty());
    assert!(fx.om.volume().is_allocated(first_page.page_no));
    let stats = fx.om.page_stats(first_page).expect("stats");
    assert_eq!(stats.n_slots, 0);
    let file_stats = fx.om.verify_file(fx.file).expect("verify");
    assert_eq!(file_stats.pages, 1);
    assert_eq!(file_stats.objects, 0);
    assert!(forward(&mut fx.om, fx.file).is_empty());

    // And the empty file accepts new objects again.
    let reborn = fx
        .om
        .create_object(fx.file, None, 0, b"second life")
        .expect("create");
    assert_eq!(reborn.page_no, first_page.page_no);
    assert_eq!(reborn.slot_no, 0);

    assert_clean(&mut fx.om, fx.file);
}
