use crate::e2e_tests::helpers::{assert_clean, fixture};
use crate::storage::DeallocList;

#[test]
fn freed_space_is_reused_before_the_file_grows() {
    let mut fx = fixture();

    // Large objects: six per page, then the next create moves on.
    let oids: Vec<_> = (0..18)
        .map(|i| {
            fx.om
                .create_object(fx.file, None, 0, &[i as u8; 600])
                .expect("create")
        })
        .collect();
    let stats = fx.om.verify_file(fx.file).expect("verify");
    assert_eq!(stats.pages, 3);

    // Free three objects on the middle page; it climbs back into the
    // space directory.
    let middle_page = oids[8].page_no;
    let mut dealloc = DeallocList::new();
    for oid in oids.iter().filter(|o| o.page_no == middle_page).take(3) {
        fx.om
            .destroy_object(fx.file, *oid, &mut dealloc)
            .expect("destroy");
    }

    // A no-hint create now lands in the reopened page instead of
    // growing the chain.
    let reused = fx
        .om
        .create_object(fx.file, None, 0, &[0xEEu8; 600])
        .expect("create");
    assert_eq!(reused.page_no, middle_page);
    let stats = fx.om.verify_file(fx.file).expect("verify");
    assert_eq!(stats.pages, 3);

    assert_clean(&mut fx.om, fx.file);
}
