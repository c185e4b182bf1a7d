use crate::e2e_tests::helpers::{assert_clean, fixture};
use crate::storage::{DeallocList, OmError};

#[test]
fn reused_slot_invalidates_the_old_identifier() {
    let mut fx = fixture();

    let _a = fx
        .om
        .create_object(fx.file, None, 0, b"keeper")
        .expect("create");
    let b = fx
        .om
        .create_object(fx.file, None, 0, b"old tenant")
        .expect("create");

    // Destroying the tail slot collapses it; the next create reuses
    // the slot index with a fresh stamp.
    let mut dealloc = DeallocList::new();
    fx.om
        .destroy_object(fx.file, b, &mut dealloc)
        .expect("destroy");
    let c = fx
        .om
        .create_object(fx.file, None, 0, b"new tenant")
        .expect("create");

    assert_eq!(c.page_no, b.page_no);
    assert_eq!(c.slot_no, b.slot_no);
    assert_ne!(c.unique, b.unique);

    // The stale identifier is detected, not silently resolved.
    assert!(matches!(fx.om.fetch_object(b), Err(OmError::BadObjectId)));
    assert!(matches!(
        fx.om.destroy_object(fx.file, b, &mut dealloc),
        Err(OmError::BadObjectId)
    ));
    assert_eq!(fx.om.fetch_object(c).expect("fetch").1, b"new tenant");

    assert_clean(&mut fx.om, fx.file);
}
