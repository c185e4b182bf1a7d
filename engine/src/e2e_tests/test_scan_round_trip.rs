use crate::e2e_tests::helpers::{assert_clean, backward, fixture, forward};
use crate::storage::DeallocList;

#[test]
fn forward_and_backward_scans_agree_across_pages_and_tombstones() {
    let mut fx = fixture();

    let oids: Vec<_> = (0..15)
        .map(|i| {
            fx.om
                .create_object(fx.file, None, i, &[i as u8; 600])
                .expect("create")
        })
        .collect();
    let stats = fx.om.verify_file(fx.file).expect("verify");
    assert!(stats.pages >= 2);

    // Tombstone every third object so scans have holes to skip.
    let mut dealloc = DeallocList::new();
    for oid in oids.iter().step_by(3) {
        fx.om
            .destroy_object(fx.file, *oid, &mut dealloc)
            .expect("destroy");
    }

    let fwd: Vec<_> = forward(&mut fx.om, fx.file)
        .iter()
        .map(|(oid, _)| *oid)
        .collect();
    let mut bwd: Vec<_> = backward(&mut fx.om, fx.file)
        .iter()
        .map(|(oid, _)| *oid)
        .collect();
    bwd.reverse();

    assert_eq!(fwd, bwd);
    assert_eq!(fwd.len(), 10);
    assert!(oids.iter().step_by(3).all(|oid| !fwd.contains(oid)));

    // Resuming from a mid-scan cursor continues, never repeats.
    let mid = fwd[4];
    let (resumed, _) = fx
        .om
        .next_object(fx.file, Some(mid))
        .expect("next")
        .expect("more objects");
    assert_eq!(resumed, fwd[5]);

    assert_clean(&mut fx.om, fx.file);
}
