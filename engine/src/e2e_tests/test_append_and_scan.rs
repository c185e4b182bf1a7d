use crate::e2e_tests::helpers::{assert_clean, backward, fixture, forward};

#[test]
fn appended_objects_scan_in_both_directions() {
    let mut fx = fixture();

    let a = fx
        .om
        .create_object(fx.file, None, 1, &[1u8; 10])
        .expect("create");
    let b = fx
        .om
        .create_object(fx.file, None, 2, &[2u8; 20])
        .expect("create");
    let c = fx
        .om
        .create_object(fx.file, None, 3, &[3u8; 30])
        .expect("create");

    // All three fit the file's first page, in slot order.
    assert_eq!(a.page_no, b.page_no);
    assert_eq!(b.page_no, c.page_no);
    assert_eq!((a.slot_no, b.slot_no, c.slot_no), (0, 1, 2));

    let fwd = forward(&mut fx.om, fx.file);
    let oids: Vec<_> = fwd.iter().map(|(oid, _)| *oid).collect();
    let lengths: Vec<_> = fwd.iter().map(|(_, hdr)| hdr.length).collect();
    assert_eq!(oids, vec![a, b, c]);
    assert_eq!(lengths, vec![10, 20, 30]);

    let bwd: Vec<_> = backward(&mut fx.om, fx.file)
        .iter()
        .map(|(oid, _)| *oid)
        .collect();
    assert_eq!(bwd, vec![c, b, a]);

    assert_clean(&mut fx.om, fx.file);
}
