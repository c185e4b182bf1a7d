use crate::e2e_tests::helpers::{assert_clean, fill_page_from, fixture, forward};

#[test]
fn near_hint_reuses_the_near_page_while_it_has_room() {
    let mut fx = fixture();

    let a = fx
        .om
        .create_object(fx.file, None, 0, &[1u8; 40])
        .expect("create");
    let b = fx
        .om
        .create_object(fx.file, Some(a), 0, &[2u8; 40])
        .expect("create near");

    assert_eq!(b.page_no, a.page_no);
    assert_clean(&mut fx.om, fx.file);
}

#[test]
fn full_near_page_gets_a_new_page_spliced_right_after_it() {
    let mut fx = fixture();

    let seed = fx
        .om
        .create_object(fx.file, None, 0, &[0xB7u8; 100])
        .expect("create seed");
    let (on_page, spill) = fill_page_from(&mut fx.om, fx.file, seed, 100);
    assert_ne!(spill.page_no, seed.page_no);

    // The seed page is full again, so this splices another fresh page
    // between it and the spill page.
    let near_insert = fx
        .om
        .create_object(fx.file, Some(seed), 0, &[0xC4u8; 100])
        .expect("create near full page");
    assert_ne!(near_insert.page_no, seed.page_no);
    assert_ne!(near_insert.page_no, spill.page_no);

    // Chain order: seed page, spliced page, spill page.
    let oids: Vec<_> = forward(&mut fx.om, fx.file)
        .iter()
        .map(|(oid, _)| *oid)
        .collect();
    let mut expected = on_page.clone();
    expected.push(near_insert);
    expected.push(spill);
    assert_eq!(oids, expected);

    assert_clean(&mut fx.om, fx.file);
}
