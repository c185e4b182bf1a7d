//! Seeded random create/destroy workload with invariant checking.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::e2e_tests::helpers::{assert_clean, fixture, forward};
use crate::storage::{DeallocList, ObjectId};

const STEPS: usize = 400;
const VERIFY_EVERY: usize = 25;

#[test]
fn random_workload_preserves_invariants_and_contents() {
    let mut fx = fixture();
    let mut rng = StdRng::seed_from_u64(0x0E0D_1CE5);

    let mut shadow: HashMap<ObjectId, Vec<u8>> = HashMap::new();
    let mut order: Vec<ObjectId> = Vec::new();
    let mut dealloc = DeallocList::new();

    for step in 0..STEPS {
        let create = order.is_empty() || rng.random::<f64>() < 0.6;
        if create {
            let len = rng.random_range(0..300);
            let fill = rng.random::<u8>();
            let payload = vec![fill; len];
            let near = if !order.is_empty() && rng.random::<f64>() < 0.5 {
                Some(order[rng.random_range(0..order.len())])
            } else {
                None
            };
            let tag = rng.random_range(-100..100);
            let oid = fx
                .om
                .create_object(fx.file, near, tag, &payload)
                .expect("create");
            shadow.insert(oid, payload);
            order.push(oid);
        } else {
            let victim = order.swap_remove(rng.random_range(0..order.len()));
            fx.om
                .destroy_object(fx.file, victim, &mut dealloc)
                .expect("destroy");
            shadow.remove(&victim);
        }

        if rng.random::<f64>() < 0.05 {
            fx.om.drain_dealloc(&mut dealloc);
        }
        if step % VERIFY_EVERY == 0 {
            let stats = fx.om.verify_file(fx.file).expect("verify");
            assert_eq!(stats.objects, shadow.len() as u64);
        }
    }
    fx.om.drain_dealloc(&mut dealloc);

    // The scan sees exactly the live objects, and every identifier
    // still resolves to the bytes written at creation.
    let scanned: Vec<_> = forward(&mut fx.om, fx.file)
        .iter()
        .map(|(oid, _)| *oid)
        .collect();
    assert_eq!(scanned.len(), shadow.len());
    for oid in &scanned {
        let expected = shadow.get(oid).expect("scanned object is live");
        let (hdr, bytes) = fx.om.fetch_object(*oid).expect("fetch");
        assert_eq!(&bytes, expected);
        assert_eq!(hdr.length as usize, expected.len());
    }

    assert_clean(&mut fx.om, fx.file);
}
