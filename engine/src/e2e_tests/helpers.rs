//! Shared helpers for the scenario tests.

use std::sync::Once;

use tempfile::TempDir;

use crate::config::EngineConfig;
use crate::storage::{ObjectHdr, ObjectId, ObjectManager, PageId};

static INIT_TRACING: Once = Once::new();

/// Route engine logs through the test harness when `RUST_LOG` asks.
fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// An object manager over a fresh volume with one file created.
pub struct Fixture {
    pub om: ObjectManager,
    pub file: ObjectId,
    _dir: TempDir,
}

/// Build a fresh fixture with a small buffer pool.
pub fn fixture() -> Fixture {
    init_tracing();
    let dir = TempDir::new().expect("create temp dir");
    let config = EngineConfig {
        data_directory: dir.path().to_path_buf(),
        pool_capacity: 16,
    };
    let mut om = ObjectManager::create(&dir.path().join("test.vol"), &config).expect("create");
    let file = om.create_file(100).expect("create file");
    Fixture {
        om,
        file,
        _dir: dir,
    }
}

/// Collect the whole file front to back.
pub fn forward(om: &mut ObjectManager, file: ObjectId) -> Vec<(ObjectId, ObjectHdr)> {
    let mut out = Vec::new();
    let mut cur = None;
    while let Some((oid, hdr)) = om.next_object(file, cur).expect("next_object") {
        out.push((oid, hdr));
        cur = Some(oid);
    }
    out
}

/// Collect the whole file back to front.
pub fn backward(om: &mut ObjectManager, file: ObjectId) -> Vec<(ObjectId, ObjectHdr)> {
    let mut out = Vec::new();
    let mut cur = None;
    while let Some((oid, hdr)) = om.prev_object(file, cur).expect("prev_object") {
        out.push((oid, hdr));
        cur = Some(oid);
    }
    out
}

/// Create objects near `seed` until one lands on a different page.
///
/// Returns the objects that landed on the seed page and, last, the one
/// that spilled onto a fresh page.
pub fn fill_page_from(
    om: &mut ObjectManager,
    file: ObjectId,
    seed: ObjectId,
    payload_len: usize,
) -> (Vec<ObjectId>, ObjectId) {
    let mut on_page = vec![seed];
    let payload = vec![0xA5u8; payload_len];
    loop {
        let oid = om
            .create_object(file, Some(seed), 0, &payload)
            .expect("create near");
        if oid.page_no == seed.page_no {
            on_page.push(oid);
        } else {
            return (on_page, oid);
        }
    }
}

/// Assert the file passes its integrity walk and no pin is left behind.
pub fn assert_clean(om: &mut ObjectManager, file: ObjectId) {
    om.verify_file(file).expect("file invariants");
    for page_no in 0..om.volume().total_pages() {
        let pid = PageId::new(om.volume().volume_id(), page_no);
        assert_eq!(om.pool().pin_count(pid), 0, "leaked pin on {pid}");
    }
}
