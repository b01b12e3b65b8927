//! Additional property coverage using `quickcheck` alongside the
//! `proptest` suite in `property_tests.rs` — exercising both of the
//! property-testing crates this workspace depends on.

use bytes::Bytes;
use fetchkeep::cache::Cache;
use fetchkeep::request::ParsedRequest;
use proptest::prelude::*;
use quickcheck_macros::quickcheck;

proptest! {
    // Property: the `MAX_ELEMENT_SIZE` boundary is strict (§8).
    #[test]
    fn prop_element_size_boundary_is_strict(extra in 0usize..10_000usize) {
        let limit = 4096usize;
        let cache = Cache::with_limits(10 * limit, limit);
        let key = Bytes::from_static(b"GET /boundary HTTP/1.1\r\n\r\n");
        let overhead = key.len() + 64;
        let payload_len = limit.saturating_sub(overhead) + extra;
        let fits = overhead + payload_len <= limit;

        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let admitted = rt.block_on(cache.admit(key, Bytes::from(vec![0u8; payload_len])));
        prop_assert_eq!(admitted, fits);
    }
}

// Property: eviction always removes the least-recently-used entry
// first, never a more-recently-touched one (§4.2/§8).
#[tokio::test]
async fn prop_lru_never_evicts_a_just_touched_entry() {
    let cache = Cache::with_limits(3 * 166, 1000);
    let keys: Vec<Bytes> = (0..3)
        .map(|i| Bytes::from(format!("GET /k{i} HTTP/1.1\r\n\r\n").into_bytes()))
        .collect();

    for k in &keys {
        cache.admit(k.clone(), Bytes::from(vec![0u8; 100])).await;
    }

    // Touch every entry except the last one admitted.
    for k in &keys[..2] {
        assert!(cache.lookup(k).await.is_some());
    }

    let new_key = Bytes::from_static(b"GET /k-new HTTP/1.1\r\n\r\n");
    cache.admit(new_key.clone(), Bytes::from(vec![0u8; 100])).await;

    // The untouched entry (keys[2]) should be the one evicted.
    assert!(cache.lookup(&keys[0]).await.is_some());
    assert!(cache.lookup(&keys[1]).await.is_some());
    assert!(cache.lookup(&new_key).await.is_some());
}

#[quickcheck]
fn qc_set_header_is_idempotent_on_repeat_writes(name: String, value: String) -> bool {
    if name.is_empty() || name.contains(':') || name.contains('\r') || name.contains('\n') {
        return true;
    }
    let mut req = ParsedRequest::parse(b"GET /a HTTP/1.1\r\nHost: h\r\n\r\n").unwrap();
    let before = req.headers.len();
    req.set_header(&name, &value);
    req.set_header(&name, &value);
    req.headers.len() == before + 1 || req.headers.len() == before
}

#[quickcheck]
fn qc_header_get_after_set_round_trips(value: String) -> bool {
    if value.contains('\r') || value.contains('\n') {
        return true;
    }
    let mut req = ParsedRequest::parse(b"GET /a HTTP/1.1\r\nHost: h\r\n\r\n").unwrap();
    req.set_header("X-Probe", &value);
    req.get_header("X-Probe") == Some(value.as_str())
}
