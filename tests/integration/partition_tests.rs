use sumi_fetch::partition::{equal_weights, host_hash, HashRange, Md5Hash};
use sumi_fetch::PartitionError;

#[test]
fn test_every_host_lands_in_exactly_one_node() {
    let parts = HashRange::full().split(&equal_weights(5)).unwrap();
    assert_eq!(parts.len(), 5);

    for i in 0..500 {
        let hash = host_hash(&format!("host{}.example.org", i));
        let owners = parts.iter().filter(|p| p.contains(&hash)).count();
        assert_eq!(owners, 1, "hash {} owned by {} nodes", hash, owners);
    }
}

#[test]
fn test_split_of_a_configured_slice_stays_inside_it() {
    let slice: HashRange = "40000000000000000000000000000000..bfffffffffffffffffffffffffffffff"
        .parse()
        .unwrap();
    let parts = slice.split(&[0.1, 0.3, 0.6]).unwrap();

    assert_eq!(parts.first().unwrap().min(), slice.min());
    assert_eq!(parts.last().unwrap().max(), slice.max());
    for pair in parts.windows(2) {
        assert_eq!(pair[0].max().to_u128() + 1, pair[1].min().to_u128());
    }

    let total: f64 = parts.iter().map(HashRange::coverage_ratio).sum();
    assert!((total - slice.coverage_ratio()).abs() < 1e-6);
}

#[test]
fn test_nested_splits_can_be_reassigned() {
    // Split the keyspace, then split one node's share again
    let halves = HashRange::full().split(&[0.5, 0.5]).unwrap();
    let quarters = halves[1].split(&[0.5, 0.5]).unwrap();

    assert_eq!(quarters[0].min(), halves[1].min());
    assert_eq!(quarters[1].max(), Md5Hash::MAX);
    assert!((quarters[0].coverage_ratio() - 0.25).abs() < 1e-6);
}

#[test]
fn test_bad_weights_are_reported() {
    let full = HashRange::full();
    assert!(matches!(
        full.split(&[0.5, 0.4]),
        Err(PartitionError::WeightsDoNotSumToOne(_))
    ));
    assert!(matches!(full.split(&[]), Err(PartitionError::NoWeights)));
    assert!(matches!(
        full.split(&[1.5, -0.5]),
        Err(PartitionError::InvalidWeight(_))
    ));
}
