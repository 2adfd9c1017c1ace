use std::collections::HashSet;
use std::net::Ipv4Addr;

use super::*;
use crate::ipam::CidrAllocator;

fn allocator(cidr: &str) -> CidrAllocator {
    CidrAllocator::new(cidr.parse().unwrap())
}

#[rstest]
fn test_allocations_are_unique() {
    let alloc = allocator("10.0.0.0/28");

    // a /28 has 14 usable host addresses
    let mut seen = HashSet::new();
    for i in 0..14 {
        let ip = alloc.allocate(&format!("test/pod{i}")).unwrap();
        assert!(seen.insert(ip), "{ip} was handed out twice");
        assert_ne!(ip, "10.0.0.0".parse::<Ipv4Addr>().unwrap());
        assert_ne!(ip, "10.0.0.15".parse::<Ipv4Addr>().unwrap());
    }

    assert!(alloc.allocate("test/one-too-many").is_err());
}

#[rstest]
fn test_release_makes_address_reusable() {
    let alloc = allocator("10.0.0.0/30");
    let first = alloc.allocate("test/pod0").unwrap();
    alloc.allocate("test/pod1").unwrap();
    assert!(alloc.allocate("test/pod2").is_err());

    alloc.release("test/pod0", first);
    assert_eq!(alloc.allocate("test/pod3").unwrap(), first);
}

#[rstest]
fn test_reserve_excludes_address() {
    let alloc = allocator("10.0.0.0/29");
    alloc.reserve("10.0.0.1".parse().unwrap());
    let ip = alloc.allocate("test/pod0").unwrap();
    assert_eq!(ip, "10.0.0.2".parse::<Ipv4Addr>().unwrap());
}

#[rstest]
#[case::single_address("10.0.0.0/32")]
#[case::point_to_point("10.0.0.0/31")]
fn test_empty_pool_rejects_everything(#[case] cidr: &str) {
    let alloc = allocator(cidr);
    let res = alloc.allocate("test/pod0");
    assert!(res.unwrap_err().to_string().contains("exhausted"));
}

#[rstest]
fn test_foreign_and_double_release_are_ignored() {
    let alloc = allocator("10.0.0.0/29");

    // outside the pool entirely
    alloc.release("test/pod0", "192.168.1.1".parse().unwrap());

    // releasing twice leaves the address free, not corrupted
    let ip = alloc.allocate("test/pod1").unwrap();
    alloc.release("test/pod1", ip);
    alloc.release("test/pod1", ip);
    assert_eq!(alloc.allocate("test/pod2").unwrap(), ip);
}

#[rstest]
fn test_first_fit_by_index() {
    let alloc = allocator("10.0.0.0/24");
    assert_eq!(alloc.allocate("test/pod0").unwrap(), "10.0.0.1".parse::<Ipv4Addr>().unwrap());
    assert_eq!(alloc.allocate("test/pod1").unwrap(), "10.0.0.2".parse::<Ipv4Addr>().unwrap());
}
