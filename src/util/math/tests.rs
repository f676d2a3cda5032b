#![allow(clippy::unwrap_used, reason = "allow in test files")]

use super::*;

#[test]
fn median_distinct_values() {
    assert_eq!(median(1, 2, 3), 2);
    assert_eq!(median(3, 1, 2), 2);
    assert_eq!(median(2, 3, 1), 2);
}

#[test]
fn median_duplicate_values() {
    assert_eq!(median(1, 1, 2), 1);
    assert_eq!(median(5, 3, 5), 5);
    assert_eq!(median(7, 7, 7), 7);
}

#[test]
fn median_negative_values() {
    assert_eq!(median(-4i16, 0, 4), 0);
    assert_eq!(median(-10i16, -5, -1), -5);
}

#[test]
fn ue_sizes_match_the_code_table() {
    // Exp-Golomb: 1 bit for 0, then 3, 3, 5, 5, 5, 5, 7 ...
    assert_eq!(bits_ue(0), 1);
    assert_eq!(bits_ue(1), 3);
    assert_eq!(bits_ue(2), 3);
    assert_eq!(bits_ue(3), 5);
    assert_eq!(bits_ue(6), 5);
    assert_eq!(bits_ue(7), 7);
    assert_eq!(bits_ue(14), 7);
    assert_eq!(bits_ue(15), 9);
    assert_eq!(bits_ue(254), 15);
    assert_eq!(bits_ue(255), 17);
}

#[test]
fn se_maps_signed_to_unsigned_codes() {
    assert_eq!(bits_se(0), bits_ue(0));
    assert_eq!(bits_se(1), bits_ue(1));
    assert_eq!(bits_se(-1), bits_ue(2));
    assert_eq!(bits_se(2), bits_ue(3));
    assert_eq!(bits_se(-2), bits_ue(4));
}

#[test]
fn se_is_monotonic_in_magnitude() {
    let mut last = 0;
    for v in 0..512 {
        let bits = bits_se(v);
        assert!(bits >= last);
        assert!(bits_se(-v).abs_diff(bits) <= 2);
        last = bits;
    }
}

#[test]
fn te_single_entry_range_is_one_bit() {
    assert_eq!(bits_te(1, 0), 1);
    assert_eq!(bits_te(1, 1), 1);
    assert_eq!(bits_te(0, 0), 0);
    assert_eq!(bits_te(3, 2), bits_ue(2));
}
