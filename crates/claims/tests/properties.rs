//! End-to-end properties of the claims pipeline: eligible set → artifact → reconciliation.

use airdrop_claims::{
    merkle, reconcile, ArtifactHead, EligibleSet, ProofsPayload, ReconcileInput, Reconciliation,
    EMPTY_ROOT,
};
use alloy_primitives::{b256, Address, U256};
use proptest::prelude::*;

const ONE_TOKEN: u64 = 1_000_000_000_000_000_000;

fn addr(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

#[test]
fn test_three_minter_scenario_is_stable() {
    let minters = [addr(0xa), addr(0xb), addr(0xc)];
    let eligible: EligibleSet = minters.into_iter().collect();

    let first = ProofsPayload::build(&eligible, U256::from(ONE_TOKEN), 500_000);
    let second = ProofsPayload::build(&eligible, U256::from(ONE_TOKEN), 500_000);

    assert_eq!(first, second);
    assert_eq!(first.claims.len(), 3);
    assert_eq!(
        first.root,
        b256!("0x2f6ac1488fa9e7441519323759a3c2508ae6cdefb8e9fa258d2fa4c1b1bc9e1c")
    );
    // getHexProof for each minter, in sorted account order
    assert_eq!(
        first.claims[0].proof,
        vec![
            b256!("0xa7bf2c2a4c89d61f68c7f729a22d5ecd078ee0a81c943fe48af5ecae590acf67"),
            b256!("0x0ed51f8e43814ac9808af4be00987b1196ef06a4e2959bcda6bd232b84867fd2"),
        ]
    );
    assert_eq!(
        first.claims[1].proof,
        vec![
            b256!("0x6729e6ffa61956198d7c12e2b8f208090647d8228a6a09eadf2e8881fa54b693"),
            b256!("0x0ed51f8e43814ac9808af4be00987b1196ef06a4e2959bcda6bd232b84867fd2"),
        ]
    );
    assert_eq!(
        first.claims[2].proof,
        vec![b256!("0xbcef80c0875352086476cde8a71274db334b140058c40d0e202fca6c42a892af")]
    );
    for claim in &first.claims {
        assert!(matches!(claim.proof.len(), 1 | 2));
        assert!(merkle::verify(claim.leaf(500_000), &claim.proof, first.root));
    }
}

#[test]
fn test_second_rebuild_is_unchanged() {
    let eligible: EligibleSet = [addr(1), addr(2), addr(3), addr(4)].into_iter().collect();
    let payload = ProofsPayload::build(&eligible, U256::from(ONE_TOKEN), 12);

    // first run publishes and pushes
    let first = reconcile(&ReconcileInput {
        computed: payload.head(),
        eligible: eligible.len(),
        published: None,
        onchain: ArtifactHead::new(11, EMPTY_ROOT),
    });
    assert_eq!(first.classification, Reconciliation::NeedsOnchainPush);

    // nothing changed on chain since
    let again = ProofsPayload::build(&eligible, U256::from(ONE_TOKEN), 12);
    let second = reconcile(&ReconcileInput {
        computed: again.head(),
        eligible: eligible.len(),
        published: Some(payload.head()),
        onchain: payload.head(),
    });
    assert_eq!(second.classification, Reconciliation::Unchanged);
    assert!(!second.write_artifact);
    assert!(!second.push_root);
}

#[test]
fn test_round_is_part_of_every_leaf() {
    let eligible: EligibleSet = [addr(1), addr(2)].into_iter().collect();
    let this_hour = ProofsPayload::build(&eligible, U256::from(ONE_TOKEN), 100);
    let next_hour = ProofsPayload::build(&eligible, U256::from(ONE_TOKEN), 101);

    assert_ne!(this_hour.root, next_hour.root);
}

#[test]
fn test_artifact_survives_publish_and_reload() {
    let eligible: EligibleSet = (1..=9).map(addr).collect();
    let payload = ProofsPayload::build(&eligible, U256::from(ONE_TOKEN), 77);

    let reloaded = ProofsPayload::from_json(&payload.to_json_pretty().unwrap()).unwrap();

    assert_eq!(reloaded.head(), payload.head());
    assert!(reloaded.invalid_claims().is_empty());
}

proptest! {
    #[test]
    fn prop_root_is_order_independent(
        mut raw in prop::collection::vec(any::<[u8; 20]>(), 1..40),
        seed in any::<u64>(),
    ) {
        let forward: EligibleSet = raw.iter().copied().map(Address::from).collect();

        // deterministic shuffle driven by the seed
        let len = raw.len();
        let mut state = seed;
        for i in (1..len).rev() {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            let j = usize::try_from(state % (i as u64 + 1)).unwrap();
            raw.swap(i, j);
        }
        let shuffled: EligibleSet = raw.into_iter().map(Address::from).collect();

        let a = ProofsPayload::build(&forward, U256::from(ONE_TOKEN), 5);
        let b = ProofsPayload::build(&shuffled, U256::from(ONE_TOKEN), 5);
        prop_assert_eq!(a.root, b.root);
    }

    #[test]
    fn prop_every_claim_verifies(
        raw in prop::collection::vec(any::<[u8; 20]>(), 1..48),
        amount in any::<u64>(),
        round in any::<u64>(),
    ) {
        let eligible: EligibleSet = raw.into_iter().map(Address::from).collect();
        let payload = ProofsPayload::build(&eligible, U256::from(amount), round);

        prop_assert_eq!(payload.claims.len(), eligible.len());
        prop_assert!(payload.invalid_claims().is_empty());
    }
}
