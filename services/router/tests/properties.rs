//! Routing Property Tests
//!
//! Invariants that hold for any pool graph and request: plans conserve
//! amounts, better requests never route worse, active paths end at equal
//! marginal prices, and concurrent refreshes are never observed half done.

mod common;

use common::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sor_amm::{SwapType, Token};
use sor_config::RouterConfig;
use sor_router::{
    calibrate, load_snapshot, AllocationOptimizer, LiveBalances, PathFinder, PoolRecord,
    PoolRegistry, RefreshRecord, RouteRequest, SwapPlan,
};
use std::collections::HashSet;
use std::sync::Arc;

const X: u8 = 1;
const Y: u8 = 2;

/// Triangle plus parallel pools: splits and multi-hop paths both matter
fn mixed_graph() -> Vec<PoolRecord> {
    vec![
        balanced("xy-deep", X, Y, dec!(50000)),
        weighted("xy-skew", X, Y, dec!(20000), dec!(22000), dec!(0.002)),
        balanced("x3", X, 3, dec!(30000)),
        balanced("3y", 3, Y, dec!(30000)),
        stable("stable-x4y", &[X, 4, Y], dec!(15000), dec!(100), dec!(0.0004)),
    ]
}

fn route(swap_type: SwapType, human: Decimal) -> SwapPlan {
    let router = router_with_cost(&mixed_graph(), Decimal::ZERO, &[X, Y]);
    let amount = match swap_type {
        SwapType::ExactIn => amount(X, human),
        SwapType::ExactOut => amount(Y, human),
    };
    router
        .route(&RouteRequest::new(addr(X), addr(Y), swap_type, amount))
        .unwrap()
}

fn index_of(plan: &SwapPlan, byte: u8) -> usize {
    plan.token_addresses
        .iter()
        .position(|a| *a == addr(byte))
        .unwrap()
}

#[test]
fn test_exact_in_plan_conserves_amounts() {
    let plan = route(SwapType::ExactIn, dec!(5000));
    let x = index_of(&plan, X);
    let y = index_of(&plan, Y);

    let sent: u128 = plan
        .swaps
        .iter()
        .filter(|s| s.token_in_index == x)
        .map(|s| s.amount)
        .sum();
    let received: u128 = plan
        .swaps
        .iter()
        .filter(|s| s.token_out_index == y)
        .map(|s| s.return_amount)
        .sum();

    assert_eq!(sent, plan.swap_amount);
    assert_eq!(received, plan.return_amount);

    // Every intermediate token is consumed exactly as produced
    for (i, _) in plan.token_addresses.iter().enumerate().filter(|&(i, _)| i != x && i != y) {
        let produced: u128 = plan
            .swaps
            .iter()
            .filter(|s| s.token_out_index == i)
            .map(|s| s.return_amount)
            .sum();
        let consumed: u128 = plan
            .swaps
            .iter()
            .filter(|s| s.token_in_index == i)
            .map(|s| s.amount)
            .sum();
        assert_eq!(produced, consumed);
    }
}

#[test]
fn test_token_table_is_unique_and_indexed() {
    for plan in [
        route(SwapType::ExactIn, dec!(5000)),
        route(SwapType::ExactOut, dec!(5000)),
    ] {
        let unique: HashSet<_> = plan.token_addresses.iter().collect();
        assert_eq!(unique.len(), plan.token_addresses.len());
        assert_eq!(plan.token_addresses[0], addr(X));
        for step in &plan.swaps {
            assert!(step.token_in_index < plan.token_addresses.len());
            assert!(step.token_out_index < plan.token_addresses.len());
            assert_ne!(step.token_in_index, step.token_out_index);
        }
    }
}

#[test]
fn test_limit_signs_follow_token_roles() {
    for swap_type in [SwapType::ExactIn, SwapType::ExactOut] {
        let plan = route(swap_type, dec!(5000));
        let limits = plan.limits(dec!(0.01)).unwrap();
        assert_eq!(limits.len(), plan.token_addresses.len());

        for (limit, address) in limits.iter().zip(&plan.token_addresses) {
            if *address == addr(X) {
                assert!(*limit >= plan.amount_in() as i128);
            } else if *address == addr(Y) {
                assert!(*limit < 0);
                assert!(-*limit <= plan.amount_out() as i128);
            } else {
                assert_eq!(*limit, 0);
            }
        }
    }
}

#[test]
fn test_active_paths_share_marginal_price() {
    let config = RouterConfig::default();
    let (pools, _) = load_snapshot(&mixed_graph());
    let paths = PathFinder::new(config.max_hops, config.max_candidate_paths)
        .find_paths(&pools, &addr(X), &addr(Y));

    for swap_type in [SwapType::ExactIn, SwapType::ExactOut] {
        let allocation = AllocationOptimizer::new(&config, swap_type, Decimal::ZERO)
            .optimize(paths.clone(), dec!(8000))
            .unwrap();
        assert!(allocation.routes.len() > 1);
        assert!(allocation.warnings.is_empty());

        let prices: Vec<Decimal> = allocation
            .routes
            .iter()
            .filter(|r| r.amount < r.path.limit_amount(swap_type).unwrap())
            .map(|r| r.path.marginal_price(swap_type, r.amount).unwrap())
            .collect();
        let min = prices.iter().min().unwrap();
        let max = prices.iter().max().unwrap();
        assert!((*max - *min) / *min <= config.convergence_tolerance);
    }
}

#[test]
fn test_concurrent_refresh_is_atomic() {
    let records: Vec<PoolRecord> = (0..8u8)
        .map(|i| balanced(&format!("p{}", i), 10 + i, 30 + i, dec!(1000)))
        .collect();
    let registry = Arc::new(PoolRegistry::new());
    registry.load_snapshot(&records);

    std::thread::scope(|scope| {
        let writer = Arc::clone(&registry);
        scope.spawn(move || {
            for generation in 1..=200u32 {
                let balance = dec!(1000) + Decimal::from(generation);
                let live: LiveBalances = (0..8u8)
                    .map(|i| {
                        (
                            format!("p{}", i),
                            RefreshRecord {
                                balances: vec![balance, balance],
                                weights: None,
                            },
                        )
                    })
                    .collect();
                writer.apply_on_chain_refresh(&live);
            }
        });

        for _ in 0..4 {
            let reader = Arc::clone(&registry);
            scope.spawn(move || {
                for _ in 0..500 {
                    let snapshot = reader.snapshot();
                    let balances: HashSet<Decimal> =
                        snapshot.pools().map(|p| p.tokens()[0].balance).collect();
                    // One generation per snapshot, never a mix
                    assert_eq!(balances.len(), 1);
                }
            });
        }
    });

    assert!(registry.finished_fetching_on_chain());
    let final_balance = registry.snapshot().get("p7").unwrap().tokens()[1].balance;
    assert_eq!(final_balance, dec!(1200));
}

fn graph_records(edges: &[(u8, u8)]) -> Vec<PoolRecord> {
    edges
        .iter()
        .enumerate()
        .map(|(i, &(a, b))| balanced(&format!("e{}", i), a + 1, b + 1, dec!(1000)))
        .collect()
}

fn pool_sequences(paths: &[sor_router::Path]) -> Vec<Vec<String>> {
    paths
        .iter()
        .map(|p| p.pool_ids().map(str::to_string).collect())
        .collect()
}

prop_compose! {
    fn edges()
        (raw in prop::collection::vec((0u8..6, 0u8..6), 1..14)) -> Vec<(u8, u8)> {
        raw.into_iter().filter(|(a, b)| a != b).collect()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_filter_keeps_every_path(edges in edges(), max_hops in 1usize..5) {
        prop_assume!(!edges.is_empty());
        let (pools, _) = load_snapshot(&graph_records(&edges));
        let finder = PathFinder::new(max_hops, 10_000);

        for (from, to) in [(1u8, 2u8), (1, 6), (3, 5)] {
            let full = finder.find_paths(&pools, &addr(from), &addr(to));
            let filtered_pools = pools.filter_for_pair(&addr(from), &addr(to), max_hops);
            let filtered = finder.find_paths(&filtered_pools, &addr(from), &addr(to));

            let full_set: HashSet<Vec<String>> = pool_sequences(&full).into_iter().collect();
            let filtered_set: HashSet<Vec<String>> = pool_sequences(&filtered).into_iter().collect();
            prop_assert_eq!(full_set, filtered_set);
            prop_assert!(filtered_pools.len() <= pools.len());
        }
    }

    #[test]
    fn prop_candidate_cap_keeps_shortest(edges in edges(), cap in 1usize..6) {
        prop_assume!(!edges.is_empty());
        let (pools, _) = load_snapshot(&graph_records(&edges));

        let all = PathFinder::new(4, 10_000).find_paths(&pools, &addr(1), &addr(2));
        let capped = PathFinder::new(4, cap).find_paths(&pools, &addr(1), &addr(2));

        prop_assert_eq!(capped.len(), all.len().min(cap));
        prop_assert_eq!(pool_sequences(&capped), pool_sequences(&all[..capped.len()]));
        let hops: Vec<usize> = all.iter().map(|p| p.hop_count()).collect();
        let mut sorted = hops.clone();
        sorted.sort();
        prop_assert_eq!(hops, sorted);
    }

    #[test]
    fn prop_calibration_is_idempotent(
        gas_price in 1u64..1_000_000_000_000,
        gas_units in 1u64..1_000_000,
        price_cents in 1u64..100_000_000,
    ) {
        let price = Some(Decimal::new(price_cents as i64, 2));
        prop_assert_eq!(calibrate(gas_price, gas_units, price), calibrate(gas_price, gas_units, price));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn prop_larger_exact_in_never_returns_less(base in 10u32..4_000, extra_percent in 1u32..100) {
        let small = Decimal::from(base);
        let large = small + small * Decimal::from(extra_percent) / dec!(100);

        let small_plan = route(SwapType::ExactIn, small);
        let large_plan = route(SwapType::ExactIn, large);
        prop_assert!(large_plan.return_amount >= small_plan.return_amount);
    }

    #[test]
    fn prop_larger_exact_out_never_costs_less(base in 10u32..4_000, extra_percent in 1u32..100) {
        let small = Decimal::from(base);
        let large = small + small * Decimal::from(extra_percent) / dec!(100);

        let small_plan = route(SwapType::ExactOut, small);
        let large_plan = route(SwapType::ExactOut, large);
        prop_assert!(large_plan.return_amount >= small_plan.return_amount);
    }
}

#[test]
fn test_token_precision_survives_routing() {
    // Six-decimal output token
    let mut records = vec![balanced("xy", X, Y, dec!(100000))];
    for token in &mut records[0].tokens {
        if token.address == addr(Y).to_string() {
            token.decimals = 6;
        }
    }
    let router = router_with(&records, RouterConfig::default());
    let request = RouteRequest::new(addr(X), addr(Y), SwapType::ExactIn, amount(X, dec!(100)));

    let plan = router.route(&request).unwrap();
    let usdc_like = Token::new(addr(Y), 6).unwrap();
    let out = sor_amm::SwapAmount::new(usdc_like, plan.return_amount)
        .to_decimal()
        .unwrap();
    assert!(out > dec!(99) && out < dec!(100));
    assert_eq!(out.scale(), 6);
}
