//! Shared fixtures for router integration tests

#![allow(dead_code)]

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sor_amm::{Address, SwapAmount, Token};
use sor_config::RouterConfig;
use sor_router::{CostEstimator, PoolRecord, PoolRegistry, SmartOrderRouter, TokenRecord};
use std::sync::Arc;

pub const DEFAULT_FEE: Decimal = dec!(0.003);

pub fn addr(byte: u8) -> Address {
    Address([byte; 20])
}

pub fn token(byte: u8) -> Token {
    Token::new(addr(byte), 18).unwrap()
}

/// Raw amount of an 18-decimal test token
pub fn amount(byte: u8, human: Decimal) -> SwapAmount {
    SwapAmount::from_decimal(token(byte), human).unwrap()
}

pub fn weighted(id: &str, a: u8, b: u8, balance_a: Decimal, balance_b: Decimal, fee: Decimal) -> PoolRecord {
    PoolRecord {
        id: id.to_string(),
        pool_type: "Weighted".to_string(),
        swap_fee: fee,
        amp: None,
        tokens: vec![
            TokenRecord {
                address: addr(a).to_string(),
                balance: balance_a,
                decimals: 18,
                weight: Some(dec!(0.5)),
            },
            TokenRecord {
                address: addr(b).to_string(),
                balance: balance_b,
                decimals: 18,
                weight: Some(dec!(0.5)),
            },
        ],
    }
}

/// Balanced 50/50 pool with the default fee
pub fn balanced(id: &str, a: u8, b: u8, balance: Decimal) -> PoolRecord {
    weighted(id, a, b, balance, balance, DEFAULT_FEE)
}

pub fn stable(id: &str, tokens: &[u8], balance: Decimal, amp: Decimal, fee: Decimal) -> PoolRecord {
    PoolRecord {
        id: id.to_string(),
        pool_type: "Stable".to_string(),
        swap_fee: fee,
        amp: Some(amp),
        tokens: tokens
            .iter()
            .map(|&t| TokenRecord {
                address: addr(t).to_string(),
                balance,
                decimals: 18,
                weight: None,
            })
            .collect(),
    }
}

pub fn router_with(records: &[PoolRecord], config: RouterConfig) -> SmartOrderRouter {
    let registry = Arc::new(PoolRegistry::new());
    let rejected = registry.load_snapshot(records);
    assert!(rejected.is_empty(), "fixture pools rejected: {:?}", rejected);
    let costs = Arc::new(CostEstimator::new(&config));
    SmartOrderRouter::new(config, registry, costs)
}

/// Router with a fixed per-swap cost in every listed token
pub fn router_with_cost(records: &[PoolRecord], cost: Decimal, cost_tokens: &[u8]) -> SmartOrderRouter {
    let router = router_with(records, RouterConfig::default());
    for &t in cost_tokens {
        router.costs().set_cost_output_token(&token(t), cost);
    }
    router
}
