//! RFM feature computation over a lookback window

use std::collections::{HashMap, HashSet};

use chrono::{Duration, NaiveDateTime};
use log::debug;
use rust_decimal::Decimal;

use crate::data::{Customer, Order, RfmFeature};

/// Running aggregate of qualifying orders for one customer
#[derive(Debug, Default)]
struct OrderAggregate {
    last_order: Option<NaiveDateTime>,
    count: u32,
    total: Decimal,
}

impl OrderAggregate {
    fn add(&mut self, order: &Order) {
        self.last_order = match self.last_order {
            Some(last) if last >= order.order_date => Some(last),
            _ => Some(order.order_date),
        };
        self.count += 1;
        self.total += order.amount;
    }
}

/// Compute one RFM record per customer at `calc_date`.
///
/// Only completed orders dated within `[calc_date - window_days, calc_date]`
/// qualify. Customers without qualifying orders get the sentinel recency
/// `window_days + 1` with zero frequency and monetary value. Duplicate
/// customer ids in the input yield a single record.
///
/// # Arguments
/// * `customers` - Population to score
/// * `orders` - Order history, any status
/// * `calc_date` - Reference date of the snapshot
/// * `window_days` - Lookback window length
pub fn compute_features(
    customers: &[Customer],
    orders: &[Order],
    calc_date: NaiveDateTime,
    window_days: u32,
) -> Vec<RfmFeature> {
    let window_start = calc_date
        .checked_sub_signed(Duration::days(i64::from(window_days)))
        .unwrap_or(NaiveDateTime::MIN);

    let mut aggregates: HashMap<&str, OrderAggregate> = HashMap::new();
    for order in orders.iter().filter(|o| {
        o.status.is_completed() && o.order_date >= window_start && o.order_date <= calc_date
    }) {
        aggregates
            .entry(order.customer_id.as_str())
            .or_default()
            .add(order);
    }

    debug!(
        "{} of {} customers have qualifying orders in [{}, {}]",
        aggregates.len(),
        customers.len(),
        window_start,
        calc_date
    );

    let mut seen = HashSet::with_capacity(customers.len());
    customers
        .iter()
        .filter(|c| seen.insert(c.customer_id.as_str()))
        .map(|customer| {
            match aggregates.get(customer.customer_id.as_str()) {
                Some(OrderAggregate {
                    last_order: Some(last_order),
                    count,
                    total,
                }) => {
                    let days = (calc_date - *last_order).num_days().max(0);
                    RfmFeature {
                        customer_id: customer.customer_id.clone(),
                        calc_date,
                        recency_days: u32::try_from(days).unwrap_or(window_days),
                        frequency: *count,
                        monetary: *total,
                    }
                }
                _ => RfmFeature {
                    customer_id: customer.customer_id.clone(),
                    calc_date,
                    recency_days: window_days.saturating_add(1),
                    frequency: 0,
                    monetary: Decimal::new(0, 2),
                },
            }
        })
        .collect()
}
