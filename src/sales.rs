// 📊 Sales summary - dashboard figures over persisted orders

use crate::error::Result;
use crate::ingestion::SalesOrder;
use crate::ledger::{daily_totals, DailyTotal, LedgerEntry};
use crate::store::SalesQueries;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelShare {
    pub channel: String,
    pub net_total: f64,
    pub orders: usize,
    /// Fraction of the period's net total (0.0 when the period nets to zero)
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesSummary {
    pub net_total: f64,
    pub gross_total: f64,
    pub order_count: usize,
    pub average_ticket: f64,
    /// Net sales per calendar day, ascending
    pub daily: Vec<DailyTotal>,
    /// Largest channel first
    pub channels: Vec<ChannelShare>,
}

impl SalesSummary {
    pub fn from_orders(orders: &[SalesOrder]) -> Self {
        let net_total: f64 = orders.iter().map(|o| o.valor_liquido).sum();
        let gross_total: f64 = orders.iter().map(|o| o.valor_bruto).sum();
        let order_count = orders
            .iter()
            .map(|o| o.id_pedido)
            .collect::<HashSet<_>>()
            .len();
        let average_ticket = if order_count > 0 {
            net_total / order_count as f64
        } else {
            0.0
        };

        let entries: Vec<LedgerEntry> = orders
            .iter()
            .map(|o| LedgerEntry::new(o.data_hora.date(), o.valor_liquido))
            .collect();

        let mut by_channel: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
        for order in orders {
            let slot = by_channel.entry(order.canal_venda.as_str()).or_insert((0.0, 0));
            slot.0 += order.valor_liquido;
            slot.1 += 1;
        }

        let mut channels: Vec<ChannelShare> = by_channel
            .into_iter()
            .map(|(channel, (total, count))| ChannelShare {
                channel: channel.to_string(),
                net_total: total,
                orders: count,
                share: if net_total != 0.0 { total / net_total } else { 0.0 },
            })
            .collect();
        channels.sort_by(|a, b| {
            b.net_total
                .partial_cmp(&a.net_total)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.channel.cmp(&b.channel))
        });

        SalesSummary {
            net_total,
            gross_total,
            order_count,
            average_ticket,
            daily: daily_totals(&entries),
            channels,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.order_count == 0
    }
}

/// Summary for the given `YYYY-MM` months; no months selected means the most
/// recent one.
pub fn summarize_months<Q: SalesQueries>(queries: &Q, months: &[String]) -> Result<SalesSummary> {
    let selected = if months.is_empty() {
        queries.available_months()?.into_iter().take(1).collect()
    } else {
        months.to_vec()
    };

    let orders = queries.orders_in_months(&selected)?;
    log::debug!("Summarizing {} orders for {:?}", orders.len(), selected);
    Ok(SalesSummary::from_orders(&orders))
}

pub fn summarize_range<Q: SalesQueries>(
    queries: &Q,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<SalesSummary> {
    let orders = queries.orders_between(start, end)?;
    Ok(SalesSummary::from_orders(&orders))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn order(id: i64, ts: &str, channel: &str, net: f64) -> SalesOrder {
        SalesOrder {
            id_pedido: id,
            data_hora: NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M").unwrap(),
            canal_venda: channel.to_string(),
            valor_bruto: net + 1.0,
            valor_liquido: net,
        }
    }

    #[test]
    fn test_summary_figures() {
        let orders = vec![
            order(1, "2024-01-01 10:00", "Salão", 30.0),
            order(2, "2024-01-01 20:00", "iFood", 10.0),
            order(3, "2024-01-02 12:00", "Salão", 20.0),
        ];

        let summary = SalesSummary::from_orders(&orders);

        assert_eq!(summary.net_total, 60.0);
        assert_eq!(summary.gross_total, 63.0);
        assert_eq!(summary.order_count, 3);
        assert_eq!(summary.average_ticket, 20.0);
        assert_eq!(summary.daily.len(), 2);
        assert_eq!(summary.daily[0].total_amount, 40.0);

        assert_eq!(summary.channels[0].channel, "Salão");
        assert_eq!(summary.channels[0].orders, 2);
        assert!((summary.channels[0].share - 50.0 / 60.0).abs() < 1e-9);
        assert_eq!(summary.channels[1].channel, "iFood");
    }

    #[test]
    fn test_empty_summary() {
        let summary = SalesSummary::from_orders(&[]);

        assert!(summary.is_empty());
        assert_eq!(summary.average_ticket, 0.0);
        assert!(summary.daily.is_empty());
        assert!(summary.channels.is_empty());
    }
}
