//! Report figures. Everything here is recomputed from the rows it is given,
//! never read back from earlier report state.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;
use crate::domain::aggregates::{PaymentMethod, Product, Sale, SaleStatus};
use crate::domain::value_objects::Money;

/// Per-product figures used by the product and inventory exports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductFigures {
    pub stock_value: Money,
    pub cost_value: Money,
    pub margin: Money,
    /// Margin over price, in percent, 2 dp. Zero when the price is zero.
    pub margin_pct: Decimal,
}

impl ProductFigures {
    pub fn of(product: &Product) -> Self {
        let margin = product.margin();
        let margin_pct = if product.price.is_zero() {
            Decimal::ZERO
        } else {
            (margin.amount() / product.price.amount() * Decimal::ONE_HUNDRED)
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        };
        Self { stock_value: product.stock_value(), cost_value: product.cost_value(), margin, margin_pct }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySummary {
    pub product_count: usize,
    pub units: u64,
    pub stock_value: Money,
    pub cost_value: Money,
    pub potential_margin: Money,
}

impl InventorySummary {
    pub fn of(products: &[Product]) -> Self {
        products.iter().filter(|p| p.is_active).fold(Self::default(), |mut acc, p| {
            acc.product_count += 1;
            acc.units += u64::from(p.stock);
            acc.stock_value = acc.stock_value + p.stock_value();
            acc.cost_value = acc.cost_value + p.cost_value();
            acc.potential_margin = acc.stock_value - acc.cost_value;
            acc
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopProduct {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: u32,
    pub revenue: Money,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesSummary {
    pub count: usize,
    pub units: u32,
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
    pub average_ticket: Money,
    pub by_payment: BTreeMap<PaymentMethod, Money>,
    pub top_products: Vec<TopProduct>,
}

impl SalesSummary {
    pub const TOP_PRODUCTS: usize = 10;

    /// Cancelled sales are left out.
    pub fn of(sales: &[Sale]) -> Self {
        let mut summary = Self::default();
        let mut products: HashMap<Uuid, TopProduct> = HashMap::new();
        for sale in sales.iter().filter(|s| s.status == SaleStatus::Completed) {
            summary.count += 1;
            summary.subtotal = summary.subtotal + sale.subtotal;
            summary.tax = summary.tax + sale.tax;
            summary.total = summary.total + sale.total;
            let slot = summary.by_payment.entry(sale.payment_method).or_default();
            *slot = *slot + sale.total;
            for item in &sale.items {
                summary.units += item.quantity;
                let entry = products.entry(item.product_id).or_insert_with(|| TopProduct {
                    product_id: item.product_id,
                    name: item.product_name.clone().unwrap_or_else(|| item.product_id.to_string()),
                    quantity: 0,
                    revenue: Money::ZERO,
                });
                entry.quantity += item.quantity;
                entry.revenue = entry.revenue + item.line_total;
            }
        }
        if summary.count > 0 {
            summary.average_ticket = Money::new(summary.total.amount() / Decimal::from(summary.count as u64)).round();
        }
        let mut top: Vec<TopProduct> = products.into_values().collect();
        top.sort_by(|a, b| b.quantity.cmp(&a.quantity).then_with(|| b.revenue.cmp(&a.revenue)).then_with(|| a.name.cmp(&b.name)));
        top.truncate(Self::TOP_PRODUCTS);
        summary.top_products = top;
        summary
    }
}

/// Result of the `get_dashboard_stats` remote procedure.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    #[serde(default)] pub today_sales_total: Money,
    #[serde(default)] pub today_sales_count: u64,
    #[serde(default)] pub month_sales_total: Money,
    #[serde(default)] pub month_sales_count: u64,
    #[serde(default)] pub total_products: u64,
    #[serde(default)] pub low_stock_count: u64,
    #[serde(default)] pub out_of_stock_count: u64,
    #[serde(default)] pub inventory_value: Money,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DailySales {
    pub date: NaiveDate,
    pub total: Money,
    pub count: u64,
}

/// Result of the `get_sales_trend` remote procedure: the requested period
/// against the period of the same length right before it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SalesTrend {
    pub current_total: Money,
    pub previous_total: Money,
    #[serde(default)]
    pub change_pct: Option<Decimal>,
    #[serde(default)]
    pub daily: Vec<DailySales>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool { at >= self.start && at < self.end }
    pub fn previous(&self) -> DateRange { DateRange { start: self.start - (self.end - self.start), end: self.start } }
}

/// Percentage change from `previous` to `current`; `None` when there is no baseline.
pub fn change_pct(current: Money, previous: Money) -> Option<Decimal> {
    if previous.is_zero() { return None; }
    Some(((current.amount() - previous.amount()) / previous.amount() * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}

/// Builds a trend from raw sales, the same figures the remote procedure returns.
pub fn trend_of(sales: &[Sale], range: DateRange) -> SalesTrend {
    let prev = range.previous();
    let completed = || sales.iter().filter(|s| s.status == SaleStatus::Completed);
    let current_total: Money = completed().filter(|s| range.contains(s.created_at)).map(|s| s.total).sum();
    let previous_total: Money = completed().filter(|s| prev.contains(s.created_at)).map(|s| s.total).sum();
    let mut daily: BTreeMap<NaiveDate, (Money, u64)> = BTreeMap::new();
    for s in completed().filter(|s| range.contains(s.created_at)) {
        let e = daily.entry(s.created_at.date_naive()).or_insert((Money::ZERO, 0));
        e.0 = e.0 + s.total;
        e.1 += 1;
    }
    SalesTrend {
        current_total,
        previous_total,
        change_pct: change_pct(current_total, previous_total),
        daily: daily.into_iter().map(|(date, (total, count))| DailySales { date, total, count }).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::product::sample;
    use crate::domain::aggregates::SaleItem;
    use chrono::{Duration, TimeZone};

    fn sale(total_cents: i64, method: PaymentMethod, at: DateTime<Utc>, items: Vec<SaleItem>) -> Sale {
        Sale {
            id: Uuid::new_v4(), sale_number: "V-1".into(), customer_name: None, customer_email: None, customer_phone: None,
            subtotal: Money::cents(total_cents), tax: Money::ZERO, total: Money::cents(total_cents), payment_method: method,
            status: SaleStatus::Completed, notes: None, created_at: at, items,
        }
    }

    #[test]
    fn test_product_figures() {
        let p = Product { price: Money::cents(2000), cost: Money::cents(1500), ..sample("A", 3, 1) };
        let f = ProductFigures::of(&p);
        assert_eq!(f.stock_value, Money::cents(6000));
        assert_eq!(f.margin, Money::cents(500));
        assert_eq!(f.margin_pct, Decimal::new(25, 0));
        let free = Product { price: Money::ZERO, ..sample("B", 1, 1) };
        assert_eq!(ProductFigures::of(&free).margin_pct, Decimal::ZERO);
    }

    #[test]
    fn test_inventory_summary_ignores_inactive() {
        let mut off = sample("OFF", 100, 1);
        off.is_active = false;
        let s = InventorySummary::of(&[sample("A", 2, 1), sample("B", 3, 1), off]);
        assert_eq!(s.product_count, 2);
        assert_eq!(s.units, 5);
        assert_eq!(s.stock_value, Money::cents(5000));
        assert_eq!(s.potential_margin, Money::cents(2000));
    }

    #[test]
    fn test_sales_summary() {
        let pid = Uuid::new_v4();
        let item = |q| SaleItem { id: None, product_id: pid, product_name: Some("Tee".into()), quantity: q, unit_price: Money::cents(100), line_total: Money::cents(100) * q, size: None, color: None };
        let now = Utc::now();
        let mut cancelled = sale(9999, PaymentMethod::Cash, now, vec![]);
        cancelled.status = SaleStatus::Cancelled;
        let s = SalesSummary::of(&[sale(300, PaymentMethod::Cash, now, vec![item(3)]), sale(100, PaymentMethod::Card, now, vec![item(1)]), cancelled]);
        assert_eq!(s.count, 2);
        assert_eq!(s.units, 4);
        assert_eq!(s.total, Money::cents(400));
        assert_eq!(s.average_ticket, Money::cents(200));
        assert_eq!(s.by_payment.get(&PaymentMethod::Cash), Some(&Money::cents(300)));
        assert_eq!(s.top_products[0].quantity, 4);
    }

    #[test]
    fn test_trend_against_previous_period() {
        let start = Utc.with_ymd_and_hms(2024, 3, 8, 0, 0, 0).unwrap();
        let range = DateRange { start, end: start + Duration::days(7) };
        let sales = vec![
            sale(1000, PaymentMethod::Cash, start + Duration::hours(5), vec![]),
            sale(500, PaymentMethod::Cash, start + Duration::days(1), vec![]),
            sale(1000, PaymentMethod::Cash, start - Duration::days(2), vec![]),
        ];
        let t = trend_of(&sales, range);
        assert_eq!(t.current_total, Money::cents(1500));
        assert_eq!(t.previous_total, Money::cents(1000));
        assert_eq!(t.change_pct, Some(Decimal::new(50, 0)));
        assert_eq!(t.daily.len(), 2);
        assert_eq!(change_pct(Money::cents(5), Money::ZERO), None);
    }
}
