use lcrm_core::{ComponentLine, MiscExpense, Order, Partner};
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartnerShare {
    pub partner: Partner,
    /// Components bought plus expenses logged by this partner.
    pub spent: Decimal,
    /// Zero for a partner not flagged as a recipient.
    pub share: Decimal,
    pub recipient: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarginBreakdown {
    pub order_id: i64,
    pub contract_amount: Decimal,
    pub components_cost: Decimal,
    pub misc_expenses: Decimal,
    pub salaries: Decimal,
    pub delivery_cost: Decimal,
    pub workshop_cost: Decimal,
    pub total_costs: Decimal,
    pub margin_total: Decimal,
    pub per_head: Decimal,
    pub shares: Vec<PartnerShare>,
}

impl MarginBreakdown {
    pub fn share_of(&self, partner: Partner) -> Decimal {
        self.shares
            .iter()
            .find(|s| s.partner == partner)
            .map_or(Decimal::ZERO, |s| s.share)
    }
}

/// Partners flagged on the order, or both when neither is.
pub fn margin_recipients(order: &Order) -> Vec<Partner> {
    let flagged: Vec<Partner> = Partner::ALL
        .into_iter()
        .filter(|p| match p {
            Partner::First => order.margin_first,
            Partner::Second => order.margin_second,
        })
        .collect();
    if flagged.is_empty() {
        Partner::ALL.to_vec()
    } else {
        flagged
    }
}

fn checked_sum(values: impl IntoIterator<Item = Option<Decimal>>) -> Option<Decimal> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v?))
}

/// Components bought plus expenses logged by `partner`; `None` on overflow.
pub fn spent_by(
    partner: Partner,
    components: &[ComponentLine],
    expenses: &[MiscExpense],
) -> Option<Decimal> {
    let bought = checked_sum(
        components
            .iter()
            .filter(|c| c.buyer == partner)
            .map(ComponentLine::line_total),
    )?;
    let logged = checked_sum(
        expenses
            .iter()
            .filter(|e| e.spent_by == partner)
            .map(|e| Some(e.price)),
    )?;
    bought.checked_add(logged)
}

/// Splits `margin_total` evenly across `recipients`, then takes the *other*
/// partner's own spending off each recipient's share. `None` on overflow.
pub fn split_margin(
    margin_total: Decimal,
    recipients: &[Partner],
    spent: impl Fn(Partner) -> Decimal,
) -> Option<(Decimal, Vec<PartnerShare>)> {
    let per_head = if recipients.is_empty() {
        Decimal::ZERO
    } else {
        margin_total.checked_div(Decimal::from(recipients.len()))?
    };
    let shares = Partner::ALL
        .into_iter()
        .map(|partner| {
            let recipient = recipients.contains(&partner);
            let share = if recipient {
                per_head.checked_sub(spent(partner.other()))?
            } else {
                Decimal::ZERO
            };
            Some(PartnerShare {
                partner,
                spent: spent(partner),
                share,
                recipient,
            })
        })
        .collect::<Option<Vec<_>>>()?;
    Some((per_head, shares))
}

/// Full margin computation for one order. `salaries` is the sum of every
/// assigned worker's gross pay. `None` when an amount overflows.
pub fn margin_breakdown(
    order: &Order,
    salaries: Decimal,
    components: &[ComponentLine],
    expenses: &[MiscExpense],
) -> Option<MarginBreakdown> {
    let components_cost = checked_sum(components.iter().map(ComponentLine::line_total))?;
    let misc_expenses = checked_sum(expenses.iter().map(|e| Some(e.price)))?;
    let delivery_cost = order.delivery_cost.unwrap_or_default();
    let workshop_cost = order.workshop_cost.unwrap_or_default();
    let total_costs = checked_sum([
        Some(components_cost),
        Some(misc_expenses),
        Some(salaries),
        Some(delivery_cost),
        Some(workshop_cost),
    ])?;

    let contract_amount = order.contract_amount.unwrap_or_default();
    let margin_total = match order.contract_amount {
        Some(contract) if !contract.is_zero() => contract.checked_sub(total_costs)?,
        _ => Decimal::ZERO,
    };

    let first = spent_by(Partner::First, components, expenses)?;
    let second = spent_by(Partner::Second, components, expenses)?;
    let recipients = margin_recipients(order);
    let (per_head, shares) = split_margin(margin_total, &recipients, |partner| match partner {
        Partner::First => first,
        Partner::Second => second,
    })?;

    Some(MarginBreakdown {
        order_id: order.id,
        contract_amount,
        components_cost,
        misc_expenses,
        salaries,
        delivery_cost,
        workshop_cost,
        total_costs,
        margin_total,
        per_head,
        shares,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use lcrm_core::NewOrder;

    use super::*;

    fn spent_nothing(_: Partner) -> Decimal {
        Decimal::ZERO
    }

    #[test]
    fn even_split_without_spending() {
        let (per_head, shares) =
            split_margin(Decimal::from(10000), &Partner::ALL, spent_nothing).unwrap();
        assert_eq!(per_head, Decimal::from(5000));
        assert!(shares.iter().all(|s| s.share == Decimal::from(5000)));
    }

    #[test]
    fn spending_reduces_the_other_partners_share() {
        let (_, shares) = split_margin(Decimal::from(10000), &Partner::ALL, |p| match p {
            Partner::First => Decimal::from(2000),
            Partner::Second => Decimal::ZERO,
        })
        .unwrap();
        assert_eq!(shares[0].partner, Partner::First);
        assert_eq!(shares[0].share, Decimal::from(5000));
        assert_eq!(shares[1].share, Decimal::from(3000));
    }

    #[test]
    fn single_recipient_takes_whole_margin() {
        let (per_head, shares) = split_margin(Decimal::from(9000), &[Partner::Second], spent_nothing).unwrap();
        assert_eq!(per_head, Decimal::from(9000));
        assert_eq!(shares[0].share, Decimal::ZERO);
        assert!(!shares[0].recipient);
        assert_eq!(shares[1].share, Decimal::from(9000));
    }

    #[test]
    fn no_flags_means_both_partners() {
        let mut new = NewOrder::named("1", "");
        new.margin_first = false;
        new.margin_second = false;
        let order = new.into_order(1, Utc::now());
        assert_eq!(margin_recipients(&order), Partner::ALL.to_vec());
    }

    #[test]
    fn breakdown_sums_every_cost() {
        let mut new = NewOrder::named("1", "");
        new.contract_amount = Some(Decimal::from(100_000));
        new.delivery_cost = Some(Decimal::from(3000));
        new.workshop_cost = Some(Decimal::from(7000));
        let order = new.into_order(1, Utc::now());
        let components = vec![ComponentLine {
            id: 1,
            order_id: 1,
            product_id: 3,
            product_name: "hinges".into(),
            catalog_price: Decimal::from(500),
            custom_price: None,
            quantity: 4,
            buyer: Partner::First,
        }];
        let expenses = vec![MiscExpense {
            id: 2,
            order_id: 1,
            item: "taxi".into(),
            price: Decimal::from(1000),
            spent_by: Partner::Second,
            created_at: Utc::now(),
        }];

        let breakdown =
            margin_breakdown(&order, Decimal::from(20000), &components, &expenses).unwrap();
        assert_eq!(breakdown.components_cost, Decimal::from(2000));
        assert_eq!(breakdown.total_costs, Decimal::from(33000));
        assert_eq!(breakdown.margin_total, Decimal::from(67000));
        assert_eq!(breakdown.per_head, Decimal::new(335000, 1));
        // each share drops by what the other partner spent
        assert_eq!(breakdown.share_of(Partner::First), Decimal::from(32500));
        assert_eq!(breakdown.share_of(Partner::Second), Decimal::from(31500));
    }

    #[test]
    fn no_contract_means_zero_margin() {
        let order = NewOrder::named("1", "").into_order(1, Utc::now());
        let breakdown = margin_breakdown(&order, Decimal::from(100), &[], &[]).unwrap();
        assert_eq!(breakdown.margin_total, Decimal::ZERO);
        assert_eq!(breakdown.total_costs, Decimal::from(100));
    }

    #[test]
    fn oversized_costs_give_no_breakdown() {
        let mut new = NewOrder::named("1", "");
        new.contract_amount = Some(Decimal::from(100_000));
        let order = new.into_order(1, Utc::now());
        let expenses = vec![
            MiscExpense {
                id: 1,
                order_id: 1,
                item: "typo".into(),
                price: Decimal::MAX,
                spent_by: Partner::First,
                created_at: Utc::now(),
            },
            MiscExpense {
                id: 2,
                order_id: 1,
                item: "taxi".into(),
                price: Decimal::from(1000),
                spent_by: Partner::First,
                created_at: Utc::now(),
            },
        ];
        assert!(margin_breakdown(&order, Decimal::ZERO, &[], &expenses).is_none());
        assert!(spent_by(Partner::First, &[], &expenses).is_none());
        assert_eq!(spent_by(Partner::Second, &[], &expenses), Some(Decimal::ZERO));
    }
}
