//! Worker pay and order margin: commission schemes, the payroll pass that
//! keeps payment records current, deductions, and the partner margin split.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use lcrm_core::{Deduction, Order, OrderStatus, Payment, Role, Worker};
use lcrm_storage::{CrmStore, StoreError, UpsertOutcome};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

mod margin;

pub use margin::{
    margin_breakdown, margin_recipients, spent_by, split_margin, MarginBreakdown, PartnerShare,
};

pub const CRATE_NAME: &str = "lcrm-payroll";

const PERCENT_KEYS: [&str; 2] = ["percent", "процент"];
const LINEAR_KEYS: [&str; 3] = ["linear", "manual", "погон"];
const AREA_KEYS: [&str; 4] = ["area", "м²", "sq", "метр"];

#[derive(Debug, Error)]
pub enum PayrollError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("deduction must be positive, got {0}")]
    NonPositiveDeduction(Decimal),
    #[error("deduction {amount} exceeds remaining payable {remaining}")]
    DeductionExceedsRemaining { amount: Decimal, remaining: Decimal },
    #[error("measure cannot be negative, got {0}")]
    NegativeMeasure(Decimal),
    #[error("margin for order {0} does not fit a decimal")]
    MarginOverflow(i64),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// How a worker's pay for one order is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionScheme {
    /// contract × percentage / 100
    Percentage,
    /// rate × the measure entered by hand for the worker's role
    LinearMeasure,
    /// rate × the order's measured sheet area
    Area,
    /// Method names none of the above; pays nothing.
    Unresolved,
}

impl CommissionScheme {
    /// Matches the configured method name by case-insensitive substring;
    /// without a method a set percentage wins over a set rate.
    pub fn resolve(worker: &Worker) -> Self {
        let method = worker
            .method
            .as_deref()
            .map(|m| m.trim().to_lowercase())
            .unwrap_or_default();
        let has = |keys: &[&str]| keys.iter().any(|k| method.contains(k));

        if method.is_empty() {
            return if worker.percentage.is_some_and(|p| p > Decimal::ZERO) {
                CommissionScheme::Percentage
            } else if worker.rate_per_unit.is_some_and(|r| r > Decimal::ZERO) {
                CommissionScheme::Area
            } else {
                CommissionScheme::Unresolved
            };
        }
        if has(&PERCENT_KEYS) {
            CommissionScheme::Percentage
        } else if has(&LINEAR_KEYS) {
            CommissionScheme::LinearMeasure
        } else if has(&AREA_KEYS) {
            CommissionScheme::Area
        } else {
            CommissionScheme::Unresolved
        }
    }
}

fn positive(value: Option<Decimal>) -> Option<Decimal> {
    value.filter(|v| *v > Decimal::ZERO)
}

fn money(value: Decimal) -> Decimal {
    value.round_dp(2).max(Decimal::ZERO)
}

/// Gross pay for `worker` in `role` on `order`. Missing inputs and arithmetic
/// overflow both yield zero.
pub fn gross_pay(order: &Order, worker: &Worker, role: Role) -> Decimal {
    let scheme = CommissionScheme::resolve(worker);
    let gross = match scheme {
        CommissionScheme::Percentage => match (order.contract_amount, worker.percentage) {
            (Some(contract), Some(pct)) => contract
                .checked_mul(pct)
                .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED)),
            _ => Some(Decimal::ZERO),
        },
        CommissionScheme::LinearMeasure => {
            match (positive(worker.rate_per_unit), positive(order.slot(role).manual_measure)) {
                (Some(rate), Some(measure)) => rate.checked_mul(measure),
                _ => Some(Decimal::ZERO),
            }
        }
        CommissionScheme::Area => match (positive(worker.rate_per_unit), positive(order.measured_area)) {
            (Some(rate), Some(area)) => rate.checked_mul(area),
            _ => Some(Decimal::ZERO),
        },
        CommissionScheme::Unresolved => Some(Decimal::ZERO),
    };
    match gross {
        Some(gross) => money(gross),
        None => {
            warn!(
                order_id = order.id,
                worker_id = worker.id,
                role = %role,
                ?scheme,
                "pay calculation overflowed; treating as zero"
            );
            Decimal::ZERO
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerPay {
    pub worker_id: i64,
    pub role: Role,
    pub scheme: CommissionScheme,
    pub gross: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PayrollPassSummary {
    pub orders: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Assignments whose gross came out as zero; no new payment is written.
    pub zero: usize,
    /// Stored payments set back to zero because their pay dropped to zero or
    /// the worker no longer holds the role.
    pub cleared: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetPay {
    pub payment_id: i64,
    pub gross: Decimal,
    pub deducted: Decimal,
    pub net: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentLine {
    pub payment: Payment,
    pub client_name: String,
    pub order_status: OrderStatus,
    pub order_created_at: DateTime<Utc>,
    pub contract_amount: Option<Decimal>,
    pub deducted: Decimal,
    pub net: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerPayroll {
    pub worker: Worker,
    /// Unpaid first, then newest order first.
    pub payments: Vec<PaymentLine>,
    pub gross_total: Decimal,
    pub deducted_total: Decimal,
    pub net_total: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnpaidOrder {
    pub order_id: i64,
    pub client_name: String,
    pub order_created_at: DateTime<Utc>,
    pub total: Decimal,
    pub payments: Vec<PaymentLine>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PayrollSummary {
    /// Highest gross total first.
    pub workers: Vec<WorkerPayroll>,
    /// Newest order first.
    pub unpaid_by_order: Vec<UnpaidOrder>,
    pub gross_total: Decimal,
    pub unpaid_total: Decimal,
}

/// Payroll and margin operations over a [`CrmStore`].
#[derive(Clone)]
pub struct PayrollEngine {
    store: Arc<dyn CrmStore>,
}

impl PayrollEngine {
    pub fn new(store: Arc<dyn CrmStore>) -> Self {
        Self { store }
    }

    async fn order(&self, id: i64) -> Result<Order, PayrollError> {
        self.store
            .get_order(id)
            .await?
            .ok_or(PayrollError::NotFound { entity: "order", id })
    }

    async fn payment(&self, id: i64) -> Result<Payment, PayrollError> {
        self.store
            .get_payment(id)
            .await?
            .ok_or(PayrollError::NotFound {
                entity: "payment",
                id,
            })
    }

    /// Gross pay of every assigned worker, in role order. An assignment whose
    /// worker is gone or unreadable is skipped.
    pub async fn compute_order(&self, order: &Order) -> Vec<WorkerPay> {
        let mut pays = Vec::new();
        for (role, worker_id) in order.assignments() {
            let worker = match self.store.get_worker(worker_id).await {
                Ok(Some(worker)) => worker,
                Ok(None) => {
                    warn!(order_id = order.id, worker_id, role = %role, "assigned worker missing");
                    continue;
                }
                Err(err) => {
                    warn!(order_id = order.id, worker_id, error = %err, "worker lookup failed");
                    continue;
                }
            };
            pays.push(WorkerPay {
                worker_id,
                role,
                scheme: CommissionScheme::resolve(&worker),
                gross: gross_pay(order, &worker, role),
            });
        }
        pays
    }

    async fn clear_payment(&self, payment: &Payment) -> Result<(), PayrollError> {
        self.store
            .upsert_payment(payment.order_id, payment.worker_id, payment.role, Decimal::ZERO)
            .await?;
        info!(
            order_id = payment.order_id,
            worker_id = payment.worker_id,
            role = %payment.role,
            previous = %payment.amount,
            "payment cleared"
        );
        Ok(())
    }

    async fn write_payments(
        &self,
        order: &Order,
        summary: &mut PayrollPassSummary,
    ) -> Result<(), PayrollError> {
        let stored = self.store.payments_for_order(order.id).await?;
        let stored_for = |worker_id: i64, role: Role| {
            stored
                .iter()
                .find(|p| p.worker_id == worker_id && p.role == role && !p.amount.is_zero())
        };

        for pay in self.compute_order(order).await {
            if pay.gross <= Decimal::ZERO {
                summary.zero += 1;
                if let Some(payment) = stored_for(pay.worker_id, pay.role) {
                    self.clear_payment(payment).await?;
                    summary.cleared += 1;
                }
                continue;
            }
            let upsert = self
                .store
                .upsert_payment(order.id, pay.worker_id, pay.role, pay.gross)
                .await?;
            match upsert.outcome {
                UpsertOutcome::Created => summary.created += 1,
                UpsertOutcome::Updated => summary.updated += 1,
                UpsertOutcome::Unchanged => summary.unchanged += 1,
            }
            debug!(
                order_id = order.id,
                worker_id = pay.worker_id,
                role = %pay.role,
                gross = %pay.gross,
                outcome = ?upsert.outcome,
                "payment recomputed"
            );
        }

        let assignments = order.assignments();
        for payment in stored
            .iter()
            .filter(|p| !p.amount.is_zero() && !assignments.contains(&(p.role, p.worker_id)))
        {
            self.clear_payment(payment).await?;
            summary.cleared += 1;
        }
        summary.orders += 1;
        Ok(())
    }

    /// Recomputes and upserts payments for every order. A failing order is
    /// logged and skipped.
    pub async fn run_pass(&self) -> Result<PayrollPassSummary, PayrollError> {
        let mut summary = PayrollPassSummary::default();
        for order in self.store.list_orders().await? {
            if let Err(err) = self.write_payments(&order, &mut summary).await {
                warn!(order_id = order.id, error = %err, "payroll for order failed");
            }
        }
        info!(
            orders = summary.orders,
            created = summary.created,
            updated = summary.updated,
            unchanged = summary.unchanged,
            cleared = summary.cleared,
            "payroll pass finished"
        );
        Ok(summary)
    }

    pub async fn recompute_order(&self, order_id: i64) -> Result<PayrollPassSummary, PayrollError> {
        let order = self.order(order_id).await?;
        let mut summary = PayrollPassSummary::default();
        self.write_payments(&order, &mut summary).await?;
        Ok(summary)
    }

    pub async fn net_payable(&self, payment_id: i64) -> Result<NetPay, PayrollError> {
        let payment = self.payment(payment_id).await?;
        let deducted: Decimal = self
            .store
            .deductions_for(payment_id)
            .await?
            .iter()
            .map(|d| d.amount)
            .sum();
        Ok(NetPay {
            payment_id,
            gross: payment.amount,
            deducted,
            net: payment.amount - deducted,
        })
    }

    pub async fn add_deduction(
        &self,
        payment_id: i64,
        amount: Decimal,
        reason: &str,
    ) -> Result<Deduction, PayrollError> {
        if amount <= Decimal::ZERO {
            return Err(PayrollError::NonPositiveDeduction(amount));
        }
        let net = self.net_payable(payment_id).await?;
        if amount > net.net {
            return Err(PayrollError::DeductionExceedsRemaining {
                amount,
                remaining: net.net,
            });
        }
        match self.store.insert_deduction(payment_id, amount, reason.trim()).await {
            Ok(deduction) => {
                info!(payment_id, amount = %amount, "deduction recorded");
                Ok(deduction)
            }
            // lost a race with another deduction on the same payment
            Err(StoreError::Conflict(_)) => {
                let net = self.net_payable(payment_id).await?;
                Err(PayrollError::DeductionExceedsRemaining {
                    amount,
                    remaining: net.net,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Sets the hand-entered measure for `role`; `None` clears it.
    pub async fn set_manual_measure(
        &self,
        order_id: i64,
        role: Role,
        measure: Option<Decimal>,
    ) -> Result<(), PayrollError> {
        if let Some(value) = measure.filter(|v| *v < Decimal::ZERO) {
            return Err(PayrollError::NegativeMeasure(value));
        }
        self.order(order_id).await?;
        self.store.set_manual_measure(order_id, role, measure).await?;
        Ok(())
    }

    pub async fn mark_paid(&self, payment_id: i64) -> Result<Payment, PayrollError> {
        self.payment(payment_id).await?;
        let payment = self.store.set_payment_paid(payment_id, Some(Utc::now())).await?;
        info!(payment_id, "payment marked paid");
        Ok(payment)
    }

    pub async fn mark_unpaid(&self, payment_id: i64) -> Result<Payment, PayrollError> {
        self.payment(payment_id).await?;
        let payment = self.store.set_payment_paid(payment_id, None).await?;
        info!(payment_id, "payment marked unpaid");
        Ok(payment)
    }

    pub async fn margin(&self, order_id: i64) -> Result<MarginBreakdown, PayrollError> {
        let order = self.order(order_id).await?;
        let salaries = self
            .compute_order(&order)
            .await
            .iter()
            .try_fold(Decimal::ZERO, |acc, p| acc.checked_add(p.gross))
            .ok_or(PayrollError::MarginOverflow(order_id))?;
        let components = self.store.components_for(order_id).await?;
        let expenses = self.store.expenses_for(order_id).await?;
        margin_breakdown(&order, salaries, &components, &expenses)
            .ok_or(PayrollError::MarginOverflow(order_id))
    }

    /// Per-worker view over the stored payments plus unpaid payments grouped
    /// by order. Payments whose amount is zero are left out.
    pub async fn summary(&self) -> Result<PayrollSummary, PayrollError> {
        let orders: BTreeMap<i64, Order> = self
            .store
            .list_orders()
            .await?
            .into_iter()
            .map(|o| (o.id, o))
            .collect();

        let mut by_worker: BTreeMap<i64, Vec<PaymentLine>> = BTreeMap::new();
        for payment in self.store.list_payments().await? {
            if payment.amount <= Decimal::ZERO {
                continue;
            }
            let Some(order) = orders.get(&payment.order_id) else {
                continue;
            };
            let deducted: Decimal = self
                .store
                .deductions_for(payment.id)
                .await?
                .iter()
                .map(|d| d.amount)
                .sum();
            by_worker.entry(payment.worker_id).or_default().push(PaymentLine {
                client_name: order.client_name(),
                order_status: order.status,
                order_created_at: order.created_at,
                contract_amount: order.contract_amount,
                deducted,
                net: payment.amount - deducted,
                payment,
            });
        }

        let mut workers = Vec::new();
        let mut unpaid: BTreeMap<i64, UnpaidOrder> = BTreeMap::new();
        for worker in self.store.list_workers().await? {
            let Some(mut payments) = by_worker.remove(&worker.id) else {
                continue;
            };
            payments.sort_by(|a, b| {
                a.payment
                    .is_paid
                    .cmp(&b.payment.is_paid)
                    .then(b.order_created_at.cmp(&a.order_created_at))
            });
            for line in payments.iter().filter(|l| !l.payment.is_paid) {
                let group = unpaid.entry(line.payment.order_id).or_insert_with(|| UnpaidOrder {
                    order_id: line.payment.order_id,
                    client_name: line.client_name.clone(),
                    order_created_at: line.order_created_at,
                    total: Decimal::ZERO,
                    payments: Vec::new(),
                });
                group.total += line.payment.amount;
                group.payments.push(line.clone());
            }
            workers.push(WorkerPayroll {
                gross_total: payments.iter().map(|l| l.payment.amount).sum(),
                deducted_total: payments.iter().map(|l| l.deducted).sum(),
                net_total: payments.iter().map(|l| l.net).sum(),
                worker,
                payments,
            });
        }
        workers.sort_by(|a, b| b.gross_total.cmp(&a.gross_total));

        let mut unpaid_by_order: Vec<UnpaidOrder> = unpaid.into_values().collect();
        unpaid_by_order.sort_by(|a, b| b.order_created_at.cmp(&a.order_created_at));

        Ok(PayrollSummary {
            gross_total: workers.iter().map(|w| w.gross_total).sum(),
            unpaid_total: unpaid_by_order.iter().map(|o| o.total).sum(),
            workers,
            unpaid_by_order,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use lcrm_core::{NewComponentLine, NewOrder, NewProduct, NewWorker, OrderEdit, Partner};
    use lcrm_storage::MemoryStore;

    use super::*;

    fn worker(method: Option<&str>, percentage: Option<i64>, rate: Option<i64>) -> Worker {
        NewWorker {
            name: "Test".into(),
            surname: "Worker".into(),
            profession: None,
            method: method.map(str::to_string),
            percentage: percentage.map(Decimal::from),
            rate_per_unit: rate.map(Decimal::from),
        }
        .into_worker(1)
    }

    fn order_with_contract(contract: i64) -> Order {
        let mut new = NewOrder::named("393", "");
        new.contract_amount = Some(Decimal::from(contract));
        new.into_order(1, Utc::now())
    }

    #[test]
    fn scheme_resolves_from_method_name() {
        assert_eq!(
            CommissionScheme::resolve(&worker(Some("Процент от договора"), None, None)),
            CommissionScheme::Percentage
        );
        assert_eq!(
            CommissionScheme::resolve(&worker(Some("За погонный метр"), None, Some(100))),
            CommissionScheme::LinearMeasure
        );
        assert_eq!(
            CommissionScheme::resolve(&worker(Some("За м²"), None, Some(100))),
            CommissionScheme::Area
        );
        assert_eq!(
            CommissionScheme::resolve(&worker(Some("Per-area rate"), None, Some(100))),
            CommissionScheme::Area
        );
        assert_eq!(
            CommissionScheme::resolve(&worker(Some("flat"), Some(10), None)),
            CommissionScheme::Unresolved
        );
    }

    #[test]
    fn scheme_falls_back_when_method_unset() {
        assert_eq!(
            CommissionScheme::resolve(&worker(None, Some(5), Some(100))),
            CommissionScheme::Percentage
        );
        assert_eq!(
            CommissionScheme::resolve(&worker(None, None, Some(100))),
            CommissionScheme::Area
        );
        assert_eq!(
            CommissionScheme::resolve(&worker(None, None, None)),
            CommissionScheme::Unresolved
        );
    }

    #[test]
    fn percentage_of_contract() {
        let order = order_with_contract(250_000);
        let w = worker(Some("процент"), Some(10), None);
        assert_eq!(gross_pay(&order, &w, Role::Decorator), Decimal::from(25_000));

        let no_contract = NewOrder::named("1", "").into_order(2, Utc::now());
        assert_eq!(gross_pay(&no_contract, &w, Role::Decorator), Decimal::ZERO);
    }

    #[test]
    fn linear_measure_uses_role_specific_input() {
        let mut order = order_with_contract(100_000);
        order.assembler.manual_measure = Some(Decimal::from_str("12.5").unwrap());
        let w = worker(Some("погонный метр"), None, Some(800));
        assert_eq!(gross_pay(&order, &w, Role::Assembler), Decimal::from(10_000));
        assert_eq!(gross_pay(&order, &w, Role::Decorator), Decimal::ZERO);

        let free = worker(Some("погонный метр"), None, Some(0));
        assert_eq!(gross_pay(&order, &free, Role::Assembler), Decimal::ZERO);
    }

    #[test]
    fn area_uses_measured_area() {
        let mut order = order_with_contract(100_000);
        let w = worker(Some("м²"), None, Some(300));
        assert_eq!(gross_pay(&order, &w, Role::ProjectDesigner), Decimal::ZERO);
        order.measured_area = Some(Decimal::from_str("4.25").unwrap());
        assert_eq!(gross_pay(&order, &w, Role::ProjectDesigner), Decimal::from(1275));
    }

    #[test]
    fn overflow_degrades_to_zero() {
        let mut order = order_with_contract(1);
        order.contract_amount = Some(Decimal::MAX);
        let w = worker(Some("процент"), Some(1_000_000), None);
        assert_eq!(gross_pay(&order, &w, Role::Decorator), Decimal::ZERO);
    }

    async fn seeded() -> (Arc<MemoryStore>, PayrollEngine, Order) {
        let store = Arc::new(MemoryStore::new());
        let designer = store
            .insert_worker(NewWorker {
                name: "Анна".into(),
                surname: "Иванова".into(),
                profession: Some("Дизайнер".into()),
                method: Some("Процент".into()),
                percentage: Some(Decimal::from(10)),
                rate_per_unit: None,
            })
            .await
            .unwrap();
        let assembler = store
            .insert_worker(NewWorker {
                name: "Олег".into(),
                surname: "Петров".into(),
                profession: Some("Сборщик".into()),
                method: Some("Погонный метр".into()),
                percentage: None,
                rate_per_unit: Some(Decimal::from(500)),
            })
            .await
            .unwrap();
        let mut new = NewOrder::named("393", "Гульназ");
        new.contract_amount = Some(Decimal::from(250_000));
        new.decorator_id = Some(designer.id);
        new.assembler_id = Some(assembler.id);
        let order = store.insert_order(new).await.unwrap();
        let engine = PayrollEngine::new(store.clone());
        (store, engine, order)
    }

    #[tokio::test]
    async fn pass_upserts_once_and_skips_zero_gross() {
        let (store, engine, order) = seeded().await;

        let first = engine.run_pass().await.unwrap();
        assert_eq!((first.created, first.zero), (1, 1));

        engine
            .set_manual_measure(order.id, Role::Assembler, Some(Decimal::from(10)))
            .await
            .unwrap();
        let second = engine.run_pass().await.unwrap();
        assert_eq!((second.created, second.unchanged), (1, 1));

        let third = engine.run_pass().await.unwrap();
        assert_eq!((third.created, third.updated, third.unchanged), (0, 0, 2));
        assert_eq!(store.list_payments().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn clearing_a_measure_zeroes_the_stored_payment() {
        let (store, engine, order) = seeded().await;
        engine
            .set_manual_measure(order.id, Role::Assembler, Some(Decimal::from(10)))
            .await
            .unwrap();
        engine.recompute_order(order.id).await.unwrap();
        engine
            .set_manual_measure(order.id, Role::Assembler, None)
            .await
            .unwrap();

        let pass = engine.recompute_order(order.id).await.unwrap();
        assert_eq!((pass.zero, pass.cleared, pass.unchanged), (1, 1, 1));
        let assembler = store
            .payments_for_order(order.id)
            .await
            .unwrap()
            .into_iter()
            .find(|p| p.role == Role::Assembler)
            .unwrap();
        assert_eq!(assembler.amount, Decimal::ZERO);

        let summary = engine.summary().await.unwrap();
        assert_eq!(summary.workers.len(), 1);
        assert_eq!(summary.gross_total, Decimal::from(25_000));
        assert_eq!(summary.unpaid_total, Decimal::from(25_000));

        let again = engine.recompute_order(order.id).await.unwrap();
        assert_eq!((again.zero, again.cleared), (1, 0));
    }

    #[tokio::test]
    async fn unassigned_worker_payment_is_cleared() {
        let (store, engine, order) = seeded().await;
        engine.recompute_order(order.id).await.unwrap();
        let mut edit = OrderEdit::from_order(&order);
        edit.decorator_id = None;
        store.update_order(order.id, edit).await.unwrap();

        let pass = engine.recompute_order(order.id).await.unwrap();
        assert_eq!(pass.cleared, 1);
        assert!(store
            .payments_for_order(order.id)
            .await
            .unwrap()
            .iter()
            .all(|p| p.amount.is_zero()));
        assert!(engine.summary().await.unwrap().workers.is_empty());
    }

    #[tokio::test]
    async fn deductions_are_capped_at_gross() {
        let (store, engine, _) = seeded().await;
        engine.run_pass().await.unwrap();
        let payment = store.list_payments().await.unwrap().remove(0);
        assert_eq!(payment.amount, Decimal::from(25_000));

        assert!(matches!(
            engine.add_deduction(payment.id, Decimal::ZERO, "none").await,
            Err(PayrollError::NonPositiveDeduction(_))
        ));
        engine
            .add_deduction(payment.id, Decimal::from(20_000), "advance")
            .await
            .unwrap();
        assert!(matches!(
            engine.add_deduction(payment.id, Decimal::from(5_001), "too much").await,
            Err(PayrollError::DeductionExceedsRemaining { .. })
        ));
        engine
            .add_deduction(payment.id, Decimal::from(5_000), "rest")
            .await
            .unwrap();

        let net = engine.net_payable(payment.id).await.unwrap();
        assert_eq!(net.net, Decimal::ZERO);
        assert!(matches!(
            engine.add_deduction(payment.id, Decimal::ONE, "more").await,
            Err(PayrollError::DeductionExceedsRemaining { .. })
        ));
        assert_eq!(store.deductions_for(payment.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn negative_measure_is_rejected() {
        let (store, engine, order) = seeded().await;
        let writes = store.writes();
        assert!(matches!(
            engine
                .set_manual_measure(order.id, Role::Assembler, Some(Decimal::from(-1)))
                .await,
            Err(PayrollError::NegativeMeasure(_))
        ));
        assert_eq!(store.writes(), writes);
    }

    #[tokio::test]
    async fn paid_flag_round_trip() {
        let (store, engine, _) = seeded().await;
        engine.run_pass().await.unwrap();
        let payment = store.list_payments().await.unwrap().remove(0);

        let paid = engine.mark_paid(payment.id).await.unwrap();
        assert!(paid.is_paid && paid.paid_at.is_some());
        let unpaid = engine.mark_unpaid(payment.id).await.unwrap();
        assert!(!unpaid.is_paid && unpaid.paid_at.is_none());
        assert!(matches!(
            engine.mark_paid(9_999).await,
            Err(PayrollError::NotFound { entity: "payment", .. })
        ));
    }

    #[tokio::test]
    async fn margin_includes_live_salaries_and_costs() {
        let (store, engine, order) = seeded().await;
        let board = store
            .insert_product(NewProduct {
                name: "ЛДСП".into(),
                category: Some("Плиты".into()),
                brand: None,
                our_price: Decimal::from(5_000),
            })
            .await
            .unwrap();
        store
            .add_component(
                order.id,
                NewComponentLine {
                    product_id: board.id,
                    custom_price: None,
                    quantity: 2,
                    buyer: Partner::First,
                },
            )
            .await
            .unwrap();

        let margin = engine.margin(order.id).await.unwrap();
        assert_eq!(margin.salaries, Decimal::from(25_000));
        assert_eq!(margin.total_costs, Decimal::from(35_000));
        assert_eq!(margin.margin_total, Decimal::from(215_000));
        assert_eq!(margin.share_of(Partner::First), Decimal::from(107_500));
        assert_eq!(margin.share_of(Partner::Second), Decimal::from(97_500));

        store
            .update_product(
                board.id,
                NewProduct {
                    name: "ЛДСП".into(),
                    category: None,
                    brand: None,
                    our_price: Decimal::from(6_000),
                },
            )
            .await
            .unwrap();
        let repriced = engine.margin(order.id).await.unwrap();
        assert_eq!(repriced.components_cost, Decimal::from(12_000));
    }

    #[tokio::test]
    async fn oversized_expense_is_a_margin_error() {
        let (store, engine, order) = seeded().await;
        for price in [Decimal::MAX, Decimal::from(1)] {
            store
                .add_expense(
                    order.id,
                    lcrm_core::NewMiscExpense {
                        item: "typo".into(),
                        price,
                        spent_by: Partner::Second,
                    },
                )
                .await
                .unwrap();
        }
        assert!(matches!(
            engine.margin(order.id).await,
            Err(PayrollError::MarginOverflow(id)) if id == order.id
        ));
    }

    #[tokio::test]
    async fn summary_orders_unpaid_first_and_groups_by_order() {
        let (store, engine, order) = seeded().await;
        engine
            .set_manual_measure(order.id, Role::Assembler, Some(Decimal::from(10)))
            .await
            .unwrap();
        let mut second = NewOrder::named("401", "Рустам");
        second.contract_amount = Some(Decimal::from(100_000));
        second.decorator_id = order.decorator.worker_id;
        store.insert_order(second).await.unwrap();
        engine.run_pass().await.unwrap();

        let payments = store.list_payments().await.unwrap();
        let first_order_decorator = payments
            .iter()
            .find(|p| p.order_id == order.id && p.role == Role::Decorator)
            .unwrap();
        engine.mark_paid(first_order_decorator.id).await.unwrap();

        let summary = engine.summary().await.unwrap();
        assert_eq!(summary.workers.len(), 2);
        let top = &summary.workers[0];
        assert_eq!(top.worker.name, "Анна");
        assert_eq!(top.gross_total, Decimal::from(35_000));
        assert!(!top.payments[0].payment.is_paid);
        assert!(top.payments[1].payment.is_paid);

        assert_eq!(summary.unpaid_by_order.len(), 2);
        assert_eq!(summary.unpaid_total, Decimal::from(15_000));
        let first_group = summary
            .unpaid_by_order
            .iter()
            .find(|g| g.order_id == order.id)
            .unwrap();
        assert_eq!(first_group.total, Decimal::from(5_000));
    }
}
