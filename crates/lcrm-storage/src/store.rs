use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lcrm_core::{
    ComponentLine, Deduction, IndexField, MiscExpense, NewComponentLine, NewMiscExpense, NewOrder,
    NewProduct, NewWorker, Order, OrderEdit, OrderStatus, Payment, Product, Profile, Role, Worker,
};
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid stored value: {0}")]
    Invalid(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct PaymentUpsert {
    pub payment: Payment,
    pub outcome: UpsertOutcome,
}

/// Repository over orders, workers, costs, payments and Telegram profiles.
#[async_trait]
pub trait CrmStore: Send + Sync {
    async fn insert_order(&self, new: NewOrder) -> Result<Order, StoreError>;
    async fn get_order(&self, id: i64) -> Result<Option<Order>, StoreError>;
    /// Newest first.
    async fn list_orders(&self) -> Result<Vec<Order>, StoreError>;
    /// Lowest-id order whose `field` equals `value` exactly.
    async fn find_order_by_index(
        &self,
        field: IndexField,
        value: &str,
    ) -> Result<Option<Order>, StoreError>;
    async fn update_order_sync_fields(
        &self,
        id: i64,
        status: OrderStatus,
        workshop_cost: Option<Decimal>,
    ) -> Result<(), StoreError>;
    async fn set_manual_measure(
        &self,
        id: i64,
        role: Role,
        measure: Option<Decimal>,
    ) -> Result<(), StoreError>;
    async fn update_order(&self, id: i64, edit: OrderEdit) -> Result<Order, StoreError>;
    async fn set_margin_flags(
        &self,
        id: i64,
        margin_first: bool,
        margin_second: bool,
    ) -> Result<Order, StoreError>;

    async fn insert_worker(&self, new: NewWorker) -> Result<Worker, StoreError>;
    async fn get_worker(&self, id: i64) -> Result<Option<Worker>, StoreError>;
    async fn list_workers(&self) -> Result<Vec<Worker>, StoreError>;

    async fn insert_product(&self, new: NewProduct) -> Result<Product, StoreError>;
    async fn get_product(&self, id: i64) -> Result<Option<Product>, StoreError>;
    /// By name.
    async fn list_products(&self) -> Result<Vec<Product>, StoreError>;
    async fn update_product(&self, id: i64, product: NewProduct) -> Result<Product, StoreError>;

    /// Adds the product to the order, replacing the line if it is already there.
    async fn add_component(
        &self,
        order_id: i64,
        line: NewComponentLine,
    ) -> Result<ComponentLine, StoreError>;
    /// Removes every component line of the order; returns how many went.
    async fn clear_components(&self, order_id: i64) -> Result<u64, StoreError>;
    async fn components_for(&self, order_id: i64) -> Result<Vec<ComponentLine>, StoreError>;
    async fn add_expense(
        &self,
        order_id: i64,
        expense: NewMiscExpense,
    ) -> Result<MiscExpense, StoreError>;
    async fn expenses_for(&self, order_id: i64) -> Result<Vec<MiscExpense>, StoreError>;

    /// Create or update in place the payment keyed by (order, worker, role).
    async fn upsert_payment(
        &self,
        order_id: i64,
        worker_id: i64,
        role: Role,
        amount: Decimal,
    ) -> Result<PaymentUpsert, StoreError>;
    async fn get_payment(&self, id: i64) -> Result<Option<Payment>, StoreError>;
    async fn payments_for_order(&self, order_id: i64) -> Result<Vec<Payment>, StoreError>;
    async fn list_payments(&self) -> Result<Vec<Payment>, StoreError>;
    /// `Some(ts)` marks the payment paid at `ts`, `None` marks it unpaid.
    async fn set_payment_paid(
        &self,
        id: i64,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<Payment, StoreError>;
    async fn deductions_for(&self, payment_id: i64) -> Result<Vec<Deduction>, StoreError>;
    /// Fails with `Conflict` when the deduction would push the total past the
    /// payment's gross amount.
    async fn insert_deduction(
        &self,
        payment_id: i64,
        amount: Decimal,
        reason: &str,
    ) -> Result<Deduction, StoreError>;

    async fn get_profile(&self, worker_id: i64) -> Result<Option<Profile>, StoreError>;
    async fn set_verification_code(
        &self,
        worker_id: i64,
        code: &str,
    ) -> Result<Profile, StoreError>;
    /// Only unverified profiles are matched.
    async fn find_profile_by_code(&self, code: &str) -> Result<Option<Profile>, StoreError>;
    async fn find_profile_by_telegram(
        &self,
        telegram_id: &str,
    ) -> Result<Option<Profile>, StoreError>;
    async fn verify_profile(
        &self,
        worker_id: i64,
        telegram_id: &str,
    ) -> Result<Profile, StoreError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    orders: Vec<Order>,
    workers: Vec<Worker>,
    products: Vec<Product>,
    components: Vec<ComponentLine>,
    expenses: Vec<MiscExpense>,
    payments: Vec<Payment>,
    deductions: Vec<Deduction>,
    profiles: Vec<Profile>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn order_mut(&mut self, id: i64) -> Result<&mut Order, StoreError> {
        self.orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| StoreError::not_found("order", id))
    }

    fn product(&self, id: i64) -> Result<&Product, StoreError> {
        self.products
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| StoreError::not_found("product", id))
    }

    /// Line with name and catalog price taken from the current product.
    fn priced(&self, line: &ComponentLine) -> ComponentLine {
        let mut line = line.clone();
        if let Ok(product) = self.product(line.product_id) {
            line.product_name = product.name.clone();
            line.catalog_price = product.our_price;
        }
        line
    }

    fn payment_mut(&mut self, id: i64) -> Result<&mut Payment, StoreError> {
        self.payments
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| StoreError::not_found("payment", id))
    }
}

/// Process-local store used by tests and dry runs. Counts every mutation so
/// callers can assert that a pass wrote nothing.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CrmStore for MemoryStore {
    async fn insert_order(&self, new: NewOrder) -> Result<Order, StoreError> {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        let order = new.into_order(id, Utc::now());
        state.orders.push(order.clone());
        self.record_write();
        Ok(order)
    }

    async fn get_order(&self, id: i64) -> Result<Option<Order>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        let state = self.state.lock().await;
        let mut orders = state.orders.clone();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders)
    }

    async fn find_order_by_index(
        &self,
        field: IndexField,
        value: &str,
    ) -> Result<Option<Order>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .iter()
            .filter(|o| o.index_value(field) == value)
            .min_by_key(|o| o.id)
            .cloned())
    }

    async fn update_order_sync_fields(
        &self,
        id: i64,
        status: OrderStatus,
        workshop_cost: Option<Decimal>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let order = state.order_mut(id)?;
        order.status = status;
        order.workshop_cost = workshop_cost;
        self.record_write();
        Ok(())
    }

    async fn set_manual_measure(
        &self,
        id: i64,
        role: Role,
        measure: Option<Decimal>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.order_mut(id)?.slot_mut(role).manual_measure = measure;
        self.record_write();
        Ok(())
    }

    async fn update_order(&self, id: i64, edit: OrderEdit) -> Result<Order, StoreError> {
        let mut state = self.state.lock().await;
        let order = state.order_mut(id)?;
        edit.apply(order);
        let order = order.clone();
        self.record_write();
        Ok(order)
    }

    async fn set_margin_flags(
        &self,
        id: i64,
        margin_first: bool,
        margin_second: bool,
    ) -> Result<Order, StoreError> {
        let mut state = self.state.lock().await;
        let order = state.order_mut(id)?;
        order.margin_first = margin_first;
        order.margin_second = margin_second;
        let order = order.clone();
        self.record_write();
        Ok(order)
    }

    async fn insert_worker(&self, new: NewWorker) -> Result<Worker, StoreError> {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        let worker = new.into_worker(id);
        state.workers.push(worker.clone());
        self.record_write();
        Ok(worker)
    }

    async fn get_worker(&self, id: i64) -> Result<Option<Worker>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.workers.iter().find(|w| w.id == id).cloned())
    }

    async fn list_workers(&self) -> Result<Vec<Worker>, StoreError> {
        let state = self.state.lock().await;
        let mut workers = state.workers.clone();
        workers.sort_by(|a, b| (&a.surname, &a.name).cmp(&(&b.surname, &b.name)));
        Ok(workers)
    }

    async fn insert_product(&self, new: NewProduct) -> Result<Product, StoreError> {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        let product = new.into_product(id);
        state.products.push(product.clone());
        self.record_write();
        Ok(product)
    }

    async fn get_product(&self, id: i64) -> Result<Option<Product>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.products.iter().find(|p| p.id == id).cloned())
    }

    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let state = self.state.lock().await;
        let mut products = state.products.clone();
        products.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(products)
    }

    async fn update_product(&self, id: i64, product: NewProduct) -> Result<Product, StoreError> {
        let mut state = self.state.lock().await;
        let stored = state
            .products
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| StoreError::not_found("product", id))?;
        *stored = product.into_product(id);
        let stored = stored.clone();
        self.record_write();
        Ok(stored)
    }

    async fn add_component(
        &self,
        order_id: i64,
        line: NewComponentLine,
    ) -> Result<ComponentLine, StoreError> {
        let mut state = self.state.lock().await;
        state.order_mut(order_id)?;
        let product = state.product(line.product_id)?.clone();
        let existing = state
            .components
            .iter()
            .position(|c| c.order_id == order_id && c.product_id == product.id);
        let id = match existing {
            Some(index) => state.components.remove(index).id,
            None => state.next_id(),
        };
        let component = ComponentLine {
            id,
            order_id,
            product_id: product.id,
            product_name: product.name,
            catalog_price: product.our_price,
            custom_price: line.custom_price,
            quantity: line.quantity,
            buyer: line.buyer,
        };
        state.components.push(component.clone());
        self.record_write();
        Ok(component)
    }

    async fn clear_components(&self, order_id: i64) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        state.order_mut(order_id)?;
        let before = state.components.len();
        state.components.retain(|c| c.order_id != order_id);
        let removed = (before - state.components.len()) as u64;
        if removed > 0 {
            self.record_write();
        }
        Ok(removed)
    }

    async fn components_for(&self, order_id: i64) -> Result<Vec<ComponentLine>, StoreError> {
        let state = self.state.lock().await;
        let mut lines: Vec<ComponentLine> = state
            .components
            .iter()
            .filter(|c| c.order_id == order_id)
            .map(|c| state.priced(c))
            .collect();
        lines.sort_by_key(|c| c.id);
        Ok(lines)
    }

    async fn add_expense(
        &self,
        order_id: i64,
        expense: NewMiscExpense,
    ) -> Result<MiscExpense, StoreError> {
        let mut state = self.state.lock().await;
        state.order_mut(order_id)?;
        let id = state.next_id();
        let expense = MiscExpense {
            id,
            order_id,
            item: expense.item,
            price: expense.price,
            spent_by: expense.spent_by,
            created_at: Utc::now(),
        };
        state.expenses.push(expense.clone());
        self.record_write();
        Ok(expense)
    }

    async fn expenses_for(&self, order_id: i64) -> Result<Vec<MiscExpense>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .expenses
            .iter()
            .filter(|e| e.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn upsert_payment(
        &self,
        order_id: i64,
        worker_id: i64,
        role: Role,
        amount: Decimal,
    ) -> Result<PaymentUpsert, StoreError> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state
            .payments
            .iter_mut()
            .find(|p| p.order_id == order_id && p.worker_id == worker_id && p.role == role)
        {
            if existing.amount == amount {
                return Ok(PaymentUpsert {
                    payment: existing.clone(),
                    outcome: UpsertOutcome::Unchanged,
                });
            }
            existing.amount = amount;
            let payment = existing.clone();
            self.record_write();
            return Ok(PaymentUpsert {
                payment,
                outcome: UpsertOutcome::Updated,
            });
        }

        let id = state.next_id();
        let payment = Payment {
            id,
            order_id,
            worker_id,
            role,
            amount,
            is_paid: false,
            paid_at: None,
            created_at: Utc::now(),
        };
        state.payments.push(payment.clone());
        self.record_write();
        Ok(PaymentUpsert {
            payment,
            outcome: UpsertOutcome::Created,
        })
    }

    async fn get_payment(&self, id: i64) -> Result<Option<Payment>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.payments.iter().find(|p| p.id == id).cloned())
    }

    async fn payments_for_order(&self, order_id: i64) -> Result<Vec<Payment>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .payments
            .iter()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn list_payments(&self) -> Result<Vec<Payment>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.payments.clone())
    }

    async fn set_payment_paid(
        &self,
        id: i64,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<Payment, StoreError> {
        let mut state = self.state.lock().await;
        let payment = state.payment_mut(id)?;
        payment.is_paid = paid_at.is_some();
        payment.paid_at = paid_at;
        let payment = payment.clone();
        self.record_write();
        Ok(payment)
    }

    async fn deductions_for(&self, payment_id: i64) -> Result<Vec<Deduction>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .deductions
            .iter()
            .filter(|d| d.payment_id == payment_id)
            .cloned()
            .collect())
    }

    async fn insert_deduction(
        &self,
        payment_id: i64,
        amount: Decimal,
        reason: &str,
    ) -> Result<Deduction, StoreError> {
        let mut state = self.state.lock().await;
        let gross = state.payment_mut(payment_id)?.amount;
        let applied: Decimal = state
            .deductions
            .iter()
            .filter(|d| d.payment_id == payment_id)
            .map(|d| d.amount)
            .sum();
        if applied + amount > gross {
            return Err(StoreError::Conflict(format!(
                "deductions for payment {payment_id} would exceed gross {gross}"
            )));
        }
        let id = state.next_id();
        let deduction = Deduction {
            id,
            payment_id,
            amount,
            reason: reason.to_string(),
            created_at: Utc::now(),
        };
        state.deductions.push(deduction.clone());
        self.record_write();
        Ok(deduction)
    }

    async fn get_profile(&self, worker_id: i64) -> Result<Option<Profile>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .profiles
            .iter()
            .find(|p| p.worker_id == worker_id)
            .cloned())
    }

    async fn set_verification_code(
        &self,
        worker_id: i64,
        code: &str,
    ) -> Result<Profile, StoreError> {
        let mut state = self.state.lock().await;
        if !state.workers.iter().any(|w| w.id == worker_id) {
            return Err(StoreError::not_found("worker", worker_id));
        }
        let profile = match state.profiles.iter_mut().find(|p| p.worker_id == worker_id) {
            Some(profile) => {
                profile.verification_code = Some(code.to_string());
                profile.telegram_verified = false;
                profile.clone()
            }
            None => {
                let profile = Profile {
                    worker_id,
                    telegram_id: None,
                    telegram_verified: false,
                    verification_code: Some(code.to_string()),
                };
                state.profiles.push(profile.clone());
                profile
            }
        };
        self.record_write();
        Ok(profile)
    }

    async fn find_profile_by_code(&self, code: &str) -> Result<Option<Profile>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .profiles
            .iter()
            .find(|p| !p.telegram_verified && p.verification_code.as_deref() == Some(code))
            .cloned())
    }

    async fn find_profile_by_telegram(
        &self,
        telegram_id: &str,
    ) -> Result<Option<Profile>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .profiles
            .iter()
            .find(|p| p.telegram_id.as_deref() == Some(telegram_id))
            .cloned())
    }

    async fn verify_profile(
        &self,
        worker_id: i64,
        telegram_id: &str,
    ) -> Result<Profile, StoreError> {
        let mut state = self.state.lock().await;
        // a chat id links to at most one worker
        for other in state.profiles.iter_mut() {
            if other.worker_id != worker_id && other.telegram_id.as_deref() == Some(telegram_id) {
                other.telegram_id = None;
                other.telegram_verified = false;
            }
        }
        let profile = state
            .profiles
            .iter_mut()
            .find(|p| p.worker_id == worker_id)
            .ok_or_else(|| StoreError::not_found("profile", worker_id))?;
        profile.telegram_id = Some(telegram_id.to_string());
        profile.telegram_verified = true;
        profile.verification_code = None;
        let profile = profile.clone();
        self.record_write();
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn payment_upsert_updates_in_place() {
        let store = MemoryStore::new();
        let first = store
            .upsert_payment(1, 2, Role::Assembler, Decimal::from(100))
            .await
            .unwrap();
        let same = store
            .upsert_payment(1, 2, Role::Assembler, Decimal::from(100))
            .await
            .unwrap();
        let changed = store
            .upsert_payment(1, 2, Role::Assembler, Decimal::from(150))
            .await
            .unwrap();

        assert_eq!(first.outcome, UpsertOutcome::Created);
        assert_eq!(same.outcome, UpsertOutcome::Unchanged);
        assert_eq!(changed.outcome, UpsertOutcome::Updated);
        assert_eq!(first.payment.id, changed.payment.id);
        assert_eq!(store.list_payments().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn index_lookup_prefers_lowest_id() {
        let store = MemoryStore::new();
        let a = store.insert_order(NewOrder::named("393", "A")).await.unwrap();
        store.insert_order(NewOrder::named("393", "B")).await.unwrap();
        let found = store
            .find_order_by_index(IndexField::FirstName, "393")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, a.id);
        assert!(store
            .find_order_by_index(IndexField::LastName, "393")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn deductions_cannot_exceed_gross() {
        let store = MemoryStore::new();
        let payment = store
            .upsert_payment(1, 2, Role::Decorator, Decimal::from(1000))
            .await
            .unwrap()
            .payment;
        store
            .insert_deduction(payment.id, Decimal::from(1000), "advance")
            .await
            .unwrap();
        let err = store
            .insert_deduction(payment.id, Decimal::from(1), "extra")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.deductions_for(payment.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn verification_moves_chat_id_to_new_worker() {
        let store = MemoryStore::new();
        let w1 = store.insert_worker(worker("Ann")).await.unwrap();
        let w2 = store.insert_worker(worker("Bob")).await.unwrap();
        store.set_verification_code(w1.id, "111111").await.unwrap();
        store.verify_profile(w1.id, "42").await.unwrap();
        store.set_verification_code(w2.id, "222222").await.unwrap();
        store.verify_profile(w2.id, "42").await.unwrap();

        let linked = store.find_profile_by_telegram("42").await.unwrap().unwrap();
        assert_eq!(linked.worker_id, w2.id);
        assert!(store.find_profile_by_code("222222").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn components_follow_the_catalog_and_replace_per_product() {
        let store = MemoryStore::new();
        let order = store.insert_order(NewOrder::named("393", "")).await.unwrap();
        let hinge = store.insert_product(product("Hinge", 120)).await.unwrap();

        let first = store
            .add_component(order.id, line(hinge.id, 2, None))
            .await
            .unwrap();
        let replaced = store
            .add_component(order.id, line(hinge.id, 5, Some(100)))
            .await
            .unwrap();
        assert_eq!(first.id, replaced.id);

        store
            .update_product(hinge.id, product("Soft-close hinge", 150))
            .await
            .unwrap();
        let lines = store.components_for(order.id).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 5);
        assert_eq!(lines[0].product_name, "Soft-close hinge");
        assert_eq!(lines[0].catalog_price, Decimal::from(150));
        assert_eq!(lines[0].unit_price(), Decimal::from(100));

        let missing = store.add_component(order.id, line(999, 1, None)).await.unwrap_err();
        assert!(matches!(missing, StoreError::NotFound { entity: "product", .. }));

        assert_eq!(store.clear_components(order.id).await.unwrap(), 1);
        assert!(store.components_for(order.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn order_edit_and_margin_flags() {
        let store = MemoryStore::new();
        let order = store.insert_order(NewOrder::named("393", "")).await.unwrap();
        let mut edit = OrderEdit::from_order(&order);
        edit.contract_amount = Some(Decimal::from(90_000));
        edit.status = OrderStatus::BeingCut;
        let edited = store.update_order(order.id, edit).await.unwrap();
        assert_eq!(edited.contract_amount, Some(Decimal::from(90_000)));
        assert_eq!(edited.status, OrderStatus::BeingCut);

        let flagged = store.set_margin_flags(order.id, false, true).await.unwrap();
        assert!(!flagged.margin_first && flagged.margin_second);
        assert!(matches!(
            store.set_margin_flags(999, true, true).await,
            Err(StoreError::NotFound { entity: "order", .. })
        ));
    }

    fn product(name: &str, price: i64) -> NewProduct {
        NewProduct {
            name: name.to_string(),
            category: Some("Hinges".into()),
            brand: None,
            our_price: Decimal::from(price),
        }
    }

    fn line(product_id: i64, quantity: i32, custom_price: Option<i64>) -> NewComponentLine {
        NewComponentLine {
            product_id,
            custom_price: custom_price.map(Decimal::from),
            quantity,
            buyer: lcrm_core::Partner::First,
        }
    }

    fn worker(name: &str) -> NewWorker {
        NewWorker {
            name: name.to_string(),
            surname: String::new(),
            profession: None,
            method: None,
            percentage: None,
            rate_per_unit: None,
        }
    }
}
