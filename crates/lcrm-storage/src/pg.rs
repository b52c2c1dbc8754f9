use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lcrm_core::{
    ComponentLine, Deduction, IndexField, MiscExpense, NewComponentLine, NewMiscExpense, NewOrder,
    NewProduct, NewWorker, Order, OrderEdit, OrderStatus, Payment, Product, Profile, Role,
    RoleSlot, Worker,
};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use crate::store::{CrmStore, PaymentUpsert, StoreError, UpsertOutcome};

const ORDER_COLUMNS: &str = r#"
    id, created_at, first_name, last_name, phone, address, status,
    contract_amount, advance,
    project_designer_id, project_designer_measure,
    decorator_id, decorator_measure,
    assembler_id, assembler_measure,
    measured_area, margin_first, margin_second, delivery_cost, workshop_cost
"#;

const COMPONENT_SELECT: &str = r#"
    SELECT c.id, c.order_id, c.product_id, p.name AS product_name, p.our_price AS catalog_price,
           c.custom_price, c.quantity, c.buyer
      FROM component_lines c
      JOIN products p ON p.id = c.product_id
"#;

const PAYMENT_COLUMNS: &str =
    "id, order_id, worker_id, role, amount, is_paid, paid_at, created_at";

/// Postgres-backed store. Schema lives in `migrations/`.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// A foreign-key failure means the referenced row is gone; anything else
/// stays a database error.
fn missing_reference(err: sqlx::Error, entity: &'static str, id: i64) -> StoreError {
    let foreign_key =
        matches!(&err, sqlx::Error::Database(db) if db.is_foreign_key_violation());
    if foreign_key {
        StoreError::not_found(entity, id)
    } else {
        StoreError::Database(err)
    }
}

fn parse_enum<T: std::str::FromStr>(raw: String) -> Result<T, StoreError>
where
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| StoreError::Invalid(e.to_string()))
}

fn order_from_row(row: &PgRow) -> Result<Order, StoreError> {
    Ok(Order {
        id: row.try_get("id")?,
        created_at: row.try_get("created_at")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        phone: row.try_get("phone")?,
        address: row.try_get("address")?,
        status: parse_enum(row.try_get("status")?)?,
        contract_amount: row.try_get("contract_amount")?,
        advance: row.try_get("advance")?,
        project_designer: RoleSlot {
            worker_id: row.try_get("project_designer_id")?,
            manual_measure: row.try_get("project_designer_measure")?,
        },
        decorator: RoleSlot {
            worker_id: row.try_get("decorator_id")?,
            manual_measure: row.try_get("decorator_measure")?,
        },
        assembler: RoleSlot {
            worker_id: row.try_get("assembler_id")?,
            manual_measure: row.try_get("assembler_measure")?,
        },
        measured_area: row.try_get("measured_area")?,
        margin_first: row.try_get("margin_first")?,
        margin_second: row.try_get("margin_second")?,
        delivery_cost: row.try_get("delivery_cost")?,
        workshop_cost: row.try_get("workshop_cost")?,
    })
}

fn worker_from_row(row: &PgRow) -> Result<Worker, StoreError> {
    Ok(Worker {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        surname: row.try_get("surname")?,
        profession: row.try_get("profession")?,
        method: row.try_get("method")?,
        percentage: row.try_get("percentage")?,
        rate_per_unit: row.try_get("rate_per_unit")?,
    })
}

fn payment_from_row(row: &PgRow) -> Result<Payment, StoreError> {
    Ok(Payment {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        worker_id: row.try_get("worker_id")?,
        role: parse_enum(row.try_get("role")?)?,
        amount: row.try_get("amount")?,
        is_paid: row.try_get("is_paid")?,
        paid_at: row.try_get("paid_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn deduction_from_row(row: &PgRow) -> Result<Deduction, StoreError> {
    Ok(Deduction {
        id: row.try_get("id")?,
        payment_id: row.try_get("payment_id")?,
        amount: row.try_get("amount")?,
        reason: row.try_get("reason")?,
        created_at: row.try_get("created_at")?,
    })
}

fn component_from_row(row: &PgRow) -> Result<ComponentLine, StoreError> {
    Ok(ComponentLine {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        product_id: row.try_get("product_id")?,
        product_name: row.try_get("product_name")?,
        catalog_price: row.try_get("catalog_price")?,
        custom_price: row.try_get("custom_price")?,
        quantity: row.try_get("quantity")?,
        buyer: parse_enum(row.try_get("buyer")?)?,
    })
}

fn product_from_row(row: &PgRow) -> Result<Product, StoreError> {
    Ok(Product {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        category: row.try_get("category")?,
        brand: row.try_get("brand")?,
        our_price: row.try_get("our_price")?,
    })
}

fn expense_from_row(row: &PgRow) -> Result<MiscExpense, StoreError> {
    Ok(MiscExpense {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        item: row.try_get("item")?,
        price: row.try_get("price")?,
        spent_by: parse_enum(row.try_get("spent_by")?)?,
        created_at: row.try_get("created_at")?,
    })
}

fn profile_from_row(row: &PgRow) -> Result<Profile, StoreError> {
    Ok(Profile {
        worker_id: row.try_get("worker_id")?,
        telegram_id: row.try_get("telegram_id")?,
        telegram_verified: row.try_get("telegram_verified")?,
        verification_code: row.try_get("verification_code")?,
    })
}

fn measure_column(role: Role) -> &'static str {
    match role {
        Role::ProjectDesigner => "project_designer_measure",
        Role::Decorator => "decorator_measure",
        Role::Assembler => "assembler_measure",
    }
}

#[async_trait]
impl CrmStore for PgStore {
    async fn insert_order(&self, new: NewOrder) -> Result<Order, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO orders (
                first_name, last_name, phone, address, status, contract_amount, advance,
                project_designer_id, decorator_id, assembler_id, measured_area,
                margin_first, margin_second, delivery_cost, workshop_cost
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING {ORDER_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(&new.first_name)
            .bind(&new.last_name)
            .bind(&new.phone)
            .bind(&new.address)
            .bind(new.status.as_str())
            .bind(new.contract_amount)
            .bind(new.advance)
            .bind(new.project_designer_id)
            .bind(new.decorator_id)
            .bind(new.assembler_id)
            .bind(new.measured_area)
            .bind(new.margin_first)
            .bind(new.margin_second)
            .bind(new.delivery_cost)
            .bind(new.workshop_cost)
            .fetch_one(&self.pool)
            .await?;
        order_from_row(&row)
    }

    async fn get_order(&self, id: i64) -> Result<Option<Order>, StoreError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC, id DESC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(order_from_row).collect()
    }

    async fn find_order_by_index(
        &self,
        field: IndexField,
        value: &str,
    ) -> Result<Option<Order>, StoreError> {
        // column name comes from a closed enum, never from input
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE {} = $1 ORDER BY id LIMIT 1",
            field.as_str()
        );
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn update_order_sync_fields(
        &self,
        id: i64,
        status: OrderStatus,
        workshop_cost: Option<Decimal>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE orders SET status = $2, workshop_cost = $3 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .bind(workshop_cost)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("order", id));
        }
        Ok(())
    }

    async fn set_manual_measure(
        &self,
        id: i64,
        role: Role,
        measure: Option<Decimal>,
    ) -> Result<(), StoreError> {
        let sql = format!("UPDATE orders SET {} = $2 WHERE id = $1", measure_column(role));
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(measure)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("order", id));
        }
        Ok(())
    }

    async fn update_order(&self, id: i64, edit: OrderEdit) -> Result<Order, StoreError> {
        let sql = format!(
            r#"
            UPDATE orders
               SET first_name = $2, last_name = $3, phone = $4, address = $5, status = $6,
                   contract_amount = $7, advance = $8,
                   project_designer_id = $9, decorator_id = $10, assembler_id = $11,
                   measured_area = $12, delivery_cost = $13, workshop_cost = $14
             WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(&edit.first_name)
            .bind(&edit.last_name)
            .bind(&edit.phone)
            .bind(&edit.address)
            .bind(edit.status.as_str())
            .bind(edit.contract_amount)
            .bind(edit.advance)
            .bind(edit.project_designer_id)
            .bind(edit.decorator_id)
            .bind(edit.assembler_id)
            .bind(edit.measured_area)
            .bind(edit.delivery_cost)
            .bind(edit.workshop_cost)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("order", id))?;
        order_from_row(&row)
    }

    async fn set_margin_flags(
        &self,
        id: i64,
        margin_first: bool,
        margin_second: bool,
    ) -> Result<Order, StoreError> {
        let sql = format!(
            "UPDATE orders SET margin_first = $2, margin_second = $3 WHERE id = $1 RETURNING {ORDER_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(margin_first)
            .bind(margin_second)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("order", id))?;
        order_from_row(&row)
    }

    async fn insert_worker(&self, new: NewWorker) -> Result<Worker, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO workers (name, surname, profession, method, percentage, rate_per_unit)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, name, surname, profession, method, percentage, rate_per_unit
            "#,
        )
        .bind(&new.name)
        .bind(&new.surname)
        .bind(&new.profession)
        .bind(&new.method)
        .bind(new.percentage)
        .bind(new.rate_per_unit)
        .fetch_one(&self.pool)
        .await?;
        worker_from_row(&row)
    }

    async fn get_worker(&self, id: i64) -> Result<Option<Worker>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, surname, profession, method, percentage, rate_per_unit FROM workers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(worker_from_row).transpose()
    }

    async fn list_workers(&self) -> Result<Vec<Worker>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, name, surname, profession, method, percentage, rate_per_unit FROM workers ORDER BY surname, name",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(worker_from_row).collect()
    }

    async fn insert_product(&self, new: NewProduct) -> Result<Product, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO products (name, category, brand, our_price)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, category, brand, our_price
            "#,
        )
        .bind(&new.name)
        .bind(&new.category)
        .bind(&new.brand)
        .bind(new.our_price)
        .fetch_one(&self.pool)
        .await?;
        product_from_row(&row)
    }

    async fn get_product(&self, id: i64) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query("SELECT id, name, category, brand, our_price FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(product_from_row).transpose()
    }

    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query("SELECT id, name, category, brand, our_price FROM products ORDER BY name, id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(product_from_row).collect()
    }

    async fn update_product(&self, id: i64, product: NewProduct) -> Result<Product, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE products
               SET name = $2, category = $3, brand = $4, our_price = $5
             WHERE id = $1
            RETURNING id, name, category, brand, our_price
            "#,
        )
        .bind(id)
        .bind(&product.name)
        .bind(&product.category)
        .bind(&product.brand)
        .bind(product.our_price)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("product", id))?;
        product_from_row(&row)
    }

    async fn add_component(
        &self,
        order_id: i64,
        line: NewComponentLine,
    ) -> Result<ComponentLine, StoreError> {
        if self.get_order(order_id).await?.is_none() {
            return Err(StoreError::not_found("order", order_id));
        }
        let id: i64 = sqlx::query(
            r#"
            INSERT INTO component_lines (order_id, product_id, custom_price, quantity, buyer)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (order_id, product_id) DO UPDATE
               SET custom_price = EXCLUDED.custom_price,
                   quantity = EXCLUDED.quantity,
                   buyer = EXCLUDED.buyer
            RETURNING id
            "#,
        )
        .bind(order_id)
        .bind(line.product_id)
        .bind(line.custom_price)
        .bind(line.quantity)
        .bind(line.buyer.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|err| missing_reference(err, "product", line.product_id))?
        .try_get("id")?;

        let sql = format!("{COMPONENT_SELECT} WHERE c.id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_one(&self.pool).await?;
        component_from_row(&row)
    }

    async fn clear_components(&self, order_id: i64) -> Result<u64, StoreError> {
        if self.get_order(order_id).await?.is_none() {
            return Err(StoreError::not_found("order", order_id));
        }
        let result = sqlx::query("DELETE FROM component_lines WHERE order_id = $1")
            .bind(order_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn components_for(&self, order_id: i64) -> Result<Vec<ComponentLine>, StoreError> {
        let sql = format!("{COMPONENT_SELECT} WHERE c.order_id = $1 ORDER BY c.id");
        let rows = sqlx::query(&sql).bind(order_id).fetch_all(&self.pool).await?;
        rows.iter().map(component_from_row).collect()
    }

    async fn add_expense(
        &self,
        order_id: i64,
        expense: NewMiscExpense,
    ) -> Result<MiscExpense, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO misc_expenses (order_id, item, price, spent_by)
            VALUES ($1, $2, $3, $4)
            RETURNING id, order_id, item, price, spent_by, created_at
            "#,
        )
        .bind(order_id)
        .bind(&expense.item)
        .bind(expense.price)
        .bind(expense.spent_by.as_str())
        .fetch_one(&self.pool)
        .await?;
        expense_from_row(&row)
    }

    async fn expenses_for(&self, order_id: i64) -> Result<Vec<MiscExpense>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, item, price, spent_by, created_at
              FROM misc_expenses
             WHERE order_id = $1
             ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(expense_from_row).collect()
    }

    async fn upsert_payment(
        &self,
        order_id: i64,
        worker_id: i64,
        role: Role,
        amount: Decimal,
    ) -> Result<PaymentUpsert, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO payments (order_id, worker_id, role, amount)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (order_id, worker_id, role) DO UPDATE
               SET amount = EXCLUDED.amount,
                   updated_at = NOW()
             WHERE payments.amount IS DISTINCT FROM EXCLUDED.amount
            RETURNING {PAYMENT_COLUMNS}, (xmax = 0) AS inserted
            "#
        );
        let written = sqlx::query(&sql)
            .bind(order_id)
            .bind(worker_id)
            .bind(role.as_str())
            .bind(amount)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = written {
            let inserted: bool = row.try_get("inserted")?;
            return Ok(PaymentUpsert {
                payment: payment_from_row(&row)?,
                outcome: if inserted {
                    UpsertOutcome::Created
                } else {
                    UpsertOutcome::Updated
                },
            });
        }

        let sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1 AND worker_id = $2 AND role = $3"
        );
        let row = sqlx::query(&sql)
            .bind(order_id)
            .bind(worker_id)
            .bind(role.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(PaymentUpsert {
            payment: payment_from_row(&row)?,
            outcome: UpsertOutcome::Unchanged,
        })
    }

    async fn get_payment(&self, id: i64) -> Result<Option<Payment>, StoreError> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(payment_from_row).transpose()
    }

    async fn payments_for_order(&self, order_id: i64) -> Result<Vec<Payment>, StoreError> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1 ORDER BY id");
        let rows = sqlx::query(&sql).bind(order_id).fetch_all(&self.pool).await?;
        rows.iter().map(payment_from_row).collect()
    }

    async fn list_payments(&self) -> Result<Vec<Payment>, StoreError> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments ORDER BY created_at DESC, id DESC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(payment_from_row).collect()
    }

    async fn set_payment_paid(
        &self,
        id: i64,
        paid_at: Option<DateTime<Utc>>,
    ) -> Result<Payment, StoreError> {
        let sql = format!(
            r#"
            UPDATE payments
               SET is_paid = $2, paid_at = $3, updated_at = NOW()
             WHERE id = $1
            RETURNING {PAYMENT_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(paid_at.is_some())
            .bind(paid_at)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("payment", id))?;
        payment_from_row(&row)
    }

    async fn deductions_for(&self, payment_id: i64) -> Result<Vec<Deduction>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, payment_id, amount, reason, created_at
              FROM deductions
             WHERE payment_id = $1
             ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(payment_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(deduction_from_row).collect()
    }

    async fn insert_deduction(
        &self,
        payment_id: i64,
        amount: Decimal,
        reason: &str,
    ) -> Result<Deduction, StoreError> {
        let mut tx = self.pool.begin().await?;

        let gross: Decimal = sqlx::query("SELECT amount FROM payments WHERE id = $1 FOR UPDATE")
            .bind(payment_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::not_found("payment", payment_id))?
            .try_get("amount")?;
        let applied: Decimal =
            sqlx::query("SELECT COALESCE(SUM(amount), 0) AS applied FROM deductions WHERE payment_id = $1")
                .bind(payment_id)
                .fetch_one(&mut *tx)
                .await?
                .try_get("applied")?;
        if applied + amount > gross {
            return Err(StoreError::Conflict(format!(
                "deductions for payment {payment_id} would exceed gross {gross}"
            )));
        }

        let row = sqlx::query(
            r#"
            INSERT INTO deductions (payment_id, amount, reason)
            VALUES ($1, $2, $3)
            RETURNING id, payment_id, amount, reason, created_at
            "#,
        )
        .bind(payment_id)
        .bind(amount)
        .bind(reason)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        deduction_from_row(&row)
    }

    async fn get_profile(&self, worker_id: i64) -> Result<Option<Profile>, StoreError> {
        let row = sqlx::query(
            "SELECT worker_id, telegram_id, telegram_verified, verification_code FROM profiles WHERE worker_id = $1",
        )
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(profile_from_row).transpose()
    }

    async fn set_verification_code(
        &self,
        worker_id: i64,
        code: &str,
    ) -> Result<Profile, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO profiles (worker_id, verification_code, telegram_verified)
            VALUES ($1, $2, FALSE)
            ON CONFLICT (worker_id) DO UPDATE
               SET verification_code = EXCLUDED.verification_code,
                   telegram_verified = FALSE
            RETURNING worker_id, telegram_id, telegram_verified, verification_code
            "#,
        )
        .bind(worker_id)
        .bind(code)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| missing_reference(err, "worker", worker_id))?;
        profile_from_row(&row)
    }

    async fn find_profile_by_code(&self, code: &str) -> Result<Option<Profile>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT worker_id, telegram_id, telegram_verified, verification_code
              FROM profiles
             WHERE verification_code = $1 AND NOT telegram_verified
             LIMIT 1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(profile_from_row).transpose()
    }

    async fn find_profile_by_telegram(
        &self,
        telegram_id: &str,
    ) -> Result<Option<Profile>, StoreError> {
        let row = sqlx::query(
            "SELECT worker_id, telegram_id, telegram_verified, verification_code FROM profiles WHERE telegram_id = $1",
        )
        .bind(telegram_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(profile_from_row).transpose()
    }

    async fn verify_profile(
        &self,
        worker_id: i64,
        telegram_id: &str,
    ) -> Result<Profile, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            UPDATE profiles
               SET telegram_id = NULL, telegram_verified = FALSE
             WHERE telegram_id = $1 AND worker_id <> $2
            "#,
        )
        .bind(telegram_id)
        .bind(worker_id)
        .execute(&mut *tx)
        .await?;
        let row = sqlx::query(
            r#"
            UPDATE profiles
               SET telegram_id = $2, telegram_verified = TRUE, verification_code = NULL
             WHERE worker_id = $1
            RETURNING worker_id, telegram_id, telegram_verified, verification_code
            "#,
        )
        .bind(worker_id)
        .bind(telegram_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::not_found("profile", worker_id))?;
        tx.commit().await?;
        profile_from_row(&row)
    }
}
