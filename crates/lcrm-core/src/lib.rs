//! Core domain model for the workshop CRM: orders, workers, payments and the
//! transient rows scraped from the external tracking dashboard.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CRATE_NAME: &str = "lcrm-core";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Production pipeline stage of an order. Any stage may follow any other;
/// transitions are driven by whatever the external dashboard reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Drafting,
    AwaitingMaterial,
    ArrivedAtShop,
    BeingCut,
    Ready,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Drafting,
        OrderStatus::AwaitingMaterial,
        OrderStatus::ArrivedAtShop,
        OrderStatus::BeingCut,
        OrderStatus::Ready,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Drafting => "drafting",
            OrderStatus::AwaitingMaterial => "awaiting_material",
            OrderStatus::ArrivedAtShop => "arrived_at_shop",
            OrderStatus::BeingCut => "being_cut",
            OrderStatus::Ready => "ready",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            OrderStatus::Drafting => "Drafting",
            OrderStatus::AwaitingMaterial => "Awaiting material",
            OrderStatus::ArrivedAtShop => "Arrived at shop",
            OrderStatus::BeingCut => "Being cut",
            OrderStatus::Ready => "Ready",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "order status",
                value: s.to_string(),
            })
    }
}

/// Role a worker can be assigned to on an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    ProjectDesigner,
    Decorator,
    Assembler,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::ProjectDesigner, Role::Decorator, Role::Assembler];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::ProjectDesigner => "project_designer",
            Role::Decorator => "decorator",
            Role::Assembler => "assembler",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::ProjectDesigner => "Project designer",
            Role::Decorator => "Decorator",
            Role::Assembler => "Assembler",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "role",
                value: s.to_string(),
            })
    }
}

/// One of the two fixed stakeholders who share an order's margin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partner {
    First,
    Second,
}

impl Partner {
    pub const ALL: [Partner; 2] = [Partner::First, Partner::Second];

    pub fn other(self) -> Partner {
        match self {
            Partner::First => Partner::Second,
            Partner::Second => Partner::First,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Partner::First => "first",
            Partner::Second => "second",
        }
    }
}

impl FromStr for Partner {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Partner::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "partner",
                value: s.to_string(),
            })
    }
}

/// Which of the two free-text order fields carries the dashboard index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IndexField {
    #[default]
    FirstName,
    LastName,
}

impl IndexField {
    pub fn alternate(self) -> IndexField {
        match self {
            IndexField::FirstName => IndexField::LastName,
            IndexField::LastName => IndexField::FirstName,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IndexField::FirstName => "first_name",
            IndexField::LastName => "last_name",
        }
    }
}

impl FromStr for IndexField {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "first_name" => Ok(IndexField::FirstName),
            "last_name" => Ok(IndexField::LastName),
            other => Err(UnknownVariant {
                kind: "index field",
                value: other.to_string(),
            }),
        }
    }
}

/// Worker assignment plus the manually entered linear measure for that role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RoleSlot {
    pub worker_id: Option<i64>,
    pub manual_measure: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub address: String,
    pub status: OrderStatus,
    pub contract_amount: Option<Decimal>,
    pub advance: Option<Decimal>,
    pub project_designer: RoleSlot,
    pub decorator: RoleSlot,
    pub assembler: RoleSlot,
    /// Total sheet area taken from uploaded measurement files.
    pub measured_area: Option<Decimal>,
    pub margin_first: bool,
    pub margin_second: bool,
    pub delivery_cost: Option<Decimal>,
    pub workshop_cost: Option<Decimal>,
}

impl Order {
    pub fn slot(&self, role: Role) -> &RoleSlot {
        match role {
            Role::ProjectDesigner => &self.project_designer,
            Role::Decorator => &self.decorator,
            Role::Assembler => &self.assembler,
        }
    }

    pub fn slot_mut(&mut self, role: Role) -> &mut RoleSlot {
        match role {
            Role::ProjectDesigner => &mut self.project_designer,
            Role::Decorator => &mut self.decorator,
            Role::Assembler => &mut self.assembler,
        }
    }

    pub fn index_value(&self, field: IndexField) -> &str {
        match field {
            IndexField::FirstName => &self.first_name,
            IndexField::LastName => &self.last_name,
        }
    }

    /// Assigned (role, worker id) pairs in role order.
    pub fn assignments(&self) -> Vec<(Role, i64)> {
        Role::ALL
            .into_iter()
            .filter_map(|role| self.slot(role).worker_id.map(|id| (role, id)))
            .collect()
    }

    pub fn client_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

/// Input for creating an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default)]
    pub contract_amount: Option<Decimal>,
    #[serde(default)]
    pub advance: Option<Decimal>,
    #[serde(default)]
    pub project_designer_id: Option<i64>,
    #[serde(default)]
    pub decorator_id: Option<i64>,
    #[serde(default)]
    pub assembler_id: Option<i64>,
    #[serde(default)]
    pub measured_area: Option<Decimal>,
    #[serde(default = "default_true")]
    pub margin_first: bool,
    #[serde(default = "default_true")]
    pub margin_second: bool,
    #[serde(default)]
    pub delivery_cost: Option<Decimal>,
    #[serde(default)]
    pub workshop_cost: Option<Decimal>,
}

fn default_true() -> bool {
    true
}

impl NewOrder {
    pub fn named(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            phone: String::new(),
            address: String::new(),
            status: OrderStatus::default(),
            contract_amount: None,
            advance: None,
            project_designer_id: None,
            decorator_id: None,
            assembler_id: None,
            measured_area: None,
            margin_first: true,
            margin_second: true,
            delivery_cost: None,
            workshop_cost: None,
        }
    }

    pub fn into_order(self, id: i64, created_at: DateTime<Utc>) -> Order {
        Order {
            id,
            created_at,
            first_name: self.first_name,
            last_name: self.last_name,
            phone: self.phone,
            address: self.address,
            status: self.status,
            contract_amount: self.contract_amount,
            advance: self.advance,
            project_designer: RoleSlot {
                worker_id: self.project_designer_id,
                manual_measure: None,
            },
            decorator: RoleSlot {
                worker_id: self.decorator_id,
                manual_measure: None,
            },
            assembler: RoleSlot {
                worker_id: self.assembler_id,
                manual_measure: None,
            },
            measured_area: self.measured_area,
            margin_first: self.margin_first,
            margin_second: self.margin_second,
            delivery_cost: self.delivery_cost,
            workshop_cost: self.workshop_cost,
        }
    }
}

/// Replacement values for the hand-maintained fields of an order. Manual
/// measures and margin flags have their own updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEdit {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    pub status: OrderStatus,
    #[serde(default)]
    pub contract_amount: Option<Decimal>,
    #[serde(default)]
    pub advance: Option<Decimal>,
    #[serde(default)]
    pub project_designer_id: Option<i64>,
    #[serde(default)]
    pub decorator_id: Option<i64>,
    #[serde(default)]
    pub assembler_id: Option<i64>,
    #[serde(default)]
    pub measured_area: Option<Decimal>,
    #[serde(default)]
    pub delivery_cost: Option<Decimal>,
    #[serde(default)]
    pub workshop_cost: Option<Decimal>,
}

impl OrderEdit {
    /// Current values of `order`, for callers that change a few fields.
    pub fn from_order(order: &Order) -> Self {
        Self {
            first_name: order.first_name.clone(),
            last_name: order.last_name.clone(),
            phone: order.phone.clone(),
            address: order.address.clone(),
            status: order.status,
            contract_amount: order.contract_amount,
            advance: order.advance,
            project_designer_id: order.project_designer.worker_id,
            decorator_id: order.decorator.worker_id,
            assembler_id: order.assembler.worker_id,
            measured_area: order.measured_area,
            delivery_cost: order.delivery_cost,
            workshop_cost: order.workshop_cost,
        }
    }

    pub fn worker_ids(&self) -> impl Iterator<Item = i64> {
        [self.project_designer_id, self.decorator_id, self.assembler_id]
            .into_iter()
            .flatten()
    }

    pub fn apply(self, order: &mut Order) {
        order.first_name = self.first_name;
        order.last_name = self.last_name;
        order.phone = self.phone;
        order.address = self.address;
        order.status = self.status;
        order.contract_amount = self.contract_amount;
        order.advance = self.advance;
        order.project_designer.worker_id = self.project_designer_id;
        order.decorator.worker_id = self.decorator_id;
        order.assembler.worker_id = self.assembler_id;
        order.measured_area = self.measured_area;
        order.delivery_cost = self.delivery_cost;
        order.workshop_cost = self.workshop_cost;
    }
}

/// A person paid per order under one commission scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    pub id: i64,
    pub name: String,
    pub surname: String,
    pub profession: Option<String>,
    /// Free-text calculation method name, e.g. "percent of contract".
    pub method: Option<String>,
    pub percentage: Option<Decimal>,
    pub rate_per_unit: Option<Decimal>,
}

impl Worker {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.name, self.surname).trim().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWorker {
    pub name: String,
    #[serde(default)]
    pub surname: String,
    #[serde(default)]
    pub profession: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub percentage: Option<Decimal>,
    #[serde(default)]
    pub rate_per_unit: Option<Decimal>,
}

impl NewWorker {
    pub fn into_worker(self, id: i64) -> Worker {
        Worker {
            id,
            name: self.name,
            surname: self.surname,
            profession: self.profession,
            method: self.method,
            percentage: self.percentage,
            rate_per_unit: self.rate_per_unit,
        }
    }
}

/// Gross pay owed to a worker for one role on one order. Unique per
/// (order, worker, role).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub order_id: i64,
    pub worker_id: i64,
    pub role: Role,
    pub amount: Decimal,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deduction {
    pub id: i64,
    pub payment_id: i64,
    pub amount: Decimal,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Catalog item that can be put on an order as a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub category: Option<String>,
    pub brand: Option<String>,
    /// Price the workshop pays; component lines fall back to it.
    pub our_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    pub our_price: Decimal,
}

impl NewProduct {
    pub fn into_product(self, id: i64) -> Product {
        Product {
            id,
            name: self.name,
            category: self.category,
            brand: self.brand,
            our_price: self.our_price,
        }
    }
}

/// Catalog product on an order, attributed to the partner who bought it.
/// `product_name` and `catalog_price` are read from the product, so a catalog
/// price change reaches every order that uses it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentLine {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub catalog_price: Decimal,
    pub custom_price: Option<Decimal>,
    pub quantity: i32,
    pub buyer: Partner,
}

impl ComponentLine {
    pub fn unit_price(&self) -> Decimal {
        self.custom_price.unwrap_or(self.catalog_price)
    }

    /// `None` when the total does not fit a decimal.
    pub fn line_total(&self) -> Option<Decimal> {
        self.unit_price().checked_mul(Decimal::from(self.quantity))
    }
}

/// One product per order; adding the same product again replaces the line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewComponentLine {
    pub product_id: i64,
    #[serde(default)]
    pub custom_price: Option<Decimal>,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
    pub buyer: Partner,
}

fn default_quantity() -> i32 {
    1
}

/// Unplanned expense logged against an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiscExpense {
    pub id: i64,
    pub order_id: i64,
    pub item: String,
    pub price: Decimal,
    pub spent_by: Partner,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMiscExpense {
    pub item: String,
    pub price: Decimal,
    pub spent_by: Partner,
}

/// Telegram link for a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub worker_id: i64,
    pub telegram_id: Option<String>,
    pub telegram_verified: bool,
    pub verification_code: Option<String>,
}

/// One row scraped from the external dashboard. Produced per fetch and
/// consumed immediately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardItem {
    pub index: String,
    pub raw_title: String,
    pub status_text: String,
    pub link: String,
    pub workshop_price: String,
}
