// src/db/memory_repo.rs
//
// Armazenamento em memória para os testes dos serviços. Uma transação segura o
// mutex do estado inteiro e trabalha numa cópia; `commit` troca a cópia de lugar.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    common::error::AppError,
    db::repository::{
        InvoiceFilter, NewInvoiceItem, NewProduct, NewReservation, NewTenant, NewVariant,
        ProductChanges, ProductFilter, ReservationKey, Store, StoreTx, TenantChanges,
        VariantChanges,
    },
    middleware::tenancy::Scope,
    models::{
        auth::{Role, User, UserSummary},
        catalog::{CatalogStats, Product, ProductVariant},
        inventory::{MovementHistoryEntry, StockReservation},
        invoice::{Invoice, InvoiceItem, InvoiceLine},
        report::{SaleLine, TenantInventoryLevel},
        tenancy::{Tenant, TenantSummary},
    },
};

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    tenants: BTreeMap<String, Tenant>,
    users: BTreeMap<i64, User>,
    products: BTreeMap<i64, Product>,
    variants: BTreeMap<i64, ProductVariant>,
    invoices: BTreeMap<i64, Invoice>,
    invoice_items: BTreeMap<i64, InvoiceItem>,
    reservations: BTreeMap<i64, StockReservation>,
    last_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    transactions: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Quantas transações foram abertas até agora.
    pub fn transactions_started(&self) -> usize {
        self.transactions.load(Ordering::SeqCst)
    }

    // --- Fixtures ---

    pub async fn seed_tenant(&self, id: &str, name: &str) -> Tenant {
        let now = Utc::now();
        let tenant = Tenant {
            id: id.to_string(),
            name: name.to_string(),
            address: None,
            contact: None,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().await.tenants.insert(tenant.id.clone(), tenant.clone());
        tenant
    }

    pub async fn seed_user(&self, email: &str, role: Role, tenant_id: Option<&str>) -> User {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let user = User {
            id: state.next_id(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            role,
            tenant_id: tenant_id.map(str::to_string),
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());
        user
    }

    pub async fn seed_product(&self, tenant_id: &str, name: &str) -> Product {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let product = Product {
            id: state.next_id(),
            name: name.to_string(),
            description: None,
            category: None,
            tenant_id: tenant_id.to_string(),
            created_at: now,
            updated_at: now,
        };
        state.products.insert(product.id, product.clone());
        product
    }

    pub async fn seed_variant(&self, product: &Product, barcode: &str, price: Decimal, stock: i32) -> ProductVariant {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let variant = ProductVariant {
            id: state.next_id(),
            barcode: barcode.to_string(),
            weight: Decimal::ONE,
            price,
            stock,
            product_id: product.id,
            tenant_id: product.tenant_id.clone(),
            created_at: now,
            updated_at: now,
        };
        state.variants.insert(variant.id, variant.clone());
        variant
    }

    pub async fn seed_reservation(
        &self,
        reservation_id: &str,
        user_id: i64,
        variant: &ProductVariant,
        quantity: i32,
        expires_at: DateTime<Utc>,
    ) -> StockReservation {
        let mut state = self.state.lock().await;
        let reservation = StockReservation {
            id: state.next_id(),
            reservation_id: reservation_id.to_string(),
            user_id,
            variant_id: variant.id,
            tenant_id: variant.tenant_id.clone(),
            quantity,
            expires_at,
            created_at: Utc::now(),
        };
        state.reservations.insert(reservation.id, reservation.clone());
        reservation
    }

    /// Nota já fechada, com data escolhida. Não mexe no estoque.
    pub async fn seed_invoice(
        &self,
        user_id: i64,
        lines: &[(&ProductVariant, i32)],
        created_at: DateTime<Utc>,
    ) -> Invoice {
        let mut state = self.state.lock().await;
        let tenant_id = lines.first().map(|(v, _)| v.tenant_id.clone()).unwrap_or_default();
        let invoice_id = state.next_id();
        let mut total_amount = Decimal::ZERO;
        for (variant, quantity) in lines {
            let total_price = variant.price * Decimal::from(*quantity);
            total_amount += total_price;
            let item = InvoiceItem {
                id: state.next_id(),
                invoice_id,
                variant_id: variant.id,
                quantity: *quantity,
                unit_price: variant.price,
                total_price,
                created_at,
            };
            state.invoice_items.insert(item.id, item);
        }
        let invoice = Invoice { id: invoice_id, total_amount, user_id, tenant_id, created_at };
        state.invoices.insert(invoice.id, invoice.clone());
        invoice
    }

    pub async fn stock_of(&self, variant_id: i64) -> Option<i32> {
        self.state.lock().await.variants.get(&variant_id).map(|v| v.stock)
    }

    pub async fn reservation_count(&self) -> usize {
        self.state.lock().await.reservations.len()
    }

    pub async fn invoice_count(&self) -> usize {
        self.state.lock().await.invoices.len()
    }

    pub async fn user(&self, id: i64) -> Option<User> {
        self.state.lock().await.users.get(&id).cloned()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError> {
        self.transactions.fetch_add(1, Ordering::SeqCst);
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

fn in_date_range(created_at: DateTime<Utc>, filter: &InvoiceFilter) -> bool {
    filter.start_date.is_none_or(|start| created_at >= start)
        && filter.end_date.is_none_or(|end| created_at <= end)
}

fn owned_by(reservation: &StockReservation, key: ReservationKey<'_>) -> bool {
    reservation.reservation_id == key.reservation_id && reservation.user_id == key.user_id
}

fn matches_invoice(invoice: &Invoice, filter: &InvoiceFilter) -> bool {
    filter.scope.allows(&invoice.tenant_id)
        && filter.user_id.is_none_or(|user_id| invoice.user_id == user_id)
        && in_date_range(invoice.created_at, filter)
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        Ok(())
    }

    // --- Lojas e usuários ---

    async fn list_tenants(&mut self, limit: i64, offset: i64) -> Result<Vec<TenantSummary>, AppError> {
        let state = &self.working;
        let mut tenants: Vec<&Tenant> = state.tenants.values().collect();
        tenants.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(tenants
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|tenant| TenantSummary {
                tenant: tenant.clone(),
                user_count: state.users.values().filter(|u| u.tenant_id.as_deref() == Some(&tenant.id)).count() as i64,
                product_count: state.products.values().filter(|p| p.tenant_id == tenant.id).count() as i64,
                invoice_count: state.invoices.values().filter(|i| i.tenant_id == tenant.id).count() as i64,
            })
            .collect())
    }

    async fn find_tenant(&mut self, id: &str) -> Result<Option<Tenant>, AppError> {
        Ok(self.working.tenants.get(id).cloned())
    }

    async fn insert_tenant(&mut self, tenant: NewTenant) -> Result<Tenant, AppError> {
        if self.working.tenants.values().any(|t| t.name == tenant.name) {
            return Err(AppError::DuplicateTenantName(tenant.name));
        }
        let now = Utc::now();
        let id = format!("tenant-{}", self.working.next_id());
        let saved = Tenant {
            id: id.clone(),
            name: tenant.name,
            address: tenant.address,
            contact: tenant.contact,
            created_at: now,
            updated_at: now,
        };
        self.working.tenants.insert(id, saved.clone());
        Ok(saved)
    }

    async fn update_tenant(&mut self, id: &str, changes: TenantChanges) -> Result<Option<Tenant>, AppError> {
        if let Some(name) = &changes.name {
            if self.working.tenants.values().any(|t| &t.name == name && t.id != id) {
                return Err(AppError::DuplicateTenantName(name.clone()));
            }
        }
        let Some(tenant) = self.working.tenants.get_mut(id) else {
            return Ok(None);
        };
        if let Some(name) = changes.name {
            tenant.name = name;
        }
        if let Some(address) = changes.address {
            tenant.address = address;
        }
        if let Some(contact) = changes.contact {
            tenant.contact = contact;
        }
        tenant.updated_at = Utc::now();
        Ok(Some(tenant.clone()))
    }

    async fn delete_tenant(&mut self, id: &str) -> Result<bool, AppError> {
        let state = &mut self.working;
        let has_dependents = state.users.values().any(|u| u.tenant_id.as_deref() == Some(id))
            || state.products.values().any(|p| p.tenant_id == id)
            || state.invoices.values().any(|i| i.tenant_id == id);
        if has_dependents {
            return Err(AppError::DependentDataExists);
        }
        state.reservations.retain(|_, r| r.tenant_id != id);
        Ok(state.tenants.remove(id).is_some())
    }

    async fn find_user(&mut self, id: i64) -> Result<Option<User>, AppError> {
        Ok(self.working.users.get(&id).cloned())
    }

    async fn list_tenant_users(&mut self, tenant_id: &str) -> Result<Vec<User>, AppError> {
        Ok(self
            .working
            .users
            .values()
            .rev()
            .filter(|u| u.tenant_id.as_deref() == Some(tenant_id))
            .cloned()
            .collect())
    }

    async fn list_users(&mut self, role: Option<Role>, limit: i64, offset: i64) -> Result<Vec<User>, AppError> {
        Ok(self
            .working
            .users
            .values()
            .rev()
            .filter(|u| role.is_none_or(|r| u.role == r))
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn set_user_tenant(&mut self, user_id: i64, tenant_id: Option<&str>) -> Result<Option<User>, AppError> {
        if let Some(tenant_id) = tenant_id {
            if !self.working.tenants.contains_key(tenant_id) {
                return Err(AppError::NotFoundOrDenied("Loja"));
            }
        }
        let Some(user) = self.working.users.get_mut(&user_id) else {
            return Ok(None);
        };
        user.tenant_id = tenant_id.map(str::to_string);
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    // --- Catálogo ---

    async fn list_products(&mut self, filter: &ProductFilter) -> Result<Vec<Product>, AppError> {
        Ok(self
            .working
            .products
            .values()
            .rev()
            .filter(|p| filter.scope.allows(&p.tenant_id))
            .filter(|p| filter.category.is_none() || p.category == filter.category)
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .cloned()
            .collect())
    }

    async fn find_product(&mut self, id: i64, scope: &Scope) -> Result<Option<Product>, AppError> {
        Ok(self.working.products.get(&id).filter(|p| scope.allows(&p.tenant_id)).cloned())
    }

    async fn insert_product(&mut self, product: NewProduct) -> Result<Product, AppError> {
        if !self.working.tenants.contains_key(&product.tenant_id) {
            return Err(AppError::NotFoundOrDenied("Loja"));
        }
        let now = Utc::now();
        let saved = Product {
            id: self.working.next_id(),
            name: product.name,
            description: product.description,
            category: product.category,
            tenant_id: product.tenant_id,
            created_at: now,
            updated_at: now,
        };
        self.working.products.insert(saved.id, saved.clone());
        Ok(saved)
    }

    async fn update_product(&mut self, id: i64, changes: ProductChanges) -> Result<Product, AppError> {
        let product = self
            .working
            .products
            .get_mut(&id)
            .ok_or(AppError::NotFoundOrDenied("Produto"))?;
        if let Some(name) = changes.name {
            product.name = name;
        }
        if let Some(description) = changes.description {
            product.description = description;
        }
        if let Some(category) = changes.category {
            product.category = category;
        }
        product.updated_at = Utc::now();
        Ok(product.clone())
    }

    async fn delete_product(&mut self, id: i64) -> Result<(), AppError> {
        self.working.products.remove(&id);
        Ok(())
    }

    async fn product_has_invoiced_variants(&mut self, product_id: i64) -> Result<bool, AppError> {
        let state = &self.working;
        Ok(state.invoice_items.values().any(|item| {
            state
                .variants
                .get(&item.variant_id)
                .is_some_and(|v| v.product_id == product_id)
        }))
    }

    async fn catalog_stats(&mut self, scope: &Scope, low_stock_below: i32) -> Result<CatalogStats, AppError> {
        let state = &self.working;
        let variants: Vec<&ProductVariant> =
            state.variants.values().filter(|v| scope.allows(&v.tenant_id)).collect();

        Ok(CatalogStats {
            total_products: state.products.values().filter(|p| scope.allows(&p.tenant_id)).count() as i64,
            total_variants: variants.len() as i64,
            low_stock_count: variants.iter().filter(|v| v.stock < low_stock_below).count() as i64,
            out_of_stock_count: variants.iter().filter(|v| v.stock == 0).count() as i64,
            inventory_value: variants.iter().map(|v| v.price * Decimal::from(v.stock)).sum(),
        })
    }

    async fn variants_for_products(&mut self, product_ids: &[i64]) -> Result<Vec<ProductVariant>, AppError> {
        Ok(self
            .working
            .variants
            .values()
            .rev()
            .filter(|v| product_ids.contains(&v.product_id))
            .cloned()
            .collect())
    }

    async fn find_variant_by_barcode(&mut self, barcode: &str, scope: &Scope) -> Result<Option<ProductVariant>, AppError> {
        Ok(self
            .working
            .variants
            .values()
            .find(|v| v.barcode == barcode && scope.allows(&v.tenant_id))
            .cloned())
    }

    async fn find_variant(&mut self, id: i64, scope: &Scope) -> Result<Option<ProductVariant>, AppError> {
        Ok(self.working.variants.get(&id).filter(|v| scope.allows(&v.tenant_id)).cloned())
    }

    async fn list_variants(&mut self, product_id: i64, scope: &Scope) -> Result<Vec<ProductVariant>, AppError> {
        Ok(self
            .working
            .variants
            .values()
            .rev()
            .filter(|v| v.product_id == product_id && scope.allows(&v.tenant_id))
            .cloned()
            .collect())
    }

    async fn insert_variant(&mut self, variant: NewVariant) -> Result<ProductVariant, AppError> {
        if self.working.variants.values().any(|v| v.barcode == variant.barcode) {
            return Err(AppError::DuplicateBarcode(variant.barcode));
        }
        let now = Utc::now();
        let saved = ProductVariant {
            id: self.working.next_id(),
            barcode: variant.barcode,
            weight: variant.weight,
            price: variant.price,
            stock: variant.stock,
            product_id: variant.product_id,
            tenant_id: variant.tenant_id,
            created_at: now,
            updated_at: now,
        };
        self.working.variants.insert(saved.id, saved.clone());
        Ok(saved)
    }

    async fn update_variant(&mut self, id: i64, changes: VariantChanges) -> Result<ProductVariant, AppError> {
        if let Some(barcode) = &changes.barcode {
            if self.working.variants.values().any(|v| &v.barcode == barcode && v.id != id) {
                return Err(AppError::DuplicateBarcode(barcode.clone()));
            }
        }
        let variant = self
            .working
            .variants
            .get_mut(&id)
            .ok_or(AppError::VariantNotFound { variant_id: id })?;
        if let Some(barcode) = changes.barcode {
            variant.barcode = barcode;
        }
        if let Some(weight) = changes.weight {
            variant.weight = weight;
        }
        if let Some(price) = changes.price {
            variant.price = price;
        }
        variant.updated_at = Utc::now();
        Ok(variant.clone())
    }

    async fn delete_variant(&mut self, id: i64) -> Result<(), AppError> {
        self.working.variants.remove(&id);
        self.working.reservations.retain(|_, r| r.variant_id != id);
        Ok(())
    }

    async fn delete_variants_of_product(&mut self, product_id: i64) -> Result<u64, AppError> {
        let ids: Vec<i64> = self
            .working
            .variants
            .values()
            .filter(|v| v.product_id == product_id)
            .map(|v| v.id)
            .collect();
        for id in &ids {
            self.working.variants.remove(id);
        }
        self.working.reservations.retain(|_, r| !ids.contains(&r.variant_id));
        Ok(ids.len() as u64)
    }

    async fn variant_is_invoiced(&mut self, id: i64) -> Result<bool, AppError> {
        Ok(self.working.invoice_items.values().any(|item| item.variant_id == id))
    }

    async fn low_stock_variants(&mut self, threshold: i32, scope: &Scope) -> Result<Vec<ProductVariant>, AppError> {
        let mut variants: Vec<ProductVariant> = self
            .working
            .variants
            .values()
            .filter(|v| v.stock <= threshold && scope.allows(&v.tenant_id))
            .cloned()
            .collect();
        variants.sort_by_key(|v| (v.stock, v.id));
        Ok(variants)
    }

    // --- Estoque ---

    async fn lock_variants(&mut self, ids: &[i64], scope: &Scope) -> Result<Vec<ProductVariant>, AppError> {
        // BTreeMap já itera em ordem crescente de id
        Ok(self
            .working
            .variants
            .values()
            .filter(|v| ids.contains(&v.id) && scope.allows(&v.tenant_id))
            .cloned()
            .collect())
    }

    async fn adjust_stock(&mut self, variant_id: i64, delta: i32) -> Result<Option<i32>, AppError> {
        let Some(variant) = self.working.variants.get_mut(&variant_id) else {
            return Ok(None);
        };
        // Como o INTEGER do banco: estourar é erro, não "falta de estoque"
        let next = variant
            .stock
            .checked_add(delta)
            .ok_or_else(|| AppError::InternalServerError(anyhow::anyhow!("integer out of range")))?;
        if next < 0 {
            return Ok(None);
        }
        variant.stock = next;
        variant.updated_at = Utc::now();
        Ok(Some(next))
    }

    async fn set_stock(&mut self, variant_id: i64, new_stock: i32) -> Result<bool, AppError> {
        let Some(variant) = self.working.variants.get_mut(&variant_id) else {
            return Ok(false);
        };
        variant.stock = new_stock;
        variant.updated_at = Utc::now();
        Ok(true)
    }

    // --- Reservas ---

    async fn reserved_quantities(
        &mut self,
        variant_ids: &[i64],
        exclude: Option<ReservationKey<'_>>,
    ) -> Result<HashMap<i64, i32>, AppError> {
        let now = Utc::now();
        let mut totals = HashMap::new();
        for reservation in self.working.reservations.values() {
            if !variant_ids.contains(&reservation.variant_id)
                || reservation.expires_at <= now
                || exclude.is_some_and(|key| owned_by(reservation, key))
            {
                continue;
            }
            *totals.entry(reservation.variant_id).or_insert(0) += reservation.quantity;
        }
        Ok(totals)
    }

    async fn upsert_reservation(&mut self, reservation: NewReservation) -> Result<StockReservation, AppError> {
        let existing = self.working.reservations.values_mut().find(|r| {
            r.reservation_id == reservation.reservation_id
                && r.user_id == reservation.user_id
                && r.variant_id == reservation.variant_id
        });
        if let Some(existing) = existing {
            existing.quantity = reservation.quantity;
            existing.expires_at = reservation.expires_at;
            return Ok(existing.clone());
        }
        let saved = StockReservation {
            id: self.working.next_id(),
            reservation_id: reservation.reservation_id,
            user_id: reservation.user_id,
            variant_id: reservation.variant_id,
            tenant_id: reservation.tenant_id,
            quantity: reservation.quantity,
            expires_at: reservation.expires_at,
            created_at: Utc::now(),
        };
        self.working.reservations.insert(saved.id, saved.clone());
        Ok(saved)
    }

    async fn delete_reservation(&mut self, key: ReservationKey<'_>, scope: &Scope) -> Result<Vec<i64>, AppError> {
        let mut released = Vec::new();
        self.working.reservations.retain(|_, r| {
            let matches = owned_by(r, key) && scope.allows(&r.tenant_id);
            if matches {
                released.push(r.variant_id);
            }
            !matches
        });
        Ok(released)
    }

    async fn purge_expired_reservations(&mut self) -> Result<u64, AppError> {
        let now = Utc::now();
        let before = self.working.reservations.len();
        self.working.reservations.retain(|_, r| r.expires_at > now);
        Ok((before - self.working.reservations.len()) as u64)
    }

    // --- Notas ---

    async fn insert_invoice(&mut self, total_amount: Decimal, user_id: i64, tenant_id: &str) -> Result<Invoice, AppError> {
        let invoice = Invoice {
            id: self.working.next_id(),
            total_amount,
            user_id,
            tenant_id: tenant_id.to_string(),
            created_at: Utc::now(),
        };
        self.working.invoices.insert(invoice.id, invoice.clone());
        Ok(invoice)
    }

    async fn insert_invoice_item(&mut self, item: NewInvoiceItem) -> Result<InvoiceItem, AppError> {
        if !self.working.variants.contains_key(&item.variant_id) {
            return Err(AppError::VariantNotFound { variant_id: item.variant_id });
        }
        let saved = InvoiceItem {
            id: self.working.next_id(),
            invoice_id: item.invoice_id,
            variant_id: item.variant_id,
            quantity: item.quantity,
            unit_price: item.unit_price,
            total_price: item.total_price,
            created_at: Utc::now(),
        };
        self.working.invoice_items.insert(saved.id, saved.clone());
        Ok(saved)
    }

    async fn list_invoices(&mut self, filter: &InvoiceFilter, limit: i64, offset: i64) -> Result<Vec<Invoice>, AppError> {
        Ok(self
            .working
            .invoices
            .values()
            .rev()
            .filter(|i| matches_invoice(i, filter))
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn count_invoices(&mut self, filter: &InvoiceFilter) -> Result<i64, AppError> {
        Ok(self.working.invoices.values().filter(|i| matches_invoice(i, filter)).count() as i64)
    }

    async fn find_invoice(&mut self, id: i64, scope: &Scope, user_id: Option<i64>) -> Result<Option<Invoice>, AppError> {
        Ok(self
            .working
            .invoices
            .get(&id)
            .filter(|i| scope.allows(&i.tenant_id))
            .filter(|i| user_id.is_none_or(|u| i.user_id == u))
            .cloned())
    }

    async fn invoice_lines(&mut self, invoice_ids: &[i64]) -> Result<Vec<InvoiceLine>, AppError> {
        let state = &self.working;
        state
            .invoice_items
            .values()
            .filter(|item| invoice_ids.contains(&item.invoice_id))
            .map(|item| -> Result<InvoiceLine, AppError> {
                let variant = state
                    .variants
                    .get(&item.variant_id)
                    .cloned()
                    .ok_or(AppError::VariantNotFound { variant_id: item.variant_id })?;
                let product = state
                    .products
                    .get(&variant.product_id)
                    .cloned()
                    .ok_or(AppError::NotFoundOrDenied("Produto"))?;
                Ok(InvoiceLine { item: item.clone(), variant, product })
            })
            .collect()
    }

    async fn movement_history(
        &mut self,
        variant_id: Option<i64>,
        scope: &Scope,
        limit: i64,
    ) -> Result<Vec<MovementHistoryEntry>, AppError> {
        let state = &self.working;
        let mut entries = Vec::new();
        for item in state.invoice_items.values().rev() {
            if variant_id.is_some_and(|id| id != item.variant_id) {
                continue;
            }
            let Some(variant) = state.variants.get(&item.variant_id) else {
                continue;
            };
            if !scope.allows(&variant.tenant_id) {
                continue;
            }
            let (Some(product), Some(invoice)) =
                (state.products.get(&variant.product_id), state.invoices.get(&item.invoice_id))
            else {
                continue;
            };
            let Some(seller) = state.users.get(&invoice.user_id) else {
                continue;
            };
            entries.push(MovementHistoryEntry {
                invoice_item_id: item.id,
                invoice_id: item.invoice_id,
                variant_id: item.variant_id,
                barcode: variant.barcode.clone(),
                product_name: product.name.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                total_price: item.total_price,
                seller: UserSummary::from(seller),
                created_at: item.created_at,
            });
            if entries.len() as i64 >= limit {
                break;
            }
        }
        Ok(entries)
    }

    // --- Relatórios ---

    async fn sales_lines(&mut self, filter: &InvoiceFilter) -> Result<Vec<SaleLine>, AppError> {
        let state = &self.working;
        let mut lines = Vec::new();
        for invoice in state.invoices.values().rev().filter(|i| matches_invoice(i, filter)) {
            let Some(tenant) = state.tenants.get(&invoice.tenant_id) else {
                continue;
            };
            for item in state.invoice_items.values().filter(|item| item.invoice_id == invoice.id) {
                let Some(product) = state
                    .variants
                    .get(&item.variant_id)
                    .and_then(|v| state.products.get(&v.product_id))
                else {
                    continue;
                };
                lines.push(SaleLine {
                    invoice_id: invoice.id,
                    tenant_id: tenant.id.clone(),
                    tenant_name: tenant.name.clone(),
                    invoice_total: invoice.total_amount,
                    created_at: invoice.created_at,
                    product_id: product.id,
                    product_name: product.name.clone(),
                    category: product.category.clone(),
                    quantity: item.quantity,
                    total_price: item.total_price,
                });
            }
        }
        Ok(lines)
    }

    async fn inventory_levels(
        &mut self,
        scope: &Scope,
        low_stock_at_or_below: i32,
    ) -> Result<Vec<TenantInventoryLevel>, AppError> {
        let state = &self.working;
        let mut levels: Vec<TenantInventoryLevel> = state
            .tenants
            .values()
            .filter(|t| scope.allows(&t.id))
            .filter_map(|tenant| {
                let variants: Vec<&ProductVariant> =
                    state.variants.values().filter(|v| v.tenant_id == tenant.id).collect();
                if variants.is_empty() {
                    return None;
                }
                Some(TenantInventoryLevel {
                    tenant_id: tenant.id.clone(),
                    tenant_name: tenant.name.clone(),
                    total_stock: variants.iter().map(|v| i64::from(v.stock)).sum(),
                    total_variants: variants.len() as i64,
                    low_stock_count: variants.iter().filter(|v| v.stock <= low_stock_at_or_below).count() as i64,
                })
            })
            .collect();
        levels.sort_by(|a, b| a.tenant_name.cmp(&b.tenant_name));
        Ok(levels)
    }
}
