// src/db/repository.rs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::{
    common::error::AppError,
    middleware::tenancy::Scope,
    models::{
        auth::{Role, User},
        catalog::{CatalogStats, Product, ProductVariant},
        inventory::{MovementHistoryEntry, StockReservation},
        invoice::{Invoice, InvoiceItem, InvoiceLine},
        report::{SaleLine, TenantInventoryLevel},
        tenancy::{Tenant, TenantSummary},
    },
};

// ---
// Filtros e dados de escrita
// ---

#[derive(Debug, Clone)]
pub struct ProductFilter {
    pub scope: Scope,
    pub category: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone)]
pub struct InvoiceFilter {
    pub scope: Scope,
    pub user_id: Option<i64>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewTenant {
    pub name: String,
    pub address: Option<String>,
    pub contact: Option<String>,
}

// `None` = não altera; `Some(None)` = limpa o campo
#[derive(Debug, Clone, Default)]
pub struct TenantChanges {
    pub name: Option<String>,
    pub address: Option<Option<String>>,
    pub contact: Option<Option<String>>,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tenant_id: String,
}

// Mesma convenção de `TenantChanges`
#[derive(Debug, Clone, Default)]
pub struct ProductChanges {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub category: Option<Option<String>>,
}

#[derive(Debug, Clone)]
pub struct NewVariant {
    pub barcode: String,
    pub weight: Decimal,
    pub price: Decimal,
    pub stock: i32,
    pub product_id: i64,
    pub tenant_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct VariantChanges {
    pub barcode: Option<String>,
    pub weight: Option<Decimal>,
    pub price: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct NewInvoiceItem {
    pub invoice_id: i64,
    pub variant_id: i64,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
}

#[derive(Debug, Clone)]
pub struct NewReservation {
    pub reservation_id: String,
    pub user_id: i64,
    pub variant_id: i64,
    pub tenant_id: String,
    pub quantity: i32,
    pub expires_at: DateTime<Utc>,
}

/// O id do carrinho é escolhido pelo cliente: só identifica reservas junto com o dono.
#[derive(Debug, Clone, Copy)]
pub struct ReservationKey<'a> {
    pub reservation_id: &'a str,
    pub user_id: i64,
}

// ---
// O colaborador de armazenamento transacional
// ---

/// Ponto de entrada do armazenamento: tudo acontece dentro de uma transação.
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError>;
}

/// Uma transação aberta. Descartar sem `commit` desfaz todas as escritas.
#[async_trait]
pub trait StoreTx: Send {
    async fn commit(self: Box<Self>) -> Result<(), AppError>;
    async fn rollback(self: Box<Self>) -> Result<(), AppError>;

    // --- Lojas e usuários ---
    async fn list_tenants(&mut self, limit: i64, offset: i64) -> Result<Vec<TenantSummary>, AppError>;
    async fn find_tenant(&mut self, id: &str) -> Result<Option<Tenant>, AppError>;
    async fn insert_tenant(&mut self, tenant: NewTenant) -> Result<Tenant, AppError>;
    async fn update_tenant(&mut self, id: &str, changes: TenantChanges) -> Result<Option<Tenant>, AppError>;
    /// `DependentDataExists` quando ainda há usuários, produtos ou notas.
    async fn delete_tenant(&mut self, id: &str) -> Result<bool, AppError>;
    async fn find_user(&mut self, id: i64) -> Result<Option<User>, AppError>;
    async fn list_tenant_users(&mut self, tenant_id: &str) -> Result<Vec<User>, AppError>;
    async fn list_users(&mut self, role: Option<Role>, limit: i64, offset: i64) -> Result<Vec<User>, AppError>;
    async fn set_user_tenant(&mut self, user_id: i64, tenant_id: Option<&str>) -> Result<Option<User>, AppError>;

    // --- Catálogo ---
    async fn list_products(&mut self, filter: &ProductFilter) -> Result<Vec<Product>, AppError>;
    async fn find_product(&mut self, id: i64, scope: &Scope) -> Result<Option<Product>, AppError>;
    async fn insert_product(&mut self, product: NewProduct) -> Result<Product, AppError>;
    async fn update_product(&mut self, id: i64, changes: ProductChanges) -> Result<Product, AppError>;
    async fn delete_product(&mut self, id: i64) -> Result<(), AppError>;
    async fn product_has_invoiced_variants(&mut self, product_id: i64) -> Result<bool, AppError>;
    async fn catalog_stats(&mut self, scope: &Scope, low_stock_below: i32) -> Result<CatalogStats, AppError>;

    async fn variants_for_products(&mut self, product_ids: &[i64]) -> Result<Vec<ProductVariant>, AppError>;
    async fn find_variant_by_barcode(&mut self, barcode: &str, scope: &Scope) -> Result<Option<ProductVariant>, AppError>;
    async fn find_variant(&mut self, id: i64, scope: &Scope) -> Result<Option<ProductVariant>, AppError>;
    async fn list_variants(&mut self, product_id: i64, scope: &Scope) -> Result<Vec<ProductVariant>, AppError>;
    /// `DuplicateBarcode` na violação da unicidade global.
    async fn insert_variant(&mut self, variant: NewVariant) -> Result<ProductVariant, AppError>;
    async fn update_variant(&mut self, id: i64, changes: VariantChanges) -> Result<ProductVariant, AppError>;
    async fn delete_variant(&mut self, id: i64) -> Result<(), AppError>;
    async fn delete_variants_of_product(&mut self, product_id: i64) -> Result<u64, AppError>;
    async fn variant_is_invoiced(&mut self, id: i64) -> Result<bool, AppError>;
    async fn low_stock_variants(&mut self, threshold: i32, scope: &Scope) -> Result<Vec<ProductVariant>, AppError>;

    // --- Estoque (só o motor de transações chama estes) ---
    /// Relê e bloqueia as linhas, em ordem crescente de id.
    async fn lock_variants(&mut self, ids: &[i64], scope: &Scope) -> Result<Vec<ProductVariant>, AppError>;
    /// Incremento atômico condicional; `None` se o resultado ficaria negativo.
    async fn adjust_stock(&mut self, variant_id: i64, delta: i32) -> Result<Option<i32>, AppError>;
    async fn set_stock(&mut self, variant_id: i64, new_stock: i32) -> Result<bool, AppError>;

    // --- Reservas ---
    /// Soma das reservas ativas por variante, ignorando as de `exclude`.
    async fn reserved_quantities(
        &mut self,
        variant_ids: &[i64],
        exclude: Option<ReservationKey<'_>>,
    ) -> Result<HashMap<i64, i32>, AppError>;
    async fn upsert_reservation(&mut self, reservation: NewReservation) -> Result<StockReservation, AppError>;
    async fn delete_reservation(&mut self, key: ReservationKey<'_>, scope: &Scope) -> Result<Vec<i64>, AppError>;
    async fn purge_expired_reservations(&mut self) -> Result<u64, AppError>;

    // --- Notas ---
    async fn insert_invoice(&mut self, total_amount: Decimal, user_id: i64, tenant_id: &str) -> Result<Invoice, AppError>;
    async fn insert_invoice_item(&mut self, item: NewInvoiceItem) -> Result<InvoiceItem, AppError>;
    async fn list_invoices(&mut self, filter: &InvoiceFilter, limit: i64, offset: i64) -> Result<Vec<Invoice>, AppError>;
    async fn count_invoices(&mut self, filter: &InvoiceFilter) -> Result<i64, AppError>;
    async fn find_invoice(&mut self, id: i64, scope: &Scope, user_id: Option<i64>) -> Result<Option<Invoice>, AppError>;
    async fn invoice_lines(&mut self, invoice_ids: &[i64]) -> Result<Vec<InvoiceLine>, AppError>;
    async fn movement_history(
        &mut self,
        variant_id: Option<i64>,
        scope: &Scope,
        limit: i64,
    ) -> Result<Vec<MovementHistoryEntry>, AppError>;

    // --- Relatórios (somente leitura) ---
    /// Uma linha por item de nota no período, mais recentes primeiro.
    async fn sales_lines(&mut self, filter: &InvoiceFilter) -> Result<Vec<SaleLine>, AppError>;
    async fn inventory_levels(
        &mut self,
        scope: &Scope,
        low_stock_at_or_below: i32,
    ) -> Result<Vec<TenantInventoryLevel>, AppError>;
}
