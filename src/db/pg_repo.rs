// src/db/pg_repo.rs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

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

const BARCODE_UNIQUE: &str = "product_variants_barcode_key";
const TENANT_NAME_UNIQUE: &str = "tenants_name_key";

// O armazenamento de produção: PostgreSQL via pool do sqlx.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTx { tx }))
    }
}

pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

// ---
// Tradução das violações de restrição do banco para erros de domínio
// ---

fn is_unique_violation(e: &sqlx::Error, constraint: &str) -> bool {
    match e {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation() && db_err.constraint() == Some(constraint)
        }
        _ => false,
    }
}

fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation())
}

fn barcode_error(e: sqlx::Error, barcode: &str) -> AppError {
    if is_unique_violation(&e, BARCODE_UNIQUE) {
        return AppError::DuplicateBarcode(barcode.to_string());
    }
    e.into()
}

fn tenant_name_error(e: sqlx::Error, name: &str) -> AppError {
    if is_unique_violation(&e, TENANT_NAME_UNIQUE) {
        return AppError::DuplicateTenantName(name.to_string());
    }
    e.into()
}

fn unknown_tenant_error(e: sqlx::Error) -> AppError {
    if is_foreign_key_violation(&e) {
        return AppError::NotFoundOrDenied("Loja");
    }
    e.into()
}

#[derive(FromRow)]
struct HistoryRow {
    invoice_item_id: i64,
    invoice_id: i64,
    variant_id: i64,
    barcode: String,
    product_name: String,
    quantity: i32,
    unit_price: Decimal,
    total_price: Decimal,
    seller_id: i64,
    seller_email: String,
    seller_role: Role,
    created_at: DateTime<Utc>,
}

impl From<HistoryRow> for MovementHistoryEntry {
    fn from(row: HistoryRow) -> Self {
        Self {
            invoice_item_id: row.invoice_item_id,
            invoice_id: row.invoice_id,
            variant_id: row.variant_id,
            barcode: row.barcode,
            product_name: row.product_name,
            quantity: row.quantity,
            unit_price: row.unit_price,
            total_price: row.total_price,
            seller: UserSummary {
                id: row.seller_id,
                email: row.seller_email,
                role: row.seller_role,
            },
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        self.tx.rollback().await?;
        Ok(())
    }

    // ---
    // Lojas e usuários
    // ---

    async fn list_tenants(&mut self, limit: i64, offset: i64) -> Result<Vec<TenantSummary>, AppError> {
        let tenants = sqlx::query_as::<_, TenantSummary>(
            r#"
            SELECT t.*,
                   (SELECT COUNT(*) FROM users u WHERE u.tenant_id = t.id)    AS user_count,
                   (SELECT COUNT(*) FROM products p WHERE p.tenant_id = t.id) AS product_count,
                   (SELECT COUNT(*) FROM invoices i WHERE i.tenant_id = t.id) AS invoice_count
            FROM tenants t
            ORDER BY t.created_at DESC, t.id DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(tenants)
    }

    async fn find_tenant(&mut self, id: &str) -> Result<Option<Tenant>, AppError> {
        let tenant = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(tenant)
    }

    async fn insert_tenant(&mut self, tenant: NewTenant) -> Result<Tenant, AppError> {
        sqlx::query_as::<_, Tenant>(
            r#"
            INSERT INTO tenants (id, name, address, contact)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&tenant.name)
        .bind(&tenant.address)
        .bind(&tenant.contact)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| tenant_name_error(e, &tenant.name))
    }

    async fn update_tenant(&mut self, id: &str, changes: TenantChanges) -> Result<Option<Tenant>, AppError> {
        let current = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        let Some(current) = current else {
            return Ok(None);
        };

        let name = changes.name.unwrap_or(current.name);
        let address = changes.address.unwrap_or(current.address);
        let contact = changes.contact.unwrap_or(current.contact);

        let updated = sqlx::query_as::<_, Tenant>(
            r#"
            UPDATE tenants
            SET name = $2, address = $3, contact = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&name)
        .bind(&address)
        .bind(&contact)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| tenant_name_error(e, &name))?;

        Ok(Some(updated))
    }

    async fn delete_tenant(&mut self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM tenants WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                // Restrição RESTRICT: ainda existem usuários, produtos ou notas
                if is_foreign_key_violation(&e) {
                    return AppError::DependentDataExists;
                }
                AppError::from(e)
            })?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_user(&mut self, id: i64) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(user)
    }

    async fn list_tenant_users(&mut self, tenant_id: &str) -> Result<Vec<User>, AppError> {
        let users = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE tenant_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(tenant_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(users)
    }

    async fn list_users(&mut self, role: Option<Role>, limit: i64, offset: i64) -> Result<Vec<User>, AppError> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE ($1::user_role IS NULL OR role = $1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(role)
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(users)
    }

    async fn set_user_tenant(&mut self, user_id: i64, tenant_id: Option<&str>) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET tenant_id = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(tenant_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(unknown_tenant_error)
    }

    // ---
    // Catálogo
    // ---

    async fn list_products(&mut self, filter: &ProductFilter) -> Result<Vec<Product>, AppError> {
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT * FROM products
            WHERE ($1::text IS NULL OR tenant_id = $1)
              AND ($2::text IS NULL OR category = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(filter.scope.tenant_id())
        .bind(filter.category.as_deref())
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(products)
    }

    async fn find_product(&mut self, id: i64, scope: &Scope) -> Result<Option<Product>, AppError> {
        let product = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE id = $1 AND ($2::text IS NULL OR tenant_id = $2)",
        )
        .bind(id)
        .bind(scope.tenant_id())
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(product)
    }

    async fn insert_product(&mut self, product: NewProduct) -> Result<Product, AppError> {
        sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (name, description, category, tenant_id)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.category)
        .bind(&product.tenant_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(unknown_tenant_error)
    }

    async fn update_product(&mut self, id: i64, changes: ProductChanges) -> Result<Product, AppError> {
        let current = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or(AppError::NotFoundOrDenied("Produto"))?;

        let name = changes.name.unwrap_or(current.name);
        let description = changes.description.unwrap_or(current.description);
        let category = changes.category.unwrap_or(current.category);

        let product = sqlx::query_as::<_, Product>(
            r#"
            UPDATE products
            SET name = $2, description = $3, category = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&name)
        .bind(&description)
        .bind(&category)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(product)
    }

    async fn delete_product(&mut self, id: i64) -> Result<(), AppError> {
        sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn product_has_invoiced_variants(&mut self, product_id: i64) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM invoice_items ii
                JOIN product_variants v ON v.id = ii.variant_id
                WHERE v.product_id = $1
            )
            "#,
        )
        .bind(product_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn catalog_stats(&mut self, scope: &Scope, low_stock_below: i32) -> Result<CatalogStats, AppError> {
        let (total_products, total_variants, low_stock_count, out_of_stock_count, inventory_value) =
            sqlx::query_as::<_, (i64, i64, i64, i64, Decimal)>(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM products WHERE ($1::text IS NULL OR tenant_id = $1)),
                    COUNT(*),
                    COUNT(*) FILTER (WHERE stock < $2),
                    COUNT(*) FILTER (WHERE stock = 0),
                    COALESCE(SUM(price * stock), 0)
                FROM product_variants
                WHERE ($1::text IS NULL OR tenant_id = $1)
                "#,
            )
            .bind(scope.tenant_id())
            .bind(low_stock_below)
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(CatalogStats {
            total_products,
            total_variants,
            low_stock_count,
            out_of_stock_count,
            inventory_value,
        })
    }

    async fn variants_for_products(&mut self, product_ids: &[i64]) -> Result<Vec<ProductVariant>, AppError> {
        let variants = sqlx::query_as::<_, ProductVariant>(
            "SELECT * FROM product_variants WHERE product_id = ANY($1) ORDER BY created_at DESC, id DESC",
        )
        .bind(product_ids)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(variants)
    }

    async fn find_variant_by_barcode(&mut self, barcode: &str, scope: &Scope) -> Result<Option<ProductVariant>, AppError> {
        let variant = sqlx::query_as::<_, ProductVariant>(
            "SELECT * FROM product_variants WHERE barcode = $1 AND ($2::text IS NULL OR tenant_id = $2)",
        )
        .bind(barcode)
        .bind(scope.tenant_id())
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(variant)
    }

    async fn find_variant(&mut self, id: i64, scope: &Scope) -> Result<Option<ProductVariant>, AppError> {
        let variant = sqlx::query_as::<_, ProductVariant>(
            "SELECT * FROM product_variants WHERE id = $1 AND ($2::text IS NULL OR tenant_id = $2)",
        )
        .bind(id)
        .bind(scope.tenant_id())
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(variant)
    }

    async fn list_variants(&mut self, product_id: i64, scope: &Scope) -> Result<Vec<ProductVariant>, AppError> {
        let variants = sqlx::query_as::<_, ProductVariant>(
            r#"
            SELECT * FROM product_variants
            WHERE product_id = $1 AND ($2::text IS NULL OR tenant_id = $2)
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(product_id)
        .bind(scope.tenant_id())
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(variants)
    }

    async fn insert_variant(&mut self, variant: NewVariant) -> Result<ProductVariant, AppError> {
        sqlx::query_as::<_, ProductVariant>(
            r#"
            INSERT INTO product_variants (barcode, weight, price, stock, product_id, tenant_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&variant.barcode)
        .bind(variant.weight)
        .bind(variant.price)
        .bind(variant.stock)
        .bind(variant.product_id)
        .bind(&variant.tenant_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| barcode_error(e, &variant.barcode))
    }

    async fn update_variant(&mut self, id: i64, changes: VariantChanges) -> Result<ProductVariant, AppError> {
        let barcode = changes.barcode.clone().unwrap_or_default();
        sqlx::query_as::<_, ProductVariant>(
            r#"
            UPDATE product_variants
            SET barcode = COALESCE($2, barcode),
                weight = COALESCE($3, weight),
                price = COALESCE($4, price),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(changes.barcode)
        .bind(changes.weight)
        .bind(changes.price)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| barcode_error(e, &barcode))
    }

    async fn delete_variant(&mut self, id: i64) -> Result<(), AppError> {
        sqlx::query("DELETE FROM product_variants WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_variants_of_product(&mut self, product_id: i64) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM product_variants WHERE product_id = $1")
            .bind(product_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn variant_is_invoiced(&mut self, id: i64) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM invoice_items WHERE variant_id = $1)",
        )
        .bind(id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn low_stock_variants(&mut self, threshold: i32, scope: &Scope) -> Result<Vec<ProductVariant>, AppError> {
        let variants = sqlx::query_as::<_, ProductVariant>(
            r#"
            SELECT * FROM product_variants
            WHERE stock <= $1 AND ($2::text IS NULL OR tenant_id = $2)
            ORDER BY stock ASC, id ASC
            "#,
        )
        .bind(threshold)
        .bind(scope.tenant_id())
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(variants)
    }

    // ---
    // Estoque
    // ---

    async fn lock_variants(&mut self, ids: &[i64], scope: &Scope) -> Result<Vec<ProductVariant>, AppError> {
        // Ordem crescente de id: lotes concorrentes sobre as mesmas linhas não entram em deadlock
        let variants = sqlx::query_as::<_, ProductVariant>(
            r#"
            SELECT * FROM product_variants
            WHERE id = ANY($1) AND ($2::text IS NULL OR tenant_id = $2)
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(ids)
        .bind(scope.tenant_id())
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(variants)
    }

    async fn adjust_stock(&mut self, variant_id: i64, delta: i32) -> Result<Option<i32>, AppError> {
        let stock = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE product_variants
            SET stock = stock + $2, updated_at = NOW()
            WHERE id = $1 AND stock + $2 >= 0
            RETURNING stock
            "#,
        )
        .bind(variant_id)
        .bind(delta)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(stock)
    }

    async fn set_stock(&mut self, variant_id: i64, new_stock: i32) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE product_variants SET stock = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(variant_id)
        .bind(new_stock)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    // ---
    // Reservas
    // ---

    async fn reserved_quantities(
        &mut self,
        variant_ids: &[i64],
        exclude: Option<ReservationKey<'_>>,
    ) -> Result<HashMap<i64, i32>, AppError> {
        let rows = sqlx::query_as::<_, (i64, i32)>(
            r#"
            SELECT variant_id, COALESCE(SUM(quantity), 0)::INT4
            FROM stock_reservations
            WHERE variant_id = ANY($1)
              AND expires_at > NOW()
              AND NOT (reservation_id IS NOT DISTINCT FROM $2 AND user_id IS NOT DISTINCT FROM $3)
            GROUP BY variant_id
            "#,
        )
        .bind(variant_ids)
        .bind(exclude.map(|key| key.reservation_id))
        .bind(exclude.map(|key| key.user_id))
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().collect())
    }

    async fn upsert_reservation(&mut self, reservation: NewReservation) -> Result<StockReservation, AppError> {
        let saved = sqlx::query_as::<_, StockReservation>(
            r#"
            INSERT INTO stock_reservations (reservation_id, user_id, variant_id, tenant_id, quantity, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id, reservation_id, variant_id)
            DO UPDATE SET quantity = EXCLUDED.quantity, expires_at = EXCLUDED.expires_at
            RETURNING *
            "#,
        )
        .bind(&reservation.reservation_id)
        .bind(reservation.user_id)
        .bind(reservation.variant_id)
        .bind(&reservation.tenant_id)
        .bind(reservation.quantity)
        .bind(reservation.expires_at)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(saved)
    }

    async fn delete_reservation(&mut self, key: ReservationKey<'_>, scope: &Scope) -> Result<Vec<i64>, AppError> {
        let variant_ids = sqlx::query_scalar::<_, i64>(
            r#"
            DELETE FROM stock_reservations
            WHERE reservation_id = $1 AND user_id = $2 AND ($3::text IS NULL OR tenant_id = $3)
            RETURNING variant_id
            "#,
        )
        .bind(key.reservation_id)
        .bind(key.user_id)
        .bind(scope.tenant_id())
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(variant_ids)
    }

    async fn purge_expired_reservations(&mut self) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM stock_reservations WHERE expires_at <= NOW()")
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    // ---
    // Notas
    // ---

    async fn insert_invoice(&mut self, total_amount: Decimal, user_id: i64, tenant_id: &str) -> Result<Invoice, AppError> {
        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            INSERT INTO invoices (total_amount, user_id, tenant_id)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(total_amount)
        .bind(user_id)
        .bind(tenant_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(invoice)
    }

    async fn insert_invoice_item(&mut self, item: NewInvoiceItem) -> Result<InvoiceItem, AppError> {
        let saved = sqlx::query_as::<_, InvoiceItem>(
            r#"
            INSERT INTO invoice_items (invoice_id, variant_id, quantity, unit_price, total_price)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(item.invoice_id)
        .bind(item.variant_id)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.total_price)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(saved)
    }

    async fn list_invoices(&mut self, filter: &InvoiceFilter, limit: i64, offset: i64) -> Result<Vec<Invoice>, AppError> {
        let invoices = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT * FROM invoices
            WHERE ($1::text IS NULL OR tenant_id = $1)
              AND ($2::int8 IS NULL OR user_id = $2)
              AND ($3::timestamptz IS NULL OR created_at >= $3)
              AND ($4::timestamptz IS NULL OR created_at <= $4)
            ORDER BY created_at DESC, id DESC
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(filter.scope.tenant_id())
        .bind(filter.user_id)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(invoices)
    }

    async fn count_invoices(&mut self, filter: &InvoiceFilter) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM invoices
            WHERE ($1::text IS NULL OR tenant_id = $1)
              AND ($2::int8 IS NULL OR user_id = $2)
              AND ($3::timestamptz IS NULL OR created_at >= $3)
              AND ($4::timestamptz IS NULL OR created_at <= $4)
            "#,
        )
        .bind(filter.scope.tenant_id())
        .bind(filter.user_id)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count)
    }

    async fn find_invoice(&mut self, id: i64, scope: &Scope, user_id: Option<i64>) -> Result<Option<Invoice>, AppError> {
        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT * FROM invoices
            WHERE id = $1
              AND ($2::text IS NULL OR tenant_id = $2)
              AND ($3::int8 IS NULL OR user_id = $3)
            "#,
        )
        .bind(id)
        .bind(scope.tenant_id())
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(invoice)
    }

    async fn invoice_lines(&mut self, invoice_ids: &[i64]) -> Result<Vec<InvoiceLine>, AppError> {
        let items = sqlx::query_as::<_, InvoiceItem>(
            "SELECT * FROM invoice_items WHERE invoice_id = ANY($1) ORDER BY invoice_id, id",
        )
        .bind(invoice_ids)
        .fetch_all(&mut *self.tx)
        .await?;

        let variant_ids: Vec<i64> = items.iter().map(|i| i.variant_id).collect();
        let variants: HashMap<i64, ProductVariant> = sqlx::query_as::<_, ProductVariant>(
            "SELECT * FROM product_variants WHERE id = ANY($1)",
        )
        .bind(&variant_ids)
        .fetch_all(&mut *self.tx)
        .await?
        .into_iter()
        .map(|v| (v.id, v))
        .collect();

        let product_ids: Vec<i64> = variants.values().map(|v| v.product_id).collect();
        let products: HashMap<i64, Product> = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE id = ANY($1)",
        )
        .bind(&product_ids)
        .fetch_all(&mut *self.tx)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

        items
            .into_iter()
            .map(|item| -> Result<InvoiceLine, AppError> {
                let variant = variants.get(&item.variant_id).cloned().ok_or_else(|| {
                    anyhow::anyhow!("Item {} aponta para variante inexistente", item.id)
                })?;
                let product = products.get(&variant.product_id).cloned().ok_or_else(|| {
                    anyhow::anyhow!("Variante {} aponta para produto inexistente", variant.id)
                })?;
                Ok(InvoiceLine { item, variant, product })
            })
            .collect()
    }

    async fn movement_history(
        &mut self,
        variant_id: Option<i64>,
        scope: &Scope,
        limit: i64,
    ) -> Result<Vec<MovementHistoryEntry>, AppError> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT ii.id          AS invoice_item_id,
                   ii.invoice_id,
                   ii.variant_id,
                   v.barcode,
                   p.name         AS product_name,
                   ii.quantity,
                   ii.unit_price,
                   ii.total_price,
                   u.id           AS seller_id,
                   u.email        AS seller_email,
                   u.role         AS seller_role,
                   ii.created_at
            FROM invoice_items ii
            JOIN product_variants v ON v.id = ii.variant_id
            JOIN products p         ON p.id = v.product_id
            JOIN invoices i         ON i.id = ii.invoice_id
            JOIN users u            ON u.id = i.user_id
            WHERE ($1::int8 IS NULL OR ii.variant_id = $1)
              AND ($2::text IS NULL OR v.tenant_id = $2)
            ORDER BY ii.created_at DESC, ii.id DESC
            LIMIT $3
            "#,
        )
        .bind(variant_id)
        .bind(scope.tenant_id())
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(MovementHistoryEntry::from).collect())
    }

    // ---
    // Relatórios
    // ---

    async fn sales_lines(&mut self, filter: &InvoiceFilter) -> Result<Vec<SaleLine>, AppError> {
        let lines = sqlx::query_as::<_, SaleLine>(
            r#"
            SELECT i.id           AS invoice_id,
                   i.tenant_id,
                   t.name         AS tenant_name,
                   i.total_amount AS invoice_total,
                   i.created_at,
                   p.id           AS product_id,
                   p.name         AS product_name,
                   p.category,
                   ii.quantity,
                   ii.total_price
            FROM invoice_items ii
            JOIN invoices i ON i.id = ii.invoice_id
            JOIN tenants t ON t.id = i.tenant_id
            JOIN product_variants v ON v.id = ii.variant_id
            JOIN products p ON p.id = v.product_id
            WHERE ($1::text IS NULL OR i.tenant_id = $1)
              AND ($2::int8 IS NULL OR i.user_id = $2)
              AND ($3::timestamptz IS NULL OR i.created_at >= $3)
              AND ($4::timestamptz IS NULL OR i.created_at <= $4)
            ORDER BY i.created_at DESC, i.id DESC, ii.id
            "#,
        )
        .bind(filter.scope.tenant_id())
        .bind(filter.user_id)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(lines)
    }

    async fn inventory_levels(
        &mut self,
        scope: &Scope,
        low_stock_at_or_below: i32,
    ) -> Result<Vec<TenantInventoryLevel>, AppError> {
        let levels = sqlx::query_as::<_, TenantInventoryLevel>(
            r#"
            SELECT v.tenant_id,
                   t.name                                      AS tenant_name,
                   COALESCE(SUM(v.stock), 0)::INT8             AS total_stock,
                   COUNT(*)                                    AS total_variants,
                   COUNT(*) FILTER (WHERE v.stock <= $2)       AS low_stock_count
            FROM product_variants v
            JOIN tenants t ON t.id = v.tenant_id
            WHERE ($1::text IS NULL OR v.tenant_id = $1)
            GROUP BY v.tenant_id, t.name
            ORDER BY t.name
            "#,
        )
        .bind(scope.tenant_id())
        .bind(low_stock_at_or_below)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(levels)
    }
}
