// src/services/catalog_service.rs

use std::sync::Arc;

use validator::Validate;

use crate::{
    common::{
        error::AppError,
        validation::{normalize_optional, single_field_error},
    },
    db::{
        Store,
        repository::{NewProduct, NewVariant, ProductChanges, ProductFilter, VariantChanges},
    },
    middleware::tenancy::TenantContext,
    models::{
        catalog::{
            CatalogStats, CreateProductPayload, CreateVariantPayload, Product, ProductQuery,
            ProductVariant, ProductWithVariants, STATS_LOW_STOCK_BELOW, UpdateProductPayload,
            UpdateVariantPayload, VariantWithProduct,
        },
        tenancy::default_limit,
    },
};

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn Store>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    // ---
    // Produtos
    // ---

    pub async fn list_products(
        &self,
        ctx: &TenantContext,
        query: &ProductQuery,
    ) -> Result<Vec<ProductWithVariants>, AppError> {
        query.validate()?;
        let scope = ctx.authorize(query.tenant_id.as_deref())?;
        let filter = ProductFilter {
            scope,
            category: normalize_optional(query.category.as_deref()),
            limit: query.limit.unwrap_or_else(default_limit),
            offset: query.offset.unwrap_or(0),
        };

        let mut tx = self.store.begin().await?;
        let products = tx.list_products(&filter).await?;
        let ids: Vec<i64> = products.iter().map(|p| p.id).collect();
        let mut variants = tx.variants_for_products(&ids).await?;
        tx.commit().await?;

        Ok(products
            .into_iter()
            .map(|product| {
                let (own, rest): (Vec<_>, Vec<_>) =
                    variants.drain(..).partition(|v| v.product_id == product.id);
                variants = rest;
                ProductWithVariants { product, variants: own }
            })
            .collect())
    }

    pub async fn get_product(
        &self,
        ctx: &TenantContext,
        id: i64,
        requested: Option<&str>,
    ) -> Result<ProductWithVariants, AppError> {
        let scope = ctx.authorize(requested)?;

        let mut tx = self.store.begin().await?;
        let product = tx
            .find_product(id, &scope)
            .await?
            .ok_or(AppError::NotFoundOrDenied("Produto"))?;
        let variants = tx.list_variants(product.id, &scope).await?;
        tx.commit().await?;

        Ok(ProductWithVariants { product, variants })
    }

    pub async fn create_product(
        &self,
        ctx: &TenantContext,
        payload: &CreateProductPayload,
    ) -> Result<Product, AppError> {
        payload.validate()?;
        let tenant_id = ctx.require_tenant(payload.tenant_id.as_deref())?;

        let mut tx = self.store.begin().await?;
        let product = tx
            .insert_product(NewProduct {
                name: payload.name.trim().to_string(),
                description: normalize_optional(payload.description.as_deref()),
                category: normalize_optional(payload.category.as_deref()),
                tenant_id,
            })
            .await?;
        tx.commit().await?;

        tracing::info!(product_id = product.id, tenant_id = %product.tenant_id, "Produto criado");
        Ok(product)
    }

    pub async fn update_product(
        &self,
        ctx: &TenantContext,
        id: i64,
        payload: &UpdateProductPayload,
        requested: Option<&str>,
    ) -> Result<Product, AppError> {
        payload.validate()?;
        let scope = ctx.authorize(requested)?;

        let mut tx = self.store.begin().await?;
        tx.find_product(id, &scope)
            .await?
            .ok_or(AppError::NotFoundOrDenied("Produto"))?;
        let product = tx
            .update_product(
                id,
                // Campo ausente não muda nada; campo em branco limpa o valor
                ProductChanges {
                    name: payload.name.as_deref().map(|n| n.trim().to_string()),
                    description: payload.description.as_deref().map(|d| normalize_optional(Some(d))),
                    category: payload.category.as_deref().map(|c| normalize_optional(Some(c))),
                },
            )
            .await?;
        tx.commit().await?;

        Ok(product)
    }

    /// Remove as variantes e o produto numa única transação.
    pub async fn delete_product(
        &self,
        ctx: &TenantContext,
        id: i64,
        requested: Option<&str>,
    ) -> Result<(), AppError> {
        let scope = ctx.authorize(requested)?;

        let mut tx = self.store.begin().await?;
        tx.find_product(id, &scope)
            .await?
            .ok_or(AppError::NotFoundOrDenied("Produto"))?;
        if tx.product_has_invoiced_variants(id).await? {
            return Err(AppError::ReferencedByInvoices { entity: "Produto", id });
        }
        let removed_variants = tx.delete_variants_of_product(id).await?;
        tx.delete_product(id).await?;
        tx.commit().await?;

        tracing::info!(product_id = id, removed_variants, "Produto removido");
        Ok(())
    }

    pub async fn catalog_stats(
        &self,
        ctx: &TenantContext,
        requested: Option<&str>,
    ) -> Result<CatalogStats, AppError> {
        let scope = ctx.authorize(requested)?;

        let mut tx = self.store.begin().await?;
        let stats = tx.catalog_stats(&scope, STATS_LOW_STOCK_BELOW).await?;
        tx.commit().await?;
        Ok(stats)
    }

    // ---
    // Variantes
    // ---

    pub async fn get_variant_by_barcode(
        &self,
        ctx: &TenantContext,
        barcode: &str,
        requested: Option<&str>,
    ) -> Result<VariantWithProduct, AppError> {
        let scope = ctx.authorize(requested)?;
        let barcode = barcode.trim();
        if barcode.is_empty() {
            return Err(AppError::ValidationFailed(single_field_error(
                "barcode",
                "required",
                "O código de barras é obrigatório.",
            )));
        }

        let mut tx = self.store.begin().await?;
        let variant = tx
            .find_variant_by_barcode(barcode, &scope)
            .await?
            .ok_or(AppError::NotFoundOrDenied("Variante"))?;
        let product = tx
            .find_product(variant.product_id, &scope)
            .await?
            .ok_or(AppError::NotFoundOrDenied("Produto"))?;
        tx.commit().await?;

        Ok(VariantWithProduct { variant, product })
    }

    pub async fn list_variants(
        &self,
        ctx: &TenantContext,
        product_id: i64,
        requested: Option<&str>,
    ) -> Result<Vec<ProductVariant>, AppError> {
        let scope = ctx.authorize(requested)?;

        let mut tx = self.store.begin().await?;
        tx.find_product(product_id, &scope)
            .await?
            .ok_or(AppError::NotFoundOrDenied("Produto"))?;
        let variants = tx.list_variants(product_id, &scope).await?;
        tx.commit().await?;
        Ok(variants)
    }

    pub async fn create_variant(
        &self,
        ctx: &TenantContext,
        product_id: i64,
        payload: &CreateVariantPayload,
    ) -> Result<ProductVariant, AppError> {
        payload.validate()?;
        let scope = ctx.authorize(payload.tenant_id.as_deref())?;

        let mut tx = self.store.begin().await?;
        // A variante herda a loja do produto
        let product = tx
            .find_product(product_id, &scope)
            .await?
            .ok_or(AppError::NotFoundOrDenied("Produto"))?;
        let variant = tx
            .insert_variant(NewVariant {
                barcode: payload.barcode.trim().to_string(),
                weight: payload.weight,
                price: payload.price,
                stock: payload.stock,
                product_id: product.id,
                tenant_id: product.tenant_id,
            })
            .await?;
        tx.commit().await?;

        tracing::info!(variant_id = variant.id, barcode = %variant.barcode, "Variante criada");
        Ok(variant)
    }

    /// Altera código, peso e preço. O estoque só muda pelo motor de transações.
    pub async fn update_variant(
        &self,
        ctx: &TenantContext,
        id: i64,
        payload: &UpdateVariantPayload,
        requested: Option<&str>,
    ) -> Result<ProductVariant, AppError> {
        payload.validate()?;
        let scope = ctx.authorize(requested)?;

        let mut tx = self.store.begin().await?;
        tx.find_variant(id, &scope)
            .await?
            .ok_or(AppError::NotFoundOrDenied("Variante"))?;
        let variant = tx
            .update_variant(
                id,
                VariantChanges {
                    barcode: payload.barcode.as_deref().map(|b| b.trim().to_string()),
                    weight: payload.weight,
                    price: payload.price,
                },
            )
            .await?;
        tx.commit().await?;

        Ok(variant)
    }

    pub async fn delete_variant(
        &self,
        ctx: &TenantContext,
        id: i64,
        requested: Option<&str>,
    ) -> Result<(), AppError> {
        let scope = ctx.authorize(requested)?;

        let mut tx = self.store.begin().await?;
        tx.find_variant(id, &scope)
            .await?
            .ok_or(AppError::NotFoundOrDenied("Variante"))?;
        if tx.variant_is_invoiced(id).await? {
            return Err(AppError::ReferencedByInvoices { entity: "Variante", id });
        }
        tx.delete_variant(id).await?;
        tx.commit().await?;

        tracing::info!(variant_id = id, "Variante removida");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::MemoryStore,
        models::{
            auth::Role,
            invoice::{CreateInvoicePayload, InvoiceItemInput},
        },
        services::inventory_service::InventoryService,
    };
    use rust_decimal::Decimal;

    struct Fixture {
        store: MemoryStore,
        service: CatalogService,
        seller: TenantContext,
        admin: TenantContext,
    }

    async fn fixture() -> Fixture {
        let store = MemoryStore::new();
        store.seed_tenant("A", "Loja A").await;
        store.seed_tenant("B", "Loja B").await;
        let seller = store.seed_user("vendedor@a.com", Role::Seller, Some("A")).await;
        let admin = store.seed_user("admin@x.com", Role::Admin, None).await;

        Fixture {
            service: CatalogService::new(Arc::new(store.clone())),
            store,
            seller: TenantContext::new(seller.id, Role::Seller, Some("A".into())),
            admin: TenantContext::new(admin.id, Role::Admin, None),
        }
    }

    fn new_product(name: &str, tenant_id: Option<&str>) -> CreateProductPayload {
        CreateProductPayload {
            name: name.into(),
            description: Some("  ".into()),
            category: Some("Roupas".into()),
            tenant_id: tenant_id.map(str::to_string),
        }
    }

    fn new_variant(barcode: &str, stock: i32) -> CreateVariantPayload {
        CreateVariantPayload {
            barcode: barcode.into(),
            weight: Decimal::new(250, 3),
            price: Decimal::new(1990, 2),
            stock,
            tenant_id: None,
        }
    }

    #[tokio::test]
    async fn seller_creates_products_in_own_tenant() {
        let f = fixture().await;

        let product = f.service.create_product(&f.seller, &new_product(" Camiseta ", None)).await.unwrap();
        assert_eq!(product.tenant_id, "A");
        assert_eq!(product.name, "Camiseta");
        // Texto em branco vira ausência de valor
        assert_eq!(product.description, None);
    }

    #[tokio::test]
    async fn cross_tenant_listing_fails_without_touching_storage() {
        let f = fixture().await;

        let query = ProductQuery { tenant_id: Some("B".into()), ..Default::default() };
        let err = f.service.list_products(&f.seller, &query).await.unwrap_err();

        assert!(matches!(err, AppError::CrossTenantAccessDenied));
        assert_eq!(f.store.transactions_started(), 0);
    }

    #[tokio::test]
    async fn listing_is_scoped_and_carries_variants() {
        let f = fixture().await;
        let mine = f.store.seed_product("A", "Meu").await;
        f.store.seed_variant(&mine, "M-1", Decimal::ONE, 1).await;
        f.store.seed_variant(&mine, "M-2", Decimal::ONE, 2).await;
        f.store.seed_product("B", "Deles").await;

        let listed = f.service.list_products(&f.seller, &ProductQuery::default()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].variants.len(), 2);

        let everything = f.service.list_products(&f.admin, &ProductQuery::default()).await.unwrap();
        assert_eq!(everything.len(), 2);
    }

    #[tokio::test]
    async fn products_of_other_tenants_look_missing() {
        let f = fixture().await;
        let theirs = f.store.seed_product("B", "Deles").await;

        let err = f.service.get_product(&f.seller, theirs.id, None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFoundOrDenied("Produto")));

        let err = f.service.get_product(&f.seller, 987654, None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFoundOrDenied("Produto")));
    }

    #[tokio::test]
    async fn invalid_product_reports_every_field() {
        let f = fixture().await;
        let payload = CreateProductPayload {
            name: "   ".into(),
            description: Some("x".repeat(1001)),
            category: None,
            tenant_id: None,
        };

        let err = f.service.create_product(&f.seller, &payload).await.unwrap_err();
        let AppError::ValidationFailed(errors) = err else {
            panic!("esperava erro de validação");
        };
        let fields = errors.field_errors();
        assert!(fields.contains_key("name"));
        assert!(fields.contains_key("description"));
        assert_eq!(f.store.transactions_started(), 0);
    }

    #[tokio::test]
    async fn barcode_is_unique_across_tenants() {
        let f = fixture().await;
        let theirs = f.store.seed_product("B", "Deles").await;
        f.store.seed_variant(&theirs, "789-XYZ", Decimal::ONE, 1).await;
        let mine = f.store.seed_product("A", "Meu").await;

        let err = f
            .service
            .create_variant(&f.seller, mine.id, &new_variant("789-XYZ", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateBarcode(ref b) if b == "789-XYZ"));
    }

    #[tokio::test]
    async fn barcode_syntax_is_restricted() {
        let f = fixture().await;
        let mine = f.store.seed_product("A", "Meu").await;

        let err = f
            .service
            .create_variant(&f.seller, mine.id, &new_variant("ABC 123!", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn variant_inherits_tenant_and_resolves_by_barcode() {
        let f = fixture().await;
        let mine = f.store.seed_product("A", "Meu").await;

        let variant = f.service.create_variant(&f.seller, mine.id, &new_variant(" SKU-1 ", 7)).await.unwrap();
        assert_eq!(variant.tenant_id, "A");
        assert_eq!(variant.barcode, "SKU-1");

        let found = f.service.get_variant_by_barcode(&f.seller, "SKU-1", None).await.unwrap();
        assert_eq!(found.variant.id, variant.id);
        assert_eq!(found.product.id, mine.id);

        let other_seller = TenantContext::new(999, Role::Seller, Some("B".into()));
        let err = f.service.get_variant_by_barcode(&other_seller, "SKU-1", None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFoundOrDenied("Variante")));
    }

    #[tokio::test]
    async fn blank_fields_clear_product_text_and_missing_fields_keep_it() {
        let f = fixture().await;
        let product = f.service.create_product(&f.seller, &new_product("Camisa", None)).await.unwrap();
        assert_eq!(product.category.as_deref(), Some("Roupas"));

        let patch = UpdateProductPayload { description: Some("Algodão".into()), ..Default::default() };
        let updated = f.service.update_product(&f.seller, product.id, &patch, None).await.unwrap();
        assert_eq!(updated.description.as_deref(), Some("Algodão"));
        assert_eq!(updated.category.as_deref(), Some("Roupas"));

        let clear = UpdateProductPayload { category: Some(" ".into()), ..Default::default() };
        let updated = f.service.update_product(&f.seller, product.id, &clear, None).await.unwrap();
        assert_eq!(updated.category, None);
        assert_eq!(updated.description.as_deref(), Some("Algodão"));
    }

    #[tokio::test]
    async fn variant_price_and_weight_must_fit_their_columns() {
        let f = fixture().await;
        let mine = f.store.seed_product("A", "Meu").await;

        let mut payload = new_variant("SKU-1", 1);
        payload.price = Decimal::new(1, 3);
        let err = f.service.create_variant(&f.seller, mine.id, &payload).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationFailed(_)));

        let mut payload = new_variant("SKU-1", 1);
        payload.weight = Decimal::new(10_000_000, 0);
        let err = f.service.create_variant(&f.seller, mine.id, &payload).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationFailed(_)));

        assert_eq!(f.store.transactions_started(), 0);
    }

    #[tokio::test]
    async fn update_variant_never_touches_stock() {
        let f = fixture().await;
        let mine = f.store.seed_product("A", "Meu").await;
        let variant = f.store.seed_variant(&mine, "SKU-1", Decimal::ONE, 7).await;

        let patch = UpdateVariantPayload { price: Some(Decimal::new(500, 2)), ..Default::default() };
        let updated = f.service.update_variant(&f.seller, variant.id, &patch, None).await.unwrap();

        assert_eq!(updated.price, Decimal::new(500, 2));
        assert_eq!(updated.stock, 7);
        assert_eq!(updated.barcode, "SKU-1");
    }

    #[tokio::test]
    async fn deleting_a_product_removes_its_variants_atomically() {
        let f = fixture().await;
        let mine = f.store.seed_product("A", "Meu").await;
        let variant = f.store.seed_variant(&mine, "SKU-1", Decimal::ONE, 7).await;

        f.service.delete_product(&f.seller, mine.id, None).await.unwrap();

        assert_eq!(f.store.stock_of(variant.id).await, None);
        let err = f.service.get_product(&f.seller, mine.id, None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFoundOrDenied(_)));
    }

    #[tokio::test]
    async fn invoiced_variants_block_deletion() {
        let f = fixture().await;
        let mine = f.store.seed_product("A", "Meu").await;
        let variant = f.store.seed_variant(&mine, "SKU-1", Decimal::ONE, 7).await;

        let inventory = InventoryService::new(Arc::new(f.store.clone()), chrono::Duration::minutes(15));
        let sale = CreateInvoicePayload {
            items: vec![InvoiceItemInput { variant_id: variant.id, quantity: 1, unit_price: Decimal::ONE }],
            tenant_id: None,
            reservation_id: None,
        };
        inventory.create_invoice_with_stock_reduction(&f.seller, &sale).await.unwrap();

        let err = f.service.delete_variant(&f.seller, variant.id, None).await.unwrap_err();
        assert!(matches!(err, AppError::ReferencedByInvoices { entity: "Variante", .. }));

        let err = f.service.delete_product(&f.seller, mine.id, None).await.unwrap_err();
        assert!(matches!(err, AppError::ReferencedByInvoices { entity: "Produto", .. }));
        assert_eq!(f.store.stock_of(variant.id).await, Some(6));
    }

    #[tokio::test]
    async fn stats_summarise_the_visible_catalog() {
        let f = fixture().await;
        let mine = f.store.seed_product("A", "Meu").await;
        f.store.seed_variant(&mine, "S-1", Decimal::new(200, 2), 0).await;
        f.store.seed_variant(&mine, "S-2", Decimal::new(100, 2), 5).await;
        f.store.seed_variant(&mine, "S-3", Decimal::new(100, 2), 20).await;
        let theirs = f.store.seed_product("B", "Deles").await;
        f.store.seed_variant(&theirs, "S-4", Decimal::ONE, 1).await;

        let stats = f.service.catalog_stats(&f.seller, None).await.unwrap();
        assert_eq!(stats.total_products, 1);
        assert_eq!(stats.total_variants, 3);
        assert_eq!(stats.low_stock_count, 2);
        assert_eq!(stats.out_of_stock_count, 1);
        assert_eq!(stats.inventory_value, Decimal::new(2500, 2));
    }

    #[tokio::test]
    async fn admin_needs_a_tenant_to_create_products() {
        let f = fixture().await;

        let err = f.service.create_product(&f.admin, &new_product("Sem loja", None)).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationFailed(_)));

        let product = f.service.create_product(&f.admin, &new_product("Com loja", Some("B"))).await.unwrap();
        assert_eq!(product.tenant_id, "B");

        let err = f
            .service
            .create_product(&f.admin, &new_product("Loja fantasma", Some("Z")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFoundOrDenied("Loja")));
    }
}
