//src/main.rs

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post, put},
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod common;
mod config;
mod db;
mod handlers;
mod middleware;
mod models;
mod services;

use crate::config::{AppState, Config};
use crate::middleware::auth::auth_guard;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG manda; sem ele, nível info
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let config = Config::from_env()?;
    let app_state = AppState::new(&config).await?;

    // Faz o app rodar as migrações do SQLx na inicialização
    sqlx::migrate!().run(&app_state.db_pool).await?;
    tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");

    // Catálogo: produtos e variantes
    let catalog_routes = Router::new()
        .route(
            "/products",
            get(handlers::catalog::list_products).post(handlers::catalog::create_product),
        )
        .route("/products/stats", get(handlers::catalog::catalog_stats))
        .route(
            "/products/{id}",
            get(handlers::catalog::get_product)
                .put(handlers::catalog::update_product)
                .delete(handlers::catalog::delete_product),
        )
        .route(
            "/products/{id}/variants",
            get(handlers::catalog::list_variants).post(handlers::catalog::create_variant),
        )
        .route("/variants/barcode/{barcode}", get(handlers::catalog::get_variant_by_barcode))
        .route(
            "/variants/{id}",
            put(handlers::catalog::update_variant).delete(handlers::catalog::delete_variant),
        )
        .route("/variants/{id}/stock", put(handlers::catalog::adjust_variant_stock));

    // Motor de transações de estoque
    let inventory_routes = Router::new()
        .route("/movements", post(handlers::inventory::perform_stock_movements))
        .route("/bulk-stock", put(handlers::inventory::perform_bulk_stock_update))
        .route("/transfer", post(handlers::inventory::transfer_stock))
        .route("/reservations", post(handlers::inventory::reserve_stock))
        .route(
            "/reservations/{reservation_id}",
            delete(handlers::inventory::release_reservation),
        )
        .route("/low-stock", get(handlers::inventory::get_low_stock_variants))
        .route("/history", get(handlers::inventory::get_stock_movement_history));

    let invoice_routes = Router::new()
        .route(
            "/",
            get(handlers::invoices::get_invoices).post(handlers::invoices::create_invoice),
        )
        .route("/count", get(handlers::invoices::get_invoices_count))
        .route("/{id}", get(handlers::invoices::get_invoice_by_id));

    let admin_routes = Router::new()
        .route("/users", get(handlers::tenancy::list_users))
        .route("/reports/sales", get(handlers::reports::sales_report))
        .route(
            "/tenants",
            get(handlers::tenancy::list_tenants).post(handlers::tenancy::create_tenant),
        )
        .route(
            "/tenants/{id}",
            put(handlers::tenancy::update_tenant).delete(handlers::tenancy::delete_tenant),
        )
        .route(
            "/tenants/{id}/users",
            get(handlers::tenancy::list_tenant_users).post(handlers::tenancy::assign_user_to_tenant),
        )
        .route(
            "/tenants/{id}/users/{user_id}",
            delete(handlers::tenancy::remove_user_from_tenant),
        );

    // Tudo sob /api exige o Bearer token
    let api_routes = Router::new()
        .merge(catalog_routes)
        .nest("/inventory", inventory_routes)
        .nest("/invoices", invoice_routes)
        .nest("/admin", admin_routes)
        .layer(axum_middleware::from_fn_with_state(app_state.clone(), auth_guard));

    let app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .nest("/api", api_routes)
        .with_state(app_state);

    // Inicia o servidor
    let listener = TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("🚀 Servidor escutando em {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
