// src/config.rs

use std::{env, sync::Arc, time::Duration};

use anyhow::Context;
use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::{
    db::{PgStore, Store},
    services::{
        auth::AuthService, catalog_service::CatalogService, inventory_service::InventoryService,
        invoice_service::InvoiceService, report_service::ReportService, tenancy_service::TenantService,
    },
};

// ---
// Configuração lida do ambiente (.env)
// ---
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub database_max_connections: u32,
    pub reservation_ttl_secs: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").context("DATABASE_URL deve ser definida")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET deve ser definido")?;
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let database_max_connections = parse_or("DATABASE_MAX_CONNECTIONS", 5)?;
        let reservation_ttl_secs = parse_or("RESERVATION_TTL_SECS", 900)?;
        if reservation_ttl_secs <= 0 {
            anyhow::bail!("RESERVATION_TTL_SECS deve ser positivo");
        }

        Ok(Self {
            database_url,
            jwt_secret,
            bind_addr,
            database_max_connections,
            reservation_ttl_secs,
        })
    }
}

fn parse_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} inválido: '{raw}'")),
        Err(_) => Ok(default),
    }
}

// ---
// Estado compartilhado, montado uma vez na inicialização
// ---
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub auth_service: AuthService,
    pub catalog_service: CatalogService,
    pub inventory_service: InventoryService,
    pub invoice_service: InvoiceService,
    pub report_service: ReportService,
    pub tenant_service: TenantService,
}

impl AppState {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let db_pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&config.database_url)
            .await
            .context("Falha ao conectar ao banco de dados")?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        // --- Monta o gráfico de dependências ---
        let store: Arc<dyn Store> = Arc::new(PgStore::new(db_pool.clone()));
        let reservation_ttl = chrono::Duration::seconds(config.reservation_ttl_secs);

        let inventory_service = InventoryService::new(store.clone(), reservation_ttl);
        let invoice_service = InvoiceService::new(store.clone(), inventory_service.clone());

        Ok(Self {
            db_pool,
            auth_service: AuthService::new(config.jwt_secret.clone()),
            catalog_service: CatalogService::new(store.clone()),
            inventory_service,
            invoice_service,
            report_service: ReportService::new(store.clone()),
            tenant_service: TenantService::new(store),
        })
    }
}
