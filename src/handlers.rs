use serde::Deserialize;

pub mod catalog;
pub mod inventory;
pub mod invoices;
pub mod reports;
pub mod tenancy;

// `?tenantId=` em qualquer rota com escopo de loja
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeQuery {
    pub tenant_id: Option<String>,
}
