// src/services/invoice_service.rs

use std::{collections::HashMap, sync::Arc};

use anyhow::anyhow;
use validator::Validate;

use crate::{
    common::{error::AppError, validation::single_field_error},
    db::{Store, StoreTx, repository::InvoiceFilter},
    middleware::tenancy::TenantContext,
    models::{
        auth::UserSummary,
        invoice::{CreateInvoicePayload, Invoice, InvoiceDetails, InvoiceLine, InvoiceQuery},
        tenancy::default_limit,
    },
    services::inventory_service::InventoryService,
};

#[derive(Clone)]
pub struct InvoiceService {
    store: Arc<dyn Store>,
    inventory_service: InventoryService,
}

impl InvoiceService {
    pub fn new(store: Arc<dyn Store>, inventory_service: InventoryService) -> Self {
        Self { store, inventory_service }
    }

    // Um único caminho de criação: o motor de estoque faz tudo numa transação.
    pub async fn create_invoice(
        &self,
        ctx: &TenantContext,
        payload: &CreateInvoicePayload,
    ) -> Result<InvoiceDetails, AppError> {
        self.inventory_service
            .create_invoice_with_stock_reduction(ctx, payload)
            .await
    }

    pub async fn get_invoices(
        &self,
        ctx: &TenantContext,
        query: &InvoiceQuery,
    ) -> Result<Vec<InvoiceDetails>, AppError> {
        let filter = self.build_filter(ctx, query)?;
        let limit = query.limit.unwrap_or_else(default_limit);
        let offset = query.offset.unwrap_or(0);

        let mut tx = self.store.begin().await?;
        let invoices = tx.list_invoices(&filter, limit, offset).await?;

        let ids: Vec<i64> = invoices.iter().map(|i| i.id).collect();
        let mut lines_by_invoice: HashMap<i64, Vec<InvoiceLine>> = HashMap::new();
        for line in tx.invoice_lines(&ids).await? {
            lines_by_invoice.entry(line.item.invoice_id).or_default().push(line);
        }

        let mut details = Vec::with_capacity(invoices.len());
        for invoice in invoices {
            let items = lines_by_invoice.remove(&invoice.id).unwrap_or_default();
            details.push(attach_parties(tx.as_mut(), invoice, items).await?);
        }
        tx.commit().await?;

        Ok(details)
    }

    pub async fn get_invoices_count(
        &self,
        ctx: &TenantContext,
        query: &InvoiceQuery,
    ) -> Result<i64, AppError> {
        let filter = self.build_filter(ctx, query)?;

        let mut tx = self.store.begin().await?;
        let count = tx.count_invoices(&filter).await?;
        tx.commit().await?;
        Ok(count)
    }

    pub async fn get_invoice_by_id(
        &self,
        ctx: &TenantContext,
        id: i64,
        requested: Option<&str>,
    ) -> Result<InvoiceDetails, AppError> {
        let scope = ctx.authorize(requested)?;
        // Vendedor: além da loja, só as próprias notas
        let owner = ctx.invoice_owner_filter(None);

        let mut tx = self.store.begin().await?;
        let invoice = tx
            .find_invoice(id, &scope, owner)
            .await?
            .ok_or(AppError::NotFoundOrDenied("Nota"))?;
        let details = load_invoice_details(tx.as_mut(), invoice).await?;
        tx.commit().await?;

        Ok(details)
    }

    // Validação + escopo + restrição por vendedor, antes de tocar no banco
    fn build_filter(&self, ctx: &TenantContext, query: &InvoiceQuery) -> Result<InvoiceFilter, AppError> {
        query.validate()?;
        if let (Some(start), Some(end)) = (query.start_date, query.end_date) {
            if start > end {
                return Err(AppError::ValidationFailed(single_field_error(
                    "startDate",
                    "range",
                    "A data inicial deve ser anterior à data final.",
                )));
            }
        }

        let scope = ctx.authorize(query.tenant_id.as_deref())?;
        Ok(InvoiceFilter {
            scope,
            user_id: ctx.invoice_owner_filter(query.user_id),
            start_date: query.start_date,
            end_date: query.end_date,
        })
    }
}

/// Monta a visão completa de uma nota já gravada (itens, variante, produto, vendedor, loja).
pub(crate) async fn load_invoice_details(
    tx: &mut dyn StoreTx,
    invoice: Invoice,
) -> Result<InvoiceDetails, AppError> {
    let items = tx.invoice_lines(&[invoice.id]).await?;
    attach_parties(tx, invoice, items).await
}

async fn attach_parties(
    tx: &mut dyn StoreTx,
    invoice: Invoice,
    items: Vec<InvoiceLine>,
) -> Result<InvoiceDetails, AppError> {
    let user = tx
        .find_user(invoice.user_id)
        .await?
        .ok_or_else(|| anyhow!("Nota {} sem vendedor {}", invoice.id, invoice.user_id))?;
    let tenant = tx
        .find_tenant(&invoice.tenant_id)
        .await?
        .ok_or_else(|| anyhow!("Nota {} sem loja {}", invoice.id, invoice.tenant_id))?;

    Ok(InvoiceDetails {
        invoice,
        items,
        user: UserSummary::from(&user),
        tenant,
    })
}
