// src/services/inventory_service.rs

use std::{collections::HashMap, sync::Arc};

use chrono::{Duration, Utc};
use validator::Validate;

use crate::{
    common::{
        error::AppError,
        validation::{normalize_optional, single_field_error},
    },
    db::{
        Store, StoreTx,
        repository::{NewInvoiceItem, NewReservation, ReservationKey},
    },
    middleware::tenancy::{Scope, TenantContext},
    models::{
        catalog::ProductVariant,
        inventory::{
            BulkStockUpdate, InventoryTransactionResult, MovementHistoryEntry, MovementType,
            ReservationRequest, StockIssue, StockMovement, StockTransfer,
        },
        invoice::{CreateInvoicePayload, InvoiceDetails},
    },
    services::invoice_service::load_invoice_details,
};

pub const DEFAULT_LOW_STOCK_THRESHOLD: i32 = 10;
pub const DEFAULT_HISTORY_LIMIT: i64 = 50;

// Por que um lote não foi gravado: itens rejeitados (dados para o chamador)
// ou uma falha do armazenamento (vai para o log, não para o chamador).
#[derive(Debug)]
enum BatchFailure {
    Rejected(Vec<StockIssue>),
    Storage(AppError),
}

impl From<AppError> for BatchFailure {
    fn from(e: AppError) -> Self {
        BatchFailure::Storage(e)
    }
}

type BatchOutcome = Result<Vec<i64>, BatchFailure>;

/// O motor de transações de estoque. É o único caminho que escreve `stock`.
#[derive(Clone)]
pub struct InventoryService {
    store: Arc<dyn Store>,
    reservation_ttl: Duration,
}

impl InventoryService {
    pub fn new(store: Arc<dyn Store>, reservation_ttl: Duration) -> Self {
        Self { store, reservation_ttl }
    }

    // ---
    // Operações em lote (erros viram dados no resultado)
    // ---

    pub async fn perform_stock_movements(
        &self,
        ctx: &TenantContext,
        movements: &[StockMovement],
        requested: Option<&str>,
    ) -> Result<InventoryTransactionResult, AppError> {
        // 1. Acesso validado uma vez, antes de qualquer transação
        let scope = ctx.authorize(requested)?;
        require_items(movements, "movements")?;

        let outcome = self.run_movements(&scope, movements).await;
        Ok(report("stock_movements", &scope, outcome))
    }

    async fn run_movements(&self, scope: &Scope, movements: &[StockMovement]) -> BatchOutcome {
        let mut tx = self.store.begin().await?;
        let outcome = apply_movements(tx.as_mut(), scope, movements).await;
        settle(tx, outcome).await
    }

    pub async fn perform_bulk_stock_update(
        &self,
        ctx: &TenantContext,
        updates: &[BulkStockUpdate],
        requested: Option<&str>,
    ) -> Result<InventoryTransactionResult, AppError> {
        let scope = ctx.authorize(requested)?;
        require_items(updates, "updates")?;

        let outcome = self.run_bulk_update(&scope, updates).await;
        Ok(report("bulk_stock_update", &scope, outcome))
    }

    async fn run_bulk_update(&self, scope: &Scope, updates: &[BulkStockUpdate]) -> BatchOutcome {
        let mut tx = self.store.begin().await?;
        let outcome = apply_bulk_update(tx.as_mut(), scope, updates).await;
        settle(tx, outcome).await
    }

    pub async fn transfer_stock_between_variants(
        &self,
        ctx: &TenantContext,
        transfer: &StockTransfer,
        requested: Option<&str>,
    ) -> Result<InventoryTransactionResult, AppError> {
        let scope = ctx.authorize(requested)?;
        if transfer.from_variant_id == transfer.to_variant_id {
            return Err(AppError::ValidationFailed(single_field_error(
                "toVariantId",
                "distinct",
                "A variante de destino deve ser diferente da origem.",
            )));
        }

        let outcome = self.run_transfer(&scope, transfer).await;
        Ok(report("stock_transfer", &scope, outcome))
    }

    async fn run_transfer(&self, scope: &Scope, transfer: &StockTransfer) -> BatchOutcome {
        let mut tx = self.store.begin().await?;
        let outcome = apply_transfer(tx.as_mut(), scope, transfer).await;
        settle(tx, outcome).await
    }

    pub async fn reserve_stock(
        &self,
        ctx: &TenantContext,
        reservations: &[ReservationRequest],
        requested: Option<&str>,
    ) -> Result<InventoryTransactionResult, AppError> {
        let scope = ctx.authorize(requested)?;
        require_items(reservations, "reservations")?;

        let expires_at = Utc::now() + self.reservation_ttl;
        let outcome = self.run_reservations(&scope, ctx.user_id(), reservations, expires_at).await;
        Ok(report("reserve_stock", &scope, outcome))
    }

    async fn run_reservations(
        &self,
        scope: &Scope,
        user_id: i64,
        reservations: &[ReservationRequest],
        expires_at: chrono::DateTime<Utc>,
    ) -> BatchOutcome {
        let mut tx = self.store.begin().await?;
        let outcome = apply_reservations(tx.as_mut(), scope, user_id, reservations, expires_at).await;
        settle(tx, outcome).await
    }

    pub async fn release_reservation(
        &self,
        ctx: &TenantContext,
        reservation_id: &str,
        requested: Option<&str>,
    ) -> Result<InventoryTransactionResult, AppError> {
        let scope = ctx.authorize(requested)?;
        // Só o dono libera o próprio carrinho
        let key = ReservationKey { reservation_id: reservation_id.trim(), user_id: ctx.user_id() };

        let outcome = self.run_release(&scope, key).await;
        Ok(report("release_reservation", &scope, outcome))
    }

    async fn run_release(&self, scope: &Scope, key: ReservationKey<'_>) -> BatchOutcome {
        let reservation_id = key.reservation_id;
        let mut tx = self.store.begin().await?;
        let outcome = match tx.delete_reservation(key, scope).await {
            Ok(released) if released.is_empty() => Err(BatchFailure::Rejected(vec![
                StockIssue::InvalidReservation { reservation_id: reservation_id.to_string() },
            ])),
            Ok(released) => Ok(dedup(released)),
            Err(e) => Err(e.into()),
        };
        settle(tx, outcome).await
    }

    // ---
    // Ajuste de uma única variante (erros tipados)
    // ---

    pub async fn adjust_variant_stock(
        &self,
        ctx: &TenantContext,
        variant_id: i64,
        stock_change: i32,
        requested: Option<&str>,
    ) -> Result<ProductVariant, AppError> {
        let scope = ctx.authorize(requested)?;

        let mut tx = self.store.begin().await?;
        let mut variant = tx
            .lock_variants(&[variant_id], &scope)
            .await?
            .into_iter()
            .next()
            .ok_or(AppError::NotFoundOrDenied("Variante"))?;

        if variant.stock.checked_add(stock_change).is_none() {
            return Err(AppError::ValidationFailed(single_field_error(
                "stockChange",
                "range",
                "O ajuste excede o estoque máximo permitido.",
            )));
        }

        if stock_change < 0 {
            let reserved = tx.reserved_quantities(&[variant_id], None).await?;
            let available = unreserved(variant.stock, &reserved, variant_id);
            let requested_out = stock_change.saturating_neg();
            if available < requested_out {
                return Err(AppError::InsufficientStock {
                    variant_id,
                    available,
                    requested: requested_out,
                });
            }
        }

        variant.stock = tx
            .adjust_stock(variant_id, stock_change)
            .await?
            .ok_or(AppError::InsufficientStock {
                variant_id,
                available: variant.stock,
                requested: stock_change.saturating_neg(),
            })?;
        tx.commit().await?;

        tracing::info!(variant_id, stock_change, stock = variant.stock, "Estoque ajustado");
        Ok(variant)
    }

    // ---
    // Nota fiscal com baixa de estoque (um único evento: falha no primeiro erro)
    // ---

    pub async fn create_invoice_with_stock_reduction(
        &self,
        ctx: &TenantContext,
        payload: &CreateInvoicePayload,
    ) -> Result<InvoiceDetails, AppError> {
        payload.validate()?;
        let tenant_id = ctx.require_tenant(payload.tenant_id.as_deref())?;
        let scope = Scope::ScopedTo(tenant_id.clone());
        let reservation_id = normalize_optional(payload.reservation_id.as_deref());
        // O carrinho só vale para quem o reservou
        let own_reservation = reservation_id
            .as_deref()
            .map(|reservation_id| ReservationKey { reservation_id, user_id: ctx.user_id() });
        // Total com o preço informado na venda (não o de catálogo)
        let total_amount = payload.total_amount().ok_or_else(invoice_total_too_large)?;

        let mut tx = self.store.begin().await?;

        // 1. Relê (e bloqueia) todas as variantes dentro da transação
        let ids = distinct_sorted(payload.items.iter().map(|i| i.variant_id));
        let locked = tx.lock_variants(&ids, &scope).await?;
        // As reservas do próprio carrinho contam como disponíveis
        let reserved = tx.reserved_quantities(&ids, own_reservation).await?;
        let mut projected: HashMap<i64, i32> = locked.iter().map(|v| (v.id, v.stock)).collect();

        // 2. Valida na ordem dos itens, parando no primeiro problema
        for item in &payload.items {
            let stock = projected
                .get_mut(&item.variant_id)
                .ok_or(AppError::VariantNotFound { variant_id: item.variant_id })?;
            let available = unreserved(*stock, &reserved, item.variant_id);
            if available < item.quantity {
                return Err(AppError::InsufficientStock {
                    variant_id: item.variant_id,
                    available,
                    requested: item.quantity,
                });
            }
            *stock -= item.quantity;
        }

        // 3. Cabeçalho da nota
        let invoice = tx.insert_invoice(total_amount, ctx.user_id(), &tenant_id).await?;

        // 4. Itens e baixas, na ordem em que foram enviados
        for item in &payload.items {
            tx.insert_invoice_item(NewInvoiceItem {
                invoice_id: invoice.id,
                variant_id: item.variant_id,
                quantity: item.quantity,
                unit_price: item.unit_price,
                total_price: item.total_price().ok_or_else(invoice_total_too_large)?,
            })
            .await?;

            tx.adjust_stock(item.variant_id, -item.quantity)
                .await?
                .ok_or(AppError::InsufficientStock {
                    variant_id: item.variant_id,
                    available: 0,
                    requested: item.quantity,
                })?;
        }

        // 5. A reserva do carrinho é consumida junto com a venda
        if let Some(key) = own_reservation {
            tx.delete_reservation(key, &scope).await?;
        }

        let details = load_invoice_details(tx.as_mut(), invoice).await?;
        tx.commit().await?;

        tracing::info!(
            invoice_id = details.invoice.id,
            tenant_id = %tenant_id,
            user_id = ctx.user_id(),
            total = %details.invoice.total_amount,
            items = details.items.len(),
            "🧾 Nota criada com baixa de estoque"
        );
        Ok(details)
    }

    // ---
    // Leituras
    // ---

    pub async fn get_low_stock_variants(
        &self,
        ctx: &TenantContext,
        threshold: Option<i32>,
        requested: Option<&str>,
    ) -> Result<Vec<ProductVariant>, AppError> {
        let scope = ctx.authorize(requested)?;
        let threshold = threshold.unwrap_or(DEFAULT_LOW_STOCK_THRESHOLD);
        if threshold < 0 {
            return Err(AppError::ValidationFailed(single_field_error(
                "threshold",
                "range",
                "O limite de estoque baixo não pode ser negativo.",
            )));
        }

        let mut tx = self.store.begin().await?;
        let variants = tx.low_stock_variants(threshold, &scope).await?;
        tx.commit().await?;
        Ok(variants)
    }

    pub async fn get_stock_movement_history(
        &self,
        ctx: &TenantContext,
        variant_id: Option<i64>,
        limit: Option<i64>,
        requested: Option<&str>,
    ) -> Result<Vec<MovementHistoryEntry>, AppError> {
        let scope = ctx.authorize(requested)?;
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        if !(1..=100).contains(&limit) {
            return Err(AppError::ValidationFailed(single_field_error(
                "limit",
                "range",
                "O limite deve estar entre 1 e 100.",
            )));
        }

        let mut tx = self.store.begin().await?;
        let history = tx.movement_history(variant_id, &scope, limit).await?;
        tx.commit().await?;
        Ok(history)
    }
}

// ---
// Corpo das transações em lote: valida tudo, depois aplica
// ---

async fn apply_movements(tx: &mut dyn StoreTx, scope: &Scope, movements: &[StockMovement]) -> BatchOutcome {
    let ids = distinct_sorted(movements.iter().map(|m| m.variant_id));
    let locked = tx.lock_variants(&ids, scope).await?;
    let reserved = tx.reserved_quantities(&ids, None).await?;
    let mut projected: HashMap<i64, i32> = locked.iter().map(|v| (v.id, v.stock)).collect();

    let mut issues = Vec::new();
    for movement in movements {
        if movement.quantity <= 0 {
            issues.push(StockIssue::InvalidQuantity {
                variant_id: movement.variant_id,
                quantity: movement.quantity,
            });
            continue;
        }
        let Some(stock) = projected.get_mut(&movement.variant_id) else {
            issues.push(StockIssue::VariantNotFoundOrDenied { variant_id: movement.variant_id });
            continue;
        };
        if movement.movement_type == MovementType::Out {
            let available = unreserved(*stock, &reserved, movement.variant_id);
            if available < movement.quantity {
                issues.push(StockIssue::InsufficientStock {
                    variant_id: movement.variant_id,
                    available,
                    requested: movement.quantity,
                });
                continue;
            }
        }
        match stock.checked_add(movement.delta()) {
            Some(next) => *stock = next,
            None => issues.push(StockIssue::InvalidQuantity {
                variant_id: movement.variant_id,
                quantity: movement.quantity,
            }),
        }
    }

    if !issues.is_empty() {
        return Err(BatchFailure::Rejected(issues));
    }

    for movement in movements {
        if tx.adjust_stock(movement.variant_id, movement.delta()).await?.is_none() {
            return Err(BatchFailure::Rejected(vec![StockIssue::InsufficientStock {
                variant_id: movement.variant_id,
                available: 0,
                requested: movement.quantity,
            }]));
        }
    }

    Ok(dedup(movements.iter().map(|m| m.variant_id).collect()))
}

async fn apply_bulk_update(tx: &mut dyn StoreTx, scope: &Scope, updates: &[BulkStockUpdate]) -> BatchOutcome {
    let ids = distinct_sorted(updates.iter().map(|u| u.variant_id));
    let locked = tx.lock_variants(&ids, scope).await?;

    let mut issues = Vec::new();
    for update in updates {
        if update.new_stock < 0 {
            // Nunca "corrige" para zero: o valor negativo é rejeitado
            issues.push(StockIssue::InvalidStockValue {
                variant_id: update.variant_id,
                new_stock: update.new_stock,
            });
        } else if !locked.iter().any(|v| v.id == update.variant_id) {
            issues.push(StockIssue::VariantNotFoundOrDenied { variant_id: update.variant_id });
        }
    }

    if !issues.is_empty() {
        return Err(BatchFailure::Rejected(issues));
    }

    for update in updates {
        if !tx.set_stock(update.variant_id, update.new_stock).await? {
            return Err(BatchFailure::Rejected(vec![StockIssue::VariantNotFoundOrDenied {
                variant_id: update.variant_id,
            }]));
        }
    }

    Ok(dedup(updates.iter().map(|u| u.variant_id).collect()))
}

async fn apply_transfer(tx: &mut dyn StoreTx, scope: &Scope, transfer: &StockTransfer) -> BatchOutcome {
    let StockTransfer { from_variant_id, to_variant_id, quantity } = *transfer;

    let ids = distinct_sorted([from_variant_id, to_variant_id]);
    let locked = tx.lock_variants(&ids, scope).await?;
    let reserved = tx.reserved_quantities(&ids, None).await?;

    let mut issues = Vec::new();
    if quantity <= 0 {
        issues.push(StockIssue::InvalidQuantity { variant_id: from_variant_id, quantity });
    }
    let source = locked.iter().find(|v| v.id == from_variant_id);
    match source {
        None => issues.push(StockIssue::VariantNotFoundOrDenied { variant_id: from_variant_id }),
        Some(source) if quantity > 0 => {
            let available = unreserved(source.stock, &reserved, from_variant_id);
            if available < quantity {
                issues.push(StockIssue::InsufficientStock {
                    variant_id: from_variant_id,
                    available,
                    requested: quantity,
                });
            }
        }
        Some(_) => {}
    }
    match locked.iter().find(|v| v.id == to_variant_id) {
        None => issues.push(StockIssue::VariantNotFoundOrDenied { variant_id: to_variant_id }),
        Some(destination) if destination.stock.checked_add(quantity).is_none() => {
            issues.push(StockIssue::InvalidQuantity { variant_id: to_variant_id, quantity });
        }
        Some(_) => {}
    }

    // Qualquer problema: nenhuma das duas pontas é tocada
    if !issues.is_empty() {
        return Err(BatchFailure::Rejected(issues));
    }

    let debited = tx.adjust_stock(from_variant_id, -quantity).await?;
    let credited = tx.adjust_stock(to_variant_id, quantity).await?;
    if debited.is_none() || credited.is_none() {
        return Err(BatchFailure::Rejected(vec![StockIssue::InsufficientStock {
            variant_id: from_variant_id,
            available: 0,
            requested: quantity,
        }]));
    }

    Ok(vec![from_variant_id, to_variant_id])
}

async fn apply_reservations(
    tx: &mut dyn StoreTx,
    scope: &Scope,
    user_id: i64,
    reservations: &[ReservationRequest],
    expires_at: chrono::DateTime<Utc>,
) -> BatchOutcome {
    let purged = tx.purge_expired_reservations().await?;
    if purged > 0 {
        tracing::debug!(purged, "Reservas expiradas removidas");
    }

    let ids = distinct_sorted(reservations.iter().map(|r| r.variant_id));
    let locked: HashMap<i64, ProductVariant> = tx
        .lock_variants(&ids, scope)
        .await?
        .into_iter()
        .map(|v| (v.id, v))
        .collect();

    // Quantidades já pedidas neste mesmo lote, por (reserva, variante)
    let mut claimed: HashMap<(String, i64), i32> = HashMap::new();
    let mut issues = Vec::new();

    for request in reservations {
        let reservation_id = request.reservation_id.trim();
        if reservation_id.is_empty() {
            issues.push(StockIssue::InvalidReservation { reservation_id: request.reservation_id.clone() });
            continue;
        }
        if request.quantity <= 0 {
            issues.push(StockIssue::InvalidQuantity {
                variant_id: request.variant_id,
                quantity: request.quantity,
            });
            continue;
        }
        let Some(variant) = locked.get(&request.variant_id) else {
            issues.push(StockIssue::VariantNotFoundOrDenied { variant_id: request.variant_id });
            continue;
        };

        let own = ReservationKey { reservation_id, user_id };
        let held_elsewhere = tx.reserved_quantities(&[variant.id], Some(own)).await?;
        let claimed_in_batch: i32 = claimed
            .iter()
            .filter(|((rid, vid), _)| *vid == variant.id && rid != reservation_id)
            .map(|(_, quantity)| *quantity)
            .sum();
        let available = (unreserved(variant.stock, &held_elsewhere, variant.id) - claimed_in_batch).max(0);

        if available < request.quantity {
            issues.push(StockIssue::InsufficientStock {
                variant_id: variant.id,
                available,
                requested: request.quantity,
            });
            continue;
        }
        claimed.insert((reservation_id.to_string(), variant.id), request.quantity);
    }

    if !issues.is_empty() {
        return Err(BatchFailure::Rejected(issues));
    }

    for request in reservations {
        let Some(variant) = locked.get(&request.variant_id) else {
            continue;
        };
        tx.upsert_reservation(NewReservation {
            reservation_id: request.reservation_id.trim().to_string(),
            user_id,
            variant_id: variant.id,
            tenant_id: variant.tenant_id.clone(),
            quantity: request.quantity,
            expires_at,
        })
        .await?;
    }

    Ok(dedup(reservations.iter().map(|r| r.variant_id).collect()))
}

// ---
// Helpers
// ---

// Fecha a transação conforme o resultado. Lote rejeitado: rollback explícito.
// Falha de armazenamento: a transação é descartada (o drop desfaz as escritas).
async fn settle(tx: Box<dyn StoreTx>, outcome: BatchOutcome) -> BatchOutcome {
    match outcome {
        Ok(affected) => {
            tx.commit().await?;
            Ok(affected)
        }
        Err(BatchFailure::Rejected(issues)) => {
            tx.rollback().await?;
            Err(BatchFailure::Rejected(issues))
        }
        Err(storage) => Err(storage),
    }
}

fn report(operation: &'static str, scope: &Scope, outcome: BatchOutcome) -> InventoryTransactionResult {
    let tenant = scope.tenant_id().unwrap_or("*");
    match outcome {
        Ok(affected) => {
            tracing::info!(operation, tenant, variants = ?affected, "✅ Transação de estoque confirmada");
            InventoryTransactionResult::committed(affected)
        }
        Err(BatchFailure::Rejected(issues)) => {
            tracing::warn!(operation, tenant, issues = issues.len(), "Transação de estoque desfeita");
            InventoryTransactionResult::rolled_back(issues)
        }
        Err(BatchFailure::Storage(e)) => {
            tracing::error!(operation, tenant, error = ?e, "🔥 Falha no armazenamento durante transação de estoque");
            InventoryTransactionResult::rolled_back(vec![StockIssue::Internal])
        }
    }
}

fn invoice_total_too_large() -> AppError {
    AppError::ValidationFailed(single_field_error(
        "items",
        "range",
        "O total da nota excede o valor máximo permitido.",
    ))
}

fn require_items<T>(items: &[T], field: &'static str) -> Result<(), AppError> {
    if items.is_empty() {
        return Err(AppError::ValidationFailed(single_field_error(
            field,
            "length",
            "É necessário informar pelo menos um item.",
        )));
    }
    Ok(())
}

// Estoque descontando as reservas ativas de terceiros
fn unreserved(stock: i32, reserved: &HashMap<i64, i32>, variant_id: i64) -> i32 {
    (stock - reserved.get(&variant_id).copied().unwrap_or(0)).max(0)
}

fn distinct_sorted(ids: impl IntoIterator<Item = i64>) -> Vec<i64> {
    let mut ids: Vec<i64> = ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

// Remove repetidos preservando a ordem de chegada
fn dedup(ids: Vec<i64>) -> Vec<i64> {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}
