// src/services/report_service.rs

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use chrono::{Datelike, Days, Duration, Utc};
use rust_decimal::Decimal;

use crate::{
    common::{error::AppError, validation::single_field_error},
    db::{Store, repository::InvoiceFilter},
    middleware::tenancy::TenantContext,
    models::report::{
        PeriodSales, ProductSales, SaleLine, SalesPeriod, SalesReport, SalesReportFilters, SalesReportQuery,
        SalesSummary, TenantInventoryLevel, TenantSales,
    },
    services::inventory_service::DEFAULT_LOW_STOCK_THRESHOLD,
};

const DEFAULT_RANGE_DAYS: i64 = 30;
const TOP_PRODUCTS: usize = 10;

/// Relatório de vendas da administração (todas as lojas ou uma só).
#[derive(Clone)]
pub struct ReportService {
    store: Arc<dyn Store>,
}

impl ReportService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn sales_report(&self, ctx: &TenantContext, query: &SalesReportQuery) -> Result<SalesReport, AppError> {
        ctx.require_admin()?;
        let scope = ctx.authorize(query.tenant_id.as_deref())?;

        // Sem datas: últimos 30 dias até agora
        let end_date = query.end_date.unwrap_or_else(Utc::now);
        let start_date = query.start_date.unwrap_or(end_date - Duration::days(DEFAULT_RANGE_DAYS));
        if start_date > end_date {
            return Err(AppError::ValidationFailed(single_field_error(
                "startDate",
                "range",
                "A data inicial deve ser anterior à data final.",
            )));
        }

        let filter = InvoiceFilter {
            scope: scope.clone(),
            user_id: None,
            start_date: Some(start_date),
            end_date: Some(end_date),
        };

        let mut tx = self.store.begin().await?;
        let lines = tx.sales_lines(&filter).await?;
        let inventory_levels = tx.inventory_levels(&scope, DEFAULT_LOW_STOCK_THRESHOLD).await?;
        tx.commit().await?;

        let filters = SalesReportFilters {
            tenant_id: scope.tenant_id().map(str::to_string),
            start_date,
            end_date,
            group_by: query.group_by,
        };
        let report = aggregate(&lines, filters, inventory_levels);

        tracing::debug!(
            invoices = report.summary.total_invoices,
            items = report.summary.total_items,
            "Relatório de vendas gerado"
        );
        Ok(report)
    }
}

#[derive(Default)]
struct Bucket {
    revenue: Decimal,
    invoices: HashSet<i64>,
    items: i64,
}

impl Bucket {
    // O total da nota entra uma vez só, mesmo com várias linhas
    fn add(&mut self, line: &SaleLine) {
        if self.invoices.insert(line.invoice_id) {
            self.revenue = self.revenue.saturating_add(line.invoice_total);
        }
        self.items += 1;
    }
}

fn period_key(line: &SaleLine, group_by: SalesPeriod) -> String {
    let date = line.created_at.date_naive();
    match group_by {
        SalesPeriod::Day => date.format("%Y-%m-%d").to_string(),
        SalesPeriod::Week => {
            // Semana começa no domingo
            let back = Days::new(u64::from(date.weekday().num_days_from_sunday()));
            date.checked_sub_days(back).unwrap_or(date).format("%Y-%m-%d").to_string()
        }
        SalesPeriod::Month => date.format("%Y-%m").to_string(),
    }
}

fn aggregate(
    lines: &[SaleLine],
    filters: SalesReportFilters,
    inventory_levels: Vec<TenantInventoryLevel>,
) -> SalesReport {
    let group_by = filters.group_by;
    let mut overall = Bucket::default();
    let mut total_quantity = 0i64;
    let mut by_period: BTreeMap<String, Bucket> = BTreeMap::new();
    let mut by_tenant: HashMap<&str, (&str, Bucket)> = HashMap::new();
    let mut by_product: HashMap<i64, (ProductSales, HashSet<i64>)> = HashMap::new();

    for line in lines {
        overall.add(line);
        total_quantity += i64::from(line.quantity);
        by_period.entry(period_key(line, group_by)).or_default().add(line);
        by_tenant
            .entry(line.tenant_id.as_str())
            .or_insert_with(|| (line.tenant_name.as_str(), Bucket::default()))
            .1
            .add(line);

        let (product, invoices) = by_product.entry(line.product_id).or_insert_with(|| {
            let sales = ProductSales {
                product_id: line.product_id,
                product_name: line.product_name.clone(),
                category: line.category.clone(),
                total_quantity: 0,
                total_revenue: Decimal::ZERO,
                invoice_count: 0,
            };
            (sales, HashSet::new())
        });
        product.total_quantity += i64::from(line.quantity);
        product.total_revenue = product.total_revenue.saturating_add(line.total_price);
        invoices.insert(line.invoice_id);
        product.invoice_count = invoices.len() as i64;
    }

    let total_invoices = overall.invoices.len() as i64;
    let average_order_value = overall
        .revenue
        .checked_div(Decimal::from(total_invoices))
        .unwrap_or_default()
        .round_dp(2);

    let sales_by_period = by_period
        .into_iter()
        .map(|(period, bucket)| PeriodSales {
            period,
            total_revenue: bucket.revenue,
            total_invoices: bucket.invoices.len() as i64,
            total_items: bucket.items,
        })
        .collect();

    let mut top_products: Vec<ProductSales> = by_product.into_values().map(|(sales, _)| sales).collect();
    top_products.sort_by(|a, b| b.total_revenue.cmp(&a.total_revenue).then(a.product_id.cmp(&b.product_id)));
    top_products.truncate(TOP_PRODUCTS);

    let mut tenant_summary: Vec<TenantSales> = by_tenant
        .into_iter()
        .map(|(tenant_id, (tenant_name, bucket))| TenantSales {
            tenant_id: tenant_id.to_string(),
            tenant_name: tenant_name.to_string(),
            total_revenue: bucket.revenue,
            total_invoices: bucket.invoices.len() as i64,
            total_items: bucket.items,
        })
        .collect();
    tenant_summary.sort_by(|a, b| b.total_revenue.cmp(&a.total_revenue).then(a.tenant_id.cmp(&b.tenant_id)));

    SalesReport {
        summary: SalesSummary {
            total_revenue: overall.revenue,
            total_invoices,
            total_items: overall.items,
            total_quantity,
            average_order_value,
        },
        sales_by_period,
        top_products,
        tenant_summary,
        inventory_levels,
        filters,
    }
}
