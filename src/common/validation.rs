// src/common/validation.rs

use rust_decimal::Decimal;
use validator::{ValidationError, ValidationErrors};

// ---
// Validações customizadas (usadas pelos derives de `Validate`)
// ---

fn validate_not_negative(val: &Decimal) -> Result<(), ValidationError> {
    if val.is_sign_negative() && !val.is_zero() {
        let mut err = ValidationError::new("range");
        err.add_param("min".into(), &0.0);
        err.message = Some("O valor não pode ser negativo.".into());
        return Err(err);
    }
    Ok(())
}

fn validate_positive(val: &Decimal) -> Result<(), ValidationError> {
    if *val <= Decimal::ZERO {
        let mut err = ValidationError::new("range");
        err.message = Some("O valor deve ser maior que zero.".into());
        return Err(err);
    }
    Ok(())
}

// O valor precisa caber na coluna NUMERIC(p, s) sem arredondar nem estourar
fn fits_numeric(val: &Decimal, integer_digits: u32, scale: u32) -> Result<(), ValidationError> {
    if val.normalize().scale() > scale {
        let mut err = ValidationError::new("scale");
        err.add_param("max".into(), &scale);
        err.message = Some(format!("O valor aceita no máximo {scale} casas decimais.").into());
        return Err(err);
    }
    if val.abs() >= numeric_limit(integer_digits) {
        let mut err = ValidationError::new("range");
        err.add_param("digits".into(), &integer_digits);
        err.message = Some("O valor excede o máximo permitido.".into());
        return Err(err);
    }
    Ok(())
}

/// Primeiro valor que não cabe em `integer_digits` dígitos inteiros (10^n).
pub fn numeric_limit(integer_digits: u32) -> Decimal {
    Decimal::from(10_i64.pow(integer_digits))
}

/// Preço de catálogo: NUMERIC(12, 2), zero permitido.
pub fn validate_price(val: &Decimal) -> Result<(), ValidationError> {
    validate_not_negative(val)?;
    fits_numeric(val, 10, 2)
}

/// Preço de venda de um item da nota: NUMERIC(12, 2), maior que zero.
pub fn validate_unit_price(val: &Decimal) -> Result<(), ValidationError> {
    validate_positive(val)?;
    fits_numeric(val, 10, 2)
}

/// Peso: NUMERIC(10, 3).
pub fn validate_weight(val: &Decimal) -> Result<(), ValidationError> {
    validate_not_negative(val)?;
    fits_numeric(val, 7, 3)
}

pub fn validate_not_blank(val: &str) -> Result<(), ValidationError> {
    if val.trim().is_empty() {
        let mut err = ValidationError::new("required");
        err.message = Some("O campo é obrigatório e não pode ser vazio.".into());
        return Err(err);
    }
    Ok(())
}

/// Códigos de barras: apenas alfanuméricos, hífen e sublinhado (até 100 caracteres).
pub fn validate_barcode(val: &str) -> Result<(), ValidationError> {
    let barcode = val.trim();

    if barcode.is_empty() {
        let mut err = ValidationError::new("required");
        err.message = Some("O código de barras é obrigatório.".into());
        return Err(err);
    }
    if barcode.chars().count() > 100 {
        let mut err = ValidationError::new("length");
        err.add_param("max".into(), &100);
        err.message = Some("O código de barras não pode exceder 100 caracteres.".into());
        return Err(err);
    }
    if !barcode.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        let mut err = ValidationError::new("barcode");
        err.message = Some(
            "O código de barras só pode conter letras, números, hífens e sublinhados.".into(),
        );
        return Err(err);
    }
    Ok(())
}

/// Monta um `ValidationErrors` com um único campo, para regras fora dos derives.
pub fn single_field_error(field: &'static str, code: &'static str, message: &'static str) -> ValidationErrors {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());

    let mut errors = ValidationErrors::new();
    errors.add(field, err);
    errors
}

/// Normaliza textos opcionais: apara espaços e transforma vazio em `None`.
pub fn normalize_optional(val: Option<&str>) -> Option<String> {
    val.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}
