use std::collections::BTreeMap;

use thiserror::Error;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::field_value::FieldValue;
use crate::row::{KeyScheme, Row};

/// Who may edit a field. Fixed when the schema is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldAccess {
    Unrestricted,
    /// Status management roles.
    RoleGated,
    /// Capture data, supervisor only.
    CaptureGated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// Stored trimmed.
    FreeText,
    /// Must match one of the options, ignoring case and accents. Stored with
    /// the option's own spelling.
    Choice(Vec<String>),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValueRejection {
    #[error("{field} cannot be blank")]
    Blank { field: String },

    #[error("enter one of: {}", allowed.join(", "))]
    NotAllowed { field: String, allowed: Vec<String> },
}

impl ValueRejection {
    /// Blank choices are reverted without bothering the operator.
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::Blank { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    name: String,
    access: FieldAccess,
    kind: FieldKind,
    live: bool,
}

impl FieldSpec {
    pub fn free_text(name: &str, access: FieldAccess) -> Self {
        Self {
            name: name.to_string(),
            access,
            kind: FieldKind::FreeText,
            live: false,
        }
    }

    pub fn choice<S: Into<String>>(
        name: &str,
        access: FieldAccess,
        options: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            name: name.to_string(),
            access,
            kind: FieldKind::Choice(options.into_iter().map(Into::into).collect()),
            live: false,
        }
    }

    /// Mark the field as typed into rapidly; its writes are debounced.
    pub fn live(mut self) -> Self {
        self.live = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn access(&self) -> FieldAccess {
        self.access
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Canonical form of a newly entered value, or why it is rejected.
    pub fn canonicalize(&self, raw: &FieldValue) -> Result<String, ValueRejection> {
        let normalized = raw.normalize();
        let trimmed = normalized.trim();
        match &self.kind {
            FieldKind::FreeText => Ok(trimmed.to_string()),
            FieldKind::Choice(options) => {
                if trimmed.is_empty() {
                    return Err(ValueRejection::Blank {
                        field: self.name.clone(),
                    });
                }
                let folded = fold(trimmed);
                options
                    .iter()
                    .find(|option| fold(option) == folded)
                    .cloned()
                    .ok_or_else(|| ValueRejection::NotAllowed {
                        field: self.name.clone(),
                        allowed: options.clone(),
                    })
            }
        }
    }

    /// Canonical form of a value already in the dataset. Never rejects: a
    /// stored value outside the options is compared by its trimmed text.
    pub fn canonical_form(&self, raw: &FieldValue) -> String {
        match self.canonicalize(raw) {
            Ok(canonical) => canonical,
            Err(_) => raw.normalize().trim().to_string(),
        }
    }
}

/// Lower-case with diacritics stripped.
fn fold(s: &str) -> String {
    s.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// Editable fields, their access classes and the composite keys of a dataset.
/// Fields not declared here are read-only.
#[derive(Debug, Clone)]
pub struct Schema {
    fields: BTreeMap<String, FieldSpec>,
    strict_key: KeyScheme,
    soft_key: KeyScheme,
    committed_columns: Vec<String>,
}

impl Schema {
    pub fn new(strict_key: KeyScheme, soft_key: KeyScheme) -> Self {
        Self {
            fields: BTreeMap::new(),
            strict_key,
            soft_key,
            committed_columns: Vec::new(),
        }
    }

    pub fn with_field(mut self, spec: FieldSpec) -> Self {
        self.fields.insert(spec.name.clone(), spec);
        self
    }

    pub fn with_committed_columns<S: Into<String>>(
        mut self,
        columns: impl IntoIterator<Item = S>,
    ) -> Self {
        self.committed_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.values()
    }

    pub fn strict_key(&self) -> &KeyScheme {
        &self.strict_key
    }

    pub fn soft_key(&self) -> &KeyScheme {
        &self.soft_key
    }

    pub fn committed_columns(&self) -> &[String] {
        &self.committed_columns
    }

    /// Project a staging row onto the committed column set. Missing columns
    /// become empty text; the staging id and extra columns are dropped.
    pub fn shape_for_commit(&self, row: &Row) -> Row {
        Row::with_fields(
            None,
            self.committed_columns.iter().map(|col| {
                let value = match row.fields().get(col) {
                    Some(v) => v.clone(),
                    None => FieldValue::Text(String::new()),
                };
                (col.clone(), value)
            }),
        )
    }

    /// The parts-order dataset.
    pub fn parts_orders() -> Self {
        use FieldAccess::*;
        Self::new(KeyScheme::pedido_item(), KeyScheme::pedido_siniestro())
            .with_field(FieldSpec::choice("LOCALIDAD", Unrestricted, ["local", "foraneo"]))
            .with_field(FieldSpec::free_text("NUEVO_ESTATUS", RoleGated))
            .with_field(FieldSpec::free_text("ESTATUS2", RoleGated))
            .with_field(FieldSpec::free_text("ESTATUS_LOCAL", RoleGated))
            .with_field(FieldSpec::free_text("ESTATUS_FORANEO", RoleGated))
            .with_field(FieldSpec::free_text("CODIGO", CaptureGated).live())
            .with_field(FieldSpec::free_text("CHOFER", CaptureGated).live())
            .with_field(FieldSpec::free_text("COSTO", Unrestricted).live())
            .with_committed_columns(PARTS_ORDER_COLUMNS.iter().copied())
    }
}

const PARTS_ORDER_COLUMNS: &[&str] = &[
    "ASEGURADORA",
    "COTIZACION",
    "PEDIDO",
    "FECHA_COTIZACION",
    "FECHA_PEDIDO",
    "PROMESA_DE_ENTREGA",
    "FECHA_CONFIRMACION_DE_PIEZA",
    "FECHA_CANCELACION_DE_PIEZA",
    "FECHA_FACTURACION_DE_PIEZA",
    "FECHA_ENTREGA_DE_PIEZA",
    "FECHA_RECEPCION_DE_PIEZA",
    "DIAS_PROMESA",
    "DIAS_ENTREGADO1",
    "DIAS_ENTREGADO2",
    "DIAS_RECIBIDO1",
    "DIAS_RECIBIDO2",
    "SINIESTRO",
    "NOMBRE_COMERCIAL_TALLER",
    "CIUDAD_TALLER",
    "ESTADO_TALLER",
    "NOMBRE_CONTACTO",
    "TELEFONO",
    "EMAIL",
    "ARMADORA",
    "MODELO",
    "ANIO",
    "RFC_PROVEEDOR",
    "RAZON_SOCIAL_PROVEEDOR",
    "NOMBRE_COMERCIAL_PROVEEDOR",
    "COLUMNA1",
    "ESTADO_PROVEEDOR",
    "ITEM",
    "ORIGEN",
    "PRECIO",
    "ESTATUS",
    "BACK_ORDER",
    "CODIGO",
    "COSTO",
    "LOCALIDAD",
    "CHOFER",
    "COMPAQ",
    "OC",
    "NUEVO_ESTATUS",
    "ESTATUS_LOCAL",
    "ESTATUS_FORANEO",
    "ESTATUS2",
];
