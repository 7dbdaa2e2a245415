use std::collections::HashMap;

use ordersync_core::{FieldValue, KeyScheme, Row, RowKey};

/// Fill `target_field` from a secondary status dataset.
///
/// The secondary rows are indexed by `scheme`; the first row per key with a
/// non-null `source_field` wins. A row takes the status only when its own
/// `target_field` is blank and the status is not. Rows left alone come back
/// as they went in.
pub fn project_status_overlay(
    rows: &[Row],
    overlay_rows: &[Row],
    scheme: &KeyScheme,
    target_field: &str,
    source_field: &str,
) -> Vec<Row> {
    let mut lookup: HashMap<RowKey, FieldValue> = HashMap::new();
    for overlay in overlay_rows {
        let Some(key) = scheme.key_for(overlay) else {
            continue;
        };
        let status = overlay.get(source_field);
        if status.is_null() {
            continue;
        }
        lookup.entry(key).or_insert(status);
    }

    rows.iter()
        .map(|row| {
            let status = scheme.key_for(row).and_then(|key| lookup.get(&key));
            match status {
                Some(status) if !status.is_blank() && row.get(target_field).is_blank() => {
                    row.with_field(target_field, FieldValue::Text(status.normalize()))
                }
                _ => row.clone(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordersync_core::RowId;

    fn order(id: i64, pedido: &str, item: &str, nuevo: &str) -> Row {
        Row::with_fields(
            Some(RowId::new(id)),
            [("PEDIDO", pedido), ("ITEM", item), ("NUEVO_ESTATUS", nuevo)],
        )
    }

    fn status(pedido: &str, item: &str, estatus: FieldValue) -> Row {
        Row::with_fields(
            None,
            [
                ("PEDIDO", FieldValue::from(pedido)),
                ("ITEM", FieldValue::from(item)),
                ("ESTATUS", estatus),
            ],
        )
    }

    fn project(rows: &[Row], overlay: &[Row]) -> Vec<Row> {
        project_status_overlay(rows, overlay, &KeyScheme::pedido_item(), "NUEVO_ESTATUS", "ESTATUS")
    }

    #[test]
    fn fills_blank_target() {
        let out = project(&[order(1, "P1", "faro", " ")], &[status("p1", "FARO", "EN RUTA".into())]);
        assert_eq!(out[0].get("NUEVO_ESTATUS"), FieldValue::from("EN RUTA"));
        assert_eq!(out[0].id(), Some(RowId::new(1)));
    }

    #[test]
    fn never_overwrites_existing_value() {
        let rows = [order(1, "P1", "faro", "ENTREGADO")];
        let out = project(&rows, &[status("P1", "faro", "EN RUTA".into())]);
        assert_eq!(out, rows.to_vec());
    }

    #[test]
    fn first_status_per_key_wins() {
        let out = project(
            &[order(1, "P1", "faro", "")],
            &[
                status("P1", "faro", FieldValue::Null),
                status("P1", "faro", "PRIMERO".into()),
                status("P1", "faro", "SEGUNDO".into()),
            ],
        );
        assert_eq!(out[0].get("NUEVO_ESTATUS"), FieldValue::from("PRIMERO"));
    }

    #[test]
    fn numeric_status_is_stringified() {
        let out = project(&[order(1, "P1", "faro", "")], &[status("P1", "faro", FieldValue::Integer(3))]);
        assert_eq!(out[0].get("NUEVO_ESTATUS"), FieldValue::from("3"));
    }

    #[test]
    fn unmatched_rows_unchanged() {
        let rows = [order(1, "P2", "x", "")];
        assert_eq!(project(&rows, &[status("P1", "faro", "OK".into())]), rows.to_vec());
    }
}
