//! Tabla de puntos de series temporales.
//!


use std::collections::BTreeMap;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{Executor, PgPool, Postgres, QueryBuilder};
use crate::config::postgres::TABLE;
use crate::database::domain::{DataPoint, FieldValue};


/// Crea la tabla de puntos (`heating_point`) y su índice si no existen.
///
/// # Schema
/// * `measurement`: Nombre de la medición (`heating_temperature`, `room_climate`, ...).
/// * `tags`: Etiquetas del punto en JSONB.
/// * `field`: Nombre del campo; cada campo del punto ocupa una fila.
/// * `value_double` / `value_bigint` / `value_text`: Solo una columna tiene valor por fila.
pub async fn create_table_points(pool: &PgPool) -> Result<(), sqlx::Error> {
    let table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {TABLE} (
            id                   BIGSERIAL PRIMARY KEY,
            measurement          TEXT NOT NULL,
            tags                 JSONB NOT NULL,
            field                TEXT NOT NULL,
            value_double         DOUBLE PRECISION,
            value_bigint         BIGINT,
            value_text           TEXT,
            timestamp            TIMESTAMPTZ NOT NULL
        );
        "#
    );
    pool.execute(table.as_str()).await?;

    let index = format!(
        "CREATE INDEX IF NOT EXISTS {TABLE}_measurement_ts ON {TABLE} (measurement, timestamp);"
    );
    pool.execute(index.as_str()).await?;

    Ok(())
}


struct PointRow {
    measurement: String,
    tags: Json<BTreeMap<String, String>>,
    field: String,
    value_double: Option<f64>,
    value_bigint: Option<i64>,
    value_text: Option<String>,
    timestamp: DateTime<Utc>,
}


fn flatten(points: Vec<DataPoint>) -> Vec<PointRow> {
    points
        .into_iter()
        .flat_map(|point| {
            let DataPoint { measurement, tags, fields, timestamp } = point;
            fields.into_iter().map(move |(field, value)| {
                let (value_double, value_bigint, value_text) = match value {
                    FieldValue::Float(v) => (Some(v), None, None),
                    FieldValue::Int(v) => (None, Some(v), None),
                    FieldValue::Text(v) => (None, None, Some(v)),
                };
                PointRow {
                    measurement: measurement.clone(),
                    tags: Json(tags.clone()),
                    field,
                    value_double,
                    value_bigint,
                    value_text,
                    timestamp,
                }
            })
        })
        .collect()
}


/// Inserta un lote de puntos en una única sentencia.
///
/// # Argumentos
/// * `pool`: Pool de conexiones a Postgres.
/// * `points`: Puntos de una misma escritura lógica.
pub async fn insert_points(pool: &PgPool,
                           points: Vec<DataPoint>
) -> Result<(), sqlx::Error> {

    let rows = flatten(points);
    if rows.is_empty() {
        return Ok(());
    }

    let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
        "INSERT INTO {TABLE} (
            measurement, tags, field,
            value_double, value_bigint, value_text, timestamp
        ) "
    ));

    query_builder.push_values(rows, |mut b, row| {
        b.push_bind(row.measurement)
            .push_bind(row.tags)
            .push_bind(row.field)
            .push_bind(row.value_double)
            .push_bind(row.value_bigint)
            .push_bind(row.value_text)
            .push_bind(row.timestamp);
    });

    let query = query_builder.build();
    query.execute(pool).await?;

    Ok(())
}
