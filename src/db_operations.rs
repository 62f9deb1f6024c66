use crate::db::DbPool;
use crate::errors::PipelineError;
use crate::metrics::METRICS;
use crate::parsers::csv_table::{decode_sentinel, SENTINEL};
use crate::retry::{db_retry_config, retry_with_backoff};
use crate::store::{check_table_name, identifier_for, range_bounds, TableStore};
use crate::table::{ColumnData, Table, TIME_COLUMN};
use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, info};
use pin_utils::pin_mut;
use tokio_postgres::binary_copy::BinaryCopyInWriter;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Row, Transaction};

/// Tables in PostgreSQL, one row per `time` (and identifier for site
/// tables). Numeric columns are `FLOAT8` with absent stored as `-1`, text
/// columns are nullable `TEXT`.
pub struct PgStore {
    pool: DbPool,
}

fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_type(data: &ColumnData) -> Type {
    if data.is_numeric() {
        Type::FLOAT8
    } else {
        Type::TEXT
    }
}

fn sql_type(ty: &Type) -> &'static str {
    if *ty == Type::FLOAT8 {
        "FLOAT8"
    } else {
        "TEXT"
    }
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn ensure_table(client: &Transaction<'_>, table: &str, data: &Table) -> Result<(), PipelineError> {
        client
            .batch_execute(&format!(
                "CREATE TABLE IF NOT EXISTS {} ({} TIMESTAMP NOT NULL)",
                quote(table),
                quote(TIME_COLUMN)
            ))
            .await?;
        for column in data.columns() {
            client
                .batch_execute(&format!(
                    "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {} {}",
                    quote(table),
                    quote(&column.name),
                    sql_type(&column_type(&column.data))
                ))
                .await?;
        }
        Ok(())
    }

    async fn replace_once(
        &self,
        table: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
        data: &Table,
    ) -> Result<u64, PipelineError> {
        let mut client = self.pool.get().await?;
        let transaction = client.transaction().await?;

        Self::ensure_table(&transaction, table, data).await?;
        let deleted = transaction
            .execute(
                &format!("DELETE FROM {} WHERE {} BETWEEN $1 AND $2", quote(table), quote(TIME_COLUMN)),
                &[&from, &to],
            )
            .await?;
        debug!("Deleted {} rows of {} between {} and {}", deleted, table, from, to);

        let rows = data.filter_time_range(from, to);
        let mut names = vec![quote(TIME_COLUMN)];
        names.extend(rows.columns().iter().map(|c| quote(&c.name)));
        let mut types = vec![Type::TIMESTAMP];
        types.extend(rows.columns().iter().map(|c| column_type(&c.data)));

        let copy_sql = format!("COPY {} ({}) FROM STDIN BINARY", quote(table), names.join(", "));
        let sink = transaction.copy_in(&copy_sql).await?;
        let writer = BinaryCopyInWriter::new(sink, &types);
        pin_mut!(writer);

        for row in 0..rows.len() {
            let mut values: Vec<Box<dyn ToSql + Sync>> = Vec::with_capacity(types.len());
            values.push(Box::new(rows.time()[row]));
            for column in rows.columns() {
                match &column.data {
                    ColumnData::Numeric(v) => values.push(Box::new(v[row].unwrap_or(SENTINEL))),
                    ColumnData::Text(v) => values.push(Box::new(v[row].clone())),
                }
            }
            let refs: Vec<&(dyn ToSql + Sync)> = values
                .iter()
                .map(|v| v.as_ref() as &(dyn ToSql + Sync))
                .collect();
            writer.as_mut().write(&refs).await?;
        }

        let written = writer.finish().await?;
        transaction.commit().await?;
        Ok(written)
    }
}

fn decode_row(
    columns: &[(String, Type)],
    row: &Row,
    times: &mut Vec<NaiveDateTime>,
    cells: &mut [ColumnData],
) -> Result<(), PipelineError> {
    for (i, (name, ty)) in columns.iter().enumerate() {
        if name == TIME_COLUMN {
            times.push(row.try_get::<_, NaiveDateTime>(i)?);
            continue;
        }
        match &mut cells[i] {
            ColumnData::Numeric(v) => {
                let raw: Option<f64> = if *ty == Type::FLOAT8 {
                    row.try_get(i)?
                } else if *ty == Type::FLOAT4 {
                    row.try_get::<_, Option<f32>>(i)?.map(f64::from)
                } else if *ty == Type::INT8 {
                    row.try_get::<_, Option<i64>>(i)?.map(|x| x as f64)
                } else {
                    row.try_get::<_, Option<i32>>(i)?.map(f64::from)
                };
                v.push(decode_sentinel(raw));
            }
            ColumnData::Text(v) => v.push(row.try_get(i)?),
        }
    }
    Ok(())
}

fn is_numeric_type(ty: &Type) -> bool {
    [Type::FLOAT8, Type::FLOAT4, Type::INT8, Type::INT4, Type::INT2].contains(ty)
}

impl TableStore for PgStore {
    async fn read_range(&self, table: &str, start: NaiveDate, end: NaiveDate) -> Result<Table, PipelineError> {
        check_table_name(table)?;
        let (from, to) = range_bounds(start, end);
        let client = self.pool.get().await?;
        let statement = client
            .prepare(&format!(
                "SELECT * FROM {} WHERE {} BETWEEN $1 AND $2 ORDER BY {}",
                quote(table),
                quote(TIME_COLUMN),
                quote(TIME_COLUMN)
            ))
            .await?;

        let columns: Vec<(String, Type)> = statement
            .columns()
            .iter()
            .map(|c| (c.name().to_string(), c.type_().clone()))
            .collect();
        let mut cells: Vec<ColumnData> = columns
            .iter()
            .map(|(_, ty)| {
                if is_numeric_type(ty) {
                    ColumnData::Numeric(Vec::new())
                } else {
                    ColumnData::Text(Vec::new())
                }
            })
            .collect();

        let rows = client.query(&statement, &[&from, &to]).await?;
        let mut times = Vec::with_capacity(rows.len());
        for row in &rows {
            decode_row(&columns, row, &mut times, &mut cells)?;
        }

        let mut out = Table::new(times);
        for ((name, _), data) in columns.into_iter().zip(cells) {
            if name != TIME_COLUMN {
                out.add_column(crate::table::Column { name, data })?;
            }
        }
        if let Some(id) = identifier_for(table) {
            if out.has_column(id) {
                out.set_identifier(Some(id));
            }
        }
        debug!("Read {} rows of {} for {}..={}", out.len(), table, start, end);
        Ok(out)
    }

    async fn replace_range(
        &self,
        table: &str,
        start: NaiveDate,
        end: NaiveDate,
        data: &Table,
    ) -> Result<u64, PipelineError> {
        check_table_name(table)?;
        let (from, to) = range_bounds(start, end);
        let name = format!("replace_{}_{}_{}", table, start, end);
        let written = retry_with_backoff(&db_retry_config(), &name, || {
            self.replace_once(table, from, to, data)
        })
        .await?;
        info!("Replaced {} rows of {} for {}..={}", written, table, start, end);
        METRICS.lock().record_rows_written(written);
        Ok(written)
    }
}
