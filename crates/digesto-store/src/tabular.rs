//! CSV (and optionally Parquet) IO for the relation tables.
//!
//! Inputs are read with every column forced to `Utf8` so that an id column
//! the CSV inference would type as `Float64` keeps its raw text (`"594.0"`)
//! for the normaliser to deal with.

use std::io::{Read, Seek, Write};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, StringArray};
use arrow::csv::reader::Format;
use arrow::csv::{ReaderBuilder, WriterBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use digesto_core::{CoverageRow, ModificationPair, OfficialRelation, RelationEdge, tables};
use thiserror::Error;
use tracing::info;

const BOM: char = '\u{feff}';

#[derive(Debug, Error)]
pub enum TableError {
    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing column {0:?}")]
    MissingColumn(String),

    #[cfg(feature = "parquet")]
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
}

/// Read a headed CSV with every column as nullable `Utf8`.
///
/// A UTF-8 byte-order mark on the first header is dropped.
pub fn read_utf8_csv<R: Read + Seek>(mut input: R) -> Result<Vec<RecordBatch>, TableError> {
    let (inferred, _) = Format::default()
        .with_header(true)
        .infer_schema(&mut input, Some(1))?;
    input.rewind()?;

    let fields: Vec<Field> = inferred
        .fields()
        .iter()
        .map(|f| Field::new(f.name().trim_start_matches(BOM), DataType::Utf8, true))
        .collect();
    let reader = ReaderBuilder::new(Arc::new(Schema::new(fields)))
        .with_header(true)
        .build(input)?;
    Ok(reader.collect::<Result<Vec<_>, _>>()?)
}

fn utf8_column<'a>(batch: &'a RecordBatch, names: &[&str]) -> Result<&'a StringArray, TableError> {
    let col = names
        .iter()
        .find_map(|name| batch.column_by_name(name))
        .ok_or_else(|| TableError::MissingColumn(names[0].to_string()))?;
    col.as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| TableError::MissingColumn(names[0].to_string()))
}

fn cell(arr: &StringArray, row: usize) -> Option<String> {
    (!arr.is_null(row)).then(|| arr.value(row).to_string())
}

/// Spanish header accepted for each field of
/// [`tables::official_relations_schema`], in field order.
const OFFICIAL_SPANISH_HEADERS: [&str; 3] = ["id_origen", "id_destino", "tipo_relacion"];

/// Read the official relation table.
///
/// Column names come from [`tables::official_relations_schema`]
/// (`origin_id, destination_id, relation_kind`); the Spanish `id_origen,
/// id_destino, tipo_relacion` headers are accepted too.
pub fn read_official_relations<R: Read + Seek>(
    input: R,
) -> Result<Vec<OfficialRelation>, TableError> {
    let schema = &tables::official_relations_schema();
    let names = move |i: usize| [schema.field(i).name().as_str(), OFFICIAL_SPANISH_HEADERS[i]];

    let mut rows = Vec::new();
    for batch in read_utf8_csv(input)? {
        let origin = utf8_column(&batch, &names(0))?;
        let destination = utf8_column(&batch, &names(1))?;
        let kind = utf8_column(&batch, &names(2))?;
        for row in 0..batch.num_rows() {
            rows.push(OfficialRelation {
                origin: cell(origin, row),
                destination: cell(destination, row),
                kind: cell(kind, row),
            });
        }
    }
    info!(count = rows.len(), "read official relations");
    Ok(rows)
}

/// Read `(modifying, modified)` pairs from a modifications export.
pub fn read_modifications<R: Read + Seek>(input: R) -> Result<Vec<ModificationPair>, TableError> {
    let mut rows = Vec::new();
    for batch in read_utf8_csv(input)? {
        let modifying = utf8_column(&batch, &["id_norma_modificatoria"])?;
        let modified = utf8_column(&batch, &["id_norma_modificada"])?;
        for row in 0..batch.num_rows() {
            rows.push(ModificationPair {
                modifying: cell(modifying, row),
                modified: cell(modified, row),
            });
        }
    }
    info!(count = rows.len(), "read modification pairs");
    Ok(rows)
}

/// Read the raw `id_norma` column of the norms master table.
pub fn read_norm_ids<R: Read + Seek>(input: R) -> Result<Vec<String>, TableError> {
    let mut ids = Vec::new();
    for batch in read_utf8_csv(input)? {
        let col = utf8_column(&batch, &[tables::NORMS_ID_COLUMN])?;
        ids.extend((0..batch.num_rows()).filter_map(|row| cell(col, row)));
    }
    Ok(ids)
}

/// Build a consolidated-edges batch.
pub fn edges_to_batch(edges: &[RelationEdge]) -> Result<RecordBatch, TableError> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(
            edges.iter().map(|e| e.origin.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(
            edges.iter().map(|e| e.destination.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(
            edges.iter().map(|e| e.kind.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(
            edges.iter().map(|e| e.provenance.as_str()),
        )),
    ];
    Ok(RecordBatch::try_new(
        Arc::new(tables::consolidated_edges_schema()),
        columns,
    )?)
}

/// Build a coverage batch.
pub fn coverage_to_batch(rows: &[CoverageRow]) -> Result<RecordBatch, TableError> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(
            rows.iter().map(|r| r.id.as_str()),
        )),
        Arc::new(BooleanArray::from(
            rows.iter().map(|r| r.raw).collect::<Vec<_>>(),
        )),
        Arc::new(BooleanArray::from(
            rows.iter().map(|r| r.parsed).collect::<Vec<_>>(),
        )),
    ];
    Ok(RecordBatch::try_new(Arc::new(tables::coverage_schema()), columns)?)
}

/// Write a batch as headed CSV.
pub fn write_csv<W: Write>(output: W, batch: &RecordBatch) -> Result<W, TableError> {
    let mut writer = WriterBuilder::new().with_header(true).build(output);
    writer.write(batch)?;
    Ok(writer.into_inner())
}

/// Serialise consolidated edges to CSV bytes.
pub fn edges_to_csv(edges: &[RelationEdge]) -> Result<Vec<u8>, TableError> {
    write_csv(Vec::new(), &edges_to_batch(edges)?)
}

/// Serialise coverage rows to CSV bytes.
pub fn coverage_to_csv(rows: &[CoverageRow]) -> Result<Vec<u8>, TableError> {
    write_csv(Vec::new(), &coverage_to_batch(rows)?)
}

/// Write consolidated edges as a single-row-group Parquet file.
#[cfg(feature = "parquet")]
pub fn write_edges_parquet<W: Write + Send>(
    output: W,
    edges: &[RelationEdge],
) -> Result<(), TableError> {
    let batch = edges_to_batch(edges)?;
    let mut writer = parquet::arrow::ArrowWriter::try_new(output, batch.schema(), None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use digesto_core::{NormId, Provenance, RelationKind};

    use super::*;

    #[test]
    fn official_relations_keep_raw_float_ids() {
        let csv = "origin_id,destination_id,relation_kind\n594.0,1200.0,modifica\n7,,es_modificada_por\n";
        let rows = read_official_relations(Cursor::new(csv)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].origin.as_deref(), Some("594.0"));
        assert_eq!(rows[0].destination.as_deref(), Some("1200.0"));
        assert_eq!(rows[0].kind.as_deref(), Some("modifica"));
        assert!(rows[1].destination.as_deref().is_none_or(str::is_empty));
    }

    #[test]
    fn official_relations_accept_spanish_headers_and_bom() {
        let csv = "\u{feff}id_origen,id_destino,tipo_relacion\n1,2,modifica\n";
        let rows = read_official_relations(Cursor::new(csv)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].origin.as_deref(), Some("1"));
    }

    #[test]
    fn official_relations_read_schema_headers() {
        let header: Vec<String> = tables::official_relations_schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        let csv = format!("{}\n3,4,cita\n", header.join(","));
        let rows = read_official_relations(Cursor::new(csv)).unwrap();
        assert_eq!(rows[0].destination.as_deref(), Some("4"));
        assert_eq!(rows[0].kind.as_deref(), Some("cita"));
    }

    #[test]
    fn missing_column_is_reported() {
        let csv = "a,b\n1,2\n";
        let err = read_official_relations(Cursor::new(csv)).unwrap_err();
        assert!(matches!(err, TableError::MissingColumn(c) if c == "origin_id"));
    }

    #[test]
    fn modifications_and_norm_ids() {
        let csv = "id_norma_modificatoria,id_norma_modificada,extra\n10,20,x\n";
        let pairs = read_modifications(Cursor::new(csv)).unwrap();
        assert_eq!(pairs[0].modifying.as_deref(), Some("10"));
        assert_eq!(pairs[0].modified.as_deref(), Some("20"));

        let norms = "id_norma,tipo_norma,numero_norma\n594,Ley,24240\n283855,Resolución,5\n";
        let ids = read_norm_ids(Cursor::new(norms)).unwrap();
        assert_eq!(ids, vec!["594".to_string(), "283855".to_string()]);
    }

    #[test]
    fn edges_csv_has_header_and_rows() {
        let edges = vec![RelationEdge {
            origin: NormId::parse("5").unwrap(),
            destination: NormId::parse("10").unwrap(),
            kind: RelationKind::Modifica,
            provenance: Provenance::FichaExplicit,
        }];
        let bytes = edges_to_csv(&edges).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("origin_id,destination_id,relation_kind,provenance")
        );
        assert_eq!(lines.next(), Some("5,10,modifica,ficha_explicit"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn coverage_csv_rows() {
        let rows = vec![CoverageRow {
            id: NormId::parse("594").unwrap(),
            raw: true,
            parsed: false,
        }];
        let text = String::from_utf8(coverage_to_csv(&rows).unwrap()).unwrap();
        assert!(text.starts_with("id_norma,ficha_descargada,ficha_parseada\n"));
        assert!(text.contains("594,true,false"));
    }

    #[test]
    fn empty_edge_set_writes_header_only() {
        let text = String::from_utf8(edges_to_csv(&[]).unwrap()).unwrap();
        assert_eq!(text.trim_end(), "origin_id,destination_id,relation_kind,provenance");
    }
}
