/// Arrow schema definitions for the tabular inputs and outputs.
///
/// Every id column is `Utf8`: ids arrive as `"594.0"`, `"594"` or blanks
/// depending on the export, and are normalised after reading, never by the
/// CSV type inference.
pub mod tables {
    use arrow::datatypes::{DataType, Field, Schema};

    /// Official relation table: `origin_id, destination_id, relation_kind`.
    pub fn official_relations_schema() -> Schema {
        Schema::new(vec![
            Field::new("origin_id", DataType::Utf8, true),
            Field::new("destination_id", DataType::Utf8, true),
            Field::new("relation_kind", DataType::Utf8, true),
        ])
    }

    /// Consolidated output: the official columns plus `provenance`.
    pub fn consolidated_edges_schema() -> Schema {
        Schema::new(vec![
            Field::new("origin_id", DataType::Utf8, false),
            Field::new("destination_id", DataType::Utf8, false),
            Field::new("relation_kind", DataType::Utf8, false),
            Field::new("provenance", DataType::Utf8, false),
        ])
    }

    /// Scraping coverage: whether a raw and a parsed fiche exist per norm.
    pub fn coverage_schema() -> Schema {
        Schema::new(vec![
            Field::new("id_norma", DataType::Utf8, false),
            Field::new("ficha_descargada", DataType::Boolean, false),
            Field::new("ficha_parseada", DataType::Boolean, false),
        ])
    }

    /// Name of the id column in the norms master table (`digesto_normas.csv`).
    pub const NORMS_ID_COLUMN: &str = "id_norma";
}
