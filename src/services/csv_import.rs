/// Column that must be present in batch uploads.
pub const UPC_COLUMN: &str = "upc";

#[derive(Debug, thiserror::Error)]
pub enum BatchUploadError {
    #[error("No file part in the request")]
    MissingFile,

    #[error("No file selected for uploading")]
    EmptyFilename,

    #[error("File must be a CSV (.csv)")]
    NotCsv,

    #[error("CSV must contain a column named \"upc\"")]
    MissingColumn,

    #[error("Malformed upload: {0}")]
    Malformed(String),

    #[error("Could not read CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// Read every non-empty value of the `upc` column, in file order.
///
/// Duplicates and invalid values are kept; the coordinator filters them.
pub fn read_upc_column(data: &[u8]) -> Result<Vec<String>, BatchUploadError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(data);

    let column = reader
        .headers()?
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}') == UPC_COLUMN)
        .ok_or(BatchUploadError::MissingColumn)?;

    let mut upcs = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(value) = record.get(column).filter(|v| !v.is_empty()) {
            upcs.push(value.to_string());
        }
    }
    Ok(upcs)
}

/// Check the uploaded filename the way the upload form promises.
pub fn check_filename(filename: Option<&str>) -> Result<(), BatchUploadError> {
    match filename {
        None | Some("") => Err(BatchUploadError::EmptyFilename),
        Some(name) if !name.to_ascii_lowercase().ends_with(".csv") => Err(BatchUploadError::NotCsv),
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_upc_column_in_order() {
        let data = b"name,upc,price\nCola,012345678905,1.99\nChips, 4006381333931 ,2.49\nCola,012345678905,1.99\n";
        let upcs = read_upc_column(data).unwrap();
        assert_eq!(upcs, vec!["012345678905", "4006381333931", "012345678905"]);
    }

    #[test]
    fn test_skips_blank_cells_and_short_rows() {
        let data = b"upc,name\n111,a\n,b\n222\n";
        let upcs = read_upc_column(data).unwrap();
        assert_eq!(upcs, vec!["111", "222"]);
    }

    #[test]
    fn test_handles_byte_order_mark() {
        let data = "\u{feff}upc\n333\n".as_bytes();
        assert_eq!(read_upc_column(data).unwrap(), vec!["333"]);
    }

    #[test]
    fn test_missing_column() {
        let err = read_upc_column(b"sku,name\n1,a\n").unwrap_err();
        assert!(matches!(err, BatchUploadError::MissingColumn));
    }

    #[test]
    fn test_invalid_utf8_is_an_error() {
        let err = read_upc_column(b"upc\n\xff\xfe\n").unwrap_err();
        assert!(matches!(err, BatchUploadError::Csv(_)));
    }

    #[test]
    fn test_check_filename() {
        assert!(check_filename(Some("products.csv")).is_ok());
        assert!(check_filename(Some("PRODUCTS.CSV")).is_ok());
        assert!(matches!(check_filename(Some("")), Err(BatchUploadError::EmptyFilename)));
        assert!(matches!(check_filename(None), Err(BatchUploadError::EmptyFilename)));
        assert!(matches!(check_filename(Some("a.xlsx")), Err(BatchUploadError::NotCsv)));
    }
}
