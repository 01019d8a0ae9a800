//! Read and write numeric matrices in tsv format
//!
//! Matrices are stored one row per line with tab separated values and no header. Lines starting with
//! '#' are skipped.
//!

use std::fs::File;
use std::io::{Read, Write};

use camino::Utf8Path;
use csv::{ReaderBuilder, Trim, WriterBuilder};
use log::info;
use nalgebra::DMatrix;
use simple_error::{SimpleResult, bail, try_with};

use crate::clone_model::CloneObservations;
use crate::filenames::{
    ALLELE_COUNTS_FILENAME, BREAKPOINT_SEGMENTS_FILENAME, MATE_PAIRS_FILENAME,
    MIXED_COPY_NUMBER_FILENAME, TOTAL_DEPTH_FILENAME,
};

/// Parse a tsv matrix from any reader
///
/// `label` is used to describe the matrix source in error messages
///
pub fn parse_matrix<R: Read>(reader: R, label: &str) -> SimpleResult<DMatrix<f64>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .comment(Some(b'#'))
        .delimiter(b'\t')
        .from_reader(reader);

    let mut values = Vec::new();
    let mut col_count = None;
    let mut row_count = 0;
    for (line_index, result) in rdr.records().enumerate() {
        let record = try_with!(
            result,
            "Failed to parse record {} from {label}",
            line_index + 1
        );

        let mut row_col_count = 0;
        for field in record.iter().filter(|x| !x.is_empty()) {
            let value = try_with!(
                field.parse::<f64>(),
                "Can't parse value '{field}' in record {} from {label}",
                line_index + 1
            );
            values.push(value);
            row_col_count += 1;
        }

        if row_col_count == 0 {
            continue;
        }
        match col_count {
            None => col_count = Some(row_col_count),
            Some(x) if x != row_col_count => {
                bail!(
                    "Record {} from {label} has {row_col_count} values, expected {x}",
                    line_index + 1
                );
            }
            _ => {}
        }
        row_count += 1;
    }

    let col_count = col_count.unwrap_or(0);
    Ok(DMatrix::from_row_slice(row_count, col_count, &values))
}

/// Read a tsv matrix file
pub fn read_matrix(filename: &Utf8Path) -> SimpleResult<DMatrix<f64>> {
    let file = try_with!(
        File::open(filename),
        "Unable to open matrix file: '{filename}'"
    );
    parse_matrix(file, &format!("matrix file '{filename}'"))
}

/// Write matrix to any writer in tsv format
pub fn write_matrix_to<W: Write>(writer: W, matrix: &DMatrix<f64>) -> SimpleResult<()> {
    let mut wtr = WriterBuilder::new()
        .has_headers(false)
        .delimiter(b'\t')
        .from_writer(writer);

    for row in matrix.row_iter() {
        try_with!(
            wtr.write_record(row.iter().map(|x| x.to_string())),
            "Failed to write matrix row"
        );
    }
    try_with!(wtr.flush(), "Failed to flush matrix output");
    Ok(())
}

/// Write matrix to a tsv file
pub fn write_matrix(filename: &Utf8Path, matrix: &DMatrix<f64>) -> SimpleResult<()> {
    info!("Writing matrix to file: '{filename}'");

    let file = try_with!(
        File::create(filename),
        "Unable to create matrix file: '{filename}'"
    );
    write_matrix_to(file, matrix)
}

/// Read the full observation set for one solve from the standard filenames in `input_dir`
///
/// Only the file format is checked here, matrix dimension checks are left to `CloneObservations::validate`
///
pub fn read_observations(input_dir: &Utf8Path) -> SimpleResult<CloneObservations> {
    info!("Reading solver input from directory: '{input_dir}'");

    Ok(CloneObservations {
        mixed_copy_number: read_matrix(&input_dir.join(MIXED_COPY_NUMBER_FILENAME))?,
        breakpoint_segments: read_matrix(&input_dir.join(BREAKPOINT_SEGMENTS_FILENAME))?,
        mate_pairs: read_matrix(&input_dir.join(MATE_PAIRS_FILENAME))?,
        allele_counts: read_matrix(&input_dir.join(ALLELE_COUNTS_FILENAME))?,
        total_depth: read_matrix(&input_dir.join(TOTAL_DEPTH_FILENAME))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_matrix() {
        let input = b"# comment line\n1\t2\t3\n4.5\t0\t-1\n";
        let matrix = parse_matrix(&input[..], "test").unwrap();
        assert_eq!(matrix.shape(), (2, 3));
        assert_eq!(matrix[(0, 2)], 3.0);
        assert_eq!(matrix[(1, 0)], 4.5);
        assert_eq!(matrix[(1, 2)], -1.0);
    }

    #[test]
    fn test_parse_matrix_trailing_tab() {
        let input = b"1\t2\t\n3\t4\t\n\n";
        let matrix = parse_matrix(&input[..], "test").unwrap();
        assert_eq!(matrix, DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]));
    }

    #[test]
    fn test_parse_matrix_errors() {
        let input = b"1\t2\n3\n";
        assert!(parse_matrix(&input[..], "test").is_err());

        let input = b"1\tfoo\n";
        assert!(parse_matrix(&input[..], "test").is_err());
    }

    #[test]
    fn test_parse_empty_matrix() {
        let matrix = parse_matrix(&b"# nothing here\n"[..], "test").unwrap();
        assert_eq!(matrix.shape(), (0, 0));
    }

    #[test]
    fn test_write_matrix() {
        let matrix = DMatrix::from_row_slice(2, 2, &[2.0, 0.5, 0.0, 7.0]);
        let mut output = Vec::new();
        write_matrix_to(&mut output, &matrix).unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "2\t0.5\n0\t7\n");
    }
}
